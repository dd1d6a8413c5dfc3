use std::collections::VecDeque;
use std::sync::Mutex;

/// A thread-safe allocator of small non-negative integers.
///
/// Hands out `0, 1, 2, …` until it has been used at least `min_size`
/// times; from that point on, integers returned via [`free`](IntegerPool::free)
/// become eligible for reuse, oldest-freed-first. This gives deterministic,
/// gap-free IDs for low-activity sessions while bounding reuse latency once
/// a session has cycled through enough allocations.
pub struct IntegerPool {
    inner: Mutex<Inner>,
}

struct Inner {
    min_size: i32,
    next_value: i32,
    active: i64,
    freed: VecDeque<i32>,
}

impl IntegerPool {
    /// Create a pool that hands out fresh integers until it has allocated
    /// at least `min_size` of them, after which freed integers are reused.
    #[must_use]
    pub fn new(min_size: i32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                min_size,
                next_value: 0,
                active: 0,
                freed: VecDeque::new(),
            }),
        }
    }

    /// Allocate the next available integer.
    pub fn next(&self) -> i32 {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.active += 1;

        if inner.freed.is_empty() || inner.next_value < inner.min_size {
            let value = inner.next_value;
            inner.next_value += 1;
            return value;
        }

        // Reuse the oldest freed integer.
        inner.freed.pop_front().expect("freed queue checked non-empty above")
    }

    /// Return an integer to the pool, making it eligible for reuse.
    pub fn free(&self, value: i32) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.active -= 1;
        inner.freed.push_back(value);
    }

    /// Number of integers currently allocated and not yet freed.
    pub fn active(&self) -> i64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).active
    }
}
