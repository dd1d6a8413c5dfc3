/// A transient source of stream indices for one `img`/`blob`/`end`
/// sequence, supplied by the caller so this crate's codec/flush layers
/// never invent a stream number of their own.
///
/// Each use is acquire-emit-release: a single call borrows a stream just
/// long enough to write one `img`/`blob`/`end` triple, then frees it, so
/// concurrently flushing surfaces or a dup replay racing a live flush
/// never collide on the same index.
pub struct StreamPool<'a> {
    acquire: &'a dyn Fn() -> i32,
    release: &'a dyn Fn(i32),
}

impl<'a> StreamPool<'a> {
    #[must_use]
    pub fn new(acquire: &'a dyn Fn() -> i32, release: &'a dyn Fn(i32)) -> Self {
        Self { acquire, release }
    }

    /// Acquire a stream index, hand it to `f`, then release it.
    pub fn with<R>(&self, f: impl FnOnce(i32) -> R) -> R {
        let stream = (self.acquire)();
        let result = f(stream);
        (self.release)(stream);
        result
    }
}
