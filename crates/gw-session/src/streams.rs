//! Per-user stream and object tables: capped-cardinality slot arrays with
//! optional ack/blob/end/get/put handlers, falling back to session-level
//! defaults. Handlers are a small sum type with an `External` closure
//! variant rather than raw function pointers.

/// Maximum number of streams a single user may have open at once, in
/// either direction.
pub const MAX_STREAMS_PER_USER: usize = 64;

/// Maximum number of objects a single user may expose at once.
pub const MAX_OBJECTS_PER_USER: usize = 64;

/// Sentinel marking a stream/object slot as unused.
pub const CLOSED: i32 = -1;

/// Ack-handler variants for a stream. Falls back to the owning user's (or
/// session's) default when `None`.
pub enum AckHandler {
    External(Box<dyn Fn(i32, gw_wire::ProtocolStatus) + Send + Sync>),
}

/// Blob-handler variants for a stream.
pub enum BlobHandler {
    External(Box<dyn Fn(i32, &[u8]) + Send + Sync>),
}

/// End-handler variants for a stream.
pub enum EndHandler {
    External(Box<dyn Fn(i32) + Send + Sync>),
}

/// Get-handler variants for an object.
pub enum GetHandler {
    External(Box<dyn Fn(&str) + Send + Sync>),
}

/// Put-handler variants for an object.
pub enum PutHandler {
    External(Box<dyn Fn(&str, &str) + Send + Sync>),
}

struct StreamSlot {
    index: i32,
    ack: Option<AckHandler>,
    blob: Option<BlobHandler>,
    end: Option<EndHandler>,
}

/// A user's stream slots, indexed by `pool_next() * 2` (even indices).
pub struct StreamTable {
    slots: Vec<StreamSlot>,
    pool: gw_geom::IntegerPool,
}

impl StreamTable {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_STREAMS_PER_USER);
        slots.resize_with(MAX_STREAMS_PER_USER, || StreamSlot { index: CLOSED, ack: None, blob: None, end: None });
        Self { slots, pool: gw_geom::IntegerPool::new(MAX_STREAMS_PER_USER as i32) }
    }

    /// Allocate a fresh even-indexed stream. Returns `None` if the cap is
    /// exceeded.
    pub fn allocate(&mut self) -> Option<i32> {
        let slot_num = self.pool.next();
        if slot_num as usize >= MAX_STREAMS_PER_USER {
            self.pool.free(slot_num);
            return None;
        }
        let index = slot_num * 2;
        self.slots[slot_num as usize].index = index;
        Some(index)
    }

    /// Release a previously-allocated stream index back to the pool.
    pub fn release(&mut self, index: i32) {
        if index < 0 || index % 2 != 0 {
            return;
        }
        let slot_num = index / 2;
        if let Some(slot) = self.slots.get_mut(slot_num as usize) {
            slot.index = CLOSED;
            slot.ack = None;
            slot.blob = None;
            slot.end = None;
            self.pool.free(slot_num);
        }
    }

    /// Whether `index` refers to a currently-open stream slot.
    #[must_use]
    pub fn is_open(&self, index: i32) -> bool {
        if index < 0 || index % 2 != 0 {
            return false;
        }
        let slot_num = (index / 2) as usize;
        self.slots.get(slot_num).is_some_and(|s| s.index != CLOSED)
    }

    pub fn set_ack_handler(&mut self, index: i32, handler: AckHandler) {
        if let Some(slot) = self.slot_mut(index) {
            slot.ack = Some(handler);
        }
    }

    pub fn set_blob_handler(&mut self, index: i32, handler: BlobHandler) {
        if let Some(slot) = self.slot_mut(index) {
            slot.blob = Some(handler);
        }
    }

    pub fn set_end_handler(&mut self, index: i32, handler: EndHandler) {
        if let Some(slot) = self.slot_mut(index) {
            slot.end = Some(handler);
        }
    }

    fn slot_mut(&mut self, index: i32) -> Option<&mut StreamSlot> {
        if index < 0 || index % 2 != 0 {
            return None;
        }
        self.slots.get_mut((index / 2) as usize).filter(|s| s.index != CLOSED)
    }

    #[must_use]
    pub fn ack_handler(&self, index: i32) -> Option<&AckHandler> {
        if index < 0 || index % 2 != 0 {
            return None;
        }
        self.slots.get((index / 2) as usize).and_then(|s| s.ack.as_ref())
    }

    #[must_use]
    pub fn blob_handler(&self, index: i32) -> Option<&BlobHandler> {
        if index < 0 || index % 2 != 0 {
            return None;
        }
        self.slots.get((index / 2) as usize).and_then(|s| s.blob.as_ref())
    }

    #[must_use]
    pub fn end_handler(&self, index: i32) -> Option<&EndHandler> {
        if index < 0 || index % 2 != 0 {
            return None;
        }
        self.slots.get((index / 2) as usize).and_then(|s| s.end.as_ref())
    }
}

impl Default for StreamTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A named-resource object endpoint with optional get/put handlers.
struct ObjectSlot {
    name: Option<String>,
    get: Option<GetHandler>,
    put: Option<PutHandler>,
}

/// A user's object slots, capped at [`MAX_OBJECTS_PER_USER`].
pub struct ObjectTable {
    slots: Vec<ObjectSlot>,
}

impl ObjectTable {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_OBJECTS_PER_USER);
        slots.resize_with(MAX_OBJECTS_PER_USER, || ObjectSlot { name: None, get: None, put: None });
        Self { slots }
    }

    /// Register a new named object, returning its index or `None` if every
    /// slot is occupied.
    pub fn register(&mut self, name: impl Into<String>, get: Option<GetHandler>, put: Option<PutHandler>) -> Option<usize> {
        let slot = self.slots.iter_mut().enumerate().find(|(_, s)| s.name.is_none())?;
        let (idx, slot) = slot;
        slot.name = Some(name.into());
        slot.get = get;
        slot.put = put;
        Some(idx)
    }

    pub fn unregister(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.name = None;
            slot.get = None;
            slot.put = None;
        }
    }

    #[must_use]
    pub fn get_handler(&self, index: usize) -> Option<(&str, Option<&GetHandler>)> {
        self.slots.get(index).and_then(|s| s.name.as_deref().map(|n| (n, s.get.as_ref())))
    }

    #[must_use]
    pub fn put_handler(&self, index: usize) -> Option<(&str, Option<&PutHandler>)> {
        self.slots.get(index).and_then(|s| s.name.as_deref().map(|n| (n, s.put.as_ref())))
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Session-level outbound stream table, odd-indexed
/// (`pool_next() * 2 + 1`). Shares the same allocation/release shape as
/// [`StreamTable`] but is owned by the session rather than a single user.
pub struct SessionStreamTable {
    inner: StreamTable,
}

impl SessionStreamTable {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: StreamTable::new() }
    }

    pub fn allocate(&mut self) -> Option<i32> {
        self.inner.allocate().map(|even| even + 1)
    }

    pub fn release(&mut self, index: i32) {
        if index >= 0 && index % 2 == 1 {
            self.inner.release(index - 1);
        }
    }

    #[must_use]
    pub fn is_open(&self, index: i32) -> bool {
        index >= 0 && index % 2 == 1 && self.inner.is_open(index - 1)
    }

    pub fn set_ack_handler(&mut self, index: i32, handler: AckHandler) {
        self.inner.set_ack_handler(index - 1, handler);
    }

    pub fn set_blob_handler(&mut self, index: i32, handler: BlobHandler) {
        self.inner.set_blob_handler(index - 1, handler);
    }

    pub fn set_end_handler(&mut self, index: i32, handler: EndHandler) {
        self.inner.set_end_handler(index - 1, handler);
    }

    #[must_use]
    pub fn ack_handler(&self, index: i32) -> Option<&AckHandler> {
        self.inner.ack_handler(index - 1)
    }

    #[must_use]
    pub fn blob_handler(&self, index: i32) -> Option<&BlobHandler> {
        self.inner.blob_handler(index - 1)
    }

    #[must_use]
    pub fn end_handler(&self, index: i32) -> Option<&EndHandler> {
        self.inner.end_handler(index - 1)
    }
}

impl Default for SessionStreamTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `index` belongs to a user-scoped (even) stream table.
#[must_use]
pub fn is_user_stream(index: i32) -> bool {
    index >= 0 && index % 2 == 0
}

#[must_use]
pub fn is_session_stream(index: i32) -> bool {
    index >= 0 && index % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn stream_allocation_is_even_and_release_allows_reuse() {
        let mut table = StreamTable::new();
        let a = table.allocate().unwrap();
        assert_eq!(a % 2, 0);
        table.release(a);
        assert!(!table.is_open(a));
    }

    #[test]
    fn session_stream_allocation_is_odd() {
        let mut table = SessionStreamTable::new();
        let a = table.allocate().unwrap();
        assert_eq!(a % 2, 1);
        assert!(table.is_open(a));
    }

    #[test]
    fn allocation_beyond_cap_returns_none() {
        let mut table = StreamTable::new();
        let mut allocated = Vec::new();
        for _ in 0..MAX_STREAMS_PER_USER {
            allocated.push(table.allocate().unwrap());
        }
        assert!(table.allocate().is_none());
    }

    #[test]
    fn blob_handler_fires_through_the_external_variant() {
        let mut table = StreamTable::new();
        let index = table.allocate().unwrap();
        let fired = std::sync::Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        table.set_blob_handler(index, BlobHandler::External(Box::new(move |_i, _data| fired2.store(true, Ordering::SeqCst))));
        if let Some(BlobHandler::External(f)) = table.blob_handler(index) {
            f(index, b"hello");
        }
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn object_register_and_unregister() {
        let mut objects = ObjectTable::new();
        let idx = objects.register("filesystem", None, None).unwrap();
        assert_eq!(objects.get_handler(idx).unwrap().0, "filesystem");
        objects.unregister(idx);
        assert!(objects.get_handler(idx).is_none());
    }
}
