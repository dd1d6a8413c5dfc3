use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// A sink for rendered wire instructions.
///
/// Rather than exposing separate begin/end calls around field-by-field
/// emission (as the line-oriented protocol this is modeled on does, to
/// support writing a variable number of fields before closing the
/// instruction), an instruction is fully rendered into a single buffer by
/// its caller and handed to [`Socket::write_instruction`] as one atomic
/// unit. This is equivalent at the wire level — no partial instruction is
/// ever observable by a reader — and removes the need to hold a lock
/// guard across multiple trait-object calls.
pub trait Socket: Send + Sync {
    /// Write one fully-rendered instruction (already including its
    /// trailing `;`) as a single atomic operation with respect to other
    /// writers of this socket.
    fn write_instruction(&self, rendered: &str);

    /// Whether this socket still accepts writes. A closed socket's
    /// writes are silently dropped by callers such as
    /// [`BroadcastSocket`].
    fn is_open(&self) -> bool;
}

/// A [`Socket`] backed by any [`Write`]r, guarded by a single mutex so
/// that concurrent `write_instruction` calls never interleave their
/// bytes.
pub struct MutexSocket<W> {
    writer: Mutex<W>,
    open: AtomicBool,
}

impl<W: Write + Send> MutexSocket<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer), open: AtomicBool::new(true) }
    }

    /// Mark the socket closed; subsequent writes are no-ops.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl<W: Write + Send> Socket for MutexSocket<W> {
    fn write_instruction(&self, rendered: &str) {
        if !self.is_open() {
            return;
        }
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if writer.write_all(rendered.as_bytes()).is_err() {
            tracing::debug!("socket write failed, closing");
            self.close();
            return;
        }
        let _ = writer.flush();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// A logical socket that fans every write out to a dynamic list of
/// member sockets — e.g. "every active user" or "every pending user".
///
/// Per-instruction atomicity is preserved per underlying member socket
/// (each member's own lock is scoped to its own `write_instruction`
/// call); ordering of writes across members is not cross-synchronized,
/// matching the relaxed guarantee the wire protocol asks for.
#[derive(Default)]
pub struct BroadcastSocket {
    members: RwLock<Vec<Arc<dyn Socket>>>,
}

impl BroadcastSocket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, member: Arc<dyn Socket>) {
        self.members.write().unwrap_or_else(|e| e.into_inner()).push(member);
    }

    /// Remove every member for which `predicate` returns `true`.
    pub fn remove_where(&self, mut predicate: impl FnMut(&Arc<dyn Socket>) -> bool) {
        self.members.write().unwrap_or_else(|e| e.into_inner()).retain(|m| !predicate(m));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Socket for BroadcastSocket {
    fn write_instruction(&self, rendered: &str) {
        let members = self.members.read().unwrap_or_else(|e| e.into_inner());
        for member in members.iter() {
            if member.is_open() {
                member.write_instruction(rendered);
            }
        }
    }

    /// A broadcast socket itself is never "closed" — membership simply
    /// shrinks to zero; individual members decide whether they accept
    /// writes.
    fn is_open(&self) -> bool {
        true
    }
}
