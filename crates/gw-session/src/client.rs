//! `Session`: owns the display, the pending/active user arenas, the
//! promotion loop, and instruction dispatch.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, RwLock};

use gw_display::{Display, EncodingContext, ImageEncoder};
use gw_wire::{BroadcastSocket, ClientOpcode, InstructionBuilder, ProtocolStatus, Socket, StreamPool};

use crate::config::SessionConfig;
use crate::dispatch::{apply_handshake, parse_steady_state, SteadyStateAction};
use crate::error::{DispatchError, SessionError};
use crate::streams::SessionStreamTable;
use crate::user::{User, UserId};

/// Sanitized text sent in the `error` instruction on abort. Never carries
/// internal error detail.
pub const ABORT_MESSAGE: &str = "Aborted. See logs.";

/// A user plus the mutex guarding its mutable state (timing stats,
/// stream/object tables, capability info). Held behind `Arc` so both the
/// arena and any background task can reference the same user.
pub type UserHandle = Arc<Mutex<User>>;

struct Arena {
    pending: Vec<UserHandle>,
    active: Vec<UserHandle>,
}

impl Arena {
    fn new() -> Self {
        Self { pending: Vec::new(), active: Vec::new() }
    }
}

/// Callback invoked once per drained batch during promotion, with the
/// batch of users about to move from pending to active. Returning `Err`
/// keeps the whole batch pending for the next tick.
pub type JoinPendingCallback = Box<dyn Fn(&[UserHandle]) -> Result<(), String> + Send + Sync>;

/// Callback invoked when a user joins (after being appended to pending).
pub type JoinHandler = Box<dyn Fn(&UserHandle) + Send + Sync>;

/// Callback invoked when a user leaves, just before it is dropped.
pub type LeaveHandler = Box<dyn Fn(&UserHandle) + Send + Sync>;

pub struct Session {
    pub id: String,
    config: SessionConfig,
    state: AtomicBool,
    display: Display,
    active_broadcast: Arc<BroadcastSocket>,
    pending_broadcast: Arc<BroadcastSocket>,
    arena: RwLock<Arena>,
    owner: Mutex<Option<UserId>>,
    user_count: AtomicI64,
    last_sent_timestamp_ms: AtomicI64,
    session_streams: StdMutex<SessionStreamTable>,
    join_pending_callback: Option<JoinPendingCallback>,
    join_handler: Option<JoinHandler>,
    leave_handler: Option<LeaveHandler>,
}

fn is_running(state: &AtomicBool) -> bool {
    state.load(Ordering::Acquire)
}

fn lock_streams(streams: &StdMutex<SessionStreamTable>) -> std::sync::MutexGuard<'_, SessionStreamTable> {
    streams.lock().unwrap_or_else(|e| {
        tracing::warn!("session stream table mutex was poisoned, recovering");
        e.into_inner()
    })
}

/// Build a [`StreamPool`] backed by `streams`, allocating and releasing a
/// real session-level stream index around each `img`/`blob`/`end`
/// sequence rather than leaving callers to hardcode one.
fn session_stream_pool(streams: &StdMutex<SessionStreamTable>) -> (impl Fn() -> i32 + '_, impl Fn(i32) + '_) {
    let acquire = move || {
        lock_streams(streams).allocate().unwrap_or_else(|| {
            tracing::warn!("session stream table exhausted, reusing index 1");
            1
        })
    };
    let release = move |stream: i32| lock_streams(streams).release(stream);
    (acquire, release)
}

impl Session {
    #[must_use]
    pub fn new(id: String, config: SessionConfig) -> Self {
        let active_broadcast = Arc::new(BroadcastSocket::new());
        let pending_broadcast = Arc::new(BroadcastSocket::new());
        let display = Display::new(active_broadcast.clone(), config.default_width, config.default_height, config.surface.clone());
        Self {
            id,
            config,
            state: AtomicBool::new(true),
            display,
            active_broadcast,
            pending_broadcast,
            arena: RwLock::new(Arena::new()),
            owner: Mutex::new(None),
            user_count: AtomicI64::new(0),
            last_sent_timestamp_ms: AtomicI64::new(0),
            session_streams: StdMutex::new(SessionStreamTable::new()),
            join_pending_callback: None,
            join_handler: None,
            leave_handler: None,
        }
    }

    pub fn set_join_pending_callback(&mut self, cb: JoinPendingCallback) {
        self.join_pending_callback = Some(cb);
    }

    pub fn set_join_handler(&mut self, cb: JoinHandler) {
        self.join_handler = Some(cb);
    }

    pub fn set_leave_handler(&mut self, cb: LeaveHandler) {
        self.leave_handler = Some(cb);
    }

    #[must_use]
    pub fn display(&self) -> &Display {
        &self.display
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        is_running(&self.state)
    }

    #[must_use]
    pub fn user_count(&self) -> i64 {
        self.user_count.load(Ordering::Acquire)
    }

    /// Allocate a user, append it to the pending list, and replay nothing
    /// yet (replay happens at promotion time). Returns the new user's
    /// handle.
    pub async fn join(&self, owner: bool, socket: Arc<dyn Socket>) -> UserHandle {
        let prefix = if owner { '$' } else { '#' };
        let id = UserId::generate(prefix);
        let user = Arc::new(Mutex::new(User::new(id.clone(), owner, socket.clone())));

        self.pending_broadcast.add(socket);
        {
            let mut arena = self.arena.write().await;
            arena.pending.push(user.clone());
        }
        self.user_count.fetch_add(1, Ordering::AcqRel);

        if owner {
            *self.owner.lock().await = Some(id.clone());
        } else if let Some(owner_id) = self.owner.lock().await.clone() {
            if let Some(owner_handle) = self.lookup(&owner_id).await {
                let owner_guard = owner_handle.lock().await;
                if owner_guard.info.protocol_version.is_some() {
                    let msg = InstructionBuilder::new("msg").int(0).str(id.as_str()).build();
                    owner_guard.socket().write_instruction(&msg);
                }
            }
        }

        if let Some(handler) = &self.join_handler {
            handler(&user);
        }

        user
    }

    /// Remove `id` from whichever list contains it.
    pub async fn leave(&self, id: &UserId) -> Result<(), SessionError> {
        let removed = {
            let mut arena = self.arena.write().await;
            let from_pending = take_matching(&mut arena.pending, id);
            let from_active = take_matching(&mut arena.active, id);
            from_pending.or(from_active)
        };
        let Some(handle) = removed else {
            return Err(SessionError::UnknownUser(id.clone()));
        };

        {
            let guard = handle.lock().await;
            self.active_broadcast.remove_where(|m| Arc::ptr_eq(m, guard.socket()));
            self.pending_broadcast.remove_where(|m| Arc::ptr_eq(m, guard.socket()));
        }

        self.user_count.fetch_sub(1, Ordering::AcqRel);

        let mut owner = self.owner.lock().await;
        if owner.as_ref() == Some(id) {
            *owner = None;
            let msg = InstructionBuilder::new("msg").int(1).str(id.as_str()).build();
            self.active_broadcast.write_instruction(&msg);
        }
        drop(owner);

        self.display.cursor().remove_user(user_id_hash(id));

        if let Some(handler) = &self.leave_handler {
            handler(&handle);
        }

        Ok(())
    }

    async fn lookup(&self, id: &UserId) -> Option<UserHandle> {
        let arena = self.arena.read().await;
        arena.pending.iter().chain(arena.active.iter()).find(|h| {
            // A blocking_lock would deadlock under the async runtime;
            // since id never changes after construction we peek via
            // try_lock, falling back to a short async lock otherwise.
            h.try_lock().map(|g| &g.id == id).unwrap_or(false)
        }).cloned()
    }

    /// Drain and promote one batch of pending users to active.
    pub async fn promote_pending(&self, encoder: &dyn ImageEncoder) {
        let mut arena = self.arena.write().await;
        if arena.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut arena.pending);

        if let Some(cb) = &self.join_pending_callback {
            if let Err(reason) = cb(&batch) {
                tracing::debug!(reason, "join_pending callback rejected batch, keeping pending");
                arena.pending = batch;
                return;
            }
        }

        let (acquire, release) = session_stream_pool(&self.session_streams);
        let pool = StreamPool::new(&acquire, &release);
        for handle in &batch {
            let guard = handle.lock().await;
            self.display.dup(guard.socket(), encoder, &pool);
            self.pending_broadcast.remove_where(|m| Arc::ptr_eq(m, guard.socket()));
            self.active_broadcast.add(guard.socket().clone());
        }

        // Splice the promoted batch onto the head of the active list.
        let mut new_active = batch;
        new_active.append(&mut arena.active);
        arena.active = new_active;
    }

    /// Run the background promotion loop until the session stops.
    pub async fn run_pending_loop(self: &Arc<Self>, encoder: Arc<dyn ImageEncoder>) {
        let interval = self.config.pending_loop_interval();
        while self.is_running() {
            tokio::time::sleep(interval).await;
            self.promote_pending(encoder.as_ref()).await;
        }
    }

    /// Apply the handshake phase of one instruction for `user`.
    pub async fn dispatch_handshake(&self, user: &UserHandle, opcode: ClientOpcode, args: &[String]) -> Result<(), DispatchError> {
        let mut guard = user.lock().await;
        apply_handshake(&mut guard.info, opcode, args)
    }

    /// Apply one steady-state instruction for `user`, sending an `ack`
    /// back on a bad stream reference.
    pub async fn dispatch_steady_state(&self, user: &UserHandle, opcode: ClientOpcode, args: &[String]) -> Result<(), DispatchError> {
        let action = parse_steady_state(opcode, args)?;
        match action {
            SteadyStateAction::Sync { timestamp_ms } => {
                let mut guard = user.lock().await;
                let now = now_ms();
                guard.timing.record_sync(now, timestamp_ms);
            }
            SteadyStateAction::Mouse { x, y, mask } => {
                let guard = user.lock().await;
                let user_id = guard.id.clone();
                drop(guard);
                self.display.cursor().update(user_id_hash(&user_id), x, y, mask);
                self.broadcast_mouse_position(x, y).await;
            }
            SteadyStateAction::Ack { .. } | SteadyStateAction::Blob { .. } | SteadyStateAction::End { .. } => {
                self.route_stream_event(user, &action).await?;
            }
            SteadyStateAction::Disconnect => {
                let guard = user.lock().await;
                let id = guard.id.clone();
                drop(guard);
                self.leave(&id).await.map_err(|e| DispatchError::Malformed(e.to_string()))?;
            }
            SteadyStateAction::Ignored => {}
        }
        Ok(())
    }

    async fn route_stream_event(&self, user: &UserHandle, action: &SteadyStateAction) -> Result<(), DispatchError> {
        let stream = match action {
            SteadyStateAction::Ack { stream, .. } | SteadyStateAction::Blob { stream, .. } | SteadyStateAction::End { stream } => *stream,
            _ => return Ok(()),
        };

        if crate::streams::is_session_stream(stream) {
            let streams = lock_streams(&self.session_streams);
            if !streams.is_open(stream) {
                drop(streams);
                self.send_ack(user, stream, ProtocolStatus::ClientBadRequest).await;
                return Err(DispatchError::BadStream);
            }
            match action {
                SteadyStateAction::Ack { status, .. } => {
                    if let Some(crate::streams::AckHandler::External(f)) = streams.ack_handler(stream) {
                        f(stream, protocol_status_from_code(*status));
                    }
                }
                SteadyStateAction::Blob { data, .. } => {
                    if let Some(crate::streams::BlobHandler::External(f)) = streams.blob_handler(stream) {
                        f(stream, data);
                    }
                }
                SteadyStateAction::End { .. } => {
                    if let Some(crate::streams::EndHandler::External(f)) = streams.end_handler(stream) {
                        f(stream);
                    }
                }
                _ => {}
            }
            return Ok(());
        }

        if !crate::streams::is_user_stream(stream) {
            self.send_ack(user, stream, ProtocolStatus::ClientBadRequest).await;
            return Err(DispatchError::BadStream);
        }

        let guard = user.lock().await;
        if !guard.streams.is_open(stream) {
            drop(guard);
            self.send_ack(user, stream, ProtocolStatus::ClientBadRequest).await;
            return Err(DispatchError::BadStream);
        }

        match action {
            SteadyStateAction::Ack { status, .. } => {
                if let Some(crate::streams::AckHandler::External(f)) = guard.streams.ack_handler(stream) {
                    f(stream, protocol_status_from_code(*status));
                }
            }
            SteadyStateAction::Blob { data, .. } => {
                if let Some(crate::streams::BlobHandler::External(f)) = guard.streams.blob_handler(stream) {
                    f(stream, data);
                }
            }
            SteadyStateAction::End { .. } => {
                if let Some(crate::streams::EndHandler::External(f)) = guard.streams.end_handler(stream) {
                    f(stream);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Send the cursor's current position to every active user except
    /// whichever one just moved it, mirrored per-user rather than through
    /// `active_broadcast` since that socket has no notion of per-member
    /// identity to exclude by.
    async fn broadcast_mouse_position(&self, x: i32, y: i32) {
        let mouse = InstructionBuilder::new("mouse").int(i64::from(x)).int(i64::from(y)).build();
        let arena = self.arena.read().await;
        for handle in &arena.active {
            let guard = handle.lock().await;
            if self.display.cursor().is_last_mover(user_id_hash(&guard.id)) {
                continue;
            }
            guard.socket().write_instruction(&mouse);
        }
    }

    async fn send_ack(&self, user: &UserHandle, stream: i32, status: ProtocolStatus) {
        let guard = user.lock().await;
        let rendered = InstructionBuilder::new("ack").int(i64::from(stream)).str("").int(status as i64).build();
        guard.socket().write_instruction(&rendered);
    }

    /// Flush the display to every active user and emit the frame-boundary
    /// `sync`.
    pub fn end_frame(&self, encoder: &dyn ImageEncoder, ctx: &EncodingContext) {
        let (acquire, release) = session_stream_pool(&self.session_streams);
        let pool = StreamPool::new(&acquire, &release);
        self.display.flush(encoder, ctx, &pool);
        let now = now_ms();
        self.last_sent_timestamp_ms.store(now as i64, Ordering::Release);
        let sync = InstructionBuilder::new("sync").int(now as i64).int(0).build();
        self.active_broadcast.write_instruction(&sync);
    }

    /// Abort the session: emit a sanitized `error`, flush, and transition
    /// to Stopping.
    pub fn abort(&self, status: ProtocolStatus) {
        let rendered = InstructionBuilder::new("error").str(ABORT_MESSAGE).int(status as i64).build();
        self.active_broadcast.write_instruction(&rendered);
        self.state.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        self.state.store(false, Ordering::Release);
    }
}

fn take_matching(list: &mut Vec<UserHandle>, id: &UserId) -> Option<UserHandle> {
    let pos = list.iter().position(|h| h.try_lock().map(|g| &g.id == id).unwrap_or(false))?;
    Some(list.remove(pos))
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// The cursor's "last mover" is tracked by a small integer, not the full
/// [`UserId`] string, to keep [`gw_display::Cursor`] free of any
/// session-level type. Hashing the id string is sufficient since it is
/// only ever compared for equality, never displayed.
fn user_id_hash(id: &UserId) -> i64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish() as i64
}

fn protocol_status_from_code(code: u32) -> ProtocolStatus {
    match code {
        1 => ProtocolStatus::ClientBadRequest,
        2 => ProtocolStatus::ClientForbidden,
        3 => ProtocolStatus::ClientUnauthorized,
        4 => ProtocolStatus::UpstreamNotFound,
        5 => ProtocolStatus::ServerError,
        6 => ProtocolStatus::Unsupported,
        7 => ProtocolStatus::ResourceClosed,
        _ => ProtocolStatus::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool as StdAtomicBool;
    use std::sync::Mutex as StdMutex;

    struct RecordingSocket {
        received: StdMutex<Vec<String>>,
        open: StdAtomicBool,
    }

    impl RecordingSocket {
        fn new() -> Arc<Self> {
            Arc::new(Self { received: StdMutex::new(Vec::new()), open: StdAtomicBool::new(true) })
        }
    }

    impl Socket for RecordingSocket {
        fn write_instruction(&self, rendered: &str) {
            self.received.lock().unwrap().push(rendered.to_string());
        }
        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }
    }

    struct NoopEncoder;
    impl ImageEncoder for NoopEncoder {
        fn encode_png(&self, _: &gw_display::PixelBuffer) -> Result<Vec<u8>, gw_display::EncodeError> {
            Ok(Vec::new())
        }
        fn encode_jpeg(&self, _: &gw_display::PixelBuffer, _: u8) -> Result<Vec<u8>, gw_display::EncodeError> {
            Ok(Vec::new())
        }
        fn encode_webp(&self, _: &gw_display::PixelBuffer, _: u8) -> Result<Vec<u8>, gw_display::EncodeError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn join_then_leave_tracks_user_count() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let socket = RecordingSocket::new();
        let handle = session.join(true, socket).await;
        assert_eq!(session.user_count(), 1);
        let id = handle.lock().await.id.clone();
        session.leave(&id).await.unwrap();
        assert_eq!(session.user_count(), 0);
    }

    #[tokio::test]
    async fn promote_pending_moves_user_to_active_and_replays_state() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let socket = RecordingSocket::new();
        session.join(true, socket.clone()).await;
        session.promote_pending(&NoopEncoder).await;
        let received = socket.received.lock().unwrap();
        assert!(!received.is_empty(), "promotion should replay display state");
    }

    #[tokio::test]
    async fn dispatch_handshake_updates_user_info() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let socket = RecordingSocket::new();
        let handle = session.join(true, socket).await;
        session
            .dispatch_handshake(&handle, ClientOpcode::Size, &["800".to_string(), "600".to_string()])
            .await
            .unwrap();
        assert_eq!(handle.lock().await.info.optimal_width, 800);
    }

    #[tokio::test]
    async fn dispatch_steady_state_records_sync_timing() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let socket = RecordingSocket::new();
        let handle = session.join(true, socket).await;
        session.dispatch_steady_state(&handle, ClientOpcode::Sync, &["0".to_string()]).await.unwrap();
        assert!(handle.lock().await.timing.last_frame_duration_ms.is_some());
    }

    #[tokio::test]
    async fn mouse_move_is_not_echoed_back_to_the_mover() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let mover_socket = RecordingSocket::new();
        let mover = session.join(true, mover_socket.clone()).await;
        let other_socket = RecordingSocket::new();
        session.join(false, other_socket.clone()).await;
        session.promote_pending(&NoopEncoder).await;
        mover_socket.received.lock().unwrap().clear();
        other_socket.received.lock().unwrap().clear();

        session.dispatch_steady_state(&mover, ClientOpcode::Mouse, &["10".to_string(), "20".to_string(), "1".to_string()]).await.unwrap();

        assert!(!mover_socket.received.lock().unwrap().iter().any(|r| r.contains("mouse")));
        assert!(other_socket.received.lock().unwrap().iter().any(|r| r.contains("mouse")));
    }

    #[tokio::test]
    async fn bad_stream_index_on_ack_sends_client_bad_request() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let socket = RecordingSocket::new();
        let handle = session.join(true, socket.clone()).await;
        let result = session.dispatch_steady_state(&handle, ClientOpcode::Ack, &["2".to_string()]).await;
        assert!(result.is_err());
        let received = socket.received.lock().unwrap();
        assert!(received.iter().any(|r| r.contains("ack")));
    }

    #[tokio::test]
    async fn abort_transitions_to_stopping_and_emits_sanitized_error() {
        let session = Session::new("s1".to_string(), SessionConfig::default());
        let socket = RecordingSocket::new();
        session.join(true, socket.clone()).await;
        session.promote_pending(&NoopEncoder).await;
        session.abort(ProtocolStatus::ServerError);
        assert!(!session.is_running());
        let received = socket.received.lock().unwrap();
        assert!(received.iter().any(|r| r.contains("error") && r.contains("Aborted")));
    }
}
