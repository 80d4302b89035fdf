//! Shared per-connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{Notify, watch};

use drawbridge_session::Session;
use drawbridge_transport::ConnectionId;

/// One connection's [`Session`] plus the signals its tasks coordinate on.
///
/// The reader task, the writer task, the engine loop and gameplay all
/// reach the session through this handle. The lock is a `parking_lot`
/// mutex and is never held across an `.await`.
pub(crate) struct SessionHandle {
    id: ConnectionId,
    session: Mutex<Session>,
    /// Wakes the writer. `notify_one` keeps a permit, so a wake sent
    /// while the writer is busy is not lost.
    wake: Notify,
    closed: watch::Sender<bool>,
    /// The transport has been closed. Set exactly once.
    released: AtomicBool,
    /// The transport failed; the sweeper closes the session.
    dead: AtomicBool,
    /// Counted in the online total.
    promoted: AtomicBool,
    transient_write_failures: AtomicU32,
}

impl SessionHandle {
    pub(crate) fn new(session: Session) -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self {
            id: session.id(),
            session: Mutex::new(session),
            wake: Notify::new(),
            closed,
            released: AtomicBool::new(false),
            dead: AtomicBool::new(false),
            promoted: AtomicBool::new(false),
            transient_write_failures: AtomicU32::new(0),
        })
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    /// Runs `f` on the session, then signals the writer if there is output
    /// to send or the session closed.
    pub(crate) fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let (result, closed, pending) = {
            let mut session = self.session.lock();
            let result = f(&mut session);
            (result, session.is_closed(), session.has_pending_output())
        };
        if closed {
            self.closed.send_replace(true);
        }
        if pending || closed {
            self.wake.notify_one();
        }
        result
    }

    /// Plain access with no signalling. For reads and for the writer.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock()
    }

    pub(crate) fn wake_writer(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn writer_woken(&self) {
        self.wake.notified().await;
    }

    pub(crate) fn subscribe_closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Returns `true` for the one caller that gets to release the
    /// transport.
    pub(crate) fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) fn mark_promoted(&self) {
        self.promoted.store(true, Ordering::Release);
    }

    /// Clears the promoted flag. Returns `true` if it was set, so the
    /// online count is decremented once per session.
    pub(crate) fn take_promoted(&self) -> bool {
        self.promoted.swap(false, Ordering::AcqRel)
    }

    /// Records a transient write failure and returns how many happened in
    /// a row.
    pub(crate) fn record_transient_failure(&self) -> u32 {
        self.transient_write_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn clear_write_failures(&self) {
        self.transient_write_failures.store(0, Ordering::Release);
    }
}
