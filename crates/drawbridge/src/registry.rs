//! The table of live sessions and the periodic work done over it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use drawbridge_identity::VerifiedIdentity;
use drawbridge_protocol::{DisconnectReason, Phase};
use drawbridge_session::{ServerContext, SessionError};
use drawbridge_transport::{ConnectionId, TransportError};

use crate::connection::SessionHandle;
use crate::gameplay::{Gameplay, PlaySession};
use crate::verifier::VerificationOutcome;

/// Point-in-time view of one session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: ConnectionId,
    pub phase: Phase,
    pub claimed_name: Option<String>,
    pub identity: Option<VerifiedIdentity>,
    pub packets_processed: u64,
    pub close_reason: Option<DisconnectReason>,
}

/// Every session from accept until its transport is released.
///
/// The map lock is only held to insert, remove or copy out handles.
/// Session work happens on the copied handles, one session lock at a
/// time.
pub struct Registry {
    sessions: Mutex<HashMap<ConnectionId, Arc<SessionHandle>>>,
    ctx: ServerContext,
}

impl Registry {
    pub(crate) fn new(ctx: ServerContext) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ctx,
        }
    }

    pub(crate) fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions.lock().insert(handle.id(), handle);
    }

    fn handle(&self, id: ConnectionId) -> Option<Arc<SessionHandle>> {
        self.sessions.lock().get(&id).cloned()
    }

    fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.lock().values().cloned().collect()
    }

    /// Sessions not yet reaped, closed ones included.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Sessions promoted to play and still open.
    pub fn online_count(&self) -> usize {
        self.ctx.online_players()
    }

    pub fn get(&self, id: ConnectionId) -> Option<SessionSnapshot> {
        let handle = self.handle(id)?;
        let session = handle.lock();
        Some(SessionSnapshot {
            id,
            phase: session.phase(),
            claimed_name: session.claimed_name().map(str::to_owned),
            identity: session.identity().cloned(),
            packets_processed: session.packets_processed(),
            close_reason: session.close_reason().cloned(),
        })
    }

    // ----- Engine work -----

    /// One game tick: hand ready sessions to gameplay, then advance every
    /// other session's login timer.
    pub(crate) fn tick(&self, gameplay: &dyn Gameplay) {
        for handle in self.handles() {
            let ready = {
                let session = handle.lock();
                if session.phase() == Phase::Ready {
                    session.identity().cloned()
                } else {
                    None
                }
            };

            match ready {
                Some(identity) => self.promote(&handle, identity, gameplay),
                None => {
                    handle.with_session(|s| s.tick(&self.ctx));
                }
            }
        }
    }

    fn promote(&self, handle: &Arc<SessionHandle>, identity: VerifiedIdentity, gameplay: &dyn Gameplay) {
        let id = handle.id();
        let name = identity.name.clone();
        // Gameplay may call back into the session, so no lock is held here.
        let listener = gameplay.promote_to_play(PlaySession::new(Arc::clone(handle)), identity);

        match handle.with_session(|s| s.enter_play(listener)) {
            Ok(()) => {
                handle.mark_promoted();
                self.ctx.online_counter().fetch_add(1, Ordering::Relaxed);
                tracing::info!(%id, %name, online = self.online_count(), "player entered play");
            }
            Err(e) => tracing::debug!(%id, error = %e, "session closed before hand-off"),
        }
    }

    /// Periodic cleanup.
    ///
    /// Closes sessions whose transport died, takes closed sessions out of
    /// the online count, wakes writers with queued output (which is also
    /// how a stalled write gets its retry), and forgets sessions whose
    /// transport has been released.
    pub(crate) fn sweep(&self) {
        for handle in self.handles() {
            if handle.is_dead() {
                handle.with_session(|s| {
                    s.fail(SessionError::Transport(TransportError::ConnectionClosed(
                        "transport failed".into(),
                    )))
                });
            }

            let (closed, pending) = {
                let session = handle.lock();
                (session.is_closed(), session.has_pending_output())
            };
            if closed && handle.take_promoted() {
                self.ctx.online_counter().fetch_sub(1, Ordering::Relaxed);
            }
            if closed || pending {
                handle.wake_writer();
            }
        }

        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, handle| {
            if !handle.is_released() {
                return true;
            }
            // Released after the pass above; released implies closed.
            if handle.take_promoted() {
                self.ctx.online_counter().fetch_sub(1, Ordering::Relaxed);
            }
            false
        });
        let reaped = before - sessions.len();
        if reaped > 0 {
            tracing::debug!(reaped, remaining = sessions.len(), "swept released sessions");
        }
    }

    /// Applies a finished verification, unless the session is gone or has
    /// moved on.
    pub(crate) fn deliver(&self, outcome: VerificationOutcome) {
        let VerificationOutcome {
            connection,
            stamp,
            result,
        } = outcome;
        let Some(handle) = self.handle(connection) else {
            tracing::debug!(%connection, "verification result for a reaped session");
            return;
        };
        handle.with_session(|s| s.apply_verification(stamp, result, &self.ctx));
    }

    /// Closes every session with `reason`.
    pub(crate) fn close_all(&self, reason: &DisconnectReason) {
        for handle in self.handles() {
            handle.with_session(|s| s.close(reason.clone()));
        }
    }
}
