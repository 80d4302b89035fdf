//! The hand-off point between login and gameplay.

use std::sync::Arc;

use drawbridge_identity::VerifiedIdentity;
use drawbridge_protocol::{DisconnectReason, Phase, RawPacket};
use drawbridge_session::{PlayListener, SessionError};
use drawbridge_transport::ConnectionId;

use crate::connection::SessionHandle;

/// Takes ownership of players once their login completes.
///
/// Called on the engine's tick, once per session, with the verified
/// identity. The returned listener receives every packet the client sends
/// from then on, starting with any that arrived while the session waited
/// for the tick.
///
/// Any `Fn(PlaySession, VerifiedIdentity) -> Box<dyn PlayListener>` closure
/// works as a `Gameplay`.
pub trait Gameplay: Send + Sync + 'static {
    fn promote_to_play(&self, session: PlaySession, identity: VerifiedIdentity)
    -> Box<dyn PlayListener>;
}

impl<F> Gameplay for F
where
    F: Fn(PlaySession, VerifiedIdentity) -> Box<dyn PlayListener> + Send + Sync + 'static,
{
    fn promote_to_play(
        &self,
        session: PlaySession,
        identity: VerifiedIdentity,
    ) -> Box<dyn PlayListener> {
        self(session, identity)
    }
}

/// What gameplay may do with a promoted connection.
///
/// Cheap to clone and safe to keep after the connection ends; every call
/// on a closed session is a no-op or an error. Do not call these from
/// inside a [`PlayListener`] callback; use the callback's
/// [`PlayOutbound`](drawbridge_session::PlayOutbound) instead.
#[derive(Clone)]
pub struct PlaySession {
    handle: Arc<SessionHandle>,
}

impl PlaySession {
    pub(crate) fn new(handle: Arc<SessionHandle>) -> Self {
        Self { handle }
    }

    pub fn id(&self) -> ConnectionId {
        self.handle.id()
    }

    /// Queues a packet for the client.
    pub fn send(&self, packet: &RawPacket) -> Result<(), SessionError> {
        self.handle.with_session(|s| s.send_play(packet))
    }

    /// Closes the connection. Returns `false` if it was already closed.
    pub fn disconnect(&self, reason: impl Into<DisconnectReason>) -> bool {
        let reason = reason.into();
        self.handle.with_session(|s| s.close(reason))
    }

    pub fn is_closed(&self) -> bool {
        self.handle.lock().phase() == Phase::Closed
    }
}

impl std::fmt::Debug for PlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaySession").field("id", &self.id()).finish()
    }
}
