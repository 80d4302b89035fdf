//! Protocol phases and the transitions allowed between them.
//!
//! ```text
//! HANDSHAKE ──→ STATUS
//!     │
//!     └──────→ LOGIN ──→ KEY_EXCHANGE ──→ AUTHENTICATING ──→ READY ──→ PLAY
//!                │                              ↑
//!                └──────────────────────────────┘   (unverified mode)
//!
//! any phase except CLOSED ──→ CLOSED
//! ```

use std::fmt;

/// The stage a connection is in. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for the single intent-declaring packet.
    Handshake,
    /// Server list ping: one metadata request and a latency ping.
    Status,
    /// Waiting for the client's claimed name.
    Login,
    /// Public key and nonce sent; waiting for the encrypted reply.
    KeyExchange,
    /// Identity lookup in flight. No client packet is legal here.
    Authenticating,
    /// Login finished; waiting for the tick to hand the connection over.
    Ready,
    /// Owned by the gameplay subsystem.
    Play,
    /// Terminal.
    Closed,
}

impl Phase {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Handshake, Status)
            | (Handshake, Login)
            | (Login, KeyExchange)
            | (Login, Authenticating)
            | (KeyExchange, Authenticating)
            | (Authenticating, Ready)
            | (Ready, Play) => true,
            _ => false,
        }
    }

    /// Phases in which the login timeout counter runs.
    pub fn is_pre_play(self) -> bool {
        !matches!(self, Phase::Play | Phase::Closed)
    }

    /// Phases in which the client understands a login disconnect packet.
    pub fn accepts_login_disconnect(self) -> bool {
        matches!(
            self,
            Phase::Login | Phase::KeyExchange | Phase::Authenticating
        )
    }

    /// The upper-case name used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Handshake => "HANDSHAKE",
            Phase::Status => "STATUS",
            Phase::Login => "LOGIN",
            Phase::KeyExchange => "KEY_EXCHANGE",
            Phase::Authenticating => "AUTHENTICATING",
            Phase::Ready => "READY",
            Phase::Play => "PLAY",
            Phase::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
