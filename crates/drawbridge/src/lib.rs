//! # Drawbridge
//!
//! The connection and login engine of a block-game server.
//!
//! Drawbridge accepts raw client connections, speaks the framed handshake,
//! status and login protocol, runs the RSA/AES key exchange, verifies the
//! player's identity against a session service, and hands the finished
//! connection to your gameplay code on the next game tick. Gameplay
//! implements one trait, [`Gameplay`], and receives packets through a
//! [`PlayListener`](drawbridge_session::PlayListener).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use drawbridge::prelude::*;
//!
//! struct Echo(PlaySession);
//!
//! impl PlayListener for Echo {
//!     fn on_packet(&mut self, packet: RawPacket, out: &mut PlayOutbound<'_>) {
//!         let _ = out.send(&packet);
//!     }
//! }
//!
//! # async fn start() -> Result<(), DrawbridgeError> {
//! let server = DrawbridgeServerBuilder::new()
//!     .bind("0.0.0.0:25565")
//!     .build(|session: PlaySession, _identity: VerifiedIdentity| {
//!         Box::new(Echo(session)) as Box<dyn PlayListener>
//!     })
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod connection;
mod error;
mod gameplay;
mod handler;
pub mod logging;
mod registry;
mod server;
mod verifier;

pub use config::ServerConfig;
pub use error::DrawbridgeError;
pub use gameplay::{Gameplay, PlaySession};
pub use registry::{Registry, SessionSnapshot};
pub use server::{DrawbridgeServer, DrawbridgeServerBuilder, ServerHandle};

pub use drawbridge_identity as identity;
pub use drawbridge_protocol as protocol;
pub use drawbridge_session as session;
pub use drawbridge_tick as tick;
pub use drawbridge_transport as transport;

/// The types most servers need.
pub mod prelude {
    pub use crate::{
        DrawbridgeError, DrawbridgeServer, DrawbridgeServerBuilder, Gameplay, PlaySession,
        ServerConfig, ServerHandle,
    };
    pub use drawbridge_identity::{IdentityService, VerifiedIdentity};
    pub use drawbridge_protocol::{DisconnectReason, RawPacket};
    pub use drawbridge_session::{LoginConfig, PlayListener, PlayOutbound};
    pub use drawbridge_transport::ConnectionId;
}
