//! Login state machine for Drawbridge.
//!
//! This crate turns a byte stream into a logged-in player without doing
//! any I/O itself:
//!
//! - [`Session`] owns the frame codec and the phase for one connection.
//!   Bytes go in through [`Session::receive`], framed output comes out of
//!   [`Session::take_outbound`].
//! - [`ServerContext`] carries the [`LoginConfig`] and [`ServerKey`] every
//!   session shares.
//! - When the key exchange completes, `receive` hands back a
//!   [`PendingVerification`]. The caller runs it against an
//!   [`IdentityService`](drawbridge_identity::IdentityService) and feeds
//!   the result to [`Session::apply_verification`].
//! - Once the session reaches [`Phase::Ready`](drawbridge_protocol::Phase),
//!   [`Session::enter_play`] installs a [`PlayListener`] that receives
//!   every later packet.

mod config;
mod crypto;
mod error;
mod listener;
pub mod reason;
mod session;

pub use config::LoginConfig;
pub use crypto::{CryptoError, ServerKey};
pub use error::{ErrorClass, SessionError};
pub use listener::{PlayListener, PlayOutbound};
pub use session::{NONCE_LEN, PendingVerification, ServerContext, Session, is_valid_name};
