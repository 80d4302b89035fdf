//! Identity verification for Drawbridge.
//!
//! A client that completes the key exchange claims a name. This crate
//! turns that claim into a [`VerifiedIdentity`] by asking an external
//! session service whether a client with that name announced a join under
//! the same [`join_token`], or synthesizes one with
//! [`VerifiedIdentity::offline`] for unverified play.
//!
//! The [`IdentityService`] trait is the seam: [`SessionServerClient`] is
//! the HTTP implementation, tests substitute their own.

mod error;
mod identity;
mod service;
mod session_server;
mod token;

pub use error::VerificationError;
pub use identity::{ProfileProperty, VerifiedIdentity, offline_uuid};
pub use service::{IdentityService, VerificationRequest};
pub use session_server::{DEFAULT_SESSION_SERVER, SessionServerClient, classify_status};
pub use token::{join_token, signed_hex_digest};
