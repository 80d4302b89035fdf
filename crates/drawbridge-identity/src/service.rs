use std::net::IpAddr;

use crate::{VerificationError, VerifiedIdentity};

/// One identity lookup: who the client claims to be and the token that
/// ties the claim to its key exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub name: String,
    pub join_token: String,
    pub client_ip: Option<IpAddr>,
}

/// Converts a claimed name into a verified identity.
///
/// Implementations block on network I/O. The engine only ever calls
/// `verify` from a worker thread, so an implementation is free to take
/// as long as its own timeout allows.
///
/// # Example
///
/// ```rust
/// use drawbridge_identity::{
///     IdentityService, VerificationError, VerificationRequest, VerifiedIdentity,
/// };
///
/// /// Treats every name as verified. Only for local development.
/// struct TrustEveryone;
///
/// impl IdentityService for TrustEveryone {
///     fn verify(
///         &self,
///         request: &VerificationRequest,
///     ) -> Result<VerifiedIdentity, VerificationError> {
///         Ok(VerifiedIdentity::offline(&request.name))
///     }
/// }
/// ```
pub trait IdentityService: Send + Sync + 'static {
    /// Looks up the identity for `request`.
    fn verify(&self, request: &VerificationRequest) -> Result<VerifiedIdentity, VerificationError>;
}
