//! Classified outcomes of a failed identity lookup.

/// Why an identity could not be verified.
///
/// Everything except [`NotFound`](Self::NotFound) ends the login with the
/// variant's [`user_message`](Self::user_message). `NotFound` may instead
/// fall back to a synthesized identity when the server allows unverified
/// play.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The service has no record of this client joining with that token.
    #[error("profile not found")]
    NotFound,

    /// The service could not be reached or answered with garbage.
    #[error("identity service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service is throttling this server.
    #[error("identity service rate limited the request")]
    RateLimited,

    /// The service rejected the client's session.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The account has moved and must log in under its new identity.
    #[error("account migrated")]
    AccountMigrated,
}

impl VerificationError {
    /// The disconnect text shown to the player.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "Failed to verify username!",
            Self::ServiceUnavailable(_) => {
                "Authentication servers are down. Please try again later, sorry!"
            }
            Self::RateLimited => "Too many login attempts, please wait and try again",
            Self::InvalidCredentials => "Invalid session (try restarting your game)",
            Self::AccountMigrated => {
                "This account has been migrated, please log in with your new account"
            }
        }
    }
}
