//! HTTP client for a `hasJoined`-style session service.

use std::time::Duration;

use crate::{IdentityService, VerificationError, VerificationRequest, VerifiedIdentity};

/// The public session service.
pub const DEFAULT_SESSION_SERVER: &str = "https://sessionserver.mojang.com";

/// Blocking client for the session service's join check.
///
/// Issues `GET {base}/session/minecraft/hasJoined?username=..&serverId=..`
/// and classifies the answer.
pub struct SessionServerClient {
    agent: ureq::Agent,
    base_url: String,
    send_client_ip: bool,
}

impl SessionServerClient {
    /// Creates a client for the service at `base_url` with a per-request
    /// timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            send_client_ip: false,
        }
    }

    /// Also send the client's address, so the service can refuse logins
    /// that arrive through a different address than the client used.
    pub fn with_client_ip(mut self, enabled: bool) -> Self {
        self.send_client_ip = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl IdentityService for SessionServerClient {
    fn verify(&self, request: &VerificationRequest) -> Result<VerifiedIdentity, VerificationError> {
        let url = format!("{}/session/minecraft/hasJoined", self.base_url);
        let mut call = self
            .agent
            .get(&url)
            .query("username", &request.name)
            .query("serverId", &request.join_token);
        if self.send_client_ip {
            if let Some(ip) = request.client_ip {
                call = call.query("ip", &ip.to_string());
            }
        }

        tracing::debug!(name = %request.name, "querying session service");
        match call.call() {
            Ok(response) if response.status() == 204 => Err(VerificationError::NotFound),
            Ok(response) => response.into_json::<VerifiedIdentity>().map_err(|e| {
                VerificationError::ServiceUnavailable(format!("malformed profile: {e}"))
            }),
            Err(ureq::Error::Status(code, _)) => Err(classify_status(code)),
            Err(ureq::Error::Transport(t)) => {
                Err(VerificationError::ServiceUnavailable(t.to_string()))
            }
        }
    }
}

/// Maps a non-success HTTP status to a verification failure.
pub fn classify_status(code: u16) -> VerificationError {
    match code {
        204 | 404 => VerificationError::NotFound,
        401 | 403 => VerificationError::InvalidCredentials,
        410 => VerificationError::AccountMigrated,
        429 => VerificationError::RateLimited,
        other => VerificationError::ServiceUnavailable(format!("HTTP {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_known_codes() {
        assert_eq!(classify_status(404), VerificationError::NotFound);
        assert_eq!(classify_status(403), VerificationError::InvalidCredentials);
        assert_eq!(classify_status(410), VerificationError::AccountMigrated);
        assert_eq!(classify_status(429), VerificationError::RateLimited);
    }

    #[test]
    fn test_classify_status_server_error_is_unavailable() {
        assert!(matches!(
            classify_status(503),
            VerificationError::ServiceUnavailable(msg) if msg == "HTTP 503"
        ));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client = SessionServerClient::new("http://localhost:1234/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:1234");
    }
}
