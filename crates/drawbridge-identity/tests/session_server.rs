//! Tests the HTTP identity client against a local mock session service.

use std::net::{IpAddr, Ipv4Addr};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use drawbridge_identity::{
    IdentityService, SessionServerClient, VerificationError, VerificationRequest,
};
use tiny_http::{Response, Server};

// =========================================================================
// Helpers
// =========================================================================

const PROFILE: &str = r#"{
    "id": "069a79f444e94726a5befca90e38aaf5",
    "name": "Notch",
    "properties": [{"name": "textures", "value": "e30=", "signature": "c2ln"}]
}"#;

/// Serves exactly one request with `status` and `body`, returning the
/// base URL and a handle that yields the request's path and query.
fn mock_service(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
    let server = Server::http("127.0.0.1:0").expect("mock server should bind");
    let port = server
        .server_addr()
        .to_ip()
        .map(|a| a.port())
        .expect("ip listener");

    let handle = thread::spawn(move || {
        let request = server.recv().expect("one request");
        let url = request.url().to_owned();
        request
            .respond(Response::from_string(body).with_status_code(status))
            .expect("respond");
        url
    });
    (format!("http://127.0.0.1:{port}"), handle)
}

fn client(base: &str) -> SessionServerClient {
    SessionServerClient::new(base, Duration::from_secs(5))
}

fn request(name: &str) -> VerificationRequest {
    VerificationRequest {
        name: name.into(),
        join_token: "-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1".into(),
        client_ip: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn test_verify_ok_returns_profile() {
    let (base, seen) = mock_service(200, PROFILE);

    let identity = client(&base).verify(&request("Notch")).expect("verified");

    assert_eq!(identity.name, "Notch");
    assert_eq!(identity.id.simple().to_string(), "069a79f444e94726a5befca90e38aaf5");
    assert_eq!(identity.properties.len(), 1);

    let url = seen.join().expect("mock thread");
    assert!(url.starts_with("/session/minecraft/hasJoined?"), "{url}");
    assert!(url.contains("username=Notch"), "{url}");
    assert!(url.contains("serverId=-7c9d5b0044c130109a5d7b5fb5c317c02b4e28c1"), "{url}");
    assert!(!url.contains("ip="), "client ip is opt-in: {url}");
}

#[test]
fn test_verify_with_client_ip_sends_ip() {
    let (base, seen) = mock_service(200, PROFILE);

    client(&base)
        .with_client_ip(true)
        .verify(&request("Notch"))
        .expect("verified");

    let url = seen.join().expect("mock thread");
    assert!(url.contains("ip=10.0.0.7"), "{url}");
}

#[test]
fn test_verify_no_content_is_not_found() {
    let (base, _seen) = mock_service(204, "");
    assert_eq!(
        client(&base).verify(&request("Nobody")),
        Err(VerificationError::NotFound)
    );
}

#[test]
fn test_verify_too_many_requests_is_rate_limited() {
    let (base, _seen) = mock_service(429, "slow down");
    assert_eq!(
        client(&base).verify(&request("Notch")),
        Err(VerificationError::RateLimited)
    );
}

#[test]
fn test_verify_forbidden_is_invalid_credentials() {
    let (base, _seen) = mock_service(403, "");
    assert_eq!(
        client(&base).verify(&request("Notch")),
        Err(VerificationError::InvalidCredentials)
    );
}

#[test]
fn test_verify_gone_is_account_migrated() {
    let (base, _seen) = mock_service(410, "");
    assert_eq!(
        client(&base).verify(&request("Notch")),
        Err(VerificationError::AccountMigrated)
    );
}

#[test]
fn test_verify_server_error_is_unavailable() {
    let (base, _seen) = mock_service(500, "boom");
    assert!(matches!(
        client(&base).verify(&request("Notch")),
        Err(VerificationError::ServiceUnavailable(_))
    ));
}

#[test]
fn test_verify_malformed_body_is_unavailable() {
    let (base, _seen) = mock_service(200, "{not json");
    assert!(matches!(
        client(&base).verify(&request("Notch")),
        Err(VerificationError::ServiceUnavailable(msg)) if msg.contains("malformed")
    ));
}

#[test]
fn test_verify_unreachable_service_is_unavailable() {
    // Bind and drop to get a port with nothing listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let result = client(&format!("http://127.0.0.1:{port}")).verify(&request("Notch"));
    assert!(matches!(result, Err(VerificationError::ServiceUnavailable(_))));
}
