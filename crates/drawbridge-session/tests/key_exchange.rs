//! Drives a session through the online login path with a scripted client.

use std::sync::{Arc, OnceLock};

use bytes::{Bytes, BytesMut};
use rsa::pkcs8::DecodePublicKey;
use rsa::rand_core::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use tokio_util::codec::{Decoder, Encoder};

use drawbridge_identity::{
    ProfileProperty, VerificationError, VerifiedIdentity, join_token, offline_uuid,
};
use drawbridge_protocol::{
    Clientbound, EncryptionResponse, FrameCodec, Handshake, LoginStart, NextState, Phase,
    RawPacket, Serverbound,
};
use drawbridge_session::{LoginConfig, PendingVerification, ServerContext, ServerKey, Session};
use drawbridge_transport::ConnectionId;

// -- Helpers --

const SECRET: [u8; 16] = *b"0123456789abcdef";

fn key() -> Arc<ServerKey> {
    static KEY: OnceLock<Arc<ServerKey>> = OnceLock::new();
    KEY.get_or_init(|| Arc::new(ServerKey::generate(1024).expect("keygen")))
        .clone()
}

fn context(config: LoginConfig) -> ServerContext {
    ServerContext::new(config, key())
}

/// The client half of the login, framing with the same codec the server uses.
struct Client {
    codec: FrameCodec,
    inbox: BytesMut,
}

impl Client {
    fn new() -> Self {
        Self {
            codec: FrameCodec::default(),
            inbox: BytesMut::new(),
        }
    }

    fn frame(&mut self, packet: Serverbound) -> Vec<u8> {
        let mut out = BytesMut::new();
        self.codec.encode(packet.encode(), &mut out).unwrap();
        out.to_vec()
    }

    fn frame_raw(&mut self, packet: RawPacket) -> Vec<u8> {
        let mut out = BytesMut::new();
        self.codec.encode(packet.encode(), &mut out).unwrap();
        out.to_vec()
    }

    fn hello(&mut self, name: &str) -> Vec<u8> {
        let mut bytes = self.frame(Serverbound::Handshake(Handshake {
            protocol_version: 765,
            server_address: "play.example.net".into(),
            server_port: 25565,
            next_state: NextState::Login,
        }));
        bytes.extend(self.frame(Serverbound::LoginStart(LoginStart { name: name.into() })));
        bytes
    }

    /// Reads every complete packet the server has queued. Applies a
    /// compression announcement as soon as it is seen, like a real client.
    fn read(&mut self, session: &mut Session) -> Vec<Clientbound> {
        if let Some(bytes) = session.take_outbound() {
            self.inbox.extend_from_slice(&bytes);
        }
        let mut packets = Vec::new();
        while let Some(frame) = self.codec.decode(&mut self.inbox).unwrap() {
            let packet = Clientbound::decode(Phase::Login, &frame).unwrap();
            if let Clientbound::SetCompression { threshold } = packet {
                self.codec.enable_compression(threshold);
            }
            packets.push(packet);
        }
        packets
    }

    /// Answers an encryption request. Returns the framed reply and switches
    /// this client to the encrypted stream.
    fn answer(&mut self, request: &Clientbound, echo: Option<&[u8]>) -> Vec<u8> {
        let Clientbound::EncryptionRequest {
            public_key,
            verify_token,
            ..
        } = request
        else {
            panic!("expected encryption request, got {request:?}");
        };
        let public = RsaPublicKey::from_public_key_der(public_key).unwrap();
        let echoed = echo.unwrap_or(verify_token);
        let reply = self.frame(Serverbound::EncryptionResponse(EncryptionResponse {
            shared_secret: public.encrypt(&mut OsRng, Pkcs1v15Encrypt, &SECRET).unwrap(),
            verify_token: public.encrypt(&mut OsRng, Pkcs1v15Encrypt, echoed).unwrap(),
        }));
        self.codec.enable_encryption(&SECRET).unwrap();
        reply
    }
}

/// Runs the login up to the verification request.
fn reach_verification(ctx: &ServerContext, name: &str) -> (Session, Client, PendingVerification) {
    let mut session = Session::new(ConnectionId::new(7), None, &ctx.config);
    let mut client = Client::new();

    assert!(session.receive(&client.hello(name), ctx).is_none());
    let request = client.read(&mut session).remove(0);
    assert_eq!(session.phase(), Phase::KeyExchange);

    let reply = client.answer(&request, None);
    let pending = session.receive(&reply, ctx).expect("verification request");
    assert_eq!(session.phase(), Phase::Authenticating);
    assert!(session.is_encrypted());
    (session, client, pending)
}

fn verified(name: &str) -> VerifiedIdentity {
    VerifiedIdentity {
        id: offline_uuid("someone else entirely"),
        name: name.to_string(),
        properties: vec![ProfileProperty {
            name: "textures".into(),
            value: "e30=".into(),
            signature: Some("c2ln".into()),
        }],
    }
}

// ===== online login =====

#[test]
fn test_online_login_verified_reaches_ready() {
    let ctx = context(LoginConfig::default());
    let (mut session, mut client, pending) = reach_verification(&ctx, "Alex");

    assert_eq!(pending.connection, ConnectionId::new(7));
    assert_eq!(pending.request.name, "Alex");
    assert_eq!(
        pending.request.join_token,
        join_token("", &SECRET, ctx.key.public_der())
    );

    assert!(session.apply_verification(pending.stamp, Ok(verified("Alex")), &ctx));
    assert_eq!(session.phase(), Phase::Ready);

    let packets = client.read(&mut session);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0], Clientbound::SetCompression { threshold: 256 });
    match &packets[1] {
        Clientbound::LoginSuccess {
            uuid,
            name,
            properties,
        } => {
            assert_eq!(*uuid, verified("Alex").id.as_u128());
            assert_eq!(name, "Alex");
            assert_eq!(properties.len(), 1);
            assert_eq!(properties[0].signature.as_deref(), Some("c2ln"));
        }
        other => panic!("expected login success, got {other:?}"),
    }
    assert_eq!(session.identity(), Some(&verified("Alex")));
}

#[test]
fn test_online_login_zero_threshold_compresses_success() {
    let ctx = context(LoginConfig {
        compression_threshold: 0,
        ..LoginConfig::default()
    });
    let (mut session, mut client, pending) = reach_verification(&ctx, "Alex");
    session.apply_verification(pending.stamp, Ok(verified("Alex")), &ctx);

    let packets = client.read(&mut session);
    assert!(matches!(packets[1], Clientbound::LoginSuccess { .. }));
    assert_eq!(session.compression_threshold(), 0);
}

#[test]
fn test_online_login_compression_disabled_skips_announcement() {
    let ctx = context(LoginConfig {
        compression_threshold: -1,
        ..LoginConfig::default()
    });
    let (mut session, mut client, pending) = reach_verification(&ctx, "Alex");
    session.apply_verification(pending.stamp, Ok(verified("Alex")), &ctx);

    let packets = client.read(&mut session);
    assert_eq!(packets.len(), 1);
    assert!(matches!(packets[0], Clientbound::LoginSuccess { .. }));
}

#[test]
fn test_online_login_nonce_off_by_one_bit_closes_unencrypted() {
    let ctx = context(LoginConfig::default());
    let mut session = Session::new(ConnectionId::new(8), None, &ctx.config);
    let mut client = Client::new();

    session.receive(&client.hello("Alex"), &ctx);
    assert_eq!(session.packets_processed(), 2);
    let request = client.read(&mut session).remove(0);
    let Clientbound::EncryptionRequest { verify_token, .. } = &request else {
        panic!("expected encryption request, got {request:?}");
    };
    let mut echoed = verify_token.clone();
    echoed[0] ^= 0x01;

    // A follow-up framed in the clear, so the server could still read it
    // if it kept going, arrives in the same read as the reply.
    let trailing = client.frame(Serverbound::LoginStart(LoginStart { name: "Alex".into() }));
    let mut batch = client.answer(&request, Some(&echoed));
    batch.extend(trailing);
    assert!(session.receive(&batch, &ctx).is_none());

    assert!(session.is_closed());
    assert!(!session.is_encrypted());
    assert!(!session.has_session_key());
    assert_eq!(
        session.close_reason().unwrap().text(),
        "Encryption handshake failed"
    );
    // Only the rejected reply was handled; the frame behind it was not.
    assert_eq!(session.packets_processed(), 3);

    // The disconnect went out before any cipher was installed.
    let mut plain = FrameCodec::default();
    let mut bytes = BytesMut::from(&session.take_outbound().unwrap()[..]);
    let frame = plain.decode(&mut bytes).unwrap().unwrap();
    assert!(matches!(
        Clientbound::decode(Phase::Login, &frame).unwrap(),
        Clientbound::LoginDisconnect { .. }
    ));
    assert!(plain.decode(&mut bytes).unwrap().is_none());
}

#[test]
fn test_online_login_rejected_disconnect_is_encrypted() {
    let ctx = context(LoginConfig::default());
    let (mut session, mut client, pending) = reach_verification(&ctx, "Alex");

    assert!(session.apply_verification(
        pending.stamp,
        Err(VerificationError::InvalidCredentials),
        &ctx
    ));
    assert!(session.is_closed());
    assert!(session.identity().is_none());

    match &client.read(&mut session)[..] {
        [Clientbound::LoginDisconnect { reason }] => {
            assert_eq!(reason.text(), "Invalid session (try restarting your game)");
        }
        other => panic!("expected one disconnect, got {other:?}"),
    }
}

#[test]
fn test_online_login_not_found_without_fallback_disconnects() {
    let ctx = context(LoginConfig::default());
    let (mut session, _client, pending) = reach_verification(&ctx, "Alex");

    session.apply_verification(pending.stamp, Err(VerificationError::NotFound), &ctx);
    assert!(session.is_closed());
    assert_eq!(
        session.close_reason().unwrap().text(),
        "Failed to verify username!"
    );
}

#[test]
fn test_online_login_not_found_with_fallback_uses_offline_identity() {
    let ctx = context(LoginConfig {
        allow_offline_fallback: true,
        ..LoginConfig::default()
    });
    let (mut session, _client, pending) = reach_verification(&ctx, "Alex");

    session.apply_verification(pending.stamp, Err(VerificationError::NotFound), &ctx);
    assert_eq!(session.phase(), Phase::Ready);
    assert_eq!(session.identity().unwrap().id, offline_uuid("Alex"));
}

#[test]
fn test_online_login_late_result_after_close_is_discarded() {
    let ctx = context(LoginConfig::default());
    let (mut session, _client, pending) = reach_verification(&ctx, "Alex");

    session.close("gone".into());
    assert!(!session.apply_verification(pending.stamp, Ok(verified("Alex")), &ctx));
    assert!(session.identity().is_none());
    assert_eq!(session.close_reason().unwrap().text(), "gone");
}

#[test]
fn test_online_login_wrong_stamp_is_discarded() {
    let ctx = context(LoginConfig::default());
    let (mut session, _client, pending) = reach_verification(&ctx, "Alex");

    assert!(!session.apply_verification(pending.stamp + 1, Ok(verified("Alex")), &ctx));
    assert_eq!(session.phase(), Phase::Authenticating);
    assert!(session.apply_verification(pending.stamp, Ok(verified("Alex")), &ctx));
    assert_eq!(session.phase(), Phase::Ready);
}

#[test]
fn test_online_login_packet_while_authenticating_is_unexpected() {
    let ctx = context(LoginConfig::default());
    let (mut session, mut client, _pending) = reach_verification(&ctx, "Alex");

    // Decrypted correctly, this is a well-formed frame with an id that
    // means nothing while authenticating.
    let stray = client.frame_raw(RawPacket::new(0x05, Bytes::from_static(b"hi")));
    session.receive(&stray, &ctx);
    assert!(session.is_closed());
    assert_eq!(session.close_reason().unwrap().text(), "Unexpected packet");
}

#[test]
fn test_online_login_encryption_response_before_request_is_rejected() {
    let ctx = context(LoginConfig::default());
    let mut session = Session::new(ConnectionId::new(9), None, &ctx.config);
    let mut client = Client::new();

    let mut bytes = client.frame(Serverbound::Handshake(Handshake {
        protocol_version: 765,
        server_address: "localhost".into(),
        server_port: 25565,
        next_state: NextState::Login,
    }));
    bytes.extend(client.frame(Serverbound::EncryptionResponse(EncryptionResponse {
        shared_secret: vec![1; 128],
        verify_token: vec![2; 128],
    })));
    session.receive(&bytes, &ctx);
    assert!(session.is_closed());
    assert_eq!(session.close_reason().unwrap().text(), "Unexpected packet");
}
