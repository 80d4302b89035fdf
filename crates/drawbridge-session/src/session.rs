//! The per-connection login state machine.
//!
//! A [`Session`] is sans-IO: bytes go in through [`Session::receive`],
//! framed output comes out through [`Session::take_outbound`], and time
//! advances through [`Session::tick`]. The caller owns the socket, the
//! locking, and the verification worker pool. That keeps every phase rule
//! testable without a runtime.
//!
//! ```text
//! HANDSHAKE ──► STATUS ──► (closed after reply)
//!     │
//!     └──► LOGIN ──► KEY_EXCHANGE ──► AUTHENTICATING ──► READY ──► PLAY
//!            │                                ▲
//!            └────────── offline mode ────────┘
//! ```

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio_util::codec::{Decoder, Encoder};

use drawbridge_identity::{VerificationError, VerificationRequest, VerifiedIdentity, join_token};
use drawbridge_protocol::cipher::KEY_LEN;
use drawbridge_protocol::{
    CipherError, Clientbound, DisconnectReason, EncryptionResponse, FrameCodec, Handshake,
    LoginStart, NextState, Phase, ProtocolError, Property, RawPacket, Serverbound,
    StatusPlayers, StatusResponse, StatusVersion, TextComponent,
};
use drawbridge_transport::ConnectionId;

use crate::config::LoginConfig;
use crate::crypto::{CryptoError, ServerKey};
use crate::error::{ErrorClass, SessionError};
use crate::listener::{PlayListener, PlayOutbound};
use crate::reason;

/// Length of the verify token sent in the encryption request.
pub const NONCE_LEN: usize = 4;

const MAX_NAME_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Shared server state
// ---------------------------------------------------------------------------

/// Server-wide state every session reads while handling packets.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<LoginConfig>,
    pub key: Arc<ServerKey>,
    online: Arc<AtomicUsize>,
}

impl ServerContext {
    pub fn new(config: LoginConfig, key: Arc<ServerKey>) -> Self {
        Self {
            config: Arc::new(config),
            key,
            online: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sessions currently in play, as reported in the status response.
    pub fn online_players(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }

    /// Counter owned by whoever promotes sessions into play.
    pub fn online_counter(&self) -> &Arc<AtomicUsize> {
        &self.online
    }
}

/// A verification the caller must run off the session lock and feed back
/// through [`Session::apply_verification`] with the same `stamp`.
#[derive(Debug, Clone)]
pub struct PendingVerification {
    pub connection: ConnectionId,
    pub stamp: u64,
    pub request: VerificationRequest,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Protocol state for one client connection.
pub struct Session {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    phase: Phase,
    codec: FrameCodec,
    inbound: BytesMut,
    outbound: BytesMut,
    nonce: Option<[u8; NONCE_LEN]>,
    session_key: Option<[u8; KEY_LEN]>,
    ticks: u64,
    claimed_name: Option<String>,
    identity: Option<VerifiedIdentity>,
    pending_stamp: Option<u64>,
    last_stamp: u64,
    close_reason: Option<DisconnectReason>,
    packets_processed: u64,
    listener: Option<Box<dyn PlayListener>>,
    held: VecDeque<RawPacket>,
}

impl Session {
    pub fn new(id: ConnectionId, peer: Option<SocketAddr>, config: &LoginConfig) -> Self {
        Self {
            id,
            peer,
            phase: Phase::Handshake,
            codec: FrameCodec::new(config.max_frame_size),
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            nonce: None,
            session_key: None,
            ticks: 0,
            claimed_name: None,
            identity: None,
            pending_stamp: None,
            last_stamp: 0,
            close_reason: None,
            packets_processed: 0,
            listener: None,
            held: VecDeque::new(),
        }
    }

    // ----- Introspection -----

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == Phase::Closed
    }

    /// The identity assigned at login completion. Set at most once.
    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        self.identity.as_ref()
    }

    pub fn claimed_name(&self) -> Option<&str> {
        self.claimed_name.as_deref()
    }

    pub fn close_reason(&self) -> Option<&DisconnectReason> {
        self.close_reason.as_ref()
    }

    /// Packets decoded and handled, including those delivered in play.
    pub fn packets_processed(&self) -> u64 {
        self.packets_processed
    }

    /// Ticks spent before play.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_encrypted(&self) -> bool {
        self.codec.is_encrypted()
    }

    pub fn compression_threshold(&self) -> i32 {
        self.codec.compression_threshold()
    }

    pub fn has_session_key(&self) -> bool {
        self.session_key.is_some()
    }

    /// Whether a verification result is still expected.
    pub fn is_awaiting_verification(&self) -> bool {
        self.pending_stamp.is_some()
    }

    // ----- Input -----

    /// Feeds bytes read from the transport.
    ///
    /// Every complete frame is decoded and handled in order. Returns a
    /// verification request when the key exchange completed in this batch.
    /// Any error closes the session; nothing after the offending frame is
    /// processed.
    pub fn receive(&mut self, data: &[u8], ctx: &ServerContext) -> Option<PendingVerification> {
        if self.is_closed() {
            return None;
        }
        self.inbound.extend_from_slice(data);

        let mut pending = None;
        while !self.is_closed() {
            let frame = match self.codec.decode(&mut self.inbound) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    self.fail(e.into());
                    break;
                }
            };
            match self.dispatch(frame, ctx) {
                Ok(Some(request)) => pending = Some(request),
                Ok(None) => {}
                Err(e) => self.fail(e),
            }
        }
        pending
    }

    fn dispatch(
        &mut self,
        frame: BytesMut,
        ctx: &ServerContext,
    ) -> Result<Option<PendingVerification>, SessionError> {
        match self.phase {
            Phase::Play => {
                let packet = RawPacket::parse(frame)?;
                self.packets_processed += 1;
                self.deliver_play(packet);
                return Ok(None);
            }
            // Gameplay has not taken over yet. Hold everything for replay.
            Phase::Ready => {
                self.held.push_back(RawPacket::parse(frame)?);
                return Ok(None);
            }
            _ => {}
        }

        let packet = Serverbound::decode(self.phase, &frame)?;
        self.packets_processed += 1;
        tracing::trace!(id = %self.id, phase = %self.phase, packet = packet.id(), "packet received");

        match packet {
            Serverbound::Handshake(handshake) => self.on_handshake(handshake, ctx)?,
            Serverbound::StatusRequest => self.on_status_request(ctx)?,
            Serverbound::StatusPing { payload } => self.on_status_ping(payload)?,
            Serverbound::LoginStart(login) => self.on_login_start(login, ctx)?,
            Serverbound::EncryptionResponse(response) => {
                return self.on_encryption_response(response, ctx).map(Some);
            }
        }
        Ok(None)
    }

    // ----- Phase handlers -----

    fn on_handshake(&mut self, handshake: Handshake, ctx: &ServerContext) -> Result<(), SessionError> {
        self.transition(handshake.next_state.phase())?;
        if handshake.next_state == NextState::Login
            && handshake.protocol_version != ctx.config.protocol_version
        {
            return Err(SessionError::VersionMismatch {
                client: handshake.protocol_version,
                server: ctx.config.protocol_version,
                version_name: ctx.config.version_name.clone(),
            });
        }
        Ok(())
    }

    fn on_status_request(&mut self, ctx: &ServerContext) -> Result<(), SessionError> {
        let status = StatusResponse {
            version: StatusVersion {
                name: ctx.config.version_name.clone(),
                protocol: ctx.config.protocol_version,
            },
            players: StatusPlayers {
                max: ctx.config.max_players,
                online: u32::try_from(ctx.online_players()).unwrap_or(u32::MAX),
                sample: Vec::new(),
            },
            description: TextComponent::new(ctx.config.motd.clone()),
        };
        let json = serde_json::to_string(&status).map_err(ProtocolError::from)?;
        self.send(&Clientbound::StatusResponse { json })?;
        self.close(DisconnectReason::new(reason::STATUS_ANSWERED));
        Ok(())
    }

    fn on_status_ping(&mut self, payload: i64) -> Result<(), SessionError> {
        self.send(&Clientbound::Pong { payload })?;
        self.close(DisconnectReason::new(reason::STATUS_ANSWERED));
        Ok(())
    }

    fn on_login_start(&mut self, login: LoginStart, ctx: &ServerContext) -> Result<(), SessionError> {
        if !is_valid_name(&login.name) {
            return Err(SessionError::InvalidName(login.name));
        }
        tracing::debug!(id = %self.id, name = %login.name, "login started");
        self.claimed_name = Some(login.name.clone());

        if ctx.config.online_mode {
            let nonce: [u8; NONCE_LEN] = rand::rng().random();
            self.send(&Clientbound::EncryptionRequest {
                server_id: String::new(),
                public_key: ctx.key.public_der().to_vec(),
                verify_token: nonce.to_vec(),
            })?;
            self.nonce = Some(nonce);
            self.transition(Phase::KeyExchange)
        } else {
            self.transition(Phase::Authenticating)?;
            self.complete_login(VerifiedIdentity::offline(&login.name), ctx)
        }
    }

    fn on_encryption_response(
        &mut self,
        response: EncryptionResponse,
        ctx: &ServerContext,
    ) -> Result<PendingVerification, SessionError> {
        let nonce = self.nonce.take().ok_or(CryptoError::MissingNonce)?;
        let echoed = ctx.key.decrypt(&response.verify_token)?;
        if echoed.as_slice() != nonce.as_slice() {
            return Err(CryptoError::NonceMismatch.into());
        }

        let secret = ctx.key.decrypt(&response.shared_secret)?;
        let key: [u8; KEY_LEN] = secret
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::InvalidKeyLength(secret.len()))?;
        // Everything after this frame, including bytes already buffered,
        // is ciphertext.
        self.codec.enable_encryption(&key)?;
        self.session_key = Some(key);
        self.transition(Phase::Authenticating)?;

        let name = self.claimed_name.clone().unwrap_or_default();
        self.last_stamp += 1;
        self.pending_stamp = Some(self.last_stamp);
        tracing::debug!(id = %self.id, %name, stamp = self.last_stamp, "key exchange complete, verifying");

        Ok(PendingVerification {
            connection: self.id,
            stamp: self.last_stamp,
            request: VerificationRequest {
                join_token: join_token("", &key, ctx.key.public_der()),
                name,
                client_ip: self.peer.map(|addr| addr.ip()),
            },
        })
    }

    // ----- Verification -----

    /// Applies the result of a verification started by
    /// [`receive`](Self::receive).
    ///
    /// Returns `false` when the result is stale: the session closed, or the
    /// stamp does not match the outstanding request. Stale results are
    /// dropped without touching the session.
    pub fn apply_verification(
        &mut self,
        stamp: u64,
        result: Result<VerifiedIdentity, VerificationError>,
        ctx: &ServerContext,
    ) -> bool {
        if self.is_closed() || self.pending_stamp != Some(stamp) {
            tracing::debug!(id = %self.id, stamp, "discarding stale verification result");
            return false;
        }
        self.pending_stamp = None;

        let identity = match result {
            Ok(identity) => identity,
            Err(VerificationError::NotFound) if ctx.config.allow_offline_fallback => {
                let name = self.claimed_name.clone().unwrap_or_default();
                tracing::info!(id = %self.id, %name, "profile not found, using offline identity");
                VerifiedIdentity::offline(&name)
            }
            Err(e) => {
                self.fail(e.into());
                return true;
            }
        };
        if let Err(e) = self.complete_login(identity, ctx) {
            self.fail(e);
        }
        true
    }

    fn complete_login(
        &mut self,
        identity: VerifiedIdentity,
        ctx: &ServerContext,
    ) -> Result<(), SessionError> {
        if self.identity.is_some() {
            return Err(SessionError::IdentityAlreadyAssigned);
        }

        let threshold = ctx.config.compression_threshold;
        if threshold >= 0 {
            // The announcement itself goes out uncompressed.
            self.send(&Clientbound::SetCompression { threshold })?;
            self.codec.enable_compression(threshold);
        }
        self.send(&Clientbound::LoginSuccess {
            uuid: identity.id.as_u128(),
            name: identity.name.clone(),
            properties: identity
                .properties
                .iter()
                .map(|p| Property {
                    name: p.name.clone(),
                    value: p.value.clone(),
                    signature: p.signature.clone(),
                })
                .collect(),
        })?;

        tracing::info!(
            id = %self.id,
            name = %identity.name,
            uuid = %identity.id,
            encrypted = self.codec.is_encrypted(),
            "login complete"
        );
        self.identity = Some(identity);
        self.transition(Phase::Ready)
    }

    // ----- Time -----

    /// Advances the login timer by one tick. Returns `true` if this tick
    /// closed the session.
    pub fn tick(&mut self, ctx: &ServerContext) -> bool {
        if !self.phase.is_pre_play() {
            return false;
        }
        self.ticks += 1;
        if self.ticks >= ctx.config.login_timeout() {
            self.fail(SessionError::TimedOut { ticks: self.ticks });
            return true;
        }
        false
    }

    // ----- Play -----

    /// Hands the session to gameplay. Packets held since login completed
    /// are replayed to `listener` in arrival order.
    ///
    /// Fails if the session is not in [`Phase::Ready`]. If it closed in the
    /// meantime, `listener` still receives `on_close` so gameplay can clean
    /// up whatever it created for the player.
    pub fn enter_play(&mut self, mut listener: Box<dyn PlayListener>) -> Result<(), SessionError> {
        if let Err(e) = self.transition(Phase::Play) {
            if let Some(reason) = self.close_reason.clone() {
                let mut out = PlayOutbound::new(&mut self.codec, &mut self.outbound, true);
                listener.on_close(&reason, &mut out);
            }
            return Err(e);
        }
        self.listener = Some(listener);

        while self.phase == Phase::Play {
            let Some(packet) = self.held.pop_front() else {
                break;
            };
            self.packets_processed += 1;
            self.deliver_play(packet);
        }
        Ok(())
    }

    fn deliver_play(&mut self, packet: RawPacket) {
        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        let mut out = PlayOutbound::new(&mut self.codec, &mut self.outbound, false);
        listener.on_packet(packet, &mut out);
        if let Some(reason) = out.take_disconnect() {
            self.close(reason);
        }
    }

    /// Queues a gameplay packet. Allowed from the moment login succeeds,
    /// so gameplay can greet the player while it is being promoted.
    pub fn send_play(&mut self, packet: &RawPacket) -> Result<(), SessionError> {
        if !matches!(self.phase, Phase::Ready | Phase::Play) {
            return Err(SessionError::WrongPhase {
                expected: Phase::Play,
                actual: self.phase,
            });
        }
        self.codec.encode(packet.encode(), &mut self.outbound)?;
        Ok(())
    }

    // ----- Output -----

    fn send(&mut self, packet: &Clientbound) -> Result<(), SessionError> {
        let payload = packet.encode()?;
        self.codec.encode(payload, &mut self.outbound)?;
        Ok(())
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Takes everything queued so far, in enqueue order.
    pub fn take_outbound(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            None
        } else {
            Some(self.outbound.split().freeze())
        }
    }

    /// Puts bytes that could not be written back in front of the queue.
    pub fn requeue_front(&mut self, unsent: Bytes) {
        if unsent.is_empty() {
            return;
        }
        let mut merged = BytesMut::with_capacity(unsent.len() + self.outbound.len());
        merged.extend_from_slice(&unsent);
        merged.extend_from_slice(&self.outbound);
        self.outbound = merged;
    }

    // ----- Closing -----

    /// Ends the session with an error, logging it by class.
    pub fn fail(&mut self, err: SessionError) {
        if self.is_closed() {
            return;
        }
        match err.class() {
            ErrorClass::Crypto => tracing::warn!(
                target: "drawbridge::security",
                id = %self.id,
                peer = ?self.peer,
                phase = %self.phase,
                error = %err,
                "key exchange failure"
            ),
            ErrorClass::Framing | ErrorClass::Sequencing => {
                tracing::info!(id = %self.id, phase = %self.phase, error = %err, "protocol violation");
            }
            ErrorClass::Transport => {
                tracing::debug!(id = %self.id, phase = %self.phase, error = %err, "transport failed");
            }
            ErrorClass::Verification | ErrorClass::Rejected | ErrorClass::Timeout => {
                tracing::info!(id = %self.id, phase = %self.phase, error = %err, "login refused");
            }
        }
        self.close(err.disconnect_reason());
    }

    /// Closes the session. Idempotent: returns `false` if it was already
    /// closed, and the first reason wins.
    ///
    /// A login disconnect packet is queued only in the phases where the
    /// client understands one. In play the listener hears the reason and
    /// may queue its own farewell.
    pub fn close(&mut self, reason: DisconnectReason) -> bool {
        if self.is_closed() {
            return false;
        }
        let previous = self.phase;

        if previous.accepts_login_disconnect() {
            let packet = Clientbound::LoginDisconnect {
                reason: reason.clone(),
            };
            if let Err(e) = self.send(&packet) {
                tracing::debug!(id = %self.id, error = %e, "could not queue disconnect packet");
            }
        }
        if let Some(mut listener) = self.listener.take() {
            let mut out = PlayOutbound::new(&mut self.codec, &mut self.outbound, true);
            listener.on_close(&reason, &mut out);
        }

        tracing::info!(id = %self.id, phase = %previous, %reason, "session closed");
        self.phase = Phase::Closed;
        self.close_reason = Some(reason);
        self.inbound.clear();
        self.held.clear();
        self.nonce = None;
        self.pending_stamp = None;
        true
    }

    fn transition(&mut self, next: Phase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(next) {
            return Err(SessionError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(id = %self.id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("phase", &self.phase)
            .field("claimed_name", &self.claimed_name)
            .field("ticks", &self.ticks)
            .field("close_reason", &self.close_reason)
            .finish_non_exhaustive()
    }
}

/// 1 to 16 characters from `[A-Za-z0-9_]`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
