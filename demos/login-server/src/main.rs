use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use drawbridge::logging;
use drawbridge::prelude::*;
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// Sent once on arrival; the body is the player's name.
const WELCOME: i32 = 0x01;
/// Echoed straight back.
const PING: i32 = 0x02;
/// Asks the server to end the session.
const QUIT: i32 = 0x03;

/// Who is in the lobby right now.
#[derive(Clone, Default)]
struct Lobby {
    players: Arc<Mutex<HashMap<ConnectionId, String>>>,
}

impl Lobby {
    fn len(&self) -> usize {
        self.players.lock().len()
    }
}

impl Gameplay for Lobby {
    fn promote_to_play(&self, session: PlaySession, identity: VerifiedIdentity) -> Box<dyn PlayListener> {
        tracing::info!(id = %session.id(), name = %identity.name, uuid = %identity.id, "player joined");
        self.players.lock().insert(session.id(), identity.name.clone());
        let welcome = RawPacket::new(WELCOME, Bytes::from(identity.name.clone().into_bytes()));
        if let Err(err) = session.send(&welcome) {
            tracing::warn!(id = %session.id(), error = %err, "welcome not sent");
        }
        Box::new(Member {
            id: session.id(),
            name: identity.name,
            lobby: self.clone(),
        })
    }
}

struct Member {
    id: ConnectionId,
    name: String,
    lobby: Lobby,
}

impl PlayListener for Member {
    fn on_packet(&mut self, packet: RawPacket, out: &mut PlayOutbound<'_>) {
        match packet.id {
            PING => {
                if let Err(err) = out.send(&packet) {
                    tracing::warn!(id = %self.id, error = %err, "ping reply failed");
                }
            }
            QUIT => out.disconnect("Goodbye"),
            other => tracing::debug!(id = %self.id, packet = other, len = packet.body.len(), "ignored"),
        }
    }

    fn on_close(&mut self, reason: &DisconnectReason, _out: &mut PlayOutbound<'_>) {
        self.lobby.players.lock().remove(&self.id);
        tracing::info!(id = %self.id, name = %self.name, reason = reason.text(), "player left");
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(logging::DEFAULT_FILTER);

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(&path)?,
        None => ServerConfig::default(),
    };
    tracing::info!(bind = %config.bind, online = config.login.online_mode, "starting login server");

    let lobby = Lobby::default();
    let server = DrawbridgeServerBuilder::new()
        .config(config)
        .build(lobby.clone())
        .await?;

    let handle = server.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(players = lobby.len(), "interrupt received, shutting down");
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
