//! Login behaviour settings.

use serde::{Deserialize, Serialize};

use drawbridge_protocol::{COMPRESSION_DISABLED, DEFAULT_MAX_FRAME_SIZE, FrameCodec};

/// Configuration consumed by every [`Session`](crate::Session).
///
/// All fields have defaults, so a TOML table only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Verify identities through the key exchange and identity service.
    /// When off, identities are synthesized from the claimed name.
    pub online_mode: bool,
    /// In online mode, accept a "not found" verification result by
    /// synthesizing an identity instead of disconnecting.
    pub allow_offline_fallback: bool,
    /// Payloads of at least this many bytes are compressed. `-1` disables
    /// compression.
    pub compression_threshold: i32,
    /// Ceiling on a single frame's declared length.
    pub max_frame_size: usize,
    /// Ticks a connection may spend before reaching play.
    pub login_timeout_ticks: u32,
    /// Multiplier applied to `login_timeout_ticks`.
    pub game_speed: f64,
    /// The one client protocol version accepted for login.
    pub protocol_version: i32,
    /// Human-readable version shown in the server list and in
    /// version-mismatch disconnects.
    pub version_name: String,
    /// Server list description.
    pub motd: String,
    /// Advertised player cap.
    pub max_players: u32,
    /// RSA modulus size for the key exchange.
    pub key_bits: usize,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            online_mode: true,
            allow_offline_fallback: false,
            compression_threshold: 256,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            login_timeout_ticks: 600,
            game_speed: 1.0,
            protocol_version: 765,
            version_name: "1.20.4".to_string(),
            motd: "A Drawbridge server".to_string(),
            max_players: 20,
            key_bits: 1024,
        }
    }
}

impl LoginConfig {
    /// Effective timeout in ticks after scaling by the game speed. Never
    /// less than one tick.
    pub fn login_timeout(&self) -> u64 {
        let scaled = (f64::from(self.login_timeout_ticks) * self.game_speed).ceil();
        if scaled.is_finite() && scaled >= 1.0 {
            scaled as u64
        } else {
            1
        }
    }

    /// Returns a list of problems. Empty means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.compression_threshold < COMPRESSION_DISABLED {
            errors.push(format!(
                "login.compression_threshold must be -1 or greater, got {}",
                self.compression_threshold
            ));
        }
        if self.max_frame_size < 1024 {
            errors.push(format!(
                "login.max_frame_size must be at least 1024 bytes, got {}",
                self.max_frame_size
            ));
        }
        let mut codec = FrameCodec::new(self.max_frame_size);
        codec.enable_compression(0);
        if codec.max_body_len() > i32::MAX as usize {
            errors.push("login.max_frame_size does not fit a varint length".to_string());
        }
        if usize::try_from(self.compression_threshold).is_ok_and(|t| t > self.max_frame_size) {
            errors.push(format!(
                "login.compression_threshold {} is larger than login.max_frame_size {}",
                self.compression_threshold, self.max_frame_size
            ));
        }
        if self.login_timeout_ticks == 0 {
            errors.push("login.login_timeout_ticks must be greater than 0".to_string());
        }
        if !(self.game_speed.is_finite() && self.game_speed > 0.0) {
            errors.push(format!("login.game_speed must be positive, got {}", self.game_speed));
        }
        if self.key_bits < 1024 {
            errors.push(format!("login.key_bits must be at least 1024, got {}", self.key_bits));
        }
        if self.allow_offline_fallback && !self.online_mode {
            errors.push(
                "login.allow_offline_fallback has no effect with online_mode = false".to_string(),
            );
        }
        errors
    }
}
