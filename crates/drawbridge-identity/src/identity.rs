//! Verified account identities.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account identity: stable id, display name, and signed properties.
///
/// Immutable once built. Deserializes directly from the session service's
/// profile JSON, where the id is written without hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

/// A signed profile property, e.g. skin textures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl VerifiedIdentity {
    /// Synthesizes the identity used for unverified play.
    ///
    /// The same name always yields the same id.
    pub fn offline(name: &str) -> Self {
        Self {
            id: offline_uuid(name),
            name: name.to_owned(),
            properties: Vec::new(),
        }
    }
}

/// Name-based (version 3) UUID of `"OfflinePlayer:" + name`.
pub fn offline_uuid(name: &str) -> Uuid {
    let digest: [u8; 16] = Md5::digest(format!("OfflinePlayer:{name}").as_bytes()).into();
    uuid::Builder::from_md5_bytes(digest).into_uuid()
}
