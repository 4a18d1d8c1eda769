//! QR payload encoding and decoding.

use serde::{Deserialize, Serialize};

use crate::model::identity::IdentityKind;

pub const PAYLOAD_VERSION: u8 = 1;

/// Decoded reference to an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPayload {
    pub matricule: String,
    pub kind: Option<IdentityKind>,
}

#[derive(Serialize, Deserialize)]
struct WirePayload {
    #[serde(default)]
    v: Option<u8>,
    #[serde(default)]
    kind: Option<IdentityKind>,
    matricule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPayload;

pub fn is_valid_matricule(value: &str) -> bool {
    (2..=64).contains(&value.len())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ScanPayload {
    /// Accepts the JSON payload issued at identity creation, or a bare
    /// matricule for scanners that only encode the code.
    pub fn parse(raw: &str) -> Result<Self, InvalidPayload> {
        let raw = raw.trim();

        if raw.starts_with('{') {
            let wire: WirePayload = serde_json::from_str(raw).map_err(|_| InvalidPayload)?;
            if wire.v.is_some_and(|v| v != PAYLOAD_VERSION) {
                return Err(InvalidPayload);
            }
            let matricule = wire.matricule.trim();
            if !is_valid_matricule(matricule) {
                return Err(InvalidPayload);
            }
            return Ok(Self {
                matricule: matricule.to_string(),
                kind: wire.kind,
            });
        }

        if is_valid_matricule(raw) {
            return Ok(Self {
                matricule: raw.to_string(),
                kind: None,
            });
        }

        Err(InvalidPayload)
    }
}

/// Payload printed on the badge of a new identity.
pub fn encode(kind: IdentityKind, matricule: &str, first_name: &str, last_name: &str) -> String {
    let wire = WirePayload {
        v: Some(PAYLOAD_VERSION),
        kind: Some(kind),
        matricule: matricule.to_string(),
        first_name: Some(first_name.to_string()),
        last_name: Some(last_name.to_string()),
    };
    // A struct of strings and enums always serializes.
    serde_json::to_string(&wire).unwrap_or_default()
}
