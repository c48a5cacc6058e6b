//! Request authentication
//!
//! - Ed25519 public key parsing
//! - Discord interaction signature verification
//!
//! Discord signs `timestamp || body` with the application's key and sends the
//! hex signature and timestamp in `X-Signature-Ed25519` / `X-Signature-Timestamp`.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;
use tracing::debug;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("public key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("public key must be 32 bytes, got {0}")]
    Length(usize),
    #[error("public key is not a valid ed25519 point")]
    Point(#[from] ed25519_dalek::SignatureError),
}

/// Parse a hex-encoded ed25519 public key
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, KeyError> {
    let bytes = hex::decode(public_key_hex.trim())?;
    let array: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::Length(bytes.len()))?;
    Ok(VerifyingKey::from_bytes(&array)?)
}

/// Verifies inbound interactions against the application's public key
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn from_hex(public_key_hex: &str) -> Result<Self, KeyError> {
        parse_public_key(public_key_hex).map(Self::new)
    }

    /// Check a request. Missing headers count as invalid.
    pub fn verify(&self, signature: Option<&str>, timestamp: Option<&str>, body: &[u8]) -> bool {
        match (signature, timestamp) {
            (Some(signature), Some(timestamp)) => {
                verify_with_key(&self.key, signature, timestamp, body)
            }
            _ => {
                debug!("Missing signature or timestamp header");
                false
            }
        }
    }
}

/// Verify a Discord request signature given a hex public key.
///
/// Fails closed: a missing or unparsable key is treated as a bad signature.
pub fn verify_signature(
    public_key_hex: Option<&str>,
    signature_hex: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
) -> bool {
    let Some(public_key_hex) = public_key_hex.filter(|k| !k.trim().is_empty()) else {
        debug!("No public key configured");
        return false;
    };

    match parse_public_key(public_key_hex) {
        Ok(key) => SignatureVerifier::new(key).verify(signature_hex, timestamp, body),
        Err(e) => {
            debug!("Failed to parse public key: {}", e);
            false
        }
    }
}

fn verify_with_key(key: &VerifyingKey, signature_hex: &str, timestamp: &str, body: &[u8]) -> bool {
    let sig_bytes = match hex::decode(signature_hex.trim()) {
        Ok(b) => b,
        Err(e) => {
            debug!("Failed to decode signature hex: {}", e);
            return false;
        }
    };

    let signature = match Signature::from_slice(&sig_bytes) {
        Ok(s) => s,
        Err(_) => {
            debug!(
                "Invalid signature length: {} (expected 64)",
                sig_bytes.len()
            );
            return false;
        }
    };

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);

    key.verify(&message, &signature).is_ok()
}
