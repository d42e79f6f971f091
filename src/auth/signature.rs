//! Credential parsing and HMAC-SHA256 request signatures.
//!
//! Two `Authorization` forms are understood:
//!
//! - `Token <api-token>` for owner actions.
//! - `REGISTRY-HMAC-SHA256 Credential=<purpose>/<base64 username>/<unix ts>,Signature=<hex>`
//!   for signed pushes, where the signature is the hex HMAC-SHA256 of a
//!   canonical payload keyed by the principal's API token.
//!
//! Inbound notifications (build service, GitHub) sign the raw request body
//! and send `sha256=<hex>` in a dedicated header.

use base64::{Engine as _, engine::general_purpose};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNED_SCHEME: &str = "REGISTRY-HMAC-SHA256";
pub const TOKEN_SCHEME: &str = "Token";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("unsupported authorization scheme")]
    UnsupportedScheme,
    #[error("malformed credential: {0}")]
    Malformed(&'static str),
}

/// Parsed `Credential=...,Signature=...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCredential {
    /// What the signature was produced for, e.g. `build`.
    pub purpose: String,
    pub username: String,
    /// Unix seconds chosen by the client when signing.
    pub timestamp: i64,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthHeader {
    Token(String),
    Signed(SignedCredential),
}

impl AuthHeader {
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let raw = raw.trim();
        let (scheme, rest) = raw
            .split_once(' ')
            .ok_or(CredentialError::Malformed("missing scheme"))?;
        let rest = rest.trim();

        if scheme.eq_ignore_ascii_case(TOKEN_SCHEME) {
            if rest.is_empty() {
                return Err(CredentialError::Malformed("empty token"));
            }
            return Ok(Self::Token(rest.to_string()));
        }
        if scheme != SIGNED_SCHEME {
            return Err(CredentialError::UnsupportedScheme);
        }

        let mut credential = None;
        let mut signature = None;
        for part in rest.split(',') {
            match part.trim().split_once('=') {
                Some(("Credential", value)) => credential = Some(value),
                Some(("Signature", value)) => signature = Some(value),
                _ => {}
            }
        }
        let credential = credential.ok_or(CredentialError::Malformed("missing Credential"))?;
        let signature = signature.ok_or(CredentialError::Malformed("missing Signature"))?;

        let mut fields = credential.splitn(3, '/');
        let (Some(purpose), Some(encoded_user), Some(ts)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(CredentialError::Malformed("credential needs purpose/user/timestamp"));
        };

        let username = general_purpose::STANDARD
            .decode(encoded_user)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or(CredentialError::Malformed("username is not base64"))?;
        let timestamp = ts
            .parse::<i64>()
            .map_err(|_| CredentialError::Malformed("timestamp is not an integer"))?;

        Ok(Self::Signed(SignedCredential {
            purpose: purpose.to_string(),
            username,
            timestamp,
            signature: signature.to_string(),
        }))
    }
}

/// Build a signed `Authorization` value. Clients use this to sign pushes.
pub fn encode_credential(purpose: &str, username: &str, timestamp: i64, signature: &str) -> String {
    format!(
        "{} Credential={}/{}/{},Signature={}",
        SIGNED_SCHEME,
        purpose,
        general_purpose::STANDARD.encode(username),
        timestamp,
        signature
    )
}

/// Canonical payload bound by a push signature.
pub fn push_payload(collection: &str, timestamp: i64, name: &str, tag: &str) -> String {
    format!("build|{}|{}|{}|{}|", collection, timestamp, name, tag)
}

/// Hex HMAC-SHA256 of `payload` keyed by `secret`.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature.
pub fn verify_payload(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Verify a `sha256=<hex>` body signature header.
pub fn verify_body_signature(secret: &str, body: &[u8], header: &str) -> bool {
    match header.trim().strip_prefix("sha256=") {
        Some(hex_sig) => verify_payload(secret, body, hex_sig),
        None => false,
    }
}

/// Whether `timestamp` lies within `window_secs` of `now` in either direction.
pub fn is_timestamp_fresh(timestamp: i64, now: i64, window_secs: i64) -> bool {
    now.abs_diff(timestamp) <= window_secs.unsigned_abs()
}
