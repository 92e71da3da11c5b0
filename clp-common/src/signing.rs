//! HMAC-signed tokens for session cookies and editor callbacks
//!
//! Token layout: `base64url(json envelope) "." base64url(HMAC-SHA256)`.
//! The envelope carries the payload and an expiry (Unix seconds); both are
//! covered by the signature.
//!
//! # Pure Functions
//!
//! No HTTP framework dependencies; the server wraps these in extractors.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    data: T,
    exp: i64,
}

/// Sign `data`, valid until `now + ttl_secs`
pub fn sign<T: Serialize>(data: &T, secret: &str, ttl_secs: i64, now: DateTime<Utc>) -> Result<String> {
    let envelope = Envelope {
        data,
        exp: now.timestamp() + ttl_secs,
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|e| Error::Internal(format!("Failed to serialize token: {}", e)))?;
    let body = URL_SAFE_NO_PAD.encode(json);
    let signature = URL_SAFE_NO_PAD.encode(mac_for(secret, body.as_bytes())?.finalize().into_bytes());
    Ok(format!("{}.{}", body, signature))
}

/// Verify signature and expiry, then decode the payload
pub fn verify<T: DeserializeOwned>(token: &str, secret: &str, now: DateTime<Utc>) -> Result<T> {
    let (body, signature) = token
        .split_once('.')
        .ok_or_else(|| Error::InvalidToken("malformed token".to_string()))?;

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| Error::InvalidToken("malformed signature".to_string()))?;
    mac_for(secret, body.as_bytes())?
        .verify_slice(&signature)
        .map_err(|_| Error::InvalidToken("signature mismatch".to_string()))?;

    let json = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| Error::InvalidToken("malformed body".to_string()))?;
    let envelope: Envelope<T> = serde_json::from_slice(&json)
        .map_err(|e| Error::InvalidToken(format!("undecodable payload: {}", e)))?;

    if envelope.exp < now.timestamp() {
        return Err(Error::InvalidToken("token expired".to_string()));
    }
    Ok(envelope.data)
}

fn mac_for(secret: &str, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid signing key: {}", e)))?;
    mac.update(body);
    Ok(mac)
}
