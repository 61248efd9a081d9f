//! Message signing
//!
//! A [`Signer`] turns an argument mapping into a token that a callback
//! endpoint can verify and decode. Deployments with a secret key sign with
//! HMAC-SHA256; deployments without one fall back to plain JSON.
//!
//! Signed tokens have the form `payload.signature`, both parts base64url
//! without padding, where `payload` is the JSON encoding of the mapping and
//! `signature = HMAC-SHA256(secret, payload)`.
//!
//! ```rust,ignore
//! use doppler_core::Signer;
//!
//! let signer = Signer::from_secret(Some("s3cret"));
//! let token = signer.sign(&arguments);
//! assert_eq!(signer.unsign(&token)?, arguments);
//! ```

use crate::arguments::Arguments;
use crate::error::UnsignError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies argument mappings
///
/// The mode is chosen once from configuration, never per call.
#[derive(Clone)]
pub enum Signer {
    /// HMAC-SHA256 bound to a secret key
    Keyed(KeyedSigner),
    /// Plain JSON, used when no secret key is configured
    Passthrough,
}

impl Signer {
    /// Keyed mode when a non-empty secret is present, passthrough otherwise.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) if !secret.is_empty() => Signer::Keyed(KeyedSigner::new(secret)),
            _ => Signer::Passthrough,
        }
    }

    pub fn is_keyed(&self) -> bool {
        matches!(self, Signer::Keyed(_))
    }

    pub fn sign(&self, arguments: &Arguments) -> String {
        match self {
            Signer::Keyed(signer) => signer.sign(arguments),
            Signer::Passthrough => encode_json(arguments),
        }
    }

    pub fn unsign(&self, token: &str) -> Result<Arguments, UnsignError> {
        match self {
            Signer::Keyed(signer) => signer.unsign(token),
            Signer::Passthrough => decode_json(token.as_bytes()),
        }
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signer::Keyed(_) => f.write_str("Signer::Keyed(***)"),
            Signer::Passthrough => f.write_str("Signer::Passthrough"),
        }
    }
}

/// HMAC-SHA256 signer bound to one secret key
#[derive(Clone)]
pub struct KeyedSigner {
    secret: Vec<u8>,
}

impl KeyedSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn sign(&self, arguments: &Arguments) -> String {
        let payload = URL_SAFE_NO_PAD.encode(encode_json(arguments));
        let signature = URL_SAFE_NO_PAD.encode(self.mac(payload.as_bytes()).finalize().into_bytes());
        format!("{}.{}", payload, signature)
    }

    pub fn unsign(&self, token: &str) -> Result<Arguments, UnsignError> {
        let (payload, signature) = token
            .trim()
            .split_once('.')
            .ok_or_else(|| UnsignError::Malformed("missing signature separator".to_string()))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| UnsignError::Malformed(format!("signature is not base64url: {}", e)))?;

        self.mac(payload.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| UnsignError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| UnsignError::Malformed(format!("payload is not base64url: {}", e)))?;

        decode_json(&json)
    }

    fn mac(&self, payload: &[u8]) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload);
        mac
    }
}

impl fmt::Debug for KeyedSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyedSigner").field(&"***").finish()
    }
}

fn encode_json(arguments: &Arguments) -> String {
    Value::Object(arguments.clone()).to_string()
}

fn decode_json(bytes: &[u8]) -> Result<Arguments, UnsignError> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(UnsignError::Decode(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(UnsignError::Decode(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
