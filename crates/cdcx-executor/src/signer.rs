//! Request signing for the CoinDCX private API.
//!
//! The signature is the hex-encoded HMAC-SHA256 of the exact JSON body,
//! keyed with the API secret. The body must be sent byte-for-byte as signed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ExecutorError, ExecutorResult};

type HmacSha256 = Hmac<Sha256>;

/// API credentials plus the signing routine.
#[derive(Clone)]
pub struct RequestSigner {
    api_key: String,
    secret: String,
}

impl RequestSigner {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn sign(&self, body: &str) -> ExecutorResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ExecutorError::Signing(e.to_string()))?;
        mac.update(body.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("api_key", &self.api_key)
            .field("secret", &"<redacted>")
            .finish()
    }
}
