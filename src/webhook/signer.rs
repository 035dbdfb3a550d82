// Symmetric HMAC-SHA256 scheme shared by outbound webhooks and inbound
// request authentication:
//
//   signature = hex(HMAC-SHA256(secret, "<timestamp_ms>.<payload>"))

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Requests older than this are rejected as replays
pub const REPLAY_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Header values produced for one outbound delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub timestamp: String,
    pub signature: String,
}

#[derive(Clone)]
pub struct HmacSigner {
    secret: String,
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

impl HmacSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, timestamp: &str, payload: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }

    /// Hex signature over `"<timestamp>.<payload>"`
    pub fn sign(&self, timestamp: &str, payload: &[u8]) -> String {
        hex::encode(self.mac(timestamp, payload).finalize().into_bytes())
    }

    /// Sign a payload with the given Unix-millisecond timestamp
    pub fn sign_at(&self, timestamp_ms: i64, payload: &[u8]) -> SignedHeaders {
        let timestamp = timestamp_ms.to_string();
        let signature = self.sign(&timestamp, payload);
        SignedHeaders {
            timestamp,
            signature,
        }
    }

    /// Sign a payload stamped with the current time
    pub fn sign_now(&self, payload: &[u8]) -> SignedHeaders {
        self.sign_at(chrono::Utc::now().timestamp_millis(), payload)
    }

    /// Verify a received request.
    ///
    /// The signature is recomputed over the verbatim timestamp header and
    /// body, and compared in constant time. Only the lower-case hex form
    /// that `sign` produces is accepted.
    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now_ms: i64,
    ) -> Result<(), AuthError> {
        let (timestamp, signature) = match (timestamp, signature) {
            (Some(ts), Some(sig)) if !ts.is_empty() && !sig.is_empty() => (ts, sig),
            _ => return Err(AuthError::MissingHeaders),
        };

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| AuthError::InvalidTimestamp)?;

        let age_ms = now_ms.saturating_sub(sent_at);
        if age_ms > REPLAY_WINDOW_MS {
            return Err(AuthError::Expired { age_ms });
        }

        if signature.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(AuthError::BadSignature);
        }
        let provided = hex::decode(signature).map_err(|_| AuthError::BadSignature)?;

        self.mac(timestamp, body)
            .verify_slice(&provided)
            .map_err(|_| AuthError::BadSignature)
    }
}
