//! Payload signing for metric batches.
//!
//! The agent signs the exact bytes that cross the wire (the compressed
//! body) and attaches the hex-encoded HMAC-SHA256 as a header; the
//! server recomputes it with the shared key and compares in constant
//! time. No signer configured means no header and no verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Capability to sign an outgoing payload.
pub trait Signer: Send + Sync {
    /// Hex-encoded signature over `data`.
    fn sign(&self, data: &[u8]) -> String;
}

/// Keyed HMAC-SHA256 signer.
pub struct HmacSha256Signer {
    key: Vec<u8>,
}

impl HmacSha256Signer {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any length")
    }

    /// Check a hex `signature` against `data`.
    ///
    /// Malformed hex counts as a mismatch; the comparison itself is
    /// constant-time.
    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(data);
        mac.verify_slice(&expected).is_ok()
    }
}

impl Signer for HmacSha256Signer {
    fn sign(&self, data: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}
