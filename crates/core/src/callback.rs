//! Webhook callback tokens.
//!
//! Every provider submission gets a fresh random secret that is embedded in
//! the webhook URL handed to the provider. Only the SHA-256 digest is
//! stored, so a leaked job row cannot be used to forge a completion.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::types::JobId;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Length of a generated callback token (alphanumeric characters).
pub const TOKEN_LENGTH: usize = 48;

/// Path prefix of the inbound webhook route.
pub const CALLBACK_PATH: &str = "/video-callback";

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// A freshly generated callback secret.
pub struct CallbackToken {
    /// Plaintext token, only ever sent to the provider inside the webhook URL.
    pub plaintext: String,
    /// SHA-256 hex digest persisted on the job row.
    pub hash: String,
}

/// Generate a new random callback token.
pub fn generate_callback_token() -> CallbackToken {
    let plaintext: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect();
    let hash = hash_callback_token(&plaintext);
    CallbackToken { plaintext, hash }
}

/// Compute the stored digest for a plaintext callback token.
pub fn hash_callback_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Check a presented token against the stored digest.
///
/// Digests are compared without early exit so timing does not reveal how
/// many leading characters matched.
pub fn verify_callback_token(presented: &str, stored_hash: &str) -> bool {
    if stored_hash.is_empty() {
        return false;
    }
    let presented_hash = hash_callback_token(presented);
    let a = presented_hash.as_bytes();
    let b = stored_hash.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Build the public webhook URL for a job.
///
/// `public_base_url` is the externally reachable origin of this service
/// (trailing slashes are ignored).
pub fn callback_url(public_base_url: &str, job_id: JobId, token: &str) -> String {
    format!(
        "{}{CALLBACK_PATH}/{job_id}?token={token}",
        public_base_url.trim_end_matches('/')
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
