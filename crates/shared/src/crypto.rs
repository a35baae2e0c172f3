//! Token generation and hashing helpers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix carried by every externally visible job token.
pub const JOB_TOKEN_PREFIX: &str = "job_";

/// Number of hex characters kept in a token fingerprint.
const FINGERPRINT_LEN: usize = 12;

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, non-reversible identifier for a secret, safe to put in logs.
pub fn token_fingerprint(secret: &str) -> String {
    let mut hash = sha256_hex(secret);
    hash.truncate(FINGERPRINT_LEN);
    hash
}

/// Generates an opaque job token (`job_` + 24 random bytes, URL-safe base64).
///
/// The token is the only handle clients ever see for a fetch job; it carries
/// 192 bits of randomness, so collisions are not a practical concern. The
/// database still enforces uniqueness.
pub fn generate_job_token() -> String {
    let mut rng = rand::thread_rng();
    let random_bytes: [u8; 24] = rng.gen();
    format!("{}{}", JOB_TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(random_bytes))
}

/// Returns true if `token` has the shape produced by [`generate_job_token`].
pub fn is_job_token(token: &str) -> bool {
    match token.strip_prefix(JOB_TOKEN_PREFIX) {
        Some(rest) => {
            rest.len() == 32
                && rest
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        None => false,
    }
}
