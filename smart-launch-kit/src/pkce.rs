//! Proof Key for Code Exchange (RFC 7636) helpers.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::Rng;
use sha2::{Digest, Sha256};

/// The only challenge method the flow locks in (`S256`).
pub const CHALLENGE_METHOD_S256: &str = "S256";

const VERIFIER_LENGTH: usize = 64;
const UNRESERVED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// A PKCE code verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeVerifier(String);

impl CodeVerifier {
    /// Generates a fresh random verifier of 64 unreserved characters.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier: String = (0..VERIFIER_LENGTH)
            .map(|_| {
                let idx = rng.gen_range(0..UNRESERVED.len());
                UNRESERVED[idx] as char
            })
            .collect();
        Self(verifier)
    }

    /// Wraps an existing verifier string.
    #[must_use]
    pub fn from_string(verifier: impl Into<String>) -> Self {
        Self(verifier.into())
    }

    /// The verifier string sent to the token endpoint.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the `S256` code challenge:
    /// `BASE64URL-NOPAD(SHA256(verifier))`.
    #[must_use]
    pub fn challenge_s256(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }
}
