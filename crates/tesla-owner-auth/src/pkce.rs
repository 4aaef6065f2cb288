//! Proof Key for Code Exchange material for the web login. Everything here
//! is single-use: a fresh set is generated for every login attempt and
//! discarded once the handshake completes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};

const VERIFIER_LEN: usize = 86;
const STATE_LEN: usize = 20;

/// One login attempt's worth of PKCE material.
#[derive(Debug)]
pub struct PkceMaterial {
    /// Locally held secret echoed back during the code exchange.
    pub verifier: String,
    /// `BASE64URL(SHA256(verifier))`, sent with the authorization request.
    pub challenge: String,
    /// Random correlation value for the authorization request.
    pub state: String,
}

impl PkceMaterial {
    /// Generates a fresh verifier/challenge/state triple.
    pub fn generate() -> Self {
        let verifier = random_alphanumeric(VERIFIER_LEN);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
            state: random_alphanumeric(STATE_LEN),
        }
    }
}

/// Computes the S256 code challenge for a verifier.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
