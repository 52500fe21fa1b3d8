//! PKCE (RFC 7636) engine for the authorization code flow.
//!
//! Parameters are generated before the redirect, parked in a [`store::PkceStore`]
//! across the redirect boundary, and checked against the callback on return.

pub mod authorize;
pub mod callback;
pub mod codec;
pub mod store;

pub use authorize::build_authorization_url;
pub use callback::{CallbackParams, build_callback_url, parse_callback_url, validate_state};
pub use codec::{base64url_encode, generate_random_string};
pub use store::{FileStorage, MemoryStorage, PkceStore, SessionStorage};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The only supported challenge method. `plain` is deliberately absent.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// Raw bytes behind the verifier: 32 bytes -> 43 Base64URL characters.
const VERIFIER_BYTES: usize = 32;
const STATE_BYTES: usize = 16;
const STATE_PREFIX: &str = "state_";

/// Errors from the PKCE layer.
#[derive(Debug, thiserror::Error)]
pub enum PkceError {
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("random string length must be greater than zero")]
    InvalidLength,

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("could not persist PKCE parameters: {0}")]
    Storage(String),
}

/// One authorization attempt's verifier, challenge and anti-CSRF state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkceParams {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub state: String,
}

impl PkceParams {
    /// True if `code_challenge` is the S256 transform of `code_verifier`.
    pub fn verify_challenge(&self) -> bool {
        self.code_challenge_method == CODE_CHALLENGE_METHOD
            && compute_code_challenge(&self.code_verifier) == self.code_challenge
    }

    /// Milliseconds since epoch embedded in the state token, if it has the generated shape.
    pub fn state_issued_at_ms(&self) -> Option<i64> {
        let rest = self.state.strip_prefix(STATE_PREFIX)?;
        let (millis, _) = rest.split_once('_')?;
        millis.parse().ok()
    }
}

/// `base64url(sha256(verifier))`, hashing the verifier's ASCII bytes.
pub fn compute_code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    base64url_encode(&digest)
}

/// Generate a fresh, self-consistent parameter set.
pub fn generate_pkce_params() -> Result<PkceParams, PkceError> {
    let code_verifier = generate_random_string(VERIFIER_BYTES)?;
    let code_challenge = compute_code_challenge(&code_verifier);
    let state = format!(
        "{}{}_{}",
        STATE_PREFIX,
        chrono::Utc::now().timestamp_millis(),
        generate_random_string(STATE_BYTES)?
    );

    Ok(PkceParams {
        code_verifier,
        code_challenge,
        code_challenge_method: CODE_CHALLENGE_METHOD.to_string(),
        state,
    })
}
