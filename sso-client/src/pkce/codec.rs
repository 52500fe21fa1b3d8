use super::PkceError;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Encode bytes as Base64URL (`-`/`_` alphabet, no `=` padding).
pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Fill `byte_length` bytes from the OS CSPRNG and return them Base64URL-encoded.
///
/// Fails with [`PkceError::EntropyUnavailable`] when the OS source cannot be read;
/// there is no fallback to a non-cryptographic generator.
pub fn generate_random_string(byte_length: usize) -> Result<String, PkceError> {
    if byte_length == 0 {
        return Err(PkceError::InvalidLength);
    }
    let mut bytes = vec![0u8; byte_length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| PkceError::EntropyUnavailable(e.to_string()))?;
    Ok(base64url_encode(&bytes))
}
