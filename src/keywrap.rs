//! RFC 3394 AES key unwrap (and wrap, for building test fixtures).

use aes_kw::{KekAes256, Error as KwError};

use crate::error::{Error, Result};

/// Unwraps `wrapped` (length `8*(n+1)`, `n >= 1`) under `kek`.
///
/// Fails with [`Error::WrapIntegrity`] if the RFC 3394 integrity check value
/// does not match, or if `wrapped`'s length is not a valid wrap length.
pub fn unwrap_key(kek: &[u8; 32], wrapped: &[u8]) -> Result<Vec<u8>> {
    let kek = KekAes256::from(*kek);
    kek.unwrap_vec(wrapped).map_err(|_: KwError| Error::WrapIntegrity)
}

/// Wraps `key` under `kek`. Only used by tests to build synthetic fixtures.
#[cfg(test)]
pub fn wrap_key(kek: &[u8; 32], key: &[u8]) -> Vec<u8> {
    let kek = KekAes256::from(*kek);
    kek.wrap_vec(key).expect("wrap never fails for valid key lengths")
}
