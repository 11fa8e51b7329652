//! AES-256-CBC decryption with an all-zero IV, and PKCS#7 padding helpers.
//!
//! Every ciphertext this core decrypts (the manifest index, individual file
//! payloads) is encrypted with a unique per-file or per-backup key, so no IV is
//! ever transmitted: a zero IV is safe here precisely because keys are never
//! reused across plaintexts.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};

use crate::error::{Error, Result};

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Decrypts `ciphertext` under AES-256-CBC with a zero IV.
///
/// `key` must be 32 bytes. Returns `None` if `ciphertext.len()` is not a
/// multiple of 16 — true for a well-formed index or payload, but not
/// guaranteed for bytes read straight off disk, so callers must check rather
/// than assume it. Returns the plaintext, still including any PKCS#7 padding —
/// callers decide whether to strip it (the manifest index is not padded; file
/// payloads are).
pub fn cbc_decrypt(ciphertext: &[u8], key: &[u8; 32]) -> Option<Vec<u8>> {
    if ciphertext.len() % 16 != 0 {
        return None;
    }
    let mut buf = ciphertext.to_vec();
    let decryptor = cbc::Decryptor::<Aes256>::new_from_slices(key, &ZERO_IV)
        .expect("key and IV are fixed-size");
    let len = decryptor
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .expect("length checked to be a multiple of the AES block size above")
        .len();
    buf.truncate(len);
    Some(buf)
}

/// Strips PKCS#7 padding (1–16 bytes, all equal to the pad length) from `data`.
pub fn pkcs7_unpad(data: &[u8], context: &str) -> Result<Vec<u8>> {
    let bad = || Error::Padding {
        context: context.to_string(),
    };
    let pad_len = *data.last().ok_or_else(bad)? as usize;
    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return Err(bad());
    }
    let (plain, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().any(|&b| b as usize != pad_len) {
        return Err(bad());
    }
    Ok(plain.to_vec())
}

/// Adds PKCS#7 padding to `data` so its length becomes a multiple of 16.
///
/// Used only by tests to build synthetic encrypted fixtures.
#[cfg(test)]
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = 16 - (data.len() % 16);
    let mut out = data.to_vec();
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}
