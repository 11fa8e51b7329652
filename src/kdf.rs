//! Two-stage password-based key derivation used to unlock a keybag.
//!
//! Stage 1 (inner) strengthens the raw passphrase with PBKDF2-HMAC-<family>
//! using the keybag's inner salt/iteration count. Stage 2 (outer) runs the
//! stage-1 output through PBKDF2-HMAC-SHA1 with the outer salt/iteration count
//! to produce the 32-byte KEK used to unwrap every protection class's key.

use sha1::Sha1;
use sha2::Sha256;

/// Selects the HMAC hash family used for the KDF's inner stage, carried in the
/// keybag header (`DPWT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerHash {
    Sha1,
    Sha256,
}

const DK_LEN: usize = 32;

/// Runs the two-stage KDF and returns the 32-byte passphrase-derived KEK.
pub fn derive_kek(
    passphrase: &[u8],
    inner_hash: InnerHash,
    inner_salt: &[u8],
    inner_iterations: u32,
    outer_salt: &[u8],
    outer_iterations: u32,
) -> [u8; DK_LEN] {
    let mut dk1 = [0u8; DK_LEN];
    match inner_hash {
        InnerHash::Sha1 => {
            pbkdf2::pbkdf2_hmac::<Sha1>(passphrase, inner_salt, inner_iterations, &mut dk1)
        }
        InnerHash::Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, inner_salt, inner_iterations, &mut dk1)
        }
    }

    let mut dk2 = [0u8; DK_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(&dk1, outer_salt, outer_iterations, &mut dk2);
    dk2
}
