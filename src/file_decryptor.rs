//! Locates a file's encrypted payload on disk, unwraps its key, and decrypts.

use std::path::{Path, PathBuf};

use crate::aes_primitives::{cbc_decrypt, pkcs7_unpad};
use crate::error::{Error, Result};
use crate::file_entry::FileEntry;
use crate::keybag::Keybag;

/// Resolves `<backup_dir>/<fileID[0:2]>/<fileID>`.
pub fn payload_path(backup_dir: &Path, file_id: &str) -> PathBuf {
    let prefix = &file_id[..file_id.len().min(2)];
    backup_dir.join(prefix).join(file_id)
}

/// Decrypts the payload for `file_id` given its decoded `entry`.
///
/// Returns `Ok(None)` if the entry carries no wrapped key (a directory or
/// other non-content entry) — this is the "no plaintext" signal, not an error.
pub fn decrypt(
    backup_dir: &Path,
    file_id: &str,
    entry: &FileEntry,
    keybag: &Keybag,
) -> Result<Option<Vec<u8>>> {
    let Some(wrapped_key) = entry.wrapped_key.as_deref() else {
        log::debug!("file {file_id} has no EncryptionKey; not a regular encrypted file");
        return Ok(None);
    };

    let path = payload_path(backup_dir, file_id);
    let ciphertext = std::fs::read(&path).map_err(|_| Error::PayloadMissing {
        file_id: file_id.to_string(),
        path: path.clone(),
    })?;

    let file_key = keybag.unwrap(entry.protection_class, wrapped_key)?;
    let key: [u8; 32] = file_key.as_slice().try_into().map_err(|_| Error::WrapIntegrity)?;

    let padded = cbc_decrypt(&ciphertext, &key).ok_or_else(|| Error::Padding {
        context: file_id.to_string(),
    })?;
    let plaintext = pkcs7_unpad(&padded, file_id)?;
    Ok(Some(plaintext))
}
