//! Top-level manifest plist accessor and manifest-index decryptor.
//!
//! The binary property-list format itself and the relational engine used to
//! query the decrypted index are both external collaborators: this module only
//! extracts the two fields it needs and hands the rest to `plist`/`rusqlite`.

use std::path::{Path, PathBuf};

use crate::aes_primitives::cbc_decrypt;
use crate::error::{Error, Result};

/// The two fields this core reads out of `Manifest.plist`.
pub struct ManifestPlist {
    pub backup_key_bag: Vec<u8>,
    /// `ManifestKey`'s leading 4-byte little-endian protection-class tag.
    pub manifest_key_class: i64,
    /// `ManifestKey` with the 4-byte class tag stripped off.
    pub wrapped_manifest_key: Vec<u8>,
}

impl ManifestPlist {
    pub fn read(path: &Path) -> Result<Self> {
        let missing = |reason: String| Error::ManifestPlistMissing {
            path: path.to_path_buf(),
            reason,
        };

        let value = plist::Value::from_file(path).map_err(|e| missing(e.to_string()))?;
        let dict = value
            .as_dictionary()
            .ok_or_else(|| missing("top-level value is not a dictionary".to_string()))?;

        let backup_key_bag = dict
            .get("BackupKeyBag")
            .and_then(|v| v.as_data())
            .ok_or_else(|| missing("missing BackupKeyBag field".to_string()))?
            .to_vec();

        let manifest_key = dict
            .get("ManifestKey")
            .and_then(|v| v.as_data())
            .ok_or_else(|| missing("missing ManifestKey field".to_string()))?;
        if manifest_key.len() < 4 {
            return Err(missing("ManifestKey shorter than its 4-byte class tag".to_string()));
        }
        let (class_bytes, wrapped_manifest_key) = manifest_key.split_at(4);
        let manifest_key_class =
            i32::from_le_bytes(class_bytes.try_into().unwrap()) as i64;

        Ok(ManifestPlist {
            backup_key_bag,
            manifest_key_class,
            wrapped_manifest_key: wrapped_manifest_key.to_vec(),
        })
    }
}

/// The decrypted, materialized `Manifest.db`, validated to contain a `Files`
/// table with at least one row.
pub struct DecryptedManifest {
    _temp_dir: tempfile::TempDir,
    pub db_path: PathBuf,
    pub conn: rusqlite::Connection,
}

impl DecryptedManifest {
    /// Decrypts `encrypted_db` under `manifest_key` and materializes it to a
    /// temporary `Manifest.db` inside `temp_dir_parent` (or the platform temp
    /// directory if `None`), then opens and validates it.
    pub fn decrypt(
        encrypted_db: &[u8],
        manifest_key: &[u8; 32],
        temp_dir_parent: Option<&Path>,
    ) -> Result<Self> {
        let plaintext = cbc_decrypt(encrypted_db, manifest_key).ok_or_else(|| Error::ManifestCorrupt {
            reason: format!(
                "encrypted index is {} bytes, not a multiple of the AES block size",
                encrypted_db.len()
            ),
        })?;

        let temp_dir = match temp_dir_parent {
            Some(parent) => tempfile::Builder::new()
                .prefix("ibackup-decrypt-")
                .tempdir_in(parent),
            None => tempfile::Builder::new().prefix("ibackup-decrypt-").tempdir(),
        }
        .map_err(|e| Error::ManifestCorrupt {
            reason: format!("failed to create temporary directory: {e}"),
        })?;
        let db_path = temp_dir.path().join("Manifest.db");
        std::fs::write(&db_path, &plaintext).map_err(|e| Error::ManifestCorrupt {
            reason: format!("failed to write temporary Manifest.db: {e}"),
        })?;

        let conn =
            rusqlite::Connection::open(&db_path).map_err(|e| Error::ManifestCorrupt {
                reason: format!("failed to open decrypted index as a database: {e}"),
            })?;
        let file_count: i64 = conn
            .query_row("SELECT count(*) FROM Files;", [], |row| row.get(0))
            .map_err(|e| Error::ManifestCorrupt {
                reason: format!("Files table missing or unreadable: {e}"),
            })?;
        if file_count == 0 {
            return Err(Error::ManifestCorrupt {
                reason: "Files table has no rows".to_string(),
            });
        }

        log::debug!("manifest: decrypted index validated, {file_count} file rows");
        Ok(DecryptedManifest {
            _temp_dir: temp_dir,
            db_path,
            conn,
        })
    }

    /// Removes the temporary directory holding the decrypted `Manifest.db`.
    /// Drops the connection first so the file isn't held open on platforms
    /// that forbid deleting open files.
    pub fn close(self) -> Result<()> {
        let path = self.db_path.clone();
        drop(self.conn);
        self._temp_dir.close().map_err(|e| Error::CleanupFailed {
            path,
            reason: e.to_string(),
        })
    }
}
