//! Session orchestrator: unlock → manifest decrypt → index query → file decrypt.
//!
//! A [`Session`] owns exactly one keybag and one materialized decrypted index
//! for its lifetime. State only moves forward (`Created → Unlocked →
//! ManifestOpen`); `Closed` is reached either by the explicit [`Session::close`]
//! (which consumes the session, so nothing can call it afterwards) or by `Drop`
//! on an unclosed session.

use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::file_decryptor;
use crate::file_entry::{self, FileEntry};
use crate::keybag::Keybag;
use crate::manifest::{DecryptedManifest, ManifestPlist};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Created,
    Unlocked,
    ManifestOpen,
    Closed,
}

/// Tunable knobs for a [`Session`]. The only one exposed today is where the
/// temporary decrypted `Manifest.db` is materialized.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub temp_dir: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new() -> Self {
        SessionOptions::default()
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// One row matched by [`Session::lookup`] or [`Session::lookup_like`].
#[derive(Debug, Clone)]
pub struct LookupMatch {
    pub file_id: String,
    pub relative_path: String,
    pub entry: FileEntry,
}

pub struct Session {
    backup_dir: PathBuf,
    passphrase: Option<Zeroizing<Vec<u8>>>,
    options: SessionOptions,
    state: SessionState,
    keybag: Option<Keybag>,
    manifest_plist: Option<ManifestPlist>,
    manifest: Option<DecryptedManifest>,
    /// Set if the temporary index file could not be removed on close; surfaced
    /// to the caller as a diagnostic rather than masking an otherwise-successful
    /// teardown.
    cleanup_failure: Option<PathBuf>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backup_dir", &self.backup_dir)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .field("state", &self.state)
            .field("cleanup_failure", &self.cleanup_failure)
            .finish()
    }
}

impl Session {
    /// Constructs a session. Does not touch disk until a decrypt operation is
    /// invoked (`ensure_unlocked`, `ensure_manifest`, or anything that implies
    /// them).
    pub fn open(backup_dir: impl Into<PathBuf>, passphrase: impl AsRef<[u8]>) -> Self {
        Self::with_options(backup_dir, passphrase, SessionOptions::default())
    }

    pub fn with_options(
        backup_dir: impl Into<PathBuf>,
        passphrase: impl AsRef<[u8]>,
        options: SessionOptions,
    ) -> Self {
        Session {
            backup_dir: backup_dir.into(),
            passphrase: Some(Zeroizing::new(passphrase.as_ref().to_vec())),
            options,
            state: SessionState::Created,
            keybag: None,
            manifest_plist: None,
            manifest: None,
            cleanup_failure: None,
        }
    }

    /// Reads `Manifest.plist`, parses the keybag, and unlocks it with the
    /// session's passphrase. Idempotent once `Unlocked` or later.
    pub fn ensure_unlocked(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::Unlocked | SessionState::ManifestOpen) {
            return Ok(());
        }

        let manifest_plist_path = self.backup_dir.join("Manifest.plist");
        let manifest_plist = ManifestPlist::read(&manifest_plist_path)?;
        let mut keybag = Keybag::parse(&manifest_plist.backup_key_bag)?;

        // Borrowed, not taken: a failed unlock (e.g. wrong passphrase) must
        // leave `self.passphrase` intact so a retried call — or any other
        // method that funnels through here — doesn't see it already gone.
        let passphrase = self
            .passphrase
            .as_ref()
            .expect("passphrase present until the first successful unlock");
        keybag.unlock(passphrase)?;

        // Unlock succeeded: the passphrase is no longer needed. Dropping it
        // here zeroizes it (`Zeroizing`).
        self.passphrase = None;
        self.keybag = Some(keybag);
        self.manifest_plist = Some(manifest_plist);
        self.state = SessionState::Unlocked;
        Ok(())
    }

    /// Calls [`Session::ensure_unlocked`] then decrypts and validates the
    /// index. Idempotent once `ManifestOpen`.
    pub fn ensure_manifest(&mut self) -> Result<()> {
        if self.state == SessionState::ManifestOpen {
            return Ok(());
        }
        self.ensure_unlocked()?;

        let manifest_plist = self
            .manifest_plist
            .as_ref()
            .expect("set by ensure_unlocked");
        let keybag = self.keybag.as_ref().expect("set by ensure_unlocked");

        let manifest_db_path = self.backup_dir.join("Manifest.db");
        let encrypted_db = std::fs::read(&manifest_db_path).map_err(|e| Error::ManifestCorrupt {
            reason: format!("failed to read {}: {e}", manifest_db_path.display()),
        })?;

        let manifest_key = keybag.unwrap(
            manifest_plist.manifest_key_class,
            &manifest_plist.wrapped_manifest_key,
        )?;
        let manifest_key: [u8; 32] = manifest_key
            .as_slice()
            .try_into()
            .map_err(|_| Error::WrapIntegrity)?;

        let decrypted = DecryptedManifest::decrypt(
            &encrypted_db,
            &manifest_key,
            self.options.temp_dir.as_deref(),
        )?;

        self.manifest = Some(decrypted);
        self.state = SessionState::ManifestOpen;
        Ok(())
    }

    fn conn(&mut self) -> Result<&rusqlite::Connection> {
        self.ensure_manifest()?;
        Ok(&self.manifest.as_ref().expect("set by ensure_manifest").conn)
    }

    fn row_to_match(file_id: String, relative_path: String, file_blob: Vec<u8>) -> Result<LookupMatch> {
        let entry = file_entry::decode(&file_blob)?;
        Ok(LookupMatch {
            file_id,
            relative_path,
            entry,
        })
    }

    /// Looks up a single file by its exact `relativePath`. Fails with
    /// [`Error::NotFound`] if absent or its `flags` column is not `1`.
    pub fn lookup(&mut self, relative_path: &str) -> Result<LookupMatch> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                "SELECT fileID, file FROM Files WHERE relativePath = ? AND flags = 1 \
                 ORDER BY domain, relativePath LIMIT 1;",
                [relative_path],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )
            .map_err(|_| Error::NotFound {
                relative_path: relative_path.to_string(),
            })?;
        Self::row_to_match(result.0, relative_path.to_string(), result.1)
    }

    /// Looks up every file whose `relativePath` matches the SQL-LIKE `pattern`,
    /// ordered by `(domain, relativePath)`.
    pub fn lookup_like(&mut self, pattern: &str) -> Result<Vec<LookupMatch>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT fileID, relativePath, file FROM Files WHERE relativePath LIKE ? \
                 AND flags = 1 ORDER BY domain, relativePath;",
            )
            .map_err(|e| Error::ManifestCorrupt { reason: e.to_string() })?;
        let rows = stmt
            .query_map([pattern], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Vec<u8>>(2)?,
                ))
            })
            .map_err(|e| Error::ManifestCorrupt { reason: e.to_string() })?;

        let mut matches = Vec::new();
        for row in rows {
            let (file_id, relative_path, file_blob) =
                row.map_err(|e| Error::ManifestCorrupt { reason: e.to_string() })?;
            matches.push(Self::row_to_match(file_id, relative_path, file_blob)?);
        }
        Ok(matches)
    }

    /// Returns the fileIDs of every entry under `directory`: an exact domain
    /// match if `directory` ends with `/`, otherwise a `relativePath` prefix
    /// match.
    pub fn file_ids_under(&mut self, directory: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let (sql, param) = if let Some(domain) = directory.strip_suffix('/') {
            ("SELECT fileID FROM Files WHERE domain = ?;", domain.to_string())
        } else {
            (
                "SELECT fileID FROM Files WHERE relativePath LIKE ? || '%';",
                directory.to_string(),
            )
        };
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::ManifestCorrupt { reason: e.to_string() })?;
        let rows = stmt
            .query_map([param], |row| row.get::<_, String>(0))
            .map_err(|e| Error::ManifestCorrupt { reason: e.to_string() })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::ManifestCorrupt { reason: e.to_string() })
    }

    /// Composes [`Session::lookup`] with the file decryptor. Returns `Ok(None)`
    /// for entries with no ciphertext (directories, symlinks).
    pub fn extract_bytes(&mut self, relative_path: &str) -> Result<Option<Vec<u8>>> {
        let found = self.lookup(relative_path)?;
        let keybag = self.keybag.as_ref().expect("set by ensure_manifest via ensure_unlocked");
        file_decryptor::decrypt(&self.backup_dir, &found.file_id, &found.entry, keybag)
    }

    fn teardown(&mut self) -> Result<()> {
        let result = match self.manifest.take() {
            Some(manifest) => manifest.close(),
            None => Ok(()),
        };
        if let Err(Error::CleanupFailed { ref path, .. }) = result {
            self.cleanup_failure = Some(path.clone());
        }
        self.keybag = None;
        self.state = SessionState::Closed;
        result
    }

    /// Closes the index connection, deletes temporary files, and drops
    /// retained key material. Consuming `self` makes `Closed` unreachable
    /// from further method calls at compile time.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    /// The temporary file path that failed to clean up, if any. Populated
    /// even when `close`/`Drop` otherwise tore the session down successfully.
    pub fn cleanup_failure(&self) -> Option<&Path> {
        self.cleanup_failure.as_deref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(e) = self.teardown() {
            log::warn!("session: cleanup on drop failed: {e}");
        }
    }
}
