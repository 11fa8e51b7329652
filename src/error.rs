use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while unlocking a keybag, decrypting the manifest index, or
/// decrypting an individual backup file.
///
/// No variant's `Display` or `Debug` output ever contains passphrase bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Manifest.plist not found or unreadable at {path}: {reason}")]
    ManifestPlistMissing { path: PathBuf, reason: String },

    #[error("keybag blob malformed: {reason}")]
    KeybagFormat { reason: String },

    #[error("incorrect passphrase: no protection class could be unwrapped")]
    IncorrectPassphrase,

    #[error("protection class {class_id} is not available in the unlocked keybag")]
    UnknownClass { class_id: i64 },

    #[error("AES key-wrap integrity check failed")]
    WrapIntegrity,

    #[error("decrypted Manifest.db is not a valid index database: {reason}")]
    ManifestCorrupt { reason: String },

    #[error("encrypted payload for file {file_id} not found at {path}")]
    PayloadMissing { file_id: String, path: PathBuf },

    #[error("PKCS#7 padding invalid for file {context}")]
    Padding { context: String },

    #[error("relative path {relative_path} not found (or is not a regular file)")]
    NotFound { relative_path: String },

    #[error("failed to remove temporary file {path}: {reason}")]
    CleanupFailed { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
