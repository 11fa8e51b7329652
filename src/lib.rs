//! Decrypts an encrypted mobile-device backup: keybag unlock, manifest index
//! decryption, and per-file key unwrap.
//!
//! The hard part is the keybag unlock and per-file key unwrap pipeline: a
//! tagged binary keybag format, a two-stage password-based key derivation,
//! RFC-3394 AES key unwrap per protection class, and AES-CBC decryption of the
//! index database and of each file payload. [`Session`] sequences these steps
//! and owns the sensitive material for as long as it needs to exist.
//!
//! ```no_run
//! use ibackup_decrypt::Session;
//!
//! # fn run() -> ibackup_decrypt::Result<()> {
//! let mut session = Session::open("/path/to/backup", "correct horse battery staple");
//! session.ensure_manifest()?;
//! if let Some(bytes) = session.extract_bytes("Library/SMS/sms.db")? {
//!     // do something with `bytes`
//! }
//! session.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Not provided here: a CLI, filesystem output, SQL convenience queries beyond
//! simple lookups, a relational-engine implementation, or a binary
//! property-list decoder — those are the caller's or an upstream crate's job.

mod aes_primitives;
mod error;
mod file_decryptor;
mod file_entry;
mod kdf;
mod keybag;
mod keywrap;
mod manifest;
pub mod paths;
mod session;

pub use error::{Error, Result};
pub use file_entry::FileEntry;
pub use session::{LookupMatch, Session, SessionOptions};
