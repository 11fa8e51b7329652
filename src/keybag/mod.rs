//! Keybag unlock and per-class key unwrap.
//!
//! A [`Keybag`] is parsed once from the raw blob stored in `Manifest.plist`'s
//! `BackupKeyBag` field, unlocked once with the backup passphrase, and then used
//! read-only for the rest of the session to unwrap per-file and manifest keys.

mod parser;

use std::collections::BTreeMap;

use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::kdf;
use crate::keywrap;

pub use parser::{ClassRecord, KeybagHeader};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum State {
    Parsed,
    Unlocked,
}

/// Parses and unlocks a keybag, then unwraps per-class keys on demand.
pub struct Keybag {
    header: KeybagHeader,
    classes: Vec<ClassRecord>,
    class_keys: BTreeMap<i64, [u8; 32]>,
    state: State,
}

impl Keybag {
    /// Parses the raw keybag blob. Does not attempt to unlock it.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let parser::ParsedKeybag { header, classes } = parser::parse(blob)?;
        Ok(Keybag {
            header,
            classes,
            class_keys: BTreeMap::new(),
            state: State::Parsed,
        })
    }

    /// Attempts to unlock the keybag with `passphrase`.
    ///
    /// Idempotent: once unlocked, a second call is a no-op that returns `Ok(())`
    /// without re-deriving the KEK. Does not take ownership of `passphrase` —
    /// a failed attempt leaves the caller's copy intact so it can retry or
    /// clear it on its own schedule; only the derived KEK is zeroized here.
    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<()> {
        if self.state == State::Unlocked {
            return Ok(());
        }

        let kek = Zeroizing::new(kdf::derive_kek(
            passphrase,
            self.header.inner_hash,
            &self.header.inner_salt,
            self.header.inner_iterations,
            &self.header.outer_salt,
            self.header.outer_iterations,
        ));

        for class in &self.classes {
            let Some(wrapped) = class.wrapped_key.as_deref() else {
                // Asymmetric-only class: no symmetric key to unwrap under the
                // passphrase-derived KEK.
                continue;
            };
            match keywrap::unwrap_key(&kek, wrapped) {
                Ok(key) if key.len() == 32 => {
                    let mut class_key = [0u8; 32];
                    class_key.copy_from_slice(&key);
                    self.class_keys.insert(class.class_id, class_key);
                }
                Ok(_) | Err(_) => {
                    log::debug!(
                        "keybag: class {} did not unwrap under the derived KEK",
                        class.class_id
                    );
                }
            }
        }

        if self.class_keys.is_empty() {
            return Err(Error::IncorrectPassphrase);
        }

        self.state = State::Unlocked;
        Ok(())
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == State::Unlocked
    }

    /// Unwraps `wrapped` under the class key for `class_id`.
    pub fn unwrap(&self, class_id: i64, wrapped: &[u8]) -> Result<Vec<u8>> {
        let class_key = self
            .class_keys
            .get(&class_id)
            .ok_or(Error::UnknownClass { class_id })?;
        keywrap::unwrap_key(class_key, wrapped)
    }

    pub fn header(&self) -> &KeybagHeader {
        &self.header
    }
}

impl Drop for Keybag {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        for key in self.class_keys.values_mut() {
            key.zeroize();
        }
    }
}
