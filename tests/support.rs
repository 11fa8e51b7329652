#![allow(dead_code)]

// Builds synthetic backup fixtures for the integration tests. Deliberately
// reimplements the crypto primitives (rather than calling into the crate
// under test) so a bug in production code can't also hide itself in the
// fixture that's meant to exercise it.

use std::path::PathBuf;

use aes::Aes256;
use aes_kw::KekAes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use sha2::Sha256;

const ZERO_IV: [u8; 16] = [0u8; 16];

fn record(tag: &[u8; 4], value: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

pub fn wrap_key(kek: &[u8; 32], key: &[u8]) -> Vec<u8> {
    KekAes256::from(*kek)
        .wrap_vec(key)
        .expect("wrap never fails for valid key lengths")
}

pub fn cbc_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let padded = pkcs7_pad(plaintext);
    let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(key, &ZERO_IV).expect("key/iv");
    encryptor.encrypt_padded_vec_mut::<NoPadding>(&padded)
}

/// Encrypts block-aligned plaintext with no extra padding added, as is used for
/// the manifest index (whose length is already a multiple of 16 thanks to
/// SQLite's page size).
pub fn cbc_encrypt_no_padding(key: &[u8; 32], block_aligned_plaintext: &[u8]) -> Vec<u8> {
    assert_eq!(block_aligned_plaintext.len() % 16, 0);
    let encryptor = cbc::Encryptor::<Aes256>::new_from_slices(key, &ZERO_IV).expect("key/iv");
    encryptor.encrypt_padded_vec_mut::<NoPadding>(block_aligned_plaintext)
}

pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = 16 - (data.len() % 16);
    let mut out = data.to_vec();
    out.extend(std::iter::repeat(pad_len as u8).take(pad_len));
    out
}

/// Derives the same 32-byte KEK the production two-stage KDF would, for a
/// SHA-256 inner stage (the common case).
pub fn derive_kek(passphrase: &[u8], inner_salt: &[u8], inner_iter: u32, outer_salt: &[u8], outer_iter: u32) -> [u8; 32] {
    let mut dk1 = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, inner_salt, inner_iter, &mut dk1);
    let mut dk2 = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<sha1::Sha1>(&dk1, outer_salt, outer_iter, &mut dk2);
    dk2
}

/// Builds a one-class keybag blob and returns it alongside the class's plain
/// 32-byte key, so tests can wrap manifest/file keys under it directly.
pub fn build_keybag_blob(passphrase: &str, class_id: i64) -> (Vec<u8>, [u8; 32]) {
    let outer_salt = b"test-outer-salt-".to_vec();
    let inner_salt = b"test-inner-salt-".to_vec();
    let outer_iterations = 1000u32;
    let inner_iterations = 1u32;

    let kek = derive_kek(
        passphrase.as_bytes(),
        &inner_salt,
        inner_iterations,
        &outer_salt,
        outer_iterations,
    );
    let class_key = [0x5Au8; 32];
    let wrapped_class_key = wrap_key(&kek, &class_key);

    let mut blob = Vec::new();
    blob.extend(record(b"VERS", &2i64.to_be_bytes()));
    blob.extend(record(b"UUID", &[0u8; 16]));
    blob.extend(record(b"SALT", &outer_salt));
    blob.extend(record(b"ITER", &outer_iterations.to_be_bytes()));
    blob.extend(record(b"DPSL", &inner_salt));
    blob.extend(record(b"DPIC", &inner_iterations.to_be_bytes()));
    blob.extend(record(b"DPWT", &1u32.to_be_bytes())); // SHA-256 inner stage
    blob.extend(record(b"WRAP", &3i64.to_be_bytes()));
    blob.extend(record(b"CLAS", &class_id.to_be_bytes()));
    blob.extend(record(b"WRAP", &1i64.to_be_bytes()));
    blob.extend(record(b"KTYP", &0i64.to_be_bytes()));
    blob.extend(record(b"WPKY", &wrapped_class_key));

    (blob, class_key)
}

/// Builds the binary-plist blob stored in the index's `file` column.
pub fn file_entry_blob(protection_class: i64, encryption_key: Option<Vec<u8>>) -> Vec<u8> {
    let mut objects = vec![plist::Value::String("$null".to_string())];

    let mut root = plist::Dictionary::new();
    root.insert(
        "ProtectionClass".to_string(),
        plist::Value::Integer(protection_class.into()),
    );
    if let Some(key_bytes) = encryption_key {
        let mut ns_data = plist::Dictionary::new();
        // First 4 bytes are a length/tag prefix the production decoder discards.
        let mut prefixed = vec![0u8, 0, 0, key_bytes.len() as u8];
        prefixed.extend_from_slice(&key_bytes);
        ns_data.insert("NS.data".to_string(), plist::Value::Data(prefixed));
        objects.push(plist::Value::Dictionary(ns_data));
        root.insert("EncryptionKey".to_string(), plist::Value::Uid(plist::Uid::new(1)));
    }
    objects.push(plist::Value::Dictionary(root));
    let root_index = objects.len() - 1;

    let mut top_root = plist::Dictionary::new();
    top_root.insert("root".to_string(), plist::Value::Uid(plist::Uid::new(root_index as u64)));
    let mut top = plist::Dictionary::new();
    top.insert("$top".to_string(), plist::Value::Dictionary(top_root));
    top.insert("$objects".to_string(), plist::Value::Array(objects));

    let mut buf = Vec::new();
    plist::Value::Dictionary(top).to_writer_binary(&mut buf).unwrap();
    buf
}

pub struct FileRow {
    pub file_id: &'static str,
    pub domain: &'static str,
    pub relative_path: &'static str,
    pub flags: i64,
    pub file_blob: Vec<u8>,
}

/// A synthetic backup directory: `Manifest.plist`, `Manifest.db`, and payload
/// files, all built in-process with no vendored binary fixtures.
pub struct TestBackup {
    pub dir: tempfile::TempDir,
    pub passphrase: String,
    pub class_key: [u8; 32],
}

impl TestBackup {
    /// Creates the backup directory and writes `Manifest.plist` with a
    /// one-class keybag and a manifest key wrapped under that class.
    pub fn new(passphrase: &str) -> (Self, [u8; 32]) {
        let dir = tempfile::tempdir().expect("tempdir");
        let (keybag_blob, class_key) = build_keybag_blob(passphrase, 1);

        let manifest_key = [0x77u8; 32];
        let wrapped_manifest_key = wrap_key(&class_key, &manifest_key);
        let mut manifest_key_field = 1i32.to_le_bytes().to_vec();
        manifest_key_field.extend_from_slice(&wrapped_manifest_key);

        let mut plist_dict = plist::Dictionary::new();
        plist_dict.insert("BackupKeyBag".to_string(), plist::Value::Data(keybag_blob));
        plist_dict.insert("ManifestKey".to_string(), plist::Value::Data(manifest_key_field));
        plist::Value::Dictionary(plist_dict)
            .to_file_binary(dir.path().join("Manifest.plist"))
            .expect("write Manifest.plist");

        let backup = TestBackup {
            dir,
            passphrase: passphrase.to_string(),
            class_key,
        };
        (backup, manifest_key)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Builds a tiny `Files` table with `rows`, encrypts it under
    /// `manifest_key`, and writes it to `Manifest.db`.
    pub fn write_index(&self, rows: &[FileRow], manifest_key: &[u8; 32]) {
        let scratch = tempfile::NamedTempFile::new().expect("scratch db");
        {
            let conn = rusqlite::Connection::open(scratch.path()).expect("open scratch db");
            conn.execute(
                "CREATE TABLE Files (fileID TEXT, domain TEXT, relativePath TEXT, flags INTEGER, file BLOB);",
                [],
            )
            .unwrap();
            for row in rows {
                conn.execute(
                    "INSERT INTO Files (fileID, domain, relativePath, flags, file) VALUES (?, ?, ?, ?, ?);",
                    rusqlite::params![row.file_id, row.domain, row.relative_path, row.flags, row.file_blob],
                )
                .unwrap();
            }
        }
        let plaintext = std::fs::read(scratch.path()).expect("read scratch db");
        assert_eq!(plaintext.len() % 16, 0, "sqlite page size is a multiple of 16");
        let encrypted = cbc_encrypt_no_padding(manifest_key, &plaintext);
        std::fs::write(self.dir.path().join("Manifest.db"), encrypted).expect("write Manifest.db");
    }

    /// Writes an AES-CBC + PKCS#7-padded payload for `file_id` under
    /// `<backup_dir>/<first-2-hex>/<file_id>`.
    pub fn write_payload(&self, file_id: &str, file_key: &[u8; 32], plaintext: &[u8]) {
        let subdir = self.dir.path().join(&file_id[..2]);
        std::fs::create_dir_all(&subdir).unwrap();
        let ciphertext = cbc_encrypt(file_key, plaintext);
        std::fs::write(subdir.join(file_id), ciphertext).unwrap();
    }
}
