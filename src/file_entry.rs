//! Decodes the per-file keyed-archive property-list blob stored in the
//! index's `file` column into a protection class and wrapped key.

use crate::error::{Error, Result};

/// A decoded file entry. `wrapped_key` is absent for directories, symlinks,
/// and other entries with no ciphertext of their own.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub protection_class: i64,
    pub wrapped_key: Option<Vec<u8>>,
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::ManifestCorrupt {
        reason: reason.into(),
    }
}

/// Resolves a `$top.root`-style UID reference into the `$objects` array.
fn resolve_uid(objects: &[plist::Value], value: &plist::Value) -> Result<usize> {
    let uid = value
        .as_uid()
        .ok_or_else(|| corrupt("expected a UID reference"))?;
    let index = uid.get() as usize;
    if index >= objects.len() {
        return Err(corrupt(format!(
            "UID {index} out of range for {} objects",
            objects.len()
        )));
    }
    Ok(index)
}

/// Decodes `file_bplist` (the binary property list from the index's `file`
/// column) into a [`FileEntry`].
pub fn decode(file_bplist: &[u8]) -> Result<FileEntry> {
    let value = plist::Value::from_reader(std::io::Cursor::new(file_bplist))
        .map_err(|e| corrupt(format!("file entry is not a valid property list: {e}")))?;

    let top = value
        .as_dictionary()
        .ok_or_else(|| corrupt("file entry top level is not a dictionary"))?;
    let objects = top
        .get("$objects")
        .and_then(|v| v.as_array())
        .ok_or_else(|| corrupt("file entry missing $objects array"))?;
    let root_ref = top
        .get("$top")
        .and_then(|v| v.as_dictionary())
        .and_then(|d| d.get("root"))
        .ok_or_else(|| corrupt("file entry missing $top.root"))?;

    let root_index = resolve_uid(objects, root_ref)?;
    let root = objects[root_index]
        .as_dictionary()
        .ok_or_else(|| corrupt("file entry root object is not a dictionary"))?;

    let protection_class = root
        .get("ProtectionClass")
        .and_then(|v| v.as_signed_integer())
        .ok_or_else(|| corrupt("file entry root missing ProtectionClass"))?;

    let wrapped_key = match root.get("EncryptionKey") {
        None => None,
        Some(key_ref) => {
            let key_index = resolve_uid(objects, key_ref)?;
            let key_obj = objects[key_index]
                .as_dictionary()
                .ok_or_else(|| corrupt("EncryptionKey object is not a dictionary"))?;
            let ns_data = key_obj
                .get("NS.data")
                .and_then(|v| v.as_data())
                .ok_or_else(|| corrupt("EncryptionKey object missing NS.data"))?;
            if ns_data.len() < 4 {
                return Err(corrupt("EncryptionKey shorter than its 4-byte prefix"));
            }
            Some(ns_data[4..].to_vec())
        }
    };

    Ok(FileEntry {
        protection_class,
        wrapped_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::{Dictionary, Value};

    fn build_keyed_archive(protection_class: i64, encryption_key: Option<Vec<u8>>) -> Vec<u8> {
        let mut objects = vec![Value::String("$null".to_string())];

        let mut root = Dictionary::new();
        root.insert(
            "ProtectionClass".to_string(),
            Value::Integer(protection_class.into()),
        );
        if let Some(key_bytes) = encryption_key {
            let mut ns_data = Dictionary::new();
            ns_data.insert("NS.data".to_string(), Value::Data(key_bytes));
            objects.push(Value::Dictionary(ns_data));
            root.insert(
                "EncryptionKey".to_string(),
                Value::Uid(plist::Uid::new(1)),
            );
        }
        objects.push(Value::Dictionary(root));
        let root_index = objects.len() - 1;

        let mut top = Dictionary::new();
        let mut top_root = Dictionary::new();
        top_root.insert("root".to_string(), Value::Uid(plist::Uid::new(root_index as u64)));
        top.insert("$top".to_string(), Value::Dictionary(top_root));
        top.insert("$objects".to_string(), Value::Array(objects));

        let mut buf = Vec::new();
        Value::Dictionary(top)
            .to_writer_binary(&mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn decodes_protection_class_and_strips_encryption_key_prefix() {
        let mut key = vec![0, 0, 0, 4]; // 4-byte length prefix
        key.extend_from_slice(&[0xAB; 40]);
        let blob = build_keyed_archive(3, Some(key));

        let entry = decode(&blob).unwrap();
        assert_eq!(entry.protection_class, 3);
        assert_eq!(entry.wrapped_key, Some(vec![0xABu8; 40]));
    }

    #[test]
    fn entry_without_encryption_key_has_no_wrapped_key() {
        let blob = build_keyed_archive(1, None);
        let entry = decode(&blob).unwrap();
        assert_eq!(entry.protection_class, 1);
        assert!(entry.wrapped_key.is_none());
    }

    #[test]
    fn garbage_input_is_manifest_corrupt() {
        let err = decode(b"not a plist at all").unwrap_err();
        assert!(matches!(err, Error::ManifestCorrupt { .. }));
    }
}
