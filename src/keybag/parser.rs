//! Tagged length-value parser for the keybag binary blob.
//!
//! Record shape: `[4-byte ASCII tag][4-byte big-endian length L][L bytes value]`.
//! Header records precede an arbitrary number of `CLAS`-delimited class records.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

type Tag = [u8; 4];

fn fmt_tag(tag: &Tag) -> String {
    String::from_utf8_lossy(tag).to_string()
}

fn fail(reason: impl Into<String>) -> Error {
    Error::KeybagFormat {
        reason: reason.into(),
    }
}

/// One raw `[tag][value]` record read from the blob.
struct RawRecord {
    tag: Tag,
    value: Vec<u8>,
}

fn read_records(data: &[u8]) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if data.len() - pos < 8 {
            return Err(fail("truncated record header"));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&data[pos..pos + 4]);
        let len = u32::from_be_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
        pos += 8;
        if len > data.len() - pos {
            return Err(fail(format!(
                "record {} declares length {len} exceeding remaining {} bytes",
                fmt_tag(&tag),
                data.len() - pos
            )));
        }
        let value = data[pos..pos + len].to_vec();
        pos += len;
        records.push(RawRecord { tag, value });
    }
    Ok(records)
}

/// A parsed class record, before unlocking: the wrapped key bytes may be absent
/// for asymmetric-only classes.
#[derive(Debug, Clone)]
pub struct ClassRecord {
    pub class_id: i64,
    pub wrap: Option<i64>,
    pub key_type: Option<i64>,
    pub wrapped_key: Option<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
}

/// Parsed keybag header fields needed to derive the passphrase KEK.
#[derive(Debug, Clone)]
pub struct KeybagHeader {
    pub version: Option<i64>,
    pub keybag_type: Option<i64>,
    pub uuid: Option<Vec<u8>>,
    pub hmac_key: Option<Vec<u8>>,
    pub wrap: i64,
    pub outer_salt: Vec<u8>,
    pub outer_iterations: u32,
    pub inner_salt: Vec<u8>,
    pub inner_iterations: u32,
    /// `DPWT`: 0 selects SHA-1, 1 (the common case) selects SHA-256. Defaults to
    /// SHA-1 when the tag is absent, matching keybags produced before the
    /// second KDF stage was introduced.
    pub inner_hash: crate::kdf::InnerHash,
}

pub struct ParsedKeybag {
    pub header: KeybagHeader,
    pub classes: Vec<ClassRecord>,
}

fn be_i64(value: &[u8], tag: &str) -> Result<i64> {
    match value.len() {
        4 => Ok(i32::from_be_bytes(value.try_into().unwrap()) as i64),
        8 => Ok(i64::from_be_bytes(value.try_into().unwrap())),
        n => Err(fail(format!("tag {tag} has unexpected integer length {n}"))),
    }
}

fn be_u32(value: &[u8], tag: &str) -> Result<u32> {
    if value.len() != 4 {
        return Err(fail(format!(
            "tag {tag} expected a 4-byte integer, got {} bytes",
            value.len()
        )));
    }
    Ok(u32::from_be_bytes(value.try_into().unwrap()))
}

struct ClassBuilder {
    class_id: i64,
    wrap: Option<i64>,
    key_type: Option<i64>,
    wrapped_key: Option<Vec<u8>>,
    public_key: Option<Vec<u8>>,
}

impl ClassBuilder {
    fn new(class_id: i64) -> Self {
        ClassBuilder {
            class_id,
            wrap: None,
            key_type: None,
            wrapped_key: None,
            public_key: None,
        }
    }

    fn finish(self) -> ClassRecord {
        ClassRecord {
            class_id: self.class_id,
            wrap: self.wrap,
            key_type: self.key_type,
            wrapped_key: self.wrapped_key,
            public_key: self.public_key,
        }
    }
}

/// Parses the raw keybag blob into a header and an ordered list of class
/// records. Unrecognized tags are skipped silently (forward compatibility).
pub fn parse(data: &[u8]) -> Result<ParsedKeybag> {
    let records = read_records(data)?;

    let mut header_fields: BTreeMap<Tag, Vec<u8>> = BTreeMap::new();
    let mut classes = Vec::new();
    let mut current: Option<ClassBuilder> = None;
    // Set by CLAS or by a second top-level UUID: header accumulation is done,
    // even while no CLAS has yet opened a class record to hold further fields.
    let mut header_closed = false;

    for record in records {
        if &record.tag == b"CLAS" {
            if let Some(builder) = current.take() {
                classes.push(builder.finish());
            }
            let class_id = be_i64(&record.value, "CLAS")?;
            current = Some(ClassBuilder::new(class_id));
            header_closed = true;
            continue;
        }

        if current.is_none() && &record.tag == b"UUID" && header_fields.contains_key(b"UUID") {
            // A second top-level UUID also closes header accumulation (some
            // keybag variants key class records by UUID rather than CLAS).
            // This core only resolves CLAS-keyed classes, so the record is
            // dropped rather than folded into the header map, and later
            // fields are skipped until the next CLAS opens a real class.
            header_closed = true;
            continue;
        }

        match current.as_mut() {
            Some(builder) => match &record.tag {
                b"WRAP" => builder.wrap = Some(be_i64(&record.value, "WRAP")?),
                b"KTYP" => builder.key_type = Some(be_i64(&record.value, "KTYP")?),
                b"WPKY" => builder.wrapped_key = Some(record.value),
                b"PBKY" => builder.public_key = Some(record.value),
                _ => {} // unrecognized per-class tag: skipped silently
            },
            None if header_closed => {} // between a boundary and the next CLAS: skipped
            None => {
                header_fields.insert(record.tag, record.value);
            }
        }
    }
    if let Some(builder) = current.take() {
        classes.push(builder.finish());
    }

    let header = build_header(&header_fields)?;
    Ok(ParsedKeybag { header, classes })
}

fn build_header(fields: &BTreeMap<Tag, Vec<u8>>) -> Result<KeybagHeader> {
    let get = |tag: &[u8; 4]| fields.get(tag);
    let require = |tag: &[u8; 4]| -> Result<&Vec<u8>> {
        get(tag).ok_or_else(|| fail(format!("missing required header field {}", fmt_tag(tag))))
    };

    let outer_salt = require(b"SALT")?.clone();
    let outer_iterations = be_u32(require(b"ITER")?, "ITER")?;
    let inner_salt = require(b"DPSL")?.clone();
    let inner_iterations = be_u32(require(b"DPIC")?, "DPIC")?;
    let wrap = be_i64(require(b"WRAP")?, "WRAP")?;

    let inner_hash = match get(b"DPWT") {
        None => crate::kdf::InnerHash::Sha1,
        Some(bytes) => match be_u32(bytes, "DPWT")? {
            0 => crate::kdf::InnerHash::Sha1,
            1 => crate::kdf::InnerHash::Sha256,
            other => return Err(fail(format!("unsupported DPWT hash family id {other}"))),
        },
    };

    Ok(KeybagHeader {
        version: get(b"VERS").map(|v| be_i64(v, "VERS")).transpose()?,
        keybag_type: get(b"TYPE").map(|v| be_i64(v, "TYPE")).transpose()?,
        uuid: get(b"UUID").cloned(),
        hmac_key: get(b"HMCK").cloned(),
        wrap,
        outer_salt,
        outer_iterations,
        inner_salt,
        inner_iterations,
        inner_hash,
    })
}
