//! Record framing for case files.
//!
//! Every file in a case directory holds exactly one record:
//!
//! ```text
//! [magic: 4 bytes][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```
//!
//! Files are replaced by writing a sibling temp file and renaming it over the
//! target, so readers see either the old or the new record.

use std::fs::{self, File};
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use serde::{de::DeserializeOwned, Serialize};

/// Current codec version.
const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying case files.
pub const MAGIC: [u8; 4] = *b"HMCF";

const HEADER_LEN: usize = MAGIC.len() + 1 + 4;

fn invalid(message: String) -> IoError {
    IoError::new(ErrorKind::InvalidData, message)
}

/// Serializes `value` into one framed record.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| invalid(format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len())
        .map_err(|_| invalid(format!("record of {} bytes is too large", data.len())))?;

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(HEADER_LEN + data.len() + 4);
    out.extend_from_slice(&MAGIC);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(out)
}

/// Decodes one framed record, verifying magic, version, size and checksum.
///
/// # Errors
/// - `InvalidData` on a bad header, an oversized record, or a CRC mismatch
/// - `UnexpectedEof` on a truncated record
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read, max_record_size: usize) -> IoResult<T> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(invalid(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {magic:?}"
        )));
    }

    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(invalid(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max_record_size {
        return Err(invalid(format!(
            "record size {len} exceeds maximum {max_record_size}"
        )));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = Hasher::new();
    hasher.update(&data);
    let computed_crc = hasher.finalize();
    if stored_crc != computed_crc {
        return Err(invalid(format!(
            "CRC mismatch: stored={stored_crc:08x}, computed={computed_crc:08x} (data corrupted)"
        )));
    }

    serde_json::from_slice(&data).map_err(|e| invalid(format!("deserialization failed: {e}")))
}

/// Reads the record stored at `path`, `None` if the file does not exist.
pub fn read_record<T: DeserializeOwned>(path: &Path, max_record_size: usize) -> IoResult<Option<T>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    decode(&mut file, max_record_size).map(Some)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the record at `path` with `value`.
///
/// Callers serialize writers of the same path.
pub fn write_record<T: Serialize>(path: &Path, value: &T, sync: bool) -> IoResult<()> {
    let bytes = encode(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        if sync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeValue, SummaryVector};
    use std::io::Cursor;
    use tempfile::tempdir;

    const MAX: usize = 1024 * 1024;

    #[test]
    fn test_roundtrip_node_value() {
        let mut vector = SummaryVector::new();
        vector.set(3, 42.0);
        let value = NodeValue::Summary(vector);

        let encoded = encode(&value).unwrap();
        let decoded: NodeValue = decode(&mut Cursor::new(encoded), MAX).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_detects_corruption() {
        let mut encoded = encode(&"time map".to_string()).unwrap();
        encoded[HEADER_LEN + 2] ^= 0xFF;

        let err = decode::<String>(&mut Cursor::new(encoded), MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_oversized_record() {
        let mut bad = MAGIC.to_vec();
        bad.push(CODEC_VERSION);
        bad.extend_from_slice(&(200_000_000u32).to_le_bytes());

        let err = decode::<String>(&mut Cursor::new(bad), MAX).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_rejects_foreign_file() {
        let err = decode::<String>(&mut Cursor::new(b"XXXX\x01".to_vec()), MAX).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn test_write_then_read_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state_map");

        assert!(read_record::<Vec<u32>>(&path, MAX).unwrap().is_none());
        write_record(&path, &vec![1u32, 2, 3], false).unwrap();
        write_record(&path, &vec![4u32], true).unwrap();

        assert_eq!(read_record::<Vec<u32>>(&path, MAX).unwrap(), Some(vec![4]));
        assert!(!temp_path(&path).exists());
    }
}
