//! Self-describing, checksummed JSON artifacts written with atomic replace.
//!
//! Layout: `{"format":..,"version":..,"count":..,"checksum":..,"payload":..}`. The checksum
//! is the blake3 digest of the exact payload bytes, which are kept verbatim through
//! `RawValue` so verification never depends on re-serialization order.

use std::io::Write;
use std::path::Path;

use atomic_write_file::AtomicWriteFile;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::constants::FORMAT_VERSION;
use crate::error::{Result, VaultError};

#[derive(Serialize, Deserialize)]
struct Envelope<'a> {
    format: String,
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<u64>,
    checksum: String,
    #[serde(borrow)]
    payload: &'a RawValue,
}

/// Serialize `payload` into envelope bytes without touching disk.
pub fn encode<T: Serialize + ?Sized>(
    format: &str,
    count: Option<u64>,
    payload: &T,
) -> Result<Vec<u8>> {
    let raw = serde_json::value::to_raw_value(payload)?;
    let checksum = blake3::hash(raw.get().as_bytes()).to_hex().to_string();
    let envelope = Envelope {
        format: format.to_string(),
        version: FORMAT_VERSION,
        count,
        checksum,
        payload: &*raw,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Verify and decode envelope bytes. `path` only labels errors.
pub fn decode<T: DeserializeOwned>(bytes: &[u8], format: &str, path: &Path) -> Result<T> {
    let envelope: Envelope<'_> = serde_json::from_slice(bytes)
        .map_err(|err| VaultError::integrity(path, format!("malformed envelope: {err}")))?;
    if envelope.format != format {
        return Err(VaultError::integrity(
            path,
            format!("expected format {format}, found {}", envelope.format),
        ));
    }
    if envelope.version > FORMAT_VERSION {
        return Err(VaultError::integrity(
            path,
            format!(
                "format version {} is newer than supported {FORMAT_VERSION}",
                envelope.version
            ),
        ));
    }
    let actual = blake3::hash(envelope.payload.get().as_bytes());
    if actual.to_hex().as_str() != envelope.checksum {
        tracing::error!(
            path = %path.display(),
            expected = %envelope.checksum,
            actual = %actual.to_hex(),
            "envelope checksum mismatch"
        );
        return Err(VaultError::integrity(path, "payload checksum mismatch"));
    }
    serde_json::from_str(envelope.payload.get())
        .map_err(|err| VaultError::integrity(path, format!("undecodable payload: {err}")))
}

/// Replace `path` with `bytes`: written to a sibling temp file, fsynced, then renamed.
/// A crash at any point leaves either the old file or the new one, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = AtomicWriteFile::open(path)?;
    file.write_all(bytes)?;
    file.commit()?;
    Ok(())
}

/// Encode and atomically persist `payload`, returning the bytes written.
pub fn write<T: Serialize + ?Sized>(
    path: &Path,
    format: &str,
    count: Option<u64>,
    payload: &T,
) -> Result<Vec<u8>> {
    let bytes = encode(format, count, payload)?;
    write_atomic(path, &bytes)?;
    Ok(bytes)
}

/// Read and verify an envelope; `Ok(None)` when the file does not exist.
pub fn read<T: DeserializeOwned>(path: &Path, format: &str) -> Result<Option<T>> {
    match fs_err::read(path) {
        Ok(bytes) => decode(&bytes, format, path).map(Some),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_verifies_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.json");
        write(&path, "test/numbers", Some(3), &vec![1u32, 2, 3]).unwrap();

        let back: Option<Vec<u32>> = read(&path, "test/numbers").unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let back: Option<Vec<u32>> = read(&dir.path().join("absent.json"), "test/numbers").unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn tampered_payload_is_an_integrity_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.json");
        write(&path, "test/numbers", None, &vec![1u32, 2, 3]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replace("[1,2,3]", "[1,2,4]")).unwrap();

        let err = read::<Vec<u32>>(&path, "test/numbers").unwrap_err();
        match err {
            VaultError::Integrity { reason, .. } => assert!(reason.contains("checksum")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn truncated_file_is_an_integrity_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.json");
        let bytes = write(&path, "test/numbers", None, &vec![1u32, 2, 3]).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(read::<Vec<u32>>(&path, "test/numbers").unwrap_err().is_integrity());
    }

    #[test]
    fn wrong_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("numbers.json");
        write(&path, "test/numbers", None, &vec![1u32]).unwrap();
        assert!(read::<Vec<u32>>(&path, "test/other").unwrap_err().is_integrity());
    }
}
