// Hashing module: SHA-256 content digests, BLAKE3 scratch tokens

use std::fs::File;
use std::io::Read;
use std::path::Path;
use sha2::{Digest, Sha256};
use crate::constants::{HASH_CHUNK_SIZE, SCRATCH_SUFFIX_LEN};
use crate::error::{ImageSortError, Result};

/// Compute the content digest of a byte stream.
/// Returns 64 lowercase hex characters.
pub fn digest<R: Read>(mut reader: R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)
            .map_err(|e| ImageSortError::Hash(format!("Failed to read: {}", e)))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the content digest of a local file
pub fn digest_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| ImageSortError::Hash(format!("Failed to open {}: {}", path.display(), e)))?;
    digest(file)
}

/// Compute the content digest of an in-memory byte slice
pub fn digest_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Verify a file matches its stored digest
pub fn verify_file(path: &Path, expected: &str) -> Result<bool> {
    let actual = digest_file(path)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

/// Short suffix that keeps concurrently staged files with the same basename apart.
/// Keyed on a fresh per-file token, so two files never share a suffix by name alone.
pub fn scratch_suffix(device_key: &str, remote_path: &str) -> String {
    let token = uuid::Uuid::new_v4();
    let mut hasher = blake3::Hasher::new();
    hasher.update(device_key.as_bytes());
    hasher.update(&[0]);
    hasher.update(remote_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(token.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..SCRATCH_SUFFIX_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use crate::constants::DIGEST_HEX_LEN;

    #[test]
    fn test_digest_known_vector() {
        let hash = digest_bytes(b"abc");
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn test_digest_file_matches_stream_digest() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Hello, World!").unwrap();

        let from_file = digest_file(file.path()).unwrap();
        let from_stream = digest(&b"Hello, World!"[..]).unwrap();
        assert_eq!(from_file, from_stream);
        assert_eq!(from_file.len(), DIGEST_HEX_LEN);
        assert!(from_file.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_verify_file_detects_change() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"original").unwrap();
        let expected = digest_file(file.path()).unwrap();
        assert!(verify_file(file.path(), &expected).unwrap());

        file.write_all(b" plus more").unwrap();
        assert!(!verify_file(file.path(), &expected).unwrap());
    }

    #[test]
    fn test_scratch_suffix_unique_per_call() {
        let a = scratch_suffix("X/1", "/DCIM/IMG_1.jpg");
        let b = scratch_suffix("X/1", "/DCIM/IMG_1.jpg");
        assert_eq!(a.len(), SCRATCH_SUFFIX_LEN);
        assert_ne!(a, b);
    }
}
