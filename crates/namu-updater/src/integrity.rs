//! Package checksum verification.
//!
//! Only integrity is checked here: a SHA-256 published next to the package
//! must match the downloaded bytes. There is no signature scheme.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::InstallError;

/// Buffer size for reading files during hash computation.
const HASH_BUFFER_SIZE: usize = 8192;

/// Compute the SHA-256 of a file, reading it in chunks.
pub fn sha256_file(path: &Path) -> Result<[u8; 32], std::io::Error> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().into())
}

/// Check `path` against a hex-encoded SHA-256.
///
/// The comparison is constant time. An expected value that is not 64 hex
/// digits can never match and is reported as a mismatch.
pub fn verify_sha256(path: &Path, expected_hex: &str) -> Result<(), InstallError> {
    let actual = sha256_file(path)?;
    let expected = hex::decode(expected_hex.trim()).unwrap_or_default();

    if expected.len() != actual.len() || actual[..].ct_eq(&expected[..]).unwrap_u8() != 1 {
        tracing::error!(
            expected = %expected_hex,
            actual = %hex::encode(actual),
            path = %path.display(),
            "Package checksum mismatch"
        );
        return Err(InstallError::ChecksumMismatch {
            expected: expected_hex.to_ascii_lowercase(),
            actual: hex::encode(actual),
        });
    }

    tracing::debug!(
        hash = %hex::encode(actual),
        path = %path.display(),
        "Package checksum verified"
    );
    Ok(())
}
