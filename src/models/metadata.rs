use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

pub fn compute_sha256(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer).context("hash read")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hashes `path` and compares against a hex digest, ignoring case.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<String> {
    let checksum = compute_sha256(path)?;
    if checksum.eq_ignore_ascii_case(expected.trim()) {
        Ok(checksum)
    } else {
        Err(anyhow!(
            "checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            checksum
        ))
    }
}
