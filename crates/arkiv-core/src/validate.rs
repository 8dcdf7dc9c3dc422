//! Validator seam
//!
//! Sealing a medium verifies a sample of its placements before the status
//! flips to Full. The validation engine itself lives outside this system;
//! it is invoked through this trait with the expected digest taken from the
//! package record.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Result, StorageError};

/// Expected-checksum bundle handed to the validator.
#[derive(Debug, Clone, Default)]
pub struct ValidatorOptions {
    /// Hex digest the content must hash to. `None` skips the comparison and
    /// only checks that the content is present and readable.
    pub expected: Option<String>,
    /// Digest algorithm name, e.g. "SHA-256".
    pub algorithm: Option<String>,
}

#[async_trait]
pub trait Validator: Send + Sync {
    /// Validate the file at `path` against `options`, returning
    /// `StorageError::Verification` on mismatch.
    async fn validate(&self, path: &Path, options: &ValidatorOptions) -> Result<()>;
}

/// Hash `content` with the algorithm named in `options` and compare it to
/// the expected digest. No expected digest means no comparison. The default
/// algorithm is SHA-256; SHA-512 is the only other one the package records
/// carry.
pub fn verify_digest(subject: &str, content: &[u8], options: &ValidatorOptions) -> Result<()> {
    let mismatch = |message: String| StorageError::Verification {
        subject: subject.to_string(),
        message,
    };

    let Some(expected) = options.expected.as_deref() else {
        return Ok(());
    };

    let algorithm = options.algorithm.as_deref().unwrap_or("SHA-256");
    let actual = if algorithm.eq_ignore_ascii_case("sha-256") {
        hex::encode(Sha256::digest(content))
    } else if algorithm.eq_ignore_ascii_case("sha-512") {
        hex::encode(Sha512::digest(content))
    } else {
        return Err(mismatch(format!(
            "unsupported digest algorithm: {}",
            algorithm
        )));
    };

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(mismatch(format!(
            "digest mismatch, expected {} got {}",
            expected, actual
        )));
    }
    Ok(())
}
