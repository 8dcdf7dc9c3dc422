//! File-digest validator used when sealing media from the command line.

use std::path::Path;

use async_trait::async_trait;

use arkiv_core::{verify_digest, Result, StorageError, Validator, ValidatorOptions};

/// Hashes the stored file and compares it against the digest recorded on the
/// package. With no expected digest it only checks that the file is readable.
pub struct DigestValidator;

#[async_trait]
impl Validator for DigestValidator {
    async fn validate(&self, path: &Path, options: &ValidatorOptions) -> Result<()> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|err| StorageError::Verification {
                subject: path.display().to_string(),
                message: format!("unreadable: {}", err),
            })?;
        verify_digest(&path.display().to_string(), &content, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha512};

    #[tokio::test]
    async fn sha512_digest_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.tar");
        tokio::fs::write(&path, b"archived bytes").await.unwrap();

        let options = ValidatorOptions {
            expected: Some(hex::encode(Sha512::digest(b"archived bytes"))),
            algorithm: Some("SHA-512".into()),
        };
        DigestValidator.validate(&path, &options).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_algorithm_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.tar");
        tokio::fs::write(&path, b"archived bytes").await.unwrap();

        let options = ValidatorOptions {
            expected: Some("deadbeef".into()),
            algorithm: Some("MD5".into()),
        };
        let err = DigestValidator.validate(&path, &options).await.unwrap_err();
        assert!(matches!(err, StorageError::Verification { .. }));
    }
}
