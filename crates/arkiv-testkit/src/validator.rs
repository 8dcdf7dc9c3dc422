//! Checksum validator used by sealing tests.

use std::path::Path;

use async_trait::async_trait;

use arkiv_core::{verify_digest, Result, StorageError, Validator, ValidatorOptions};

/// File validator for sealing tests. Without an expected digest it only
/// checks that the file is present and readable.
#[derive(Default)]
pub struct ChecksumValidator;

#[async_trait]
impl Validator for ChecksumValidator {
    async fn validate(&self, path: &Path, options: &ValidatorOptions) -> Result<()> {
        let content = tokio::fs::read(path).await.map_err(|err| {
            StorageError::Verification {
                subject: path.display().to_string(),
                message: format!("unreadable: {}", err),
            }
        })?;
        verify_digest(&path.display().to_string(), &content, options)
    }
}
