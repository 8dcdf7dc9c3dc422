//! Disk placement driver
//!
//! Disk targets are plain directories. Containerized placements sit as
//! `<identifier>.tar` next to their description documents; loose placements
//! are directory trees named after the package.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use arkiv_core::models::MediumClass;

use crate::traits::{
    DriverError, DriverResult, PlacementDriver, ReadRequest, WriteRequest,
};

/// Local filesystem placement driver
#[derive(Debug, Clone, Default)]
pub struct DiskDriver;

impl DiskDriver {
    pub fn new() -> Self {
        DiskDriver
    }

    /// Join a stored location value onto the target root, rejecting values
    /// that would escape it.
    fn safe_join(base: &Path, value: &str) -> DriverResult<PathBuf> {
        let relative = Path::new(value);
        if relative.is_absolute() {
            return Err(DriverError::InvalidPath(format!(
                "location value is absolute: {}",
                value
            )));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(DriverError::InvalidPath(format!(
                        "location value escapes the target root: {}",
                        value
                    )));
                }
            }
        }
        Ok(base.join(relative))
    }

    /// Copy a file or a directory tree into `dst_dir`, returning the new
    /// path.
    async fn copy_entry(src: &Path, dst_dir: &Path) -> DriverResult<PathBuf> {
        let name = src.file_name().ok_or_else(|| {
            DriverError::InvalidPath(format!("source has no file name: {}", src.display()))
        })?;
        let dst = dst_dir.join(name);
        let metadata = fs::metadata(src)
            .await
            .map_err(|_| DriverError::NotFound(src.display().to_string()))?;
        if metadata.is_dir() {
            Self::copy_tree(src, &dst).await?;
        } else {
            fs::create_dir_all(dst_dir).await?;
            fs::copy(src, &dst).await.map_err(|e| {
                DriverError::WriteFailed(format!("copy {} failed: {}", src.display(), e))
            })?;
        }
        Ok(dst)
    }

    /// Copy the contents of `src` into `dst`, creating `dst`.
    async fn copy_tree(src: &Path, dst: &Path) -> DriverResult<()> {
        fs::create_dir_all(dst).await?;
        let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
        while let Some((from, to)) = pending.pop() {
            let mut entries = fs::read_dir(&from).await?;
            while let Some(entry) = entries.next_entry().await? {
                let entry_dst = to.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    fs::create_dir_all(&entry_dst).await?;
                    pending.push((entry.path(), entry_dst));
                } else {
                    fs::copy(entry.path(), &entry_dst).await.map_err(|e| {
                        DriverError::WriteFailed(format!(
                            "copy {} failed: {}",
                            entry.path().display(),
                            e
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PlacementDriver for DiskDriver {
    async fn write(&self, request: WriteRequest<'_>) -> DriverResult<String> {
        let root = Path::new(&request.target.target);
        fs::create_dir_all(root).await?;

        let mut first: Option<PathBuf> = None;
        for source in request.sources {
            let copied = Self::copy_entry(source, root).await?;
            if first.is_none() {
                first = Some(copied);
            }
        }
        let first = first.ok_or_else(|| {
            DriverError::WriteFailed("nothing to write: empty source list".into())
        })?;

        let value = first
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(
            target = %request.target.name,
            medium = %request.medium.medium_id,
            location = %value,
            "wrote placement to disk"
        );
        Ok(value)
    }

    async fn read(&self, request: ReadRequest<'_>) -> DriverResult<PathBuf> {
        let root = Path::new(&request.target.target);
        if !request.object.content_location_value.is_empty() {
            Self::safe_join(root, &request.object.content_location_value)?;
        }
        let src = request.object.path_on_target(request.target, request.package);
        fs::create_dir_all(request.destination).await?;

        if request.object.container {
            let produced = Self::copy_entry(&src, request.destination).await?;
            if request.include_xml {
                let xml = root.join(request.package.package_xml_name());
                if fs::metadata(&xml).await.is_ok() {
                    Self::copy_entry(&xml, request.destination).await?;
                }
                if let Some(aic_xml) = request.package.aic_xml_name() {
                    let aic = root.join(aic_xml);
                    if fs::metadata(&aic).await.is_ok() {
                        Self::copy_entry(&aic, request.destination).await?;
                    }
                }
            }
            Ok(produced)
        } else {
            if fs::metadata(&src).await.is_err() {
                return Err(DriverError::NotFound(src.display().to_string()));
            }
            Self::copy_tree(&src, request.destination).await?;
            Ok(request.destination.to_path_buf())
        }
    }

    fn class(&self) -> MediumClass {
        MediumClass::Disk
    }
}
