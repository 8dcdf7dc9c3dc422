//! Container packaging.
//!
//! Migration between loose and containerized tiers converts placements on
//! the fly: a content tree is packed into a tar or zip container next to its
//! generated description documents, and a container is unpacked back into a
//! tree. The container holds the content under the package's identifier so
//! extraction reproduces the loose layout.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use arkiv_core::models::{ContainerFormat, InformationPackage};
use arkiv_core::{Result, StorageError};

fn io_err(err: std::io::Error) -> StorageError {
    StorageError::Other(err.into())
}

/// Pack `content` into a container in `staging` and generate the package
/// description document next to it, plus the archive-unit document when the
/// package belongs to one. Returns the produced files, container first.
pub async fn build_container(
    content: &Path,
    package: &InformationPackage,
    staging: &Path,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(staging).await.map_err(io_err)?;
    let container = staging.join(package.container_name());

    let format = package.container_format;
    let root = package.object_identifier.clone();
    let src = content.to_path_buf();
    let dst = container.clone();
    tokio::task::spawn_blocking(move || match format {
        ContainerFormat::Tar => pack_tar(&src, &dst, &root),
        ContainerFormat::Zip => pack_zip(&src, &dst, &root),
    })
    .await
    .map_err(|err| StorageError::Other(anyhow::anyhow!("packaging task failed: {}", err)))??;

    let mut produced = vec![container];
    let package_xml = staging.join(package.package_xml_name());
    tokio::fs::write(&package_xml, package_descriptor(package))
        .await
        .map_err(io_err)?;
    produced.push(package_xml);

    if let Some(aic_xml_name) = package.aic_xml_name() {
        let aic_xml = staging.join(aic_xml_name);
        tokio::fs::write(&aic_xml, aic_descriptor(package))
            .await
            .map_err(io_err)?;
        produced.push(aic_xml);
    }

    tracing::debug!(
        package = %package.object_identifier,
        %format,
        files = produced.len(),
        "built container"
    );
    Ok(produced)
}

/// Unpack `container` into `destination` and return the extracted content
/// tree, which sits under the package's identifier.
pub async fn extract_container(
    container: &Path,
    package: &InformationPackage,
    destination: &Path,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(destination).await.map_err(io_err)?;

    let format = package.container_format;
    let src = container.to_path_buf();
    let dst = destination.to_path_buf();
    tokio::task::spawn_blocking(move || match format {
        ContainerFormat::Tar => unpack_tar(&src, &dst),
        ContainerFormat::Zip => unpack_zip(&src, &dst),
    })
    .await
    .map_err(|err| StorageError::Other(anyhow::anyhow!("extraction task failed: {}", err)))??;

    Ok(destination.join(&package.object_identifier))
}

fn pack_tar(content: &Path, container: &Path, root: &str) -> Result<()> {
    let file = File::create(container).map_err(io_err)?;
    let mut builder = tar::Builder::new(file);
    builder.append_dir_all(root, content).map_err(io_err)?;
    builder.finish().map_err(io_err)?;
    Ok(())
}

fn unpack_tar(container: &Path, destination: &Path) -> Result<()> {
    let file = File::open(container).map_err(io_err)?;
    let mut archive = tar::Archive::new(file);
    archive.unpack(destination).map_err(io_err)?;
    Ok(())
}

fn pack_zip(content: &Path, container: &Path, root: &str) -> Result<()> {
    let file = File::create(container).map_err(io_err)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();

    let mut pending = vec![content.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            let relative = path
                .strip_prefix(content)
                .map_err(|err| StorageError::Other(err.into()))?;
            let name = format!("{}/{}", root, relative.display());
            if path.is_dir() {
                writer
                    .add_directory(name, options)
                    .map_err(|err| StorageError::Other(err.into()))?;
                pending.push(path);
            } else {
                writer
                    .start_file(name, options)
                    .map_err(|err| StorageError::Other(err.into()))?;
                let mut reader = File::open(&path).map_err(io_err)?;
                std::io::copy(&mut reader, &mut writer).map_err(io_err)?;
            }
        }
    }
    writer
        .finish()
        .map_err(|err| StorageError::Other(err.into()))?;
    Ok(())
}

fn unpack_zip(container: &Path, destination: &Path) -> Result<()> {
    let file = File::open(container).map_err(io_err)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| StorageError::Other(err.into()))?;
    archive
        .extract(destination)
        .map_err(|err| StorageError::Other(err.into()))?;
    Ok(())
}

fn package_descriptor(package: &InformationPackage) -> String {
    let digest = match (&package.message_digest, &package.message_digest_algorithm) {
        (Some(digest), Some(algorithm)) => {
            format!("\n  <digest algorithm=\"{}\">{}</digest>", algorithm, digest)
        }
        _ => String::new(),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <package id=\"{}\" label=\"{}\">\n\
         \x20 <container>{}</container>\n\
         \x20 <size>{}</size>{}\n\
         </package>\n",
        package.id,
        package.object_identifier,
        package.container_name(),
        package.object_size,
        digest,
    )
}

fn aic_descriptor(package: &InformationPackage) -> String {
    let aic = package.aic_identifier.as_deref().unwrap_or_default();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <archive-unit id=\"{}\">\n\
         \x20 <package id=\"{}\" label=\"{}\"/>\n\
         </archive-unit>\n",
        aic, package.id, package.object_identifier,
    )
}

/// Reads a directory tree into sorted (relative path, contents) pairs for
/// comparing trees after a round trip.
#[cfg(test)]
fn read_tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let mut contents = Vec::new();
                File::open(&path)
                    .unwrap()
                    .read_to_end(&mut contents)
                    .unwrap();
                files.push((path.strip_prefix(root).unwrap().to_path_buf(), contents));
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn package(format: ContainerFormat, aic: Option<&str>) -> InformationPackage {
        InformationPackage {
            id: Uuid::new_v4(),
            object_identifier: "ip-0001".into(),
            active: true,
            policy_id: None,
            object_size: 42,
            message_digest: Some("abc123".into()),
            message_digest_algorithm: Some("SHA-256".into()),
            aic_identifier: aic.map(str::to_string),
            container_format: format,
        }
    }

    fn seed_content(root: &Path) {
        std::fs::create_dir_all(root.join("representations/rep1")).unwrap();
        std::fs::write(root.join("mets.xml"), b"<mets/>").unwrap();
        std::fs::write(root.join("representations/rep1/data.bin"), b"payload").unwrap();
    }

    #[tokio::test]
    async fn tar_container_round_trips_the_content_tree() {
        let work = tempfile::tempdir().unwrap();
        let content = work.path().join("content");
        seed_content(&content);

        let ip = package(ContainerFormat::Tar, Some("aic-0001"));
        let staging = work.path().join("staging");
        let produced = build_container(&content, &ip, &staging).await.unwrap();

        let names: Vec<String> = produced
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["ip-0001.tar", "ip-0001.xml", "aic-0001.xml"]);

        let out = work.path().join("out");
        let extracted = extract_container(&produced[0], &ip, &out).await.unwrap();
        assert_eq!(extracted, out.join("ip-0001"));
        assert_eq!(read_tree(&extracted), read_tree(&content));
    }

    #[tokio::test]
    async fn zip_container_round_trips_the_content_tree() {
        let work = tempfile::tempdir().unwrap();
        let content = work.path().join("content");
        seed_content(&content);

        let ip = package(ContainerFormat::Zip, None);
        let staging = work.path().join("staging");
        let produced = build_container(&content, &ip, &staging).await.unwrap();
        assert_eq!(produced.len(), 2);
        assert!(produced[0].ends_with("ip-0001.zip"));

        let out = work.path().join("out");
        let extracted = extract_container(&produced[0], &ip, &out).await.unwrap();
        assert_eq!(read_tree(&extracted), read_tree(&content));
    }

    #[tokio::test]
    async fn descriptors_carry_identity_and_digest() {
        let work = tempfile::tempdir().unwrap();
        let content = work.path().join("content");
        seed_content(&content);

        let ip = package(ContainerFormat::Tar, Some("aic-0001"));
        let staging = work.path().join("staging");
        let produced = build_container(&content, &ip, &staging).await.unwrap();

        let package_xml = std::fs::read_to_string(&produced[1]).unwrap();
        assert!(package_xml.contains(&format!("id=\"{}\"", ip.id)));
        assert!(package_xml.contains("<container>ip-0001.tar</container>"));
        assert!(package_xml.contains("algorithm=\"SHA-256\""));

        let aic_xml = std::fs::read_to_string(&produced[2]).unwrap();
        assert!(aic_xml.contains("archive-unit id=\"aic-0001\""));
    }
}
