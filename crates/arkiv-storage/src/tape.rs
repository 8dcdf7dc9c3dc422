//! Tape placement driver
//!
//! The robot arm is driven through `mtx`, drive positioning through `mt`.
//! Content is streamed as a tar archive directly against the drive device,
//! buffered at the medium's block size. One tape position holds one
//! archive: the container next to its description documents.

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use arkiv_core::constants::BLOCK_UNIT;
use arkiv_core::models::MediumClass;

use crate::traits::{
    DriverError, DriverResult, PlacementDriver, ReadRequest, WriteRequest,
};

async fn run_command(program: &str, args: &[String]) -> DriverResult<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| DriverError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(DriverError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Move a tape from its slot into a drive.
pub async fn load_tape(robot_device: &str, slot_id: i32, drive_num: i32) -> DriverResult<()> {
    tracing::info!(robot = robot_device, slot = slot_id, drive = drive_num, "loading tape");
    run_command(
        "mtx",
        &[
            "-f".into(),
            robot_device.into(),
            "load".into(),
            slot_id.to_string(),
            drive_num.to_string(),
        ],
    )
    .await?;
    Ok(())
}

/// Move a tape from a drive back into its slot.
pub async fn unload_tape(robot_device: &str, slot_id: i32, drive_num: i32) -> DriverResult<()> {
    tracing::info!(robot = robot_device, slot = slot_id, drive = drive_num, "unloading tape");
    run_command(
        "mtx",
        &[
            "-f".into(),
            robot_device.into(),
            "unload".into(),
            slot_id.to_string(),
            drive_num.to_string(),
        ],
    )
    .await?;
    Ok(())
}

pub async fn rewind_tape(drive_device: &str) -> DriverResult<()> {
    run_command("mt", &["-f".into(), drive_device.into(), "rewind".into()]).await?;
    Ok(())
}

/// Current file number of the tape in the drive, from `mt status`.
pub async fn tape_file_number(drive_device: &str) -> DriverResult<i64> {
    let status = run_command("mt", &["-f".into(), drive_device.into(), "status".into()]).await?;
    parse_file_number(&status).ok_or_else(|| {
        DriverError::DriveNotReady(format!(
            "no file number in drive status for {}",
            drive_device
        ))
    })
}

/// Position the tape at `position`, spacing forward or backward from where
/// it stands.
pub async fn set_tape_file_number(drive_device: &str, position: i64) -> DriverResult<()> {
    let current = tape_file_number(drive_device).await?;
    if position == current {
        return Ok(());
    }
    let (op, count) = if position < current {
        ("bsfm", current - position + 1)
    } else {
        ("fsf", position - current)
    };
    run_command(
        "mt",
        &[
            "-f".into(),
            drive_device.into(),
            op.into(),
            count.to_string(),
        ],
    )
    .await?;
    Ok(())
}

fn parse_file_number(status: &str) -> Option<i64> {
    let lower = status.to_lowercase();
    let idx = lower.find("file number")?;
    let rest = &lower[idx..];
    let eq = rest.find('=')?;
    let digits: String = rest[eq + 1..]
        .chars()
        .skip_while(|c| c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Stream `sources` as one tar archive onto the drive at its current
/// position.
pub async fn write_tape(
    drive_device: &str,
    sources: &[PathBuf],
    block_size_bytes: usize,
) -> DriverResult<()> {
    let device = drive_device.to_string();
    let sources = sources.to_vec();
    tokio::task::spawn_blocking(move || -> DriverResult<()> {
        let file = std::fs::OpenOptions::new().write(true).open(&device)?;
        let writer = BufWriter::with_capacity(block_size_bytes, file);
        let mut builder = tar::Builder::new(writer);
        for source in &sources {
            let name = source.file_name().ok_or_else(|| {
                DriverError::InvalidPath(format!("source has no file name: {}", source.display()))
            })?;
            if source.is_dir() {
                builder.append_dir_all(name, source)?;
            } else {
                builder.append_path_with_name(source, name)?;
            }
        }
        let mut writer = builder.into_inner()?;
        writer.flush()?;
        Ok(())
    })
    .await
    .map_err(|e| DriverError::WriteFailed(format!("tape write task failed: {}", e)))?
}

/// Read the archive at the drive's current position into `destination`.
pub async fn read_tape(
    drive_device: &str,
    destination: &Path,
    block_size_bytes: usize,
) -> DriverResult<()> {
    let device = drive_device.to_string();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || -> DriverResult<()> {
        std::fs::create_dir_all(&destination)?;
        let file = std::fs::File::open(&device)?;
        let reader = BufReader::with_capacity(block_size_bytes, file);
        let mut archive = tar::Archive::new(reader);
        archive.unpack(&destination)?;
        Ok(())
    })
    .await
    .map_err(|e| DriverError::ReadFailed(format!("tape read task failed: {}", e)))?
}

/// Tape placement driver
#[derive(Debug, Clone, Default)]
pub struct TapeDriver;

impl TapeDriver {
    pub fn new() -> Self {
        TapeDriver
    }

    fn block_size_bytes(block_size: i32) -> usize {
        (block_size.max(1) as usize) * BLOCK_UNIT as usize
    }
}

#[async_trait]
impl PlacementDriver for TapeDriver {
    async fn write(&self, request: WriteRequest<'_>) -> DriverResult<String> {
        let device = request.drive_device.ok_or_else(|| {
            DriverError::DriveNotReady("tape write without a mounted drive".into())
        })?;
        let position = request.position.ok_or_else(|| {
            DriverError::WriteFailed("tape write without a position".into())
        })?;

        set_tape_file_number(device, position).await?;
        write_tape(
            device,
            request.sources,
            Self::block_size_bytes(request.medium.block_size),
        )
        .await?;

        tracing::info!(
            medium = %request.medium.medium_id,
            device,
            position,
            "wrote placement to tape"
        );
        Ok(position.to_string())
    }

    async fn read(&self, request: ReadRequest<'_>) -> DriverResult<PathBuf> {
        let device = request.drive_device.ok_or_else(|| {
            DriverError::DriveNotReady("tape read without a mounted drive".into())
        })?;

        set_tape_file_number(device, request.object.position()).await?;
        read_tape(
            device,
            request.destination,
            Self::block_size_bytes(request.medium.block_size),
        )
        .await?;

        if request.object.container {
            Ok(request.destination.join(request.package.container_name()))
        } else {
            Ok(request.destination.to_path_buf())
        }
    }

    fn class(&self) -> MediumClass {
        MediumClass::Tape
    }
}
