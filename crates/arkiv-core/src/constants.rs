//! Numeric codes and shared limits
//!
//! The codes here are stored as-is in the database and exchanged with remote
//! sites, so they must stay stable across releases.

/// Medium class code ranges. A medium type code in `[DISK, TAPE)` is a disk,
/// `[TAPE, CAS)` is a tape and everything at or above `CAS` is
/// content-addressable.
pub const DISK: i32 = 200;
pub const TAPE: i32 = 300;
pub const CAS: i32 = 400;

/// Known medium type codes and their vendor labels.
pub const MEDIUM_TYPES: &[(i32, &str)] = &[
    (200, "DISK"),
    (301, "IBM-LTO1"),
    (302, "IBM-LTO2"),
    (303, "IBM-LTO3"),
    (304, "IBM-LTO4"),
    (305, "IBM-LTO5"),
    (306, "IBM-LTO6"),
    (325, "HP-LTO5"),
    (326, "HP-LTO6"),
    (401, "HDFS"),
    (402, "HDFS-REST"),
];

pub fn medium_type_label(medium_type: i32) -> Option<&'static str> {
    MEDIUM_TYPES
        .iter()
        .find(|(code, _)| *code == medium_type)
        .map(|(_, label)| *label)
}

/// Tape block sizes are stored in 512-byte units.
pub const BLOCK_UNIT: i32 = 512;

/// Default block size for new media, in 512-byte units (512 KiB).
pub const DEFAULT_BLOCK_SIZE: i32 = 1024;

/// Default medium label format for new media.
pub const DEFAULT_FORMAT: i32 = 103;

/// Maximum number of non-forced robot queue entries handled per poll.
pub const ROBOT_POLL_BATCH: usize = 5;

/// Request timeout for remote site calls, in seconds.
pub const REMOTE_TIMEOUT_SECS: u64 = 60;

/// Bounded retry policy for transient network failures.
pub const REMOTE_RETRY_ATTEMPTS: u32 = 5;
pub const REMOTE_RETRY_DELAY_SECS: u64 = 60;

/// Sleep between polls of a long-running remote job.
pub const REMOTE_JOB_POLL_SECS: u64 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn medium_type_labels() {
        assert_eq!(medium_type_label(200), Some("DISK"));
        assert_eq!(medium_type_label(305), Some("IBM-LTO5"));
        assert_eq!(medium_type_label(999), None);
    }
}
