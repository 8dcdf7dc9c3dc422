//! Storage targets: a series of tapes or a single disk.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::MediumClass;

/// One physical or logical storage location: a disk mount point, a tape pool
/// identified by a barcode prefix, or an object-store bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageTarget {
    pub id: Uuid,
    pub name: String,
    /// Availability flag; unavailable targets are never read from or written
    /// to.
    pub status: bool,
    /// Concrete medium type code, e.g. 200 (DISK) or 305 (IBM-LTO5).
    pub medium_type: i32,
    /// Default block size for new media, in 512-byte units (tape only).
    pub default_block_size: i32,
    /// Default medium label format for new media.
    pub default_format: i32,
    /// Warn when remaining capacity drops below this. 0 disables.
    pub min_capacity_warning: i64,
    /// Seal media growing past this. 0 disables.
    pub max_capacity: i64,
    /// `host,user,password` of the site this target is actually served from.
    pub remote_server: Option<String>,
    /// `host,user,password` of the master site this target serves.
    pub master_server: Option<String>,
    /// URL, path or barcode prefix.
    pub target: String,
}

impl StorageTarget {
    pub fn class(&self) -> MediumClass {
        MediumClass::from_medium_type(self.medium_type)
    }

    /// Reads and writes are relayed through another site.
    pub fn has_remote_relay(&self) -> bool {
        self.remote_server.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// This site serves the target on behalf of a master site.
    pub fn serves_master(&self) -> bool {
        self.master_server.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Credentials parsed from a `host,user,password` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl RemoteCredentials {
    pub fn parse(connection: &str) -> Result<Self> {
        let mut parts = connection.splitn(3, ',');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(user), Some(password))
                if !host.is_empty() && !user.is_empty() =>
            {
                Ok(RemoteCredentials {
                    host: host.trim_end_matches('/').to_string(),
                    user: user.to_string(),
                    password: password.to_string(),
                })
            }
            _ => Err(StorageError::BadConnectionString),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_user_password() {
        let creds = RemoteCredentials::parse("https://site-b.example.com/,admin,secret").unwrap();
        assert_eq!(creds.host, "https://site-b.example.com");
        assert_eq!(creds.user, "admin");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn password_may_contain_commas() {
        let creds = RemoteCredentials::parse("https://b.example.com,admin,s,e,c").unwrap();
        assert_eq!(creds.password, "s,e,c");
    }

    #[test]
    fn rejects_malformed_strings() {
        assert!(RemoteCredentials::parse("").is_err());
        assert!(RemoteCredentials::parse("https://b.example.com").is_err());
        assert!(RemoteCredentials::parse("https://b.example.com,admin").is_err());
    }

    #[test]
    fn relay_flags_ignore_empty_strings() {
        let mut target = StorageTarget {
            id: Uuid::new_v4(),
            name: "tape1".into(),
            status: true,
            medium_type: 305,
            default_block_size: 1024,
            default_format: 103,
            min_capacity_warning: 0,
            max_capacity: 0,
            remote_server: Some(String::new()),
            master_server: None,
            target: "ST".into(),
        };
        assert!(!target.has_remote_relay());
        assert!(!target.serves_master());

        target.remote_server = Some("https://b.example.com,u,p".into());
        assert!(target.has_remote_relay());
        assert_eq!(target.class(), MediumClass::Tape);
    }
}
