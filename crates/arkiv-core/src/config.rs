//! Configuration module
//!
//! Runtime settings consumed by the storage services: database connection,
//! the physical location label stamped onto new media, the agent identifier
//! recorded as the creator of media and placements, temp/verify staging roots
//! and remote TLS verification.

use std::env;
use std::path::PathBuf;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MEDIUM_LOCATION: &str = "Media";

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Physical location label recorded on newly allocated media.
    pub medium_location: String,
    /// Identifier of this installation, recorded as the creating agent.
    pub agent_identifier: String,
    /// Staging root for reads, repackaging and migration.
    pub temp_root: PathBuf,
    /// Staging root for sealing verification reads.
    pub verify_root: PathBuf,
    /// Whether to verify TLS certificates of other sites.
    pub verify_remote_tls: bool,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let agent_identifier = match env::var("AGENT_IDENTIFIER") {
            Ok(agent) => agent,
            Err(_) => hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "arkiv".to_string()),
        };

        let temp_root = env::var("TEMP_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("arkiv"));

        let verify_root = env::var("VERIFY_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| temp_root.join("verify"));

        let config = StorageConfig {
            database_url: env::var("ARKIV_DATABASE_URL")
                .or_else(|_| env::var("DATABASE_URL"))
                .map_err(|_| anyhow::anyhow!("ARKIV_DATABASE_URL or DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            medium_location: env::var("MEDIUM_LOCATION")
                .unwrap_or_else(|_| DEFAULT_MEDIUM_LOCATION.to_string()),
            agent_identifier,
            temp_root,
            verify_root,
            verify_remote_tls: env::var("VERIFY_REMOTE_TLS")
                .unwrap_or_else(|_| "true".to_string())
                .to_lowercase()
                .parse()
                .unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("postgresql://") && !self.database_url.starts_with("postgres://") {
            return Err(anyhow::anyhow!(
                "ARKIV_DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.agent_identifier.is_empty() {
            return Err(anyhow::anyhow!("AGENT_IDENTIFIER cannot be empty"));
        }

        Ok(())
    }
}
