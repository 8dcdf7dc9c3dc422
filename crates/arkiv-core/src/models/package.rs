//! Archived information packages.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Container file format used when a package is stored packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Tar,
    Zip,
}

impl ContainerFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Tar => "tar",
            ContainerFormat::Zip => "zip",
        }
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for ContainerFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tar" => Ok(ContainerFormat::Tar),
            "zip" => Ok(ContainerFormat::Zip),
            other => Err(anyhow::anyhow!("unknown container format: {}", other)),
        }
    }
}

/// An archived package. Storage decisions hang off its policy; the package
/// itself never knows where its copies live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InformationPackage {
    pub id: Uuid,
    /// Stable external identifier, used for file and container names.
    pub object_identifier: String,
    pub active: bool,
    pub policy_id: Option<Uuid>,
    pub object_size: i64,
    pub message_digest: Option<String>,
    pub message_digest_algorithm: Option<String>,
    /// Identifier of the archival collection the package belongs to.
    pub aic_identifier: Option<String>,
    pub container_format: ContainerFormat,
}

impl InformationPackage {
    pub fn container_name(&self) -> String {
        format!("{}.{}", self.object_identifier, self.container_format.extension())
    }

    /// Name of the package description document shipped next to the
    /// container.
    pub fn package_xml_name(&self) -> String {
        format!("{}.xml", self.object_identifier)
    }

    pub fn aic_xml_name(&self) -> Option<String> {
        self.aic_identifier.as_ref().map(|aic| format!("{}.xml", aic))
    }
}
