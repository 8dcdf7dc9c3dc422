//! Content-addressable store driver
//!
//! Placeholder for object-store targets (medium types 401 and 402). The
//! class is carried through the schema and queues so existing placements
//! keep their records, but no driver backs it.

use std::path::PathBuf;

use async_trait::async_trait;

use arkiv_core::models::MediumClass;

use crate::traits::{
    DriverError, DriverResult, PlacementDriver, ReadRequest, WriteRequest,
};

#[derive(Debug, Clone, Default)]
pub struct CasDriver;

impl CasDriver {
    pub fn new() -> Self {
        CasDriver
    }
}

#[async_trait]
impl PlacementDriver for CasDriver {
    async fn write(&self, _request: WriteRequest<'_>) -> DriverResult<String> {
        Err(DriverError::Unsupported("CAS".into()))
    }

    async fn read(&self, _request: ReadRequest<'_>) -> DriverResult<PathBuf> {
        Err(DriverError::Unsupported("CAS".into()))
    }

    fn class(&self) -> MediumClass {
        MediumClass::Cas
    }
}
