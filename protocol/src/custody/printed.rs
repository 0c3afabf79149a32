//! Printed-copy custody: the share is rendered into a physical artifact —
//! a QR code, an OCR-friendly Base32 sheet, a 3D-printed token — and
//! retrieval means a human re-scans or re-types it. The rendering and
//! scanning pipeline has not landed, so store and retrieve report
//! not-yet-implemented; the location bookkeeping and validation are live
//! so metadata written today stays valid once the pipeline exists.

use async_trait::async_trait;

use crate::metadata::{LocationType, ShareLocation};

use super::{CustodyError, ShareManager};

/// Share manager for the printed-copy custody class.
#[derive(Debug, Default)]
pub struct PrintedCopyShareManager;

impl PrintedCopyShareManager {
    pub fn new() -> Self {
        Self
    }

    fn check_location(location: &ShareLocation) -> Result<(), CustodyError> {
        if location.location_type != LocationType::Printed {
            return Err(CustodyError::WrongLocationType {
                expected: LocationType::Printed,
                got: location.location_type,
            });
        }
        location
            .validate()
            .map_err(|e| CustodyError::InvalidLocation(e.to_string()))
    }
}

#[async_trait]
impl ShareManager for PrintedCopyShareManager {
    async fn store(
        &self,
        _secret_name: &str,
        _share: &[u8],
        location: &ShareLocation,
    ) -> Result<(), CustodyError> {
        Self::check_location(location)?;
        Err(CustodyError::NotImplemented("printed-copy storage"))
    }

    async fn retrieve(
        &self,
        _secret_name: &str,
        location: &ShareLocation,
    ) -> Result<Vec<u8>, CustodyError> {
        Self::check_location(location)?;
        Err(CustodyError::NotImplemented("printed-copy retrieval"))
    }

    async fn delete(
        &self,
        secret_name: &str,
        location: &ShareLocation,
    ) -> Result<(), CustodyError> {
        Self::check_location(location)?;
        // Destroying a physical artifact is inherently manual; succeed so
        // the caller's bookkeeping proceeds, and tell the operator.
        tracing::warn!(
            secret_name,
            location = %location.location_name,
            "printed copy must be destroyed manually"
        );
        Ok(())
    }
}
