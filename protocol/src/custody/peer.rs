//! Peer-device custody: the share is relayed to a co-present device over
//! NFC or Bluetooth and the peer's owner acknowledges interactively. The
//! radio relay has not landed in this build; every operation reports
//! not-yet-implemented while the location bookkeeping stays live.

use async_trait::async_trait;

use crate::metadata::{LocationType, ShareLocation};

use super::{CustodyError, ShareManager};

/// Share manager for the peer-device custody class.
#[derive(Debug, Default)]
pub struct PeerDeviceShareManager;

impl PeerDeviceShareManager {
    pub fn new() -> Self {
        Self
    }

    fn check_location(location: &ShareLocation) -> Result<(), CustodyError> {
        if location.location_type != LocationType::Peer {
            return Err(CustodyError::WrongLocationType {
                expected: LocationType::Peer,
                got: location.location_type,
            });
        }
        location
            .validate()
            .map_err(|e| CustodyError::InvalidLocation(e.to_string()))
    }
}

#[async_trait]
impl ShareManager for PeerDeviceShareManager {
    async fn store(
        &self,
        _secret_name: &str,
        _share: &[u8],
        location: &ShareLocation,
    ) -> Result<(), CustodyError> {
        Self::check_location(location)?;
        Err(CustodyError::NotImplemented("peer-device storage"))
    }

    async fn retrieve(
        &self,
        _secret_name: &str,
        location: &ShareLocation,
    ) -> Result<Vec<u8>, CustodyError> {
        Self::check_location(location)?;
        Err(CustodyError::NotImplemented("peer-device retrieval"))
    }

    async fn delete(
        &self,
        _secret_name: &str,
        location: &ShareLocation,
    ) -> Result<(), CustodyError> {
        Self::check_location(location)?;
        Err(CustodyError::NotImplemented("peer-device deletion"))
    }
}
