//! # Custody Capabilities
//!
//! A share manager is the uniform capability for one custody class:
//! store, retrieve, and delete a second-level share at a location of that
//! class. The client never knows how a custody works — it looks the
//! location type up in the [`ManagerRegistry`] and calls through the
//! trait. Adding a custody class to a deployment means registering one
//! more entry, nothing else changes.

pub mod peer;
pub mod printed;
pub mod server;

pub use peer::PeerDeviceShareManager;
pub use printed::PrintedCopyShareManager;
pub use server::{HttpResponse, HttpTransport, ServerShareManager, TcpTransport};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::metadata::{LocationType, ShareLocation};

/// Errors from dispatching a share to (or fetching one from) a custody.
///
/// These are carried as per-share values in sharing and recovery results;
/// one failing custody never aborts its peers.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// The location was routed to a manager of a different custody class.
    #[error("location type {got} handed to the {expected} manager")]
    WrongLocationType {
        expected: LocationType,
        got: LocationType,
    },

    /// The location fails its own invariants (empty name, non-https
    /// server URL, …).
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// No manager is registered for the location's custody class.
    #[error("no share manager registered for {0}")]
    NoManager(LocationType),

    /// The custody exists in the design but not in this build.
    #[error("{0} is not yet implemented")]
    NotImplemented(&'static str),

    /// The HTTP transport failed before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The secondary channel failed to deliver the token.
    #[error("token delivery failed: {0}")]
    Channel(#[from] ChannelError),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    /// The server's success response could not be interpreted.
    #[error("malformed server response: {0}")]
    BadResponse(String),
}

/// The uniform capability each custody class implements.
///
/// All three operations are asynchronous; the server-backed manager
/// suspends across an HTTP round-trip and an out-of-band token delivery,
/// and the interactive custodies suspend on a human.
#[async_trait]
pub trait ShareManager: Send + Sync {
    /// Places `share` at `location` under the owner's `secret_name`.
    async fn store(
        &self,
        secret_name: &str,
        share: &[u8],
        location: &ShareLocation,
    ) -> Result<(), CustodyError>;

    /// Fetches the share bytes kept at `location`.
    async fn retrieve(
        &self,
        secret_name: &str,
        location: &ShareLocation,
    ) -> Result<Vec<u8>, CustodyError>;

    /// Destroys the share kept at `location`.
    async fn delete(
        &self,
        secret_name: &str,
        location: &ShareLocation,
    ) -> Result<(), CustodyError>;
}

/// Maps each custody class to the capability handling it.
#[derive(Clone, Default)]
pub struct ManagerRegistry {
    managers: HashMap<LocationType, Arc<dyn ShareManager>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the manager for one custody class.
    pub fn register(&mut self, location_type: LocationType, manager: Arc<dyn ShareManager>) {
        self.managers.insert(location_type, manager);
    }

    /// Resolves the manager for a location's custody class.
    pub fn resolve(&self, location_type: LocationType) -> Result<&Arc<dyn ShareManager>, CustodyError> {
        self.managers
            .get(&location_type)
            .ok_or(CustodyError::NoManager(location_type))
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("custody_types", &self.managers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_registry_resolves_nothing() {
        let registry = ManagerRegistry::new();
        assert!(matches!(
            registry.resolve(LocationType::Server),
            Err(CustodyError::NoManager(LocationType::Server))
        ));
    }

    #[tokio::test]
    async fn registered_manager_is_resolved() {
        let mut registry = ManagerRegistry::new();
        registry.register(
            LocationType::Printed,
            Arc::new(PrintedCopyShareManager::new()),
        );
        assert!(registry.resolve(LocationType::Printed).is_ok());
        assert!(registry.resolve(LocationType::Peer).is_err());
    }
}
