//! # Sharing Client
//!
//! Orchestrates the two-level construction end to end.
//!
//! Sharing: draw a salt and a first-level mask, hash the secret, mask it,
//! run `SV_hash || SH2` through the Shamir codec, hash every share, and
//! dispatch each one to its custody through the manager registry. Every
//! dispatch outcome — success or failure — is a value in the result; the
//! metadata always comes back, and shares that could not be placed are
//! returned to the caller for manual storage.
//!
//! Recovery: fetch every listed share, drop anything whose salted hash
//! does not match, reconstruct, unmask, and verify the recovered value
//! against the embedded hash. Anything short of a verified end-to-end
//! match is a hard failure — no partially reconstructed value ever
//! escapes.

use futures::future::join_all;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

use crate::config::{DEFAULT_SALT_LEN, HASH_LEN, SCHEME_TYPE_SHAMIR};
use crate::crypto::{salted_hash, HashError};
use crate::custody::{CustodyError, ManagerRegistry, ShareManager};
use crate::metadata::{MetadataError, ShareLocation, ShareMetadata, SharingMetadata};
use crate::sharing::shamir::{ShamirError, ShamirScheme, ShamirShare};

/// Errors that abort a sharing or recovery as a whole. Per-share troubles
/// are *not* here — they ride inside the results as values.
#[derive(Debug, Error)]
pub enum SharingError {
    /// An input failed validation before any work happened.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The metadata names a sharing scheme this client does not know.
    #[error("unknown sharing scheme type {0:?}")]
    UnknownSchemeType(String),

    /// The Shamir codec rejected its inputs.
    #[error(transparent)]
    Shamir(#[from] ShamirError),

    /// The metadata record is invalid.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The salted-hash construction rejected the salt.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Fewer shares than the threshold retrieved and verified.
    #[error("too few shares: {got} verified, need {needed}")]
    TooFewShares { needed: u32, got: usize },

    /// The reconstructed value does not line up with the metadata
    /// (shorter than the embedded hash, or a mask-length mismatch).
    #[error("reconstructed value is inconsistent with the sharing metadata")]
    Inconsistent,

    /// The recovered value fails the final hash check.
    #[error("incorrect hash for the recovered secret")]
    IncorrectHash,
}

/// Why one share could not be used during recovery.
#[derive(Debug, Error)]
pub enum ShareFailure {
    /// The custody could not produce the share.
    #[error(transparent)]
    Custody(#[from] CustodyError),

    /// The share came back, but its salted hash does not match the
    /// metadata — corrupted or substituted, either way unusable.
    #[error("share hash mismatch")]
    HashMismatch,
}

/// A share the client could not place automatically. The caller must
/// store it through some other channel or re-share.
#[derive(Debug)]
pub struct UnstoredShare {
    /// The location the share was meant for.
    pub location: ShareLocation,
    /// The wire-form share bytes.
    pub share: Vec<u8>,
    /// Why the dispatch failed.
    pub failure: CustodyError,
}

/// Outcome of [`SharingClient::share_secret`].
#[derive(Debug)]
pub struct SharingResult {
    /// The record to persist with the cloud provider.
    pub metadata: SharingMetadata,
    /// Shares needing caller follow-up, in location order.
    pub shares_to_be_stored: Vec<UnstoredShare>,
}

/// Per-location outcome of a recovery attempt.
#[derive(Debug)]
pub struct ShareData {
    /// The share's metadata entry.
    pub metadata: ShareMetadata,
    /// The retrieved bytes, if retrieval succeeded.
    pub bytes: Option<Vec<u8>>,
    /// The failure, if the share could not be used.
    pub failure: Option<ShareFailure>,
}

/// Outcome of [`SharingClient::recover_secret`].
#[derive(Debug)]
pub struct RecoveryResult {
    /// The verified secret value.
    pub secret: Vec<u8>,
    /// One entry per metadata location, in metadata order.
    pub share_data_list: Vec<ShareData>,
}

/// The client-side orchestrator. Cheap to construct; holds only the
/// custody registry.
#[derive(Debug, Clone)]
pub struct SharingClient {
    registry: ManagerRegistry,
}

impl SharingClient {
    pub fn new(registry: ManagerRegistry) -> Self {
        Self { registry }
    }

    /// The custody registry this client dispatches through.
    pub fn registry(&self) -> &ManagerRegistry {
        &self.registry
    }

    /// Shares `secret` as `k`-of-`n` across `locations`.
    ///
    /// Dispatch failures do not abort the sharing: the metadata is
    /// produced regardless, and every share that could not be placed is
    /// listed in `shares_to_be_stored` with its failure.
    pub async fn share_secret(
        &self,
        secret_name: &str,
        secret: &[u8],
        k: u32,
        n: u32,
        locations: &[ShareLocation],
    ) -> Result<SharingResult, SharingError> {
        validate_inputs(secret_name, secret, k, n, locations)?;
        let scheme = ShamirScheme::new(k, n)?;

        // First level: salt and mask from the process-wide CSPRNG.
        let mut rng = OsRng;
        let mut hash_salt = vec![0u8; DEFAULT_SALT_LEN];
        rng.fill_bytes(&mut hash_salt);
        let mut secret_mask = vec![0u8; secret.len()];
        rng.fill_bytes(&mut secret_mask);

        let sv_hash = salted_hash(secret, &hash_salt)?;
        let sh2 = xor(secret, &secret_mask);

        // Second level: hash-prefixed masked value through the codec.
        let mut payload = Vec::with_capacity(HASH_LEN + sh2.len());
        payload.extend_from_slice(&sv_hash);
        payload.extend_from_slice(&sh2);
        let shares = scheme.split(&payload)?;

        let mut share_metadata = Vec::with_capacity(locations.len());
        for (share, location) in shares.iter().zip(locations) {
            share_metadata.push(ShareMetadata {
                location: location.clone(),
                share_hash: salted_hash(&share.data, &hash_salt)?.to_vec(),
            });
        }

        // Dispatch every share concurrently; completion order does not
        // matter, result order follows the supplied locations.
        let dispatches = shares.iter().zip(locations).map(|(share, location)| {
            let registry = &self.registry;
            async move {
                let manager = registry.resolve(location.location_type)?;
                manager.store(secret_name, &share.data, location).await
            }
        });
        let outcomes = join_all(dispatches).await;

        let mut shares_to_be_stored = Vec::new();
        for ((share, location), outcome) in shares.iter().zip(locations).zip(outcomes) {
            match outcome {
                Ok(()) => {
                    tracing::debug!(
                        secret_name,
                        location = %location.location_name,
                        "share stored"
                    );
                }
                Err(failure) => {
                    tracing::warn!(
                        secret_name,
                        location = %location.location_name,
                        %failure,
                        "share dispatch failed; caller must store manually"
                    );
                    shares_to_be_stored.push(UnstoredShare {
                        location: location.clone(),
                        share: share.data.clone(),
                        failure,
                    });
                }
            }
        }

        let metadata = SharingMetadata {
            scheme_type: SCHEME_TYPE_SHAMIR.to_string(),
            scheme: scheme.to_wire(),
            secret_name: secret_name.to_string(),
            secret_mask,
            hash_salt,
            shares: share_metadata,
        };
        metadata.validate()?;

        Ok(SharingResult {
            metadata,
            shares_to_be_stored,
        })
    }

    /// Recovers the secret described by `metadata`.
    ///
    /// Every listed share is attempted independently; the call fails only
    /// if fewer than k shares retrieve and verify, or the final hash
    /// check rejects the reconstruction.
    pub async fn recover_secret(
        &self,
        metadata: &SharingMetadata,
    ) -> Result<RecoveryResult, SharingError> {
        metadata.validate()?;
        if metadata.scheme_type != SCHEME_TYPE_SHAMIR {
            return Err(SharingError::UnknownSchemeType(metadata.scheme_type.clone()));
        }
        let scheme = ShamirScheme::from_wire(&metadata.scheme)?;
        if metadata.shares.len() != scheme.n() as usize {
            return Err(SharingError::InvalidArgument(format!(
                "metadata lists {} shares but the scheme expects {}",
                metadata.shares.len(),
                scheme.n()
            )));
        }

        let secret_name = metadata.secret_name.as_str();
        let retrievals = metadata.shares.iter().map(|entry| {
            let registry = &self.registry;
            async move {
                let manager = registry.resolve(entry.location.location_type)?;
                manager.retrieve(secret_name, &entry.location).await
            }
        });
        let outcomes = join_all(retrievals).await;

        let mut share_data_list = Vec::with_capacity(metadata.shares.len());
        let mut verified = Vec::new();
        for (i, (entry, outcome)) in metadata.shares.iter().zip(outcomes).enumerate() {
            match outcome {
                Err(failure) => {
                    tracing::warn!(
                        secret_name,
                        location = %entry.location.location_name,
                        %failure,
                        "share retrieval failed"
                    );
                    share_data_list.push(ShareData {
                        metadata: entry.clone(),
                        bytes: None,
                        failure: Some(failure.into()),
                    });
                }
                Ok(bytes) => {
                    let hash = salted_hash(&bytes, &metadata.hash_salt)?;
                    if hash.as_slice() == entry.share_hash.as_slice() {
                        verified.push(ShamirShare {
                            index: i as u32 + 1,
                            data: bytes.clone(),
                        });
                        share_data_list.push(ShareData {
                            metadata: entry.clone(),
                            bytes: Some(bytes),
                            failure: None,
                        });
                    } else {
                        tracing::warn!(
                            secret_name,
                            location = %entry.location.location_name,
                            "share failed its hash check; excluded"
                        );
                        share_data_list.push(ShareData {
                            metadata: entry.clone(),
                            bytes: Some(bytes),
                            failure: Some(ShareFailure::HashMismatch),
                        });
                    }
                }
            }
        }

        if (verified.len() as u64) < scheme.k() as u64 {
            return Err(SharingError::TooFewShares {
                needed: scheme.k(),
                got: verified.len(),
            });
        }

        let payload = scheme.reconstruct(&verified)?;
        if payload.len() < HASH_LEN {
            return Err(SharingError::Inconsistent);
        }
        let (sv_hash, sh2) = payload.split_at(HASH_LEN);
        if sh2.len() != metadata.secret_mask.len() {
            return Err(SharingError::Inconsistent);
        }

        let candidate = xor(sh2, &metadata.secret_mask);
        let candidate_hash = salted_hash(&candidate, &metadata.hash_salt)?;
        if candidate_hash.as_slice() != sv_hash {
            return Err(SharingError::IncorrectHash);
        }

        tracing::info!(
            secret_name,
            shares_used = verified.len(),
            "secret recovered and verified"
        );
        Ok(RecoveryResult {
            secret: candidate,
            share_data_list,
        })
    }
}

fn validate_inputs(
    secret_name: &str,
    secret: &[u8],
    k: u32,
    n: u32,
    locations: &[ShareLocation],
) -> Result<(), SharingError> {
    if secret_name.is_empty() {
        return Err(SharingError::InvalidArgument(
            "secret name must not be empty".into(),
        ));
    }
    if secret.is_empty() {
        return Err(SharingError::InvalidArgument(
            "secret value must not be empty".into(),
        ));
    }
    if k == 0 || n < k {
        return Err(SharingError::InvalidArgument(format!(
            "k must satisfy 1 <= k <= n, got k = {k}, n = {n}"
        )));
    }
    if locations.len() != n as usize {
        return Err(SharingError::InvalidArgument(format!(
            "expected {n} locations, got {}",
            locations.len()
        )));
    }
    for location in locations {
        location.validate()?;
    }
    Ok(())
}

/// XOR of two equal-length byte strings.
fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::ShareManager;
    use crate::metadata::LocationType;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Test custody: shares keyed by location name in a shared map, with
    /// per-location failure injection.
    #[derive(Default)]
    struct MapManager {
        shares: Mutex<HashMap<String, Vec<u8>>>,
        down: Mutex<std::collections::HashSet<String>>,
    }

    impl MapManager {
        fn take_down(&self, location_name: &str) {
            self.down.lock().insert(location_name.to_string());
        }

        fn bring_up(&self, location_name: &str) {
            self.down.lock().remove(location_name);
        }

        fn corrupt(&self, location_name: &str, bit: usize) {
            let mut shares = self.shares.lock();
            let bytes = shares.get_mut(location_name).expect("share present");
            bytes[bit / 8] ^= 1 << (bit % 8);
        }

        fn check_up(&self, location: &ShareLocation) -> Result<(), CustodyError> {
            if self.down.lock().contains(&location.location_name) {
                return Err(CustodyError::Transport("custodian unreachable".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ShareManager for MapManager {
        async fn store(
            &self,
            _secret_name: &str,
            share: &[u8],
            location: &ShareLocation,
        ) -> Result<(), CustodyError> {
            self.check_up(location)?;
            self.shares
                .lock()
                .insert(location.location_name.clone(), share.to_vec());
            Ok(())
        }

        async fn retrieve(
            &self,
            _secret_name: &str,
            location: &ShareLocation,
        ) -> Result<Vec<u8>, CustodyError> {
            self.check_up(location)?;
            self.shares
                .lock()
                .get(&location.location_name)
                .cloned()
                .ok_or(CustodyError::Server {
                    status: 404,
                    body: "share not found.".into(),
                })
        }

        async fn delete(
            &self,
            _secret_name: &str,
            location: &ShareLocation,
        ) -> Result<(), CustodyError> {
            self.check_up(location)?;
            self.shares
                .lock()
                .remove(&location.location_name)
                .map(|_| ())
                .ok_or(CustodyError::Server {
                    status: 500,
                    body: "cannot delete".into(),
                })
        }
    }

    fn locations(n: usize) -> Vec<ShareLocation> {
        (0..n)
            .map(|i| ShareLocation {
                location_type: LocationType::Server,
                location_name: format!("https://custody-{i}.example.com"),
                owner_id_type: "email".into(),
                owner_id: "owner@example.com".into(),
            })
            .collect()
    }

    fn client(manager: Arc<MapManager>) -> SharingClient {
        let mut registry = ManagerRegistry::new();
        registry.register(LocationType::Server, manager);
        SharingClient::new(registry)
    }

    #[tokio::test]
    async fn share_then_recover_round_trips() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(5);

        let result = client
            .share_secret("vault", b"SomeSecretValue", 3, 5, &locs)
            .await
            .unwrap();
        assert!(result.shares_to_be_stored.is_empty());
        assert_eq!(result.metadata.shares.len(), 5);
        assert_eq!(result.metadata.secret_mask.len(), b"SomeSecretValue".len());
        assert_eq!(result.metadata.hash_salt.len(), DEFAULT_SALT_LEN);

        let recovery = client.recover_secret(&result.metadata).await.unwrap();
        assert_eq!(recovery.secret, b"SomeSecretValue");
        assert_eq!(recovery.share_data_list.len(), 5);
        assert!(recovery.share_data_list.iter().all(|d| d.failure.is_none()));
    }

    #[tokio::test]
    async fn metadata_never_contains_the_secret() {
        let manager = Arc::new(MapManager::default());
        let client = client(manager);
        let secret = b"MustNotLeakAnywhere";

        let result = client
            .share_secret("vault", secret, 2, 3, &locations(3))
            .await
            .unwrap();

        let encoded = result.metadata.encode().unwrap();
        assert!(!encoded
            .windows(secret.len())
            .any(|w| w == secret.as_slice()));
        // The mask is the same length as the secret but independent of it.
        assert_ne!(result.metadata.secret_mask, secret.to_vec());
    }

    #[tokio::test]
    async fn dispatch_failures_are_values_not_aborts() {
        let manager = Arc::new(MapManager::default());
        manager.take_down("https://custody-1.example.com");
        manager.take_down("https://custody-3.example.com");
        let client = client(Arc::clone(&manager));
        let locs = locations(5);

        let result = client
            .share_secret("vault", b"partial placement", 3, 5, &locs)
            .await
            .unwrap();

        // Metadata lists all five shares in order; the two failures are
        // returned for manual storage.
        assert_eq!(result.metadata.shares.len(), 5);
        assert_eq!(result.shares_to_be_stored.len(), 2);
        let failed: Vec<_> = result
            .shares_to_be_stored
            .iter()
            .map(|u| u.location.location_name.as_str())
            .collect();
        assert_eq!(
            failed,
            [
                "https://custody-1.example.com",
                "https://custody-3.example.com"
            ]
        );

        // The three placed shares are enough to recover.
        let recovery = client.recover_secret(&result.metadata).await.unwrap();
        assert_eq!(recovery.secret, b"partial placement");
    }

    #[tokio::test]
    async fn recovery_degrades_to_threshold_then_fails_below_it() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(5);

        let result = client
            .share_secret("vault", b"SomeSecretValue", 3, 5, &locs)
            .await
            .unwrap();

        // Two custodians down: exactly k shares remain.
        manager.take_down("https://custody-0.example.com");
        manager.take_down("https://custody-4.example.com");
        let recovery = client.recover_secret(&result.metadata).await.unwrap();
        assert_eq!(recovery.secret, b"SomeSecretValue");
        assert_eq!(
            recovery
                .share_data_list
                .iter()
                .filter(|d| d.failure.is_none())
                .count(),
            3
        );

        // A third goes down: below threshold.
        manager.take_down("https://custody-2.example.com");
        let err = client.recover_secret(&result.metadata).await.unwrap_err();
        assert!(matches!(
            err,
            SharingError::TooFewShares { needed: 3, got: 2 }
        ));
        assert!(err.to_string().contains("too few shares"));

        // One comes back: recovery works again.
        manager.bring_up("https://custody-2.example.com");
        let recovery = client.recover_secret(&result.metadata).await.unwrap();
        assert_eq!(recovery.secret, b"SomeSecretValue");
    }

    #[tokio::test]
    async fn corrupted_share_is_excluded_by_its_hash() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(4);

        let result = client
            .share_secret("vault", b"corruption test", 3, 4, &locs)
            .await
            .unwrap();

        manager.corrupt("https://custody-2.example.com", 13);

        // Three intact shares remain; the corrupted one is excluded and
        // recovery still verifies.
        let recovery = client.recover_secret(&result.metadata).await.unwrap();
        assert_eq!(recovery.secret, b"corruption test");
        let bad = &recovery.share_data_list[2];
        assert!(matches!(bad.failure, Some(ShareFailure::HashMismatch)));
        assert!(bad.bytes.is_some());
    }

    #[tokio::test]
    async fn corrupting_every_bit_position_is_caught() {
        // Flip one bit of one stored share at a range of positions; every
        // flip must be caught by the per-share hash.
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(2);

        let result = client
            .share_secret("vault", b"bit flips", 2, 2, &locs)
            .await
            .unwrap();

        for bit in [0, 1, 7, 8, 63, 80] {
            manager.corrupt("https://custody-0.example.com", bit);
            let err = client.recover_secret(&result.metadata).await.unwrap_err();
            assert!(
                matches!(err, SharingError::TooFewShares { .. }),
                "bit {bit} was not caught"
            );
            // Undo for the next round.
            manager.corrupt("https://custody-0.example.com", bit);
        }
    }

    #[tokio::test]
    async fn corrupted_mask_fails_the_final_hash() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(3);

        let result = client
            .share_secret("vault", b"mask matters", 2, 3, &locs)
            .await
            .unwrap();

        let mut tampered = result.metadata.clone();
        tampered.secret_mask[0] ^= 0x01;
        let err = client.recover_secret(&tampered).await.unwrap_err();
        assert!(matches!(err, SharingError::IncorrectHash));
    }

    #[tokio::test]
    async fn corrupted_salt_invalidates_every_hash() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(3);

        let result = client
            .share_secret("vault", b"salt matters", 2, 3, &locs)
            .await
            .unwrap();

        let mut tampered = result.metadata.clone();
        tampered.hash_salt[0] ^= 0x01;
        // Every per-share hash fails, so recovery dies on the threshold.
        let err = client.recover_secret(&tampered).await.unwrap_err();
        assert!(matches!(err, SharingError::TooFewShares { got: 0, .. }));
    }

    #[tokio::test]
    async fn recovery_is_deterministic() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));
        let locs = locations(3);

        let result = client
            .share_secret("vault", b"same every time", 2, 3, &locs)
            .await
            .unwrap();

        let first = client.recover_secret(&result.metadata).await.unwrap();
        let second = client.recover_secret(&result.metadata).await.unwrap();
        assert_eq!(first.secret, second.secret);
        assert_eq!(
            first.share_data_list.len(),
            second.share_data_list.len()
        );
        for (a, b) in first.share_data_list.iter().zip(&second.share_data_list) {
            assert_eq!(a.bytes, b.bytes);
        }
    }

    #[tokio::test]
    async fn input_validation() {
        let manager = Arc::new(MapManager::default());
        let client = client(manager);
        let locs = locations(3);

        for (name, secret, k, n, locs) in [
            ("", b"x".as_slice(), 2u32, 3u32, locs.clone()),
            ("vault", b"".as_slice(), 2, 3, locs.clone()),
            ("vault", b"x".as_slice(), 0, 3, locs.clone()),
            ("vault", b"x".as_slice(), 4, 3, locs.clone()),
            ("vault", b"x".as_slice(), 2, 4, locs.clone()),
        ] {
            let err = client
                .share_secret(name, secret, k, n, &locs)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SharingError::InvalidArgument(_)),
                "expected InvalidArgument for ({name:?}, k={k}, n={n})"
            );
        }

        // A location failing its own invariants is invalid too.
        let mut bad_locs = locations(3);
        bad_locs[1].owner_id.clear();
        assert!(matches!(
            client
                .share_secret("vault", b"x", 2, 3, &bad_locs)
                .await
                .unwrap_err(),
            SharingError::Metadata(_)
        ));
    }

    #[tokio::test]
    async fn unknown_scheme_type_is_rejected() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));

        let result = client
            .share_secret("vault", b"secret", 2, 3, &locations(3))
            .await
            .unwrap();

        let mut tampered = result.metadata.clone();
        tampered.scheme_type = "xor-trivial".into();
        assert!(matches!(
            client.recover_secret(&tampered).await.unwrap_err(),
            SharingError::UnknownSchemeType(_)
        ));
    }

    #[tokio::test]
    async fn malformed_scheme_bytes_are_invalid_argument() {
        let manager = Arc::new(MapManager::default());
        let client = client(Arc::clone(&manager));

        let result = client
            .share_secret("vault", b"secret", 2, 3, &locations(3))
            .await
            .unwrap();

        let mut tampered = result.metadata.clone();
        tampered.scheme.truncate(1);
        let err = client.recover_secret(&tampered).await.unwrap_err();
        assert!(matches!(
            err,
            SharingError::Shamir(ShamirError::MalformedScheme(_))
        ));
    }
}
