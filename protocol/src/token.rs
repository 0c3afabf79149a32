//! # Token Store
//!
//! In-memory registry of the short-lived capability tokens the custody
//! server mints. Every token is bound to exactly one (share id, operation)
//! pair and an absolute expiry; the same binding may be exercised
//! repeatedly until it expires, which keeps client retries cheap — a lost
//! HTTP response does not cost a second secondary-channel round-trip.
//!
//! Mint and validate run concurrently from independent request handlers;
//! the map is a [`DashMap`] so neither takes a global lock.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;

use crate::config::{MIN_TOKEN_LEN, MIN_TOKEN_VALIDITY_SECS};

/// Alphabet tokens are drawn from: the 52 ASCII letters. No digits and no
/// punctuation, so a token survives every transport that mangles anything
/// fancier (SMS gateways, voice read-out, hand transcription).
const TOKEN_ALPHABET: &[u8; 52] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// The operation a token is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Store,
    Retrieve,
    Delete,
}

impl Operation {
    /// The noun used in token-request endpoint paths.
    pub fn token_noun(&self) -> &'static str {
        match self {
            Operation::Store => "storage",
            Operation::Retrieve => "retrieval",
            Operation::Delete => "deletion",
        }
    }

    /// The verb used in execute endpoint paths.
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Store => "store",
            Operation::Retrieve => "retrieve",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.verb())
    }
}

/// Why a [`TokenStore`] configuration was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenConfigError {
    #[error("token length {0} below the minimum of {MIN_TOKEN_LEN}")]
    LengthTooShort(usize),

    #[error("token validity {0}s below the minimum of {MIN_TOKEN_VALIDITY_SECS}s")]
    ValidityTooShort(i64),
}

/// Outcome of validating a candidate token.
///
/// The server collapses everything but `Valid` into one 403 so a caller
/// probing with stolen tokens learns nothing; the distinction exists for
/// logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidation {
    /// The token exists, has not expired, and matches the share id and
    /// operation.
    Valid,
    /// No such token (wrong length short-circuits to this too).
    NotFound,
    /// The token existed but its validity window has passed.
    Expired,
    /// The token is alive but bound to a different share or operation.
    NotValid,
}

#[derive(Debug, Clone)]
struct TokenBinding {
    share_id: String,
    operation: Operation,
    valid_till: DateTime<Utc>,
}

/// Configuration for a [`TokenStore`].
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    token_length: usize,
    token_validity: Duration,
}

impl TokenConfig {
    /// Validates and builds a configuration.
    pub fn new(token_length: usize, token_validity: Duration) -> Result<Self, TokenConfigError> {
        if token_length < MIN_TOKEN_LEN {
            return Err(TokenConfigError::LengthTooShort(token_length));
        }
        if token_validity < Duration::seconds(MIN_TOKEN_VALIDITY_SECS) {
            return Err(TokenConfigError::ValidityTooShort(
                token_validity.num_seconds(),
            ));
        }
        Ok(Self {
            token_length,
            token_validity,
        })
    }

    /// The configured token length.
    pub fn token_length(&self) -> usize {
        self.token_length
    }

    /// The configured validity window.
    pub fn token_validity(&self) -> Duration {
        self.token_validity
    }
}

/// Registry of minted tokens. State machine per token:
/// `minted → (exercised* → expired)`.
#[derive(Debug)]
pub struct TokenStore {
    config: TokenConfig,
    tokens: DashMap<String, TokenBinding>,
}

impl TokenStore {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            tokens: DashMap::new(),
        }
    }

    /// Mints a fresh random token bound to `(share_id, operation)`,
    /// expiring `token_validity` from now. Returns the token string for
    /// delivery over the secondary channel.
    pub fn mint(&self, share_id: &str, operation: Operation) -> String {
        let mut rng = OsRng;
        let token: String = (0..self.config.token_length)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect();

        self.tokens.insert(
            token.clone(),
            TokenBinding {
                share_id: share_id.to_string(),
                operation,
                valid_till: Utc::now() + self.config.token_validity,
            },
        );
        token
    }

    /// Validates `candidate` against a binding at time `now`.
    ///
    /// Expired entries are removed on sight, so the map never accumulates
    /// more dead tokens than went unvalidated.
    pub fn validate(
        &self,
        candidate: &str,
        share_id: &str,
        operation: Operation,
        now: DateTime<Utc>,
    ) -> TokenValidation {
        if candidate.len() != self.config.token_length {
            return TokenValidation::NotFound;
        }

        let expired = match self.tokens.get(candidate) {
            None => return TokenValidation::NotFound,
            Some(entry) => {
                if now >= entry.valid_till {
                    true
                } else if entry.share_id == share_id && entry.operation == operation {
                    return TokenValidation::Valid;
                } else {
                    return TokenValidation::NotValid;
                }
            }
        };

        if expired {
            // Re-check under the entry lock; a concurrent purge may have
            // won the race, which is fine.
            self.tokens
                .remove_if(candidate, |_, binding| now >= binding.valid_till);
        }
        TokenValidation::Expired
    }

    /// Drops every binding that expired before `now`. Called periodically
    /// by the server so abandoned tokens do not pile up.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, binding| now < binding.valid_till);
        before - self.tokens.len()
    }

    /// Number of live (possibly expired but not yet purged) bindings.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TokenStore {
        TokenStore::new(TokenConfig::new(8, Duration::seconds(2)).unwrap())
    }

    #[test]
    fn config_bounds() {
        assert_eq!(
            TokenConfig::new(4, Duration::seconds(10)).unwrap_err(),
            TokenConfigError::LengthTooShort(4)
        );
        assert_eq!(
            TokenConfig::new(5, Duration::seconds(1)).unwrap_err(),
            TokenConfigError::ValidityTooShort(1)
        );
        assert!(TokenConfig::new(5, Duration::seconds(2)).is_ok());
    }

    #[test]
    fn minted_token_shape() {
        let store = store();
        let token = store.mint("share-1", Operation::Store);
        assert_eq!(token.len(), 8);
        assert!(token.bytes().all(|b| b.is_ascii_alphabetic()));
    }

    #[test]
    fn minted_token_validates_for_its_binding() {
        let store = store();
        let token = store.mint("share-1", Operation::Retrieve);
        assert_eq!(
            store.validate(&token, "share-1", Operation::Retrieve, Utc::now()),
            TokenValidation::Valid
        );
        // Repeated validation of the same binding stays valid until expiry.
        assert_eq!(
            store.validate(&token, "share-1", Operation::Retrieve, Utc::now()),
            TokenValidation::Valid
        );
    }

    #[test]
    fn wrong_share_or_operation_is_not_valid() {
        let store = store();
        let token = store.mint("share-1", Operation::Store);
        assert_eq!(
            store.validate(&token, "share-2", Operation::Store, Utc::now()),
            TokenValidation::NotValid
        );
        assert_eq!(
            store.validate(&token, "share-1", Operation::Delete, Utc::now()),
            TokenValidation::NotValid
        );
    }

    #[test]
    fn unknown_and_wrong_length_tokens_are_not_found() {
        let store = store();
        store.mint("share-1", Operation::Store);
        assert_eq!(
            store.validate("AAAAAAAA", "share-1", Operation::Store, Utc::now()),
            TokenValidation::NotFound
        );
        assert_eq!(
            store.validate("short", "share-1", Operation::Store, Utc::now()),
            TokenValidation::NotFound
        );
    }

    #[test]
    fn token_expires_at_the_boundary() {
        let store = store();
        let token = store.mint("share-1", Operation::Store);

        let just_before = Utc::now() + Duration::milliseconds(1900);
        assert_eq!(
            store.validate(&token, "share-1", Operation::Store, just_before),
            TokenValidation::Valid
        );

        let after = Utc::now() + Duration::seconds(3);
        assert_eq!(
            store.validate(&token, "share-1", Operation::Store, after),
            TokenValidation::Expired
        );
        // The expired entry was dropped; a later probe sees NotFound.
        assert_eq!(
            store.validate(&token, "share-1", Operation::Store, after),
            TokenValidation::NotFound
        );
    }

    #[test]
    fn expired_token_never_validates_elsewhere() {
        let store = store();
        let token = store.mint("share-1", Operation::Store);
        let after = Utc::now() + Duration::seconds(10);
        assert_ne!(
            store.validate(&token, "share-2", Operation::Delete, after),
            TokenValidation::Valid
        );
    }

    #[test]
    fn consecutive_mints_do_not_collide() {
        let store = store();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let token = store.mint("share-1", Operation::Store);
            assert!(seen.insert(token), "token collision within 100 mints");
        }
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn purge_drops_only_expired_bindings() {
        let store = store();
        store.mint("share-1", Operation::Store);
        store.mint("share-2", Operation::Retrieve);

        assert_eq!(store.purge_expired(Utc::now()), 0);
        assert_eq!(store.len(), 2);

        let later = Utc::now() + Duration::seconds(5);
        assert_eq!(store.purge_expired(later), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_mint_and_validate() {
        use std::sync::Arc;

        let store = Arc::new(store());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let share = format!("share-{t}-{i}");
                        let token = store.mint(&share, Operation::Store);
                        assert_eq!(
                            store.validate(&token, &share, Operation::Store, Utc::now()),
                            TokenValidation::Valid
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 200);
    }
}
