//! # Protocol Constants
//!
//! Centralizes the protocol-level bounds and identifiers shared by the
//! client, the custody server, and the tests. Changing any of these is a
//! wire-compatibility event — treat this file like a frozen spec.

/// Identifier of the finite field used by the Shamir codec.
///
/// Serialized into every sharing-scheme record. A reconstruction client
/// refuses schemes naming any other field.
pub const FIELD_ID: &str = "gf2^64";

/// Identifier of the sharing scheme stored in the metadata record.
pub const SCHEME_TYPE_SHAMIR: &str = "shamir";

/// Prefix of every token message sent over a secondary channel.
pub const CHANNEL_PREFIX: &str = "SVBD";

/// Default length of the hash salt drawn at sharing time, in bytes.
pub const DEFAULT_SALT_LEN: usize = 10;

/// Maximum length of a hash salt. The salted-hash construction encodes the
/// salt length in a single byte, so this bound is structural.
pub const MAX_SALT_LEN: usize = 255;

/// Minimum accepted token length. Anything shorter is guessable enough to
/// be worthless as a capability.
pub const MIN_TOKEN_LEN: usize = 5;

/// Minimum accepted token validity. Secondary channels (SMS gateways in
/// particular) can take a couple of seconds to deliver; a shorter validity
/// would expire tokens before they arrive.
pub const MIN_TOKEN_VALIDITY_SECS: i64 = 2;

/// Size of a SHA-256 digest, which both the share hashes and the embedded
/// secret-value hash use.
pub const HASH_LEN: usize = 32;
