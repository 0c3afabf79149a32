//! # Sharing Metadata
//!
//! The structured record a client stores with its trusted cloud provider
//! after a sharing, and reads back to drive recovery. It binds the
//! serialized sharing scheme, the secret name, the first-level mask, the
//! hash salt, and one location + salted-hash pair per second-level share.
//!
//! The record is serialized with the field-tagged codec in [`wire`]; the
//! field numbering is frozen so backups created by earlier clients remain
//! readable.

pub mod wire;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MAX_SALT_LEN;
use wire::{WireError, WireReader, WireValue, WireWriter};

// Field numbers of the SharingMetadata record. Frozen.
const FIELD_SCHEME_TYPE: u32 = 1;
const FIELD_SCHEME: u32 = 2;
const FIELD_SECRET_NAME: u32 = 3;
const FIELD_SECRET_MASK: u32 = 4;
const FIELD_HASH_SALT: u32 = 5;
const FIELD_SHARE_METADATA: u32 = 6;

// Field numbers of the nested ShareLocation record. Frozen.
const FIELD_LOCATION_TYPE: u32 = 1;
const FIELD_LOCATION_NAME: u32 = 2;
const FIELD_OWNER_ID_TYPE: u32 = 3;
const FIELD_OWNER_ID: u32 = 4;

// Field numbers of the nested ShareMetadata record. Frozen.
const FIELD_LOCATION: u32 = 1;
const FIELD_SHARE_HASH: u32 = 2;

/// Errors raised while building, encoding, or decoding metadata records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The record framing is broken.
    #[error("malformed metadata record: {0}")]
    Malformed(#[from] WireError),

    /// A required field is absent from the record.
    #[error("metadata record missing field {0:?}")]
    MissingField(&'static str),

    /// A field that must not be empty is empty.
    #[error("metadata field {0:?} must not be empty")]
    EmptyField(&'static str),

    /// A field that must be UTF-8 is not.
    #[error("metadata field {0:?} is not valid UTF-8")]
    NotUtf8(&'static str),

    /// The hash salt length must fit the one-byte salted-hash prefix.
    #[error("hash salt length {0} outside [1, 255]")]
    BadSaltLength(usize),

    /// The location-type discriminant is not one this client knows.
    #[error("unknown location type {0}")]
    UnknownLocationType(u64),

    /// A server location must name an https URL.
    #[error("server location {0:?} is not an https URL")]
    NotHttps(String),
}

// ---------------------------------------------------------------------------
// Location types
// ---------------------------------------------------------------------------

/// The custody class keeping a second-level share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationType {
    /// A dedicated custody server reached over HTTPS.
    #[serde(rename = "svalbard-server")]
    Server,
    /// A physical artifact: QR code, OCR-friendly text, 3D print.
    #[serde(rename = "printed-copy")]
    Printed,
    /// A co-present peer device reached over NFC or Bluetooth.
    #[serde(rename = "peer-device")]
    Peer,
}

impl LocationType {
    /// Human-readable custody name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Server => "svalbard-server",
            LocationType::Printed => "printed-copy",
            LocationType::Peer => "peer-device",
        }
    }

    fn to_wire(self) -> u64 {
        match self {
            LocationType::Server => 1,
            LocationType::Printed => 2,
            LocationType::Peer => 3,
        }
    }

    fn from_wire(value: u64) -> Result<Self, MetadataError> {
        match value {
            1 => Ok(LocationType::Server),
            2 => Ok(LocationType::Printed),
            3 => Ok(LocationType::Peer),
            other => Err(MetadataError::UnknownLocationType(other)),
        }
    }
}

impl std::fmt::Display for LocationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Where a second-level share is kept and who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLocation {
    /// The custody class.
    pub location_type: LocationType,
    /// Server base URL for [`LocationType::Server`], otherwise a free-form
    /// description of the artifact or device.
    pub location_name: String,
    /// The kind of owner identifier, e.g. `"phone"` or `"email"`. Doubles
    /// as the secondary-channel address type.
    pub owner_id_type: String,
    /// The owner identifier within its type.
    pub owner_id: String,
}

impl ShareLocation {
    /// Checks the invariants every location must satisfy before it is
    /// dispatched to or written into a metadata record.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.location_name.is_empty() {
            return Err(MetadataError::EmptyField("location_name"));
        }
        if self.owner_id_type.is_empty() {
            return Err(MetadataError::EmptyField("owner_id_type"));
        }
        if self.owner_id.is_empty() {
            return Err(MetadataError::EmptyField("owner_id"));
        }
        if self.location_type == LocationType::Server && !self.location_name.starts_with("https") {
            return Err(MetadataError::NotHttps(self.location_name.clone()));
        }
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.varint(FIELD_LOCATION_TYPE, self.location_type.to_wire());
        w.string(FIELD_LOCATION_NAME, &self.location_name);
        w.string(FIELD_OWNER_ID_TYPE, &self.owner_id_type);
        w.string(FIELD_OWNER_ID, &self.owner_id);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        let mut location_type = None;
        let mut location_name = None;
        let mut owner_id_type = None;
        let mut owner_id = None;

        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match (field, value) {
                (FIELD_LOCATION_TYPE, WireValue::Varint(v)) => {
                    location_type = Some(LocationType::from_wire(v)?);
                }
                (FIELD_LOCATION_NAME, WireValue::Bytes(b)) => {
                    location_name = Some(utf8(b, "location_name")?);
                }
                (FIELD_OWNER_ID_TYPE, WireValue::Bytes(b)) => {
                    owner_id_type = Some(utf8(b, "owner_id_type")?);
                }
                (FIELD_OWNER_ID, WireValue::Bytes(b)) => {
                    owner_id = Some(utf8(b, "owner_id")?);
                }
                _ => {}
            }
        }

        let location = ShareLocation {
            location_type: location_type
                .ok_or(MetadataError::MissingField("location_type"))?,
            location_name: location_name
                .ok_or(MetadataError::MissingField("location_name"))?,
            owner_id_type: owner_id_type
                .ok_or(MetadataError::MissingField("owner_id_type"))?,
            owner_id: owner_id.ok_or(MetadataError::MissingField("owner_id"))?,
        };
        location.validate()?;
        Ok(location)
    }
}

/// Per-share recovery record: where the share lives and what it hashes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareMetadata {
    /// The share's custody location.
    pub location: ShareLocation,
    /// Salted hash of the share's wire-form bytes.
    pub share_hash: Vec<u8>,
}

impl ShareMetadata {
    fn encode(&self) -> Vec<u8> {
        let mut w = WireWriter::new();
        w.message(FIELD_LOCATION, &self.location.encode());
        w.bytes(FIELD_SHARE_HASH, &self.share_hash);
        w.finish()
    }

    fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        let mut location = None;
        let mut share_hash = None;

        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match (field, value) {
                (FIELD_LOCATION, WireValue::Bytes(b)) => {
                    location = Some(ShareLocation::decode(b)?);
                }
                (FIELD_SHARE_HASH, WireValue::Bytes(b)) => {
                    share_hash = Some(b.to_vec());
                }
                _ => {}
            }
        }

        let share_hash = share_hash.ok_or(MetadataError::MissingField("share_hash"))?;
        if share_hash.is_empty() {
            return Err(MetadataError::EmptyField("share_hash"));
        }
        Ok(ShareMetadata {
            location: location.ok_or(MetadataError::MissingField("location"))?,
            share_hash,
        })
    }
}

/// The full recovery record for one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharingMetadata {
    /// Identifier of the sharing scheme, e.g. `"shamir"`.
    pub scheme_type: String,
    /// The serialized scheme parameters (opaque at this layer).
    pub scheme: Vec<u8>,
    /// The owner-facing name of the backed-up secret.
    pub secret_name: String,
    /// The first-level share: a uniformly random mask of secret length.
    pub secret_mask: Vec<u8>,
    /// Salt for every hash in this sharing.
    pub hash_salt: Vec<u8>,
    /// Per-share records, in the location order the client supplied.
    pub shares: Vec<ShareMetadata>,
}

impl SharingMetadata {
    /// Checks the record invariants (spec-level, not scheme-level — the
    /// scheme bytes are validated by whoever owns the scheme type).
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.scheme_type.is_empty() {
            return Err(MetadataError::EmptyField("scheme_type"));
        }
        if self.scheme.is_empty() {
            return Err(MetadataError::EmptyField("scheme"));
        }
        if self.secret_name.is_empty() {
            return Err(MetadataError::EmptyField("secret_name"));
        }
        if self.secret_mask.is_empty() {
            return Err(MetadataError::EmptyField("secret_mask"));
        }
        if self.hash_salt.is_empty() || self.hash_salt.len() > MAX_SALT_LEN {
            return Err(MetadataError::BadSaltLength(self.hash_salt.len()));
        }
        if self.shares.is_empty() {
            return Err(MetadataError::EmptyField("shares"));
        }
        for share in &self.shares {
            share.location.validate()?;
            if share.share_hash.is_empty() {
                return Err(MetadataError::EmptyField("share_hash"));
            }
        }
        Ok(())
    }

    /// Serializes the record, validating it first — a record that fails
    /// its own invariants is never written out.
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        self.validate()?;

        let mut w = WireWriter::new();
        w.string(FIELD_SCHEME_TYPE, &self.scheme_type);
        w.bytes(FIELD_SCHEME, &self.scheme);
        w.string(FIELD_SECRET_NAME, &self.secret_name);
        w.bytes(FIELD_SECRET_MASK, &self.secret_mask);
        w.bytes(FIELD_HASH_SALT, &self.hash_salt);
        for share in &self.shares {
            w.message(FIELD_SHARE_METADATA, &share.encode());
        }
        Ok(w.finish())
    }

    /// Parses and validates a serialized record.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        let mut scheme_type = None;
        let mut scheme = None;
        let mut secret_name = None;
        let mut secret_mask = None;
        let mut hash_salt = None;
        let mut shares = Vec::new();

        let mut reader = WireReader::new(bytes);
        while let Some((field, value)) = reader.next_field()? {
            match (field, value) {
                (FIELD_SCHEME_TYPE, WireValue::Bytes(b)) => {
                    scheme_type = Some(utf8(b, "scheme_type")?);
                }
                (FIELD_SCHEME, WireValue::Bytes(b)) => scheme = Some(b.to_vec()),
                (FIELD_SECRET_NAME, WireValue::Bytes(b)) => {
                    secret_name = Some(utf8(b, "secret_name")?);
                }
                (FIELD_SECRET_MASK, WireValue::Bytes(b)) => secret_mask = Some(b.to_vec()),
                (FIELD_HASH_SALT, WireValue::Bytes(b)) => hash_salt = Some(b.to_vec()),
                (FIELD_SHARE_METADATA, WireValue::Bytes(b)) => {
                    shares.push(ShareMetadata::decode(b)?);
                }
                _ => {}
            }
        }

        let record = SharingMetadata {
            scheme_type: scheme_type.ok_or(MetadataError::MissingField("scheme_type"))?,
            scheme: scheme.ok_or(MetadataError::MissingField("scheme"))?,
            secret_name: secret_name.ok_or(MetadataError::MissingField("secret_name"))?,
            secret_mask: secret_mask.ok_or(MetadataError::MissingField("secret_mask"))?,
            hash_salt: hash_salt.ok_or(MetadataError::MissingField("hash_salt"))?,
            shares,
        };
        record.validate()?;
        Ok(record)
    }
}

fn utf8(bytes: &[u8], field: &'static str) -> Result<String, MetadataError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| MetadataError::NotUtf8(field))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
