// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Svalbard — Core Protocol Library
//!
//! Long-term backup for short high-value secrets: passwords, seed phrases,
//! master keys. The things you cannot rotate, cannot regenerate, and really
//! cannot afford to lose.
//!
//! A client splits a secret in two levels. The first level is a one-time pad:
//! a uniformly random mask the same length as the secret, kept in the sharing
//! metadata. The second level runs the masked value (prefixed with a salted
//! hash of the original) through Shamir's scheme over GF(2^64) and scatters
//! the resulting shares across heterogeneous custodians — dedicated custody
//! servers, printed copies, peer devices. Recovery gathers enough shares,
//! rejects anything whose salted hash does not match, reconstructs, unmasks,
//! and verifies the result against the embedded hash. Secrecy is
//! information-theoretic; corruption detection is hash-based.
//!
//! ## Architecture
//!
//! The library is split into modules that mirror the actual concerns of the
//! backup pipeline:
//!
//! - **field** — GF(2^64) arithmetic. Everything above it is bookkeeping.
//! - **crypto** — Salted hashing and share-id derivation. SHA-256 throughout.
//! - **sharing** — The Shamir codec and the two-level sharing client.
//! - **metadata** — The recovery record and its field-tagged wire codec.
//! - **custody** — Share-manager capabilities, one per custody type.
//! - **channel** — The out-of-band token delivery path.
//! - **token** — Short-lived, operation-scoped capability tokens.
//! - **store** — Opaque share-id → blob stores (in-memory and durable).
//! - **config** — Protocol constants and bounds.
//!
//! ## Design Philosophy
//!
//! 1. Per-share failures are values, never aborts — a dead custodian must
//!    not take the whole sharing down with it.
//! 2. No partial results: recovery either verifies end to end or fails.
//! 3. Every byte that leaves the client is either uniformly random or
//!    hashed; nothing sensitive rides in a response body.

pub mod channel;
pub mod config;
pub mod crypto;
pub mod custody;
pub mod field;
pub mod metadata;
pub mod sharing;
pub mod store;
pub mod token;
