//! # Two-Level Sharing
//!
//! The sharing engine: the Shamir codec over GF(2^64) and the client that
//! wraps it in the mask-and-hash integrity layer, dispatches shares to
//! custodians, and reverses the whole construction at recovery time.

pub mod client;
pub mod shamir;

pub use client::{
    RecoveryResult, ShareData, ShareFailure, SharingClient, SharingError, SharingResult,
    UnstoredShare,
};
pub use shamir::{ShamirError, ShamirScheme, ShamirShare};
