// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Svalbard Custody Server — Library Surface
//!
//! The custody server's router, CLI definition, logging setup, and
//! metrics live here so integration tests can drive the exact router the
//! binary serves. The `svalbard-server` binary in `main.rs` is a thin
//! startup sequence over these modules.

pub mod api;
pub mod cli;
pub mod logging;
pub mod metrics;
