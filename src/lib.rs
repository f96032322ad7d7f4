// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sealed Access - Policy-Gated Content Encryption Core
//!
//! Sellers seal a payload under a fresh content key bound to an authorization
//! policy. Buyers present their identity (and, for enclave-only content, a
//! signed attestation); when the policy is satisfied the content key is
//! unwrapped and the buyer is bound to a time-limited session.
//!
//! ## Modules
//!
//! - `policy` - Policy kinds, validated rules, policy registry
//! - `envelope` - AES-256-GCM envelope encryption and key wrapping
//! - `attestation` - Enclave attestation records and Ed25519 verification
//! - `session` - Access sessions and the background sweep
//! - `ledger` - Read-only view of purchases, subscriptions and policies
//! - `access` - The access decision protocol
//! - `storage` - Blob stores and the audit trail
//! - `state` - `AccessCore`, the wired-up service

pub mod access;
pub mod attestation;
pub mod clock;
pub mod config;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod session;
pub mod state;
pub mod storage;
pub mod telemetry;

pub use error::{AccessError, AccessResult, DenyReason};
pub use state::{open_data_dir, AccessCore, CoreDeps, PublishedContent};
