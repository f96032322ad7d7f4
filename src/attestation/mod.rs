// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Enclave Attestation
//!
//! - `record` - attestation records, payloads and the canonical encoding
//! - `verifier` - record creation, Ed25519 verification, rule checks
//! - `registry` - pinned enclave keys and expected measurements
//! - `signer` - software signer for local development
//! - `cache` - LRU cache of verification verdicts
//!
//! Freshness is not enforced: a validly signed attestation verifies
//! regardless of its timestamp.

pub mod cache;
pub mod record;
pub mod registry;
pub mod signer;
pub mod verifier;

pub use record::{
    parse_measurements, Attestation, AttestationPayload, AttestationRecord, PlatformRegister,
    PLATFORM_REGISTER_LEN,
};
pub use registry::{EnclaveIdentity, EnclaveKeySource, EnclaveRegistry};
pub use signer::LocalEnclaveSigner;
pub use verifier::AttestationVerifier;
