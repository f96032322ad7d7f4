// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Known enclave identities.
//!
//! An enclave is identified by id, pinned to an Ed25519 public key, and
//! optionally carries the platform register values its build is expected to
//! report.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::record::PlatformRegister;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclaveIdentity {
    pub enclave_id: String,
    pub public_key: Vec<u8>,
    pub expected_registers: Vec<PlatformRegister>,
}

/// Resolves enclave ids to their pinned identity.
pub trait EnclaveKeySource: Send + Sync {
    fn identity(&self, enclave_id: &str) -> Option<EnclaveIdentity>;
}

#[derive(Debug, Default)]
pub struct EnclaveRegistry {
    identities: RwLock<HashMap<String, EnclaveIdentity>>,
}

impl EnclaveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an identity.
    pub fn register(&self, identity: EnclaveIdentity) {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        identities.insert(identity.enclave_id.clone(), identity);
    }

    pub fn remove(&self, enclave_id: &str) -> bool {
        let mut identities = self.identities.write().unwrap_or_else(PoisonError::into_inner);
        identities.remove(enclave_id).is_some()
    }
}

impl EnclaveKeySource for EnclaveRegistry {
    fn identity(&self, enclave_id: &str) -> Option<EnclaveIdentity> {
        let identities = self.identities.read().unwrap_or_else(PoisonError::into_inner);
        identities.get(enclave_id).cloned()
    }
}
