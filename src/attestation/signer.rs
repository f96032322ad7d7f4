// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Software enclave signer.
//!
//! Produces attestations the same way an enclave does (Ed25519 over the
//! canonical record encoding). Used for local development and tests where no
//! hardware enclave is available.

use ring::signature::{Ed25519KeyPair, KeyPair};

use super::record::{Attestation, AttestationRecord, PlatformRegister};
use crate::envelope::KeySource;
use crate::error::{AccessError, AccessResult};

pub struct LocalEnclaveSigner {
    enclave_id: String,
    key_pair: Ed25519KeyPair,
}

impl LocalEnclaveSigner {
    pub fn from_seed(enclave_id: impl Into<String>, seed: &[u8; 32]) -> AccessResult<Self> {
        let key_pair = Ed25519KeyPair::from_seed_unchecked(seed)
            .map_err(|e| AccessError::Crypto(format!("invalid Ed25519 seed: {e}")))?;
        Ok(Self {
            enclave_id: enclave_id.into(),
            key_pair,
        })
    }

    pub fn generate(enclave_id: impl Into<String>, source: &dyn KeySource) -> AccessResult<Self> {
        let mut seed = zeroize::Zeroizing::new([0u8; 32]);
        source.fill(&mut seed[..])?;
        Self::from_seed(enclave_id, &seed)
    }

    pub fn enclave_id(&self) -> &str {
        &self.enclave_id
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Sign an arbitrary record, as-is.
    pub fn sign(&self, record: AttestationRecord) -> Attestation {
        let signature = self.key_pair.sign(&record.canonical_bytes());
        Attestation::from_parts(record, signature.as_ref().to_vec(), self.public_key())
    }

    /// Build and sign a record for this enclave.
    pub fn attest(
        &self,
        request_id: impl Into<String>,
        platform_registers: Vec<PlatformRegister>,
        payload: Vec<u8>,
        timestamp: u64,
    ) -> Attestation {
        self.sign(AttestationRecord {
            request_id: request_id.into(),
            enclave_id: self.enclave_id.clone(),
            platform_registers,
            payload,
            timestamp,
        })
    }
}

impl std::fmt::Debug for LocalEnclaveSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEnclaveSigner")
            .field("enclave_id", &self.enclave_id)
            .finish_non_exhaustive()
    }
}
