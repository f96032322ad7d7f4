// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation record creation and signature verification.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use ring::signature::{UnparsedPublicKey, ED25519};
use tracing::{debug, info, warn};

use super::cache::VerdictCache;
use super::record::{parse_measurements, Attestation, AttestationRecord};
use super::registry::EnclaveKeySource;
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};
use crate::policy::AttestationRule;

pub const ED25519_PUBLIC_KEY_LEN: usize = 32;
pub const ED25519_SIGNATURE_LEN: usize = 64;

pub struct AttestationVerifier {
    clock: Arc<dyn Clock>,
    enclaves: Arc<dyn EnclaveKeySource>,
    verdicts: VerdictCache,
    records: RwLock<HashMap<String, AttestationRecord>>,
}

impl AttestationVerifier {
    pub fn new(
        clock: Arc<dyn Clock>,
        enclaves: Arc<dyn EnclaveKeySource>,
        cache_size: usize,
    ) -> Self {
        Self {
            clock,
            enclaves,
            verdicts: VerdictCache::new(cache_size),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Build an unsigned record stamped with the current time.
    ///
    /// Every measurement must be exactly one platform register wide.
    pub fn create_attestation_record(
        &self,
        request_id: &str,
        enclave_id: &str,
        measurements: &[Vec<u8>],
        payload: Vec<u8>,
    ) -> AccessResult<AttestationRecord> {
        if request_id.trim().is_empty() || enclave_id.trim().is_empty() {
            return Err(AccessError::MalformedAttestation(
                "request id and enclave id are required".to_string(),
            ));
        }
        let platform_registers = parse_measurements(measurements)?;

        Ok(AttestationRecord {
            request_id: request_id.to_string(),
            enclave_id: enclave_id.to_string(),
            platform_registers,
            payload,
            timestamp: self.clock.now_millis(),
        })
    }

    /// Keep a record retrievable by its request id. Replaces any earlier record.
    pub fn store_record(&self, record: AttestationRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        debug!(request_id = %record.request_id, "Attestation record stored");
        records.insert(record.request_id.clone(), record);
    }

    pub fn get_record(&self, request_id: &str) -> Option<AttestationRecord> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.get(request_id).cloned()
    }

    /// Check the signature over the canonical encoding.
    ///
    /// `Ok(false)` means well-formed but not authentic. Structurally invalid
    /// input (wrong key or signature length, missing fields) is an error.
    pub fn verify(&self, attestation: &Attestation) -> AccessResult<bool> {
        check_structure(attestation)?;

        let digest = attestation.digest();
        if let Some(verdict) = self.verdicts.get(&digest) {
            return Ok(verdict);
        }

        let public_key = UnparsedPublicKey::new(&ED25519, attestation.public_key());
        let verdict = public_key
            .verify(&attestation.canonical_bytes(), attestation.signature())
            .is_ok();

        if !verdict {
            warn!(
                request_id = %attestation.request_id(),
                enclave_id = %attestation.enclave_id(),
                "Attestation signature did not verify"
            );
        }
        self.verdicts.put(digest, verdict);
        Ok(verdict)
    }

    /// Evaluate an attestation against a policy's attestation rule.
    ///
    /// The enclave must be registered and the attestation must carry its
    /// pinned key; a key embedded in the attestation is never trusted on its
    /// own. PCR matching additionally requires registered registers equal to
    /// the reported ones.
    pub fn satisfies(&self, attestation: &Attestation, rule: &AttestationRule) -> AccessResult<bool> {
        if attestation.enclave_id() != rule.required_enclave_id() {
            info!(
                expected = %rule.required_enclave_id(),
                actual = %attestation.enclave_id(),
                "Attestation from unexpected enclave"
            );
            return Ok(false);
        }

        let Some(identity) = self.enclaves.identity(attestation.enclave_id()) else {
            warn!(
                enclave_id = %attestation.enclave_id(),
                "Attestation from unregistered enclave"
            );
            return Ok(false);
        };
        if identity.public_key != attestation.public_key() {
            warn!(
                enclave_id = %attestation.enclave_id(),
                "Attestation key does not match pinned enclave key"
            );
            return Ok(false);
        }
        if rule.require_pcr_match()
            && (identity.expected_registers.is_empty()
                || identity.expected_registers != attestation.platform_registers())
        {
            warn!(
                enclave_id = %attestation.enclave_id(),
                "Platform registers do not match expected measurements"
            );
            return Ok(false);
        }

        self.verify(attestation)
    }
}

fn check_structure(attestation: &Attestation) -> AccessResult<()> {
    if attestation.public_key().len() != ED25519_PUBLIC_KEY_LEN {
        return Err(AccessError::MalformedAttestation(format!(
            "public key must be {ED25519_PUBLIC_KEY_LEN} bytes, got {}",
            attestation.public_key().len()
        )));
    }
    if attestation.signature().len() != ED25519_SIGNATURE_LEN {
        return Err(AccessError::MalformedAttestation(format!(
            "signature must be {ED25519_SIGNATURE_LEN} bytes, got {}",
            attestation.signature().len()
        )));
    }
    if attestation.request_id().is_empty() || attestation.enclave_id().is_empty() {
        return Err(AccessError::MalformedAttestation(
            "request id and enclave id are required".to_string(),
        ));
    }
    if attestation.platform_registers().is_empty() {
        return Err(AccessError::MalformedAttestation(
            "no platform registers".to_string(),
        ));
    }
    Ok(())
}
