// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Attestation records and their canonical signing encoding.
//!
//! ## Canonical encoding
//!
//! ```text
//! "sealed-access/attestation/v1"
//! u32 BE len || request_id
//! u32 BE len || enclave_id
//! u32 BE count || register[0] (48) || register[1] (48) ...
//! u32 BE len || payload
//! u64 BE timestamp
//! ```
//!
//! Every field is covered, so altering any byte of the record (or of the
//! signature and public key carried alongside it) fails verification.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::encoding::{base64_bytes, decode_base64, encode_base64};
use crate::error::{AccessError, AccessResult};

pub const PLATFORM_REGISTER_LEN: usize = 48;

const DOMAIN_TAG: &[u8] = b"sealed-access/attestation/v1";

/// A single fixed-width platform configuration register value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformRegister([u8; PLATFORM_REGISTER_LEN]);

impl PlatformRegister {
    pub fn from_bytes(bytes: [u8; PLATFORM_REGISTER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PLATFORM_REGISTER_LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PlatformRegister {
    type Error = AccessError;

    fn try_from(bytes: &[u8]) -> AccessResult<Self> {
        let fixed: [u8; PLATFORM_REGISTER_LEN] = bytes.try_into().map_err(|_| {
            AccessError::MalformedMeasurements(format!(
                "platform register must be {PLATFORM_REGISTER_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(fixed))
    }
}

impl std::fmt::Debug for PlatformRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlatformRegister({})", encode_base64(&self.0))
    }
}

impl Serialize for PlatformRegister {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode_base64(&self.0))
    }
}

impl<'de> Deserialize<'de> for PlatformRegister {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = decode_base64(&encoded).map_err(serde::de::Error::custom)?;
        PlatformRegister::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

/// Parse raw measurement values into platform registers.
pub fn parse_measurements(measurements: &[Vec<u8>]) -> AccessResult<Vec<PlatformRegister>> {
    if measurements.is_empty() {
        return Err(AccessError::MalformedMeasurements(
            "at least one platform register is required".to_string(),
        ));
    }
    measurements
        .iter()
        .map(|m| PlatformRegister::try_from(m.as_slice()))
        .collect()
}

/// Structured content of an attestation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttestationPayload {
    /// Outcome of an in-enclave quality evaluation.
    QualityScore { score: u64, threshold: u64 },
    /// Digest of the data the enclave processed.
    ContentHash {
        #[serde(with = "base64_bytes")]
        sha256: Vec<u8>,
    },
}

impl AttestationPayload {
    pub fn content_hash(data: &[u8]) -> Self {
        AttestationPayload::ContentHash {
            sha256: Sha256::digest(data).to_vec(),
        }
    }

    pub fn to_bytes(&self) -> AccessResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AccessError::MalformedAttestation(format!("payload encoding: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> AccessResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AccessError::MalformedAttestation(format!("payload decoding: {e}")))
    }

    /// Whether a quality evaluation met its threshold. `None` for other payloads.
    pub fn passed(&self) -> Option<bool> {
        match self {
            AttestationPayload::QualityScore { score, threshold } => Some(score >= threshold),
            AttestationPayload::ContentHash { .. } => None,
        }
    }
}

/// The signed portion of an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    pub request_id: String,
    pub enclave_id: String,
    pub platform_registers: Vec<PlatformRegister>,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Epoch millis at which the record was produced.
    pub timestamp: u64,
}

fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

impl AttestationRecord {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            DOMAIN_TAG.len()
                + 4 * 4
                + 8
                + self.request_id.len()
                + self.enclave_id.len()
                + self.platform_registers.len() * PLATFORM_REGISTER_LEN
                + self.payload.len(),
        );
        out.extend_from_slice(DOMAIN_TAG);
        put_len_prefixed(&mut out, self.request_id.as_bytes());
        put_len_prefixed(&mut out, self.enclave_id.as_bytes());
        out.extend_from_slice(&(self.platform_registers.len() as u32).to_be_bytes());
        for register in &self.platform_registers {
            out.extend_from_slice(register.as_bytes());
        }
        put_len_prefixed(&mut out, &self.payload);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn decode_payload(&self) -> AccessResult<AttestationPayload> {
        AttestationPayload::from_bytes(&self.payload)
    }
}

/// A signed attestation. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    #[serde(flatten)]
    pub(crate) record: AttestationRecord,
    #[serde(with = "base64_bytes")]
    pub(crate) signature: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub(crate) public_key: Vec<u8>,
}

impl Attestation {
    /// Assemble an attestation from a record and its detached signature.
    pub fn from_parts(record: AttestationRecord, signature: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            record,
            signature,
            public_key,
        }
    }

    pub fn from_json(bytes: &[u8]) -> AccessResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| AccessError::MalformedAttestation(e.to_string()))
    }

    pub fn to_json(&self) -> AccessResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| AccessError::MalformedAttestation(e.to_string()))
    }

    pub fn record(&self) -> &AttestationRecord {
        &self.record
    }

    pub fn request_id(&self) -> &str {
        &self.record.request_id
    }

    pub fn enclave_id(&self) -> &str {
        &self.record.enclave_id
    }

    pub fn platform_registers(&self) -> &[PlatformRegister] {
        &self.record.platform_registers
    }

    pub fn payload(&self) -> &[u8] {
        &self.record.payload
    }

    pub fn timestamp(&self) -> u64 {
        self.record.timestamp
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.record.canonical_bytes()
    }

    pub fn decode_payload(&self) -> AccessResult<AttestationPayload> {
        self.record.decode_payload()
    }

    /// Digest over the canonical record, signature and public key.
    pub(crate) fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes());
        hasher.update((self.signature.len() as u32).to_be_bytes());
        hasher.update(&self.signature);
        hasher.update((self.public_key.len() as u32).to_be_bytes());
        hasher.update(&self.public_key);
        hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AttestationRecord {
        AttestationRecord {
            request_id: "req-1".to_string(),
            enclave_id: "enclave-a".to_string(),
            platform_registers: vec![PlatformRegister::from_bytes([7u8; 48])],
            payload: b"payload".to_vec(),
            timestamp: 42,
        }
    }

    #[test]
    fn register_width_is_enforced() {
        assert!(PlatformRegister::try_from([0u8; 48].as_slice()).is_ok());
        assert!(matches!(
            PlatformRegister::try_from([0u8; 32].as_slice()),
            Err(AccessError::MalformedMeasurements(_))
        ));
        assert!(matches!(
            parse_measurements(&[]),
            Err(AccessError::MalformedMeasurements(_))
        ));
        assert!(parse_measurements(&[vec![1u8; 48], vec![2u8; 49]]).is_err());
    }

    #[test]
    fn canonical_encoding_separates_fields() {
        let a = record();
        let mut b = record();
        // Same concatenation, different field boundary
        b.request_id = "req-1e".to_string();
        b.enclave_id = "nclave-a".to_string();
        assert_ne!(a.canonical_bytes(), b.canonical_bytes());

        let mut c = record();
        c.timestamp = 43;
        assert_ne!(a.canonical_bytes(), c.canonical_bytes());
    }

    #[test]
    fn attestation_json_round_trip() {
        let attestation = Attestation::from_parts(record(), vec![1u8; 64], vec![2u8; 32]);
        let json = attestation.to_json().unwrap();
        let parsed = Attestation::from_json(&json).unwrap();
        assert_eq!(parsed, attestation);

        assert!(matches!(
            Attestation::from_json(b"{not json"),
            Err(AccessError::MalformedAttestation(_))
        ));
    }

    #[test]
    fn quality_payload_reports_pass() {
        let passing = AttestationPayload::QualityScore {
            score: 80,
            threshold: 75,
        };
        let failing = AttestationPayload::QualityScore {
            score: 70,
            threshold: 75,
        };
        assert_eq!(passing.passed(), Some(true));
        assert_eq!(failing.passed(), Some(false));
        assert_eq!(AttestationPayload::content_hash(b"x").passed(), None);

        let bytes = passing.to_bytes().unwrap();
        assert_eq!(AttestationPayload::from_bytes(&bytes).unwrap(), passing);
    }
}
