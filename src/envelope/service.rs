// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sealing payloads into envelopes and opening them for authorized subjects.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

use super::keys::{open, random_iv, seal, ContentKey, KeySource, KeyWrapper, IV_LEN};
use crate::access::{AccessDecisionProtocol, AccessRequest};
use crate::attestation::Attestation;
use crate::encoding::base64_bytes;
use crate::error::{AccessError, AccessResult};
use crate::policy::Policy;
use crate::session::Session;

/// Ciphertext plus everything needed to open it, minus the key.
///
/// `policy_id` and `content_id` are authenticated as associated data of both
/// the ciphertext and the wrapped key, so neither can be swapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    /// AES-256-GCM ciphertext with the 16-byte tag appended.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub wrapped_key: Vec<u8>,
    pub policy_id: String,
    pub content_id: String,
}

fn associated_data(policy_id: &str, content_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(8 + policy_id.len() + content_id.len());
    for part in [policy_id, content_id] {
        aad.extend_from_slice(&(part.len() as u32).to_be_bytes());
        aad.extend_from_slice(part.as_bytes());
    }
    aad
}

impl EncryptionEnvelope {
    pub fn to_bytes(&self) -> AccessResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| AccessError::Crypto(format!("envelope serialization failed: {e}")))
    }

    /// Parse a stored envelope. Unparseable bytes are treated as tampering.
    pub fn from_bytes(bytes: &[u8]) -> AccessResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AccessError::IntegrityViolation(format!("malformed envelope: {e}")))
    }

    /// Bytes binding this envelope to its policy and content.
    pub fn associated_data(&self) -> Vec<u8> {
        associated_data(&self.policy_id, &self.content_id)
    }

    /// Authenticate and decrypt with an already unwrapped content key.
    pub fn open(&self, key: &ContentKey) -> AccessResult<Zeroizing<Vec<u8>>> {
        let iv: [u8; IV_LEN] = self.iv.as_slice().try_into().map_err(|_| {
            AccessError::IntegrityViolation(format!(
                "envelope IV must be {IV_LEN} bytes, got {}",
                self.iv.len()
            ))
        })?;
        open(
            key.as_bytes(),
            iv,
            &self.associated_data(),
            &self.ciphertext,
            "envelope ciphertext",
        )
    }
}

/// An opened envelope.
#[derive(Debug)]
pub struct DecryptionResult {
    pub plaintext: Zeroizing<Vec<u8>>,
    pub session: Session,
    pub attestation: Option<Attestation>,
}

pub struct EnvelopeService {
    wrapper: Arc<KeyWrapper>,
    source: Arc<dyn KeySource>,
    protocol: Arc<AccessDecisionProtocol>,
    max_payload_bytes: usize,
}

impl EnvelopeService {
    pub fn new(
        wrapper: Arc<KeyWrapper>,
        source: Arc<dyn KeySource>,
        protocol: Arc<AccessDecisionProtocol>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            wrapper,
            source,
            protocol,
            max_payload_bytes,
        }
    }

    /// Seal `payload` for `content_id` under a fresh content key bound to
    /// `policy`.
    ///
    /// Two calls with the same input never produce the same ciphertext,
    /// IV or wrapped key.
    pub fn encrypt(
        &self,
        content_id: &str,
        payload: &[u8],
        policy: &Policy,
    ) -> AccessResult<EncryptionEnvelope> {
        if payload.is_empty() {
            return Err(AccessError::EmptyPayload);
        }
        if payload.len() > self.max_payload_bytes {
            return Err(AccessError::PayloadTooLarge {
                size: payload.len(),
                limit: self.max_payload_bytes,
            });
        }

        let aad = associated_data(policy.id(), content_id);
        let key = ContentKey::generate(self.source.as_ref())?;
        let iv = random_iv(self.source.as_ref())?;
        let ciphertext = seal(key.as_bytes(), iv, &aad, payload)?;
        let wrapped_key = self.wrapper.wrap(&key, &aad)?;

        info!(
            policy_id = %policy.id(),
            content_id = %content_id,
            payload_bytes = payload.len(),
            "Payload sealed"
        );
        Ok(EncryptionEnvelope {
            ciphertext,
            iv: iv.to_vec(),
            wrapped_key,
            policy_id: policy.id().to_string(),
            content_id: content_id.to_string(),
        })
    }

    /// Run the access protocol for `request` and, if granted, return the
    /// plaintext.
    ///
    /// A denial surfaces as `AccessDenied` with the decision's reason. The
    /// ciphertext is authenticated before any session is bound.
    pub async fn decrypt(
        &self,
        envelope: &EncryptionEnvelope,
        request: &AccessRequest,
    ) -> AccessResult<DecryptionResult> {
        let (decision, plaintext) = self.protocol.decide_and_open(request, envelope).await?;
        let grant = decision.into_grant()?;
        let plaintext = plaintext.ok_or_else(|| {
            AccessError::EvaluationError("granted decision carried no plaintext".to_string())
        })?;

        Ok(DecryptionResult {
            plaintext,
            session: grant.session,
            attestation: grant.attestation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::testing::{allowlist, harness, harness_with_limit, CONTENT};
    use crate::envelope::WRAPPED_KEY_LEN;
    use crate::error::DenyReason;
    use crate::policy::PolicyKind;

    #[test]
    fn encrypt_is_non_deterministic() {
        let h = harness();
        let policy = h.policy(PolicyKind::Allowlist, vec![allowlist(&["alice"])]);

        let a = h.envelopes.encrypt(CONTENT, b"same payload", &policy).unwrap();
        let b = h.envelopes.encrypt(CONTENT, b"same payload", &policy).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.wrapped_key, b.wrapped_key);
        assert_eq!(a.iv.len(), IV_LEN);
        assert_eq!(a.wrapped_key.len(), WRAPPED_KEY_LEN);
        assert_eq!(a.policy_id, policy.id());
        assert_eq!(a.content_id, CONTENT);
    }

    #[test]
    fn payload_bounds_are_enforced() {
        let h = harness_with_limit(8);
        let policy = h.policy(PolicyKind::Allowlist, vec![allowlist(&["alice"])]);

        assert!(matches!(
            h.envelopes.encrypt(CONTENT, b"", &policy),
            Err(AccessError::EmptyPayload)
        ));
        assert!(matches!(
            h.envelopes.encrypt(CONTENT, b"123456789", &policy),
            Err(AccessError::PayloadTooLarge { size: 9, limit: 8 })
        ));
        assert!(h.envelopes.encrypt(CONTENT, b"12345678", &policy).is_ok());
    }

    #[tokio::test]
    async fn authorized_subject_recovers_plaintext() {
        let h = harness();
        let (_, envelope) = h.seal(PolicyKind::Allowlist, vec![allowlist(&["alice"])]);

        let opened = h
            .envelopes
            .decrypt(&envelope, &AccessRequest::new(CONTENT, "alice"))
            .await
            .unwrap();
        assert_eq!(opened.plaintext.as_slice(), b"secret");
        assert_eq!(opened.session.subject, "alice");

        let err = h
            .envelopes
            .decrypt(&envelope, &AccessRequest::new(CONTENT, "mallory"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::AccessDenied(DenyReason::NotAllowlisted)
        ));
    }

    #[tokio::test]
    async fn tampered_envelope_is_integrity_violation_without_session() {
        let h = harness();
        let (_, original) = h.seal(PolicyKind::Allowlist, vec![allowlist(&["alice"])]);
        let request = AccessRequest::new(CONTENT, "alice");

        for index in [0, original.ciphertext.len() - 1] {
            let mut tampered = original.clone();
            tampered.ciphertext[index] ^= 0x01;
            let err = h.envelopes.decrypt(&tampered, &request).await.unwrap_err();
            assert!(matches!(err, AccessError::IntegrityViolation(_)));
        }

        let mut tampered = original.clone();
        tampered.iv[0] ^= 0x01;
        let err = h.envelopes.decrypt(&tampered, &request).await.unwrap_err();
        assert!(matches!(err, AccessError::IntegrityViolation(_)));

        assert!(h.sessions.active_session("alice").await.is_err());
        assert!(h.sessions.is_empty().await);
    }

    #[test]
    fn envelope_bytes_round_trip_and_reject_garbage() {
        let h = harness();
        let (_, envelope) = h.seal(PolicyKind::Allowlist, vec![allowlist(&["alice"])]);

        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(EncryptionEnvelope::from_bytes(&bytes).unwrap(), envelope);
        assert!(matches!(
            EncryptionEnvelope::from_bytes(b"garbage"),
            Err(AccessError::IntegrityViolation(_))
        ));
    }
}
