// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the access core.
//!
//! Authorization failures (`AccessDenied`) and infrastructure failures
//! (`EvaluationError`) are separate variants so callers can always tell
//! "you may not" apart from "we could not tell".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::storage::StorageError;

/// Why a decision denied access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No purchase record for (content, subject) on the ledger
    NoPurchaseRecord,
    /// A purchase exists but does not cover the payment rule
    InsufficientPayment,
    /// No subscription record for (content, subject)
    NoSubscriptionRecord,
    /// Subscription exists but its TTL has lapsed
    SubscriptionExpired,
    /// The unlock instant has not been reached
    TimeLocked,
    /// Subject is not on the allowlist
    NotAllowlisted,
    /// Attestation missing, for another enclave, or did not verify
    AttestationInvalid,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoPurchaseRecord => "no purchase record",
            DenyReason::InsufficientPayment => "insufficient payment",
            DenyReason::NoSubscriptionRecord => "no subscription record",
            DenyReason::SubscriptionExpired => "subscription expired",
            DenyReason::TimeLocked => "time-locked",
            DenyReason::NotAllowlisted => "not allowlisted",
            DenyReason::AttestationInvalid => "attestation invalid",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the access core.
///
/// All errors are local to a single request; nothing here is global state.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("invalid policy parameters: {0}")]
    InvalidPolicyParams(String),

    #[error("policy not found: {0}")]
    PolicyNotFound(String),

    #[error("payload must not be empty")]
    EmptyPayload,

    #[error("payload exceeds maximum size: {size} > {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Authentication-tag failure. Always fatal to the current decrypt call.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("malformed measurements: {0}")]
    MalformedMeasurements(String),

    /// The attestation could not be parsed (as opposed to "did not verify").
    #[error("malformed attestation: {0}")]
    MalformedAttestation(String),

    #[error("access denied: {0}")]
    AccessDenied(DenyReason),

    /// The request names different content than the envelope was sealed for.
    #[error("envelope is sealed for content {sealed}, request names {requested}")]
    ContentMismatch { requested: String, sealed: String },

    /// Transient failure while evaluating a policy. Retryable by the caller.
    #[error("evaluation error: {0}")]
    EvaluationError(String),

    #[error("session expired for subject {0}")]
    SessionExpired(String),

    #[error("cryptographic error: {0}")]
    Crypto(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AccessError {
    /// Stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AccessError::InvalidPolicyParams(_) => "invalid_policy_params",
            AccessError::PolicyNotFound(_) => "policy_not_found",
            AccessError::EmptyPayload => "empty_payload",
            AccessError::PayloadTooLarge { .. } => "payload_too_large",
            AccessError::IntegrityViolation(_) => "integrity_violation",
            AccessError::MalformedMeasurements(_) => "malformed_measurements",
            AccessError::MalformedAttestation(_) => "malformed_attestation",
            AccessError::AccessDenied(_) => "access_denied",
            AccessError::ContentMismatch { .. } => "content_mismatch",
            AccessError::EvaluationError(_) => "evaluation_error",
            AccessError::SessionExpired(_) => "session_expired",
            AccessError::Crypto(_) => "crypto_error",
            AccessError::Storage(_) => "storage_error",
            AccessError::Config(_) => "config_error",
        }
    }

    /// Only evaluation errors may be retried, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccessError::EvaluationError(_))
    }

    /// The deny reason, if this is an authorization failure.
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            AccessError::AccessDenied(reason) => Some(*reason),
            _ => None,
        }
    }
}

pub type AccessResult<T> = Result<T, AccessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_reasons_render_exact_strings() {
        assert_eq!(DenyReason::NoPurchaseRecord.to_string(), "no purchase record");
        assert_eq!(DenyReason::AttestationInvalid.to_string(), "attestation invalid");
        assert_eq!(DenyReason::SubscriptionExpired.to_string(), "subscription expired");
        assert_eq!(DenyReason::TimeLocked.to_string(), "time-locked");
        assert_eq!(DenyReason::NotAllowlisted.to_string(), "not allowlisted");
    }

    #[test]
    fn access_denied_is_not_retryable() {
        let denied = AccessError::AccessDenied(DenyReason::NotAllowlisted);
        assert!(!denied.is_retryable());
        assert_eq!(denied.error_code(), "access_denied");
        assert_eq!(denied.deny_reason(), Some(DenyReason::NotAllowlisted));
        assert_eq!(denied.to_string(), "access denied: not allowlisted");

        let transient = AccessError::EvaluationError("ledger timed out".to_string());
        assert!(transient.is_retryable());
        assert_eq!(transient.deny_reason(), None);
    }

    #[test]
    fn storage_errors_convert() {
        let err: AccessError = StorageError::NotFound("blob".to_string()).into();
        assert_eq!(err.error_code(), "storage_error");
    }
}
