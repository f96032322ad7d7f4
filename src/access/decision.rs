// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access requests and decisions.

use serde::Serialize;

use crate::attestation::Attestation;
use crate::envelope::ContentKey;
use crate::error::{AccessError, AccessResult, DenyReason};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub content_id: String,
    /// Requester identity (wallet address).
    pub subject: String,
    pub attestation: Option<Attestation>,
}

impl AccessRequest {
    pub fn new(content_id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            subject: subject.into(),
            attestation: None,
        }
    }

    pub fn with_attestation(mut self, attestation: Attestation) -> Self {
        self.attestation = Some(attestation);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DecisionReason {
    Authorized,
    Denied(DenyReason),
}

/// Result of evaluating a request. The key is present only when granted.
#[derive(Debug)]
pub struct AccessDecision {
    pub granted: bool,
    pub reason: DecisionReason,
    pub unwrapped_key: Option<ContentKey>,
    pub attestation: Option<Attestation>,
    pub session: Option<Session>,
}

/// The pieces of a granted decision.
#[derive(Debug)]
pub struct Grant {
    pub key: ContentKey,
    pub session: Session,
    pub attestation: Option<Attestation>,
}

impl AccessDecision {
    pub(crate) fn granted(
        key: ContentKey,
        session: Session,
        attestation: Option<Attestation>,
    ) -> Self {
        Self {
            granted: true,
            reason: DecisionReason::Authorized,
            unwrapped_key: Some(key),
            attestation,
            session: Some(session),
        }
    }

    pub(crate) fn denied(reason: DenyReason) -> Self {
        Self {
            granted: false,
            reason: DecisionReason::Denied(reason),
            unwrapped_key: None,
            attestation: None,
            session: None,
        }
    }

    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self.reason {
            DecisionReason::Denied(reason) => Some(reason),
            DecisionReason::Authorized => None,
        }
    }

    /// Convert into a grant, or `AccessDenied` with the decision's reason.
    pub fn into_grant(self) -> AccessResult<Grant> {
        match (self.reason, self.unwrapped_key, self.session) {
            (DecisionReason::Authorized, Some(key), Some(session)) => Ok(Grant {
                key,
                session,
                attestation: self.attestation,
            }),
            (DecisionReason::Denied(reason), _, _) => Err(AccessError::AccessDenied(reason)),
            (DecisionReason::Authorized, _, _) => Err(AccessError::EvaluationError(
                "authorized decision is missing its key or session".to_string(),
            )),
        }
    }
}
