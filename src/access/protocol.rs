// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Decision Protocol
//!
//! Decides whether a subject may open an envelope, and on success unwraps its
//! content key and binds the subject to a session.
//!
//! ## Evaluation
//!
//! 1. Check the request names the content the envelope was sealed for, then
//!    resolve the envelope's policy from the registry, falling back to the
//!    ledger's published parameters on a miss. Ledger lookups are keyed by
//!    the policy namespace or the envelope's content id, never by anything
//!    the requester supplies.
//! 2. Evaluate every rule (logical AND) in cost order: local checks (time
//!    lock, allowlist), then ledger lookups (payment, ownership,
//!    subscription), then attestation verification. The first failing rule
//!    denies with its reason.
//! 3. Unwrap the content key and authenticate the ciphertext, then get or
//!    create the subject's session.
//!
//! Every ledger call is bounded by the configured timeout. A timeout or
//! ledger failure is an `EvaluationError`, never a denial.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use zeroize::Zeroizing;

use super::decision::{AccessDecision, AccessRequest};
use crate::attestation::AttestationVerifier;
use crate::clock::Clock;
use crate::envelope::{EncryptionEnvelope, KeyWrapper};
use crate::error::{AccessError, AccessResult, DenyReason};
use crate::ledger::{Ledger, LedgerError, PurchaseRecord};
use crate::policy::{Policy, PolicyEngine, PolicyRule};
use crate::session::SessionManager;

pub struct AccessDecisionProtocol {
    policies: Arc<PolicyEngine>,
    ledger: Arc<dyn Ledger>,
    verifier: Arc<AttestationVerifier>,
    sessions: Arc<SessionManager>,
    wrapper: Arc<KeyWrapper>,
    clock: Arc<dyn Clock>,
    ledger_timeout: Duration,
}

impl AccessDecisionProtocol {
    pub fn new(
        policies: Arc<PolicyEngine>,
        ledger: Arc<dyn Ledger>,
        verifier: Arc<AttestationVerifier>,
        sessions: Arc<SessionManager>,
        wrapper: Arc<KeyWrapper>,
        clock: Arc<dyn Clock>,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            policies,
            ledger,
            verifier,
            sessions,
            wrapper,
            clock,
            ledger_timeout,
        }
    }

    /// Evaluate `request` against the policy the envelope is bound to.
    ///
    /// Denials are `Ok` decisions with `granted == false`. Errors are
    /// reserved for unknown policies, evaluation failures and integrity
    /// violations.
    pub async fn decide(
        &self,
        request: &AccessRequest,
        envelope: &EncryptionEnvelope,
    ) -> AccessResult<AccessDecision> {
        let (decision, _) = self.decide_and_open(request, envelope).await?;
        Ok(decision)
    }

    /// [`decide`](Self::decide), also returning the plaintext on a grant.
    pub(crate) async fn decide_and_open(
        &self,
        request: &AccessRequest,
        envelope: &EncryptionEnvelope,
    ) -> AccessResult<(AccessDecision, Option<Zeroizing<Vec<u8>>>)> {
        if request.content_id != envelope.content_id {
            warn!(
                requested = %request.content_id,
                sealed = %envelope.content_id,
                subject = %request.subject,
                "Request does not match envelope content"
            );
            return Err(AccessError::ContentMismatch {
                requested: request.content_id.clone(),
                sealed: envelope.content_id.clone(),
            });
        }

        let policy = self.resolve_policy(&envelope.policy_id).await?;
        let ledger_key = policy.ledger_key(&envelope.content_id);
        let now = self.clock.now_millis();

        let mut purchase: Option<Option<PurchaseRecord>> = None;
        for rule in policy.evaluation_order() {
            let denial = match rule {
                PolicyRule::TimeLock(lock) => {
                    (now < lock.unlock_at_epoch_millis()).then_some(DenyReason::TimeLocked)
                }
                PolicyRule::Allowlist(list) => {
                    (!list.contains(&request.subject)).then_some(DenyReason::NotAllowlisted)
                }
                PolicyRule::Payment(payment) => {
                    match self.purchase(&mut purchase, ledger_key, &request.subject).await? {
                        None => Some(DenyReason::NoPurchaseRecord),
                        Some(record)
                            if record.amount < payment.amount()
                                || record.recipient != payment.recipient() =>
                        {
                            Some(DenyReason::InsufficientPayment)
                        }
                        Some(_) => None,
                    }
                }
                PolicyRule::Ownership(ownership) => {
                    if ownership.require_purchase_record() {
                        self.purchase(&mut purchase, ledger_key, &request.subject)
                            .await?
                            .is_none()
                            .then_some(DenyReason::NoPurchaseRecord)
                    } else {
                        None
                    }
                }
                PolicyRule::Subscription(subscription) => {
                    let record = self
                        .bounded(
                            "get_subscription",
                            self.ledger.get_subscription(ledger_key, &request.subject),
                        )
                        .await?;
                    match record {
                        None => Some(DenyReason::NoSubscriptionRecord),
                        Some(record) if record.fee_paid < subscription.fee() => {
                            Some(DenyReason::InsufficientPayment)
                        }
                        Some(record)
                            if now
                                >= record
                                    .purchased_at
                                    .saturating_add(subscription.ttl_millis()) =>
                        {
                            Some(DenyReason::SubscriptionExpired)
                        }
                        Some(_) => None,
                    }
                }
                PolicyRule::Attestation(rule) => match &request.attestation {
                    None => Some(DenyReason::AttestationInvalid),
                    Some(attestation) => match self.verifier.satisfies(attestation, rule) {
                        Ok(true) => None,
                        Ok(false) => Some(DenyReason::AttestationInvalid),
                        Err(e) => {
                            warn!(
                                subject = %request.subject,
                                error = %e,
                                "Rejecting malformed attestation"
                            );
                            Some(DenyReason::AttestationInvalid)
                        }
                    },
                },
            };

            if let Some(reason) = denial {
                info!(
                    policy_id = %policy.id(),
                    content_id = %request.content_id,
                    subject = %request.subject,
                    rule = rule.variant_name(),
                    reason = %reason,
                    "Access denied"
                );
                return Ok((AccessDecision::denied(reason), None));
            }
        }

        let opened = self
            .wrapper
            .unwrap(&envelope.wrapped_key, &envelope.associated_data())
            .and_then(|key| envelope.open(&key).map(|plaintext| (key, plaintext)));
        let (key, plaintext) = opened.inspect_err(|e| {
            error!(
                policy_id = %policy.id(),
                content_id = %envelope.content_id,
                subject = %request.subject,
                error = %e,
                "Envelope failed authentication"
            );
        })?;
        let session = self.sessions.get_or_create_session(&request.subject).await;

        info!(
            policy_id = %policy.id(),
            content_id = %request.content_id,
            subject = %request.subject,
            session_id = %session.session_id,
            "Access granted"
        );
        Ok((
            AccessDecision::granted(key, session, request.attestation.clone()),
            Some(plaintext),
        ))
    }

    async fn resolve_policy(&self, policy_id: &str) -> AccessResult<Policy> {
        match self.policies.get_policy(policy_id) {
            Err(AccessError::PolicyNotFound(_)) => {}
            other => return other,
        }

        let published = self
            .bounded("get_policy_params", self.ledger.get_policy_params(policy_id))
            .await?;
        match published {
            Some(published) => self
                .policies
                .rehydrate(policy_id, published.kind, published.params),
            None => Err(AccessError::PolicyNotFound(policy_id.to_string())),
        }
    }

    /// Fetch the purchase record once per decision.
    async fn purchase(
        &self,
        cached: &mut Option<Option<PurchaseRecord>>,
        ledger_key: &str,
        subject: &str,
    ) -> AccessResult<Option<PurchaseRecord>> {
        if let Some(record) = cached {
            return Ok(record.clone());
        }
        let record = self
            .bounded(
                "get_purchase_record",
                self.ledger.get_purchase_record(ledger_key, subject),
            )
            .await?;
        *cached = Some(record.clone());
        Ok(record)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> AccessResult<T> {
        match tokio::time::timeout(self.ledger_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "Ledger call failed");
                Err(AccessError::EvaluationError(format!("{operation}: {e}")))
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.ledger_timeout.as_millis() as u64,
                    "Ledger call timed out"
                );
                Err(AccessError::EvaluationError(format!(
                    "{operation} timed out after {}ms",
                    self.ledger_timeout.as_millis()
                )))
            }
        }
    }
}
