// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy kinds and rule variants.
//!
//! Callers describe rules with [`RuleParams`], a plain serde-friendly bag.
//! Those are validated once into [`PolicyRule`], whose variant payloads have
//! private fields: a `PolicyRule` that exists has already passed validation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};

/// The closed set of policy kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    PaymentGated,
    TeeOnly,
    Subscription,
    TimeLocked,
    Allowlist,
}

impl PolicyKind {
    /// The rule variant a policy of this kind must contain.
    pub fn required_rule(&self) -> &'static str {
        match self {
            PolicyKind::PaymentGated => "payment",
            PolicyKind::TeeOnly => "attestation",
            PolicyKind::Subscription => "subscription",
            PolicyKind::TimeLocked => "time_lock",
            PolicyKind::Allowlist => "allowlist",
        }
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PolicyKind::PaymentGated => "payment_gated",
            PolicyKind::TeeOnly => "tee_only",
            PolicyKind::Subscription => "subscription",
            PolicyKind::TimeLocked => "time_locked",
            PolicyKind::Allowlist => "allowlist",
        };
        f.write_str(name)
    }
}

/// Unvalidated rule parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleParams {
    Payment {
        amount: u64,
        recipient: String,
    },
    Ownership {
        require_purchase_record: bool,
    },
    Attestation {
        required_enclave_id: String,
        require_pcr_match: bool,
    },
    Subscription {
        fee: u64,
        ttl_millis: u64,
    },
    TimeLock {
        unlock_at_epoch_millis: u64,
    },
    Allowlist {
        addresses: BTreeSet<String>,
    },
}

/// Unvalidated parameters for a whole policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyParams {
    pub rules: Vec<RuleParams>,
    /// Scoping key for ledger lookups (usually the content id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl PolicyParams {
    pub fn new(rules: Vec<RuleParams>) -> Self {
        Self {
            rules,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRule {
    amount: u64,
    recipient: String,
}

impl PaymentRule {
    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRule {
    require_purchase_record: bool,
}

impl OwnershipRule {
    pub fn require_purchase_record(&self) -> bool {
        self.require_purchase_record
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRule {
    required_enclave_id: String,
    require_pcr_match: bool,
}

impl AttestationRule {
    pub fn required_enclave_id(&self) -> &str {
        &self.required_enclave_id
    }

    pub fn require_pcr_match(&self) -> bool {
        self.require_pcr_match
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRule {
    fee: u64,
    ttl_millis: u64,
}

impl SubscriptionRule {
    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn ttl_millis(&self) -> u64 {
        self.ttl_millis
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeLockRule {
    unlock_at_epoch_millis: u64,
}

impl TimeLockRule {
    pub fn unlock_at_epoch_millis(&self) -> u64 {
        self.unlock_at_epoch_millis
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistRule {
    addresses: BTreeSet<String>,
}

impl AllowlistRule {
    pub fn addresses(&self) -> &BTreeSet<String> {
        &self.addresses
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.addresses.contains(subject)
    }
}

/// A validated authorization rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RuleParams", try_from = "RuleParams")]
pub enum PolicyRule {
    Payment(PaymentRule),
    Ownership(OwnershipRule),
    Attestation(AttestationRule),
    Subscription(SubscriptionRule),
    TimeLock(TimeLockRule),
    Allowlist(AllowlistRule),
}

impl PolicyRule {
    /// Validate parameters, additionally requiring time locks to unlock
    /// strictly after `now_millis` when given.
    pub(crate) fn validate(params: RuleParams, now_millis: Option<u64>) -> AccessResult<Self> {
        if let (RuleParams::TimeLock { unlock_at_epoch_millis }, Some(now)) = (&params, now_millis)
        {
            if *unlock_at_epoch_millis <= now {
                return Err(invalid(format!(
                    "time_lock.unlock_at_epoch_millis ({unlock_at_epoch_millis}) must be in the future (now {now})"
                )));
            }
        }
        Self::try_from(params)
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            PolicyRule::Payment(_) => "payment",
            PolicyRule::Ownership(_) => "ownership",
            PolicyRule::Attestation(_) => "attestation",
            PolicyRule::Subscription(_) => "subscription",
            PolicyRule::TimeLock(_) => "time_lock",
            PolicyRule::Allowlist(_) => "allowlist",
        }
    }

    /// Evaluation cost: local checks, then ledger round-trips, then crypto.
    pub(crate) fn cost_tier(&self) -> u8 {
        match self {
            PolicyRule::TimeLock(_) | PolicyRule::Allowlist(_) => 0,
            PolicyRule::Payment(_) | PolicyRule::Ownership(_) | PolicyRule::Subscription(_) => 1,
            PolicyRule::Attestation(_) => 2,
        }
    }
}

fn invalid(message: impl Into<String>) -> AccessError {
    AccessError::InvalidPolicyParams(message.into())
}

impl TryFrom<RuleParams> for PolicyRule {
    type Error = AccessError;

    fn try_from(params: RuleParams) -> Result<Self, Self::Error> {
        match params {
            RuleParams::Payment { amount, recipient } => {
                if amount == 0 {
                    return Err(invalid("payment.amount must be greater than zero"));
                }
                if recipient.trim().is_empty() {
                    return Err(invalid("payment.recipient is required"));
                }
                Ok(PolicyRule::Payment(PaymentRule { amount, recipient }))
            }
            RuleParams::Ownership {
                require_purchase_record,
            } => Ok(PolicyRule::Ownership(OwnershipRule {
                require_purchase_record,
            })),
            RuleParams::Attestation {
                required_enclave_id,
                require_pcr_match,
            } => {
                if required_enclave_id.trim().is_empty() {
                    return Err(invalid("attestation.required_enclave_id is required"));
                }
                Ok(PolicyRule::Attestation(AttestationRule {
                    required_enclave_id,
                    require_pcr_match,
                }))
            }
            RuleParams::Subscription { fee, ttl_millis } => {
                if fee == 0 {
                    return Err(invalid("subscription.fee must be greater than zero"));
                }
                if ttl_millis == 0 {
                    return Err(invalid("subscription.ttl_millis must be greater than zero"));
                }
                Ok(PolicyRule::Subscription(SubscriptionRule { fee, ttl_millis }))
            }
            RuleParams::TimeLock {
                unlock_at_epoch_millis,
            } => {
                if unlock_at_epoch_millis == 0 {
                    return Err(invalid("time_lock.unlock_at_epoch_millis is required"));
                }
                Ok(PolicyRule::TimeLock(TimeLockRule {
                    unlock_at_epoch_millis,
                }))
            }
            RuleParams::Allowlist { addresses } => {
                if addresses.is_empty() {
                    return Err(invalid("allowlist.addresses must not be empty"));
                }
                if addresses.iter().any(|a| a.trim().is_empty()) {
                    return Err(invalid("allowlist.addresses must not contain blank entries"));
                }
                Ok(PolicyRule::Allowlist(AllowlistRule { addresses }))
            }
        }
    }
}

impl From<PolicyRule> for RuleParams {
    fn from(rule: PolicyRule) -> Self {
        match rule {
            PolicyRule::Payment(r) => RuleParams::Payment {
                amount: r.amount,
                recipient: r.recipient,
            },
            PolicyRule::Ownership(r) => RuleParams::Ownership {
                require_purchase_record: r.require_purchase_record,
            },
            PolicyRule::Attestation(r) => RuleParams::Attestation {
                required_enclave_id: r.required_enclave_id,
                require_pcr_match: r.require_pcr_match,
            },
            PolicyRule::Subscription(r) => RuleParams::Subscription {
                fee: r.fee,
                ttl_millis: r.ttl_millis,
            },
            PolicyRule::TimeLock(r) => RuleParams::TimeLock {
                unlock_at_epoch_millis: r.unlock_at_epoch_millis,
            },
            PolicyRule::Allowlist(r) => RuleParams::Allowlist {
                addresses: r.addresses,
            },
        }
    }
}

/// A named authorization descriptor. All rules must pass (logical AND).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Policy {
    id: String,
    kind: PolicyKind,
    rules: Vec<PolicyRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

impl Policy {
    /// Validate `params` against `kind` and build the policy.
    ///
    /// `now_millis` enables the creation-time checks (time locks must be in
    /// the future); rehydration from the ledger passes `None`.
    pub(crate) fn build(
        id: String,
        kind: PolicyKind,
        params: PolicyParams,
        now_millis: Option<u64>,
    ) -> AccessResult<Self> {
        if id.trim().is_empty() {
            return Err(invalid("policy id must not be empty"));
        }
        if params.rules.is_empty() {
            return Err(invalid("policy must contain at least one rule"));
        }
        if let Some(namespace) = &params.namespace {
            if namespace.trim().is_empty() {
                return Err(invalid("namespace must not be blank"));
            }
        }

        let mut rules = Vec::with_capacity(params.rules.len());
        for rule_params in params.rules {
            let rule = PolicyRule::validate(rule_params, now_millis)?;
            if rules
                .iter()
                .any(|r: &PolicyRule| r.variant_name() == rule.variant_name())
            {
                return Err(invalid(format!(
                    "duplicate {} rule",
                    rule.variant_name()
                )));
            }
            rules.push(rule);
        }

        let required = kind.required_rule();
        if !rules.iter().any(|r| r.variant_name() == required) {
            return Err(invalid(format!("{kind} policy requires a {required} rule")));
        }

        Ok(Self {
            id,
            kind,
            rules,
            namespace: params.namespace,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Key used for ledger lookups: the namespace when set, else the content id.
    pub fn ledger_key<'a>(&'a self, content_id: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(content_id)
    }

    /// Rules in evaluation order: cheapest tier first, declared order within a tier.
    pub fn evaluation_order(&self) -> Vec<&PolicyRule> {
        let mut ordered: Vec<&PolicyRule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| r.cost_tier());
        ordered
    }

    /// Parameters that rebuild this policy, e.g. for ledger registration.
    pub fn to_params(&self) -> PolicyParams {
        PolicyParams {
            rules: self.rules.iter().cloned().map(RuleParams::from).collect(),
            namespace: self.namespace.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount: u64) -> RuleParams {
        RuleParams::Payment {
            amount,
            recipient: "0xseller".to_string(),
        }
    }

    fn allowlist(addresses: &[&str]) -> RuleParams {
        RuleParams::Allowlist {
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn build(kind: PolicyKind, rules: Vec<RuleParams>) -> AccessResult<Policy> {
        Policy::build("p-1".to_string(), kind, PolicyParams::new(rules), Some(1_000))
    }

    #[test]
    fn payment_gated_requires_payment_rule() {
        let err = build(PolicyKind::PaymentGated, vec![allowlist(&["a"])]).unwrap_err();
        assert!(matches!(err, AccessError::InvalidPolicyParams(_)));
        assert!(build(PolicyKind::PaymentGated, vec![payment(100)]).is_ok());
    }

    #[test]
    fn empty_rule_set_is_rejected() {
        let err = build(PolicyKind::Allowlist, vec![]).unwrap_err();
        assert!(err.to_string().contains("at least one rule"));
    }

    #[test]
    fn out_of_range_params_are_rejected() {
        assert!(build(PolicyKind::PaymentGated, vec![payment(0)]).is_err());
        assert!(build(PolicyKind::Allowlist, vec![allowlist(&[])]).is_err());
        assert!(build(PolicyKind::Allowlist, vec![allowlist(&["a", " "])]).is_err());
        assert!(build(
            PolicyKind::Subscription,
            vec![RuleParams::Subscription {
                fee: 10,
                ttl_millis: 0
            }]
        )
        .is_err());
        assert!(build(
            PolicyKind::TeeOnly,
            vec![RuleParams::Attestation {
                required_enclave_id: "".to_string(),
                require_pcr_match: false
            }]
        )
        .is_err());
    }

    #[test]
    fn time_lock_must_be_in_the_future_at_creation() {
        let past = RuleParams::TimeLock {
            unlock_at_epoch_millis: 1_000,
        };
        assert!(build(PolicyKind::TimeLocked, vec![past.clone()]).is_err());

        // Rehydration skips the creation-time check
        let rehydrated = Policy::build(
            "p-1".to_string(),
            PolicyKind::TimeLocked,
            PolicyParams::new(vec![past]),
            None,
        );
        assert!(rehydrated.is_ok());
    }

    #[test]
    fn duplicate_rule_variants_are_rejected() {
        let err = build(PolicyKind::PaymentGated, vec![payment(1), payment(2)]).unwrap_err();
        assert!(err.to_string().contains("duplicate payment rule"));
    }

    #[test]
    fn evaluation_order_puts_local_checks_first() {
        let policy = build(
            PolicyKind::PaymentGated,
            vec![
                RuleParams::Attestation {
                    required_enclave_id: "enclave-1".to_string(),
                    require_pcr_match: false,
                },
                payment(100),
                allowlist(&["a"]),
            ],
        )
        .unwrap();

        let order: Vec<&str> = policy
            .evaluation_order()
            .iter()
            .map(|r| r.variant_name())
            .collect();
        assert_eq!(order, vec!["allowlist", "payment", "attestation"]);
        // Declared order is preserved on the policy itself
        assert_eq!(policy.rules()[0].variant_name(), "attestation");
    }

    #[test]
    fn ledger_key_prefers_namespace() {
        let policy = Policy::build(
            "p-1".to_string(),
            PolicyKind::PaymentGated,
            PolicyParams::new(vec![payment(5)]).with_namespace("dataset-9"),
            None,
        )
        .unwrap();
        assert_eq!(policy.ledger_key("content-x"), "dataset-9");
    }

    #[test]
    fn rules_deserialize_through_validation() {
        let ok: PolicyRule =
            serde_json::from_str(r#"{"type":"payment","amount":100,"recipient":"0xr"}"#).unwrap();
        assert_eq!(ok.variant_name(), "payment");

        let bad = serde_json::from_str::<PolicyRule>(r#"{"type":"payment","amount":0,"recipient":"0xr"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn params_round_trip_through_policy() {
        let params = PolicyParams::new(vec![payment(100), allowlist(&["a", "b"])]);
        let policy = Policy::build(
            "p-1".to_string(),
            PolicyKind::PaymentGated,
            params.clone(),
            None,
        )
        .unwrap();
        assert_eq!(policy.to_params(), params);
    }
}
