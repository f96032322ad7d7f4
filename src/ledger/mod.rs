// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Ledger View
//!
//! Read-only view of the purchase ledger. The ledger is the durable source of
//! truth for purchases, subscriptions and published policy parameters; the
//! access core only ever reads from it.
//!
//! Lookups are keyed by the policy namespace (defaulting to the content id)
//! and the requesting subject.
//!
//! [`InMemoryLedger`] backs tests and local development. It can be switched
//! into an unavailable state or given an artificial delay to exercise the
//! evaluation-error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::policy::{PolicyKind, PolicyParams};

/// Errors surfaced by a ledger backend.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// A recorded purchase of a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub content_id: String,
    pub buyer: String,
    /// Amount paid, in the smallest unit of the payment token.
    pub amount: u64,
    /// Address the payment was made to.
    pub recipient: String,
    pub purchased_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub content_id: String,
    pub subscriber: String,
    pub fee_paid: u64,
    /// Start of the subscription window, epoch millis.
    pub purchased_at: u64,
}

/// Policy parameters as published on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    pub kind: PolicyKind,
    pub params: PolicyParams,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn get_purchase_record(
        &self,
        content_id: &str,
        buyer: &str,
    ) -> Result<Option<PurchaseRecord>, LedgerError>;

    async fn get_subscription(
        &self,
        content_id: &str,
        subscriber: &str,
    ) -> Result<Option<SubscriptionRecord>, LedgerError>;

    async fn get_policy_params(&self, policy_id: &str)
        -> Result<Option<LedgerPolicy>, LedgerError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    purchases: RwLock<HashMap<(String, String), PurchaseRecord>>,
    subscriptions: RwLock<HashMap<(String, String), SubscriptionRecord>>,
    policies: RwLock<HashMap<String, LedgerPolicy>>,
    unavailable: AtomicBool,
    delay_ms: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_purchase(&self, record: PurchaseRecord) {
        let key = (record.content_id.clone(), record.buyer.clone());
        self.purchases.write().await.insert(key, record);
    }

    pub async fn record_subscription(&self, record: SubscriptionRecord) {
        let key = (record.content_id.clone(), record.subscriber.clone());
        self.subscriptions.write().await.insert(key, record);
    }

    pub async fn publish_policy(&self, policy_id: impl Into<String>, policy: LedgerPolicy) {
        self.policies.write().await.insert(policy_id.into(), policy);
    }

    /// Make every subsequent call fail with [`LedgerError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    async fn before_call(&self) -> Result<(), LedgerError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("in-memory ledger offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_purchase_record(
        &self,
        content_id: &str,
        buyer: &str,
    ) -> Result<Option<PurchaseRecord>, LedgerError> {
        self.before_call().await?;
        let key = (content_id.to_string(), buyer.to_string());
        Ok(self.purchases.read().await.get(&key).cloned())
    }

    async fn get_subscription(
        &self,
        content_id: &str,
        subscriber: &str,
    ) -> Result<Option<SubscriptionRecord>, LedgerError> {
        self.before_call().await?;
        let key = (content_id.to_string(), subscriber.to_string());
        Ok(self.subscriptions.read().await.get(&key).cloned())
    }

    async fn get_policy_params(
        &self,
        policy_id: &str,
    ) -> Result<Option<LedgerPolicy>, LedgerError> {
        self.before_call().await?;
        Ok(self.policies.read().await.get(policy_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RuleParams;

    fn purchase(content_id: &str, buyer: &str) -> PurchaseRecord {
        PurchaseRecord {
            content_id: content_id.to_string(),
            buyer: buyer.to_string(),
            amount: 100,
            recipient: "0xseller".to_string(),
            purchased_at: 1_000,
        }
    }

    #[tokio::test]
    async fn purchases_are_keyed_by_content_and_buyer() {
        let ledger = InMemoryLedger::new();
        ledger.record_purchase(purchase("c1", "alice")).await;

        assert!(ledger.get_purchase_record("c1", "alice").await.unwrap().is_some());
        assert!(ledger.get_purchase_record("c1", "bob").await.unwrap().is_none());
        assert!(ledger.get_purchase_record("c2", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn published_policy_round_trips() {
        let ledger = InMemoryLedger::new();
        let policy = LedgerPolicy {
            kind: PolicyKind::TimeLocked,
            params: PolicyParams::new(vec![RuleParams::TimeLock {
                unlock_at_epoch_millis: 5_000,
            }]),
        };
        ledger.publish_policy("p1", policy.clone()).await;

        assert_eq!(ledger.get_policy_params("p1").await.unwrap(), Some(policy));
        assert_eq!(ledger.get_policy_params("p2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unavailable_ledger_fails_every_call() {
        let ledger = InMemoryLedger::new();
        ledger.record_purchase(purchase("c1", "alice")).await;
        ledger.set_unavailable(true);

        assert!(matches!(
            ledger.get_purchase_record("c1", "alice").await,
            Err(LedgerError::Unavailable(_))
        ));
        assert!(ledger.get_subscription("c1", "alice").await.is_err());

        ledger.set_unavailable(false);
        assert!(ledger.get_purchase_record("c1", "alice").await.is_ok());
    }
}
