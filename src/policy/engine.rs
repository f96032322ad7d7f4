// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Policy construction and the in-memory policy registry.
//!
//! The registry is a cache: the ledger is the durable source of truth for
//! which policies exist. A miss here surfaces as `PolicyNotFound` and the
//! access protocol may rehydrate from the ledger.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use super::rules::{Policy, PolicyKind, PolicyParams};
use crate::clock::Clock;
use crate::error::{AccessError, AccessResult};

pub struct PolicyEngine {
    clock: Arc<dyn Clock>,
    registry: RwLock<HashMap<String, Policy>>,
}

impl PolicyEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Validate `params` against `kind` and mint a policy with a fresh id.
    ///
    /// Does not register the policy; call [`store_policy`](Self::store_policy).
    pub fn create_policy(&self, kind: PolicyKind, params: PolicyParams) -> AccessResult<Policy> {
        let id = uuid::Uuid::new_v4().to_string();
        let policy = Policy::build(id, kind, params, Some(self.clock.now_millis()))?;
        info!(
            policy_id = %policy.id(),
            kind = %kind,
            rules = policy.rules().len(),
            "Policy created"
        );
        Ok(policy)
    }

    /// Insert or replace a policy in the registry.
    pub fn store_policy(&self, policy: Policy) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        debug!(policy_id = %policy.id(), "Policy cached");
        registry.insert(policy.id().to_string(), policy);
    }

    pub fn get_policy(&self, policy_id: &str) -> AccessResult<Policy> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .get(policy_id)
            .cloned()
            .ok_or_else(|| AccessError::PolicyNotFound(policy_id.to_string()))
    }

    /// Rebuild a policy from ledger-held parameters and cache it.
    ///
    /// Runs structural validation only; a time lock that has since passed
    /// is still a valid policy.
    pub fn rehydrate(
        &self,
        policy_id: &str,
        kind: PolicyKind,
        params: PolicyParams,
    ) -> AccessResult<Policy> {
        let policy = Policy::build(policy_id.to_string(), kind, params, None)?;
        self.store_policy(policy.clone());
        info!(policy_id = %policy_id, kind = %kind, "Policy rehydrated from ledger");
        Ok(policy)
    }

    /// Drop a cached policy. Returns whether it was present.
    pub fn evict(&self, policy_id: &str) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.remove(policy_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
