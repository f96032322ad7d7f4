// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared wiring for protocol and envelope tests.

use std::sync::Arc;
use std::time::Duration;

use super::{AccessDecision, AccessDecisionProtocol, AccessRequest};
use crate::attestation::{AttestationVerifier, EnclaveKeySource, EnclaveRegistry};
use crate::clock::{Clock, ManualClock};
use crate::config::SessionConfig;
use crate::envelope::{EncryptionEnvelope, EnvelopeService, KeySource, KeyWrapper, SeededKeySource};
use crate::ledger::{InMemoryLedger, Ledger};
use crate::policy::{Policy, PolicyEngine, PolicyKind, PolicyParams, RuleParams};
use crate::session::{AlwaysRefresh, SessionManager};

pub const T0: u64 = 1_700_000_000_000;
pub const CONTENT: &str = "content-1";

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<InMemoryLedger>,
    pub enclaves: Arc<EnclaveRegistry>,
    pub policies: Arc<PolicyEngine>,
    pub sessions: Arc<SessionManager>,
    pub envelopes: EnvelopeService,
    pub protocol: Arc<AccessDecisionProtocol>,
}

pub fn harness() -> Harness {
    harness_with_limit(1024)
}

pub fn harness_with_limit(max_payload_bytes: usize) -> Harness {
    let clock = Arc::new(ManualClock::new(T0));
    let dyn_clock: Arc<dyn Clock> = Arc::clone(&clock) as Arc<dyn Clock>;
    let source: Arc<dyn KeySource> = Arc::new(SeededKeySource::new([5u8; 32]));
    let ledger = Arc::new(InMemoryLedger::new());
    let enclaves = Arc::new(EnclaveRegistry::new());
    let policies = Arc::new(PolicyEngine::new(Arc::clone(&dyn_clock)));
    let verifier = Arc::new(AttestationVerifier::new(
        Arc::clone(&dyn_clock),
        Arc::clone(&enclaves) as Arc<dyn EnclaveKeySource>,
        16,
    ));
    let sessions = Arc::new(SessionManager::new(
        SessionConfig::default(),
        Arc::clone(&dyn_clock),
        Arc::new(AlwaysRefresh),
    ));
    let wrapper = Arc::new(KeyWrapper::generate(Arc::clone(&source)).unwrap());
    let protocol = Arc::new(AccessDecisionProtocol::new(
        Arc::clone(&policies),
        Arc::clone(&ledger) as Arc<dyn Ledger>,
        verifier,
        Arc::clone(&sessions),
        Arc::clone(&wrapper),
        dyn_clock,
        Duration::from_millis(50),
    ));
    let envelopes = EnvelopeService::new(
        wrapper,
        source,
        Arc::clone(&protocol),
        max_payload_bytes,
    );

    Harness {
        clock,
        ledger,
        enclaves,
        policies,
        sessions,
        envelopes,
        protocol,
    }
}

pub fn allowlist(subjects: &[&str]) -> RuleParams {
    RuleParams::Allowlist {
        addresses: subjects.iter().map(|s| s.to_string()).collect(),
    }
}

impl Harness {
    pub fn policy(&self, kind: PolicyKind, rules: Vec<RuleParams>) -> Policy {
        let policy = self
            .policies
            .create_policy(kind, PolicyParams::new(rules))
            .unwrap();
        self.policies.store_policy(policy.clone());
        policy
    }

    /// Register a policy and seal `secret` under it for [`CONTENT`].
    pub fn seal(&self, kind: PolicyKind, rules: Vec<RuleParams>) -> (Policy, EncryptionEnvelope) {
        let policy = self.policy(kind, rules);
        let envelope = self.envelopes.encrypt(CONTENT, b"secret", &policy).unwrap();
        (policy, envelope)
    }

    pub async fn decide(&self, subject: &str, envelope: &EncryptionEnvelope) -> AccessDecision {
        self.protocol
            .decide(&AccessRequest::new(CONTENT, subject), envelope)
            .await
            .unwrap()
    }
}
