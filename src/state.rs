// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The assembled access core: every service wired to one clock, one key
//! source and one ledger view, plus the seller- and buyer-facing flows.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::access::{AccessDecisionProtocol, AccessRequest};
use crate::attestation::{
    AttestationRecord, AttestationVerifier, EnclaveKeySource, EnclaveRegistry,
};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::envelope::{
    DecryptionResult, EncryptionEnvelope, EnvelopeService, KeySource, KeyWrapper, SystemKeySource,
};
use crate::error::{AccessError, AccessResult};
use crate::ledger::Ledger;
use crate::policy::{Policy, PolicyEngine, PolicyKind, PolicyParams};
use crate::session::{AlwaysRefresh, SessionManager, SessionRefresher, SessionSweeper};
use crate::storage::{
    AuditEvent, AuditEventType, AuditRepository, BlobId, BlobStore, EncryptedStorage,
    StorageError, StoragePaths,
};

/// Open and initialize the sealed data directory named by `config`.
pub fn open_data_dir(config: &CoreConfig) -> AccessResult<Arc<EncryptedStorage>> {
    let mut storage = EncryptedStorage::new(StoragePaths::new(&config.data_dir));
    storage.initialize()?;
    storage.health_check()?;
    info!(data_dir = %config.data_dir.display(), "Data directory ready");
    Ok(Arc::new(storage))
}

/// Collaborators injected into [`AccessCore`].
pub struct CoreDeps {
    pub ledger: Arc<dyn Ledger>,
    pub blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
    pub key_source: Arc<dyn KeySource>,
    pub enclaves: Arc<dyn EnclaveKeySource>,
    pub refresher: Arc<dyn SessionRefresher>,
    /// Audit trail destination. `None` disables auditing.
    pub audit: Option<Arc<EncryptedStorage>>,
}

impl CoreDeps {
    /// Production defaults: wall clock, OS randomness, empty enclave registry.
    ///
    /// With no registered enclaves every attestation rule denies.
    pub fn new(ledger: Arc<dyn Ledger>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            ledger,
            blobs,
            clock: Arc::new(SystemClock),
            key_source: Arc::new(SystemKeySource::new()),
            enclaves: Arc::new(EnclaveRegistry::new()),
            refresher: Arc::new(AlwaysRefresh),
            audit: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_source(mut self, key_source: Arc<dyn KeySource>) -> Self {
        self.key_source = key_source;
        self
    }

    pub fn with_enclaves(mut self, enclaves: Arc<dyn EnclaveKeySource>) -> Self {
        self.enclaves = enclaves;
        self
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.refresher = refresher;
        self
    }

    pub fn with_audit(mut self, storage: Arc<EncryptedStorage>) -> Self {
        self.audit = Some(storage);
        self
    }
}

/// What a seller gets back from [`AccessCore::publish`].
#[derive(Debug, Clone, Serialize)]
pub struct PublishedContent {
    pub policy: Policy,
    pub blob_id: BlobId,
    pub envelope: EncryptionEnvelope,
}

pub struct AccessCore {
    clock: Arc<dyn Clock>,
    policies: Arc<PolicyEngine>,
    verifier: Arc<AttestationVerifier>,
    sessions: Arc<SessionManager>,
    protocol: Arc<AccessDecisionProtocol>,
    envelopes: EnvelopeService,
    blobs: Arc<dyn BlobStore>,
    audit: Option<Arc<EncryptedStorage>>,
}

impl AccessCore {
    pub fn new(config: &CoreConfig, deps: CoreDeps) -> AccessResult<Self> {
        config.session.validate()?;

        let wrapper = Arc::new(match config.wrapping_key {
            Some(key) => KeyWrapper::new(key, Arc::clone(&deps.key_source)),
            None => {
                warn!("No wrapping key configured; generated a process-local key");
                KeyWrapper::generate(Arc::clone(&deps.key_source))?
            }
        });

        let policies = Arc::new(PolicyEngine::new(Arc::clone(&deps.clock)));
        let verifier = Arc::new(AttestationVerifier::new(
            Arc::clone(&deps.clock),
            deps.enclaves,
            config.attestation_cache_size,
        ));
        let sessions = Arc::new(SessionManager::new(
            config.session,
            Arc::clone(&deps.clock),
            deps.refresher,
        ));
        let protocol = Arc::new(AccessDecisionProtocol::new(
            Arc::clone(&policies),
            deps.ledger,
            Arc::clone(&verifier),
            Arc::clone(&sessions),
            Arc::clone(&wrapper),
            Arc::clone(&deps.clock),
            config.ledger_timeout,
        ));
        let envelopes = EnvelopeService::new(
            wrapper,
            deps.key_source,
            Arc::clone(&protocol),
            config.max_payload_bytes,
        );

        info!(
            ledger_timeout_ms = config.ledger_timeout.as_millis() as u64,
            session_ttl_ms = config.session.ttl_ms,
            audit = deps.audit.is_some(),
            "Access core initialized"
        );

        Ok(Self {
            clock: deps.clock,
            policies,
            verifier,
            sessions,
            protocol,
            envelopes,
            blobs: deps.blobs,
            audit: deps.audit,
        })
    }

    pub fn policies(&self) -> &Arc<PolicyEngine> {
        &self.policies
    }

    pub fn verifier(&self) -> &Arc<AttestationVerifier> {
        &self.verifier
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn protocol(&self) -> &Arc<AccessDecisionProtocol> {
        &self.protocol
    }

    pub fn envelopes(&self) -> &EnvelopeService {
        &self.envelopes
    }

    /// Seller flow: create and register a policy, seal the payload, store it.
    ///
    /// Ledger lookups for the policy are keyed by `content_id` unless the
    /// params name a namespace.
    pub async fn publish(
        &self,
        content_id: &str,
        kind: PolicyKind,
        params: PolicyParams,
        payload: &[u8],
    ) -> AccessResult<PublishedContent> {
        let policy = self.policies.create_policy(kind, params)?;
        self.policies.store_policy(policy.clone());
        self.audit(
            self.event(AuditEventType::PolicyRegistered)
                .with_resource("policy", policy.id())
                .with_details(serde_json::json!({ "kind": kind.to_string() })),
        );

        let envelope = self.envelopes.encrypt(content_id, payload, &policy)?;
        let blob_id = self.blobs.put(content_id, envelope.to_bytes()?).await?;
        self.audit(
            self.event(AuditEventType::ContentSealed)
                .with_resource("blob", blob_id.as_str())
                .with_details(serde_json::json!({
                    "content_id": content_id,
                    "policy_id": policy.id(),
                    "payload_bytes": payload.len(),
                })),
        );

        info!(
            content_id = %content_id,
            policy_id = %policy.id(),
            blob_id = %blob_id,
            "Content published"
        );
        Ok(PublishedContent {
            policy,
            blob_id,
            envelope,
        })
    }

    /// Buyer flow: fetch the stored envelope and open it for `request`.
    pub async fn retrieve(
        &self,
        blob_id: &BlobId,
        request: &AccessRequest,
    ) -> AccessResult<DecryptionResult> {
        let result = match self.blobs.get(blob_id).await {
            Ok(bytes) => match EncryptionEnvelope::from_bytes(&bytes) {
                Ok(envelope) => self.envelopes.decrypt(&envelope, request).await,
                Err(e) => Err(e),
            },
            // Sealed-FS tag failures are tampering, not infrastructure trouble
            Err(StorageError::IntegrityViolation(msg)) => Err(AccessError::IntegrityViolation(msg)),
            Err(e) => Err(e.into()),
        };

        let event = match &result {
            Ok(opened) => self.event(AuditEventType::AccessGranted)
                .with_details(serde_json::json!({ "session_id": opened.session.session_id })),
            Err(AccessError::AccessDenied(reason)) => self.event(AuditEventType::AccessDenied)
                .failed(reason.as_str()),
            Err(e @ AccessError::ContentMismatch { .. }) => {
                self.event(AuditEventType::AccessDenied).failed(e.to_string())
            }
            Err(e @ AccessError::IntegrityViolation(_)) => {
                self.event(AuditEventType::IntegrityViolation).failed(e.to_string())
            }
            Err(e) => self.event(AuditEventType::EvaluationFailed).failed(e.to_string()),
        };
        self.audit(
            event
                .with_subject(request.subject.as_str())
                .with_resource("blob", blob_id.as_str()),
        );

        result
    }

    /// Create, store and audit an attestation record.
    pub fn record_attestation(
        &self,
        request_id: &str,
        enclave_id: &str,
        measurements: &[Vec<u8>],
        payload: Vec<u8>,
    ) -> AccessResult<AttestationRecord> {
        let record =
            self.verifier
                .create_attestation_record(request_id, enclave_id, measurements, payload)?;
        self.verifier.store_record(record.clone());
        self.audit(
            self.event(AuditEventType::AttestationRecorded)
                .with_resource("attestation", request_id)
                .with_details(serde_json::json!({ "enclave_id": enclave_id })),
        );
        Ok(record)
    }

    pub async fn revoke_session(&self, subject: &str) -> bool {
        let revoked = self.sessions.revoke(subject).await;
        if revoked {
            self.audit(
                self.event(AuditEventType::SessionRevoked)
                    .with_subject(subject)
                    .with_resource("session", subject),
            );
        }
        revoked
    }

    /// Start the background session sweep.
    pub fn spawn_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let sweeper = SessionSweeper::new(Arc::clone(&self.sessions));
        tokio::spawn(sweeper.run(shutdown))
    }

    fn event(&self, event_type: AuditEventType) -> AuditEvent {
        AuditEvent::new(event_type, self.clock.now_utc())
    }

    fn audit(&self, event: AuditEvent) {
        let Some(storage) = &self.audit else {
            return;
        };
        if let Err(e) = AuditRepository::new(storage).log(&event) {
            warn!(error = %e, event_type = ?event.event_type, "Failed to write audit event");
        }
    }
}
