// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for security-sensitive operations.
//!
//! Policy registration, content sealing, every access decision, integrity
//! violations and session revocations are appended to the sealed audit
//! store, one JSON object per line, one file per UTC day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{EncryptedStorage, StorageError, StorageResult};

/// Types of auditable events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Seller-side events
    PolicyRegistered,
    ContentSealed,
    AttestationRecorded,

    // Decision events
    AccessGranted,
    AccessDenied,
    EvaluationFailed,
    IntegrityViolation,

    // Session events
    SessionRevoked,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    /// Requester identity, if known.
    pub subject: Option<String>,
    /// Resource type (policy, content, blob, session).
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            event_type,
            subject: None,
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Repository for audit events.
pub struct AuditRepository<'a> {
    storage: &'a EncryptedStorage,
}

impl<'a> AuditRepository<'a> {
    pub fn new(storage: &'a EncryptedStorage) -> Self {
        Self { storage }
    }

    /// Append an event to the daily JSONL file.
    pub fn log(&self, event: &AuditEvent) -> StorageResult<()> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.storage.paths().audit_events_file(&date);

        let line = serde_json::to_vec(event).map_err(|e| {
            StorageError::SerializationError(format!("Failed to serialize audit event: {e}"))
        })?;

        self.storage.append_line(&path, &line)
    }

    /// Read audit events for a specific date (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> StorageResult<Vec<AuditEvent>> {
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| StorageError::SerializationError(format!("Invalid date: {e}")))?;

        let path = self.storage.paths().audit_events_file(date);
        let content = self.storage.read_raw(&path)?;

        let content_str = String::from_utf8(content).map_err(|e| {
            StorageError::SerializationError(format!("Invalid UTF-8 in audit log: {e}"))
        })?;

        let mut events = Vec::new();
        for line in content_str.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(line).map_err(|e| {
                StorageError::SerializationError(format!("Failed to deserialize audit event: {e}"))
            })?;
            events.push(event);
        }

        Ok(events)
    }

    /// Events for one subject on a given date.
    pub fn search_by_subject(&self, subject: &str, date: &str) -> StorageResult<Vec<AuditEvent>> {
        let events = self.read_events(date)?;
        Ok(events
            .into_iter()
            .filter(|e| e.subject.as_deref() == Some(subject))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePaths;
    use tempfile::TempDir;

    fn at() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn setup() -> (TempDir, EncryptedStorage) {
        let temp = TempDir::new().unwrap();
        let mut storage = EncryptedStorage::new(StoragePaths::new(temp.path()));
        storage.initialize().unwrap();
        (temp, storage)
    }

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::AccessGranted, at())
            .with_subject("0xbuyer")
            .with_resource("content", "dataset-1");

        assert_eq!(event.event_type, AuditEventType::AccessGranted);
        assert_eq!(event.subject, Some("0xbuyer".to_string()));
        assert_eq!(event.resource_id, Some("dataset-1".to_string()));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::AccessDenied, at())
            .with_subject("0xbuyer")
            .failed("not allowlisted");

        assert!(!event.success);
        assert_eq!(event.error, Some("not allowlisted".to_string()));
    }

    #[test]
    fn log_and_search_events() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);

        repo.log(
            &AuditEvent::new(AuditEventType::PolicyRegistered, at()).with_resource("policy", "p1"),
        )
        .unwrap();
        repo.log(&AuditEvent::new(AuditEventType::AccessGranted, at()).with_subject("alice"))
            .unwrap();
        repo.log(&AuditEvent::new(AuditEventType::AccessDenied, at()).with_subject("bob"))
            .unwrap();

        let events = repo.read_events("2023-11-14").unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_type, AuditEventType::PolicyRegistered);

        let alice = repo.search_by_subject("alice", "2023-11-14").unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].event_type, AuditEventType::AccessGranted);
    }

    #[test]
    fn rejects_path_like_dates() {
        let (_temp, storage) = setup();
        let repo = AuditRepository::new(&storage);
        assert!(matches!(
            repo.read_events("../blobs"),
            Err(StorageError::SerializationError(_))
        ));
    }
}
