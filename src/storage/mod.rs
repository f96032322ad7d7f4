// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Blob storage for envelope ciphertext plus the audit trail.
//!
//! ## Storage Layout
//!
//! ```text
//! /data/
//!   blobs/
//!     {blob_id}.bin        # Serialized EncryptionEnvelope
//!   audit/
//!     {date}/events.jsonl  # Daily audit logs
//! ```
//!
//! ## Important Notes
//!
//! - The filesystem store uses **normal filesystem I/O**; the enclave
//!   runtime seals the `/data` mount
//! - Everything written here is either envelope ciphertext or audit
//!   metadata; content keys never touch storage unwrapped

pub mod audit;
pub mod blob;
pub mod encrypted_fs;
pub mod paths;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use blob::{BlobId, BlobStore, FsBlobStore, MemoryBlobStore};
pub use encrypted_fs::{EncryptedStorage, StorageError, StorageResult};
pub use paths::StoragePaths;
