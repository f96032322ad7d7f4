// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blob store interface for opaque ciphertext.
//!
//! The core never interprets blob contents; it only puts serialized
//! envelopes and gets them back by id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EncryptedStorage, StorageError, StorageResult};

/// Namespace for content-addressed blob ids.
const BLOB_NAMESPACE: Uuid = Uuid::from_u128(0x5ea1_ed0a_cce5_4b10_b000_0000_0000_0001);

/// Identifier of a stored blob.
///
/// Derived from the content id and the SHA-256 of the stored bytes, so
/// re-uploading identical ciphertext for the same content is idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn derive(content_id: &str, bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut name = Vec::with_capacity(content_id.len() + 1 + digest.len());
        name.extend_from_slice(content_id.as_bytes());
        name.push(0);
        name.extend_from_slice(&digest);
        Self(Uuid::new_v5(&BLOB_NAMESPACE, &name).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for BlobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Byte-addressable get/put service for ciphertext.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, content_id: &str, bytes: Vec<u8>) -> StorageResult<BlobId>;

    /// Fails with `StorageError::NotFound` for unknown ids.
    async fn get(&self, blob_id: &BlobId) -> StorageResult<Vec<u8>>;
}

/// In-memory blob store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Overwrite a stored blob in place. Simulates host-side tampering.
    pub async fn tamper(&self, blob_id: &BlobId, f: impl FnOnce(&mut Vec<u8>)) -> bool {
        match self.blobs.write().await.get_mut(blob_id) {
            Some(bytes) => {
                f(bytes);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, content_id: &str, bytes: Vec<u8>) -> StorageResult<BlobId> {
        let id = BlobId::derive(content_id, &bytes);
        self.blobs.write().await.insert(id.clone(), bytes);
        Ok(id)
    }

    async fn get(&self, blob_id: &BlobId) -> StorageResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(blob_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("blob {blob_id}")))
    }
}

/// Blob store backed by the sealed data mount.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    storage: Arc<EncryptedStorage>,
}

impl FsBlobStore {
    pub fn new(storage: Arc<EncryptedStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, content_id: &str, bytes: Vec<u8>) -> StorageResult<BlobId> {
        let id = BlobId::derive(content_id, &bytes);
        let storage = Arc::clone(&self.storage);
        let path = storage.paths().blob(id.as_str());
        tokio::task::spawn_blocking(move || storage.write_raw(path, &bytes))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;
        Ok(id)
    }

    async fn get(&self, blob_id: &BlobId) -> StorageResult<Vec<u8>> {
        // Blob ids come from callers; refuse anything that could escape the blobs dir
        if blob_id.as_str().is_empty()
            || !blob_id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(StorageError::NotFound(format!("blob {blob_id}")));
        }

        let storage = Arc::clone(&self.storage);
        let path = storage.paths().blob(blob_id.as_str());
        tokio::task::spawn_blocking(move || storage.read_raw(path))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }
}
