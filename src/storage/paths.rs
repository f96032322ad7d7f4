// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Path constants and utilities for the sealed storage layout.

use std::path::{Path, PathBuf};

/// Base directory for all sealed persistent storage.
/// This MUST be mounted as an encrypted filesystem inside the enclave.
pub const DATA_ROOT: &str = "/data";

/// Storage path utilities for the sealed filesystem.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    /// Create a new StoragePaths with a custom root (useful for testing).
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Root directory for all sealed data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========== Blob Paths ==========

    /// Directory containing all ciphertext blobs.
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Path to a specific blob.
    pub fn blob(&self, blob_id: &str) -> PathBuf {
        self.blobs_dir().join(format!("{blob_id}.bin"))
    }

    // ========== Audit Log Paths ==========

    /// Directory containing audit logs.
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory for a specific date's audit logs.
    pub fn audit_date_dir(&self, date: &str) -> PathBuf {
        self.audit_dir().join(date)
    }

    /// Path to a daily audit events file (JSONL format).
    pub fn audit_events_file(&self, date: &str) -> PathBuf {
        self.audit_date_dir(date).join("events.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_paths_use_data_root() {
        let paths = StoragePaths::default();
        assert_eq!(paths.root(), Path::new("/data"));
    }

    #[test]
    fn blob_paths_are_correct() {
        let paths = StoragePaths::new("/tmp/test-data");
        assert_eq!(paths.blobs_dir(), PathBuf::from("/tmp/test-data/blobs"));
        assert_eq!(
            paths.blob("b-123"),
            PathBuf::from("/tmp/test-data/blobs/b-123.bin")
        );
    }

    #[test]
    fn audit_paths_are_correct() {
        let paths = StoragePaths::default();
        assert_eq!(paths.audit_dir(), PathBuf::from("/data/audit"));
        assert_eq!(
            paths.audit_events_file("2026-01-28"),
            PathBuf::from("/data/audit/2026-01-28/events.jsonl")
        );
    }
}
