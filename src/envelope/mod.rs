// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Encryption
//!
//! Payloads are sealed under a fresh per-envelope content key; the content
//! key is wrapped under the service wrapping key and stored beside the
//! ciphertext. Only the access protocol unwraps it.

pub mod keys;
pub mod service;

pub use keys::{
    ContentKey, KeySource, KeyWrapper, SeededKeySource, SystemKeySource, CONTENT_KEY_LEN, IV_LEN,
    WRAPPED_KEY_LEN,
};
pub use service::{DecryptionResult, EncryptionEnvelope, EnvelopeService};
