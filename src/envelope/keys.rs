// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key material, randomness and content-key wrapping.
//!
//! ## Scheme
//!
//! - Content keys are 32 random bytes used with AES-256-GCM.
//! - IVs are 12 random bytes, drawn fresh for every seal.
//! - A wrapped key is `wrap_iv (12) || AES-256-GCM(wrapping_key, content_key) (32 + 16 tag)`,
//!   always [`WRAPPED_KEY_LEN`] bytes.
//! - The policy id is bound as associated data, so a wrapped key or
//!   ciphertext moved under a different policy fails authentication.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{AccessError, AccessResult};

pub const CONTENT_KEY_LEN: usize = 32;
pub const IV_LEN: usize = NONCE_LEN;
pub const TAG_LEN: usize = 16;
pub const WRAPPED_KEY_LEN: usize = IV_LEN + CONTENT_KEY_LEN + TAG_LEN;

/// Source of cryptographically secure random bytes.
pub trait KeySource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> AccessResult<()>;
}

/// Operating-system CSPRNG.
#[derive(Debug)]
pub struct SystemKeySource {
    rng: SystemRandom,
}

impl SystemKeySource {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for SystemKeySource {
    fn fill(&self, dest: &mut [u8]) -> AccessResult<()> {
        self.rng
            .fill(dest)
            .map_err(|_| AccessError::Crypto("system random source failed".to_string()))
    }
}

/// Deterministic stream (SHA-256 of seed and a block counter).
///
/// Never repeats output within one instance, so envelope non-determinism
/// still holds; the sequence is reproducible across runs for tests.
#[derive(Debug)]
pub struct SeededKeySource {
    seed: [u8; 32],
    counter: AtomicU64,
}

impl SeededKeySource {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            counter: AtomicU64::new(0),
        }
    }
}

impl KeySource for SeededKeySource {
    fn fill(&self, dest: &mut [u8]) -> AccessResult<()> {
        for chunk in dest.chunks_mut(32) {
            let block = self.counter.fetch_add(1, Ordering::SeqCst);
            let mut hasher = Sha256::new();
            hasher.update(self.seed);
            hasher.update(block.to_be_bytes());
            let output = hasher.finalize();
            chunk.copy_from_slice(&output[..chunk.len()]);
        }
        Ok(())
    }
}

/// A symmetric content key. Zeroized on drop; never printed.
pub struct ContentKey(Zeroizing<[u8; CONTENT_KEY_LEN]>);

impl ContentKey {
    pub fn generate(source: &dyn KeySource) -> AccessResult<Self> {
        let mut bytes = Zeroizing::new([0u8; CONTENT_KEY_LEN]);
        source.fill(&mut bytes[..])?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; CONTENT_KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

pub(crate) fn random_iv(source: &dyn KeySource) -> AccessResult<[u8; IV_LEN]> {
    let mut iv = [0u8; IV_LEN];
    source.fill(&mut iv)?;
    Ok(iv)
}

fn aead_key(key: &[u8; CONTENT_KEY_LEN]) -> AccessResult<LessSafeKey> {
    let unbound = UnboundKey::new(&AES_256_GCM, key)
        .map_err(|_| AccessError::Crypto("invalid AES-256-GCM key".to_string()))?;
    Ok(LessSafeKey::new(unbound))
}

/// AEAD-seal `plaintext`, returning ciphertext with the tag appended.
pub(crate) fn seal(
    key: &[u8; CONTENT_KEY_LEN],
    iv: [u8; IV_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> AccessResult<Vec<u8>> {
    let key = aead_key(key)?;
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(Nonce::assume_unique_for_key(iv), Aad::from(aad), &mut in_out)
        .map_err(|_| AccessError::Crypto("AEAD seal failed".to_string()))?;
    Ok(in_out)
}

/// AEAD-open `ciphertext`. Any tag mismatch is an integrity violation.
pub(crate) fn open(
    key: &[u8; CONTENT_KEY_LEN],
    iv: [u8; IV_LEN],
    aad: &[u8],
    ciphertext: &[u8],
    what: &str,
) -> AccessResult<Zeroizing<Vec<u8>>> {
    let key = aead_key(key)?;
    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let plaintext_len = key
        .open_in_place(Nonce::assume_unique_for_key(iv), Aad::from(aad), &mut in_out)
        .map_err(|_| AccessError::IntegrityViolation(format!("{what} failed authentication")))?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// Wraps and unwraps content keys under the service-held wrapping key.
pub struct KeyWrapper {
    wrapping_key: Zeroizing<[u8; CONTENT_KEY_LEN]>,
    source: Arc<dyn KeySource>,
}

impl KeyWrapper {
    pub fn new(wrapping_key: [u8; CONTENT_KEY_LEN], source: Arc<dyn KeySource>) -> Self {
        Self {
            wrapping_key: Zeroizing::new(wrapping_key),
            source,
        }
    }

    /// Create a wrapper with a freshly generated wrapping key.
    pub fn generate(source: Arc<dyn KeySource>) -> AccessResult<Self> {
        let mut key = [0u8; CONTENT_KEY_LEN];
        source.fill(&mut key)?;
        let wrapper = Self::new(key, source);
        zeroize::Zeroize::zeroize(&mut key);
        Ok(wrapper)
    }

    /// Seal `key` under the wrapping key, authenticated with `context`.
    pub fn wrap(&self, key: &ContentKey, context: &[u8]) -> AccessResult<Vec<u8>> {
        let iv = random_iv(self.source.as_ref())?;
        let sealed = seal(&self.wrapping_key, iv, context, key.as_bytes())?;

        let mut wrapped = Vec::with_capacity(WRAPPED_KEY_LEN);
        wrapped.extend_from_slice(&iv);
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    /// Recover a content key. `context` must equal the one used to wrap it.
    pub fn unwrap(&self, wrapped: &[u8], context: &[u8]) -> AccessResult<ContentKey> {
        if wrapped.len() != WRAPPED_KEY_LEN {
            return Err(AccessError::IntegrityViolation(format!(
                "wrapped key must be {WRAPPED_KEY_LEN} bytes, got {}",
                wrapped.len()
            )));
        }

        let (iv, sealed) = wrapped.split_at(IV_LEN);
        let mut iv_bytes = [0u8; IV_LEN];
        iv_bytes.copy_from_slice(iv);

        let opened = open(
            &self.wrapping_key,
            iv_bytes,
            context,
            sealed,
            "wrapped content key",
        )?;
        let mut key = [0u8; CONTENT_KEY_LEN];
        key.copy_from_slice(&opened);
        let content_key = ContentKey::from_bytes(key);
        zeroize::Zeroize::zeroize(&mut key);
        Ok(content_key)
    }
}
