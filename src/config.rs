// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the access core. Configuration is loaded from the environment
//! once, at startup, via [`CoreConfig::from_env`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory of the sealed data mount (blobs, audit) | `/data` |
//! | `SESSION_TTL_MS` | Lifetime of an access session | `3600000` |
//! | `SESSION_REFRESH_THRESHOLD_MS` | Remaining TTL below which the sweep refreshes | `300000` |
//! | `SESSION_SWEEP_INTERVAL_MS` | Period of the background session sweep | `30000` |
//! | `SESSION_REFRESH_TIMEOUT_MS` | Upper bound for each session refresh during a sweep | `5000` |
//! | `LEDGER_TIMEOUT_MS` | Upper bound for each ledger call during evaluation | `5000` |
//! | `MAX_PAYLOAD_BYTES` | Largest payload accepted for encryption | `104857600` |
//! | `ATTESTATION_CACHE_SIZE` | Entries in the attestation verdict cache | `1024` |
//! | `WRAPPING_KEY` | Base64 32-byte content-key wrapping key | Generated per process |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::storage::paths::DATA_ROOT;
use crate::telemetry::LogFormat;

/// Environment variable name for the sealed data directory path.
///
/// # Default
/// `/data` (mounted as an encrypted filesystem inside the enclave)
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_MS";
pub const SESSION_REFRESH_THRESHOLD_ENV: &str = "SESSION_REFRESH_THRESHOLD_MS";
pub const SESSION_SWEEP_INTERVAL_ENV: &str = "SESSION_SWEEP_INTERVAL_MS";
pub const SESSION_REFRESH_TIMEOUT_ENV: &str = "SESSION_REFRESH_TIMEOUT_MS";
pub const LEDGER_TIMEOUT_ENV: &str = "LEDGER_TIMEOUT_MS";
pub const MAX_PAYLOAD_BYTES_ENV: &str = "MAX_PAYLOAD_BYTES";
pub const ATTESTATION_CACHE_SIZE_ENV: &str = "ATTESTATION_CACHE_SIZE";
/// Base64-encoded 32-byte key used to wrap content keys.
///
/// When unset, a fresh key is generated per process and previously wrapped
/// keys become unrecoverable after a restart.
pub const WRAPPING_KEY_ENV: &str = "WRAPPING_KEY";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_SESSION_TTL_MS: u64 = 3_600_000;
pub const DEFAULT_SESSION_REFRESH_THRESHOLD_MS: u64 = 300_000;
pub const DEFAULT_SESSION_SWEEP_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_SESSION_REFRESH_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_LEDGER_TIMEOUT_MS: u64 = 5_000;
/// 100 MiB
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_ATTESTATION_CACHE_SIZE: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("refresh threshold ({threshold_ms}ms) must be smaller than session TTL ({ttl_ms}ms)")]
    ThresholdNotBelowTtl { threshold_ms: u64, ttl_ms: u64 },

    #[error("WRAPPING_KEY must be base64 encoding of exactly 32 bytes")]
    InvalidWrappingKey,

    #[error("LOG_FORMAT must be `json` or `pretty`, got {0:?}")]
    InvalidLogFormat(String),
}

/// Session lifecycle timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub ttl_ms: u64,
    pub refresh_threshold_ms: u64,
    pub sweep_interval: Duration,
    /// A refresh that does not finish in time counts as failed.
    pub refresh_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_SESSION_TTL_MS,
            refresh_threshold_ms: DEFAULT_SESSION_REFRESH_THRESHOLD_MS,
            sweep_interval: Duration::from_millis(DEFAULT_SESSION_SWEEP_INTERVAL_MS),
            refresh_timeout: Duration::from_millis(DEFAULT_SESSION_REFRESH_TIMEOUT_MS),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_threshold_ms >= self.ttl_ms {
            return Err(ConfigError::ThresholdNotBelowTtl {
                threshold_ms: self.refresh_threshold_ms,
                ttl_ms: self.ttl_ms,
            });
        }
        Ok(())
    }
}

/// Complete configuration for an [`AccessCore`](crate::state::AccessCore).
#[derive(Clone)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub session: SessionConfig,
    pub ledger_timeout: Duration,
    pub max_payload_bytes: usize,
    pub attestation_cache_size: usize,
    /// Raw wrapping key, if one was configured.
    pub wrapping_key: Option<[u8; 32]>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("session", &self.session)
            .field("ledger_timeout", &self.ledger_timeout)
            .field("max_payload_bytes", &self.max_payload_bytes)
            .field("attestation_cache_size", &self.attestation_cache_size)
            .field("wrapping_key", &self.wrapping_key.map(|_| "<redacted>"))
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_ROOT),
            session: SessionConfig::default(),
            ledger_timeout: Duration::from_millis(DEFAULT_LEDGER_TIMEOUT_MS),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            attestation_cache_size: DEFAULT_ATTESTATION_CACHE_SIZE,
            wrapping_key: None,
            log_format: LogFormat::Pretty,
        }
    }
}

impl CoreConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let session = SessionConfig {
            ttl_ms: parse_u64(&lookup, SESSION_TTL_ENV, DEFAULT_SESSION_TTL_MS)?,
            refresh_threshold_ms: parse_u64(
                &lookup,
                SESSION_REFRESH_THRESHOLD_ENV,
                DEFAULT_SESSION_REFRESH_THRESHOLD_MS,
            )?,
            sweep_interval: Duration::from_millis(parse_u64(
                &lookup,
                SESSION_SWEEP_INTERVAL_ENV,
                DEFAULT_SESSION_SWEEP_INTERVAL_MS,
            )?),
            refresh_timeout: Duration::from_millis(parse_u64(
                &lookup,
                SESSION_REFRESH_TIMEOUT_ENV,
                DEFAULT_SESSION_REFRESH_TIMEOUT_MS,
            )?),
        };
        session.validate()?;

        let ledger_timeout = Duration::from_millis(parse_u64(
            &lookup,
            LEDGER_TIMEOUT_ENV,
            DEFAULT_LEDGER_TIMEOUT_MS,
        )?);
        let max_payload_bytes =
            parse_u64(&lookup, MAX_PAYLOAD_BYTES_ENV, DEFAULT_MAX_PAYLOAD_BYTES as u64)? as usize;
        let attestation_cache_size = parse_u64(
            &lookup,
            ATTESTATION_CACHE_SIZE_ENV,
            DEFAULT_ATTESTATION_CACHE_SIZE as u64,
        )? as usize;

        let wrapping_key = match lookup(WRAPPING_KEY_ENV) {
            Some(encoded) => Some(decode_wrapping_key(&encoded)?),
            None => None,
        };

        let log_format = match lookup(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidLogFormat(raw))?,
            None => LogFormat::Pretty,
        };

        Ok(Self {
            data_dir,
            session,
            ledger_timeout,
            max_payload_bytes,
            attestation_cache_size,
            wrapping_key,
            log_format,
        })
    }
}

fn parse_u64<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(parsed) if parsed > 0 => Ok(parsed),
            _ => Err(ConfigError::InvalidNumber { var, value }),
        },
    }
}

fn decode_wrapping_key(encoded: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = crate::encoding::decode_base64(encoded.trim())
        .map_err(|_| ConfigError::InvalidWrappingKey)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ConfigError::InvalidWrappingKey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = CoreConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.session.ttl_ms, 3_600_000);
        assert_eq!(config.session.refresh_threshold_ms, 300_000);
        assert_eq!(config.session.refresh_timeout, Duration::from_secs(5));
        assert_eq!(config.ledger_timeout, Duration::from_secs(5));
        assert_eq!(config.max_payload_bytes, 100 * 1024 * 1024);
        assert!(config.wrapping_key.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_parsed() {
        let key = crate::encoding::encode_base64(&[7u8; 32]);
        let config = CoreConfig::from_lookup(lookup_from(&[
            (DATA_DIR_ENV, "/tmp/sealed"),
            (SESSION_TTL_ENV, "60000"),
            (SESSION_REFRESH_THRESHOLD_ENV, "5000"),
            (LEDGER_TIMEOUT_ENV, "250"),
            (SESSION_REFRESH_TIMEOUT_ENV, "750"),
            (WRAPPING_KEY_ENV, key.as_str()),
            (LOG_FORMAT_ENV, "json"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/sealed"));
        assert_eq!(config.session.ttl_ms, 60_000);
        assert_eq!(config.ledger_timeout, Duration::from_millis(250));
        assert_eq!(config.session.refresh_timeout, Duration::from_millis(750));
        assert_eq!(config.wrapping_key, Some([7u8; 32]));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn rejects_threshold_at_or_above_ttl() {
        let result = CoreConfig::from_lookup(lookup_from(&[
            (SESSION_TTL_ENV, "1000"),
            (SESSION_REFRESH_THRESHOLD_ENV, "1000"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::ThresholdNotBelowTtl { .. })
        ));
    }

    #[test]
    fn rejects_garbage_numbers_and_keys() {
        assert!(matches!(
            CoreConfig::from_lookup(lookup_from(&[(LEDGER_TIMEOUT_ENV, "soon")])),
            Err(ConfigError::InvalidNumber { var: LEDGER_TIMEOUT_ENV, .. })
        ));
        assert!(matches!(
            CoreConfig::from_lookup(lookup_from(&[(MAX_PAYLOAD_BYTES_ENV, "0")])),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert_eq!(
            CoreConfig::from_lookup(lookup_from(&[(WRAPPING_KEY_ENV, "c2hvcnQ=")])).err(),
            Some(ConfigError::InvalidWrappingKey)
        );
    }

    #[test]
    fn debug_redacts_wrapping_key() {
        let config = CoreConfig {
            wrapping_key: Some([9u8; 32]),
            ..CoreConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("9, 9"));
    }
}
