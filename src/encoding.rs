// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Base64 helpers for byte fields persisted as JSON.

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Deserializer, Serializer};

pub fn encode_base64(bytes: &[u8]) -> String {
    Base64::encode_string(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64ct::Error> {
    Base64::decode_vec(encoded)
}

/// `#[serde(with = "crate::encoding::base64_bytes")]` for `Vec<u8>` fields.
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&encode_base64(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        decode_base64(&encoded).map_err(serde::de::Error::custom)
    }
}
