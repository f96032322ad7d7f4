// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access requests, decisions, and the protocol that produces them.

pub mod decision;
pub mod protocol;

pub use decision::{AccessDecision, AccessRequest, DecisionReason, Grant};
pub use protocol::AccessDecisionProtocol;

#[cfg(test)]
pub(crate) mod testing;
