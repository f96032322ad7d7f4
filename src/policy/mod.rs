// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization policies.
//!
//! - `rules` - policy kinds and the validated rule union
//! - `engine` - policy construction and the registry cache

pub mod engine;
pub mod rules;

pub use engine::PolicyEngine;
pub use rules::{
    AllowlistRule, AttestationRule, OwnershipRule, PaymentRule, Policy, PolicyKind, PolicyParams,
    PolicyRule, RuleParams, SubscriptionRule, TimeLockRule,
};
