// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access sessions and their background sweep.

pub mod manager;
pub mod sweeper;

pub use manager::{AlwaysRefresh, Session, SessionManager, SessionRefresher, SweepReport};
pub use sweeper::SessionSweeper;
