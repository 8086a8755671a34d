// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! ACL Migrator Core
//!
//! Translates POSIX ACLs into NFSv4 ACE lists and migrates them, together
//! with ownership, from a source tree onto a destination tree. Runs are
//! concurrent, incremental and resumable through a persisted state store.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, orchestration service and infrastructure adapters

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
