// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! ACL model, translation rules, migration records and the ports the
//! application layer drives.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits, no I/O

pub mod acl;
pub mod config;
pub mod errors;
pub mod events;
pub mod filesystem;
pub mod migration;
pub mod ownership;
pub mod path_mapping;
pub mod repository;
pub mod translator;
