// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::migration::{MigrationStatus, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Final disposition of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    CompletedWithFailures,
    Interrupted,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::CompletedWithFailures => "completed_with_failures",
            RunOutcome::Interrupted => "interrupted",
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Migration run lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MigrationEvent {
    RunStarted {
        run_id: RunId,
        source_root: PathBuf,
        dest_root: PathBuf,
        workers: usize,
        started_at: DateTime<Utc>,
    },
    ItemCompleted {
        run_id: RunId,
        source_path: PathBuf,
        dest_path: PathBuf,
        status: MigrationStatus,
        /// `kind()` of the error for failed items
        error_kind: Option<String>,
        completed_at: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        succeeded: u64,
        failed: u64,
        skipped: u64,
        finished_at: DateTime<Utc>,
    },
}

impl MigrationEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            MigrationEvent::RunStarted { run_id, .. }
            | MigrationEvent::ItemCompleted { run_id, .. }
            | MigrationEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}
