// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run Reporting
//!
//! Thread-safe aggregation of per-item outcomes for one run. Counters are
//! atomics; the failure list sits behind a mutex. Every outcome is also
//! published on the `EventBus` so progress printers can follow along.

use crate::domain::errors::MigrationError;
use crate::domain::events::MigrationEvent;
use crate::domain::migration::{MigrationStatus, RunId, WorkItem};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

const PROGRESS_INTERVAL: u64 = 1000;

/// One failed item as reported at the end of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub source_path: PathBuf,
    /// `None` when the failure happened before a destination was known
    pub dest_path: Option<PathBuf>,
    pub error_kind: String,
    pub error_detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub enumerated: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failures: Vec<FailedItem>,
}

impl RunSummary {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.skipped
    }
}

pub struct MigrationReporter {
    run_id: RunId,
    enumerated: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    failures: Mutex<Vec<FailedItem>>,
    event_bus: Arc<EventBus>,
}

impl MigrationReporter {
    pub fn new(run_id: RunId, event_bus: Arc<EventBus>) -> Self {
        Self {
            run_id,
            enumerated: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failures: Mutex::new(Vec::new()),
            event_bus,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn item_enumerated(&self) {
        self.enumerated.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one terminal item outcome. `error` is required for failures.
    pub fn item_completed(
        &self,
        item: &WorkItem,
        status: MigrationStatus,
        error: Option<&MigrationError>,
    ) {
        match status {
            MigrationStatus::Success => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            MigrationStatus::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            MigrationStatus::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.failures.lock().push(FailedItem {
                    source_path: item.source_path.clone(),
                    dest_path: Some(item.dest_path.clone()),
                    error_kind: error.map_or("unknown", MigrationError::kind).to_string(),
                    error_detail: error.map(ToString::to_string).unwrap_or_default(),
                });
            }
        }

        self.event_bus.publish(MigrationEvent::ItemCompleted {
            run_id: self.run_id,
            source_path: item.source_path.clone(),
            dest_path: item.dest_path.clone(),
            status,
            error_kind: error.map(|e| e.kind().to_string()),
            completed_at: Utc::now(),
        });

        self.log_progress();
    }

    /// A path that could not even be enumerated
    pub fn enumeration_failed(&self, error: &MigrationError) {
        let source_path = match error {
            MigrationError::UnreadableSource { path, .. } => path.clone(),
            _ => PathBuf::new(),
        };
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failures.lock().push(FailedItem {
            source_path,
            dest_path: None,
            error_kind: error.kind().to_string(),
            error_detail: error.to_string(),
        });
    }

    fn log_progress(&self) {
        let done = self.succeeded.load(Ordering::Relaxed)
            + self.failed.load(Ordering::Relaxed)
            + self.skipped.load(Ordering::Relaxed);
        if done % PROGRESS_INTERVAL == 0 {
            info!(
                run_id = %self.run_id,
                completed = done,
                enumerated = self.enumerated.load(Ordering::Relaxed),
                failed = self.failed.load(Ordering::Relaxed),
                "Migration progress"
            );
        }
    }

    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            enumerated: self.enumerated.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            failures: self.failures.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::migration::ItemType;

    fn item(name: &str) -> WorkItem {
        WorkItem {
            source_path: PathBuf::from("/src").join(name),
            dest_path: PathBuf::from("/dst").join(name),
            item_type: ItemType::File,
        }
    }

    #[tokio::test]
    async fn test_counters_and_events() {
        let bus = Arc::new(EventBus::new(16));
        let run_id = RunId::new();
        let mut events = bus.subscribe_run(run_id);
        let reporter = MigrationReporter::new(run_id, bus);

        reporter.item_enumerated();
        reporter.item_enumerated();
        reporter.item_completed(&item("a"), MigrationStatus::Success, None);
        let error = MigrationError::UnwritableDest {
            path: PathBuf::from("/dst/b"),
            reason: "Permission denied".to_string(),
        };
        reporter.item_completed(&item("b"), MigrationStatus::Failed, Some(&error));

        let summary = reporter.snapshot();
        assert_eq!(summary.enumerated, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.failures[0].error_kind, "unwritable_dest");
        assert_eq!(summary.failures[0].dest_path, Some(PathBuf::from("/dst/b")));

        assert!(matches!(
            events.recv().await.unwrap(),
            MigrationEvent::ItemCompleted { status: MigrationStatus::Success, .. }
        ));
        match events.recv().await.unwrap() {
            MigrationEvent::ItemCompleted { error_kind, .. } => {
                assert_eq!(error_kind.as_deref(), Some("unwritable_dest"))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_concurrent_updates() {
        let reporter = Arc::new(MigrationReporter::new(RunId::new(), Arc::new(EventBus::new(4))));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reporter = reporter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        reporter.item_completed(&item("x"), MigrationStatus::Skipped, None);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(reporter.snapshot().skipped, 800);
    }
}
