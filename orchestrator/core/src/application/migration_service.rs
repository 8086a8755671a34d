// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Migration Orchestrator Application Service
//!
//! Drives one migration run:
//! - validates the roots and builds the path mapping
//! - drains the enumeration into a bounded queue on a producer task
//! - fans the queue out to `workers` consumer tasks
//! - aggregates outcomes through `MigrationReporter`
//!
//! Per item the state machine is
//! `Pending → (Skipped | InProgress → (Succeeded | Failed))`, and every
//! terminal state produces exactly one state store write and one reported
//! outcome. Per-item errors never escape a worker.

use crate::application::reporting::{MigrationReporter, RunSummary};
use crate::domain::config::MigrationConfig;
use crate::domain::errors::MigrationError;
use crate::domain::events::{MigrationEvent, RunOutcome};
use crate::domain::filesystem::{AclFilesystem, WorkItemStream};
use crate::domain::migration::{
    Fingerprint, ItemType, MigrationRecord, MigrationStatus, RunId, WorkItem,
};
use crate::domain::path_mapping::PathMapper;
use crate::domain::repository::MigrationStateRepository;
use crate::domain::translator::translate;
use crate::infrastructure::event_bus::EventBus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Queue slots per worker between the producer and the pool
const QUEUE_DEPTH_PER_WORKER: usize = 64;

/// Result of one completed (or interrupted) run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait MigrationService: Send + Sync {
    /// Migrate every item below `source_root` onto `dest_root`.
    ///
    /// Returns `Err` only for run-level failures detected before any item is
    /// touched (shape mismatch, missing roots, invalid configuration).
    async fn run(
        &self,
        source_root: &Path,
        dest_root: &Path,
        cancel: CancellationToken,
    ) -> Result<RunReport, MigrationError>;
}

pub struct StandardMigrationService {
    filesystem: Arc<dyn AclFilesystem>,
    repository: Arc<dyn MigrationStateRepository>,
    event_bus: Arc<EventBus>,
    config: MigrationConfig,
}

impl StandardMigrationService {
    pub fn new(
        filesystem: Arc<dyn AclFilesystem>,
        repository: Arc<dyn MigrationStateRepository>,
        event_bus: Arc<EventBus>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            filesystem,
            repository,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Validate the roots after resolving them to canonical paths
    async fn build_mapper(
        &self,
        source_root: &Path,
        dest_root: &Path,
    ) -> Result<PathMapper, MigrationError> {
        let missing_source = || MigrationError::UnreadableSource {
            path: source_root.to_path_buf(),
            reason: "source root does not exist".to_string(),
        };

        let source_root = self
            .filesystem
            .canonicalize(source_root)
            .await?
            .ok_or_else(missing_source)?;
        let source_type = self
            .filesystem
            .item_type(&source_root)
            .await?
            .ok_or_else(missing_source)?;

        // a missing destination keeps its spelling for the error report
        let dest_root = self
            .filesystem
            .canonicalize(dest_root)
            .await?
            .unwrap_or_else(|| dest_root.to_path_buf());
        let dest_type = self.filesystem.item_type(&dest_root).await?;

        debug!(
            source = %source_root.display(),
            dest = %dest_root.display(),
            "Resolved migration roots"
        );
        PathMapper::new(source_root, dest_root, source_type, dest_type)
    }
}

#[async_trait]
impl MigrationService for StandardMigrationService {
    async fn run(
        &self,
        source_root: &Path,
        dest_root: &Path,
        cancel: CancellationToken,
    ) -> Result<RunReport, MigrationError> {
        self.config
            .validate()
            .map_err(|e| MigrationError::Configuration(e.to_string()))?;

        let mapper = self.build_mapper(source_root, dest_root).await?;

        let run_id = RunId::new();
        let started_at = Utc::now();
        let reporter = Arc::new(MigrationReporter::new(run_id, self.event_bus.clone()));
        let workers = self.config.workers;

        info!(
            %run_id,
            source = %mapper.source_root().display(),
            dest = %mapper.dest_root().display(),
            workers,
            incremental = self.config.incremental,
            ownership = self.config.ownership,
            folder_only = self.config.folder_only,
            domain = %self.config.domain,
            "Starting migration run"
        );
        self.event_bus.publish(MigrationEvent::RunStarted {
            run_id,
            source_root: mapper.source_root().to_path_buf(),
            dest_root: mapper.dest_root().to_path_buf(),
            workers,
            started_at,
        });

        let stream = self.filesystem.enumerate(mapper, self.config.folder_only);
        let (tx, rx) = mpsc::channel(workers * QUEUE_DEPTH_PER_WORKER);
        let rx = Arc::new(Mutex::new(rx));

        let producer = tokio::spawn(
            produce(stream, tx, reporter.clone(), cancel.clone())
                .instrument(tracing::debug_span!("enumerate", %run_id)),
        );

        let processor = Arc::new(ItemProcessor {
            filesystem: self.filesystem.clone(),
            repository: self.repository.clone(),
            reporter: reporter.clone(),
            config: self.config.clone(),
            profile: self.config.output_profile(),
        });

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let processor = processor.clone();
            let rx = rx.clone();
            let cancel = cancel.clone();
            let span = tracing::debug_span!("worker", %run_id, worker_id);
            pool.spawn(consume(processor, rx, cancel).instrument(span));
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(%run_id, error = %e, "Migration worker terminated abnormally");
            }
        }
        if let Err(e) = producer.await {
            error!(%run_id, error = %e, "Enumeration task terminated abnormally");
        }

        let summary = reporter.snapshot();
        let outcome = if cancel.is_cancelled() {
            RunOutcome::Interrupted
        } else if summary.failed > 0 {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::Completed
        };
        let finished_at = Utc::now();

        info!(
            %run_id,
            %outcome,
            enumerated = summary.enumerated,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Migration run finished"
        );
        self.event_bus.publish(MigrationEvent::RunFinished {
            run_id,
            outcome,
            succeeded: summary.succeeded,
            failed: summary.failed,
            skipped: summary.skipped,
            finished_at,
        });

        Ok(RunReport {
            run_id,
            outcome,
            summary,
            started_at,
            finished_at,
        })
    }
}

/// Drain the enumeration into the work queue until exhausted or cancelled
async fn produce(
    mut stream: WorkItemStream,
    tx: mpsc::Sender<WorkItem>,
    reporter: Arc<MigrationReporter>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = stream.next() => next,
        };

        match next {
            None => break,
            Some(Ok(item)) => {
                reporter.item_enumerated();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = tx.send(item) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Failed to enumerate entry, continuing walk");
                reporter.enumeration_failed(&e);
            }
        }
    }
    debug!("Enumeration finished");
}

/// Pull items off the shared queue until it closes or the run is cancelled.
/// An item already dequeued always runs to completion.
async fn consume(
    processor: Arc<ItemProcessor>,
    rx: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    cancel: CancellationToken,
) {
    loop {
        let item = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = rx.recv() => item,
            }
        };

        match item {
            Some(item) => processor.process(item).await,
            None => break,
        }
    }
}

struct ItemProcessor {
    filesystem: Arc<dyn AclFilesystem>,
    repository: Arc<dyn MigrationStateRepository>,
    reporter: Arc<MigrationReporter>,
    config: MigrationConfig,
    profile: String,
}

/// How far an item got before failing
struct ItemFailure {
    error: MigrationError,
    fingerprint: Fingerprint,
}

impl ItemProcessor {
    async fn process(&self, item: WorkItem) {
        let (status, record, error) = match self.migrate(&item).await {
            Ok((status, fingerprint)) => {
                let source = item.source_path.clone();
                let record = match status {
                    MigrationStatus::Skipped => MigrationRecord::skipped(source, fingerprint),
                    _ => MigrationRecord::succeeded(source, fingerprint),
                };
                (status, record, None)
            }
            Err(failure) => {
                let record = MigrationRecord::failed(
                    item.source_path.clone(),
                    failure.fingerprint,
                    &failure.error,
                );
                (MigrationStatus::Failed, record, Some(failure.error))
            }
        };

        if let Err(e) = self.repository.record(&item.dest_path, &record).await {
            let error = MigrationError::Repository(e);
            error!(
                source = %item.source_path.display(),
                dest = %item.dest_path.display(),
                error = %error,
                "Failed to record migration outcome"
            );
            self.reporter.item_completed(&item, MigrationStatus::Failed, Some(&error));
            return;
        }

        match &error {
            Some(e) => warn!(
                source = %item.source_path.display(),
                dest = %item.dest_path.display(),
                kind = e.kind(),
                error = %e,
                "Item migration failed"
            ),
            None => debug!(
                source = %item.source_path.display(),
                dest = %item.dest_path.display(),
                %status,
                "Item migrated"
            ),
        }
        self.reporter.item_completed(&item, status, error.as_ref());
    }

    async fn migrate(
        &self,
        item: &WorkItem,
    ) -> Result<(MigrationStatus, Fingerprint), ItemFailure> {
        let snapshot = self
            .filesystem
            .read_posix_acl(&item.source_path)
            .await
            .map_err(|error| ItemFailure {
                error,
                fingerprint: Fingerprint::empty(),
            })?;
        let fingerprint = Fingerprint::compute(&snapshot, &self.profile);

        if self.config.incremental && self.already_migrated(&item.dest_path, &fingerprint).await {
            return Ok((MigrationStatus::Skipped, fingerprint));
        }

        let fail = |error: MigrationError| ItemFailure {
            error,
            fingerprint: fingerprint.clone(),
        };

        let is_directory = snapshot.item_type == ItemType::Directory;
        let aces = translate(&snapshot.entries, is_directory, &self.config.domain).map_err(fail)?;

        self.filesystem
            .apply_nfs_acl(&item.dest_path, &aces)
            .await
            .map_err(fail)?;

        if self.config.ownership {
            let ownership = if self.config.qualify_ownership {
                snapshot.ownership.with_domain(&self.config.domain)
            } else {
                snapshot.ownership.clone()
            };
            self.filesystem
                .apply_ownership(&item.dest_path, &ownership)
                .await
                .map_err(fail)?;
        }

        Ok((MigrationStatus::Success, fingerprint))
    }

    /// A lookup failure only costs a redundant (idempotent) apply
    async fn already_migrated(&self, dest_path: &Path, fingerprint: &Fingerprint) -> bool {
        match self.repository.lookup(dest_path).await {
            Ok(Some(record)) => record.permits_skip(fingerprint),
            Ok(None) => false,
            Err(e) => {
                warn!(
                    dest = %dest_path.display(),
                    error = %e,
                    "State lookup failed, reprocessing item"
                );
                false
            }
        }
    }
}
