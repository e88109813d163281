//! Pipeline orchestrator - main driver of a masking run
//!
//! Walks the source collection in identifier order, masks each batch, writes
//! it to the destination and advances the checkpoint, adapting the batch size
//! to host load between batches.

use crate::adapters::database::traits::{CollectionQuery, StoredRecord};
use crate::adapters::database::{create_run_stores, RunStores};
use crate::config::PhimaskConfig;
use crate::core::pipeline::batch::BatchMasker;
use crate::core::pipeline::retry::RetryPolicy;
use crate::core::pipeline::summary::{PipelineState, RunError, RunErrorType, RunSummary};
use crate::core::resources::{BatchContext, ResourceMonitor, SysinfoSampler};
use crate::core::state::{Checkpoint, StateManager};
use crate::core::verification::Verifier;
use crate::domain::document::MASK_MARKER_FIELD;
use crate::domain::ids::{DocumentId, RunId};
use crate::domain::{PhimaskError, Result};
use crate::masking::audit::{AuditLogger, AuditRecord};
use crate::masking::masker::DocumentMasker;
use crate::masking::rules::RuleSet;
use crate::{log_batch_committed, log_error_with_context, log_run_start};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Which source documents a run considers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    /// Every document matching the filter
    #[default]
    Full,
    /// Only documents whose id is not yet in the destination
    Incremental,
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "full" => Ok(PipelineMode::Full),
            "incremental" => Ok(PipelineMode::Incremental),
            other => Err(format!(
                "Invalid pipeline mode '{other}'. Must be 'full' or 'incremental'"
            )),
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMode::Full => write!(f, "full"),
            PipelineMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Per-run switches, defaulted from configuration and overridable by the CLI
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub mode: PipelineMode,
    pub dry_run: bool,
    pub resume: bool,
    pub workers: usize,
    pub verify_after: bool,
    pub filter: Option<Value>,
}

impl RunOptions {
    /// Options as configured, without resume
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::Configuration` for an unknown pipeline mode.
    pub fn from_config(config: &PhimaskConfig) -> Result<Self> {
        let mode = config
            .pipeline
            .mode
            .parse::<PipelineMode>()
            .map_err(PhimaskError::Configuration)?;

        Ok(Self {
            mode,
            dry_run: config.application.dry_run,
            resume: false,
            workers: config.pipeline.workers,
            verify_after: config.pipeline.verify_after,
            filter: config.pipeline.filter.clone(),
        })
    }
}

/// Result of a run: the summary is always present, the error only on failure
#[derive(Debug)]
pub struct OrchestratorOutcome {
    /// Counts and resume point of the run
    pub summary: RunSummary,
    /// Error that stopped the run
    pub error: Option<PhimaskError>,
}

impl OrchestratorOutcome {
    /// Whether the run reached `Completed`
    pub fn is_completed(&self) -> bool {
        self.error.is_none() && self.summary.final_state == PipelineState::Completed
    }

    /// Convert into a plain result, dropping the summary on failure
    pub fn into_result(self) -> Result<RunSummary> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

/// Pipeline orchestrator
pub struct Orchestrator {
    config: PhimaskConfig,
    stores: RunStores,
    state_manager: StateManager,
    masker: Arc<DocumentMasker>,
    retry: RetryPolicy,
    options: RunOptions,
    monitor: Option<ResourceMonitor>,
    state: PipelineState,
}

impl Orchestrator {
    /// Create an orchestrator over existing stores
    ///
    /// # Errors
    ///
    /// Returns `PhimaskError::Configuration` if the rule set cannot be loaded
    /// or the configured mode is unknown.
    pub fn new(config: PhimaskConfig, stores: RunStores) -> Result<Self> {
        let rules = RuleSet::load(config.masking.rules_file.as_deref(), &config.masking.rules)?;
        tracing::info!(rules = rules.len(), "Rule set loaded");

        Ok(Self {
            options: RunOptions::from_config(&config)?,
            retry: RetryPolicy::from_config(&config.retry),
            state_manager: StateManager::new_with_storage(stores.checkpoints.clone()),
            masker: Arc::new(DocumentMasker::from_rules(rules)),
            monitor: None,
            state: PipelineState::Idle,
            stores,
            config,
        })
    }

    /// Create an orchestrator with PostgreSQL stores built from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the stores cannot be created or the rule set is
    /// invalid.
    pub async fn from_config(config: PhimaskConfig) -> Result<Self> {
        let stores = create_run_stores(&config).await?;
        Self::new(config, stores)
    }

    /// Replace the run options
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a prepared resource monitor instead of the configured one
    pub fn with_monitor(mut self, monitor: ResourceMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Current run options
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::info!(from = %self.state, to = %next, "Pipeline state transition");
        self.state = next;
    }

    /// Execute a masking run
    ///
    /// The shutdown receiver is checked between batches; the batch in flight
    /// is committed and checkpointed before the run stops.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use phimask::config::load_config;
    /// use phimask::core::pipeline::Orchestrator;
    /// use tokio::sync::watch;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let config = load_config("phimask.toml")?;
    /// let (_tx, shutdown) = watch::channel(false);
    /// let mut orchestrator = Orchestrator::from_config(config).await?;
    /// let outcome = orchestrator.run(shutdown).await;
    /// outcome.summary.log_summary();
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> OrchestratorOutcome {
        let start = Instant::now();
        let run_id = RunId::generate();
        let mut summary = RunSummary::new(run_id.clone(), self.options.dry_run);

        log_run_start!(
            run_id,
            self.stores.source.name(),
            self.stores.destination.name()
        );

        let result = self.execute(run_id, &mut summary, shutdown).await;

        let error = match result {
            Ok(()) => None,
            Err(e) => {
                log_error_with_context!(&e, "Masking run failed");
                summary.add_error(RunError::from(&e));
                self.transition(PipelineState::Failed);
                Some(e)
            }
        };

        summary.final_state = self.state;
        summary.elapsed = start.elapsed();
        summary.log_summary();

        OrchestratorOutcome { summary, error }
    }

    async fn execute(
        &mut self,
        run_id: RunId,
        summary: &mut RunSummary,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.transition(PipelineState::Counting);

        let key = self
            .config
            .checkpoint_key()
            .map_err(PhimaskError::Configuration)?;
        let source = self.stores.source.clone();
        let destination = self.stores.destination.clone();
        let dry_run = self.options.dry_run;

        if self.options.mode == PipelineMode::Incremental && self.config.in_place() {
            return Err(PhimaskError::Configuration(
                "incremental mode requires a destination collection".to_string(),
            ));
        }

        if dry_run {
            tracing::info!("Dry run mode enabled - no data will be written");
        } else {
            self.retry
                .run("ensure_collection", || destination.ensure_collection())
                .await?;
        }

        let resume = self.options.resume;
        let state_manager = &self.state_manager;
        let mut checkpoint = self
            .retry
            .run("load_checkpoint", || {
                state_manager.begin_run(
                    &key,
                    source.name(),
                    destination.name(),
                    run_id.clone(),
                    resume,
                )
            })
            .await?;
        summary.resume_point = checkpoint.last_processed_id.clone();

        if !dry_run {
            self.persist(&checkpoint).await?;
        }

        match self.process(&mut checkpoint, summary, shutdown).await {
            Ok(()) => {}
            Err(e) => {
                checkpoint.mark_failed();
                if !dry_run {
                    if let Err(save_error) = self.state_manager.save(&checkpoint).await {
                        tracing::warn!(
                            error = %save_error,
                            "Failed to record failed status on checkpoint"
                        );
                    }
                }
                return Err(e);
            }
        }

        if summary.interrupted {
            checkpoint.mark_interrupted();
            if !dry_run {
                self.persist(&checkpoint).await?;
            }
            tracing::warn!(
                last_processed_id = ?checkpoint.last_processed_id.as_ref().map(ToString::to_string),
                "Run interrupted by shutdown signal; resume with --resume"
            );
            return Ok(());
        }

        if self.options.verify_after {
            self.verify(summary).await;
        }

        checkpoint.mark_completed();
        if !dry_run {
            self.persist(&checkpoint).await?;
        }
        self.transition(PipelineState::Completed);
        Ok(())
    }

    async fn process(
        &mut self,
        checkpoint: &mut Checkpoint,
        summary: &mut RunSummary,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let base = CollectionQuery::filtered(self.options.filter.clone());
        let mut cursor = checkpoint.last_processed_id.clone();

        summary.total = self.count_eligible(&base.after(cursor.clone())).await?;
        tracing::info!(
            total = summary.total,
            mode = %self.options.mode,
            "Eligible documents counted"
        );

        self.transition(PipelineState::Processing);

        let monitor = match self.monitor.take() {
            Some(monitor) => monitor,
            None if self.config.resources.enabled => ResourceMonitor::spawn(
                SysinfoSampler::new(),
                &self.config.resources,
                shutdown.clone(),
            ),
            None => ResourceMonitor::disabled(),
        };

        let audit = if self.config.audit.enabled {
            let audit_config = &self.config.audit;
            Some(AuditLogger::spawn(audit_config.log_path.clone(), audit_config.json_format).await?)
        } else {
            None
        };

        let batch_masker = BatchMasker::new(
            self.masker.clone(),
            self.options.workers,
            self.config.in_place(),
        );
        let mut context = BatchContext::new(&self.config.batch);
        let mut batch_number = 0u64;

        let result = loop {
            if *shutdown.borrow() {
                tracing::info!(
                    batches = batch_number,
                    "Shutdown requested, stopping after committed batch"
                );
                summary.interrupted = true;
                break Ok(());
            }

            let limit = if batch_number == 0 {
                context.batch_size()
            } else {
                context.adjust(monitor.state())
            };

            let query = base.after(cursor.clone());
            let source = self.stores.source.clone();
            let records = match self
                .retry
                .run("read_range", || source.read_range(&query, limit))
                .await
            {
                Ok(records) => records,
                Err(e) => break Err(e),
            };
            let Some(last_id) = records.last().map(|r| r.id.clone()) else {
                break Ok(());
            };
            let exhausted = records.len() < limit;
            batch_number += 1;

            let committed = self
                .commit_batch(
                    &batch_masker,
                    batch_number,
                    records,
                    checkpoint,
                    summary,
                    &mut context,
                    audit.as_ref(),
                )
                .await;
            match committed {
                Ok(()) => {}
                Err(e) => break Err(e),
            }

            cursor = Some(last_id);
            if exhausted {
                break Ok(());
            }
        };

        monitor.stop().await;
        if let Some(audit) = audit {
            match audit.finish().await {
                Ok(records) => tracing::debug!(records, "Audit log closed"),
                Err(e) => tracing::warn!(error = %e, "Audit log did not flush cleanly"),
            }
        }

        result?;

        let seen = match self.options.mode {
            PipelineMode::Incremental => summary.processed.saturating_sub(summary.skipped_existing),
            PipelineMode::Full => summary.processed,
        };
        if !summary.interrupted {
            summary.not_found = summary.total.saturating_sub(seen);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit_batch(
        &self,
        batch_masker: &BatchMasker,
        batch_number: u64,
        records: Vec<StoredRecord>,
        checkpoint: &mut Checkpoint,
        summary: &mut RunSummary,
        context: &mut BatchContext,
        audit: Option<&AuditLogger>,
    ) -> Result<()> {
        let Some(last_id) = records.last().map(|r| r.id.clone()) else {
            return Ok(());
        };
        let read = records.len() as u64;
        context.set_in_flight(records.len());
        summary.processed += read;

        let pending = self.drop_already_masked(records, summary).await?;

        let first_id = pending.first().map(|r| r.id.clone());
        let batch = batch_masker.mask(pending).await?;

        summary.masked += batch.documents.len() as u64;
        summary.masked_fields += batch.masked_fields as u64;
        summary.skipped_with_error += batch.skipped.len() as u64;
        for skipped in &batch.skipped {
            summary.add_error(
                RunError::new(RunErrorType::MalformedDocument, skipped.reason.clone())
                    .with_context(format!("id={}", skipped.id)),
            );
        }

        let written = if self.options.dry_run || batch.documents.is_empty() {
            0
        } else {
            let destination = self.stores.destination.clone();
            let documents = &batch.documents;
            self.retry
                .run("upsert_many", || destination.upsert_many(documents))
                .await?
        };
        summary.written += written as u64;

        checkpoint.advance(last_id.clone(), read)?;
        if !self.options.dry_run {
            let state_manager = &self.state_manager;
            let saved: &Checkpoint = checkpoint;
            self.retry
                .run("save_checkpoint", || state_manager.checkpoint_batch(saved))
                .await?;
        }
        summary.batches += 1;
        summary.last_processed_id = Some(last_id.clone());

        if let Some(audit) = audit {
            let record = AuditRecord {
                timestamp: chrono::Utc::now(),
                run_id: checkpoint.run_id.clone(),
                batch: batch_number,
                first_id,
                last_id: Some(last_id),
                documents: batch.documents.len(),
                masked_fields: batch.masked_fields,
                rule_hits: batch.rule_hits,
                dry_run: self.options.dry_run,
            };
            if let Err(e) = audit.record(record).await {
                tracing::warn!(error = %e, batch = batch_number, "Failed to queue audit record");
            }
        }

        context.set_in_flight(0);
        log_batch_committed!(batch_number, written, summary.processed, summary.total);
        tracing::debug!(
            batch_size = context.batch_size(),
            resource_state = %context.resource_state(),
            "Batch context"
        );
        Ok(())
    }

    /// Remove records the destination already holds (incremental) or that
    /// carry the in-place marker
    async fn drop_already_masked(
        &self,
        records: Vec<StoredRecord>,
        summary: &mut RunSummary,
    ) -> Result<Vec<StoredRecord>> {
        let before = records.len();
        let pending: Vec<StoredRecord> = if self.options.mode == PipelineMode::Incremental {
            let ids: Vec<DocumentId> = records.iter().map(|r| r.id.clone()).collect();
            let destination = self.stores.destination.clone();
            let existing = self
                .retry
                .run("existing_ids", || destination.existing_ids(&ids))
                .await?;
            records
                .into_iter()
                .filter(|r| !existing.contains(&r.id))
                .collect()
        } else if self.config.in_place() {
            records.into_iter().filter(|r| !carries_marker(r)).collect()
        } else {
            records
        };

        let skipped = before - pending.len();
        if skipped > 0 {
            tracing::debug!(skipped, "Skipping documents already masked");
        }
        summary.skipped_existing += skipped as u64;
        Ok(pending)
    }

    /// Count documents the run will consider
    ///
    /// Incremental counting walks the source in id order and subtracts ids
    /// already present in the destination.
    async fn count_eligible(&self, query: &CollectionQuery) -> Result<u64> {
        let source = self.stores.source.clone();
        if self.options.mode == PipelineMode::Full {
            return self.retry.run("count", || source.count(query)).await;
        }

        let destination = self.stores.destination.clone();
        let page_size = self.config.batch.max_size.max(1);
        let mut page_query = query.clone();
        let mut eligible = 0u64;
        loop {
            let page = self
                .retry
                .run("read_range", || source.read_range(&page_query, page_size))
                .await?;
            let Some(last) = page.last().map(|r| r.id.clone()) else {
                break;
            };
            let ids: Vec<DocumentId> = page.iter().map(|r| r.id.clone()).collect();
            let existing = self
                .retry
                .run("existing_ids", || destination.existing_ids(&ids))
                .await?;
            eligible += (ids.len() - existing.len()) as u64;

            if page.len() < page_size {
                break;
            }
            page_query = page_query.after(Some(last));
        }
        Ok(eligible)
    }

    async fn verify(&mut self, summary: &mut RunSummary) {
        if self.options.dry_run {
            tracing::info!("Skipping verification in dry run mode");
            return;
        }
        if self.config.in_place() {
            tracing::warn!("Skipping verification: source and destination are the same collection");
            return;
        }

        self.transition(PipelineState::Verifying);
        let verifier = Verifier::new(
            self.stores.source.clone(),
            self.stores.destination.clone(),
            &self.config.verification,
        )
        .map(|v| {
            v.with_filter(self.options.filter.clone())
                .with_retry(self.retry.clone())
        });

        let report = match verifier {
            Ok(verifier) => verifier.verify(self.config.verification.sample_size).await,
            Err(e) => Err(e),
        };

        match report {
            Ok(report) => summary.set_verification_report(report),
            Err(e) => {
                log_error_with_context!(&e, "Verification could not run");
                summary.add_error(
                    RunError::new(RunErrorType::Verification, e.to_string())
                        .with_context("verify_after".to_string()),
                );
            }
        }
    }

    async fn persist(&self, checkpoint: &Checkpoint) -> Result<()> {
        let state_manager = &self.state_manager;
        self.retry
            .run("save_checkpoint", || state_manager.save(checkpoint))
            .await
    }
}

fn carries_marker(record: &StoredRecord) -> bool {
    matches!(record.raw.get(MASK_MARKER_FIELD), Some(Value::Bool(true)))
}
