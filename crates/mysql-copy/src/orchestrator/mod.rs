//! Copy orchestrator - main workflow coordinator.
//!
//! A run goes through four phases:
//!
//! 1. resolve the worklist and introspect every table (nothing is written)
//! 2. per table, under `workers`: create the temp table and stream rows
//! 3. once every table has its data: swap all tables, then reattach
//!    constraints and triggers
//! 4. optionally copy functions, views and procedures

mod routines;
mod worklist;

pub use routines::{copy_routines, RoutineReport};
pub use worklist::{resolve, TableSelection};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{validate_copy, AliasMap, Config, CopyConfig};
use crate::core::schema::{RoutineKind, TableInfo};
use crate::core::traits::{InsertMode, SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, MysqlWriter, SessionSettings};
use crate::error::{CopyError, Result};
use crate::swap::{SwapProtocol, TableState, TableTask};
use crate::transfer::{ProgressTracker, TransferConfig, TransferEngine, TransferStats};

/// Copy orchestrator.
pub struct Orchestrator {
    copy: CopyConfig,
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    aliases: AliasMap,
    progress: Option<Arc<ProgressTracker>>,
}

/// Per-table line of a [`CopyResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub name: String,
    pub size_bytes: u64,
    pub rows_transferred: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_rows: Option<i64>,
    pub duration_seconds: f64,
}

/// Result of a copy run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyResult {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total tables processed.
    pub tables_total: usize,

    /// Total rows transferred.
    pub rows_transferred: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: i64,

    /// Tables in worklist order.
    pub tables: Vec<TableResult>,

    /// Finalize and routine failures that did not abort the run.
    pub warnings: Vec<String>,

    /// Functions, views and procedures created.
    pub routines_copied: usize,
}

impl CopyResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Connectivity of both sides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// A table that finished phase 2.
struct Loaded {
    index: usize,
    task: TableTask,
    stats: TransferStats,
}

impl Orchestrator {
    /// Validate `config` and open both connection pools.
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;
        let copy = config.copy.clone();
        let max_conns = copy.get_max_connections();

        let source = MysqlReader::new(
            &config.source,
            &SessionSettings::for_source(&config.source, &copy),
            max_conns,
        )
        .await?;
        let target = MysqlWriter::new(
            &config.target,
            &SessionSettings::for_destination(&config.target, &copy),
            max_conns,
            copy.get_max_statement_bytes(),
        )
        .await?;

        Ok(Self::with_backends(copy, Arc::new(source), Arc::new(target)))
    }

    /// Build an orchestrator over already constructed backends.
    pub fn with_backends(
        copy: CopyConfig,
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
    ) -> Self {
        Self {
            copy,
            source,
            target,
            aliases: AliasMap::default(),
            progress: None,
        }
    }

    /// Use `aliases` when resolving table selections.
    pub fn with_aliases(mut self, aliases: AliasMap) -> Self {
        self.aliases = aliases;
        self
    }

    /// Report row counts to a shared tracker.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Resolve `selection` against the source catalog without copying.
    pub async fn plan(&self, selection: &TableSelection) -> Result<Vec<TableInfo>> {
        let catalog = self.source.list_tables().await?;
        resolve(&catalog, selection, &self.aliases)
    }

    /// Run the copy.
    pub async fn run(
        &self,
        selection: &TableSelection,
        cancel: CancellationToken,
    ) -> Result<CopyResult> {
        validate_copy(&self.copy)?;

        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let mode = if self.copy.insert_ignore {
            InsertMode::InsertIgnore
        } else {
            InsertMode::Insert
        };
        let protocol = SwapProtocol::new(self.copy.dry_run);

        info!("Starting copy run: {}", run_id);
        if self.copy.dry_run {
            info!("Dry run: no changes will be made to the destination");
        }

        // Phase 1: Resolve and introspect
        info!("Phase 1: Resolving tables and reading columns");
        let worklist = self.plan(selection).await?;
        let tasks = self.introspect(&worklist).await?;
        info!("{} table(s) to copy", tasks.len());

        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        // Phase 2: Build temp tables and load data
        info!("Phase 2: Copying data (mode: {:?})", mode);
        let mut loaded = self.load_tables(tasks, mode, protocol, &cancel).await?;
        loaded.sort_by_key(|l| l.index);

        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        let (tasks, stats): (Vec<TableTask>, Vec<TransferStats>) =
            loaded.into_iter().map(|l| (l.task, l.stats)).unzip();

        // Phase 3: Swap, then constraints and triggers
        let mut warnings = Vec::new();
        let tasks = if mode == InsertMode::Insert {
            info!("Phase 3: Finalizing {} table(s)", tasks.len());
            self.finalize(tasks, protocol, &mut warnings).await?
        } else {
            tasks
        };

        // Phase 4: Routines
        let mut routines_copied = 0;
        let kinds = [
            (self.copy.copy_functions, RoutineKind::Function),
            (self.copy.copy_views, RoutineKind::View),
            (self.copy.copy_procedures, RoutineKind::Procedure),
        ];
        if kinds.iter().any(|(enabled, _)| *enabled) {
            info!("Phase 4: Copying routines");
            for (_, kind) in kinds.iter().filter(|(enabled, _)| *enabled) {
                let report =
                    copy_routines(self.source.as_ref(), self.target.as_ref(), &protocol, *kind)
                        .await;
                routines_copied += report.copied;
                warnings.extend(report.warnings);
            }
        }

        let tables: Vec<TableResult> = tasks
            .iter()
            .zip(&stats)
            .map(|(task, stats)| TableResult {
                name: task.name().to_string(),
                size_bytes: task.size_bytes(),
                rows_transferred: stats.rows_read,
                expected_rows: stats.expected_rows,
                duration_seconds: stats.elapsed.as_secs_f64(),
            })
            .collect();

        let rows_transferred: u64 = tables.iter().map(|t| t.rows_transferred).sum();
        let duration = start.elapsed().as_secs_f64();
        let rows_per_second = if duration > 0.0 {
            (rows_transferred as f64 / duration) as i64
        } else {
            0
        };
        let status = if warnings.is_empty() {
            "completed"
        } else {
            "completed_with_warnings"
        };

        info!(
            "Copy run {} {}: {} table(s), {} rows in {:.1}s",
            run_id,
            status,
            tables.len(),
            rows_transferred,
            duration
        );

        Ok(CopyResult {
            run_id,
            status: status.to_string(),
            duration_seconds: duration,
            started_at,
            completed_at: Utc::now(),
            tables_total: tables.len(),
            rows_transferred,
            rows_per_second,
            tables,
            warnings,
            routines_copied,
        })
    }

    /// Read columns for every table, keeping worklist order.
    ///
    /// Unsupported column types and over-long temp names fail here, before
    /// anything touches the destination. Insert-ignore runs get no temp name.
    async fn introspect(&self, worklist: &[TableInfo]) -> Result<Vec<TableTask>> {
        let source = self.source.as_ref();
        let prefix = if self.copy.insert_ignore {
            None
        } else {
            Some(self.copy.temp_table_prefix.as_str())
        };

        stream::iter(worklist)
            .map(|info| async move {
                let columns = source.table_columns(&info.name).await?;
                debug!("{}: {} column(s)", info.name, columns.len());
                TableTask::new(info, columns, prefix)
            })
            .buffered(self.copy.get_workers())
            .try_collect()
            .await
    }

    /// Run phase 2 for every task under the worker cap.
    ///
    /// The first failure cancels the rest of the phase.
    async fn load_tables(
        &self,
        tasks: Vec<TableTask>,
        mode: InsertMode,
        protocol: SwapProtocol,
        cancel: &CancellationToken,
    ) -> Result<Vec<Loaded>> {
        let workers = self.copy.get_workers();
        let semaphore = Arc::new(Semaphore::new(workers));
        let phase_cancel = cancel.child_token();

        let mut engine = TransferEngine::new(
            self.source.clone(),
            self.target.clone(),
            TransferConfig {
                row_buffer: self.copy.get_row_buffer(),
                batch_rows: self.copy.get_batch_rows(),
                count_rows: !self.copy.skip_count,
            },
        );
        if let Some(progress) = &self.progress {
            engine = engine.with_progress(progress.clone());
        }
        let engine = Arc::new(engine);
        let transfer_rows = !self.copy.skip_data && !self.copy.dry_run;

        let mut set = JoinSet::new();
        for (index, task) in tasks.into_iter().enumerate() {
            let permit = tokio::select! {
                _ = phase_cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => permit
                    .map_err(|e| CopyError::transfer(task.name(), format!("worker pool closed: {}", e)))?,
            };

            let source = self.source.clone();
            let target = self.target.clone();
            let engine = engine.clone();
            let phase_cancel = phase_cancel.clone();

            set.spawn(async move {
                let _permit = permit;
                let name = task.name().to_string();
                let result = load_table(
                    source.as_ref(),
                    target.as_ref(),
                    &engine,
                    protocol,
                    task,
                    mode,
                    transfer_rows,
                    &phase_cancel,
                )
                .await;
                match result {
                    Ok((task, stats)) => Ok(Loaded { index, task, stats }),
                    Err(e) => {
                        if !matches!(e, CopyError::Cancelled) {
                            error!("{}: failed - {}", name, e);
                        }
                        phase_cancel.cancel();
                        Err(e)
                    }
                }
            });
        }

        let mut loaded = Vec::new();
        let mut first_error: Option<CopyError> = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.unwrap_or_else(|e| {
                phase_cancel.cancel();
                Err(CopyError::transfer("<task>", format!("task panicked: {}", e)))
            });
            match result {
                Ok(l) => loaded.push(l),
                // Keep the root cause, not the cancellations it triggered.
                Err(CopyError::Cancelled) if first_error.is_some() => {}
                Err(e) => {
                    if matches!(first_error, None | Some(CopyError::Cancelled)) {
                        first_error = Some(e);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(loaded),
        }
    }

    /// Swap every table, then reattach constraints and triggers on every table.
    async fn finalize(
        &self,
        tasks: Vec<TableTask>,
        protocol: SwapProtocol,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<TableTask>> {
        if self.copy.finalize_in_transaction && !self.copy.dry_run {
            return self.finalize_in_transaction(tasks, protocol, warnings).await;
        }

        let workers = self.copy.get_finalize_workers();
        let target = self.target.as_ref();

        let tasks: Vec<TableTask> = stream::iter(tasks)
            .map(|mut task| async move {
                protocol.swap(target, &mut task).await?;
                info!("{}: swapped into place", task.name());
                Ok::<_, CopyError>(task)
            })
            .buffered(workers)
            .try_collect()
            .await?;

        let reattached: Vec<(TableTask, Vec<String>)> = stream::iter(tasks)
            .map(|mut task| async move {
                let w = protocol.reattach(target, &mut task).await?;
                Ok::<_, CopyError>((task, w))
            })
            .buffered(workers)
            .try_collect()
            .await?;

        Ok(reattached
            .into_iter()
            .map(|(task, w)| {
                warnings.extend(w);
                task
            })
            .collect())
    }

    /// Finalize every task sequentially on one transaction connection.
    ///
    /// Each DROP, RENAME and ALTER commits implicitly, so the ROLLBACK issued
    /// on failure cannot restore tables that were already swapped; it only
    /// ends the session cleanly before the error is returned.
    async fn finalize_in_transaction(
        &self,
        mut tasks: Vec<TableTask>,
        protocol: SwapProtocol,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<TableTask>> {
        info!("Finalizing inside one destination transaction");
        let tx = self.target.begin().await?;

        for task in tasks.iter_mut() {
            let swapped = protocol.swap(tx.as_ref(), task).await;
            if let Err(e) = swapped {
                if let Err(rb) = tx.rollback().await {
                    warn!("Rollback failed: {}", rb);
                }
                return Err(e);
            }
        }
        for task in tasks.iter_mut() {
            let reattached = protocol.reattach(tx.as_ref(), task).await;
            match reattached {
                Ok(w) => warnings.extend(w),
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        warn!("Rollback failed: {}", rb);
                    }
                    return Err(e);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| CopyError::finalize("<transaction>", format!("commit failed: {}", e)))?;
        Ok(tasks)
    }

    /// Ping both sides.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let start = Instant::now();
        let source = self.source.ping().await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.ping().await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        Ok(HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            target_connected: target.is_ok(),
            target_latency_ms,
            healthy: source.is_ok() && target.is_ok(),
            source_error: source.err().map(|e| e.to_string()),
            target_error: target.err().map(|e| e.to_string()),
        })
    }

    /// Release both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}

/// Phase 2 for one table: temp table, then rows.
#[allow(clippy::too_many_arguments)]
async fn load_table(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    engine: &TransferEngine,
    protocol: SwapProtocol,
    mut task: TableTask,
    mode: InsertMode,
    transfer_rows: bool,
    cancel: &CancellationToken,
) -> Result<(TableTask, TransferStats)> {
    if mode == InsertMode::Insert {
        protocol
            .prepare(source, target, &mut task)
            .await
            .map_err(|e| table_error(task.name(), e))?;
    }

    let stats = if transfer_rows {
        engine.execute(&task, mode, cancel).await?
    } else {
        debug!("{}: skipping data", task.name());
        TransferStats::default()
    };

    match mode {
        InsertMode::Insert => task.advance(TableState::DataLoaded)?,
        InsertMode::InsertIgnore => task.advance(TableState::Finalized)?,
    }
    Ok((task, stats))
}

/// Attach the table name to driver errors raised while preparing a table.
fn table_error(table: &str, e: CopyError) -> CopyError {
    match e {
        CopyError::Database(_) | CopyError::Pool { .. } | CopyError::SchemaExtraction(_) => {
            CopyError::transfer(table, e.to_string())
        }
        other => other,
    }
}
