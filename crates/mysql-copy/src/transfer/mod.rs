//! Streaming copy engine.
//!
//! One table at a time: a reader task streams rows from the source cursor
//! into a bounded channel, the calling task drains it and writes batched
//! inserts. The channel capacity is the only buffer, so a slow destination
//! stalls the source read instead of growing memory.

pub mod progress;

pub use progress::{ProgressSnapshot, ProgressTracker, TableProgress, TableSnapshot};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::traits::{InsertMode, SourceReader, TargetWriter};
use crate::core::value::Row;
use crate::error::{CopyError, Result};
use crate::swap::TableTask;

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Capacity of the row queue between reader and writer.
    pub row_buffer: usize,

    /// Rows per `insert_rows` call.
    pub batch_rows: usize,

    /// Issue the advisory `COUNT(*)` before streaming.
    pub count_rows: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            row_buffer: 10_000,
            batch_rows: 1_000,
            count_rows: true,
        }
    }
}

/// Statistics from one table transfer.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Rows received from the source cursor.
    pub rows_read: u64,

    /// Rows the destination reported as inserted.
    pub rows_written: u64,

    /// Advisory count taken before streaming.
    pub expected_rows: Option<i64>,

    /// Wall time for the whole transfer.
    pub elapsed: Duration,

    /// Time spent inside insert calls.
    pub write_time: Duration,
}

impl TransferStats {
    pub fn rows_per_second(&self) -> i64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.rows_read as f64 / secs) as i64
        } else {
            0
        }
    }
}

/// Copies the rows of one table from source to destination.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
    progress: Option<Arc<ProgressTracker>>,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
            progress: None,
        }
    }

    /// Report row counts to a shared tracker.
    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stream every row of `task` into the destination.
    ///
    /// `Insert` writes into the task's temp table, `InsertIgnore` into the
    /// live table. Returns on the first read or write error; the reader task
    /// is aborted so its connection goes back to the pool.
    pub async fn execute(
        &self,
        task: &TableTask,
        mode: InsertMode,
        cancel: &CancellationToken,
    ) -> Result<TransferStats> {
        let start = Instant::now();
        let table = task.name().to_string();
        let dest = match mode {
            InsertMode::Insert => task.staging_table()?,
            InsertMode::InsertIgnore => task.name(),
        };
        let mut stats = TransferStats::default();

        let counter = self.progress.as_ref().map(|p| p.table(&table));

        if self.config.count_rows {
            match self.source.row_count(&table).await {
                Ok(n) => stats.expected_rows = Some(n),
                Err(e) => warn!("{}: row count failed, continuing: {}", table, e),
            }
        }
        if let Some(c) = &counter {
            c.set_expected(stats.expected_rows);
        }

        debug!(
            "{}: streaming into {} (buffer: {}, batch: {})",
            table, dest, self.config.row_buffer, self.config.batch_rows
        );

        let (tx, mut rx) = mpsc::channel::<Row>(self.config.row_buffer.max(1));
        let source = self.source.clone();
        let layout = task.layout().clone();
        let reader_table = table.clone();
        let reader =
            tokio::spawn(async move { source.stream_rows(&reader_table, &layout, tx).await });

        let batch_rows = self.config.batch_rows.max(1);
        let mut batch: Vec<Row> = Vec::with_capacity(batch_rows);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    reader.abort();
                    return Err(CopyError::Cancelled);
                }
                row = rx.recv() => row,
            };

            let Some(row) = next else { break };
            batch.push(row);

            if batch.len() >= batch_rows {
                if let Err(e) = self.write_batch(task, dest, &batch, mode, &mut stats).await {
                    reader.abort();
                    return Err(e);
                }
                if let Some(c) = &counter {
                    c.add_rows(batch.len() as i64);
                }
                batch.clear();
            }
        }

        // The channel closes when the reader finishes or fails.
        let sent = match reader.await {
            Ok(Ok(sent)) => sent,
            Ok(Err(e)) => return Err(read_error(&table, e)),
            Err(e) => {
                return Err(CopyError::transfer(
                    &table,
                    format!("reader task failed: {}", e),
                ))
            }
        };

        if !batch.is_empty() {
            self.write_batch(task, dest, &batch, mode, &mut stats).await?;
            if let Some(c) = &counter {
                c.add_rows(batch.len() as i64);
            }
        }
        if let Some(c) = &counter {
            c.finish();
        }

        stats.elapsed = start.elapsed();
        if sent != stats.rows_read {
            debug!(
                "{}: reader sent {} rows, writer consumed {}",
                table, sent, stats.rows_read
            );
        }
        if let Some(expected) = stats.expected_rows {
            if expected != stats.rows_read as i64 {
                debug!(
                    "{}: advisory count was {}, copied {}",
                    table, expected, stats.rows_read
                );
            }
        }

        info!(
            "{}: transferred {} rows in {:?} ({} rows/sec, write: {:?})",
            table,
            stats.rows_read,
            stats.elapsed,
            stats.rows_per_second(),
            stats.write_time
        );

        Ok(stats)
    }

    async fn write_batch(
        &self,
        task: &TableTask,
        dest: &str,
        batch: &[Row],
        mode: InsertMode,
        stats: &mut TransferStats,
    ) -> Result<()> {
        let write_start = Instant::now();
        let written = self
            .target
            .insert_rows(dest, task.layout(), batch, mode)
            .await
            .map_err(|e| match e {
                CopyError::Transfer { .. } => e,
                other => CopyError::transfer(task.name(), format!("write failed: {}", other)),
            })?;
        stats.write_time += write_start.elapsed();
        stats.rows_read += batch.len() as u64;
        stats.rows_written += written;
        Ok(())
    }
}

fn read_error(table: &str, e: CopyError) -> CopyError {
    match e {
        CopyError::Transfer { .. } | CopyError::Cancelled => e,
        other => CopyError::transfer(table, format!("read failed: {}", other)),
    }
}
