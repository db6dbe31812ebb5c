//! Temp-table build and swap.
//!
//! Each table is rebuilt under a staging name and only moved into place once
//! every table of the run has its data loaded:
//!
//! 1. [`SwapProtocol::prepare`]: fetch the source DDL and triggers, strip the
//!    foreign-key block, create the staging table
//! 2. the transfer engine fills the staging table
//! 3. [`SwapProtocol::swap`]: drop the live table and rename the staging table
//! 4. [`SwapProtocol::reattach`]: add the constraints back and recreate triggers
//!
//! Step 4 must only start once step 3 has run for every table, otherwise a
//! constraint could point at a table that is still under its staging name.

pub mod ddl;
pub mod task;

pub use ddl::{retarget_create, split_constraints, strip_definer, ConstraintBlock};
pub use task::{TableState, TableTask, TriggerDefinition};

use tracing::{debug, info, warn};

use crate::core::identifier::quote_mysql;
use crate::core::traits::{DdlExecutor, SourceReader};
use crate::error::{CopyError, Result};

/// Executes the DDL side of the table swap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapProtocol {
    dry_run: bool,
}

impl SwapProtocol {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub(crate) async fn run<E: DdlExecutor + ?Sized>(&self, target: &E, sql: &str) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] {}", sql);
            return Ok(());
        }
        debug!("{}", sql);
        target.execute(sql).await
    }

    /// Bring a task from `Init` to `TempCreated`.
    pub async fn prepare<E: DdlExecutor + ?Sized>(
        &self,
        source: &dyn SourceReader,
        target: &E,
        task: &mut TableTask,
    ) -> Result<()> {
        let create = source.show_create_table(task.name()).await?;

        let mut triggers = Vec::new();
        for name in source.list_triggers(task.name()).await? {
            let sql = source.show_create_trigger(&name).await?;
            triggers.push(TriggerDefinition {
                sql: strip_definer(&sql).into_owned(),
                name,
            });
        }
        task.record_schema(create.clone(), triggers)?;

        let (stripped, constraints) = split_constraints(&create);
        if let Some(block) = &constraints {
            debug!(
                "{}: deferred {} constraint(s)",
                task.name(),
                block.clauses().len()
            );
        }
        let temp_create = retarget_create(&stripped, task.name(), task.staging_table()?)?;
        task.record_stripped(stripped, constraints)?;

        self.run(
            target,
            &format!("DROP TABLE IF EXISTS {}", quote_mysql(task.staging_table()?)?),
        )
        .await?;
        self.run(target, &temp_create).await?;
        task.advance(TableState::TempCreated)
    }

    /// Replace the live table with the loaded temp table.
    ///
    /// Failures here are fatal: the table may now be missing on the
    /// destination.
    pub async fn swap<E: DdlExecutor + ?Sized>(&self, target: &E, task: &mut TableTask) -> Result<()> {
        let live = quote_mysql(task.name())?;
        let temp = quote_mysql(task.staging_table()?)?;

        self.run(target, &format!("DROP TABLE IF EXISTS {}", live))
            .await
            .map_err(|e| CopyError::finalize(task.name(), format!("drop failed: {}", e)))?;
        self.run(target, &format!("ALTER TABLE {} RENAME TO {}", temp, live))
            .await
            .map_err(|e| CopyError::finalize(task.name(), format!("rename failed: {}", e)))?;

        task.advance(TableState::Swapped)
    }

    /// Re-add constraints and triggers on a swapped table.
    ///
    /// Returns one warning per failed statement; failures never abort.
    pub async fn reattach<E: DdlExecutor + ?Sized>(
        &self,
        target: &E,
        task: &mut TableTask,
    ) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        if let Some(block) = task.take_constraints() {
            let alter = block.alter_statement(task.name())?;
            if let Err(e) = self.run(target, &alter).await {
                let msg = format!("{}: failed to add constraints: {}", task.name(), e);
                warn!("{}", msg);
                warnings.push(msg);
            }
        }

        for trigger in task.take_triggers() {
            if let Err(e) = self.run(target, &trigger.sql).await {
                let msg = format!(
                    "{}: failed to create trigger {}: {}",
                    task.name(),
                    trigger.name,
                    e
                );
                warn!("{}", msg);
                warnings.push(msg);
            }
        }

        task.advance(TableState::Finalized)?;
        Ok(warnings)
    }
}
