//! Per-table task and its state machine.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::core::identifier::temp_table_name;
use crate::core::schema::{ColumnDescriptor, TableInfo};
use crate::error::{CopyError, Result};
use crate::typemap::RowLayout;

use super::ddl::ConstraintBlock;

/// Progress of one table through the swap protocol.
///
/// The normal path is
/// `Init → SchemaFetched → ConstraintsStripped → TempCreated → DataLoaded → Swapped → Finalized`.
/// Insert-ignore runs go straight from `Init` to `Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableState {
    Init,
    SchemaFetched,
    ConstraintsStripped,
    TempCreated,
    DataLoaded,
    /// Old table dropped and temp table renamed into place.
    Swapped,
    Finalized,
}

impl TableState {
    fn can_advance_to(self, next: TableState) -> bool {
        use TableState::*;
        matches!(
            (self, next),
            (Init, SchemaFetched)
                | (SchemaFetched, ConstraintsStripped)
                | (ConstraintsStripped, TempCreated)
                | (TempCreated, DataLoaded)
                | (DataLoaded, Swapped)
                | (Swapped, Finalized)
                | (Init, Finalized)
        )
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableState::Init => "init",
            TableState::SchemaFetched => "schema_fetched",
            TableState::ConstraintsStripped => "constraints_stripped",
            TableState::TempCreated => "temp_created",
            TableState::DataLoaded => "data_loaded",
            TableState::Swapped => "swapped",
            TableState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// A trigger definition with its definer already removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDefinition {
    pub name: String,
    pub sql: String,
}

/// Everything the pipeline knows about one table while it is being copied.
#[derive(Debug)]
pub struct TableTask {
    name: String,
    temp_name: Option<String>,
    size_bytes: u64,
    columns: Vec<ColumnDescriptor>,
    layout: Arc<RowLayout>,
    state: TableState,
    create_statement: Option<String>,
    constraints: Option<ConstraintBlock>,
    triggers: Vec<TriggerDefinition>,
}

impl TableTask {
    /// Build a task from introspected columns.
    ///
    /// `temp_prefix` is `None` for insert-ignore runs, which never stage into
    /// a temp table. Fails on unsupported column types or a temp name that is
    /// too long.
    pub fn new(
        info: &TableInfo,
        columns: Vec<ColumnDescriptor>,
        temp_prefix: Option<&str>,
    ) -> Result<Self> {
        let layout = RowLayout::build(&info.name, &columns)?;
        Ok(Self {
            temp_name: temp_prefix
                .map(|prefix| temp_table_name(prefix, &info.name))
                .transpose()?,
            name: info.name.clone(),
            size_bytes: info.size_bytes,
            columns,
            layout: Arc::new(layout),
            state: TableState::Init,
            create_statement: None,
            constraints: None,
            triggers: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temp_name(&self) -> Option<&str> {
        self.temp_name.as_deref()
    }

    /// Temp table name for the swap path.
    pub(crate) fn staging_table(&self) -> Result<&str> {
        self.temp_name
            .as_deref()
            .ok_or_else(|| CopyError::transfer(&self.name, "task has no temp table"))
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn layout(&self) -> &Arc<RowLayout> {
        &self.layout
    }

    /// Quoted column list shared by SELECT and INSERT.
    pub fn column_list(&self) -> &str {
        self.layout.column_list()
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn create_statement(&self) -> Option<&str> {
        self.create_statement.as_deref()
    }

    pub fn constraints(&self) -> Option<&ConstraintBlock> {
        self.constraints.as_ref()
    }

    pub fn triggers(&self) -> &[TriggerDefinition] {
        &self.triggers
    }

    /// Move to `next`, rejecting anything off the state machine.
    pub fn advance(&mut self, next: TableState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(CopyError::InvalidTransition {
                table: self.name.clone(),
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub(crate) fn record_schema(
        &mut self,
        create_statement: String,
        triggers: Vec<TriggerDefinition>,
    ) -> Result<()> {
        self.advance(TableState::SchemaFetched)?;
        self.create_statement = Some(create_statement);
        self.triggers = triggers;
        Ok(())
    }

    pub(crate) fn record_stripped(
        &mut self,
        stripped: String,
        constraints: Option<ConstraintBlock>,
    ) -> Result<()> {
        self.advance(TableState::ConstraintsStripped)?;
        self.create_statement = Some(stripped);
        self.constraints = constraints;
        Ok(())
    }

    /// Hand the constraint block to the finalize step.
    pub(crate) fn take_constraints(&mut self) -> Option<ConstraintBlock> {
        self.constraints.take()
    }

    /// Hand the trigger definitions to the finalize step.
    pub(crate) fn take_triggers(&mut self) -> Vec<TriggerDefinition> {
        std::mem::take(&mut self.triggers)
    }
}
