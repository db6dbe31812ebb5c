//! Orchestration tests against in-memory source and destination backends.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mysql_copy::core::RoutineKind;
use mysql_copy::typemap::RowLayout;
use mysql_copy::{
    ColumnDescriptor, CopyConfig, CopyError, DdlExecutor, InsertMode, Orchestrator,
    ProgressTracker, Result, Row, SourceReader, SqlValue, TableInfo, TableSelection,
    TargetTransaction, TargetWriter,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ============================================================================
// In-memory source
// ============================================================================

struct MemoryTable {
    info: TableInfo,
    columns: Vec<ColumnDescriptor>,
    create: String,
    triggers: Vec<(String, String)>,
    rows: Vec<Row>,
}

#[derive(Default)]
struct MemorySource {
    tables: Vec<MemoryTable>,
    routines: Vec<(RoutineKind, String, String)>,
    fail_stream: Option<String>,
}

impl MemorySource {
    fn table(&self, name: &str) -> Result<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| t.info.name == name)
            .ok_or_else(|| CopyError::TableNotFound(name.to_string()))
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(self.tables.iter().map(|t| t.info.clone()).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.table(table)?.rows.len() as i64)
    }

    async fn show_create_table(&self, table: &str) -> Result<String> {
        Ok(self.table(table)?.create.clone())
    }

    async fn list_triggers(&self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .table(table)?
            .triggers
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn show_create_trigger(&self, trigger: &str) -> Result<String> {
        self.tables
            .iter()
            .flat_map(|t| t.triggers.iter())
            .find(|(name, _)| name == trigger)
            .map(|(_, sql)| sql.clone())
            .ok_or_else(|| CopyError::SchemaExtraction(format!("no trigger {}", trigger)))
    }

    async fn list_routines(&self, kind: RoutineKind) -> Result<Vec<String>> {
        Ok(self
            .routines
            .iter()
            .filter(|(k, _, _)| *k == kind)
            .map(|(_, name, _)| name.clone())
            .collect())
    }

    async fn show_create_routine(&self, kind: RoutineKind, name: &str) -> Result<String> {
        self.routines
            .iter()
            .find(|(k, n, _)| *k == kind && n == name)
            .map(|(_, _, sql)| sql.clone())
            .ok_or_else(|| CopyError::SchemaExtraction(format!("no {} {}", kind, name)))
    }

    async fn stream_rows(
        &self,
        table: &str,
        _layout: &RowLayout,
        tx: mpsc::Sender<Row>,
    ) -> Result<u64> {
        if self.fail_stream.as_deref() == Some(table) {
            return Err(CopyError::transfer(table, "lost connection to source"));
        }
        let mut sent = 0;
        for row in &self.table(table)?.rows {
            if tx.send(row.clone()).await.is_err() {
                break;
            }
            sent += 1;
        }
        Ok(sent)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

// ============================================================================
// In-memory destination
// ============================================================================

#[derive(Default)]
struct MemoryTarget {
    /// Every statement executed, in order. Inserts are logged as `INSERT <table> <rows>`.
    log: Arc<Mutex<Vec<String>>>,
    /// Statements containing any of these fail.
    fail_on: Vec<String>,
    rows: Mutex<BTreeMap<String, Vec<Row>>>,
    layouts: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryTarget {
    fn failing_on(pattern: &str) -> Self {
        Self {
            fail_on: vec![pattern.to_string()],
            ..Default::default()
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(log: &Mutex<Vec<String>>, fail_on: &[String], sql: &str) -> Result<()> {
        log.lock().unwrap().push(sql.to_string());
        if fail_on.iter().any(|p| sql.contains(p.as_str())) {
            return Err(CopyError::SchemaExtraction(format!("rejected: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl DdlExecutor for MemoryTarget {
    async fn execute(&self, sql: &str) -> Result<()> {
        Self::record(&self.log, &self.fail_on, sql)
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn insert_rows(
        &self,
        table: &str,
        layout: &RowLayout,
        rows: &[Row],
        mode: InsertMode,
    ) -> Result<u64> {
        Self::record(
            &self.log,
            &self.fail_on,
            &format!("{} {} {}", mode.verb(), table, rows.len()),
        )
        .map_err(|e| CopyError::transfer(table, e.to_string()))?;
        self.layouts.lock().unwrap().insert(
            table.to_string(),
            layout.columns().iter().map(|c| c.name.clone()).collect(),
        );
        self.rows
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn begin(&self) -> Result<Box<dyn TargetTransaction>> {
        self.log.lock().unwrap().push("START TRANSACTION".into());
        Ok(Box::new(MemoryTransaction {
            log: self.log.clone(),
            fail_on: self.fail_on.clone(),
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}

struct MemoryTransaction {
    log: Arc<Mutex<Vec<String>>>,
    fail_on: Vec<String>,
}

#[async_trait]
impl DdlExecutor for MemoryTransaction {
    async fn execute(&self, sql: &str) -> Result<()> {
        MemoryTarget::record(&self.log, &self.fail_on, sql)
    }
}

#[async_trait]
impl TargetTransaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push("COMMIT".into());
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().push("ROLLBACK".into());
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn int_col(name: &str, pos: u32) -> ColumnDescriptor {
    ColumnDescriptor::new(name, pos, "int", "int", None)
}

fn customers() -> MemoryTable {
    MemoryTable {
        info: TableInfo::new("customers", 100),
        columns: vec![
            int_col("id", 1),
            ColumnDescriptor::new("name", 2, "varchar", "varchar(64)", None),
        ],
        create: "CREATE TABLE `customers` (\n  `id` int NOT NULL,\n  `name` varchar(64) DEFAULT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB".into(),
        triggers: vec![],
        rows: (1..=3)
            .map(|i| vec![SqlValue::I32(i), SqlValue::Text(format!("c{}", i))])
            .collect(),
    }
}

fn orders() -> MemoryTable {
    MemoryTable {
        info: TableInfo::new("orders", 1000),
        columns: vec![int_col("id", 1), int_col("customer_id", 2)],
        create: "CREATE TABLE `orders` (\n  `id` int NOT NULL,\n  `customer_id` int NOT NULL,\n  PRIMARY KEY (`id`),\n  KEY `fk_orders_customer` (`customer_id`),\n  CONSTRAINT `fk_orders_customer` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`) ON DELETE CASCADE\n) ENGINE=InnoDB".into(),
        triggers: vec![(
            "orders_bi".into(),
            "CREATE DEFINER=`admin`@`%` TRIGGER `orders_bi` BEFORE INSERT ON `orders` FOR EACH ROW SET NEW.id = NEW.id".into(),
        )],
        rows: (1..=5)
            .map(|i| vec![SqlValue::I32(i), SqlValue::I32(1 + i % 3)])
            .collect(),
    }
}

fn audit_log() -> MemoryTable {
    MemoryTable {
        info: TableInfo::new("audit_log", 10),
        columns: vec![int_col("id", 1)],
        create: "CREATE TABLE `audit_log` (\n  `id` int NOT NULL\n) ENGINE=InnoDB".into(),
        triggers: vec![],
        rows: vec![vec![SqlValue::I32(7)]],
    }
}

fn shop() -> MemorySource {
    MemorySource {
        tables: vec![customers(), orders(), audit_log()],
        ..Default::default()
    }
}

fn orchestrator(copy: CopyConfig, source: MemorySource, target: Arc<MemoryTarget>) -> Orchestrator {
    Orchestrator::with_backends(copy, Arc::new(source), target)
}

fn all() -> TableSelection {
    TableSelection::all_except(Vec::<String>::new())
}

fn position(log: &[String], pred: impl Fn(&str) -> bool) -> Vec<usize> {
    log.iter()
        .enumerate()
        .filter(|(_, s)| pred(s))
        .map(|(i, _)| i)
        .collect()
}

// ============================================================================
// Full copy
// ============================================================================

#[tokio::test]
async fn test_full_copy_swaps_every_table() {
    let target = Arc::new(MemoryTarget::default());
    let result = orchestrator(CopyConfig::default(), shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, "completed");
    assert_eq!(result.tables_total, 3);
    assert_eq!(result.rows_transferred, 9);
    assert!(result.warnings.is_empty());

    let log = target.log();
    assert!(log.contains(&"ALTER TABLE `_mysqlcopy_orders` RENAME TO `orders`".to_string()));
    assert!(log.contains(&"DROP TABLE IF EXISTS `customers`".to_string()));
    assert!(log.contains(&"INSERT INTO _mysqlcopy_orders 5".to_string()));

    let rows = target.rows.lock().unwrap();
    assert_eq!(rows["_mysqlcopy_customers"].len(), 3);
    assert!(!rows.contains_key("customers"));
}

#[tokio::test]
async fn test_temp_table_created_without_constraints() {
    let target = Arc::new(MemoryTarget::default());
    orchestrator(CopyConfig::default(), shop(), target.clone())
        .run(&TableSelection::tables(["orders"]), CancellationToken::new())
        .await
        .unwrap();

    let log = target.log();
    let create = log
        .iter()
        .find(|s| s.starts_with("CREATE TABLE `_mysqlcopy_orders`"))
        .unwrap();
    assert!(!create.contains("CONSTRAINT"));
    assert!(create.contains("KEY `fk_orders_customer`"));
}

#[tokio::test]
async fn test_constraints_added_after_all_renames() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        workers: Some(3),
        finalize_workers: Some(3),
        ..Default::default()
    };
    orchestrator(copy, shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    let log = target.log();
    let renames = position(&log, |s| s.contains(" RENAME TO "));
    let constraints = position(&log, |s| s.contains("ADD CONSTRAINT"));
    let triggers = position(&log, |s| s.contains("CREATE") && s.contains("TRIGGER"));
    assert_eq!(renames.len(), 3);
    assert_eq!(constraints.len(), 1);
    assert_eq!(triggers.len(), 1);

    let last_rename = *renames.iter().max().unwrap();
    assert!(constraints[0] > last_rename);
    assert!(triggers[0] > last_rename);

    let last_insert = *position(&log, |s| s.starts_with("INSERT")).iter().max().unwrap();
    let first_drop_live = position(&log, |s| s == "DROP TABLE IF EXISTS `orders`")[0];
    assert!(first_drop_live > last_insert);

    assert_eq!(
        log[constraints[0]],
        "ALTER TABLE `orders` ADD CONSTRAINT `fk_orders_customer` FOREIGN KEY (`customer_id`) REFERENCES `customers` (`id`) ON DELETE CASCADE"
    );
}

#[tokio::test]
async fn test_trigger_definer_stripped() {
    let target = Arc::new(MemoryTarget::default());
    orchestrator(CopyConfig::default(), shop(), target.clone())
        .run(&TableSelection::tables(["orders"]), CancellationToken::new())
        .await
        .unwrap();

    let log = target.log();
    let trigger = log.iter().find(|s| s.contains("TRIGGER")).unwrap();
    assert_eq!(
        trigger,
        "CREATE TRIGGER `orders_bi` BEFORE INSERT ON `orders` FOR EACH ROW SET NEW.id = NEW.id"
    );
}

#[tokio::test]
async fn test_worklist_runs_largest_first() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        workers: Some(1),
        ..Default::default()
    };
    let result = orchestrator(copy, shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    let names: Vec<&str> = result.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "customers", "audit_log"]);

    let creates: Vec<String> = target
        .log()
        .into_iter()
        .filter(|s| s.starts_with("CREATE TABLE"))
        .collect();
    assert!(creates[0].starts_with("CREATE TABLE `_mysqlcopy_orders`"));
    assert!(creates[1].starts_with("CREATE TABLE `_mysqlcopy_customers`"));
    assert!(creates[2].starts_with("CREATE TABLE `_mysqlcopy_audit_log`"));
}

#[tokio::test]
async fn test_small_batches_preserve_row_order() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        batch_rows: Some(2),
        row_buffer: Some(1),
        ..Default::default()
    };
    orchestrator(copy, shop(), target.clone())
        .run(&TableSelection::tables(["orders"]), CancellationToken::new())
        .await
        .unwrap();

    let inserts = position(&target.log(), |s| s.starts_with("INSERT INTO _mysqlcopy_orders"));
    assert_eq!(inserts.len(), 3);

    let rows = target.rows.lock().unwrap();
    let ids: Vec<i32> = rows["_mysqlcopy_orders"]
        .iter()
        .map(|r| match r[0] {
            SqlValue::I32(v) => v,
            _ => -1,
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_generated_columns_not_written() {
    let mut table = customers();
    table.columns.push(ColumnDescriptor::new(
        "name_upper",
        3,
        "varchar",
        "varchar(64)",
        Some("upper(`name`)".into()),
    ));
    let source = MemorySource {
        tables: vec![table],
        ..Default::default()
    };
    let target = Arc::new(MemoryTarget::default());
    orchestrator(CopyConfig::default(), source, target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    let layouts = target.layouts.lock().unwrap();
    assert_eq!(layouts["_mysqlcopy_customers"], vec!["id", "name"]);
}

#[tokio::test]
async fn test_progress_tracks_rows() {
    let target = Arc::new(MemoryTarget::default());
    let progress = Arc::new(ProgressTracker::new());
    orchestrator(CopyConfig::default(), shop(), target)
        .with_progress(progress.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    let snap = progress.snapshot();
    assert_eq!(snap.rows_copied, 9);
    assert_eq!(snap.tables_done, 3);
}

// ============================================================================
// Insert-ignore mode
// ============================================================================

#[tokio::test]
async fn test_insert_ignore_writes_live_tables() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        insert_ignore: true,
        ..Default::default()
    };
    let result = orchestrator(copy, shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.rows_transferred, 9);

    let log = target.log();
    assert!(log.iter().all(|s| s.starts_with("INSERT IGNORE INTO ")));
    assert!(log.contains(&"INSERT IGNORE INTO orders 5".to_string()));
}

fn long_named_table() -> MemoryTable {
    let name = "t".repeat(60);
    MemoryTable {
        info: TableInfo::new(name.as_str(), 10),
        columns: vec![int_col("id", 1)],
        create: format!("CREATE TABLE `{}` (\n  `id` int NOT NULL\n) ENGINE=InnoDB", name),
        triggers: vec![],
        rows: vec![vec![SqlValue::I32(1)], vec![SqlValue::I32(2)]],
    }
}

#[tokio::test]
async fn test_insert_ignore_accepts_names_without_temp_room() {
    let source = MemorySource {
        tables: vec![long_named_table()],
        ..Default::default()
    };
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        insert_ignore: true,
        ..Default::default()
    };
    let result = orchestrator(copy, source, target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.rows_transferred, 2);
    assert_eq!(
        target.log(),
        vec![format!("INSERT IGNORE INTO {} 2", "t".repeat(60))]
    );
}

#[tokio::test]
async fn test_swap_mode_rejects_names_without_temp_room() {
    let source = MemorySource {
        tables: vec![long_named_table()],
        ..Default::default()
    };
    let target = Arc::new(MemoryTarget::default());
    let err = orchestrator(CopyConfig::default(), source, target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(target.log().is_empty());
}

// ============================================================================
// Configuration errors abort before any destination change
// ============================================================================

#[tokio::test]
async fn test_pattern_without_match_is_fatal() {
    let target = Arc::new(MemoryTarget::default());
    let err = orchestrator(CopyConfig::default(), shop(), target.clone())
        .run(&TableSelection::tables(["invoice_*"]), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::PatternNoMatch(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(target.log().is_empty());
}

#[tokio::test]
async fn test_unsupported_type_leaves_target_untouched() {
    let mut source = shop();
    source.tables.push(MemoryTable {
        info: TableInfo::new("places", 5),
        columns: vec![
            int_col("id", 1),
            ColumnDescriptor::new("shape", 2, "geometry", "geometry", None),
        ],
        create: "CREATE TABLE `places` (\n  `id` int NOT NULL\n)".into(),
        triggers: vec![],
        rows: vec![],
    });
    let target = Arc::new(MemoryTarget::default());
    let err = orchestrator(CopyConfig::default(), source, target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::UnsupportedColumnType { .. }));
    assert!(target.log().is_empty());
}

#[tokio::test]
async fn test_aliases_resolve_against_catalog() {
    let target = Arc::new(MemoryTarget::default());
    let aliases = mysql_copy::AliasMap::from_yaml("sales: [orders, cust*]\n").unwrap();
    let plan = orchestrator(CopyConfig::default(), shop(), target.clone())
        .with_aliases(aliases)
        .plan(&TableSelection::tables(["sales"]))
        .await
        .unwrap();
    let names: Vec<&str> = plan.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "customers"]);
    assert!(target.log().is_empty());
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn test_constraint_failure_is_warning() {
    let target = Arc::new(MemoryTarget::failing_on("ADD CONSTRAINT"));
    let result = orchestrator(CopyConfig::default(), shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, "completed_with_warnings");
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("orders"));
    // The trigger is still attempted after the constraint failure.
    assert!(target.log().iter().any(|s| s.contains("TRIGGER")));
}

#[tokio::test]
async fn test_transfer_failure_stops_run_before_swap() {
    let mut source = shop();
    source.fail_stream = Some("customers".into());
    let target = Arc::new(MemoryTarget::default());
    let err = orchestrator(CopyConfig::default(), source, target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CopyError::Transfer { ref table, .. } if table == "customers"));
    let log = target.log();
    assert!(!log.iter().any(|s| s.contains("RENAME")));
    assert!(!log.iter().any(|s| s == "DROP TABLE IF EXISTS `customers`"));
}

#[tokio::test]
async fn test_rename_failure_is_fatal() {
    let target = Arc::new(MemoryTarget::failing_on("RENAME TO `customers`"));
    let err = orchestrator(CopyConfig::default(), shop(), target)
        .run(&all(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::Finalize { ref table, .. } if table == "customers"));
}

#[tokio::test]
async fn test_cancelled_run() {
    let target = Arc::new(MemoryTarget::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = orchestrator(CopyConfig::default(), shop(), target.clone())
        .run(&all(), cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::Cancelled));
    assert!(!target.log().iter().any(|s| s.contains("RENAME")));
}

// ============================================================================
// Run options
// ============================================================================

#[tokio::test]
async fn test_dry_run_changes_nothing() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        dry_run: true,
        copy_views: true,
        ..Default::default()
    };
    let mut source = shop();
    source.routines.push((
        RoutineKind::View,
        "v_orders".into(),
        "CREATE VIEW `v_orders` AS select 1".into(),
    ));
    let result = orchestrator(copy, source, target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.tables_total, 3);
    assert_eq!(result.rows_transferred, 0);
    assert!(target.log().is_empty());
}

#[tokio::test]
async fn test_skip_data_still_swaps() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        skip_data: true,
        ..Default::default()
    };
    orchestrator(copy, shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    let log = target.log();
    assert!(!log.iter().any(|s| s.starts_with("INSERT")));
    assert_eq!(position(&log, |s| s.contains(" RENAME TO ")).len(), 3);
}

#[tokio::test]
async fn test_finalize_in_transaction() {
    let target = Arc::new(MemoryTarget::default());
    let copy = CopyConfig {
        finalize_in_transaction: true,
        ..Default::default()
    };
    orchestrator(copy, shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap();

    let log = target.log();
    let start = position(&log, |s| s == "START TRANSACTION")[0];
    let commit = position(&log, |s| s == "COMMIT")[0];
    for i in position(&log, |s| s.contains(" RENAME TO ") || s.contains("ADD CONSTRAINT")) {
        assert!(start < i && i < commit);
    }
}

#[tokio::test]
async fn test_finalize_transaction_ends_with_rollback_on_rename_failure() {
    let target = Arc::new(MemoryTarget::failing_on("RENAME TO `orders`"));
    let copy = CopyConfig {
        finalize_in_transaction: true,
        ..Default::default()
    };
    let err = orchestrator(copy, shop(), target.clone())
        .run(&all(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CopyError::Finalize { .. }));
    // DDL already run stays committed; the rollback only closes the session.
    assert_eq!(target.log().last().map(String::as_str), Some("ROLLBACK"));
}

#[tokio::test]
async fn test_routines_copied_without_definer() {
    let mut source = shop();
    source.routines.push((
        RoutineKind::Function,
        "total".into(),
        "CREATE DEFINER=`root`@`localhost` FUNCTION `total`() RETURNS int DETERMINISTIC RETURN 1"
            .into(),
    ));
    source.routines.push((
        RoutineKind::Procedure,
        "purge".into(),
        "CREATE DEFINER=`root`@`localhost` PROCEDURE `purge`() DELETE FROM audit_log".into(),
    ));
    let target = Arc::new(MemoryTarget::failing_on("PROCEDURE `purge`()"));
    let copy = CopyConfig {
        copy_functions: true,
        copy_procedures: true,
        ..Default::default()
    };
    let result = orchestrator(copy, source, target.clone())
        .run(&TableSelection::tables(["audit_log"]), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.routines_copied, 1);
    assert_eq!(result.warnings.len(), 1);
    let log = target.log();
    assert!(log.contains(&"DROP FUNCTION IF EXISTS `total`".to_string()));
    assert!(log.contains(
        &"CREATE FUNCTION `total`() RETURNS int DETERMINISTIC RETURN 1".to_string()
    ));
}

#[tokio::test]
async fn test_health_check() {
    let target = Arc::new(MemoryTarget::default());
    let health = orchestrator(CopyConfig::default(), shop(), target)
        .health_check()
        .await
        .unwrap();
    assert!(health.healthy);
    assert!(health.source_error.is_none());
}

#[tokio::test]
async fn test_result_serializes() {
    let target = Arc::new(MemoryTarget::default());
    let result = orchestrator(CopyConfig::default(), shop(), target)
        .run(&TableSelection::tables(["audit_log"]), CancellationToken::new())
        .await
        .unwrap();
    let json = result.to_json().unwrap();
    assert!(json.contains("\"run_id\""));
    assert!(json.contains("\"audit_log\""));
}
