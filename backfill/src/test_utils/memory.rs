use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tempfile::TempDir;
use tokio::process::Command;

use crate::bail;
use crate::destination::DestinationDatabase;
use crate::error::{BackfillResult, ErrorKind};
use crate::source::SourceDatabase;
use crate::source::postgres::NULL_MARKER;
use crate::types::{ColumnSet, ReplicationJob};

/// A row of text cells, `None` standing for SQL `NULL`.
pub type Row = Vec<Option<String>>;

/// Builds a row without `NULL` cells.
pub fn row(cells: &[&str]) -> Row {
    cells.iter().map(|cell| Some(cell.to_string())).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryTable {
    pub columns: ColumnSet,
    pub boolean_columns: ColumnSet,
    pub rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            columns: columns.iter().copied().collect(),
            boolean_columns: ColumnSet::default(),
            rows,
        }
    }

    /// Marks `columns` as stored with the boolean surrogate type.
    pub fn with_boolean_columns(mut self, columns: &[&str]) -> Self {
        self.boolean_columns = columns.iter().copied().collect();
        self
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn shell(script: &str, args: &[&str]) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script).arg("sh").args(args);
    command
}

#[derive(Debug, Default)]
struct SourceInner {
    tables: HashMap<String, MemoryTable>,
    failing_exports: HashSet<String>,
    concurrent_writes: HashMap<String, Vec<Row>>,
}

/// In-memory source whose export is a `sh` process printing the table as tab separated CSV.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<SourceInner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, name: &str, table: MemoryTable) {
        lock(&self.inner).tables.insert(name.to_string(), table);
    }

    /// Appends `row` to `name` once its export starts, after the row count was taken.
    ///
    /// Models writes the source keeps receiving while a table is loaded.
    pub fn push_row_during_export(&self, name: &str, row: Row) {
        lock(&self.inner)
            .concurrent_writes
            .entry(name.to_string())
            .or_default()
            .push(row);
    }

    /// Makes the export of `table` exit with a failure before writing anything.
    pub fn fail_export(&self, table: &str) {
        lock(&self.inner).failing_exports.insert(table.to_string());
    }

    fn table(&self, name: &str) -> BackfillResult<MemoryTable> {
        match lock(&self.inner).tables.get(name) {
            Some(table) => Ok(table.clone()),
            None => bail!(
                ErrorKind::SourceTableMissing,
                "Source table not found",
                format!("no table {name} in the memory source")
            ),
        }
    }
}

impl SourceDatabase for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn table_columns(&self, table: &str) -> BackfillResult<ColumnSet> {
        Ok(self.table(table)?.columns)
    }

    async fn row_count(&self, table: &str) -> BackfillResult<u64> {
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn checkpoint(&self, table: &str, column: &str) -> BackfillResult<String> {
        let table = self.table(table)?;
        let Some(position) = table.position(column) else {
            bail!(
                ErrorKind::SourceQueryFailed,
                "Checkpoint column not found",
                format!("no column {column} in the memory source")
            );
        };

        let max = table
            .rows
            .iter()
            .filter_map(|row| row[position].as_deref())
            .map(str::parse::<i128>)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .max()
            .unwrap_or(0);

        Ok(max.to_string())
    }

    fn export_command(&self, job: &ReplicationJob) -> Command {
        let source_name = job.mapping.source_name();
        {
            let mut inner = lock(&self.inner);
            if inner.failing_exports.contains(source_name) {
                return shell("exit 7", &[]);
            }

            let writes = inner
                .concurrent_writes
                .remove(source_name)
                .unwrap_or_default();
            if let Some(table) = inner.tables.get_mut(source_name) {
                table.rows.extend(writes);
            }
        }

        let rendered = match self.table(source_name) {
            Ok(table) => render_rows(&table, &job.columns),
            Err(_) => return shell("exit 8", &[]),
        };

        shell(r#"printf '%s' "$1""#, &[&rendered])
    }
}

/// Renders the `columns` of `table` the way the Postgres export does.
fn render_rows(table: &MemoryTable, columns: &ColumnSet) -> String {
    let positions = columns
        .iter()
        .map(|column| table.position(column))
        .collect::<Vec<_>>();

    let mut rendered = String::new();
    for row in &table.rows {
        let fields = positions
            .iter()
            .map(|position| match position.and_then(|p| row[p].as_deref()) {
                Some(value) => csv_field(value),
                None => NULL_MARKER.to_string(),
            })
            .collect::<Vec<_>>();
        rendered.push_str(&fields.join("\t"));
        rendered.push('\n');
    }

    rendered
}

fn csv_field(value: &str) -> String {
    let needs_quotes = value == NULL_MARKER
        || value.is_empty()
        || value.contains(['\t', '"', '\n', '\r']);

    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Splits a loaded line into its fields, returning each value and whether it was enclosed.
fn split_fields(line: &str) -> Vec<(String, bool)> {
    let mut fields = Vec::new();
    let mut value = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                value.push('"');
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            '\t' if !in_quotes => {
                fields.push((std::mem::take(&mut value), quoted));
                quoted = false;
            }
            c => value.push(c),
        }
    }
    fields.push((value, quoted));

    fields
}

/// Converts a loaded field to a cell, decoding booleans when `boolean` is set.
fn parse_field(value: String, quoted: bool, boolean: bool) -> Option<String> {
    if !quoted && value == NULL_MARKER {
        return None;
    }

    if boolean {
        return match value.as_str() {
            "t" => Some("1".to_string()),
            "f" => Some("0".to_string()),
            _ => None,
        };
    }

    Some(value)
}

/// Statements and operations recorded by [`MemoryDestination`], in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationOperation {
    SetAutocommit(bool),
    DeleteAllRows(String),
    Commit,
    Rollback,
    Load(String),
    AnalyzeTable(String),
}

/// Failures [`MemoryDestination`] can be told to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DestinationFault {
    /// The delete statement fails.
    DeleteAllRows,
    /// The import drains its input, then exits with a failure.
    Load,
    /// The import exits with a failure without ever opening its input.
    LoadBeforeOpen,
    AnalyzeTable,
}

#[derive(Debug)]
struct PendingLoad {
    table: String,
    columns: ColumnSet,
    boolean_columns: ColumnSet,
}

#[derive(Debug)]
struct DestinationInner {
    committed: HashMap<String, MemoryTable>,
    // Uncommitted view of the statement session, present while a transaction is open.
    working: Option<HashMap<String, MemoryTable>>,
    autocommit: bool,
    operations: Vec<DestinationOperation>,
    faults: HashSet<DestinationFault>,
    pending: HashMap<PathBuf, PendingLoad>,
    staging: TempDir,
    next_load: usize,
}

impl DestinationInner {
    fn view(&self) -> &HashMap<String, MemoryTable> {
        self.working.as_ref().unwrap_or(&self.committed)
    }

    fn view_mut(&mut self) -> &mut HashMap<String, MemoryTable> {
        if self.autocommit {
            return &mut self.committed;
        }

        let committed = &self.committed;
        self.working.get_or_insert_with(|| committed.clone())
    }

    /// Applies every load whose import finished, as the import session would have.
    fn ingest_finished_loads(&mut self) {
        let finished = self
            .pending
            .keys()
            .filter(|path| path.exists())
            .cloned()
            .collect::<Vec<_>>();

        for path in finished {
            let Some(load) = self.pending.remove(&path) else {
                continue;
            };
            let Ok(contents) = std::fs::read_to_string(&path) else {
                continue;
            };
            let _ = std::fs::remove_file(&path);

            self.operations
                .push(DestinationOperation::Load(load.table.clone()));

            let Some(table) = self.committed.get_mut(&load.table) else {
                continue;
            };
            let positions = load
                .columns
                .iter()
                .map(|column| table.position(column))
                .collect::<Vec<_>>();

            for line in contents.lines() {
                let mut row: Row = vec![None; table.columns.len()];
                for (((value, quoted), column), position) in split_fields(line)
                    .into_iter()
                    .zip(load.columns.iter())
                    .zip(&positions)
                {
                    if let Some(position) = position {
                        row[*position] =
                            parse_field(value, quoted, load.boolean_columns.contains(column));
                    }
                }
                table.rows.push(row);
            }

            // Rows committed by the import session are visible to an open transaction.
            if let Some(working) = self.working.as_mut() {
                if let Some(loaded) = self.committed.get(&load.table) {
                    working.insert(load.table.clone(), loaded.clone());
                }
            }
        }
    }
}

/// In-memory destination with MySQL-like session semantics.
///
/// Statements run against a session that honors autocommit, commit and rollback. The import
/// is a separate `sh` process that decodes the conduit according to its suffix and stages the
/// rows in a file; staged rows are applied as if committed by the import's own session.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<DestinationInner>>,
}

impl MemoryDestination {
    /// # Panics
    /// Panics if the staging directory cannot be created.
    pub fn new() -> Self {
        let staging = tempfile::Builder::new()
            .prefix("backfill-staging-")
            .tempdir()
            .expect("failed to create staging directory");

        Self {
            inner: Arc::new(Mutex::new(DestinationInner {
                committed: HashMap::new(),
                working: None,
                autocommit: true,
                operations: Vec::new(),
                faults: HashSet::new(),
                pending: HashMap::new(),
                staging,
                next_load: 0,
            })),
        }
    }

    pub fn insert_table(&self, name: &str, table: MemoryTable) {
        lock(&self.inner).committed.insert(name.to_string(), table);
    }

    pub fn inject_fault(&self, fault: DestinationFault) {
        lock(&self.inner).faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        lock(&self.inner).faults.clear();
    }

    /// Returns the committed rows of `table`.
    pub fn table_rows(&self, table: &str) -> Vec<Row> {
        let mut inner = lock(&self.inner);
        inner.ingest_finished_loads();

        inner
            .committed
            .get(table)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<DestinationOperation> {
        lock(&self.inner).operations.clone()
    }

    pub fn is_autocommit(&self) -> bool {
        lock(&self.inner).autocommit
    }

    fn has_fault(&self, fault: DestinationFault) -> bool {
        lock(&self.inner).faults.contains(&fault)
    }

    fn table(&self, name: &str) -> BackfillResult<MemoryTable> {
        match lock(&self.inner).view().get(name) {
            Some(table) => Ok(table.clone()),
            None => bail!(
                ErrorKind::DestinationTableMissing,
                "Destination table not found",
                format!("no table {name} in the memory destination")
            ),
        }
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl DestinationDatabase for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn table_columns(&mut self, table: &str) -> BackfillResult<ColumnSet> {
        Ok(self.table(table)?.columns)
    }

    async fn boolean_columns(&mut self, table: &str) -> BackfillResult<ColumnSet> {
        Ok(self.table(table)?.boolean_columns)
    }

    async fn row_count(&mut self, table: &str) -> BackfillResult<u64> {
        lock(&self.inner).ingest_finished_loads();

        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn set_autocommit(&mut self, enabled: bool) -> BackfillResult<()> {
        let mut inner = lock(&self.inner);
        inner
            .operations
            .push(DestinationOperation::SetAutocommit(enabled));

        // Enabling autocommit commits the open transaction.
        if enabled && let Some(working) = inner.working.take() {
            inner.committed = working;
        }
        inner.autocommit = enabled;

        Ok(())
    }

    async fn delete_all_rows(&mut self, table: &str) -> BackfillResult<()> {
        if self.has_fault(DestinationFault::DeleteAllRows) {
            bail!(
                ErrorKind::DestinationTransactionFailed,
                "Failed to delete destination rows",
                "injected delete failure"
            );
        }

        let mut inner = lock(&self.inner);
        inner
            .operations
            .push(DestinationOperation::DeleteAllRows(table.to_string()));

        match inner.view_mut().get_mut(table) {
            Some(table) => table.rows.clear(),
            None => bail!(
                ErrorKind::DestinationTableMissing,
                "Destination table not found",
                format!("no table {table} in the memory destination")
            ),
        }

        Ok(())
    }

    async fn commit(&mut self) -> BackfillResult<()> {
        let mut inner = lock(&self.inner);
        inner.ingest_finished_loads();
        inner.operations.push(DestinationOperation::Commit);

        if let Some(working) = inner.working.take() {
            inner.committed = working;
        }

        Ok(())
    }

    async fn rollback(&mut self) -> BackfillResult<()> {
        let mut inner = lock(&self.inner);
        inner.operations.push(DestinationOperation::Rollback);
        inner.working = None;

        Ok(())
    }

    async fn analyze_table(&mut self, table: &str) -> BackfillResult<()> {
        if self.has_fault(DestinationFault::AnalyzeTable) {
            bail!(
                ErrorKind::DestinationQueryFailed,
                "Failed to analyze the destination table",
                "injected analyze failure"
            );
        }

        lock(&self.inner)
            .operations
            .push(DestinationOperation::AnalyzeTable(table.to_string()));

        Ok(())
    }

    fn import_command(&self, conduit: &Path, job: &ReplicationJob) -> Command {
        if self.has_fault(DestinationFault::LoadBeforeOpen) {
            return shell("exit 5", &[]);
        }

        let conduit = conduit.to_string_lossy().into_owned();
        if self.has_fault(DestinationFault::Load) {
            return shell(r#"cat "$1" > /dev/null; exit 6"#, &[&conduit]);
        }

        let decoder = if conduit.ends_with(".gz") {
            "gzip -dc"
        } else if conduit.ends_with(".lz4") {
            "lz4 -dc"
        } else {
            "cat"
        };

        let staged = {
            let mut inner = lock(&self.inner);
            inner.next_load += 1;
            let staged = inner
                .staging
                .path()
                .join(format!("load-{}.tsv", inner.next_load));
            inner.pending.insert(
                staged.clone(),
                PendingLoad {
                    table: job.mapping.destination_name().to_string(),
                    columns: job.columns.clone(),
                    boolean_columns: job.boolean_columns.clone(),
                },
            );
            staged.to_string_lossy().into_owned()
        };

        let script = format!(r#"{decoder} < "$1" > "$2.part" && mv "$2.part" "$2""#);
        shell(&script, &[&conduit, &staged])
    }
}
