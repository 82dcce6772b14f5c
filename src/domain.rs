use std::fmt;
use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use rustyline::error::ReadlineError;

use crate::catalog::TableDefinition;
use crate::store::RowId;
use crate::view::FilterCondition;

pub const HELP_TEXT: &str = r#"Commands:
  tables [query]                 list tables, optionally filtered by name
  open <project/table>           open a table
  search <text>                  free text search over all fields ("search" alone clears)
  filter <col> <op> <value>...   add a filter (ops: equals contains startsWith endsWith gt lt)
  filters                        show active filters
  clear                          drop all filters
  page <n> | next | prev         move between pages
  select <id> | select all       toggle row selection
  expand <id> <column>           toggle full rendering of a cell
  insert col=value ...           insert a row (missing columns get defaults)
  delete <id> | delete selected  delete rows
  copy <id> [column]             copy a row or a cell as JSON to the clipboard
  export <path>                  write the visible rows as JSON
  create <table> col:type ...    create a table in the current project
  import <file>                  load a csv, parquet or arrow file as a new table
  connect <type> <name> <url>    connect a (simulated) database
  refresh                        reload the current table
  help                           show this text
  quit                           leave the shell"#;

#[derive(Debug)]
pub enum DashError {
    IoError(Error),
    PolarsError(PolarsError),
    JsonError(serde_json::Error),
    ReadlineError(ReadlineError),
    LoadingFailed(String),
    FileNotFound,
    PermissionDenied,
    UnknownFileType,
    UnknownProject(String),
    UnknownTable(String),
    UnknownColumn(String),
    UnknownRow(RowId),
    DuplicateTable(String),
    InvalidTable(String),
    InvalidValue { column: String, reason: String },
    InvalidCommand(String),
    MissingFields,
    NoTableOpen,
    Cancelled,
    Clipboard(String),
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::IoError(e) => write!(f, "I/O error: {e}"),
            DashError::PolarsError(e) => write!(f, "Loading data failed: {e}"),
            DashError::JsonError(e) => write!(f, "JSON error: {e}"),
            DashError::ReadlineError(e) => write!(f, "Input error: {e}"),
            DashError::LoadingFailed(reason) => write!(f, "Loading failed: {reason}"),
            DashError::FileNotFound => write!(f, "File not found"),
            DashError::PermissionDenied => write!(f, "Permission denied"),
            DashError::UnknownFileType => write!(f, "Unknown file type"),
            DashError::UnknownProject(name) => write!(f, "Unknown project \"{name}\""),
            DashError::UnknownTable(name) => write!(f, "Unknown table \"{name}\""),
            DashError::UnknownColumn(name) => write!(f, "Unknown column \"{name}\""),
            DashError::UnknownRow(id) => write!(f, "No row with id {id}"),
            DashError::DuplicateTable(name) => write!(f, "Table \"{name}\" already exists"),
            DashError::InvalidTable(reason) => write!(f, "Invalid table definition: {reason}"),
            DashError::InvalidValue { column, reason } => {
                write!(f, "Invalid value for \"{column}\": {reason}")
            }
            DashError::InvalidCommand(reason) => write!(f, "{reason}"),
            DashError::MissingFields => write!(f, "Please fill in all required fields"),
            DashError::NoTableOpen => write!(f, "No table selected"),
            DashError::Cancelled => write!(f, "Operation cancelled"),
            DashError::Clipboard(reason) => write!(f, "Clipboard unavailable: {reason}"),
        }
    }
}

impl std::error::Error for DashError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DashError::IoError(e) => Some(e),
            DashError::PolarsError(e) => Some(e),
            DashError::JsonError(e) => Some(e),
            DashError::ReadlineError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for DashError {
    fn from(err: Error) -> Self {
        DashError::IoError(err)
    }
}

impl From<PolarsError> for DashError {
    fn from(err: PolarsError) -> Self {
        DashError::PolarsError(err)
    }
}

impl From<serde_json::Error> for DashError {
    fn from(err: serde_json::Error) -> Self {
        DashError::JsonError(err)
    }
}

impl From<ReadlineError> for DashError {
    fn from(err: ReadlineError) -> Self {
        DashError::ReadlineError(err)
    }
}

/// Runtime settings. Defaults match the demo dashboard, the CLI overrides single fields.
#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct DashConfig {
    pub page_size: usize,
    pub max_column_width: usize,
    pub connect_delay_ms: u64,
    pub refresh_delay_ms: u64,
    pub connect_success_rate: f64,
    #[setters(strip_option)]
    pub history_file: Option<PathBuf>,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            max_column_width: 24,
            connect_delay_ms: 2000,
            refresh_delay_ms: 800,
            connect_success_rate: 0.9,
            history_file: dirs::home_dir().map(|mut path| {
                path.push(".dbdash_history");
                path
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    OpenTable(String),
    Search(String),
    ApplyFilters(Vec<FilterCondition>),
    ClearFilters,
    GotoPage(usize),
    NextPage,
    PrevPage,
    ToggleSelect(RowId),
    ToggleSelectAll,
    ToggleExpand(RowId, String),
    Insert(Vec<(String, String)>),
    Delete(RowId),
    DeleteSelected,
    CopyRow(RowId),
    CopyCell(RowId, String),
    Export(PathBuf),
    CreateTable(TableDefinition),
    ImportFile(PathBuf),
    Refresh,
    Help,
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_produce_new_config() {
        let cfg = DashConfig::default().with_page_size(3).with_connect_delay_ms(0);
        assert_eq!(cfg.page_size, 3);
        assert_eq!(cfg.connect_delay_ms, 0);
        assert_eq!(cfg.max_column_width, 24);
    }

    #[test]
    fn io_errors_convert() {
        let err: DashError = Error::new(std::io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, DashError::IoError(_)));
        assert_eq!(err.to_string(), "I/O error: boom");
    }
}
