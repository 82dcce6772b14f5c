use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use polars::error::PolarsError;
use polars::prelude::{
    DataFrame, DataType, LazyCsvReader, LazyFileListReader, LazyFrame, PlPath, ScanArgsParquet,
    UnifiedScanArgs,
};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::catalog::normalize_identifier;
use crate::domain::DashError;
use crate::export::expand_path;
use crate::store::Table;
use crate::value::{Column, ColumnType, DATE_FORMAT, TIMESTAMP_FORMAT, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    Csv,
    Parquet,
    Arrow,
}

#[derive(Debug)]
struct FileInfo {
    path: PathBuf,
    file_size: u64,
    file_type: FileType,
}

// One converted column, typed values in file order
struct LoadedColumn {
    column: Column,
    values: Vec<Value>,
}

fn detect_file_type(path: &Path) -> Result<FileType, DashError> {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase())
        .as_deref()
    {
        Some("CSV") => Ok(FileType::Csv),
        Some("PARQUET") | Some("PQ") => Ok(FileType::Parquet),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::Arrow),
        _ => Err(DashError::UnknownFileType),
    }
}

fn get_file_info(path: &Path) -> Result<FileInfo, DashError> {
    let path = expand_path(path)?;
    let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DashError::FileNotFound,
        ErrorKind::PermissionDenied => DashError::PermissionDenied,
        _ => DashError::IoError(e),
    })?;
    if !metadata.is_file() {
        return Err(DashError::LoadingFailed("Not a file!".into()));
    }
    let file_type = detect_file_type(&path)?;
    Ok(FileInfo {
        file_size: metadata.len(),
        path,
        file_type,
    })
}

fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .finish()
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

fn column_type(dtype: &DataType) -> ColumnType {
    match dtype {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float32 | DataType::Float64 => ColumnType::Float,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Date => ColumnType::Date,
        DataType::Datetime(_, _) => ColumnType::Timestamp,
        _ => ColumnType::Text,
    }
}

fn parse_temporal(dtype: ColumnType, s: &str) -> Value {
    let parsed = match dtype {
        ColumnType::Date => NaiveDate::parse_from_str(s, DATE_FORMAT).ok().map(Value::Date),
        // Drop fractional seconds polars appends when casting to string
        _ => s
            .get(..19)
            .and_then(|head| NaiveDateTime::parse_from_str(head, TIMESTAMP_FORMAT).ok())
            .map(Value::Timestamp),
    };
    parsed.unwrap_or_else(|| Value::Text(s.to_string()))
}

fn load_column(df: &DataFrame, name: &str) -> Result<LoadedColumn, PolarsError> {
    let source = df.column(name)?;
    let dtype = column_type(source.dtype());

    let values: Vec<Value> = match dtype {
        ColumnType::Integer => {
            let col = source.cast(&DataType::Int64)?;
            col.i64()?
                .into_iter()
                .map(|v| v.map(Value::Integer).unwrap_or(Value::Null))
                .collect()
        }
        ColumnType::Float => {
            let col = source.cast(&DataType::Float64)?;
            col.f64()?
                .into_iter()
                .map(|v| v.map(Value::Float).unwrap_or(Value::Null))
                .collect()
        }
        ColumnType::Boolean => source
            .bool()?
            .into_iter()
            .map(|v| v.map(Value::Boolean).unwrap_or(Value::Null))
            .collect(),
        _ => {
            let col = source.cast(&DataType::String)?;
            col.str()?
                .into_iter()
                .map(|v| match v {
                    Some(s) if dtype == ColumnType::Text => Value::Text(s.to_string()),
                    Some(s) => parse_temporal(dtype, s),
                    None => Value::Null,
                })
                .collect()
        }
    };

    Ok(LoadedColumn {
        column: Column::new(name, dtype),
        values,
    })
}

// An existing `id` column can be the key when it has no nulls and no duplicates
fn usable_as_key(values: &[Value]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| match v {
        Value::Integer(i) => seen.insert(i.to_string()),
        Value::Text(s) if !s.is_empty() => seen.insert(s.clone()),
        _ => false,
    })
}

// First of id, row_id, row_id_1, ... that the file does not use
fn free_key_name(loaded: &[LoadedColumn]) -> String {
    let taken = |name: &str| loaded.iter().any(|c| c.column.name == name);
    ["id".to_string(), "row_id".to_string()]
        .into_iter()
        .chain((1..).map(|n| format!("row_id_{n}")))
        .find(|name| !taken(name))
        .unwrap_or_else(|| "row_id".to_string())
}

/// Loads a CSV, Parquet or Arrow IPC file into a new table named after the file.
pub fn load_table(path: &Path) -> Result<Table, DashError> {
    let file_info = get_file_info(path)?;
    debug!("Loading {:?}", file_info);
    let frame = match file_info.file_type {
        FileType::Csv => load_csv(&file_info.path)?,
        FileType::Parquet => load_parquet(&file_info.path)?,
        FileType::Arrow => load_arrow(&file_info.path)?,
    };

    // Each column is converted on its own rayon worker.
    let start_time = Instant::now();
    let df = frame.collect()?;
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.as_str().to_string())
        .collect();
    let loaded: Result<Vec<LoadedColumn>, PolarsError> = names
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect();
    let mut loaded = loaded?;
    let nrows = df.height();

    let key_idx = loaded
        .iter()
        .position(|c| c.column.name == "id" && usable_as_key(&c.values));
    match key_idx {
        Some(idx) => {
            loaded[idx].column.primary = true;
            loaded[idx].column.nullable = false;
        }
        None => {
            let key_name = free_key_name(&loaded);
            loaded.insert(
                0,
                LoadedColumn {
                    column: Column::primary(key_name, ColumnType::Integer),
                    values: (1..=nrows as i64).map(Value::Integer).collect(),
                },
            );
        }
    }

    let table_name = file_info
        .path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(normalize_identifier)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "imported".to_string());

    let columns: Vec<Column> = loaded.iter().map(|c| c.column.clone()).collect();
    let records = (0..nrows)
        .map(|ridx| {
            loaded
                .iter()
                .map(|c| (c.column.name.as_str(), c.values[ridx].clone()))
                .collect()
        })
        .collect();
    let table = Table::new(table_name, columns).with_records(records)?;

    info!(
        "Loaded {} rows x {} columns ({} bytes) in {}ms ...",
        nrows,
        table.columns().len(),
        file_info.file_size,
        start_time.elapsed().as_millis()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sales Report.csv");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn detects_file_types() {
        assert_eq!(detect_file_type(Path::new("a.CSV")).unwrap(), FileType::Csv);
        assert_eq!(detect_file_type(Path::new("a.pq")).unwrap(), FileType::Parquet);
        assert_eq!(detect_file_type(Path::new("a.feather")).unwrap(), FileType::Arrow);
        assert!(matches!(
            detect_file_type(Path::new("a.xlsx")),
            Err(DashError::UnknownFileType)
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            load_table(Path::new("/definitely/not/here.csv")),
            Err(DashError::FileNotFound)
        ));
    }

    #[test]
    fn loads_csv_with_typed_columns() {
        let (_dir, path) = write_csv("name,qty,price\nbolt,10,0.25\nnut,,0.1\n");
        let table = load_table(&path).unwrap();
        assert_eq!(table.name, "sales_report");
        assert_eq!(table.primary_column().name, "id");
        assert_eq!(table.column("qty").unwrap().dtype, ColumnType::Integer);
        assert_eq!(table.column("price").unwrap().dtype, ColumnType::Float);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].get("name"), Some(&Value::Text("bolt".into())));
        assert_eq!(table.rows()[1].get("qty"), Some(&Value::Null));
    }

    #[test]
    fn keeps_unique_id_column_as_key() {
        let (_dir, path) = write_csv("id,name\n7,a\n9,b\n");
        let table = load_table(&path).unwrap();
        assert_eq!(table.columns().len(), 2);
        assert!(table.get(&crate::store::RowId::Integer(9)).is_some());
    }

    #[test]
    fn generated_key_avoids_existing_columns() {
        let (_dir, path) = write_csv("id,row_id,name\n1,,a\n1,,b\n");
        let table = load_table(&path).unwrap();
        assert_eq!(table.primary_column().name, "row_id_1");
        assert_eq!(table.columns().len(), 4);
        assert_eq!(table.len(), 2);
        assert!(table.get(&crate::store::RowId::Integer(2)).is_some());
    }

    #[test]
    fn duplicate_ids_get_a_generated_key() {
        let (_dir, path) = write_csv("id,name\n1,a\n1,b\n");
        let table = load_table(&path).unwrap();
        assert_eq!(table.primary_column().name, "row_id");
        assert_eq!(table.len(), 2);
    }
}
