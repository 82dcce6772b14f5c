use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use arboard::Clipboard;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tracing::{debug, info, trace};

use crate::domain::DashError;
use crate::store::Row;
use crate::value::{Column, Value};

/// A row serialized as an object whose keys follow the table's column order.
struct RowObject<'a> {
    columns: &'a [Column],
    row: &'a Row,
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            map.serialize_entry(&column.name, self.row.get(&column.name).unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}

struct RowList<'a> {
    columns: &'a [Column],
    rows: &'a [&'a Row],
}

impl Serialize for RowList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.rows {
            seq.serialize_element(&RowObject {
                columns: self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

pub fn rows_to_json(columns: &[Column], rows: &[&Row]) -> Result<String, DashError> {
    Ok(serde_json::to_string_pretty(&RowList { columns, rows })?)
}

pub fn row_to_json(columns: &[Column], row: &Row) -> Result<String, DashError> {
    Ok(serde_json::to_string_pretty(&RowObject { columns, row })?)
}

pub fn cell_to_json(value: &Value) -> Result<String, DashError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Expands `~` and environment variables in a user supplied path.
pub fn expand_path(path: &Path) -> Result<PathBuf, DashError> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .map_err(|e| DashError::IoError(io::Error::new(io::ErrorKind::InvalidInput, e.to_string())))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

pub fn write_export(path: &Path, content: &str) -> Result<PathBuf, DashError> {
    let target = expand_path(path)?;
    fs::write(&target, content)?;
    info!("Exported {} bytes to {}", content.len(), target.display());
    Ok(target)
}

pub trait ClipboardSink {
    fn set_text(&mut self, text: String) -> Result<(), DashError>;
}

/// The system clipboard, opened on first use so headless runs never touch it.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<Clipboard>,
}

impl ClipboardSink for SystemClipboard {
    fn set_text(&mut self, text: String) -> Result<(), DashError> {
        if self.inner.is_none() {
            let clipboard = Clipboard::new().map_err(|e| DashError::Clipboard(e.to_string()))?;
            self.inner = Some(clipboard);
        }
        if let Some(clipboard) = self.inner.as_mut() {
            clipboard
                .set_text(text)
                .map_err(|e| DashError::Clipboard(e.to_string()))?;
            trace!("Copied content to clipboard.");
        }
        Ok(())
    }
}

/// In-process clipboard. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn text(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|c| c.clone())
    }
}

impl ClipboardSink for MemoryClipboard {
    fn set_text(&mut self, text: String) -> Result<(), DashError> {
        debug!("Memory clipboard holds {} bytes", text.len());
        let mut guard = self
            .contents
            .lock()
            .map_err(|e| DashError::Clipboard(e.to_string()))?;
        *guard = Some(text);
        Ok(())
    }
}
