use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Timelike, Utc};
use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::DashError;
use crate::value::{Column, ColumnType, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RowId {
    Integer(i64),
    Text(String),
}

impl RowId {
    fn from_value(value: &Value) -> Option<RowId> {
        match value {
            Value::Integer(i) => Some(RowId::Integer(*i)),
            Value::Null => None,
            other => Some(RowId::Text(other.as_text())),
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Integer(i) => write!(f, "{i}"),
            RowId::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for RowId {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DashError::InvalidCommand("Missing row id".to_string()));
        }
        Ok(s.parse::<i64>()
            .map(RowId::Integer)
            .unwrap_or_else(|_| RowId::Text(s.to_string())))
    }
}

impl From<i64> for RowId {
    fn from(id: i64) -> Self {
        RowId::Integer(id)
    }
}

/// A record. `fields` always contains the primary column, holding the same value as `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    columns: Vec<Column>,
    rows: Vec<Row>, // Newest first
    last_id: i64,
}

impl Table {
    /// Creates an empty table. Without a primary column, a column called `id` becomes the
    /// primary key, or an integer `id` column is added in front.
    pub fn new(name: impl Into<String>, mut columns: Vec<Column>) -> Self {
        if !columns.iter().any(|c| c.primary) {
            match columns.iter_mut().find(|c| c.name == "id") {
                Some(column) => {
                    column.primary = true;
                    column.nullable = false;
                }
                None => columns.insert(0, Column::primary("id", ColumnType::Integer)),
            }
        }
        Table {
            name: name.into(),
            columns,
            rows: Vec::new(),
            last_id: 0,
        }
    }

    /// Fills the table from `(column, value)` records, kept in the given order.
    pub fn with_records(
        mut self,
        records: Vec<Vec<(&str, Value)>>,
    ) -> Result<Self, DashError> {
        let primary = self.primary_column().name.clone();
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut fields = BTreeMap::new();
            for (name, value) in record {
                if self.column(name).is_none() {
                    return Err(DashError::UnknownColumn(name.to_string()));
                }
                fields.insert(name.to_string(), value);
            }
            let id = fields
                .get(&primary)
                .and_then(RowId::from_value)
                .ok_or_else(|| DashError::InvalidValue {
                    column: primary.clone(),
                    reason: "primary key is missing".to_string(),
                })?;
            if !seen.insert(id.clone()) {
                return Err(DashError::InvalidValue {
                    column: primary.clone(),
                    reason: format!("duplicate key {id}"),
                });
            }
            if let RowId::Integer(i) = id {
                self.last_id = self.last_id.max(i);
            }
            rows.push(Row { id, fields });
        }
        self.rows = rows;
        Ok(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_column(&self) -> &Column {
        // `new` guarantees a primary column
        self.columns
            .iter()
            .find(|c| c.primary)
            .unwrap_or(&self.columns[0])
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &RowId) -> Option<&Row> {
        self.rows.iter().find(|r| &r.id == id)
    }

    /// Reads a typed-in id the way the primary column stores it, so `2` finds a text key
    /// `"2"` and an upper case uuid finds its stored lower case form.
    pub fn parse_id(&self, input: &str) -> Result<RowId, DashError> {
        let value = Value::parse(self.primary_column(), input.trim())?;
        RowId::from_value(&value)
            .ok_or_else(|| DashError::InvalidCommand("Missing row id".to_string()))
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.get(id).is_some()
    }

    /// Inserts a row built from `column=value` text pairs and returns its new id.
    /// Empty or missing values fall back to the column default.
    pub fn insert(&mut self, partial: &[(String, String)]) -> Result<RowId, DashError> {
        let primary = self.primary_column().clone();
        let mut fields = BTreeMap::new();
        for (name, raw) in partial {
            let column = self
                .column(name)
                .ok_or_else(|| DashError::UnknownColumn(name.clone()))?;
            if column.primary {
                return Err(DashError::InvalidValue {
                    column: name.clone(),
                    reason: "the primary key is generated".to_string(),
                });
            }
            if !raw.trim().is_empty() {
                fields.insert(name.clone(), Value::parse(column, raw)?);
            }
        }

        for column in self.columns.iter().filter(|c| !c.primary) {
            if !fields.contains_key(&column.name) {
                fields.insert(column.name.clone(), Self::default_value(column.dtype));
            }
        }

        let (id, key) = self.next_id(&primary)?;
        fields.insert(primary.name.clone(), key);
        trace!("Insert into {}: {id} -> {:?}", self.name, fields);
        self.rows.insert(0, Row { id: id.clone(), fields });
        debug!("Inserted row {id} into {}, {} rows", self.name, self.rows.len());
        Ok(id)
    }

    /// Removes the row with `id`. Unknown ids are ignored.
    pub fn delete(&mut self, id: &RowId) -> bool {
        match self.rows.iter().position(|r| &r.id == id) {
            Some(pos) => {
                self.rows.remove(pos);
                debug!("Deleted row {id} from {}", self.name);
                true
            }
            None => {
                trace!("Delete of unknown row {id} in {}", self.name);
                false
            }
        }
    }

    // Integer keys grow from max(now in ms, last id + 1). Once i64::MAX is taken the
    // search continues downwards from the last id.
    fn next_id(&mut self, primary: &Column) -> Result<(RowId, Value), DashError> {
        match primary.dtype {
            ColumnType::Integer => {
                let is_free = |candidate: &i64| !self.contains(&RowId::Integer(*candidate));
                let candidate = self
                    .last_id
                    .checked_add(1)
                    .map(|next| next.max(Utc::now().timestamp_millis()))
                    .and_then(|start| (start..=i64::MAX).find(is_free))
                    .or_else(|| (1..self.last_id).rev().find(is_free))
                    .ok_or_else(|| DashError::InvalidValue {
                        column: primary.name.clone(),
                        reason: "no free key left".to_string(),
                    })?;
                self.last_id = self.last_id.max(candidate);
                Ok((RowId::Integer(candidate), Value::Integer(candidate)))
            }
            ColumnType::Uuid => {
                let id = Uuid::new_v4();
                Ok((RowId::Text(id.hyphenated().to_string()), Value::Uuid(id)))
            }
            _ => {
                let id = Uuid::new_v4().hyphenated().to_string();
                Ok((RowId::Text(id.clone()), Value::Text(id)))
            }
        }
    }

    fn default_value(dtype: ColumnType) -> Value {
        let now = Utc::now().naive_utc();
        match dtype {
            ColumnType::Text => Value::Text(String::new()),
            ColumnType::Timestamp => Value::Timestamp(now.with_nanosecond(0).unwrap_or(now)),
            ColumnType::Date => Value::Date(now.date()),
            ColumnType::Uuid => Value::Uuid(Uuid::new_v4()),
            ColumnType::Integer | ColumnType::Float | ColumnType::Boolean | ColumnType::Json => {
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn people() -> Table {
        Table::new(
            "people",
            vec![
                Column::primary("id", ColumnType::Integer),
                Column::new("name", ColumnType::Text),
                Column::new("created_at", ColumnType::Timestamp),
            ],
        )
        .with_records(vec![
            vec![("id", Value::Integer(1)), ("name", Value::Text("Alice".into()))],
            vec![("id", Value::Integer(2)), ("name", Value::Text("Bob".into()))],
        ])
        .unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn adds_primary_key_when_missing() {
        let table = Table::new("t", vec![Column::new("name", ColumnType::Text)]);
        assert_eq!(table.primary_column().name, "id");
        assert_eq!(table.columns().len(), 2);

        let table = Table::new(
            "t",
            vec![
                Column::new("name", ColumnType::Text),
                Column::new("id", ColumnType::Uuid),
            ],
        );
        assert_eq!(table.primary_column().dtype, ColumnType::Uuid);
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn insert_prepends_and_fills_defaults() {
        let mut table = people();
        let id = table.insert(&pairs(&[("name", "Carol")])).unwrap();

        let first = &table.rows()[0];
        assert_eq!(first.id, id);
        assert_eq!(first.get("name"), Some(&Value::Text("Carol".into())));
        assert!(matches!(first.get("created_at"), Some(Value::Timestamp(_))));
        assert_eq!(first.get("id"), Some(&Value::Integer(match id {
            RowId::Integer(i) => i,
            RowId::Text(_) => panic!("integer key expected"),
        })));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn inserted_ids_are_unique() {
        let mut table = people();
        let a = table.insert(&[]).unwrap();
        let b = table.insert(&[]).unwrap();
        let c = table.insert(&[]).unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn insert_rejects_unknown_and_invalid_columns() {
        let mut table = people();
        assert!(matches!(
            table.insert(&pairs(&[("nope", "x")])),
            Err(DashError::UnknownColumn(_))
        ));
        assert!(matches!(
            table.insert(&pairs(&[("created_at", "yesterday")])),
            Err(DashError::InvalidValue { .. })
        ));
        assert!(matches!(
            table.insert(&pairs(&[("id", "9")])),
            Err(DashError::InvalidValue { .. })
        ));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn delete_is_noop_for_unknown_ids() {
        let mut table = people();
        assert!(table.delete(&RowId::Integer(1)));
        assert!(!table.delete(&RowId::Integer(1)));
        assert!(!table.delete(&RowId::Text("ghost".into())));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn duplicate_records_are_rejected() {
        let result = Table::new("t", vec![Column::primary("id", ColumnType::Integer)])
            .with_records(vec![
                vec![("id", Value::Integer(1))],
                vec![("id", Value::Integer(1))],
            ]);
        assert!(result.is_err());
    }

    #[test]
    fn insert_after_largest_key_does_not_overflow() {
        let mut table = Table::new(
            "t",
            vec![
                Column::primary("id", ColumnType::Integer),
                Column::new("name", ColumnType::Text),
            ],
        )
        .with_records(vec![vec![("id", Value::Integer(i64::MAX))]])
        .unwrap();
        let first = table.insert(&pairs(&[("name", "y")])).unwrap();
        assert_eq!(first, RowId::Integer(i64::MAX - 1));
        let second = table.insert(&pairs(&[("name", "z")])).unwrap();
        assert_eq!(second, RowId::Integer(i64::MAX - 2));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn typed_ids_follow_the_key_column() {
        let numeric_text = Table::new("t", vec![Column::primary("code", ColumnType::Text)])
            .with_records(vec![
                vec![("code", Value::Text("a1".into()))],
                vec![("code", Value::Text("2".into()))],
            ])
            .unwrap();
        let id = numeric_text.parse_id("2").unwrap();
        assert_eq!(id, RowId::Text("2".into()));
        assert!(numeric_text.contains(&id));

        let uuid = Uuid::from_u128(0xabcdef);
        let keyed = Table::new("s", vec![Column::primary("id", ColumnType::Uuid)])
            .with_records(vec![vec![("id", Value::Uuid(uuid))]])
            .unwrap();
        let typed = uuid.hyphenated().to_string().to_uppercase();
        assert!(keyed.contains(&keyed.parse_id(&typed).unwrap()));

        assert_eq!(people().parse_id(" 2 ").unwrap(), RowId::Integer(2));
        assert!(people().parse_id("two").is_err());
    }

    #[test]
    fn row_id_parsing() {
        assert_eq!("12".parse::<RowId>().unwrap(), RowId::Integer(12));
        assert_eq!("abc".parse::<RowId>().unwrap(), RowId::Text("abc".into()));
        assert!("  ".parse::<RowId>().is_err());
    }
}
