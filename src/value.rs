use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::domain::DashError;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Accepted spellings for timestamps typed by the user
const TIMESTAMP_INPUT_FORMATS: [&str; 4] = [
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Text,
    Integer,
    Boolean,
    Timestamp,
    Date,
    Float,
    Uuid,
    Json,
}

impl ColumnType {
    pub fn tag(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Float => "float",
            ColumnType::Uuid => "uuid",
            ColumnType::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ColumnType {
    type Err = DashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "varchar" | "string" => Ok(ColumnType::Text),
            "integer" | "int" | "int4" | "int8" | "bigint" => Ok(ColumnType::Integer),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "timestamp" | "datetime" => Ok(ColumnType::Timestamp),
            "date" => Ok(ColumnType::Date),
            "float" | "float8" | "double" => Ok(ColumnType::Float),
            "uuid" => Ok(ColumnType::Uuid),
            "json" | "jsonb" => Ok(ColumnType::Json),
            other => Err(DashError::InvalidValue {
                column: "type".to_string(),
                reason: format!("unknown column type \"{other}\""),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub primary: bool,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType) -> Self {
        Column {
            name: name.into(),
            dtype,
            primary: false,
            nullable: true,
        }
    }

    pub fn primary(name: impl Into<String>, dtype: ColumnType) -> Self {
        Column {
            name: name.into(),
            dtype,
            primary: true,
            nullable: false,
        }
    }
}

/// A single cell. `as_text` is the canonical string form that search and filters compare against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::Uuid(u) => u.hyphenated().to_string(),
            Value::Json(j) => j.to_string(),
        }
    }

    /// Convert user input into a typed value. Empty input is `Null` for every non-text type.
    pub fn parse(column: &Column, input: &str) -> Result<Value, DashError> {
        let trimmed = input.trim();
        if column.dtype != ColumnType::Text && trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let invalid = |reason: String| DashError::InvalidValue {
            column: column.name.clone(),
            reason,
        };
        match column.dtype {
            ColumnType::Text => Ok(Value::Text(input.to_string())),
            ColumnType::Integer => trimmed
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| invalid(format!("\"{trimmed}\" is not an integer ({e})"))),
            ColumnType::Float => trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| invalid(format!("\"{trimmed}\" is not a number ({e})"))),
            ColumnType::Boolean => match trimmed.to_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "no" | "0" => Ok(Value::Boolean(false)),
                _ => Err(invalid(format!("\"{trimmed}\" is not a boolean"))),
            },
            ColumnType::Timestamp => TIMESTAMP_INPUT_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(Value::Timestamp)
                .ok_or_else(|| invalid(format!("\"{trimmed}\" is not a timestamp"))),
            ColumnType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(Value::Date)
                .map_err(|e| invalid(format!("\"{trimmed}\" is not a date ({e})"))),
            ColumnType::Uuid => Uuid::parse_str(trimmed)
                .map(Value::Uuid)
                .map_err(|e| invalid(format!("\"{trimmed}\" is not a uuid ({e})"))),
            ColumnType::Json => serde_json::from_str(trimmed)
                .map(Value::Json)
                .map_err(|e| invalid(format!("invalid JSON ({e})"))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Json(j) => j.serialize(serializer),
            Value::Timestamp(_) | Value::Date(_) | Value::Uuid(_) => {
                serializer.serialize_str(&self.as_text())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn column_type_aliases() {
        assert_eq!("varchar".parse::<ColumnType>().unwrap(), ColumnType::Text);
        assert_eq!("INT4".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert_eq!("TIMESTAMP".parse::<ColumnType>().unwrap(), ColumnType::Timestamp);
        assert!("blob".parse::<ColumnType>().is_err());
    }

    #[test]
    fn canonical_text() {
        assert_eq!(Value::Integer(42).as_text(), "42");
        assert_eq!(Value::Float(2.5).as_text(), "2.5");
        assert_eq!(Value::Boolean(false).as_text(), "false");
        assert_eq!(Value::Null.as_text(), "null");
        assert_eq!(
            Value::Json(json!({"tags": ["a", "b"]})).as_text(),
            r#"{"tags":["a","b"]}"#
        );
    }

    #[test]
    fn parse_typed_input() {
        let ts = Column::new("created_at", ColumnType::Timestamp);
        let v = Value::parse(&ts, "2024-01-15T09:24").unwrap();
        assert_eq!(v.as_text(), "2024-01-15 09:24:00");

        let age = Column::new("age", ColumnType::Integer);
        assert_eq!(Value::parse(&age, " 7 ").unwrap(), Value::Integer(7));
        assert_eq!(Value::parse(&age, "").unwrap(), Value::Null);
        assert!(matches!(
            Value::parse(&age, "seven"),
            Err(DashError::InvalidValue { .. })
        ));

        let name = Column::new("name", ColumnType::Text);
        assert_eq!(Value::parse(&name, "").unwrap(), Value::Text(String::new()));
    }

    #[test]
    fn serializes_as_json() {
        let out = serde_json::to_value(vec![
            Value::Integer(1),
            Value::Null,
            Value::Json(json!({"a": 1})),
        ])
        .unwrap();
        assert_eq!(out, json!([1, null, {"a": 1}]));
    }
}
