//! Search, filter and pagination over an in-memory row set.
//!
//! [`compute_view`] never mutates its input. The returned [`PageView`] borrows the rows it
//! shows, so every visible row is one of the input rows, in input order.

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use tracing::trace;

use crate::store::Row;

// Below this many rows the sequential scan is faster than spinning up rayon
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    /// Unrecognized operators let every row pass.
    Other(String),
}

impl FilterOperator {
    pub fn name(&self) -> &str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
            FilterOperator::GreaterThan => "gt",
            FilterOperator::LessThan => "lt",
            FilterOperator::Other(name) => name,
        }
    }

    /// Both sides are expected lower-cased already.
    fn matches(&self, field: &str, value: &str) -> bool {
        match self {
            FilterOperator::Equals => field == value,
            FilterOperator::Contains => field.contains(value),
            FilterOperator::StartsWith => field.starts_with(value),
            FilterOperator::EndsWith => field.ends_with(value),
            FilterOperator::GreaterThan => compare_numeric(field, value, |a, b| a > b),
            FilterOperator::LessThan => compare_numeric(field, value, |a, b| a < b),
            FilterOperator::Other(_) => true,
        }
    }
}

// Only finite numbers order, so "inf" or "nan" text never matches
fn compare_numeric(field: &str, value: &str, cmp: fn(f64, f64) -> bool) -> bool {
    match (field.trim().parse::<f64>(), value.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) if a.is_finite() && b.is_finite() => cmp(a, b),
        _ => false,
    }
}

impl FromStr for FilterOperator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "equals" | "=" | "==" => FilterOperator::Equals,
            "contains" => FilterOperator::Contains,
            "startsWith" => FilterOperator::StartsWith,
            "endsWith" => FilterOperator::EndsWith,
            "gt" | ">" => FilterOperator::GreaterThan,
            "lt" | "<" => FilterOperator::LessThan,
            other => FilterOperator::Other(other.to_string()),
        })
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        FilterCondition {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// A filter with a blank value is ignored rather than matching everything.
    pub fn is_active(&self) -> bool {
        !self.value.trim().is_empty()
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} \"{}\"", self.column, self.operator, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageView<'a> {
    pub rows: Vec<&'a Row>,
    pub total_filtered: usize,
    pub page_count: usize,
    pub page: usize,
}

// Filter prepared once per call: value lower-cased up front
struct PreparedFilter<'f> {
    column: &'f str,
    operator: &'f FilterOperator,
    value: String,
}

fn row_matches(row: &Row, search: Option<&str>, filters: &[PreparedFilter]) -> bool {
    if let Some(term) = search
        && !row
            .fields
            .values()
            .any(|v| v.as_text().to_lowercase().contains(term))
    {
        return false;
    }
    filters.iter().all(|f| {
        let field = row
            .get(f.column)
            .map(|v| v.as_text().to_lowercase())
            .unwrap_or_default();
        f.operator.matches(&field, &f.value)
    })
}

/// Returns the indices of `rows` that pass the search and every active filter, in order.
pub fn matching_indices(rows: &[Row], search_text: &str, filters: &[FilterCondition]) -> Vec<usize> {
    let term = search_text.trim().to_lowercase();
    let search = (!term.is_empty()).then_some(term.as_str());
    let prepared: Vec<PreparedFilter> = filters
        .iter()
        .filter(|f| f.is_active())
        .map(|f| PreparedFilter {
            column: &f.column,
            operator: &f.operator,
            value: f.value.to_lowercase(),
        })
        .collect();

    if rows.len() >= PARALLEL_SCAN_THRESHOLD {
        // Indexed collect keeps the input order
        rows.par_iter()
            .enumerate()
            .filter(|(_, row)| row_matches(row, search, &prepared))
            .map(|(idx, _)| idx)
            .collect()
    } else {
        rows.iter()
            .enumerate()
            .filter(|(_, row)| row_matches(row, search, &prepared))
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Number of pages for `total` rows; zero rows means zero pages.
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

/// Clamp a requested page into `[1, max(1, page_count)]`.
pub fn clamp_page(page: usize, page_count: usize) -> usize {
    page.clamp(1, page_count.max(1))
}

pub fn compute_view<'a>(
    rows: &'a [Row],
    search_text: &str,
    filters: &[FilterCondition],
    page: usize,
    page_size: usize,
) -> PageView<'a> {
    let page_size = page_size.max(1);
    let matches = matching_indices(rows, search_text, filters);
    let total_filtered = matches.len();
    let page_count = page_count(total_filtered, page_size);
    let page = clamp_page(page, page_count);

    let begin = std::cmp::min((page - 1) * page_size, total_filtered);
    let end = std::cmp::min(begin + page_size, total_filtered);
    trace!(
        "View: search \"{}\", {} filters, {} of {} rows, page {}/{}, slice {}..{}",
        search_text,
        filters.len(),
        total_filtered,
        rows.len(),
        page,
        page_count,
        begin,
        end
    );

    PageView {
        rows: matches[begin..end].iter().map(|&idx| &rows[idx]).collect(),
        total_filtered,
        page_count,
        page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;
    use crate::value::{Column, ColumnType, Value};
    use serde_json::json;

    fn table() -> Table {
        Table::new(
            "t",
            vec![
                Column::primary("id", ColumnType::Integer),
                Column::new("name", ColumnType::Text),
                Column::new("score", ColumnType::Float),
                Column::new("meta", ColumnType::Json),
            ],
        )
        .with_records(vec![
            vec![
                ("id", Value::Integer(1)),
                ("name", Value::Text("Alice".into())),
                ("score", Value::Float(9.5)),
                ("meta", Value::Json(json!({"team": "Red"}))),
            ],
            vec![
                ("id", Value::Integer(2)),
                ("name", Value::Text("Bob".into())),
                ("score", Value::Float(3.0)),
                ("meta", Value::Json(json!({"team": "Blue"}))),
            ],
            vec![("id", Value::Integer(3)), ("name", Value::Text("Carol".into()))],
        ])
        .unwrap()
    }

    fn ids(view: &PageView) -> Vec<String> {
        view.rows.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn search_is_case_insensitive_and_trimmed() {
        let t = table();
        let view = compute_view(t.rows(), "  aLiCe ", &[], 1, 10);
        assert_eq!(ids(&view), vec!["1"]);
    }

    #[test]
    fn search_looks_into_json() {
        let t = table();
        let view = compute_view(t.rows(), "blue", &[], 1, 10);
        assert_eq!(ids(&view), vec!["2"]);
        let view = compute_view(t.rows(), "\"team\":\"red\"", &[], 1, 10);
        assert_eq!(ids(&view), vec!["1"]);
    }

    #[test]
    fn operators() {
        let t = table();
        let run = |op: &str, column: &str, value: &str| {
            let f = FilterCondition::new(column, op.parse().unwrap(), value);
            ids(&compute_view(t.rows(), "", &[f], 1, 10))
        };
        assert_eq!(run("equals", "name", "bob"), vec!["2"]);
        assert_eq!(run("contains", "name", "AR"), vec!["3"]);
        assert_eq!(run("endsWith", "name", "e"), vec!["1"]);
        assert_eq!(run("gt", "score", "4"), vec!["1"]);
        assert_eq!(run("lt", "score", "4"), vec!["2"]);
        // Non-numeric fields never pass gt/lt
        assert_eq!(run("gt", "name", "0"), Vec::<String>::new());
        assert_eq!(run("lt", "name", "abc"), Vec::<String>::new());
        // Unknown operators pass everything through
        assert_eq!(run("regex", "name", "zzz"), vec!["1", "2", "3"]);
    }

    #[test]
    fn infinity_spelled_as_text_is_not_numeric() {
        let t = Table::new("t", vec![Column::new("name", ColumnType::Text)])
            .with_records(vec![
                vec![("id", Value::Integer(1)), ("name", Value::Text("Infinity".into()))],
                vec![("id", Value::Integer(2)), ("name", Value::Text("Inf".into()))],
                vec![("id", Value::Integer(3)), ("name", Value::Text("NaN".into()))],
                vec![("id", Value::Integer(4)), ("name", Value::Text("Bob".into()))],
            ])
            .unwrap();
        let gt = FilterCondition::new("name", FilterOperator::GreaterThan, "100");
        assert_eq!(compute_view(t.rows(), "", &[gt], 1, 10).total_filtered, 0);
        let lt = FilterCondition::new("name", FilterOperator::LessThan, "100");
        assert_eq!(compute_view(t.rows(), "", &[lt], 1, 10).total_filtered, 0);
        let against_inf = FilterCondition::new("id", FilterOperator::LessThan, "inf");
        assert_eq!(compute_view(t.rows(), "", &[against_inf], 1, 10).total_filtered, 0);
    }

    #[test]
    fn missing_field_compares_as_empty() {
        let t = table();
        let f = FilterCondition::new("score", FilterOperator::Contains, "3");
        assert_eq!(ids(&compute_view(t.rows(), "", &[f], 1, 10)), vec!["2"]);
        let f = FilterCondition::new("nope", FilterOperator::Contains, "a");
        assert_eq!(compute_view(t.rows(), "", &[f], 1, 10).total_filtered, 0);
    }

    #[test]
    fn blank_filters_are_inactive() {
        let t = table();
        let f = FilterCondition::new("name", FilterOperator::Equals, "   ");
        assert!(!f.is_active());
        assert_eq!(compute_view(t.rows(), "", &[f], 1, 10).total_filtered, 3);
    }

    #[test]
    fn empty_input_has_one_clamped_page() {
        let view = compute_view(&[], "", &[], 7, 10);
        assert_eq!(view.page_count, 0);
        assert_eq!(view.page, 1);
        assert!(view.rows.is_empty());
    }

    #[test]
    fn zero_page_size_is_treated_as_one() {
        let t = table();
        let view = compute_view(t.rows(), "", &[], 2, 0);
        assert_eq!(view.page_count, 3);
        assert_eq!(ids(&view), vec!["2"]);
    }

    #[test]
    fn parallel_scan_keeps_order() {
        let records = (0..(PARALLEL_SCAN_THRESHOLD as i64 * 2))
            .map(|i| {
                vec![
                    ("id", Value::Integer(i)),
                    ("name", Value::Text(if i % 3 == 0 { "fizz" } else { "buzz" }.into())),
                ]
            })
            .collect();
        let t = Table::new("big", vec![Column::new("name", ColumnType::Text)])
            .with_records(records)
            .unwrap();
        let idx = matching_indices(t.rows(), "fizz", &[]);
        assert!(idx.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(idx.len(), PARALLEL_SCAN_THRESHOLD * 2 / 3 + 1);
    }
}
