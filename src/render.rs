use crate::catalog::TableEntry;
use crate::session::ViewState;
use crate::value::{Column, Value};
use crate::view::PageView;

pub const COLUMN_WIDTH_MARGIN: usize = 1;
pub const COLUMN_SEPARATOR: &str = " │ ";
const SELECT_MARKER_WIDTH: usize = 3;

fn display_len(s: &str) -> usize {
    s.chars().count()
}

/// Shorten `text` to `width` characters, ending in `...` when something was cut.
pub fn get_visible_text(text: &str, width: usize) -> String {
    if display_len(text) <= width {
        return text.to_string();
    }
    if width < 3 {
        return text.chars().take(width).collect();
    }
    let mut reduced: String = text.chars().take(width - 3).collect();
    reduced.push_str("...");
    reduced
}

pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::from("∅"),
        Some(v) => v.as_text().replace("\r\n", " ↵ ").replace('\n', " ↵ "),
    }
}

fn header_text(column: &Column) -> String {
    if column.primary {
        format!("{} PK {}", column.name, column.dtype)
    } else {
        format!("{} {}", column.name, column.dtype)
    }
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(display_len(text));
    format!("{text}{}", " ".repeat(fill))
}

/// Renders one page of rows as a text grid with a header and a footer line.
pub fn render_page(
    columns: &[Column],
    page: &PageView,
    state: &ViewState,
    max_column_width: usize,
) -> String {
    let headers: Vec<String> = columns.iter().map(header_text).collect();

    // Cells are cut to the column limit unless the user expanded them
    let cells: Vec<Vec<String>> = page
        .rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| {
                    let text = cell_text(row.get(&c.name));
                    if state.is_expanded(&row.id, &c.name) {
                        text
                    } else {
                        get_visible_text(&text, max_column_width)
                    }
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(cidx, header)| {
            let widest_cell = cells
                .iter()
                .map(|r| display_len(&r[cidx]))
                .max()
                .unwrap_or(0);
            let header_width = std::cmp::min(display_len(header), max_column_width);
            std::cmp::max(header_width, widest_cell) + COLUMN_WIDTH_MARGIN
        })
        .collect();

    let mut out = String::new();
    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| pad(&get_visible_text(h, w - COLUMN_WIDTH_MARGIN), w))
        .collect();
    out.push_str(&format!(
        "{}{}{}\n",
        pad("", SELECT_MARKER_WIDTH),
        COLUMN_SEPARATOR,
        header_line.join(COLUMN_SEPARATOR).trim_end()
    ));
    let rule_len = SELECT_MARKER_WIDTH
        + widths.iter().sum::<usize>()
        + COLUMN_SEPARATOR.chars().count() * widths.len();
    out.push_str(&format!("{}\n", "─".repeat(rule_len)));

    for (row, row_cells) in page.rows.iter().zip(&cells) {
        let marker = if state.selected.contains(&row.id) {
            "[x]"
        } else {
            "[ ]"
        };
        let line: Vec<String> = row_cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| pad(c, w))
            .collect();
        out.push_str(&format!(
            "{marker}{}{}\n",
            COLUMN_SEPARATOR,
            line.join(COLUMN_SEPARATOR).trim_end()
        ));
    }

    out.push_str(&footer(page, state));
    out
}

pub fn footer(page: &PageView, state: &ViewState) -> String {
    let mut text = format!(
        "Showing {} of {} rows · page {}/{}",
        page.rows.len(),
        page.total_filtered,
        page.page,
        page.page_count.max(1)
    );
    if !state.selected.is_empty() {
        text.push_str(&format!(" · {} selected", state.selected.len()));
    }
    if !state.filters.is_empty() {
        text.push_str(&format!(" · {} filters", state.filters.len()));
    }
    text
}

/// The catalog listing: one line per table, grouped by project.
pub fn render_tables(entries: &[TableEntry]) -> String {
    let mut out = String::new();
    let mut current_project: Option<&str> = None;
    for entry in entries {
        if current_project != Some(entry.project_id.as_str()) {
            out.push_str(&format!(
                "{} {} ({})\n",
                entry.project_id, entry.project_name, entry.kind
            ));
            current_project = Some(entry.project_id.as_str());
        }
        out.push_str(&format!("  {:<24} {:>8} rows\n", entry.key(), entry.rows));
    }
    if entries.is_empty() {
        out.push_str("No tables found\n");
    }
    out
}
