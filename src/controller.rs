use std::path::PathBuf;

use tracing::trace;

use crate::catalog::{DatabaseKind, TableDefinition};
use crate::connect::ConnectionRequest;
use crate::domain::{DashError, Message};
use crate::session::Session;
use crate::store::RowId;
use crate::value::{Column, ColumnType};
use crate::view::FilterCondition;

/// What a shell line asks for. Most lines become a session `Message`, the rest are handled
/// by the shell itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Update(Message),
    ListTables(String),
    ShowFilters,
    Show,
    Connect(ConnectionRequest),
}

#[derive(Debug, Default)]
pub struct Controller;

/// Splits a line on whitespace, keeping double quoted parts together.
pub fn tokenize(line: &str) -> Result<Vec<String>, DashError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    for chr in line.chars() {
        match chr {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_quotes {
        return Err(DashError::InvalidCommand("Unterminated quote".to_string()));
    }
    if has_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn usage(text: &str) -> DashError {
    DashError::InvalidCommand(format!("Usage: {text}"))
}

// Ids are read against the key column of the open table
fn parse_row_id(token: Option<&String>, text: &str, session: &Session) -> Result<RowId, DashError> {
    let token = token.ok_or_else(|| usage(text))?;
    match session.current_table() {
        Ok(table) => table.parse_id(token),
        Err(_) => token.parse(),
    }
}

impl Controller {
    pub fn new() -> Self {
        Controller
    }

    pub fn handle_line(&self, line: &str, session: &Session) -> Result<Action, DashError> {
        let tokens = tokenize(line)?;
        let Some((command, args)) = tokens.split_first() else {
            return Ok(Action::Show);
        };
        let rest = args.join(" ");

        let action = match command.to_lowercase().as_str() {
            "tables" | "ls" => Action::ListTables(rest),
            "open" | "use" => match args.first() {
                Some(key) => Action::Update(Message::OpenTable(key.clone())),
                None => return Err(usage("open <project/table>")),
            },
            "show" => Action::Show,
            "search" => Action::Update(Message::Search(rest)),
            "filter" => {
                if args.len() < 3 {
                    return Err(usage("filter <column> <operator> <value>"));
                }
                let mut filters = session.view_state().filters.clone();
                filters.push(FilterCondition {
                    column: args[0].clone(),
                    operator: args[1].parse().unwrap_or_else(|e| match e {}),
                    value: args[2..].join(" "),
                });
                Action::Update(Message::ApplyFilters(filters))
            }
            "filters" => Action::ShowFilters,
            "clear" => Action::Update(Message::ClearFilters),
            "page" => {
                let page = args
                    .first()
                    .and_then(|p| p.parse::<usize>().ok())
                    .ok_or_else(|| usage("page <number>"))?;
                Action::Update(Message::GotoPage(page))
            }
            "next" => Action::Update(Message::NextPage),
            "prev" => Action::Update(Message::PrevPage),
            "select" => match args.first().map(String::as_str) {
                Some("all") => Action::Update(Message::ToggleSelectAll),
                _ => Action::Update(Message::ToggleSelect(parse_row_id(
                    args.first(),
                    "select <id> | select all",
                    session,
                )?)),
            },
            "expand" => {
                let id = parse_row_id(args.first(), "expand <id> <column>", session)?;
                let column = args.get(1).ok_or_else(|| usage("expand <id> <column>"))?;
                Action::Update(Message::ToggleExpand(id, column.clone()))
            }
            "insert" => {
                let mut partial = Vec::with_capacity(args.len());
                for pair in args {
                    let (column, value) = pair
                        .split_once('=')
                        .ok_or_else(|| usage("insert column=value ..."))?;
                    partial.push((column.to_string(), value.to_string()));
                }
                Action::Update(Message::Insert(partial))
            }
            "delete" | "rm" => match args.first().map(String::as_str) {
                Some("selected") => Action::Update(Message::DeleteSelected),
                _ => Action::Update(Message::Delete(parse_row_id(
                    args.first(),
                    "delete <id> | delete selected",
                    session,
                )?)),
            },
            "copy" => {
                let id = parse_row_id(args.first(), "copy <id> [column]", session)?;
                match args.get(1) {
                    Some(column) => Action::Update(Message::CopyCell(id, column.clone())),
                    None => Action::Update(Message::CopyRow(id)),
                }
            }
            "export" => match args.first() {
                Some(path) => Action::Update(Message::Export(PathBuf::from(path))),
                None => return Err(usage("export <path>")),
            },
            "create" => Action::Update(Message::CreateTable(Self::parse_definition(args)?)),
            "connect" => {
                if args.len() < 3 {
                    return Err(usage("connect <type> <name> <url>"));
                }
                Action::Connect(ConnectionRequest {
                    kind: args[0].parse::<DatabaseKind>()?,
                    name: args[1].clone(),
                    url: args[2].clone(),
                })
            }
            "import" => match args.first() {
                Some(path) => Action::Update(Message::ImportFile(PathBuf::from(path))),
                None => return Err(usage("import <file>")),
            },
            "refresh" => Action::Update(Message::Refresh),
            "help" | "?" => Action::Update(Message::Help),
            "quit" | "exit" | "q" => Action::Update(Message::Quit),
            other => {
                return Err(DashError::InvalidCommand(format!(
                    "Unknown command \"{other}\", try \"help\""
                )));
            }
        };
        trace!("Mapped: {line:?} => {action:?}");
        Ok(action)
    }

    /// `create <table> [col:type[:pk] ...]`. Without columns the default id/created_at pair is used.
    pub fn parse_definition(args: &[String]) -> Result<TableDefinition, DashError> {
        let text = "create <table> [column:type[:pk] ...]";
        let name = args.first().ok_or_else(|| usage(text))?;
        if args.len() == 1 {
            return Ok(TableDefinition::with_default_columns(name.clone()));
        }
        let mut definition = TableDefinition::new(name.clone());
        for entry in &args[1..] {
            let mut parts = entry.split(':');
            let column = parts.next().unwrap_or_default();
            let dtype = parts
                .next()
                .ok_or_else(|| usage(text))?
                .parse::<ColumnType>()?;
            let column = match parts.next() {
                Some("pk") => Column::primary(column, dtype),
                Some(_) => return Err(usage(text)),
                None => Column::new(column, dtype),
            };
            definition.columns.push(column);
        }
        Ok(definition)
    }
}
