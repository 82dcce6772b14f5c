use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use derive_setters::Setters;
use tracing::{debug, info, trace};

use crate::catalog::{Catalog, TableDefinition};
use crate::connect::{CancelToken, simulate_latency};
use crate::domain::{DashConfig, DashError, HELP_TEXT, Message};
use crate::export::{self, ClipboardSink};
use crate::loader;
use crate::render;
use crate::store::{RowId, Table};
use crate::view::{self, FilterCondition, PageView, compute_view};

/// Snapshot of what the user is looking at. Transitions return a new snapshot.
#[derive(Debug, Clone, PartialEq, Setters)]
#[setters(prefix = "with_")]
pub struct ViewState {
    pub search: String,
    pub filters: Vec<FilterCondition>,
    pub page: usize,
    pub selected: BTreeSet<RowId>,
    pub expanded: BTreeSet<(RowId, String)>,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            search: String::new(),
            filters: Vec::new(),
            page: 1,
            selected: BTreeSet::new(),
            expanded: BTreeSet::new(),
        }
    }
}

impl ViewState {
    pub fn searched(self, text: impl Into<String>) -> Self {
        self.with_search(text.into()).with_page(1)
    }

    /// Replaces the filter list. Filters without a value are dropped.
    pub fn filtered(self, filters: Vec<FilterCondition>) -> Self {
        let active = filters.into_iter().filter(|f| f.is_active()).collect();
        self.with_filters(active).with_page(1)
    }

    pub fn toggled_selection(self, id: RowId) -> Self {
        let mut selected = self.selected.clone();
        if !selected.remove(&id) {
            selected.insert(id);
        }
        self.with_selected(selected)
    }

    pub fn toggled_expand(self, id: RowId, column: impl Into<String>) -> Self {
        let key = (id, column.into());
        let mut expanded = self.expanded.clone();
        if !expanded.remove(&key) {
            expanded.insert(key);
        }
        self.with_expanded(expanded)
    }

    /// Drops every reference to a deleted row.
    pub fn without_row(self, id: &RowId) -> Self {
        let mut selected = self.selected.clone();
        selected.remove(id);
        let expanded = self
            .expanded
            .iter()
            .filter(|(rid, _)| rid != id)
            .cloned()
            .collect();
        self.with_selected(selected).with_expanded(expanded)
    }

    pub fn is_expanded(&self, id: &RowId, column: &str) -> bool {
        self.expanded.contains(&(id.clone(), column.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Quitting,
}

/// The dashboard: catalog, the open table and its view state.
pub struct Session {
    config: DashConfig,
    catalog: Catalog,
    current: Option<(usize, usize)>,
    view: ViewState,
    clipboard: Box<dyn ClipboardSink>,
    cancel: CancelToken,
    pub status: Status,
    status_message: String,
}

impl Session {
    pub fn new(config: DashConfig, catalog: Catalog, clipboard: Box<dyn ClipboardSink>) -> Self {
        Session {
            config,
            catalog,
            current: None,
            view: ViewState::default(),
            clipboard,
            cancel: CancelToken::new(),
            status: Status::Ready,
            status_message: "Started dbdash!".to_string(),
        }
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn current_table(&self) -> Result<&Table, DashError> {
        self.current
            .and_then(|loc| self.catalog.table(loc))
            .ok_or(DashError::NoTableOpen)
    }

    fn current_table_mut(&mut self) -> Result<&mut Table, DashError> {
        match self.current {
            Some(loc) => self.catalog.table_mut(loc).ok_or(DashError::NoTableOpen),
            None => Err(DashError::NoTableOpen),
        }
    }

    pub fn current_view(&self) -> Result<PageView<'_>, DashError> {
        let table = self.current_table()?;
        Ok(compute_view(
            table.rows(),
            &self.view.search,
            &self.view.filters,
            self.view.page,
            self.config.page_size,
        ))
    }

    /// Text rendering of the current page, or the catalog when no table is open.
    pub fn render(&self) -> String {
        match (self.current_table(), self.current_view()) {
            (Ok(table), Ok(page)) => format!(
                "{}\n{}",
                table.name,
                render::render_page(table.columns(), &page, &self.view, self.config.max_column_width)
            ),
            _ => render::render_tables(&self.catalog.search_tables("")),
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        debug!("Status: {}", self.status_message);
    }

    // Keep the stored page inside [1, max(1, page_count)] after the row set changed
    fn clamp_page(&mut self) -> Result<(), DashError> {
        let total = {
            let table = self.current_table()?;
            view::matching_indices(table.rows(), &self.view.search, &self.view.filters).len()
        };
        let page = view::clamp_page(self.view.page, view::page_count(total, self.config.page_size));
        self.view = self.view.clone().with_page(page);
        Ok(())
    }

    pub async fn update(&mut self, message: Message) -> Result<(), DashError> {
        trace!("Update: {:?}", message);
        match message {
            Message::OpenTable(key) => self.open_table(&key)?,
            Message::Search(text) => {
                self.current_table()?;
                self.view = self.view.clone().searched(text);
                let total = self.current_view()?.total_filtered;
                self.set_status_message(format!("Found {total} matching rows"));
            }
            Message::ApplyFilters(filters) => self.apply_filters(filters)?,
            Message::ClearFilters => {
                self.current_table()?;
                self.view = self.view.clone().filtered(Vec::new());
                self.set_status_message("Filters cleared");
            }
            Message::GotoPage(page) => self.goto_page(page)?,
            Message::NextPage => self.goto_page(self.view.page.saturating_add(1))?,
            Message::PrevPage => self.goto_page(self.view.page.saturating_sub(1))?,
            Message::ToggleSelect(id) => {
                if !self.current_table()?.contains(&id) {
                    return Err(DashError::UnknownRow(id));
                }
                self.view = self.view.clone().toggled_selection(id);
                let selected = self.view.selected.len();
                self.set_status_message(format!("{selected} rows selected"));
            }
            Message::ToggleSelectAll => self.toggle_select_all()?,
            Message::ToggleExpand(id, column) => {
                let table = self.current_table()?;
                if table.column(&column).is_none() {
                    return Err(DashError::UnknownColumn(column));
                }
                if !table.contains(&id) {
                    return Err(DashError::UnknownRow(id));
                }
                self.view = self.view.clone().toggled_expand(id, column);
            }
            Message::Insert(partial) => {
                let id = self.current_table_mut()?.insert(&partial)?;
                self.view = self.view.clone().with_page(1);
                self.set_status_message(format!("Row {id} inserted successfully!"));
            }
            Message::Delete(id) => self.delete_rows(vec![id])?,
            Message::DeleteSelected => {
                let ids: Vec<RowId> = self.view.selected.iter().cloned().collect();
                self.delete_rows(ids)?;
            }
            Message::CopyRow(id) => self.copy_row(&id)?,
            Message::CopyCell(id, column) => self.copy_cell(&id, &column)?,
            Message::Export(path) => self.export(&path)?,
            Message::CreateTable(definition) => self.create_table(definition)?,
            Message::ImportFile(path) => {
                let table = loader::load_table(&path)?;
                self.import_table(table)?;
            }
            Message::Refresh => self.refresh().await?,
            Message::Help => self.set_status_message(HELP_TEXT),
            Message::Quit => self.status = Status::Quitting,
        }
        Ok(())
    }

    // -------------------- Message handlers ---------------------- //

    fn open_table(&mut self, key: &str) -> Result<(), DashError> {
        let location = self.catalog.resolve(key)?;
        self.current = Some(location);
        self.view = ViewState::default();
        let table = self.current_table()?;
        let message = format!("Opened {} ({} rows)", table.name, table.len());
        info!("{message}");
        self.set_status_message(message);
        Ok(())
    }

    fn apply_filters(&mut self, filters: Vec<FilterCondition>) -> Result<(), DashError> {
        let table = self.current_table()?;
        if let Some(unknown) = filters
            .iter()
            .filter(|f| f.is_active())
            .find(|f| table.column(&f.column).is_none())
        {
            return Err(DashError::UnknownColumn(unknown.column.clone()));
        }
        self.view = self.view.clone().filtered(filters);
        let page = self.current_view()?;
        let message = format!(
            "{} filters active, {} matching rows",
            self.view.filters.len(),
            page.total_filtered
        );
        self.set_status_message(message);
        Ok(())
    }

    fn goto_page(&mut self, page: usize) -> Result<(), DashError> {
        let page_count = self.current_view()?.page_count;
        let page = view::clamp_page(page, page_count);
        self.view = self.view.clone().with_page(page);
        self.set_status_message(format!("Page {page}/{}", page_count.max(1)));
        Ok(())
    }

    fn toggle_select_all(&mut self) -> Result<(), DashError> {
        let ids: Vec<RowId> = {
            let table = self.current_table()?;
            view::matching_indices(table.rows(), &self.view.search, &self.view.filters)
                .into_iter()
                .map(|idx| table.rows()[idx].id.clone())
                .collect()
        };
        let all_selected = !ids.is_empty() && ids.iter().all(|id| self.view.selected.contains(id));
        let mut selected = self.view.selected.clone();
        if all_selected {
            for id in &ids {
                selected.remove(id);
            }
        } else {
            selected.extend(ids);
        }
        self.view = self.view.clone().with_selected(selected);
        let count = self.view.selected.len();
        self.set_status_message(format!("{count} rows selected"));
        Ok(())
    }

    fn delete_rows(&mut self, ids: Vec<RowId>) -> Result<(), DashError> {
        let mut view = self.view.clone();
        let table = self.current_table_mut()?;
        let mut deleted = 0;
        for id in &ids {
            if table.delete(id) {
                deleted += 1;
            }
            view = view.without_row(id);
        }
        self.view = view;
        self.clamp_page()?;
        match (deleted, ids.first()) {
            (0, Some(id)) if ids.len() == 1 => self.set_status_message(format!("No row {id}")),
            (1, _) => self.set_status_message("Row deleted"),
            (n, _) => self.set_status_message(format!("{n} rows deleted")),
        }
        Ok(())
    }

    fn copy_row(&mut self, id: &RowId) -> Result<(), DashError> {
        let text = {
            let table = self.current_table()?;
            let row = table.get(id).ok_or_else(|| DashError::UnknownRow(id.clone()))?;
            export::row_to_json(table.columns(), row)?
        };
        self.clipboard.set_text(text)?;
        self.set_status_message(format!("Copied row {id} as JSON"));
        Ok(())
    }

    fn copy_cell(&mut self, id: &RowId, column: &str) -> Result<(), DashError> {
        let text = {
            let table = self.current_table()?;
            if table.column(column).is_none() {
                return Err(DashError::UnknownColumn(column.to_string()));
            }
            let row = table.get(id).ok_or_else(|| DashError::UnknownRow(id.clone()))?;
            match row.get(column) {
                Some(value) => export::cell_to_json(value)?,
                None => export::cell_to_json(&crate::value::Value::Null)?,
            }
        };
        self.clipboard.set_text(text)?;
        self.set_status_message(format!("Copied {column} of row {id}"));
        Ok(())
    }

    fn export(&mut self, path: &Path) -> Result<(), DashError> {
        let text = {
            let table = self.current_table()?;
            let page = self.current_view()?;
            export::rows_to_json(table.columns(), &page.rows)?
        };
        let target = export::write_export(path, &text)?;
        self.set_status_message(format!("Exported to {}", target.display()));
        Ok(())
    }

    // New tables go to the project of the open table, or the first project
    fn target_project_id(&self) -> Result<String, DashError> {
        match self.current {
            Some((pidx, _)) => Ok(self.catalog.projects()[pidx].id.clone()),
            None => self
                .catalog
                .projects()
                .first()
                .map(|p| p.id.clone())
                .ok_or_else(|| DashError::UnknownProject("<none>".to_string())),
        }
    }

    /// Adds a loaded table next to the open one and opens it.
    pub fn import_table(&mut self, table: Table) -> Result<(), DashError> {
        let project_id = self.target_project_id()?;
        let location = self.catalog.attach_table(&project_id, table)?;
        self.current = Some(location);
        self.view = ViewState::default();
        let table = self.current_table()?;
        let message = format!("Imported {} ({} rows)", table.name, table.len());
        self.set_status_message(message);
        Ok(())
    }

    fn create_table(&mut self, definition: TableDefinition) -> Result<(), DashError> {
        let project_id = self.target_project_id()?;
        let location = self.catalog.create_table(&project_id, definition)?;
        self.current = Some(location);
        self.view = ViewState::default();
        let name = self.current_table()?.name.clone();
        self.set_status_message(format!("Table {name} created"));
        Ok(())
    }

    async fn refresh(&mut self) -> Result<(), DashError> {
        let name = self.current_table()?.name.clone();
        self.set_status_message(format!("Refreshing {name} ..."));
        simulate_latency(Duration::from_millis(self.config.refresh_delay_ms), &self.cancel).await?;
        self.clamp_page()?;
        self.set_status_message(format!("Refreshed {name}"));
        Ok(())
    }
}
