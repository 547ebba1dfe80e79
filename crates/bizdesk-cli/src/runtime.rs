// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::config::Config;
use anyhow::{Context, Result, anyhow, bail};
use bizdesk_app::{
    EntityPage, FeedbackKey, FeedbackLevel, FormDef, GridApi, ListQuery, RefreshOptions, RowId,
    ViewSet, ViewSetProvider, VisiblePosition, get_children_form_defs, unwrap_envelope,
};
use serde_json::Value;

/// Runs one command's worth of page-controller work against a backend.
pub struct Session<'a> {
    provider: &'a dyn ViewSetProvider,
    config: &'a Config,
}

impl<'a> Session<'a> {
    pub fn new(provider: &'a dyn ViewSetProvider, config: &'a Config) -> Self {
        Self { provider, config }
    }

    /// One line per field: `field  label  type  flags  choices`.
    pub fn schema(&self, entity: &str) -> Result<String> {
        let page = self.open_page(entity)?;
        let mut lines = Vec::new();
        for def in page.form_defs() {
            lines.push(schema_line("", def));
            if def.field_type.is_composite() {
                let prefix = format!("{}.", def.field);
                lines.extend(
                    get_children_form_defs(def)
                        .iter()
                        .map(|child| schema_line(&prefix, child)),
                );
            }
        }
        Ok(join_lines(lines))
    }

    pub fn list(&self, entity: &str, search: Option<&str>) -> Result<String> {
        let page = self.open_page(entity)?;
        let view_set = self.provider.view_set(entity);
        let query = search.map(ListQuery::search).unwrap_or_default();
        let listed = view_set
            .list(&query)
            .with_context(|| format!("list {entity}"))?;

        let columns: Vec<&FormDef> = page
            .form_defs()
            .iter()
            .filter(|def| !def.field_type.is_composite())
            .collect();
        let helpers = page.helpers();

        let mut lines = Vec::with_capacity(listed.rows.len() + 2);
        lines.push(
            columns
                .iter()
                .map(|def| helpers.field_label(&def.field))
                .collect::<Vec<_>>()
                .join("\t"),
        );
        for row in &listed.rows {
            lines.push(
                columns
                    .iter()
                    .map(|def| helpers.render_row_cell(def, row))
                    .collect::<Vec<_>>()
                    .join("\t"),
            );
        }
        if let Some(count) = listed.count
            && count > listed.rows.len() as u64
        {
            lines.push(format!("({} of {count} rows)", listed.rows.len()));
        }
        Ok(join_lines(lines))
    }

    /// Copies row `id` through the page's copy flow and returns the created row.
    pub fn copy(&self, entity: &str, id: &RowId) -> Result<String> {
        let mut page = self.open_page(entity)?;
        let view_set = self.provider.view_set(entity);
        let row = fetch_row(view_set.as_ref(), id)?;

        let mut grid = MemoryGrid::new(vec![row]);
        grid.select(id);
        page.on_grid_ready(&grid);
        page.open_copy(&grid);
        let data = page
            .edit_data()
            .cloned()
            .ok_or_else(|| anyhow!("{entity} {id} could not be opened for copying"))?;

        page.submit(view_set.as_ref(), &mut grid, &data);
        outcome(&page, FeedbackKey::Create)?;

        let created = page
            .view_row()
            .ok_or_else(|| anyhow!("created {entity} came back without an id"))?;
        serde_json::to_string_pretty(created).context("render created row")
    }

    /// Deletes row `id` through the page's confirm flow and returns the outcome message.
    pub fn delete(&self, entity: &str, id: &RowId) -> Result<String> {
        let mut page = EntityPage::new(self.config.page_config(entity));
        if !page.config().enable_delete {
            bail!(
                "delete is disabled for {entity} -- set [entities.{entity}].enable_delete = true"
            );
        }
        let view_set = self.provider.view_set(entity);
        let row = fetch_row(view_set.as_ref(), id)?;

        let mut grid = MemoryGrid::new(vec![row]);
        grid.select(id);
        page.on_selection_changed(&grid);
        page.open_delete(&grid);
        if page.delete_prompt().is_none() {
            bail!("{entity} {id} has no id to delete");
        }
        page.confirm_delete(view_set.as_ref(), &mut grid);
        outcome(&page, FeedbackKey::Delete)
    }

    fn open_page(&self, entity: &str) -> Result<EntityPage> {
        let mut page = EntityPage::new(self.config.page_config(entity));
        page.load_meta(self.provider);
        if let Some(error) = page.meta_error() {
            bail!("load {entity} schema: {error}");
        }
        Ok(page)
    }
}

fn fetch_row(view_set: &dyn ViewSet, id: &RowId) -> Result<Value> {
    let response = view_set
        .retrieve(id)
        .with_context(|| format!("fetch {} {id}", view_set.entity()))?;
    Ok(unwrap_envelope(&response).clone())
}

fn outcome(page: &EntityPage, key: FeedbackKey) -> Result<String> {
    match page.feedback_for(key) {
        Some(entry) if entry.level == FeedbackLevel::Error => Err(anyhow!("{}", entry.message)),
        Some(entry) => Ok(entry.message.clone()),
        None => Err(anyhow!("{} did not run", key.as_str())),
    }
}

fn schema_line(prefix: &str, def: &FormDef) -> String {
    let mut flags = Vec::new();
    if def.required {
        flags.push("required");
    }
    if def.read_only {
        flags.push("read-only");
    }
    let flags = if flags.is_empty() {
        "-".to_owned()
    } else {
        flags.join(",")
    };

    let choices = if def.has_choices() {
        def.choices
            .iter()
            .map(|choice| format!("{}={}", choice.key(), choice.display()))
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        "-".to_owned()
    };

    format!(
        "{prefix}{}\t{}\t{}\t{flags}\t{choices}",
        def.field,
        def.label,
        def.field_type.as_str()
    )
}

fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Single-page grid held in memory for one-shot commands.
#[derive(Debug, Default)]
struct MemoryGrid {
    rows: Vec<Value>,
    selected: Vec<RowId>,
}

impl MemoryGrid {
    fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            selected: Vec::new(),
        }
    }

    fn select(&mut self, id: &RowId) {
        self.selected = vec![id.clone()];
    }
}

impl GridApi for MemoryGrid {
    fn selected_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter(|row| RowId::of_row(row).is_some_and(|id| self.selected.contains(&id)))
            .cloned()
            .collect()
    }

    fn row_node(&self, id: &RowId) -> Option<Value> {
        self.rows
            .iter()
            .find(|row| RowId::of_row(row).as_ref() == Some(id))
            .cloned()
    }

    fn set_row_data(&mut self, id: &RowId, data: Value) {
        if let Some(row) = self
            .rows
            .iter_mut()
            .find(|row| RowId::of_row(row).as_ref() == Some(id))
        {
            *row = data;
        }
    }

    fn refresh_server_side(&mut self, options: RefreshOptions) {
        tracing::debug!(purge = options.purge, "in-memory grid refresh requested");
    }

    fn ensure_node_visible(&mut self, _id: &RowId, _position: VisiblePosition) {}
}
