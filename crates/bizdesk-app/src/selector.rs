// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::{ListPage, ListQuery, RowId, ViewSetProvider, value_text};

/// A related-entity instance the selector can show and pick.
pub trait SelectorItem: Clone {
    fn item_key(&self) -> Option<RowId>;
    fn display(&self, field: &str) -> String;
    fn from_row(row: Value) -> Option<Self>;
}

impl SelectorItem for Value {
    fn item_key(&self) -> Option<RowId> {
        RowId::of_row(self)
    }

    fn display(&self, field: &str) -> String {
        self.get(field).map(value_text).unwrap_or_default()
    }

    fn from_row(row: Value) -> Option<Self> {
        Some(row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Single,
    Multiple,
}

/// Committed selector value: nothing, one item, or a list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SelectorValue<T> {
    #[default]
    Empty,
    One(T),
    Many(Vec<T>),
}

impl<T> SelectorValue<T> {
    pub fn items(&self) -> &[T] {
        match self {
            Self::Empty => &[],
            Self::One(item) => std::slice::from_ref(item),
            Self::Many(items) => items,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorColumn {
    pub field: String,
    pub label: String,
}

impl SelectorColumn {
    pub fn new(field: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    pub key: RowId,
    pub label: String,
    pub removable: bool,
}

pub type ChipRenderer<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Picker for related-entity instances with a working selection that is only
/// committed on [`EntitySelector::confirm`].
#[derive(Clone)]
pub struct EntitySelector<T: SelectorItem> {
    content_type: String,
    display_field: String,
    columns: Vec<SelectorColumn>,
    mode: SelectionMode,
    read_only: bool,
    chip_renderer: Option<ChipRenderer<T>>,
    value: SelectorValue<T>,
    working: Vec<T>,
    open: bool,
    search: String,
    candidates: Vec<T>,
    candidate_count: Option<u64>,
    loading: bool,
    error: Option<String>,
}

impl<T: SelectorItem> EntitySelector<T> {
    pub fn new(
        content_type: impl Into<String>,
        display_field: impl Into<String>,
        mode: SelectionMode,
    ) -> Self {
        Self {
            content_type: content_type.into(),
            display_field: display_field.into(),
            columns: Vec::new(),
            mode,
            read_only: false,
            chip_renderer: None,
            value: SelectorValue::Empty,
            working: Vec::new(),
            open: false,
            search: String::new(),
            candidates: Vec::new(),
            candidate_count: None,
            loading: false,
            error: None,
        }
    }

    pub fn with_columns(mut self, columns: Vec<SelectorColumn>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_value(mut self, value: SelectorValue<T>) -> Self {
        self.value = value;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_chip_renderer(
        mut self,
        renderer: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Self {
        self.chip_renderer = Some(Arc::new(renderer));
        self
    }

    /// Replaces the committed value from outside, as a controlled input would.
    pub fn set_value(&mut self, value: SelectorValue<T>) {
        self.value = value;
    }

    /// Opens the picker seeded from the committed value and fetches candidates.
    /// Inert when read-only.
    pub fn open(&mut self, provider: &dyn ViewSetProvider) -> bool {
        if self.read_only {
            return false;
        }
        self.working = self.value.items().to_vec();
        self.open = true;
        self.fetch_candidates(provider);
        true
    }

    pub fn set_search(&mut self, provider: &dyn ViewSetProvider, text: &str) {
        self.search = text.to_owned();
        if self.open {
            self.fetch_candidates(provider);
        }
    }

    /// Toggles `item` in the working selection. Single mode replaces.
    pub fn toggle(&mut self, item: T) {
        if !self.open {
            return;
        }
        let Some(key) = item.item_key() else {
            return;
        };

        let position = self
            .working
            .iter()
            .position(|existing| existing.item_key().as_ref() == Some(&key));
        match (self.mode, position) {
            (_, Some(index)) => {
                self.working.remove(index);
            }
            (SelectionMode::Single, None) => self.working = vec![item],
            (SelectionMode::Multiple, None) => self.working.push(item),
        }
    }

    pub fn is_selected(&self, key: &RowId) -> bool {
        self.working
            .iter()
            .any(|item| item.item_key().as_ref() == Some(key))
    }

    /// Commits the working selection and closes. Returns the new value.
    pub fn confirm(&mut self) -> Option<SelectorValue<T>> {
        if !self.open {
            return None;
        }
        self.open = false;
        let working = std::mem::take(&mut self.working);
        self.value = match self.mode {
            SelectionMode::Single => working
                .into_iter()
                .next()
                .map_or(SelectorValue::Empty, SelectorValue::One),
            SelectionMode::Multiple => SelectorValue::Many(working),
        };
        Some(self.value.clone())
    }

    /// Closes without committing.
    pub fn cancel(&mut self) {
        self.open = false;
        self.working.clear();
    }

    /// Empties the selection and commits the mode's empty value.
    pub fn clear(&mut self) -> Option<SelectorValue<T>> {
        if self.read_only {
            return None;
        }
        self.working.clear();
        self.value = self.empty_value();
        Some(self.value.clone())
    }

    pub fn chips(&self) -> Vec<Chip> {
        self.value
            .items()
            .iter()
            .filter_map(|item| {
                let key = item.item_key()?;
                let label = match &self.chip_renderer {
                    Some(render) => render(item),
                    None => item.display(&self.display_field),
                };
                Some(Chip {
                    label: if label.is_empty() {
                        key.to_string()
                    } else {
                        label
                    },
                    key,
                    removable: !self.read_only,
                })
            })
            .collect()
    }

    /// Commits the value without the item keyed `key`.
    pub fn remove(&mut self, key: &RowId) -> Option<SelectorValue<T>> {
        if self.read_only {
            return None;
        }
        let items = self.value.items();
        let kept: Vec<T> = items
            .iter()
            .filter(|item| item.item_key().as_ref() != Some(key))
            .cloned()
            .collect();
        if kept.len() == items.len() {
            return None;
        }

        self.value = match self.mode {
            SelectionMode::Single => kept
                .into_iter()
                .next()
                .map_or(SelectorValue::Empty, SelectorValue::One),
            SelectionMode::Multiple => SelectorValue::Many(kept),
        };
        Some(self.value.clone())
    }

    /// Marks a candidate fetch as started and returns its query.
    pub fn begin_fetch(&mut self) -> ListQuery {
        self.loading = true;
        ListQuery::search(&self.search)
    }

    /// Applies a candidate fetch. Errors keep the previous candidates.
    pub fn apply_fetch(&mut self, result: Result<ListPage>) {
        self.loading = false;
        match result {
            Ok(page) => {
                self.candidate_count = page.count;
                self.candidates = page.rows.into_iter().filter_map(T::from_row).collect();
                self.error = None;
            }
            Err(error) => {
                tracing::warn!(
                    content_type = self.content_type.as_str(),
                    "candidate fetch failed: {error:#}"
                );
                self.error = Some(format!("{error:#}"));
            }
        }
    }

    pub fn fetch_candidates(&mut self, provider: &dyn ViewSetProvider) {
        let query = self.begin_fetch();
        let result = provider.view_set(&self.content_type).list(&query);
        self.apply_fetch(result);
    }

    /// Browse-grid cells for one candidate, following the configured columns.
    pub fn cells(&self, item: &T) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| item.display(&column.field))
            .collect()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn columns(&self) -> &[SelectorColumn] {
        &self.columns
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn value(&self) -> &SelectorValue<T> {
        &self.value
    }

    pub fn working(&self) -> &[T] {
        &self.working
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn candidates(&self) -> &[T] {
        &self.candidates
    }

    pub fn candidate_count(&self) -> Option<u64> {
        self.candidate_count
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn empty_value(&self) -> SelectorValue<T> {
        match self.mode {
            SelectionMode::Single => SelectorValue::Empty,
            SelectionMode::Multiple => SelectorValue::Many(Vec::new()),
        }
    }
}

impl<T: SelectorItem + fmt::Debug> fmt::Debug for EntitySelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySelector")
            .field("content_type", &self.content_type)
            .field("mode", &self.mode)
            .field("read_only", &self.read_only)
            .field("value", &self.value)
            .field("working", &self.working)
            .field("open", &self.open)
            .field("search", &self.search)
            .field("candidates", &self.candidates.len())
            .field("error", &self.error)
            .finish()
    }
}
