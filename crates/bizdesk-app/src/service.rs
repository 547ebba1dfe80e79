// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde_json::Value;

use crate::RowId;

/// CRUD operations for one entity's REST endpoint family.
pub trait ViewSet {
    fn entity(&self) -> &str;
    fn options(&self) -> Result<Value>;
    fn list(&self, query: &ListQuery) -> Result<ListPage>;
    fn retrieve(&self, id: &RowId) -> Result<Value>;
    fn create(&self, data: &Value) -> Result<Value>;
    fn update(&self, id: &RowId, data: &Value) -> Result<Value>;
    fn delete(&self, id: &RowId) -> Result<()>;
}

pub trait ViewSetProvider {
    fn view_set(&self, entity: &str) -> Box<dyn ViewSet + '_>;
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub params: Vec<(String, String)>,
}

impl ListQuery {
    pub fn search(text: &str) -> Self {
        let trimmed = text.trim();
        Self {
            search: (!trimmed.is_empty()).then(|| trimmed.to_owned()),
            ..Self::default()
        }
    }

    /// Query-string pairs in a stable order.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.params.len() + 3);
        if let Some(search) = &self.search {
            pairs.push(("search".to_owned(), search.clone()));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_owned(), page.to_string()));
        }
        if let Some(page_size) = self.page_size {
            pairs.push(("page_size".to_owned(), page_size.to_string()));
        }
        pairs.extend(self.params.iter().cloned());
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    pub rows: Vec<Value>,
    pub count: Option<u64>,
}

impl ListPage {
    /// Accepts a bare array or a `{count, results}` pagination envelope.
    pub fn from_response(response: Value) -> Result<Self> {
        match response {
            Value::Array(rows) => {
                let count = Some(rows.len() as u64);
                Ok(Self { rows, count })
            }
            Value::Object(mut map) => {
                let count = map.get("count").and_then(Value::as_u64);
                match map.remove("results") {
                    Some(Value::Array(rows)) => Ok(Self { rows, count }),
                    _ => bail!("list response has no `results` array"),
                }
            }
            other => bail!("unexpected list response: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshOptions {
    /// Drop cached blocks and show a loading state instead of refreshing in place.
    pub purge: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisiblePosition {
    Top,
    Middle,
    Bottom,
}

/// Imperative handle of a server-side data grid.
///
/// The grid owns its row cache, selection and paging; callers only read
/// selection and ask it to refresh, patch or scroll.
pub trait GridApi {
    fn selected_rows(&self) -> Vec<Value>;
    /// Current data of the row with `id` if it is on the loaded page.
    fn row_node(&self, id: &RowId) -> Option<Value>;
    fn set_row_data(&mut self, id: &RowId, data: Value);
    fn refresh_server_side(&mut self, options: RefreshOptions);
    fn ensure_node_visible(&mut self, id: &RowId, position: VisiblePosition);
}

#[cfg(test)]
mod tests {
    use super::{ListPage, ListQuery};
    use serde_json::json;

    #[test]
    fn list_page_accepts_bare_arrays_and_envelopes() -> anyhow::Result<()> {
        let bare = ListPage::from_response(json!([{"id": 1}, {"id": 2}]))?;
        assert_eq!(bare.rows.len(), 2);
        assert_eq!(bare.count, Some(2));

        let paged = ListPage::from_response(json!({"count": 40, "results": [{"id": 1}]}))?;
        assert_eq!(paged.rows.len(), 1);
        assert_eq!(paged.count, Some(40));
        Ok(())
    }

    #[test]
    fn list_page_rejects_other_shapes() {
        assert!(ListPage::from_response(json!({"detail": "nope"})).is_err());
        assert!(ListPage::from_response(json!("nope")).is_err());
    }

    #[test]
    fn search_query_trims_and_drops_blank_text() {
        assert_eq!(ListQuery::search("  acme ").search.as_deref(), Some("acme"));
        assert!(ListQuery::search("   ").search.is_none());
    }

    #[test]
    fn pairs_put_known_params_first() {
        let query = ListQuery {
            search: Some("acme".to_owned()),
            page: Some(2),
            page_size: None,
            params: vec![("status".to_owned(), "active".to_owned())],
        };
        assert_eq!(
            query.pairs(),
            vec![
                ("search".to_owned(), "acme".to_owned()),
                ("page".to_owned(), "2".to_owned()),
                ("status".to_owned(), "active".to_owned()),
            ]
        );
    }
}
