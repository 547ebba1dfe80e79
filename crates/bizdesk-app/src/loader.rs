// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use crate::{
    FormDef, RequestId, ViewSet, ViewSetProvider, convert_to_form_defs, filter_header_meta,
    sort_form_defs,
};

/// Shared flag telling an in-flight load that its result is no longer wanted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub request_id: RequestId,
    pub table: String,
    pub token: CancelToken,
}

/// Raw header metadata (or the failure) for one load request.
#[derive(Debug)]
pub struct LoaderEvent {
    pub request_id: RequestId,
    pub result: Result<Value>,
}

#[derive(Debug, Clone)]
struct InFlight {
    request_id: RequestId,
    token: CancelToken,
}

/// Loads and normalizes one entity's field metadata at a time.
///
/// Only the most recently issued request may update state: older results are
/// dropped in [`FormDefsLoader::apply`] no matter when they arrive.
#[derive(Debug, Clone, Default)]
pub struct FormDefsLoader {
    last_request_id: RequestId,
    in_flight: Option<InFlight>,
    table: Option<String>,
    order: Vec<String>,
    meta_filter: Vec<String>,
    header_meta: Value,
    form_defs: Vec<FormDef>,
    error: Option<String>,
}

impl FormDefsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level fields removed from fetched metadata before it is exposed.
    pub fn with_meta_filter(mut self, fields: Vec<String>) -> Self {
        self.meta_filter = fields;
        self
    }

    /// Starts a new load, superseding any request still in flight.
    pub fn begin(&mut self, table: &str, order: &[String]) -> LoadRequest {
        self.cancel();

        if self.table.as_deref() != Some(table) {
            self.form_defs.clear();
            self.header_meta = Value::Null;
            self.error = None;
        }
        self.table = Some(table.to_owned());
        self.order = order.to_vec();

        self.last_request_id = self.last_request_id.next();
        let token = CancelToken::new();
        self.in_flight = Some(InFlight {
            request_id: self.last_request_id,
            token: token.clone(),
        });
        tracing::debug!(
            table,
            request_id = self.last_request_id.get(),
            "loading field metadata"
        );

        LoadRequest {
            request_id: self.last_request_id,
            table: table.to_owned(),
            token,
        }
    }

    /// Cancels the in-flight request, if any. Its result will be ignored.
    pub fn cancel(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
    }

    /// Applies a finished load. Returns `false` when the event was stale.
    pub fn apply(&mut self, event: LoaderEvent) -> bool {
        let Some(in_flight) = self.in_flight.as_ref() else {
            tracing::debug!(
                request_id = event.request_id.get(),
                "discarding metadata with no load in flight"
            );
            return false;
        };
        if event.request_id != in_flight.request_id || in_flight.token.is_cancelled() {
            tracing::debug!(
                request_id = event.request_id.get(),
                latest = in_flight.request_id.get(),
                "discarding stale metadata"
            );
            return false;
        }
        self.in_flight = None;

        match event.result {
            Ok(raw) => {
                let meta = filter_header_meta(raw, &self.meta_filter);
                self.form_defs = sort_form_defs(convert_to_form_defs(&meta), &self.order);
                self.header_meta = meta;
                self.error = None;
            }
            Err(error) => {
                tracing::warn!(
                    table = self.table.as_deref().unwrap_or_default(),
                    "field metadata load failed: {error:#}"
                );
                self.form_defs.clear();
                self.header_meta = Value::Null;
                self.error = Some(format!("{error:#}"));
            }
        }
        true
    }

    /// Fetches and applies metadata on the calling thread.
    pub fn load(&mut self, provider: &dyn ViewSetProvider, table: &str, order: &[String]) -> bool {
        let request = self.begin(table, order);
        let view_set = provider.view_set(table);
        let result = fetch_header_meta(view_set.as_ref(), &request.token);
        self.apply(LoaderEvent {
            request_id: request.request_id,
            result,
        })
    }

    pub fn form_defs(&self) -> &[FormDef] {
        &self.form_defs
    }

    pub fn header_meta(&self) -> &Value {
        &self.header_meta
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }
}

/// Requests the entity schema and extracts its `actions.POST` field map.
pub fn fetch_header_meta(view_set: &dyn ViewSet, token: &CancelToken) -> Result<Value> {
    if token.is_cancelled() {
        bail!("metadata load for {} was cancelled", view_set.entity());
    }
    let options = view_set.options()?;
    extract_post_actions(view_set.entity(), options)
}

pub fn extract_post_actions(entity: &str, options: Value) -> Result<Value> {
    let Value::Object(mut root) = options else {
        bail!("schema response for {entity} is not an object");
    };
    let actions = root.remove("actions");
    match actions {
        Some(Value::Object(mut actions)) => actions.remove("POST").ok_or_else(|| {
            anyhow!("schema for {entity} has no actions.POST -- check that the endpoint allows create")
        }),
        _ => bail!("schema for {entity} has no actions -- check that the endpoint allows create"),
    }
}

/// Runs a load on a worker thread and reports it over `tx`.
pub fn spawn_load(
    provider: Arc<dyn ViewSetProvider + Send + Sync>,
    request: LoadRequest,
    tx: Sender<LoaderEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let result = {
            let view_set = provider.view_set(&request.table);
            fetch_header_meta(view_set.as_ref(), &request.token)
        };
        if request.token.is_cancelled() {
            tracing::debug!(
                table = request.table.as_str(),
                request_id = request.request_id.get(),
                "load finished after cancellation"
            );
        }
        let _ = tx.send(LoaderEvent {
            request_id: request.request_id,
            result,
        });
    })
}

#[cfg(test)]
mod tests {
    use super::{FormDefsLoader, LoaderEvent, extract_post_actions, spawn_load};
    use crate::{ListPage, ListQuery, RowId, ViewSet, ViewSetProvider};
    use anyhow::{Result, anyhow};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::mpsc;

    struct Schemas(HashMap<String, Value>);

    struct SchemaOnly<'a> {
        entity: String,
        schemas: &'a Schemas,
    }

    impl ViewSet for SchemaOnly<'_> {
        fn entity(&self) -> &str {
            &self.entity
        }

        fn options(&self) -> Result<Value> {
            self.schemas
                .0
                .get(&self.entity)
                .cloned()
                .ok_or_else(|| anyhow!("server error (404): not found"))
        }

        fn list(&self, _query: &ListQuery) -> Result<ListPage> {
            Ok(ListPage::default())
        }

        fn retrieve(&self, _id: &RowId) -> Result<Value> {
            Err(anyhow!("unsupported"))
        }

        fn create(&self, _data: &Value) -> Result<Value> {
            Err(anyhow!("unsupported"))
        }

        fn update(&self, _id: &RowId, _data: &Value) -> Result<Value> {
            Err(anyhow!("unsupported"))
        }

        fn delete(&self, _id: &RowId) -> Result<()> {
            Err(anyhow!("unsupported"))
        }
    }

    impl ViewSetProvider for Schemas {
        fn view_set(&self, entity: &str) -> Box<dyn ViewSet + '_> {
            Box::new(SchemaOnly {
                entity: entity.to_owned(),
                schemas: self,
            })
        }
    }

    fn schemas() -> Schemas {
        Schemas(HashMap::from([
            (
                "accounts".to_owned(),
                json!({"actions": {"POST": {
                    "status": {"label": "Status", "type": "choice"},
                    "account_name": {"label": "Account name", "type": "string"},
                    "allowed_actions": {"label": "Allowed", "type": "list"}
                }}}),
            ),
            (
                "orders".to_owned(),
                json!({"actions": {"POST": {"number": {"label": "Number"}}}}),
            ),
        ]))
    }

    fn names(loader: &FormDefsLoader) -> Vec<&str> {
        loader
            .form_defs()
            .iter()
            .map(|def| def.field.as_str())
            .collect()
    }

    #[test]
    fn load_normalizes_filters_and_orders() {
        let provider = schemas();
        let mut loader = FormDefsLoader::new().with_meta_filter(vec!["allowed_actions".to_owned()]);

        assert!(loader.load(&provider, "accounts", &["account_name".to_owned()]));
        assert_eq!(names(&loader), vec!["account_name", "status"]);
        assert!(loader.header_meta().get("allowed_actions").is_none());
        assert!(loader.error().is_none());
        assert!(!loader.is_loading());
    }

    #[test]
    fn failure_resolves_to_empty_list_with_error() {
        let provider = schemas();
        let mut loader = FormDefsLoader::new();
        loader.load(&provider, "accounts", &[]);
        assert!(!loader.form_defs().is_empty());

        loader.load(&provider, "missing", &[]);
        assert!(loader.form_defs().is_empty());
        assert!(loader.error().is_some_and(|error| error.contains("404")));
    }

    #[test]
    fn later_request_wins_over_earlier_response() {
        let mut loader = FormDefsLoader::new();
        let first = loader.begin("accounts", &[]);
        let second = loader.begin("orders", &[]);
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());

        let applied = loader.apply(LoaderEvent {
            request_id: second.request_id,
            result: Ok(json!({"number": {"label": "Number"}})),
        });
        assert!(applied);

        let stale = loader.apply(LoaderEvent {
            request_id: first.request_id,
            result: Ok(json!({"account_name": {"label": "Account name"}})),
        });
        assert!(!stale);
        assert_eq!(names(&loader), vec!["number"]);
        assert_eq!(loader.table(), Some("orders"));
    }

    #[test]
    fn cancelled_load_is_ignored() {
        let mut loader = FormDefsLoader::new();
        let request = loader.begin("accounts", &[]);
        loader.cancel();
        assert!(!loader.apply(LoaderEvent {
            request_id: request.request_id,
            result: Ok(json!({"account_name": {}})),
        }));
        assert!(loader.form_defs().is_empty());
    }

    #[test]
    fn spawned_load_reports_over_channel() {
        let provider: Arc<dyn ViewSetProvider + Send + Sync> = Arc::new(schemas());
        let mut loader = FormDefsLoader::new();
        let request = loader.begin("orders", &[]);
        let (tx, rx) = mpsc::channel();

        spawn_load(provider, request, tx)
            .join()
            .expect("loader thread finishes");
        let event = rx.recv().expect("loader event sent");
        assert!(loader.apply(event));
        assert_eq!(names(&loader), vec!["number"]);
    }

    #[test]
    fn post_actions_are_required() {
        assert!(extract_post_actions("accounts", json!({"actions": {"PUT": {}}})).is_err());
        assert!(extract_post_actions("accounts", json!({"name": "Accounts"})).is_err());
        assert!(extract_post_actions("accounts", json!([])).is_err());
    }
}
