// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use bizdesk_app::{
    GridApi, ListPage, ListQuery, RefreshOptions, RowId, ViewSet, ViewSetProvider,
    VisiblePosition,
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const ACCOUNT_ADJECTIVES: [&str; 10] = [
    "Northern", "Summit", "Harbor", "Granite", "Bright", "Cedar", "Atlas", "Pioneer", "Union",
    "Silver",
];

const ACCOUNT_NOUNS: [&str; 8] = [
    "Logistics",
    "Foods",
    "Textiles",
    "Machining",
    "Packaging",
    "Supply",
    "Plastics",
    "Components",
];

const ACCOUNT_SUFFIXES: [&str; 5] = ["Ltd", "GmbH", "Inc", "Co", "Group"];
const ACCOUNT_STATUSES: [&str; 3] = ["active", "on_hold", "closed"];
const CITIES: [&str; 6] = ["Oslo", "Lyon", "Leeds", "Porto", "Graz", "Turku"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Options,
    List,
    Retrieve,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Options(String),
    List(String, ListQuery),
    Retrieve(String, RowId),
    Create(String, Value),
    Update(String, RowId, Value),
    Delete(String, RowId),
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Options(_) => Operation::Options,
            Self::List(..) => Operation::List,
            Self::Retrieve(..) => Operation::Retrieve,
            Self::Create(..) => Operation::Create,
            Self::Update(..) => Operation::Update,
            Self::Delete(..) => Operation::Delete,
        }
    }
}

#[derive(Debug, Default)]
struct BackendState {
    schemas: HashMap<String, Value>,
    tables: HashMap<String, Vec<Value>>,
    failures: HashMap<(String, Operation), String>,
    calls: Vec<Call>,
    next_id: i64,
    wrap_responses: bool,
}

/// In-memory CRUD backend shared by every view-set it hands out.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        backend.lock().next_id = 1000;
        backend
    }

    pub fn with_entity(self, entity: &str, options: Value, rows: Vec<Value>) -> Self {
        {
            let mut state = self.lock();
            state.schemas.insert(entity.to_owned(), options);
            state.tables.insert(entity.to_owned(), rows);
        }
        self
    }

    /// Wraps create/update responses as `{data: ...}`.
    pub fn with_wrapped_responses(self) -> Self {
        self.lock().wrap_responses = true;
        self
    }

    /// Makes every later `operation` on `entity` fail with `message`.
    pub fn fail(&self, entity: &str, operation: Operation, message: &str) {
        self.lock()
            .failures
            .insert((entity.to_owned(), operation), message.to_owned());
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn calls_of(&self, operation: Operation) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .cloned()
            .collect()
    }

    pub fn rows(&self, entity: &str) -> Vec<Value> {
        self.lock().tables.get(entity).cloned().unwrap_or_default()
    }

    pub fn row(&self, entity: &str, id: &RowId) -> Option<Value> {
        self.rows(entity)
            .into_iter()
            .find(|row| RowId::of_row(row).as_ref() == Some(id))
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, entity: &str, call: Call) -> Result<()> {
        let mut state = self.lock();
        let operation = call.operation();
        state.calls.push(call);
        match state.failures.get(&(entity.to_owned(), operation)) {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

impl ViewSetProvider for FakeBackend {
    fn view_set(&self, entity: &str) -> Box<dyn ViewSet + '_> {
        Box::new(FakeViewSet {
            entity: entity.to_owned(),
            backend: self,
        })
    }
}

pub struct FakeViewSet<'a> {
    entity: String,
    backend: &'a FakeBackend,
}

impl FakeViewSet<'_> {
    fn respond(&self, row: Value) -> Value {
        if self.backend.lock().wrap_responses {
            json!({ "data": row })
        } else {
            row
        }
    }

    fn not_found(&self, id: &RowId) -> anyhow::Error {
        anyhow!("server error (404): no {} with id {id}", self.entity)
    }
}

impl ViewSet for FakeViewSet<'_> {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn options(&self) -> Result<Value> {
        self.backend
            .record(&self.entity, Call::Options(self.entity.clone()))?;
        self.backend
            .lock()
            .schemas
            .get(&self.entity)
            .cloned()
            .ok_or_else(|| anyhow!("server error (404): unknown entity {}", self.entity))
    }

    fn list(&self, query: &ListQuery) -> Result<ListPage> {
        self.backend
            .record(&self.entity, Call::List(self.entity.clone(), query.clone()))?;
        let rows = self.backend.rows(&self.entity);
        let needle = query.search.as_deref().map(str::to_lowercase);
        let matched: Vec<Value> = rows
            .into_iter()
            .filter(|row| match &needle {
                Some(needle) => row_matches(row, needle),
                None => true,
            })
            .collect();

        let count = matched.len() as u64;
        let page_size = query.page_size.map_or(matched.len(), |size| size as usize);
        let page = query.page.unwrap_or(1).max(1) as usize;
        let rows = matched
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();
        Ok(ListPage {
            rows,
            count: Some(count),
        })
    }

    fn retrieve(&self, id: &RowId) -> Result<Value> {
        self.backend
            .record(&self.entity, Call::Retrieve(self.entity.clone(), id.clone()))?;
        self.backend
            .row(&self.entity, id)
            .ok_or_else(|| self.not_found(id))
    }

    fn create(&self, data: &Value) -> Result<Value> {
        self.backend
            .record(&self.entity, Call::Create(self.entity.clone(), data.clone()))?;
        let Value::Object(fields) = data else {
            bail!("server error (400): expected an object");
        };

        let row = {
            let mut state = self.backend.lock();
            state.next_id += 1;
            let mut row = Map::new();
            row.insert("id".to_owned(), json!(state.next_id));
            for (key, value) in fields {
                if key != "id" {
                    row.insert(key.clone(), value.clone());
                }
            }
            let row = Value::Object(row);
            state
                .tables
                .entry(self.entity.clone())
                .or_default()
                .push(row.clone());
            row
        };
        Ok(self.respond(row))
    }

    fn update(&self, id: &RowId, data: &Value) -> Result<Value> {
        self.backend.record(
            &self.entity,
            Call::Update(self.entity.clone(), id.clone(), data.clone()),
        )?;
        let Value::Object(fields) = data else {
            bail!("server error (400): expected an object");
        };

        let updated = {
            let mut state = self.backend.lock();
            let row = state
                .tables
                .get_mut(&self.entity)
                .and_then(|rows| {
                    rows.iter_mut()
                        .find(|row| RowId::of_row(row).as_ref() == Some(id))
                })
                .ok_or_else(|| self.not_found(id))?;
            if let Value::Object(existing) = row {
                for (key, value) in fields {
                    if key != "id" && key != "pk" {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
            row.clone()
        };
        Ok(self.respond(updated))
    }

    fn delete(&self, id: &RowId) -> Result<()> {
        self.backend
            .record(&self.entity, Call::Delete(self.entity.clone(), id.clone()))?;
        let mut state = self.backend.lock();
        let rows = state.tables.entry(self.entity.clone()).or_default();
        let before = rows.len();
        rows.retain(|row| RowId::of_row(row).as_ref() != Some(id));
        if rows.len() == before {
            return Err(self.not_found(id));
        }
        Ok(())
    }
}

fn row_matches(row: &Value, needle: &str) -> bool {
    match row {
        Value::Object(fields) => fields.values().any(|value| match value {
            Value::String(text) => text.to_lowercase().contains(needle),
            _ => false,
        }),
        _ => false,
    }
}

/// Server-side grid double holding one loaded page and recording calls.
#[derive(Debug, Clone, Default)]
pub struct FakeGrid {
    pub rows: Vec<Value>,
    pub selected: Vec<RowId>,
    pub refreshes: Vec<RefreshOptions>,
    pub patches: Vec<RowId>,
    pub scrolled: Vec<(RowId, VisiblePosition)>,
}

impl FakeGrid {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn select(&mut self, ids: &[RowId]) {
        self.selected = ids.to_vec();
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    fn position(&self, id: &RowId) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| RowId::of_row(row).as_ref() == Some(id))
    }
}

impl GridApi for FakeGrid {
    fn selected_rows(&self) -> Vec<Value> {
        self.selected
            .iter()
            .filter_map(|id| self.position(id).map(|index| self.rows[index].clone()))
            .collect()
    }

    fn row_node(&self, id: &RowId) -> Option<Value> {
        self.position(id).map(|index| self.rows[index].clone())
    }

    fn set_row_data(&mut self, id: &RowId, data: Value) {
        if let Some(index) = self.position(id) {
            self.rows[index] = data;
        }
        self.patches.push(id.clone());
    }

    fn refresh_server_side(&mut self, options: RefreshOptions) {
        self.refreshes.push(options);
    }

    fn ensure_node_visible(&mut self, id: &RowId, position: VisiblePosition) {
        self.scrolled.push((id.clone(), position));
    }
}

/// Schema response for an `accounts` endpoint.
pub fn account_options() -> Value {
    json!({
        "name": "Account List",
        "actions": {
            "POST": {
                "id": {"type": "integer", "required": false, "read_only": true, "label": "ID"},
                "account_name": {
                    "type": "string",
                    "required": true,
                    "read_only": false,
                    "label": "Account name"
                },
                "status": {
                    "type": "choice",
                    "required": true,
                    "read_only": false,
                    "label": "Status",
                    "choices": [
                        {"value": "active", "display_name": "Active"},
                        {"value": "on_hold", "display_name": "On hold"},
                        {"value": "closed", "display_name": "Closed"}
                    ]
                },
                "is_key_account": {
                    "type": "boolean",
                    "required": "false",
                    "read_only": "false",
                    "label": "Key account"
                },
                "founded": {"type": "date", "required": false, "read_only": false, "label": "Founded"},
                "credit_limit": {
                    "type": "decimal",
                    "required": false,
                    "read_only": false,
                    "label": "Credit limit"
                },
                "address": {
                    "type": "nested object",
                    "required": false,
                    "read_only": false,
                    "label": "Address",
                    "children": {
                        "street": {"type": "string", "required": false, "read_only": false, "label": "Street"},
                        "city": {"type": "string", "required": false, "read_only": false, "label": "City"}
                    }
                },
                "updated_at": {
                    "type": "datetime",
                    "required": false,
                    "read_only": true,
                    "label": "Updated at"
                },
                "allowed_actions": {
                    "type": "list",
                    "required": false,
                    "read_only": true,
                    "label": "Allowed actions",
                    "child": {"type": "string", "required": false, "read_only": true}
                }
            }
        }
    })
}

/// Schema response for an `orders` endpoint with nested line items.
pub fn order_options() -> Value {
    json!({
        "name": "Order List",
        "actions": {
            "POST": {
                "id": {"type": "integer", "read_only": 1, "label": "ID"},
                "number": {"type": "string", "required": 1, "label": "Order number"},
                "account": {"type": "field", "required": 1, "label": "Account"},
                "total": {"type": "decimal", "read_only": 1, "label": "Total"},
                "lines": {
                    "type": "list",
                    "label": "Lines",
                    "child": {
                        "type": "nested object",
                        "children": {
                            "id": {"type": "integer", "read_only": true, "label": "ID"},
                            "sku": {"type": "string", "required": true, "label": "SKU"},
                            "quantity": {"type": "integer", "required": true, "label": "Quantity"}
                        }
                    }
                },
                "payments": {"type": "list", "read_only": 1, "label": "Payments"},
                "production_orders": {"type": "list", "read_only": 1, "label": "Production orders"},
                "created_at": {"type": "datetime", "read_only": 1, "label": "Created at"}
            }
        }
    })
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator of backend rows for the fixture schemas.
#[derive(Debug, Clone)]
pub struct RecordFaker {
    rng: DeterministicRng,
    next_id: i64,
}

impl RecordFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            next_id: 0,
        }
    }

    pub fn account(&mut self) -> Value {
        self.next_id += 1;
        let name = format!(
            "{} {} {}",
            self.pick(&ACCOUNT_ADJECTIVES),
            self.pick(&ACCOUNT_NOUNS),
            self.pick(&ACCOUNT_SUFFIXES)
        );
        json!({
            "id": self.next_id,
            "account_name": name,
            "status": self.pick(&ACCOUNT_STATUSES),
            "is_key_account": self.rng.bool(),
            "founded": format!(
                "{}-{:02}-{:02}",
                1950 + self.rng.int_n(70),
                1 + self.rng.int_n(12),
                1 + self.rng.int_n(28)
            ),
            "credit_limit": format!("{}.00", 1_000 * (1 + self.rng.int_n(500))),
            "address": {
                "id": 500 + self.next_id,
                "street": format!("{} Quay", self.rng.int_n(200) + 1),
                "city": self.pick(&CITIES)
            },
            "created_at": fixture_datetime(),
            "updated_at": fixture_datetime(),
            "allowed_actions": ["view", "change"]
        })
    }

    pub fn accounts(&mut self, count: usize) -> Vec<Value> {
        (0..count).map(|_| self.account()).collect()
    }

    pub fn order(&mut self, account: &Value) -> Value {
        self.next_id += 1;
        let lines: Vec<Value> = (0..1 + self.rng.int_n(3))
            .map(|index| {
                json!({
                    "id": 9000 + index,
                    "sku": format!("SKU-{:04}", self.rng.int_n(10_000)),
                    "quantity": 1 + self.rng.int_n(20)
                })
            })
            .collect();
        json!({
            "id": self.next_id,
            "number": format!("SO-{:05}", self.next_id),
            "account": account.get("id").cloned().unwrap_or(Value::Null),
            "total": format!("{}.50", 100 + self.rng.int_n(9_000)),
            "lines": lines,
            "payments": [{"id": 1, "amount": "10.00"}],
            "production_orders": [],
            "created_at": fixture_datetime()
        })
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Call, FakeBackend, FakeGrid, Operation, RecordFaker, account_options, order_options,
    };
    use bizdesk_app::{GridApi, ListQuery, RowId, ViewSetProvider, convert_to_form_defs};
    use serde_json::json;

    #[test]
    fn faker_is_deterministic_per_seed() {
        let mut left = RecordFaker::new(42);
        let mut right = RecordFaker::new(42);
        assert_eq!(left.accounts(3), right.accounts(3));
    }

    #[test]
    fn fixture_schemas_normalize() {
        let accounts = convert_to_form_defs(&account_options()["actions"]["POST"]);
        assert!(accounts.iter().any(|def| def.field == "allowed_actions"));
        let orders = convert_to_form_defs(&order_options()["actions"]["POST"]);
        assert!(orders.iter().any(|def| def.field == "lines"));
    }

    #[test]
    fn backend_crud_round() -> anyhow::Result<()> {
        let backend = FakeBackend::new().with_entity("accounts", account_options(), Vec::new());
        let view_set = backend.view_set("accounts");

        let created = view_set.create(&json!({"id": 5, "account_name": "Acme"}))?;
        let id = RowId::of_row(&created).expect("created row has id");
        assert_ne!(id, RowId::from(5));

        let updated = view_set.update(&id, &json!({"status": "closed"}))?;
        assert_eq!(updated["account_name"], "Acme");
        assert_eq!(updated["status"], "closed");

        let page = view_set.list(&ListQuery::search("acm"))?;
        assert_eq!(page.rows.len(), 1);

        view_set.delete(&id)?;
        assert!(view_set.retrieve(&id).is_err());
        assert_eq!(backend.calls_of(Operation::Delete).len(), 1);
        Ok(())
    }

    #[test]
    fn injected_failure_is_recorded_and_returned() {
        let backend = FakeBackend::new().with_entity("accounts", account_options(), Vec::new());
        backend.fail("accounts", Operation::Options, "server error (500): boom");
        let error = backend
            .view_set("accounts")
            .options()
            .expect_err("injected failure");
        assert!(error.to_string().contains("boom"));
        assert_eq!(backend.calls(), vec![Call::Options("accounts".to_owned())]);
    }

    #[test]
    fn list_pages_through_rows() -> anyhow::Result<()> {
        let rows = RecordFaker::new(7).accounts(5);
        let backend = FakeBackend::new().with_entity("accounts", account_options(), rows);
        let page = backend.view_set("accounts").list(&ListQuery {
            page: Some(2),
            page_size: Some(2),
            ..ListQuery::default()
        })?;
        assert_eq!(page.count, Some(5));
        assert_eq!(page.rows.len(), 2);
        assert_eq!(RowId::of_row(&page.rows[0]), Some(RowId::from(3)));
        Ok(())
    }

    #[test]
    fn grid_reports_selection_and_patches() {
        let mut grid = FakeGrid::new(RecordFaker::new(1).accounts(2));
        grid.select(&[RowId::from(2)]);
        assert_eq!(grid.selected_rows().len(), 1);

        grid.set_row_data(&RowId::from(2), json!({"id": 2, "account_name": "Patched"}));
        assert_eq!(
            grid.row_node(&RowId::from(2)).map(|row| row["account_name"].clone()),
            Some(json!("Patched"))
        );
        assert!(grid.row_node(&RowId::from(99)).is_none());
    }
}
