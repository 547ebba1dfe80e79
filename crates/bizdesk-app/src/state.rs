// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Error, anyhow};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::{
    BoolLabels, FieldHelpers, FormDef, FormDefsLoader, GridApi, LoadRequest, LoaderEvent,
    RefreshOptions, RowId, ViewSet, ViewSetProvider, VisiblePosition, default_copy_data,
    unwrap_envelope, value_text,
};

pub type CopyBuilder = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Per-screen parameters of an [`EntityPage`].
#[derive(Clone)]
pub struct EntityPageConfig {
    pub entity: String,
    pub name_field: String,
    pub exclude_from_copy: Vec<String>,
    pub filter_meta_fields: Vec<String>,
    pub enable_delete: bool,
    pub field_order: Vec<String>,
    pub bool_labels: BoolLabels,
    build_copy_data: Option<CopyBuilder>,
}

impl EntityPageConfig {
    pub fn new(entity: impl Into<String>, name_field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            name_field: name_field.into(),
            exclude_from_copy: Vec::new(),
            filter_meta_fields: Vec::new(),
            enable_delete: false,
            field_order: Vec::new(),
            bool_labels: BoolLabels::default(),
            build_copy_data: None,
        }
    }

    pub fn with_exclude_from_copy(mut self, fields: Vec<String>) -> Self {
        self.exclude_from_copy = fields;
        self
    }

    pub fn with_filter_meta_fields(mut self, fields: Vec<String>) -> Self {
        self.filter_meta_fields = fields;
        self
    }

    pub fn with_delete(mut self, enable: bool) -> Self {
        self.enable_delete = enable;
        self
    }

    pub fn with_field_order(mut self, fields: Vec<String>) -> Self {
        self.field_order = fields;
        self
    }

    pub fn with_bool_labels(mut self, labels: BoolLabels) -> Self {
        self.bool_labels = labels;
        self
    }

    /// Replaces the default copy stripper. `exclude_from_copy` is then ignored.
    pub fn with_copy_builder(
        mut self,
        builder: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.build_copy_data = Some(Arc::new(builder));
        self
    }

    pub fn build_copy_data(&self, row: &Value) -> Value {
        match &self.build_copy_data {
            Some(builder) => builder(row),
            None => default_copy_data(row, &self.exclude_from_copy),
        }
    }
}

impl fmt::Debug for EntityPageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityPageConfig")
            .field("entity", &self.entity)
            .field("name_field", &self.name_field)
            .field("exclude_from_copy", &self.exclude_from_copy)
            .field("filter_meta_fields", &self.filter_meta_fields)
            .field("enable_delete", &self.enable_delete)
            .field("field_order", &self.field_order)
            .field("bool_labels", &self.bool_labels)
            .field("custom_copy_builder", &self.build_copy_data.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Creating,
    Copying,
    Viewing,
    Editing,
    Deleting,
}

impl ViewState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::Copying => "copying",
            Self::Viewing => "viewing",
            Self::Editing => "editing",
            Self::Deleting => "deleting",
        }
    }
}

/// Operation class a feedback entry belongs to. One entry per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKey {
    Create,
    Update,
    Delete,
    Metadata,
}

impl FeedbackKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Metadata => "metadata",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLevel {
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub key: FeedbackKey,
    pub level: FeedbackLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePrompt {
    pub row_id: RowId,
    pub name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageCommand {
    OpenCreate,
    OpenView(Value),
    CloseView,
    EditViewed,
    CloseEdit,
    CancelDelete,
    DismissFeedback(FeedbackKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    ViewStateChanged(ViewState),
    EditOpened(Option<Value>),
    EditClosed,
    ViewOpened(Value),
    ViewClosed,
    SelectionChanged {
        selected: usize,
        copy_disabled: bool,
        delete_disabled: bool,
    },
    DeletePrompted(DeletePrompt),
    FeedbackSet(Feedback),
    FeedbackDismissed(FeedbackKey),
    GridRefreshed(RefreshOptions),
    RowPatched(RowId),
    MetaLoaded(usize),
    MetaFailed(String),
}

/// State and handlers behind one generic CRUD screen.
///
/// Drawer flags are independent of each other; `view_state` records which
/// flow the user is in. Handlers that touch the grid or the backend take
/// them as arguments and never store them.
#[derive(Debug, Clone)]
pub struct EntityPage {
    config: EntityPageConfig,
    loader: FormDefsLoader,
    helpers: FieldHelpers,
    view_state: ViewState,
    edit_flow: ViewState,
    edit_open: bool,
    view_open: bool,
    edit_data: Option<Value>,
    view_row: Option<Value>,
    copy_disabled: bool,
    delete_disabled: bool,
    delete_prompt: Option<DeletePrompt>,
    feedback: Vec<Feedback>,
}

impl EntityPage {
    pub fn new(config: EntityPageConfig) -> Self {
        let loader = FormDefsLoader::new().with_meta_filter(config.filter_meta_fields.clone());
        let helpers = FieldHelpers::default().with_bool_labels(config.bool_labels.clone());
        Self {
            config,
            loader,
            helpers,
            view_state: ViewState::Idle,
            edit_flow: ViewState::Creating,
            edit_open: false,
            view_open: false,
            edit_data: None,
            view_row: None,
            copy_disabled: true,
            delete_disabled: true,
            delete_prompt: None,
            feedback: Vec::new(),
        }
    }

    pub fn dispatch(&mut self, command: PageCommand) -> Vec<PageEvent> {
        match command {
            PageCommand::OpenCreate => self.open_edit(ViewState::Creating, None),
            PageCommand::OpenView(row) => {
                self.view_row = Some(row.clone());
                self.view_open = true;
                let mut events = vec![PageEvent::ViewOpened(row)];
                self.transition(ViewState::Viewing, &mut events);
                events
            }
            PageCommand::CloseView => self.close_view(),
            PageCommand::EditViewed => match self.view_row.clone() {
                Some(row) => self.open_edit(ViewState::Editing, Some(row)),
                None => Vec::new(),
            },
            PageCommand::CloseEdit => self.close_edit(),
            PageCommand::CancelDelete => {
                if self.delete_prompt.take().is_none() {
                    return Vec::new();
                }
                let mut events = Vec::new();
                self.settle(&mut events);
                events
            }
            PageCommand::DismissFeedback(key) => {
                let before = self.feedback.len();
                self.feedback.retain(|entry| entry.key != key);
                if self.feedback.len() == before {
                    Vec::new()
                } else {
                    vec![PageEvent::FeedbackDismissed(key)]
                }
            }
        }
    }

    /// Starts a metadata load to be completed with [`EntityPage::apply_meta`].
    pub fn begin_meta_load(&mut self) -> LoadRequest {
        self.loader
            .begin(&self.config.entity, &self.config.field_order)
    }

    pub fn apply_meta(&mut self, event: LoaderEvent) -> Vec<PageEvent> {
        if !self.loader.apply(event) {
            return Vec::new();
        }
        self.after_meta()
    }

    pub fn load_meta(&mut self, provider: &dyn ViewSetProvider) -> Vec<PageEvent> {
        let entity = self.config.entity.clone();
        if !self
            .loader
            .load(provider, &entity, &self.config.field_order)
        {
            return Vec::new();
        }
        self.after_meta()
    }

    fn after_meta(&mut self) -> Vec<PageEvent> {
        self.helpers = FieldHelpers::new(self.loader.form_defs())
            .with_bool_labels(self.config.bool_labels.clone());
        match self.loader.error() {
            Some(error) => {
                let error = error.to_owned();
                let mut events = vec![PageEvent::MetaFailed(error.clone())];
                events.push(self.set_feedback(
                    FeedbackKey::Metadata,
                    FeedbackLevel::Error,
                    format!("could not load {} fields: {error}", self.config.entity),
                ));
                events
            }
            None => {
                let mut events = vec![PageEvent::MetaLoaded(self.loader.form_defs().len())];
                if self.feedback_for(FeedbackKey::Metadata).is_some() {
                    let dismiss = PageCommand::DismissFeedback(FeedbackKey::Metadata);
                    events.extend(self.dispatch(dismiss));
                }
                events
            }
        }
    }

    pub fn on_grid_ready(&mut self, grid: &dyn GridApi) -> Vec<PageEvent> {
        self.on_selection_changed(grid)
    }

    pub fn on_selection_changed(&mut self, grid: &dyn GridApi) -> Vec<PageEvent> {
        let selected = grid.selected_rows().len();
        self.copy_disabled = selected != 1;
        self.delete_disabled = selected != 1 || !self.config.enable_delete;
        vec![PageEvent::SelectionChanged {
            selected,
            copy_disabled: self.copy_disabled,
            delete_disabled: self.delete_disabled,
        }]
    }

    pub fn on_row_clicked(&mut self, row: Value) -> Vec<PageEvent> {
        self.dispatch(PageCommand::OpenView(row))
    }

    /// Opens the edit drawer with a copy of the single selected row.
    pub fn open_copy(&mut self, grid: &dyn GridApi) -> Vec<PageEvent> {
        let Some(row) = single_selection(grid) else {
            tracing::debug!(entity = self.config.entity.as_str(), "copy needs one selected row");
            return Vec::new();
        };
        let copy = self.config.build_copy_data(&row);
        self.open_edit(ViewState::Copying, Some(copy))
    }

    /// Asks for confirmation before deleting the single selected row.
    pub fn open_delete(&mut self, grid: &dyn GridApi) -> Vec<PageEvent> {
        if !self.config.enable_delete {
            return Vec::new();
        }
        let Some(row) = single_selection(grid) else {
            tracing::debug!(entity = self.config.entity.as_str(), "delete needs one selected row");
            return Vec::new();
        };
        let Some(row_id) = RowId::of_row(&row) else {
            tracing::debug!(entity = self.config.entity.as_str(), "selected row has no id");
            return Vec::new();
        };

        let name = match row.get(&self.config.name_field).map(value_text) {
            Some(name) if !name.is_empty() => name,
            _ => row_id.to_string(),
        };
        let prompt = DeletePrompt {
            message: format!("Delete \"{name}\"? This cannot be undone."),
            row_id,
            name,
        };
        self.delete_prompt = Some(prompt.clone());

        let mut events = vec![PageEvent::DeletePrompted(prompt)];
        self.transition(ViewState::Deleting, &mut events);
        events
    }

    pub fn confirm_delete(
        &mut self,
        view_set: &dyn ViewSet,
        grid: &mut dyn GridApi,
    ) -> Vec<PageEvent> {
        let Some(prompt) = self.delete_prompt.take() else {
            return Vec::new();
        };

        let mut events = vec![self.set_feedback(
            FeedbackKey::Delete,
            FeedbackLevel::Loading,
            format!("Deleting \"{}\"...", prompt.name),
        )];

        match view_set.delete(&prompt.row_id) {
            Ok(()) => {
                tracing::debug!(
                    entity = self.config.entity.as_str(),
                    id = prompt.row_id.as_str(),
                    "row deleted"
                );
                events.push(self.set_feedback(
                    FeedbackKey::Delete,
                    FeedbackLevel::Success,
                    format!("Deleted \"{}\"", prompt.name),
                ));
                events.push(refresh(grid, RefreshOptions::default()));

                let viewing_deleted = self
                    .view_row
                    .as_ref()
                    .and_then(RowId::of_row)
                    .is_some_and(|id| id == prompt.row_id);
                if viewing_deleted {
                    events.extend(self.close_view());
                    return events;
                }
            }
            Err(error) => events.extend(self.handle_failure(FeedbackKey::Delete, &error)),
        }

        self.settle(&mut events);
        events
    }

    /// Sends the edit drawer's data as a create or an update.
    ///
    /// The open flow decides: creating and copying always create, even when a
    /// custom copy builder kept the source id. Only editing updates.
    pub fn submit(
        &mut self,
        view_set: &dyn ViewSet,
        grid: &mut dyn GridApi,
        data: &Value,
    ) -> Vec<PageEvent> {
        if !self.edit_open {
            tracing::debug!(entity = self.config.entity.as_str(), "submit without open form");
            return Vec::new();
        }

        if self.edit_flow != ViewState::Editing {
            return match view_set.create(data) {
                Ok(response) => self.handle_create_success(grid, &response),
                Err(error) => self.handle_failure(FeedbackKey::Create, &error),
            };
        }

        let id = self
            .edit_data
            .as_ref()
            .and_then(RowId::of_row)
            .or_else(|| self.view_row.as_ref().and_then(RowId::of_row));
        let Some(id) = id else {
            let error = anyhow!("the edited row has no id");
            return self.handle_failure(FeedbackKey::Update, &error);
        };
        match view_set.update(&id, data) {
            Ok(response) => self.handle_update_success(grid, &response),
            Err(error) => self.handle_failure(FeedbackKey::Update, &error),
        }
    }

    /// Refreshes the grid, closes the form and shows the new row when it has an id.
    pub fn handle_create_success(
        &mut self,
        grid: &mut dyn GridApi,
        response: &Value,
    ) -> Vec<PageEvent> {
        let entity = unwrap_envelope(response).clone();
        let mut events = vec![
            self.set_feedback(
                FeedbackKey::Create,
                FeedbackLevel::Success,
                format!("Created {}", self.display_name(&entity)),
            ),
            refresh(grid, RefreshOptions::default()),
        ];

        self.edit_open = false;
        self.edit_data = None;
        events.push(PageEvent::EditClosed);

        if RowId::of_row(&entity).is_some() {
            self.view_row = Some(entity.clone());
            self.view_open = true;
            events.push(PageEvent::ViewOpened(entity));
        } else {
            tracing::debug!(
                entity = self.config.entity.as_str(),
                "create response has no id; skipping view"
            );
        }

        self.settle(&mut events);
        events
    }

    /// Patches the row in place when it is on the grid's current page, else refreshes.
    pub fn handle_update_success(
        &mut self,
        grid: &mut dyn GridApi,
        response: &Value,
    ) -> Vec<PageEvent> {
        let entity = unwrap_envelope(response).clone();
        let mut events = vec![self.set_feedback(
            FeedbackKey::Update,
            FeedbackLevel::Success,
            format!("Saved {}", self.display_name(&entity)),
        )];

        let row_id = RowId::of_row(&entity);
        match &row_id {
            Some(id) if grid.row_node(id).is_some() => {
                grid.set_row_data(id, entity.clone());
                grid.ensure_node_visible(id, VisiblePosition::Middle);
                events.push(PageEvent::RowPatched(id.clone()));
            }
            _ => events.push(refresh(grid, RefreshOptions::default())),
        }

        if row_id.is_some() {
            self.view_row = Some(entity);
        }

        self.edit_open = false;
        self.edit_data = None;
        events.push(PageEvent::EditClosed);
        self.settle(&mut events);
        events
    }

    /// Records a failed operation. Drawers and form data are left as they are.
    pub fn handle_failure(&mut self, key: FeedbackKey, error: &Error) -> Vec<PageEvent> {
        tracing::warn!(
            entity = self.config.entity.as_str(),
            operation = key.as_str(),
            "{error:#}"
        );
        let detail = format!("{error:#}");
        let message = if detail.trim().is_empty() {
            format!("could not {} {}", key.as_str(), self.config.entity)
        } else {
            format!("could not {} {}: {detail}", key.as_str(), self.config.entity)
        };
        vec![self.set_feedback(key, FeedbackLevel::Error, message)]
    }

    pub fn config(&self) -> &EntityPageConfig {
        &self.config
    }

    pub fn form_defs(&self) -> &[FormDef] {
        self.loader.form_defs()
    }

    pub fn header_meta(&self) -> &Value {
        self.loader.header_meta()
    }

    /// Page-level blocking error from the last metadata load.
    pub fn meta_error(&self) -> Option<&str> {
        self.loader.error()
    }

    pub fn is_meta_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn helpers(&self) -> &FieldHelpers {
        &self.helpers
    }

    pub fn view_state(&self) -> ViewState {
        self.view_state
    }

    pub fn edit_open(&self) -> bool {
        self.edit_open
    }

    pub fn view_open(&self) -> bool {
        self.view_open
    }

    pub fn edit_data(&self) -> Option<&Value> {
        self.edit_data.as_ref()
    }

    pub fn view_row(&self) -> Option<&Value> {
        self.view_row.as_ref()
    }

    pub fn copy_disabled(&self) -> bool {
        self.copy_disabled
    }

    pub fn delete_disabled(&self) -> bool {
        self.delete_disabled
    }

    pub fn delete_prompt(&self) -> Option<&DeletePrompt> {
        self.delete_prompt.as_ref()
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    pub fn feedback_for(&self, key: FeedbackKey) -> Option<&Feedback> {
        self.feedback.iter().find(|entry| entry.key == key)
    }

    fn open_edit(&mut self, flow: ViewState, data: Option<Value>) -> Vec<PageEvent> {
        self.edit_flow = flow;
        self.edit_data = data.clone();
        self.edit_open = true;
        let mut events = vec![PageEvent::EditOpened(data)];
        self.transition(flow, &mut events);
        events
    }

    fn close_edit(&mut self) -> Vec<PageEvent> {
        if !self.edit_open {
            return Vec::new();
        }
        self.edit_open = false;
        self.edit_data = None;
        let mut events = vec![PageEvent::EditClosed];
        self.settle(&mut events);
        events
    }

    fn close_view(&mut self) -> Vec<PageEvent> {
        if !self.view_open && self.view_row.is_none() {
            return Vec::new();
        }
        self.view_open = false;
        self.view_row = None;
        let mut events = vec![PageEvent::ViewClosed];
        self.settle(&mut events);
        events
    }

    /// Moves to whatever state the open drawers imply.
    fn settle(&mut self, events: &mut Vec<PageEvent>) {
        let next = if self.delete_prompt.is_some() {
            ViewState::Deleting
        } else if self.edit_open {
            self.edit_flow
        } else if self.view_open {
            ViewState::Viewing
        } else {
            ViewState::Idle
        };
        self.transition(next, events);
    }

    fn transition(&mut self, next: ViewState, events: &mut Vec<PageEvent>) {
        if self.view_state != next {
            tracing::debug!(
                entity = self.config.entity.as_str(),
                from = self.view_state.as_str(),
                to = next.as_str(),
                "page transition"
            );
            self.view_state = next;
            events.push(PageEvent::ViewStateChanged(next));
        }
    }

    fn set_feedback(
        &mut self,
        key: FeedbackKey,
        level: FeedbackLevel,
        message: String,
    ) -> PageEvent {
        let entry = Feedback {
            key,
            level,
            message,
        };
        self.feedback.retain(|existing| existing.key != key);
        self.feedback.push(entry.clone());
        PageEvent::FeedbackSet(entry)
    }

    fn display_name(&self, row: &Value) -> String {
        match row.get(&self.config.name_field).map(value_text) {
            Some(name) if !name.is_empty() => format!("\"{name}\""),
            _ => self.config.entity.clone(),
        }
    }
}

fn single_selection(grid: &dyn GridApi) -> Option<Value> {
    let mut selected = grid.selected_rows();
    if selected.len() == 1 {
        selected.pop()
    } else {
        None
    }
}

fn refresh(grid: &mut dyn GridApi, options: RefreshOptions) -> PageEvent {
    grid.refresh_server_side(options);
    PageEvent::GridRefreshed(options)
}
