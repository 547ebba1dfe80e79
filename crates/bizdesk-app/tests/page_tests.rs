// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use bizdesk_app::{
    EntityPage, EntityPageConfig, FeedbackKey, FeedbackLevel, PageCommand, PageEvent,
    RefreshOptions, RowId, ViewSetProvider, ViewState, VisiblePosition,
};
use bizdesk_testkit::{
    Call, FakeBackend, FakeGrid, Operation, RecordFaker, account_options, order_options,
};
use serde_json::json;

fn accounts_page() -> EntityPage {
    EntityPage::new(
        EntityPageConfig::new("accounts", "account_name")
            .with_filter_meta_fields(vec!["allowed_actions".to_owned()])
            .with_field_order(vec!["account_name".to_owned(), "status".to_owned()])
            .with_delete(true),
    )
}

fn accounts_backend() -> FakeBackend {
    let rows = RecordFaker::new(11).accounts(4);
    FakeBackend::new().with_entity("accounts", account_options(), rows)
}

#[test]
fn metadata_is_filtered_and_ordered() {
    let backend = accounts_backend();
    let mut page = accounts_page();

    let events = page.load_meta(&backend);
    assert!(matches!(events.as_slice(), [PageEvent::MetaLoaded(count)] if *count > 0));

    let fields: Vec<&str> = page.form_defs().iter().map(|def| def.field.as_str()).collect();
    assert_eq!(&fields[..2], &["account_name", "status"]);
    assert!(!fields.contains(&"allowed_actions"));
    assert!(page.header_meta().get("allowed_actions").is_none());
    assert!(page.meta_error().is_none());

    let status = page
        .form_defs()
        .iter()
        .find(|def| def.field == "status")
        .expect("status field loaded");
    assert_eq!(
        page.helpers().render_field_value(status, Some(&json!("on_hold"))),
        "On hold"
    );
}

#[test]
fn metadata_failure_sets_page_error() {
    let backend = accounts_backend();
    backend.fail("accounts", Operation::Options, "server error (503): maintenance");
    let mut page = accounts_page();

    let events = page.load_meta(&backend);
    assert!(matches!(events.first(), Some(PageEvent::MetaFailed(_))));
    assert!(page.form_defs().is_empty());
    assert!(page.meta_error().is_some_and(|error| error.contains("maintenance")));
    assert_eq!(
        page.feedback_for(FeedbackKey::Metadata).map(|entry| entry.level),
        Some(FeedbackLevel::Error)
    );

    backend.clear_failures();
    page.load_meta(&backend);
    assert!(page.meta_error().is_none());
    assert!(page.feedback_for(FeedbackKey::Metadata).is_none());
}

#[test]
fn create_opens_view_of_new_row_and_refreshes() {
    let backend = accounts_backend();
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = accounts_page();

    page.dispatch(PageCommand::OpenCreate);
    assert!(page.edit_open());
    assert!(page.edit_data().is_none());

    let events = page.submit(view_set.as_ref(), &mut grid, &json!({"account_name": "New Co"}));

    assert!(!page.edit_open());
    assert!(page.view_open());
    assert_eq!(page.view_state(), ViewState::Viewing);
    let created_id = page.view_row().and_then(RowId::of_row).expect("view row has id");
    assert_eq!(
        page.view_row().map(|row| row["account_name"].clone()),
        Some(json!("New Co"))
    );
    assert_eq!(grid.refreshes, vec![RefreshOptions { purge: false }]);
    assert!(events.contains(&PageEvent::EditClosed));
    assert!(backend.row("accounts", &created_id).is_some());
}

#[test]
fn create_accepts_wrapped_response() {
    let backend = accounts_backend().with_wrapped_responses();
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::default();
    let mut page = accounts_page();

    page.dispatch(PageCommand::OpenCreate);
    page.submit(view_set.as_ref(), &mut grid, &json!({"account_name": "Wrapped"}));

    assert_eq!(
        page.view_row().map(|row| row["account_name"].clone()),
        Some(json!("Wrapped"))
    );
    assert!(page.view_row().is_some_and(|row| row.get("data").is_none()));
}

#[test]
fn update_patches_row_in_place_when_loaded() {
    let backend = accounts_backend();
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = accounts_page();

    let row = grid.rows[1].clone();
    let id = RowId::of_row(&row).expect("fixture row id");
    page.on_row_clicked(row);
    page.dispatch(PageCommand::EditViewed);
    assert_eq!(page.view_state(), ViewState::Editing);

    page.submit(view_set.as_ref(), &mut grid, &json!({"account_name": "Renamed"}));

    assert_eq!(grid.patches, vec![id.clone()]);
    assert_eq!(grid.scrolled, vec![(id.clone(), VisiblePosition::Middle)]);
    assert!(grid.refreshes.is_empty());
    assert_eq!(grid.rows[1]["account_name"], "Renamed");
    assert_eq!(
        page.view_row().map(|row| row["account_name"].clone()),
        Some(json!("Renamed"))
    );
    assert!(matches!(
        backend.calls_of(Operation::Update).as_slice(),
        [Call::Update(entity, updated, _)] if entity == "accounts" && *updated == id
    ));
}

#[test]
fn update_of_row_on_other_page_refreshes() {
    let backend = accounts_backend();
    let view_set = backend.view_set("accounts");
    let all = backend.rows("accounts");
    let mut grid = FakeGrid::new(all[..2].to_vec());
    let mut page = accounts_page();

    page.on_row_clicked(all[3].clone());
    page.dispatch(PageCommand::EditViewed);
    page.submit(view_set.as_ref(), &mut grid, &json!({"status": "closed"}));

    assert!(grid.patches.is_empty());
    assert_eq!(grid.refreshes.len(), 1);
    assert_eq!(
        page.view_row().map(|row| row["status"].clone()),
        Some(json!("closed"))
    );
}

#[test]
fn failed_update_keeps_drawer_open_for_retry() {
    let backend = accounts_backend();
    backend.fail("accounts", Operation::Update, "server error (400): account_name: taken");
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = accounts_page();

    page.on_row_clicked(grid.rows[0].clone());
    page.dispatch(PageCommand::EditViewed);
    let before = page.edit_data().cloned();

    page.submit(view_set.as_ref(), &mut grid, &json!({"account_name": "Dup"}));
    page.submit(view_set.as_ref(), &mut grid, &json!({"account_name": "Dup"}));

    assert!(page.edit_open());
    assert_eq!(page.view_state(), ViewState::Editing);
    assert_eq!(page.edit_data().cloned(), before);
    assert_eq!(page.feedback().len(), 1);
    let entry = page.feedback_for(FeedbackKey::Update).expect("update feedback");
    assert_eq!(entry.level, FeedbackLevel::Error);
    assert!(entry.message.contains("taken"));
    assert!(grid.refreshes.is_empty());
}

#[test]
fn deleting_viewed_row_closes_view() {
    let backend = accounts_backend();
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = accounts_page();

    let row = grid.rows[2].clone();
    let id = RowId::of_row(&row).expect("fixture row id");
    page.on_row_clicked(row);
    grid.select(std::slice::from_ref(&id));
    page.on_selection_changed(&grid);
    assert!(!page.delete_disabled());

    page.open_delete(&grid);
    assert_eq!(page.view_state(), ViewState::Deleting);
    let events = page.confirm_delete(view_set.as_ref(), &mut grid);

    assert!(!page.view_open());
    assert!(page.view_row().is_none());
    assert_eq!(page.view_state(), ViewState::Idle);
    assert!(events.contains(&PageEvent::ViewClosed));
    assert_eq!(grid.refreshes.len(), 1);
    assert!(backend.row("accounts", &id).is_none());
    assert_eq!(
        page.feedback_for(FeedbackKey::Delete).map(|entry| entry.level),
        Some(FeedbackLevel::Success)
    );
}

#[test]
fn deleting_other_row_keeps_view_open() {
    let backend = accounts_backend();
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = accounts_page();

    page.on_row_clicked(grid.rows[0].clone());
    let other = RowId::of_row(&grid.rows[1]).expect("fixture row id");
    grid.select(&[other]);
    page.on_selection_changed(&grid);
    page.open_delete(&grid);
    page.confirm_delete(view_set.as_ref(), &mut grid);

    assert!(page.view_open());
    assert_eq!(page.view_state(), ViewState::Viewing);
}

#[test]
fn failed_delete_reports_feedback() {
    let backend = accounts_backend();
    backend.fail("accounts", Operation::Delete, "server error (409): account has orders");
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = accounts_page();

    let id = RowId::of_row(&grid.rows[0]).expect("fixture row id");
    grid.select(std::slice::from_ref(&id));
    page.open_delete(&grid);
    page.confirm_delete(view_set.as_ref(), &mut grid);

    assert!(backend.row("accounts", &id).is_some());
    assert!(grid.refreshes.is_empty());
    let entry = page.feedback_for(FeedbackKey::Delete).expect("delete feedback");
    assert_eq!(entry.level, FeedbackLevel::Error);
    assert!(entry.message.contains("account has orders"));
}

#[test]
fn copy_order_strips_identity_and_relations() {
    let mut faker = RecordFaker::new(3);
    let account = faker.account();
    let order = faker.order(&account);
    let backend = FakeBackend::new().with_entity("orders", order_options(), vec![order.clone()]);
    let view_set = backend.view_set("orders");
    let mut grid = FakeGrid::new(backend.rows("orders"));
    let mut page = EntityPage::new(
        EntityPageConfig::new("orders", "number").with_exclude_from_copy(vec![
            "payments".to_owned(),
            "production_orders".to_owned(),
        ]),
    );

    let id = RowId::of_row(&order).expect("order id");
    grid.select(&[id.clone()]);
    page.on_selection_changed(&grid);
    assert!(!page.copy_disabled());
    page.open_copy(&grid);

    assert_eq!(page.view_state(), ViewState::Copying);
    let copy = page.edit_data().cloned().expect("copy data");
    for stripped in ["id", "created_at", "payments", "production_orders"] {
        assert!(copy.get(stripped).is_none(), "{stripped} should be stripped");
    }
    assert_eq!(copy["number"], order["number"]);
    let lines = copy["lines"].as_array().expect("lines kept");
    assert!(lines.iter().all(|line| line.get("id").is_none()));

    page.submit(view_set.as_ref(), &mut grid, &copy);
    assert_eq!(backend.calls_of(Operation::Create).len(), 1);
    assert_eq!(backend.rows("orders").len(), 2);
    assert_ne!(page.view_row().and_then(RowId::of_row), Some(id));
}

#[test]
fn copy_keeping_source_id_still_creates() {
    let backend = accounts_backend();
    let view_set = backend.view_set("accounts");
    let mut grid = FakeGrid::new(backend.rows("accounts"));
    let mut page = EntityPage::new(
        EntityPageConfig::new("accounts", "account_name").with_copy_builder(|row| {
            let mut copy = row.clone();
            copy["account_name"] = json!("Copy of it");
            copy
        }),
    );

    let source = grid.rows[0].clone();
    let source_id = RowId::of_row(&source).expect("fixture row id");
    grid.select(std::slice::from_ref(&source_id));
    page.on_selection_changed(&grid);
    page.open_copy(&grid);
    assert_eq!(page.view_state(), ViewState::Copying);
    assert!(page.edit_data().and_then(RowId::of_row).is_some());

    let copy = page.edit_data().cloned().expect("copy data");
    page.submit(view_set.as_ref(), &mut grid, &copy);

    assert_eq!(backend.calls_of(Operation::Create).len(), 1);
    assert!(backend.calls_of(Operation::Update).is_empty());
    assert_eq!(backend.rows("accounts").len(), 5);
    assert_eq!(
        backend.row("accounts", &source_id).map(|row| row["account_name"].clone()),
        Some(source["account_name"].clone())
    );
    let created = page.view_row().and_then(RowId::of_row).expect("created row id");
    assert_ne!(created, source_id);
    assert_eq!(grid.refreshes, vec![RefreshOptions { purge: false }]);
}
