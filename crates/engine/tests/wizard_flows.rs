mod support;

use serde_json::{Value, json};
use support::{Recorded, SHEET_ID, ScriptedBackend, happy_backend, loaded_wizard, sheet_builder, test_config, wizard_at_grid};
use toolkit_api::ApiError;
use toolkit_engine::{ActionStatus, MessageLevel, StepErrorKind, StepOutcome, Wizard, WizardState};
use toolkit_types::{ToolDefinition, validate_tool_definition};

fn ready(step_id: &str) -> WizardState {
    WizardState::Ready {
        step_id: step_id.to_string(),
    }
}

fn wizard_for(backend: &ScriptedBackend, tool: Value) -> Wizard<ScriptedBackend> {
    let tool: ToolDefinition = serde_json::from_value(tool).expect("parse tool");
    let mut wizard = Wizard::new(backend.clone(), test_config());
    wizard.load_definition(tool);
    wizard
}

fn navigating_tool() -> Value {
    json!({
        "id": "nav-tool",
        "steps": [
            {
                "id": "start",
                "fields": [{ "id": "name", "label": "Name" }],
                "onSubmit": { "action": "navigation", "goToStep": "review" }
            },
            { "id": "middle" },
            { "id": "review" }
        ]
    })
}

fn statuses(wizard: &Wizard<ScriptedBackend>, step_id: &str) -> Vec<ActionStatus> {
    wizard.telemetry().for_step(step_id).map(|event| event.status).collect()
}

#[test]
fn fixture_is_a_valid_tool() {
    validate_tool_definition(&sheet_builder()).expect("fixture validates");
}

#[tokio::test]
async fn load_enters_the_first_step() {
    let backend = happy_backend();
    let wizard = loaded_wizard(&backend).await;

    assert_eq!(wizard.state(), ready("getSheetId"));
    assert_eq!(wizard.history(), ["getSheetId".to_string()]);
    assert_eq!(backend.calls(), vec![Recorded::FetchTool("sheet-builder".into())]);
    let fields = wizard.visible_fields();
    let labels: Vec<&str> = fields.iter().map(|view| view.field.display_label()).collect();
    assert_eq!(labels, vec!["Sheet ID"]);
}

#[tokio::test]
async fn failed_load_leaves_no_current_step() {
    let backend = ScriptedBackend::default();
    let mut wizard = Wizard::new(backend.clone(), test_config());
    wizard.load_tool("missing-tool").await;

    match wizard.state() {
        WizardState::LoadFailed { message } => assert!(message.contains("missing-tool"), "{message}"),
        other => panic!("expected load failure, got {other:?}"),
    }
    assert!(wizard.current_step().is_none());
    assert_eq!(wizard.advance_step("getSheetId").await, StepOutcome::Ignored);
}

#[tokio::test]
async fn stale_advance_is_ignored() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!(SHEET_ID));

    assert_eq!(wizard.advance_step("chooseTemplate").await, StepOutcome::Ignored);
    assert_eq!(wizard.state(), ready("getSheetId"));
    assert!(backend.called_endpoints().is_empty());
}

#[tokio::test]
async fn empty_required_field_blocks_without_network() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!("   "));

    assert_eq!(wizard.advance_step("getSheetId").await, StepOutcome::Invalid);
    assert_eq!(wizard.validation_errors().get("sheetId").map(String::as_str), Some("Sheet ID is required."));
    assert_eq!(wizard.state(), ready("getSheetId"));
    assert!(backend.called_endpoints().is_empty());
}

#[tokio::test]
async fn sheet_lookup_prefills_the_next_step() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!(SHEET_ID));

    assert_eq!(wizard.advance_step("getSheetId").await, StepOutcome::Navigated("chooseTemplate".into()));
    assert_eq!(backend.called_endpoints(), vec![format!("GET /sheet/{SHEET_ID}")]);
    assert_eq!(wizard.session().response_data["sheetInfo"]["title"], json!("Budget 2026"));
    assert_eq!(wizard.session().field_value("chooseTemplate", "title"), Some(&json!("Budget 2026")));

    let message = wizard.message().expect("server message");
    assert_eq!(message.level, MessageLevel::Info);
    assert_eq!(message.message, "Sheet found");
}

#[tokio::test]
async fn hidden_required_field_does_not_block() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!(SHEET_ID));
    wizard.advance_step("getSheetId").await;

    wizard.update_field("category", json!("finance"));
    wizard.update_field("template", json!("custom"));
    assert_eq!(wizard.advance_step("chooseTemplate").await, StepOutcome::Invalid);
    assert_eq!(
        wizard.validation_errors().get("columns").map(String::as_str),
        Some("Custom columns is required.")
    );

    wizard.update_field("template", json!("budget"));
    assert!(wizard.validation_errors().is_empty());
    assert_eq!(wizard.advance_step("chooseTemplate").await, StepOutcome::Navigated("confirmColumns".into()));
}

#[tokio::test]
async fn changing_a_driver_resets_dependents_transitively() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!(SHEET_ID));
    wizard.advance_step("getSheetId").await;

    wizard.update_field("category", json!("finance"));
    assert_eq!(wizard.session().field_value("chooseTemplate", "owner"), Some(&json!("finance-ops")));
    wizard.update_field("template", json!("custom"));
    wizard.update_field("columns", json!("Item, Amount"));

    let reset = wizard.update_field("category", json!("legal"));
    assert_eq!(reset, vec!["template", "owner", "columns"]);
    assert_eq!(wizard.session().field_value("chooseTemplate", "template"), Some(&json!("")));
    assert_eq!(wizard.session().field_value("chooseTemplate", "columns"), Some(&json!("")));
    assert_eq!(wizard.session().field_value("chooseTemplate", "owner"), Some(&json!("legal-team")));

    let fields = wizard.visible_fields();
    let template = fields.iter().find(|view| view.field.id == "template").expect("template shown");
    let options: Vec<&str> = template.options.iter().map(|option| option.value.as_str()).collect();
    assert_eq!(options, vec!["contracts"]);
    assert!(fields.iter().all(|view| view.field.id != "columns"));

    assert!(wizard.update_field("category", json!("legal")).is_empty());
}

#[tokio::test]
async fn false_condition_skips_only_that_action() {
    let backend = happy_backend();
    let wizard = wizard_at_grid(&backend).await;

    assert_eq!(wizard.state(), ready("confirmColumns"));
    assert_eq!(
        statuses(&wizard, "chooseTemplate"),
        vec![ActionStatus::Succeeded, ActionStatus::Skipped, ActionStatus::Succeeded]
    );
    assert_eq!(
        backend.called_endpoints(),
        vec![format!("GET /sheet/{SHEET_ID}"), "POST /columns".to_string()]
    );
    assert_eq!(
        wizard.session().response_data["selection"],
        json!({ "category": "finance", "template": "budget" })
    );
}

#[tokio::test]
async fn true_condition_runs_the_gated_action() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!(SHEET_ID));
    wizard.advance_step("getSheetId").await;
    wizard.update_field("category", json!("legal"));
    wizard.update_field("template", json!("contracts"));

    assert_eq!(wizard.advance_step("chooseTemplate").await, StepOutcome::Navigated("confirmColumns".into()));
    let requests = backend.requests();
    assert_eq!(requests[1].body, Some(json!({ "sheetId": SHEET_ID, "template": "contracts" })));
    assert_eq!(requests[2].endpoint, "/audit");
    assert_eq!(requests[2].body, Some(json!({ "category": "legal" })));
    assert_eq!(statuses(&wizard, "chooseTemplate"), vec![ActionStatus::Succeeded; 3]);
}

#[tokio::test]
async fn failed_call_aborts_the_rest_of_the_sequence() {
    let backend = happy_backend();
    backend.reply(
        "POST",
        "/columns",
        Err(ApiError::Status {
            status: 500,
            message: Some("columns unavailable".into()),
        }),
    );
    let mut wizard = loaded_wizard(&backend).await;
    wizard.update_field("sheetId", json!(SHEET_ID));
    wizard.advance_step("getSheetId").await;
    wizard.update_field("category", json!("finance"));
    wizard.update_field("template", json!("budget"));

    assert_eq!(wizard.advance_step("chooseTemplate").await, StepOutcome::Failed);
    assert_eq!(
        wizard.state(),
        WizardState::Failed {
            step_id: "chooseTemplate".into(),
            message: "columns unavailable".into(),
        }
    );
    assert_eq!(wizard.error().map(|error| error.kind), Some(StepErrorKind::Api));
    assert!(!wizard.is_loading());
    assert!(!wizard.session().response_data.contains_key("selection"));
    assert_eq!(statuses(&wizard, "chooseTemplate"), vec![ActionStatus::Failed]);

    // Editing clears the error and the step can be retried.
    wizard.update_field("template", json!("custom"));
    assert_eq!(wizard.state(), ready("chooseTemplate"));
}

#[tokio::test]
async fn go_back_keeps_answers() {
    let backend = happy_backend();
    let mut wizard = loaded_wizard(&backend).await;
    assert!(!wizard.go_back());

    wizard.update_field("sheetId", json!(SHEET_ID));
    wizard.advance_step("getSheetId").await;
    wizard.update_field("category", json!("finance"));

    assert!(wizard.go_back());
    assert_eq!(wizard.state(), ready("getSheetId"));
    assert_eq!(wizard.session().field_value("getSheetId", "sheetId"), Some(&json!(SHEET_ID)));
    assert_eq!(wizard.session().field_value("chooseTemplate", "category"), Some(&json!("finance")));
    assert!(wizard.session().response_data.contains_key("sheetInfo"));
    assert!(!wizard.go_back());
}

#[tokio::test]
async fn grid_rows_are_preseeded_and_edited_by_id() {
    let backend = happy_backend();
    let mut wizard = wizard_at_grid(&backend).await;

    let grid = wizard.grid().expect("seeded grid");
    assert_eq!(grid.columns.len(), 3);
    let ids: Vec<&str> = grid.rows.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, vec!["c-1", "c-2"]);

    let capabilities = wizard.capabilities().expect("grid step");
    assert!(capabilities.add_row && capabilities.delete_row && capabilities.edit_cells);

    assert_eq!(wizard.add_row().as_deref(), Some("row-1"));
    assert_eq!(wizard.add_row().as_deref(), Some("row-2"));
    let added = wizard.grid().and_then(|grid| grid.row("row-1")).expect("added row");
    assert_eq!(added.cells["name"], json!(""));
    assert_eq!(added.cells["kind"], json!("string"));
    assert_eq!(added.cells["required"], json!(false));

    assert!(wizard.delete_row("c-1"));
    assert!(!wizard.delete_row("c-1"));
    assert!(wizard.update_cell("row-1", "name", json!("Notes")));

    let ids: Vec<String> = wizard
        .grid()
        .map(|grid| grid.rows.iter().map(|row| row.id.clone()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec!["c-2", "row-1", "row-2"]);

    let mirrored = wizard
        .session()
        .field_value("confirmColumns", "rows")
        .and_then(Value::as_array)
        .expect("rows mirrored into form data");
    assert_eq!(mirrored.len(), 3);
    assert_eq!(mirrored[1]["name"], json!("Notes"));
}

#[tokio::test]
async fn grid_without_edit_features_is_read_only() {
    let mut tool = sheet_builder();
    let grid_step = tool
        .steps
        .iter_mut()
        .find(|step| step.id == "confirmColumns")
        .expect("grid step");
    grid_step.edit_features = None;
    let backend = happy_backend();
    let mut wizard = Wizard::new(backend.clone(), test_config());
    wizard.load_definition(tool);
    wizard.update_field("sheetId", json!(SHEET_ID));
    wizard.advance_step("getSheetId").await;
    wizard.update_field("category", json!("finance"));
    wizard.update_field("template", json!("budget"));
    wizard.advance_step("chooseTemplate").await;

    assert!(wizard.grid().is_some());
    assert!(wizard.add_row().is_none());
    assert!(!wizard.delete_row("c-1"));
    assert!(!wizard.update_cell("c-1", "name", json!("Changed")));
    assert_eq!(wizard.grid().map(|grid| grid.rows.len()), Some(2));
}

#[tokio::test]
async fn reset_then_load_matches_a_fresh_start() {
    let backend = happy_backend();
    let fresh = loaded_wizard(&backend).await;
    let mut wizard = wizard_at_grid(&backend).await;

    wizard.reset_tool();
    assert_eq!(wizard.state(), WizardState::Unloaded);
    assert!(wizard.history().is_empty());
    assert!(wizard.session().form_data.is_empty());

    wizard.load_tool("sheet-builder").await;
    assert_eq!(wizard.state(), fresh.state());
    assert_eq!(wizard.history(), fresh.history());
    assert_eq!(wizard.session().form_data, fresh.session().form_data);
    assert_eq!(wizard.session().response_data, fresh.session().response_data);
    assert!(wizard.telemetry().events().is_empty());
    assert!(wizard.grid().is_none());
}

#[tokio::test]
async fn dangling_next_step_id_fails_instead_of_completing() {
    let backend = ScriptedBackend::default();
    let mut wizard = wizard_for(
        &backend,
        json!({ "id": "t", "steps": [{ "id": "a", "nextStepId": "typo" }, { "id": "b" }] }),
    );

    assert_eq!(wizard.advance_step("a").await, StepOutcome::Failed);
    assert_eq!(
        wizard.state(),
        WizardState::Failed {
            step_id: "a".into(),
            message: "Step 'typo' does not exist.".into(),
        }
    );
    assert_eq!(wizard.error().map(|error| error.kind), Some(StepErrorKind::Configuration));
    assert_eq!(wizard.history(), ["a".to_string()]);
}

#[tokio::test]
async fn navigation_action_starts_a_run_and_saves_the_target() {
    let backend = ScriptedBackend::default();
    let mut wizard = wizard_for(&backend, navigating_tool());
    wizard.update_field("name", json!("Ada"));

    assert_eq!(wizard.advance_step("start").await, StepOutcome::Navigated("review".into()));
    assert_eq!(wizard.state(), ready("review"));
    assert_eq!(wizard.history(), ["start".to_string(), "review".to_string()]);
    assert_eq!(wizard.session().run_id.as_deref(), Some("run-1"));
    assert_eq!(
        backend.calls(),
        vec![
            Recorded::StartRun {
                tool_id: "nav-tool".into()
            },
            Recorded::SaveState {
                run_id: "run-1".into(),
                step_id: "review".into()
            },
        ]
    );
}

#[tokio::test]
async fn failed_state_save_keeps_the_wizard_on_the_step() {
    let backend = ScriptedBackend::default();
    backend.fail_save_state(ApiError::Status {
        status: 503,
        message: Some("state store unavailable".into()),
    });
    let mut wizard = wizard_for(&backend, navigating_tool());

    assert_eq!(wizard.advance_step("start").await, StepOutcome::Failed);
    match wizard.state() {
        WizardState::Failed { step_id, message } => {
            assert_eq!(step_id, "start");
            assert!(message.contains("state store unavailable"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(wizard.error().map(|error| error.kind), Some(StepErrorKind::Api));
    assert_eq!(wizard.history(), ["start".to_string()]);
    assert!(!wizard.is_loading());
    assert!(backend.calls().contains(&Recorded::SaveState {
        run_id: "run-1".into(),
        step_id: "review".into()
    }));
}

#[tokio::test]
async fn call_without_endpoint_is_a_configuration_error() {
    let backend = ScriptedBackend::default();
    let mut wizard = wizard_for(
        &backend,
        json!({
            "id": "t",
            "steps": [
                { "id": "a", "onSubmit": { "action": "callApi", "storeResponseAs": "result" } },
                { "id": "b" }
            ]
        }),
    );

    assert_eq!(wizard.advance_step("a").await, StepOutcome::Failed);
    match wizard.state() {
        WizardState::Failed { step_id, message } => {
            assert_eq!(step_id, "a");
            assert!(message.contains("apiEndpoint"), "{message}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(wizard.error().map(|error| error.kind), Some(StepErrorKind::Configuration));
    assert_eq!(wizard.history(), ["a".to_string()]);
    assert!(backend.called_endpoints().is_empty());
    assert!(backend.calls().is_empty());
}
