use std::sync::Arc;

use serde_json::json;

use form_spec::{
    Backends, FlowState, FormEnvironment, MemoryStore, OwnerId, Persistence, RenderStatus,
    Wizard, WizardSpec, build_render_payload, build_wizard, render_json_ui, render_text,
};

fn listing_wizard() -> Wizard<FlowState> {
    let spec: WizardSpec =
        serde_json::from_str(include_str!("fixtures/listing_wizard.json")).expect("fixture");
    let store = Arc::new(MemoryStore::new());
    let persistence = Persistence::for_fields(&spec.form.fields, &Backends::memory(store));
    build_wizard(
        &spec,
        &FormEnvironment::new().shared(),
        FlowState::new(OwnerId(1), persistence),
    )
    .expect("wizard")
}

#[test]
fn first_step_needs_input() {
    let wizard = listing_wizard();
    let payload = build_render_payload(&wizard);
    assert_eq!(payload.status, RenderStatus::NeedInput);
    assert_eq!(payload.step_name, "basics");
    assert_eq!(payload.total_steps, 7);

    let ui = render_json_ui(&payload);
    assert_eq!(ui["status"], "need_input");
    assert_eq!(ui["progress"], json!({ "current": 1, "total": 7 }));
    assert_eq!(ui["view"]["fields"][0]["key"], "title");
    assert_eq!(ui["view"]["fields"][0]["required"], true);
}

#[test]
fn text_lists_fields_and_errors() {
    let mut wizard = listing_wizard();
    wizard
        .process(&json!({ "title": "ab", "listing_type": "business", "email": "a@b.co" }))
        .expect("process");
    let text = render_text(&build_render_payload(&wizard));
    assert!(text.contains("Form: Listing (submit-listing)"));
    assert!(text.contains("Step: basics (1/7) [need_input]"));
    assert!(text.contains(" - title (Listing title) [required] = ab"));
    assert!(text.contains("     ! Listing title must be at least 3 characters"));
}

#[test]
fn form_errors_switch_status() {
    let mut wizard = listing_wizard();
    wizard.form_mut().add_form_error("Service unavailable");
    let payload = build_render_payload(&wizard);
    assert_eq!(payload.status, RenderStatus::Error);
    assert!(render_text(&payload).contains("Error: Service unavailable"));
}

#[test]
fn terminal_step_is_complete() {
    let mut wizard = listing_wizard();
    wizard.select(&form_spec::StepRef::Name("done".into()));
    let payload = build_render_payload(&wizard);
    assert_eq!(payload.status, RenderStatus::Complete);
    assert_eq!(RenderStatus::from_label(payload.status.as_str()), Some(RenderStatus::Complete));
    assert!(render_text(&payload).contains("== Thanks! =="));
}
