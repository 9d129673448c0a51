use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use form_spec::{
    Backends, BackendError, FlowState, FormEnvironment, MemoryStore, OwnerId, Persistence,
    PersistenceError, SchemaError, StaticTerms, StepRef, StoreSnapshot, Wizard, WizardSpec,
    build_render_payload, build_wizard, load_stored, payload_schema,
    render_json_ui as form_render_json_ui, render_text as form_render_text, validate,
};

const DEFAULT_WIZARD: &str = include_str!("../../form-spec/tests/fixtures/listing_wizard.json");

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config: {0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to parse payload: {0}")]
    PayloadParse(#[source] serde_json::Error),
    #[error("wizard '{0}' is not available")]
    WizardUnavailable(String),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
    #[error("invalid wizard definition: {0}")]
    Schema(#[from] SchemaError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("store unavailable: {0}")]
    Store(#[from] BackendError),
}

#[derive(Debug, Deserialize, Serialize, Default)]
struct ComponentConfig {
    #[serde(default)]
    wizard_spec_json: Option<String>,
}

/// Per-request context. Steps, carried values and the store all travel with
/// the request; nothing is kept between calls.
#[derive(Debug, Deserialize, Default)]
struct RequestContext {
    #[serde(default)]
    owner: Option<OwnerId>,
    #[serde(default)]
    step: Option<StepRef>,
    #[serde(default)]
    values: Option<Value>,
    #[serde(default)]
    store: Option<StoreSnapshot>,
    #[serde(default)]
    terms: Option<StaticTerms>,
}

fn load_wizard_spec(config_json: &str) -> Result<WizardSpec, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    let spec_json = config.wizard_spec_json.as_deref().unwrap_or(DEFAULT_WIZARD);

    serde_json::from_str(spec_json).map_err(ComponentError::ConfigParse)
}

fn ensure_wizard(wizard_id: &str, config_json: &str) -> Result<WizardSpec, ComponentError> {
    let spec = load_wizard_spec(config_json)?;
    if spec.id != wizard_id {
        Err(ComponentError::WizardUnavailable(wizard_id.to_string()))
    } else {
        Ok(spec)
    }
}

fn parse_context(ctx_json: &str) -> RequestContext {
    if ctx_json.trim().is_empty() {
        return RequestContext::default();
    }
    serde_json::from_str(ctx_json).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "ignoring malformed request context");
        RequestContext::default()
    })
}

fn parse_payload(payload_json: &str) -> Result<Value, ComponentError> {
    if payload_json.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(payload_json).map_err(ComponentError::PayloadParse)
}

fn environment(terms: Option<StaticTerms>) -> Arc<FormEnvironment> {
    let env = FormEnvironment::new();
    match terms {
        Some(terms) => env.with_terms(Arc::new(terms)).shared(),
        None => env.shared(),
    }
}

struct Session {
    wizard: Wizard<FlowState>,
    store: Arc<MemoryStore>,
}

impl Session {
    fn open(spec: &WizardSpec, ctx: RequestContext) -> Result<Self, ComponentError> {
        let owner = ctx.owner.unwrap_or(OwnerId(0));
        let store = Arc::new(MemoryStore::from_snapshot(ctx.store.unwrap_or_default()));
        let persistence =
            Persistence::for_fields(&spec.form.fields, &Backends::memory(store.clone()));
        let env = environment(ctx.terms);
        let mut wizard = build_wizard(spec, &env, FlowState::new(owner, persistence))?;
        if let Some(values) = &ctx.values {
            wizard.form_mut().restore(values);
        }
        if let Some(step) = &ctx.step {
            wizard.select(step);
        }
        Ok(Self { wizard, store })
    }

    fn response(&self) -> Result<Value, ComponentError> {
        let mut ui = form_render_json_ui(&build_render_payload(&self.wizard));
        let store =
            serde_json::to_value(self.store.snapshot()?).map_err(ComponentError::JsonEncode)?;
        if let Some(map) = ui.as_object_mut() {
            map.insert("values".into(), self.wizard.form().to_value());
            map.insert("saved".into(), json!(self.wizard.state().saved));
            map.insert("store".into(), store);
        }
        Ok(ui)
    }
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

pub fn describe(wizard_id: &str, config_json: &str) -> String {
    respond(ensure_wizard(wizard_id, config_json).and_then(|spec| {
        serde_json::to_value(spec).map_err(ComponentError::JsonEncode)
    }))
}

pub fn get_schema(wizard_id: &str, config_json: &str) -> String {
    respond(
        ensure_wizard(wizard_id, config_json)
            .map(|spec| payload_schema(&spec.form, &environment(None))),
    )
}

/// Validates a whole payload against the wizard's form, ignoring steps.
pub fn validate_payload(
    wizard_id: &str,
    config_json: &str,
    ctx_json: &str,
    payload_json: &str,
) -> String {
    respond(ensure_wizard(wizard_id, config_json).and_then(|spec| {
        let ctx = parse_context(ctx_json);
        let payload = parse_payload(payload_json)?;
        let result = validate(&spec.form, &payload, &environment(ctx.terms))?;
        serde_json::to_value(result).map_err(ComponentError::JsonEncode)
    }))
}

/// Runs one wizard request: resolves the step, handles the submission and
/// returns the next view together with the carried values and the store.
pub fn process(wizard_id: &str, config_json: &str, ctx_json: &str, payload_json: &str) -> String {
    respond(ensure_wizard(wizard_id, config_json).and_then(|spec| {
        let payload = parse_payload(payload_json)?;
        let mut session = Session::open(&spec, parse_context(ctx_json))?;
        let outcome = session.wizard.process(&payload)?;
        tracing::debug!(wizard = %spec.id, step = %outcome.step_name, "processed request");
        session.response()
    }))
}

/// Renders the step named in the context without handling a submission.
pub fn render_step(wizard_id: &str, config_json: &str, ctx_json: &str) -> String {
    respond(ensure_wizard(wizard_id, config_json).and_then(|spec| {
        let session = Session::open(&spec, parse_context(ctx_json))?;
        Ok(form_render_json_ui(&build_render_payload(&session.wizard)))
    }))
}

pub fn render_text(wizard_id: &str, config_json: &str, ctx_json: &str) -> String {
    respond_string(ensure_wizard(wizard_id, config_json).and_then(|spec| {
        let session = Session::open(&spec, parse_context(ctx_json))?;
        Ok(form_render_text(&build_render_payload(&session.wizard)))
    }))
}

/// Values stored for the context owner, keyed by field.
pub fn load_values(wizard_id: &str, config_json: &str, ctx_json: &str) -> String {
    respond(ensure_wizard(wizard_id, config_json).and_then(|spec| {
        let mut ctx = parse_context(ctx_json);
        ctx.values = None;
        let mut session = Session::open(&spec, ctx)?;
        load_stored(&mut session.wizard);
        Ok(session.wizard.form().to_value())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIZARD: &str = "submit-listing";

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).expect("json")
    }

    fn basics() -> String {
        json!({
            "_step": "basics",
            "title": "Blue Cafe",
            "listing_type": "business",
            "email": "cafe@example.com"
        })
        .to_string()
    }

    #[test]
    fn describe_returns_spec_json() {
        let value = parse(&describe(WIZARD, ""));
        assert_eq!(value["id"], WIZARD);
        assert_eq!(value["steps"][0]["name"], "basics");
    }

    #[test]
    fn unknown_wizard_is_an_error() {
        let value = parse(&describe("other", ""));
        assert_eq!(value["error"], "wizard 'other' is not available");
    }

    #[test]
    fn custom_config_replaces_default_wizard() {
        let spec = json!({
            "id": "tiny",
            "title": "Tiny",
            "form": { "id": "tiny", "fields": { "name": { "type": "text", "required": true } } },
            "steps": [
                { "type": "fields", "name": "ask", "fields": ["name"] },
                { "type": "message", "name": "bye", "text": "Bye {{values.name}}" }
            ]
        });
        let config = json!({ "wizard_spec_json": spec.to_string() }).to_string();
        let value = parse(&process("tiny", &config, "", r#"{"name":"Ada"}"#));
        assert_eq!(value["status"], "complete");
        assert_eq!(value["view"]["text"], "Bye Ada");
    }

    #[test]
    fn schema_lists_required_fields() {
        let value = parse(&get_schema(WIZARD, ""));
        assert_eq!(value["type"], "object");
        assert_eq!(value["required"], json!(["title", "listing_type", "email"]));
        assert_eq!(value["properties"]["category"]["type"], "array");
    }

    #[test]
    fn validate_payload_reports_field_errors() {
        let value = parse(&validate_payload(WIZARD, "", "", r#"{"title":"Cafe"}"#));
        assert_eq!(value["valid"], false);
        let fields: Vec<_> = value["errors"]
            .as_array()
            .expect("errors")
            .iter()
            .map(|error| error["field"].clone())
            .collect();
        assert_eq!(fields, vec![json!("listing_type"), json!("email")]);
    }

    #[test]
    fn process_rejects_malformed_payload() {
        let value = parse(&process(WIZARD, "", "", "{not json"));
        assert!(value["error"].as_str().expect("error").starts_with("failed to parse payload"));
    }

    #[test]
    fn process_keeps_step_on_validation_errors() {
        let value = parse(&process(WIZARD, "", "", r#"{"title":"Cafe"}"#));
        assert_eq!(value["status"], "need_input");
        assert_eq!(value["step_name"], "basics");
        assert_eq!(value["errors"]["email"], json!(["Contact email is a required field"]));
        assert_eq!(value["form_errors"], json!([]));
    }

    #[test]
    fn wizard_round_trip_across_requests() {
        let first = parse(&process(WIZARD, "", r#"{"owner":5}"#, &basics()));
        assert_eq!(first["status"], "need_input");
        assert_eq!(first["step_name"], "business");
        assert_eq!(first["values"]["title"], "Blue Cafe");
        assert_eq!(first["saved"], 0);

        let ctx = json!({
            "owner": 5,
            "values": first["values"],
            "store": first["store"],
        })
        .to_string();
        let payload = json!({ "_step": first["step"], "category": [2] }).to_string();
        let second = parse(&process(WIZARD, "", &ctx, &payload));
        assert_eq!(second["status"], "complete");
        assert_eq!(second["step_name"], "done");
        assert_eq!(second["view"]["text"], "Blue Cafe was submitted for review.");

        let ctx = json!({ "owner": 5, "store": second["store"] }).to_string();
        let stored = parse(&load_values(WIZARD, "", &ctx));
        assert_eq!(stored["title"], "Blue Cafe");
        assert_eq!(stored["email"], "cafe@example.com");
        assert_eq!(stored["category"], json!([2]));

        let other_owner = json!({ "owner": 6, "store": second["store"] }).to_string();
        let stored = parse(&load_values(WIZARD, "", &other_owner));
        assert_eq!(stored["title"], Value::Null);
    }

    #[test]
    fn render_step_does_not_process() {
        let ctx = json!({ "step": "event", "values": { "title": "Fair" } }).to_string();
        let value = parse(&render_step(WIZARD, "", &ctx));
        assert_eq!(value["step_name"], "event");
        assert_eq!(value["status"], "need_input");
        assert!(value["errors"].as_object().expect("errors").is_empty());
    }

    #[test]
    fn numeric_step_strings_address_by_index() {
        let ctx = json!({ "step": "2", "values": { "title": "Fair" } }).to_string();
        let value = parse(&render_step(WIZARD, "", &ctx));
        assert_eq!(value["step"], 2);
        assert_eq!(value["step_name"], "business");
    }

    #[test]
    fn render_text_outputs_summary() {
        let text = render_text(WIZARD, "", "");
        assert!(text.contains("Form: Listing (submit-listing)"));
        assert!(text.contains("Step: basics (1/7)"));
    }
}
