use serde_json::{Value, json};

use crate::wizard::Wizard;

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// The current step waits for a submission.
    NeedInput,
    /// The wizard rests on a terminal step.
    Complete,
    /// The last submission was vetoed by a form-level error.
    Error,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
            RenderStatus::Error => "error",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "need_input" => Some(RenderStatus::NeedInput),
            "complete" => Some(RenderStatus::Complete),
            "error" => Some(RenderStatus::Error),
            _ => None,
        }
    }
}

/// Snapshot of a wizard used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub wizard_id: String,
    pub form_title: String,
    pub step: usize,
    pub step_name: String,
    pub total_steps: usize,
    pub status: RenderStatus,
    pub view: Option<Value>,
    pub errors: Vec<(String, Vec<String>)>,
    pub form_errors: Vec<String>,
}

pub fn build_render_payload<S>(wizard: &Wizard<S>) -> RenderPayload {
    let form = wizard.form();
    let status = if !form.form_errors().is_empty() {
        RenderStatus::Error
    } else if wizard.is_terminal() {
        RenderStatus::Complete
    } else {
        RenderStatus::NeedInput
    };

    RenderPayload {
        wizard_id: wizard.id().to_string(),
        form_title: form.title().to_string(),
        step: wizard.current_index(),
        step_name: wizard.current_step().name().to_string(),
        total_steps: wizard.steps().len(),
        status,
        view: wizard.view(),
        errors: form.errors().into_iter().collect(),
        form_errors: form.form_errors().to_vec(),
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let errors = payload
        .errors
        .iter()
        .map(|(field, messages)| (field.clone(), json!(messages)))
        .collect::<serde_json::Map<_, _>>();

    json!({
        "wizard_id": payload.wizard_id,
        "form_title": payload.form_title,
        "status": payload.status.as_str(),
        "step": payload.step,
        "step_name": payload.step_name,
        "progress": {
            "current": payload.step + 1,
            "total": payload.total_steps,
        },
        "view": payload.view,
        "errors": errors,
        "form_errors": payload.form_errors,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Form: {} ({})", payload.form_title, payload.wizard_id));
    lines.push(format!(
        "Step: {} ({}/{}) [{}]",
        payload.step_name,
        payload.step + 1,
        payload.total_steps,
        payload.status.as_str()
    ));
    for message in &payload.form_errors {
        lines.push(format!("Error: {message}"));
    }

    let Some(view) = &payload.view else {
        return lines.join("\n");
    };
    if let Some(title) = view.get("title").and_then(Value::as_str) {
        lines.push(format!("== {title} =="));
    }
    if let Some(text) = view.get("text").and_then(Value::as_str) {
        lines.push(text.to_string());
    }
    for field in view
        .get("fields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let key = field.get("key").and_then(Value::as_str).unwrap_or_default();
        let label = field.get("label").and_then(Value::as_str).unwrap_or(key);
        let mut entry = format!(" - {key} ({label})");
        if field.get("required").and_then(Value::as_bool) == Some(true) {
            entry.push_str(" [required]");
        }
        if let Some(value) = field.get("value").filter(|value| !crate::field::is_empty(value)) {
            entry.push_str(&format!(" = {}", value_to_display(value)));
        }
        lines.push(entry);
        for (_, messages) in payload.errors.iter().filter(|(field, _)| field == key) {
            for message in messages {
                lines.push(format!("     ! {message}"));
            }
        }
    }

    lines.join("\n")
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        other => other.to_string(),
    }
}
