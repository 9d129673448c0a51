use form_spec::RenderStatus;
use serde_json::Value;

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: field prompts only.
    Clean,
    /// Verbose output: status, step fields, widget hints.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints headers, prompts and errors for each step the component returns.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
    show_values_json: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity, show_values_json: bool) -> Self {
        Self {
            verbosity,
            header_printed: false,
            show_values_json,
        }
    }

    pub fn show_header(&mut self, payload: &WizardPayload) {
        if self.header_printed {
            return;
        }
        println!("Form: {}", payload.form_title);
        self.header_printed = true;
    }

    pub fn show_step(&self, payload: &WizardPayload) {
        let title = payload.step_title.as_deref().unwrap_or(&payload.step_name);
        println!("[{}/{}] {}", payload.current, payload.total, title);
        if self.verbosity.is_verbose() {
            println!("Status: {} ({})", payload.status.as_str(), payload.step_name);
            println!("Fields:");
            for field in &payload.fields {
                let mut entry = format!(" - {} ({})", field.key, field.label);
                if field.required {
                    entry.push_str(" [required]");
                }
                println!("{}", entry);
            }
        }
    }

    /// Prints form-level errors plus the messages attached to step fields.
    pub fn show_errors(&self, payload: &WizardPayload) {
        for message in &payload.form_errors {
            eprintln!("Error: {}", message);
        }
        for field in &payload.fields {
            for message in &field.errors {
                eprintln!("  {} - {}", field.key, message);
            }
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = prompt.label.clone();
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        if let Some(current) = &prompt.current {
            line.push_str(&format!(" [{}]", current));
        }
        println!("{}", line);
        if let Some(description) = &prompt.description {
            println!("{}", description);
        }
        if self.verbosity.is_verbose() && !prompt.choices.is_empty() {
            println!("Choices: {}", prompt.choices.join(", "));
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if let Some(debug) = &error.debug_message {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_completion(&self, payload: &WizardPayload, values: &Value) {
        if let Some(title) = &payload.step_title {
            println!("{}", title);
        }
        if let Some(text) = &payload.text {
            println!("{}", text);
        }
        println!("Done ✅");
        if self.show_values_json {
            match serde_json::to_string_pretty(values) {
                Ok(pretty) => println!("{}", pretty),
                Err(err) => eprintln!("Failed to serialize values to JSON: {}", err),
            }
        }
    }
}

/// Step payload extracted from the component output.
pub struct WizardPayload {
    pub form_title: String,
    pub status: RenderStatus,
    pub step: usize,
    pub step_name: String,
    pub current: usize,
    pub total: usize,
    pub step_title: Option<String>,
    pub text: Option<String>,
    pub fields: Vec<WizardField>,
    pub form_errors: Vec<String>,
}

impl WizardPayload {
    pub fn from_json(json: &Value) -> Result<Self, String> {
        let form_title = json
            .get("form_title")
            .and_then(Value::as_str)
            .ok_or_else(|| "wizard payload missing form_title".to_string())?
            .to_string();
        let status = json
            .get("status")
            .and_then(Value::as_str)
            .and_then(RenderStatus::from_label)
            .unwrap_or(RenderStatus::NeedInput);
        let step = json
            .get("step")
            .and_then(Value::as_u64)
            .ok_or_else(|| "wizard payload missing step".to_string())? as usize;
        let step_name = json
            .get("step_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let progress = json
            .get("progress")
            .and_then(Value::as_object)
            .ok_or_else(|| "wizard payload missing progress".to_string())?;
        let current = progress.get("current").and_then(Value::as_u64).unwrap_or(0) as usize;
        let total = progress.get("total").and_then(Value::as_u64).unwrap_or(0) as usize;

        let view = json.get("view").filter(|view| !view.is_null());
        let view_str = |key: &str| {
            view.and_then(|view| view.get(key))
                .and_then(Value::as_str)
                .map(String::from)
        };
        let fields = view
            .and_then(|view| view.get("fields"))
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .map(WizardField::from_json)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let form_errors = json
            .get("form_errors")
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            form_title,
            status,
            step,
            step_name,
            current,
            total,
            step_title: view_str("title"),
            text: view_str("text"),
            fields,
            form_errors,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.status == RenderStatus::Complete
    }
}

/// Minimal view of a field widget used for prompting.
pub struct WizardField {
    pub key: String,
    pub label: String,
    pub description: Option<String>,
    pub kind: FieldKind,
    pub required: bool,
    pub multiple: bool,
    pub choices: Vec<String>,
    pub value: Value,
    pub errors: Vec<String>,
}

impl WizardField {
    fn from_json(value: &Value) -> Result<Self, String> {
        let key = value
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| "field missing key".to_string())?
            .to_string();
        let label = value
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or(&key)
            .to_string();
        let widget = value
            .get("widget")
            .or_else(|| value.get("type"))
            .and_then(Value::as_str)
            .unwrap_or("text");
        let kind = FieldKind::from_label(widget);
        let strings = |name: &str| -> Vec<String> {
            value
                .get(name)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default()
        };
        Ok(Self {
            description: value
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            kind,
            required: value.get("required").and_then(Value::as_bool).unwrap_or(false),
            multiple: value.get("multiple").and_then(Value::as_bool).unwrap_or(false),
            choices: strings("choices"),
            value: value.get("value").cloned().unwrap_or(Value::Null),
            errors: strings("errors"),
            key,
            label,
        })
    }
}

/// Prompt shapes keyed by the widget a field renders as.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Checkbox,
    Choice,
    Terms,
    Structured,
}

impl FieldKind {
    pub fn from_label(label: &str) -> Self {
        match label {
            "number" => FieldKind::Number,
            "checkbox" => FieldKind::Checkbox,
            "select" | "dropdown" | "radio" | "multiselect" | "multicheckbox" => FieldKind::Choice,
            "terms" => FieldKind::Terms,
            "file" | "geolocation" | "opening_hours" => FieldKind::Structured,
            _ => FieldKind::Text,
        }
    }

    fn hint(&self, field: &WizardField) -> Option<String> {
        match self {
            FieldKind::Number => Some("(number)".to_string()),
            FieldKind::Checkbox => Some("(yes/no)".to_string()),
            FieldKind::Choice if field.multiple => Some(format!("({}, comma separated)", field.choices.join("/"))),
            FieldKind::Choice if !field.choices.is_empty() => Some(format!("({})", field.choices.join("/"))),
            FieldKind::Terms => Some("(term ids, comma separated)".to_string()),
            FieldKind::Structured => Some("(JSON)".to_string()),
            _ => None,
        }
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub label: String,
    pub description: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub current: Option<String>,
    pub choices: Vec<String>,
}

impl PromptContext {
    pub fn new(field: &WizardField) -> Self {
        let current = match &field.value {
            Value::Null | Value::Bool(false) => None,
            Value::String(text) if text.is_empty() => None,
            Value::Array(items) if items.is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        };
        Self {
            label: field.label.clone(),
            description: field.description.clone(),
            required: field.required,
            hint: field.kind.hint(field),
            current,
            choices: field.choices.clone(),
        }
    }
}

/// Error produced when parsing answers from the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}
