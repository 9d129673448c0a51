mod wizard;

use clap::{Parser, Subcommand, ValueEnum};
use component_form::{
    get_schema, load_values, process as form_process, render_step, render_text as form_render_text,
};
use form_spec::{
    FileStore, FormEnvironment, STEP_FIELD, StepRef, StoreSnapshot, ValidationResult, WizardSpec, validate,
};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wizard::{
    AnswerParseError, FieldKind, PromptContext, Verbosity, WizardField, WizardPayload,
    WizardPresenter,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const DEFAULT_STORE: &str = "forms-store.cbor";

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Directory form wizard CLI",
    long_about = "Validates payloads, runs wizard steps and keeps submitted values in a flat-file store"
)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG).
    #[arg(long, global = true, alias = "debug")]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a whole payload against the wizard's form.
    Validate {
        /// Path to the wizard definition JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Path to the payload JSON file.
        #[arg(long, value_name = "PAYLOAD")]
        payload: PathBuf,
    },
    /// Print the JSON Schema of the form payload.
    Schema {
        /// Path to the wizard definition JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
    },
    /// Run a single wizard request and print the resulting step.
    Process {
        /// Path to the wizard definition JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Path to the submitted payload JSON.
        #[arg(long, value_name = "PAYLOAD")]
        payload: PathBuf,
        /// Step to process, by name or index.
        #[arg(long, value_name = "STEP")]
        step: Option<String>,
        /// JSON file with values carried over from earlier steps.
        #[arg(long, value_name = "VALUES")]
        values: Option<PathBuf>,
        /// Owner id the values are saved for.
        #[arg(long, default_value_t = 1)]
        owner: u64,
        /// Flat-file store location.
        #[arg(long, value_name = "FILE", env = "FORMS_STORE_PATH", default_value = DEFAULT_STORE)]
        store: PathBuf,
    },
    /// Print the values stored for an owner.
    Show {
        /// Path to the wizard definition JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Owner id to look up.
        #[arg(long, default_value_t = 1)]
        owner: u64,
        /// Flat-file store location.
        #[arg(long, value_name = "FILE", env = "FORMS_STORE_PATH", default_value = DEFAULT_STORE)]
        store: PathBuf,
    },
    /// Walk through the wizard interactively.
    Wizard {
        /// Path to the wizard definition JSON.
        #[arg(long, value_name = "SPEC")]
        spec: PathBuf,
        /// Owner id the values are saved for.
        #[arg(long, default_value_t = 1)]
        owner: u64,
        /// Flat-file store location.
        #[arg(long, value_name = "FILE", env = "FORMS_STORE_PATH", default_value = DEFAULT_STORE)]
        store: PathBuf,
        /// Also emit the collected values as JSON.
        #[arg(long)]
        values_json: bool,
        /// Render output mode for each step.
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Validate { spec, payload } => run_validate(spec, payload),
        Command::Schema { spec } => run_schema(spec),
        Command::Process {
            spec,
            payload,
            step,
            values,
            owner,
            store,
        } => run_process(spec, payload, step, values, owner, store),
        Command::Show { spec, owner, store } => run_show(spec, owner, store),
        Command::Wizard {
            spec,
            owner,
            store,
            values_json,
            format,
        } => run_wizard(spec, owner, store, cli.verbose, values_json, format),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // Ignored when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Wizard definition as read from disk, with the component config wrapping it.
struct LoadedSpec {
    id: String,
    config_json: String,
}

fn load_spec(path: &Path) -> CliResult<LoadedSpec> {
    let spec_str = fs::read_to_string(path)?;
    let spec_value: Value = serde_json::from_str(&spec_str)?;
    let id = spec_value
        .get("id")
        .and_then(Value::as_str)
        .ok_or("wizard definition is missing an id")?
        .to_string();
    let config_json = json!({ "wizard_spec_json": spec_str }).to_string();
    Ok(LoadedSpec { id, config_json })
}

fn run_validate(spec_path: PathBuf, payload_path: PathBuf) -> CliResult<()> {
    let spec_json = fs::read_to_string(spec_path)?;
    let spec: WizardSpec = serde_json::from_str(&spec_json)?;
    let payload_json = fs::read_to_string(payload_path)?;
    let payload: Value = serde_json::from_str(&payload_json)?;

    let result = validate(&spec.form, &payload, &FormEnvironment::new().shared())?;
    println!(
        "Validation result: {}",
        if result.valid { "valid" } else { "invalid" }
    );
    describe_validation(&result);

    if result.valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(result: &ValidationResult) {
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  {} - {}", error.field, error.message);
        }
    }
    if !result.form_errors.is_empty() {
        println!("Form errors:");
        for message in &result.form_errors {
            println!("  {}", message);
        }
    }
}

fn run_schema(spec_path: PathBuf) -> CliResult<()> {
    let spec = load_spec(&spec_path)?;
    let schema = parse_component_result(&get_schema(&spec.id, &spec.config_json))?;
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn run_process(
    spec_path: PathBuf,
    payload_path: PathBuf,
    step: Option<String>,
    values_path: Option<PathBuf>,
    owner: u64,
    store_path: PathBuf,
) -> CliResult<()> {
    let spec = load_spec(&spec_path)?;
    let payload = fs::read_to_string(payload_path)?;
    let values = match values_path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Value::Null,
    };
    let store = FileStore::open(&store_path)?;

    let step = step
        .as_deref()
        .and_then(StepRef::parse)
        .map_or(Value::Null, |step| json!(step));
    let ctx = request_context(owner, &step, &values, &store)?;
    let mut response =
        parse_component_result(&form_process(&spec.id, &spec.config_json, &ctx, &payload))?;
    persist_store(&store, &mut response)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn run_show(spec_path: PathBuf, owner: u64, store_path: PathBuf) -> CliResult<()> {
    let spec = load_spec(&spec_path)?;
    let store = FileStore::open(&store_path)?;
    let ctx = request_context(owner, &Value::Null, &Value::Null, &store)?;
    let values = parse_component_result(&load_values(&spec.id, &spec.config_json, &ctx))?;
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

fn run_wizard(
    spec_path: PathBuf,
    owner: u64,
    store_path: PathBuf,
    verbose: bool,
    values_json: bool,
    format: RenderMode,
) -> CliResult<()> {
    let spec = load_spec(&spec_path)?;
    let store = FileStore::open(&store_path)?;
    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose), values_json);

    let mut step = Value::Null;
    let mut values = Value::Null;
    let ctx = request_context(owner, &step, &values, &store)?;
    let mut ui = parse_component_result(&render_step(&spec.id, &spec.config_json, &ctx))?;

    loop {
        let payload =
            WizardPayload::from_json(&ui).map_err(|err| format!("wizard UI error: {}", err))?;
        let ctx = request_context(owner, &json!(payload.step), &values, &store)?;
        print_render_output(format, &spec, &ctx, &ui)?;
        presenter.show_header(&payload);
        if payload.is_complete() {
            presenter.show_completion(&payload, &values);
            break;
        }
        presenter.show_step(&payload);
        presenter.show_errors(&payload);

        let mut submission = Map::new();
        submission.insert(STEP_FIELD.into(), Value::String(payload.step_name.clone()));
        for field in &payload.fields {
            let answer = prompt_field(field, &presenter)?;
            submission.insert(field.key.clone(), answer);
        }

        let submission = Value::Object(submission).to_string();
        let mut response =
            parse_component_result(&form_process(&spec.id, &spec.config_json, &ctx, &submission))?;
        persist_store(&store, &mut response)?;
        values = response.get("values").cloned().unwrap_or(Value::Null);
        step = response.get("step").cloned().unwrap_or(Value::Null);
        tracing::debug!(step = %step, "wizard moved");
        ui = response;
    }

    Ok(())
}

fn request_context(owner: u64, step: &Value, values: &Value, store: &FileStore) -> CliResult<String> {
    let mut ctx = Map::new();
    ctx.insert("owner".into(), json!(owner));
    if !step.is_null() {
        ctx.insert("step".into(), step.clone());
    }
    if !values.is_null() {
        ctx.insert("values".into(), values.clone());
    }
    ctx.insert("store".into(), serde_json::to_value(store.snapshot()?)?);
    Ok(Value::Object(ctx).to_string())
}

/// Moves the store snapshot returned by the component onto disk.
fn persist_store(store: &FileStore, response: &mut Value) -> CliResult<()> {
    let Some(snapshot) = response.as_object_mut().and_then(|map| map.remove("store")) else {
        return Ok(());
    };
    let snapshot: StoreSnapshot = serde_json::from_value(snapshot)?;
    store.replace_snapshot(snapshot)?;
    tracing::debug!(path = %store.path().display(), "store written");
    Ok(())
}

fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        Err(error.into())
    } else {
        Ok(value)
    }
}

fn prompt_field(field: &WizardField, presenter: &WizardPresenter) -> CliResult<Value> {
    let prompt = PromptContext::new(field);
    loop {
        presenter.show_prompt(&prompt);
        print!("> ");
        io::stdout().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Err("wizard aborted: end of input".into());
        }

        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("exit") {
            return Err("wizard aborted by user".into());
        }
        if trimmed.is_empty() {
            return Ok(field.value.clone());
        }

        match parse_answer(field, trimmed) {
            Ok(value) => return Ok(value),
            Err(err) => presenter.show_parse_error(&err),
        }
    }
}

fn parse_answer(field: &WizardField, raw: &str) -> Result<Value, AnswerParseError> {
    match field.kind {
        FieldKind::Text => Ok(Value::String(raw.to_string())),
        FieldKind::Number => raw
            .parse::<f64>()
            .map(|_| Value::String(raw.to_string()))
            .map_err(|_| AnswerParseError::new("Please enter a number.", Some("number".into()))),
        FieldKind::Checkbox => parse_checkbox(raw),
        FieldKind::Choice => parse_choice(field, raw),
        FieldKind::Terms => split_list(raw)
            .map(|item| {
                item.parse::<u64>().map(Value::from).map_err(|_| {
                    AnswerParseError::new(
                        format!("'{}' is not a term id.", item),
                        Some("positive integers separated by commas".into()),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        FieldKind::Structured => serde_json::from_str(raw).map_err(|err| {
            AnswerParseError::new("Please enter a JSON value.", Some(err.to_string()))
        }),
    }
}

fn parse_checkbox(raw: &str) -> Result<Value, AnswerParseError> {
    match raw.to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" | "on" => Ok(Value::Bool(true)),
        "n" | "no" | "false" | "0" | "off" => Ok(Value::Bool(false)),
        _ => Err(AnswerParseError::new(
            "Please answer yes or no.",
            Some("yes/no, y/n, true/false".into()),
        )),
    }
}

fn parse_choice(field: &WizardField, raw: &str) -> Result<Value, AnswerParseError> {
    let check = |item: &str| {
        if field.choices.is_empty() || field.choices.iter().any(|choice| choice == item) {
            Ok(Value::String(item.to_string()))
        } else {
            Err(AnswerParseError::new(
                format!("'{}' is not one of the choices.", item),
                Some(field.choices.join(", ")),
            ))
        }
    };
    if field.multiple {
        split_list(raw)
            .map(check)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    } else {
        check(raw)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn print_render_output(
    mode: RenderMode,
    spec: &LoadedSpec,
    ctx_json: &str,
    ui: &Value,
) -> CliResult<()> {
    match mode {
        RenderMode::Text => Ok(()),
        RenderMode::Json => {
            let mut ui = ui.clone();
            if let Some(map) = ui.as_object_mut() {
                map.remove("store");
            }
            println!("JSON UI:\n{}", serde_json::to_string_pretty(&ui)?);
            let text = form_render_text(&spec.id, &spec.config_json, ctx_json);
            println!("Text:\n{}", text);
            Ok(())
        }
    }
}
