use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::datastore::{OwnerId, Persistence};
use crate::env::FormEnvironment;
use crate::error::SchemaError;
use crate::form::Form;
use crate::spec::flow::{DecisionCase, StepSpec, WizardSpec};
use crate::wizard::{StepContext, ViewContext, Wizard, WizardStep};

/// State threaded through wizards compiled from a [`WizardSpec`].
#[derive(Debug)]
pub struct FlowState {
    pub owner: OwnerId,
    pub persistence: Persistence,
    /// Number of values written by save steps during this request.
    pub saved: usize,
}

impl FlowState {
    pub fn new(owner: OwnerId, persistence: Persistence) -> Self {
        Self {
            owner,
            persistence,
            saved: 0,
        }
    }
}

/// Builds the form and compiles every step of `spec` into a runnable wizard.
pub fn build_wizard(
    spec: &WizardSpec,
    env: &Arc<FormEnvironment>,
    state: FlowState,
) -> Result<Wizard<FlowState>, SchemaError> {
    let form = Form::from_schema(&spec.form, env)?;
    check_references(spec, &form)?;

    let steps = spec
        .steps
        .iter()
        .enumerate()
        .map(|(position, step)| {
            let priority = step
                .priority()
                .unwrap_or_else(|| (position as i32 + 1) * 10);
            compile_step(step).priority(priority)
        })
        .collect();

    Wizard::new(&spec.id, form, state, steps)
}

/// Fills the wizard's form with the values stored for its owner.
pub fn load_stored(wizard: &mut Wizard<FlowState>) {
    let (form, state) = wizard.parts_mut();
    form.load(state.owner, &state.persistence);
}

fn check_references(spec: &WizardSpec, form: &Form) -> Result<(), SchemaError> {
    let names: BTreeSet<&str> = spec.steps.iter().map(StepSpec::name).collect();
    for step in &spec.steps {
        match step {
            StepSpec::Fields { name, fields, .. } => {
                if let Some(field) = fields.iter().find(|key| form.field(key).is_none()) {
                    return Err(SchemaError::UnknownStepField {
                        step: name.clone(),
                        field: field.clone(),
                    });
                }
            }
            StepSpec::Decision {
                name,
                cases,
                default,
                ..
            } => {
                let targets = cases
                    .iter()
                    .map(|case| case.goto.as_str())
                    .chain(default.as_deref());
                for target in targets {
                    if !names.contains(target) {
                        return Err(SchemaError::UnknownStepTarget {
                            step: name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
            StepSpec::Save { .. } | StepSpec::Message { .. } => {}
        }
    }
    Ok(())
}

fn compile_step(spec: &StepSpec) -> WizardStep<FlowState> {
    match spec {
        StepSpec::Fields {
            name,
            title,
            fields,
            ..
        } => {
            let title = title.clone().unwrap_or_else(|| name.clone());
            let shown = fields.clone();
            let keys = fields.clone();
            WizardStep::new(name)
                .view(move |ctx: &ViewContext<'_, FlowState>| fields_view(ctx, &title, &shown))
                .handler(move |ctx: &mut StepContext<'_, FlowState>| {
                    ctx.form.bind_only(ctx.payload, &keys);
                    if ctx.form.validate_only(&keys) {
                        ctx.advance();
                    } else {
                        ctx.stay();
                    }
                    Ok(())
                })
        }
        StepSpec::Decision {
            name,
            cases,
            default,
            ..
        } => {
            let cases = cases.clone();
            let default = default.clone();
            WizardStep::new(name).handler(move |ctx: &mut StepContext<'_, FlowState>| {
                let values = ctx.form.to_value();
                match choose(&cases, &values).or(default.as_deref()) {
                    Some(target) => ctx.go_to(target),
                    None => ctx.advance(),
                }
                Ok(())
            })
        }
        StepSpec::Save { name, .. } => {
            WizardStep::new(name).handler(|ctx: &mut StepContext<'_, FlowState>| {
                let owner = ctx.state.owner;
                let written = ctx.form.save(owner, &ctx.state.persistence)?;
                ctx.state.saved += written;
                ctx.advance();
                Ok(())
            })
        }
        StepSpec::Message {
            name, title, text, ..
        } => {
            let title = title.clone().unwrap_or_else(|| name.clone());
            let text = text.clone();
            WizardStep::new(name).view(move |ctx: &ViewContext<'_, FlowState>| {
                json!({
                    "step": ctx.step,
                    "index": ctx.index,
                    "total": ctx.total,
                    "title": title,
                    "text": message_text(ctx, &text),
                })
            })
        }
    }
}

fn choose<'a>(cases: &'a [DecisionCase], values: &Value) -> Option<&'a str> {
    cases
        .iter()
        .find(|case| case.when.matches_values(values))
        .map(|case| case.goto.as_str())
}

fn fields_view(ctx: &ViewContext<'_, FlowState>, title: &str, keys: &[String]) -> Value {
    let fields: Vec<Value> = keys
        .iter()
        .filter_map(|key| ctx.form.field(key))
        .map(|field| field.render())
        .collect();
    json!({
        "step": ctx.step,
        "index": ctx.index,
        "total": ctx.total,
        "title": title,
        "fields": fields,
        "form_errors": ctx.form.form_errors(),
    })
}

fn message_text(ctx: &ViewContext<'_, FlowState>, template: &str) -> String {
    let data = json!({ "values": ctx.form.to_value(), "owner": ctx.state.owner });
    ctx.form.render_message(template, &data)
}
