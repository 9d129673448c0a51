use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PersistenceError, SchemaError, StepError};
use crate::form::Form;

/// Payload key carrying the step indicator (index or name).
pub const STEP_FIELD: &str = "_step";

pub type ViewFn<S> = Box<dyn Fn(&ViewContext<'_, S>) -> Value + Send + Sync>;
pub type HandlerFn<S> = Box<dyn Fn(&mut StepContext<'_, S>) -> Result<(), StepError> + Send + Sync>;

/// Where the wizard goes after a handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Advance,
    GoTo(String),
}

/// Step address carried by a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StepRef {
    Index(usize),
    Name(String),
}

impl StepRef {
    /// Parses a textual step address; numeric strings address by index.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            None
        } else if let Ok(index) = text.parse::<usize>() {
            Some(StepRef::Index(index))
        } else {
            Some(StepRef::Name(text.to_string()))
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_u64().map(|index| StepRef::Index(index as usize)),
            Value::String(text) => StepRef::parse(text),
            _ => None,
        }
    }

    /// Reads `_step` from a payload.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        payload.get(STEP_FIELD).and_then(StepRef::from_value)
    }
}

impl<'de> Deserialize<'de> for StepRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        StepRef::from_value(&value).ok_or_else(|| de::Error::custom("expected a step index or name"))
    }
}

/// Read-only view of the wizard handed to step views.
pub struct ViewContext<'a, S> {
    pub form: &'a Form,
    pub state: &'a S,
    pub step: &'a str,
    pub index: usize,
    pub total: usize,
}

/// Mutable context handed to step handlers.
pub struct StepContext<'a, S> {
    pub form: &'a mut Form,
    pub state: &'a mut S,
    pub payload: &'a Value,
    step: &'a str,
    transition: Transition,
}

impl<S> StepContext<'_, S> {
    pub fn step(&self) -> &str {
        self.step
    }

    pub fn advance(&mut self) {
        self.transition = Transition::Advance;
    }

    pub fn go_to(&mut self, step: impl Into<String>) {
        self.transition = Transition::GoTo(step.into());
    }

    pub fn stay(&mut self) {
        self.transition = Transition::Stay;
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }
}

pub struct WizardStep<S> {
    name: String,
    priority: i32,
    view: Option<ViewFn<S>>,
    handler: Option<HandlerFn<S>>,
}

impl<S> WizardStep<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            view: None,
            handler: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn view<F>(mut self, view: F) -> Self
    where
        F: Fn(&ViewContext<'_, S>) -> Value + Send + Sync + 'static,
    {
        self.view = Some(Box::new(view));
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut StepContext<'_, S>) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// A view without a handler: confirmation or display only.
    pub fn is_terminal(&self) -> bool {
        self.view.is_some() && self.handler.is_none()
    }
}

impl<S> fmt::Debug for WizardStep<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardStep")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("view", &self.view.is_some())
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Result of one `process` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub step: usize,
    pub step_name: String,
    pub terminal: bool,
    pub view: Option<Value>,
    pub errors: BTreeMap<String, Vec<String>>,
    pub form_errors: Vec<String>,
}

/// Multi-step state machine over one form. The current step is always a valid
/// index; the step indicator travels with each request.
pub struct Wizard<S> {
    id: String,
    form: Form,
    state: S,
    steps: Vec<WizardStep<S>>,
    current: usize,
}

impl<S> Wizard<S> {
    /// Orders steps by priority (ties keep declaration order) and starts on the first.
    pub fn new(
        id: impl Into<String>,
        form: Form,
        state: S,
        mut steps: Vec<WizardStep<S>>,
    ) -> Result<Self, SchemaError> {
        let id = id.into();
        if steps.is_empty() {
            return Err(SchemaError::EmptyWizard(id));
        }
        let mut names = BTreeSet::new();
        for step in &steps {
            if !names.insert(step.name.as_str()) {
                return Err(SchemaError::DuplicateStep(step.name.clone()));
            }
        }
        steps.sort_by_key(|step| step.priority);
        Ok(Self {
            id,
            form,
            state,
            steps,
            current: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn parts_mut(&mut self) -> (&mut Form, &mut S) {
        (&mut self.form, &mut self.state)
    }

    pub fn into_parts(self) -> (Form, S) {
        (self.form, self.state)
    }

    pub fn steps(&self) -> &[WizardStep<S>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(WizardStep::name).collect()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_step(&self) -> &WizardStep<S> {
        &self.steps[self.current]
    }

    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name == name)
    }

    pub fn resolve(&self, step: &StepRef) -> Option<usize> {
        match step {
            StepRef::Index(index) => (*index < self.steps.len()).then_some(*index),
            StepRef::Name(name) => self.step_index(name),
        }
    }

    /// Moves to `step`. Unknown steps leave the pointer untouched.
    pub fn select(&mut self, step: &StepRef) -> bool {
        match self.resolve(step) {
            Some(index) => {
                self.current = index;
                true
            }
            None => {
                tracing::debug!(wizard = %self.id, ?step, "ignoring unknown step");
                false
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current_step().is_terminal()
    }

    /// Renders the current step. Never changes the step pointer.
    pub fn view(&self) -> Option<Value> {
        let step = self.current_step();
        let view = step.view.as_ref()?;
        Some(view(&ViewContext {
            form: &self.form,
            state: &self.state,
            step: &step.name,
            index: self.current,
            total: self.steps.len(),
        }))
    }

    /// Resolves the current step from `payload`, runs its handler and applies
    /// the transition. View-less steps reached this way are processed in turn.
    ///
    /// Processing errors become form-level messages and keep the step;
    /// persistence errors are returned to the caller.
    pub fn process(&mut self, payload: &Value) -> Result<ProcessOutcome, PersistenceError> {
        if let Some(step) = StepRef::from_payload(payload) {
            self.select(&step);
        }

        let mut hops = 0;
        loop {
            let from = self.current;
            let step = &self.steps[from];
            let Some(handler) = step.handler.as_ref() else {
                break;
            };

            let mut ctx = StepContext {
                form: &mut self.form,
                state: &mut self.state,
                payload,
                step: &step.name,
                transition: Transition::Stay,
            };
            let transition = match handler(&mut ctx) {
                Ok(()) => ctx.transition,
                Err(StepError::Processing(err)) => {
                    tracing::info!(wizard = %self.id, step = %step.name, error = %err, "step rejected");
                    self.form.add_form_error(err.to_string());
                    Transition::Stay
                }
                Err(StepError::Persistence(err)) => return Err(err),
            };

            let to = match &transition {
                Transition::Stay => from,
                Transition::Advance => (from + 1).min(self.steps.len() - 1),
                Transition::GoTo(name) => self.step_index(name).unwrap_or_else(|| {
                    tracing::warn!(wizard = %self.id, target = %name, "handler jumped to unknown step");
                    from
                }),
            };
            tracing::debug!(wizard = %self.id, from, to, "step transition");
            self.current = to;

            if to == from || self.steps[to].view.is_some() {
                break;
            }
            hops += 1;
            if hops > self.steps.len() {
                tracing::warn!(wizard = %self.id, "view-less steps did not settle");
                break;
            }
        }

        Ok(self.outcome())
    }

    pub fn outcome(&self) -> ProcessOutcome {
        let step = self.current_step();
        ProcessOutcome {
            step: self.current,
            step_name: step.name.clone(),
            terminal: step.is_terminal(),
            view: self.view(),
            errors: self.form.errors(),
            form_errors: self.form.form_errors().to_vec(),
        }
    }
}

impl<S> fmt::Debug for Wizard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wizard")
            .field("id", &self.id)
            .field("current", &self.current)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}
