use std::sync::Arc;

use serde_json::{Value, json};

use form_spec::{
    BackendError, Datastore, FieldDefinition, Form, FormEnvironment, OwnerId, Persistence,
    PersistenceError, ProcessingError, SchemaError, StepContext, StepRef, ViewContext, Wizard,
    WizardStep,
};

fn form(definitions: Vec<FieldDefinition>) -> Form {
    Form::new("test", definitions, &FormEnvironment::new().shared()).expect("form")
}

fn fields_step<S: 'static>(name: &str, keys: &[&str]) -> WizardStep<S> {
    let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
    let shown = keys.clone();
    WizardStep::new(name)
        .view(move |ctx: &ViewContext<'_, S>| {
            json!({
                "step": ctx.step,
                "fields": shown.iter().filter_map(|key| ctx.form.field(key)).map(|f| f.render()).collect::<Vec<_>>(),
            })
        })
        .handler(move |ctx: &mut StepContext<'_, S>| {
            ctx.form.bind_only(ctx.payload, &keys);
            if ctx.form.validate_only(&keys) {
                ctx.advance();
            }
            Ok(())
        })
}

fn page<S: 'static>(name: &str) -> WizardStep<S> {
    let label = name.to_string();
    WizardStep::new(name).view(move |_: &ViewContext<'_, S>| json!({ "page": label }))
}

/// Steps `[A(requires "name"), B, C(terminal)]`.
fn abc() -> Wizard<()> {
    let steps = vec![
        fields_step("a", &["name"]),
        WizardStep::new("b")
            .view(|_: &ViewContext<'_, ()>| json!({ "page": "b" }))
            .handler(|ctx: &mut StepContext<'_, ()>| {
                ctx.advance();
                Ok(())
            }),
        page("c"),
    ];
    let form = form(vec![FieldDefinition::new("name", "text").required(true)]);
    Wizard::new("abc", form, (), steps).expect("wizard")
}

#[test]
fn required_field_keeps_first_step_then_advances() {
    let mut wizard = abc();

    let outcome = wizard.process(&json!({ "_step": 0, "name": "" })).expect("process");
    assert_eq!(outcome.step, 0);
    assert_eq!(outcome.step_name, "a");
    assert_eq!(outcome.errors["name"], vec!["name is a required field"]);
    assert_eq!(outcome.view.as_ref().map(|view| &view["step"]), Some(&json!("a")));

    let outcome = wizard.process(&json!({ "_step": "a", "name": "x" })).expect("process");
    assert_eq!(outcome.step, 1);
    assert_eq!(outcome.step_name, "b");
    assert!(outcome.errors.is_empty());
    assert!(!outcome.terminal);

    let outcome = wizard.process(&json!({ "_step": "b" })).expect("process");
    assert_eq!(outcome.step_name, "c");
    assert!(outcome.terminal);
    assert_eq!(wizard.form().field_value("name"), Some(&json!("x")));
}

#[test]
fn rendering_a_view_never_moves_the_pointer() {
    let mut wizard = abc();
    wizard.select(&StepRef::Name("b".into()));
    let first = wizard.view();
    for _ in 0..5 {
        assert_eq!(wizard.view(), first);
        assert_eq!(wizard.current_index(), 1);
    }
}

#[test]
fn index_and_name_addressing_agree() {
    let mut wizard = abc();
    for (index, name) in ["a", "b", "c"].into_iter().enumerate() {
        assert_eq!(wizard.resolve(&StepRef::Index(index)), Some(index));
        assert_eq!(wizard.resolve(&StepRef::Name(name.into())), Some(index));
    }
    assert_eq!(
        StepRef::from_payload(&json!({ "_step": "2" })),
        Some(StepRef::Index(2))
    );
    assert_eq!(StepRef::parse(" b "), Some(StepRef::Name("b".into())));
    assert_eq!(StepRef::parse(""), None);

    assert!(wizard.select(&StepRef::Index(2)));
    assert!(!wizard.select(&StepRef::Name("nope".into())));
    assert!(!wizard.select(&StepRef::Index(9)));
    assert_eq!(wizard.current_index(), 2);
}

#[test]
fn unknown_step_in_request_is_ignored() {
    let mut wizard = abc();
    wizard.select(&StepRef::Index(1));
    let outcome = wizard.process(&json!({ "_step": "missing" })).expect("process");
    // The pointer stays on b, whose handler then advances.
    assert_eq!(outcome.step_name, "c");
    assert!(outcome.form_errors.is_empty());
}

#[derive(Debug, Default)]
struct Picked {
    kind: Option<String>,
    visits: usize,
}

#[test]
fn view_less_steps_chain_to_the_next_view() {
    let steps = vec![
        fields_step("choose", &["kind"]),
        WizardStep::new("remember").handler(|ctx: &mut StepContext<'_, Picked>| {
            ctx.state.visits += 1;
            ctx.state.kind = ctx.form.field_value("kind").and_then(Value::as_str).map(String::from);
            ctx.advance();
            Ok(())
        }),
        WizardStep::new("route").handler(|ctx: &mut StepContext<'_, Picked>| {
            ctx.state.visits += 1;
            if ctx.state.kind.as_deref() == Some("event") {
                ctx.go_to("event");
            } else {
                ctx.go_to("place");
            }
            Ok(())
        }),
        page("place"),
        page("event"),
    ];
    let form = form(vec![
        FieldDefinition::new("kind", "radio")
            .required(true)
            .choices(["place", "event"]),
    ]);
    let mut wizard = Wizard::new("branch", form, Picked::default(), steps).expect("wizard");

    let outcome = wizard.process(&json!({ "kind": "event" })).expect("process");
    assert_eq!(outcome.step_name, "event");
    assert_eq!(outcome.view, Some(json!({ "page": "event" })));
    assert_eq!(wizard.state().visits, 2);
    assert_eq!(wizard.state().kind.as_deref(), Some("event"));
}

#[test]
fn processing_error_becomes_form_error_and_keeps_step() {
    let steps = vec![
        WizardStep::new("login")
            .view(|_: &ViewContext<'_, ()>| json!({ "page": "login" }))
            .handler(|ctx: &mut StepContext<'_, ()>| {
                ctx.advance();
                Err(ProcessingError::Credentials("Wrong username or password".into()).into())
            }),
        page("welcome"),
    ];
    let mut wizard = Wizard::new("login", form(Vec::new()), (), steps).expect("wizard");

    let outcome = wizard.process(&json!({})).expect("processing errors are not fatal");
    assert_eq!(outcome.step_name, "login");
    assert_eq!(outcome.form_errors, vec!["Wrong username or password"]);
}

#[derive(Debug)]
struct Offline;

impl Datastore for Offline {
    fn load(&self, _owner: OwnerId, _key: &str) -> Value {
        Value::Null
    }

    fn save(&self, owner: OwnerId, key: &str, _value: &Value) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend {
            owner,
            key: key.to_string(),
            source: BackendError::new("database offline"),
        })
    }

    fn delete(&self, owner: OwnerId, key: &str) -> Result<(), PersistenceError> {
        self.save(owner, key, &Value::Null)
    }
}

#[test]
fn persistence_error_reaches_the_caller() {
    let mut persistence = Persistence::new();
    persistence.route("title", Box::new(Offline));
    let steps = vec![
        WizardStep::new("edit")
            .view(|_: &ViewContext<'_, Persistence>| json!({ "page": "edit" }))
            .handler(|ctx: &mut StepContext<'_, Persistence>| {
                ctx.form.bind(ctx.payload);
                ctx.form.save(OwnerId(1), ctx.state)?;
                ctx.advance();
                Ok(())
            }),
        page("saved"),
    ];
    let form = form(vec![FieldDefinition::new("title", "text")]);
    let mut wizard = Wizard::new("edit", form, persistence, steps).expect("wizard");

    let err = wizard.process(&json!({ "title": "Cafe" })).expect_err("fatal");
    assert!(matches!(err, PersistenceError::Backend { ref key, .. } if key == "title"));
    assert_eq!(wizard.current_index(), 0);
    assert_eq!(wizard.form().changeset().len(), 1, "failed save keeps pending changes");
}

#[test]
fn advancing_past_the_end_stays_on_last_step() {
    let steps = vec![WizardStep::new("only")
        .view(|_: &ViewContext<'_, ()>| json!({}))
        .handler(|ctx: &mut StepContext<'_, ()>| {
            ctx.advance();
            Ok(())
        })];
    let mut wizard = Wizard::new("one", form(Vec::new()), (), steps).expect("wizard");
    let outcome = wizard.process(&json!({})).expect("process");
    assert_eq!(outcome.step, 0);
}

#[test]
fn steps_follow_priority_with_stable_ties() {
    let steps = vec![
        page::<()>("late").priority(30),
        page("first").priority(10),
        page("second").priority(10),
    ];
    let wizard = Wizard::new("order", form(Vec::new()), (), steps).expect("wizard");
    assert_eq!(wizard.step_names(), vec!["first", "second", "late"]);
    assert_eq!(wizard.current_step().name(), "first");
}

#[test]
fn construction_rejects_empty_and_duplicate_steps() {
    let empty = Wizard::<()>::new("none", form(Vec::new()), (), Vec::new());
    assert!(matches!(empty, Err(SchemaError::EmptyWizard(_))));

    let duplicate = Wizard::new("dup", form(Vec::new()), (), vec![page::<()>("a"), page("a")]);
    assert!(matches!(duplicate, Err(SchemaError::DuplicateStep(name)) if name == "a"));
}

#[test]
fn environment_is_shared_not_global() {
    let env = Arc::new(FormEnvironment::new());
    let one = Form::new("one", Vec::new(), &env).expect("form");
    let two = Form::new("two", Vec::new(), &env).expect("form");
    assert_eq!(Arc::strong_count(&env), 3);
    drop((one, two));
    assert_eq!(Arc::strong_count(&env), 1);
}

#[test]
fn deserialized_step_strings_follow_payload_addressing() {
    let index: StepRef = serde_json::from_value(json!("2")).expect("numeric string");
    assert_eq!(index, StepRef::Index(2));
    let index: StepRef = serde_json::from_value(json!(1)).expect("number");
    assert_eq!(index, StepRef::Index(1));
    let name: StepRef = serde_json::from_value(json!("b")).expect("name");
    assert_eq!(name, StepRef::Name("b".into()));
    assert!(serde_json::from_value::<StepRef>(json!("  ")).is_err());
    assert!(serde_json::from_value::<StepRef>(json!(true)).is_err());

    let mut wizard = abc();
    assert!(wizard.select(&index));
    assert_eq!(wizard.current_index(), 1);
}
