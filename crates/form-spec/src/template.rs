use handlebars::{Handlebars, handlebars_helper, no_escape};
use serde_json::Value;

handlebars_helper!(lower: |text: str| text.to_lowercase());
handlebars_helper!(upper_first: |text: str| {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
});

/// Renders validation messages such as `"{{label}} is a required field"`.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    engine: Handlebars<'static>,
}

impl MessageRenderer {
    pub fn new() -> Self {
        let mut engine = Handlebars::new();
        engine.register_escape_fn(no_escape);
        register_default_helpers(&mut engine);
        Self { engine }
    }

    /// Renders `template` against `data`. A broken template is returned verbatim.
    pub fn render(&self, template: &str, data: &Value) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }
        match self.engine.render_template(template, data) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%template, error = %err, "failed to render message template");
                template.to_string()
            }
        }
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn register_default_helpers(engine: &mut Handlebars<'static>) {
    engine.register_helper("lower", Box::new(lower));
    engine.register_helper("upper_first", Box::new(upper_first));
}
