use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lightweight condition AST used by decision steps and conditional validators.
///
/// Paths are JSON pointers into the evaluation context, e.g. `/values/listing_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    LiteralBool { value: bool },
    Eq { path: String, value: Value },
    In { path: String, values: Vec<Value> },
    IsSet { path: String },
    And { expressions: Vec<Expr> },
    Or { expressions: Vec<Expr> },
    Not { expression: Box<Expr> },
    Var { path: String },
}

impl Expr {
    fn get_value<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
        ctx.pointer(path)
    }

    /// Evaluates the expression to a boolean if possible.
    pub fn evaluate(&self, ctx: &Value) -> Option<bool> {
        match self {
            Expr::LiteralBool { value } => Some(*value),
            Expr::Eq { path, value } => {
                let current = Self::get_value(ctx, path)?;
                Some(current == value)
            }
            Expr::In { path, values } => {
                let current = Self::get_value(ctx, path)?;
                Some(values.contains(current))
            }
            Expr::IsSet { path } => Some(
                Self::get_value(ctx, path).is_some_and(|value| !crate::field::is_empty(value)),
            ),
            Expr::And { expressions } => {
                for expr in expressions {
                    match expr.evaluate(ctx) {
                        Some(true) => continue,
                        Some(false) => return Some(false),
                        None => return None,
                    }
                }
                Some(true)
            }
            Expr::Or { expressions } => {
                for expr in expressions {
                    if let Some(true) = expr.evaluate(ctx) {
                        return Some(true);
                    }
                }
                Some(false)
            }
            Expr::Not { expression } => expression.evaluate(ctx).map(|value| !value),
            Expr::Var { path } => Self::get_value(ctx, path).and_then(|v| v.as_bool()),
        }
    }

    /// Evaluates against a form value map wrapped as `{ "values": ... }`.
    /// Unknown paths count as false.
    pub fn matches_values(&self, values: &Value) -> bool {
        let ctx = serde_json::json!({ "values": values });
        self.evaluate(&ctx).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_compares_against_literal() {
        let expr = Expr::Eq {
            path: "/values/kind".into(),
            value: json!("event"),
        };
        assert!(expr.matches_values(&json!({ "kind": "event" })));
        assert!(!expr.matches_values(&json!({ "kind": "place" })));
        assert!(!expr.matches_values(&json!({})));
    }

    #[test]
    fn is_set_treats_blank_as_unset() {
        let expr = Expr::IsSet {
            path: "/values/logo".into(),
        };
        assert!(!expr.matches_values(&json!({ "logo": "" })));
        assert!(expr.matches_values(&json!({ "logo": "x.png" })));
    }

    #[test]
    fn deserializes_tagged_form() {
        let expr: Expr = serde_json::from_value(json!({
            "op": "not",
            "expression": { "op": "in", "path": "/values/a", "values": [1, 2] }
        }))
        .expect("deserialize");
        assert!(expr.matches_values(&json!({ "a": 3 })));
    }
}
