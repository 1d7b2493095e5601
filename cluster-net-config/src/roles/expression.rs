//! Condition trees evaluated against named models.
//!
//! Conditions arrive already parsed, e.g. `settings:storage.objects_ceph.value == true` is
//! supplied as
//!
//! ```json
//! {"compare": {"op": "==",
//!              "left": {"model_reference": "settings:storage.objects_ceph.value"},
//!              "right": {"literal": true}}}
//! ```
//!
//! Evaluation follows the usual truthiness rules: `null`, `false`, `0` and `""` are false, every
//! other value is true.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("invalid model reference '{0}', expected '<model>:<path>'")]
    InvalidModelPath(String),
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("'{0}' does not resolve to a value")]
    Unresolved(ModelPath),
    #[error("cannot apply '{op}' to {left} and {right}")]
    NotComparable {
        op: CompareOp,
        left: Value,
        right: Value,
    },
    #[error("expected an integer, got {0}")]
    NotAnInteger(Value),
}

/// A reference into a model, `<model>:<key>.<key>...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, DeserializeFromStr, SerializeDisplay)]
pub struct ModelPath {
    model: String,
    keys: Vec<String>,
}

impl ModelPath {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl FromStr for ModelPath {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ExpressionError::InvalidModelPath(s.to_owned());

        let (model, path) = s.split_once(':').ok_or_else(invalid)?;

        if model.is_empty() || path.is_empty() {
            return Err(invalid());
        }

        let keys: Vec<String> = path.split('.').map(str::to_owned).collect();

        if keys.iter().any(String::is_empty) {
            return Err(invalid());
        }

        Ok(Self {
            model: model.to_owned(),
            keys,
        })
    }
}

impl Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model, self.keys.join("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

/// The models a condition can refer to, by name (`cluster`, `settings`, `nodes`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelContext(BTreeMap<String, Value>);

impl ModelContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(input: &str) -> Result<Self, Error> {
        log::trace!("parsing model context");
        serde_json::from_str(input).context("invalid model context")
    }

    pub fn with_model(mut self, name: impl Into<String>, model: Value) -> Self {
        self.insert(name, model);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, model: Value) -> Option<Value> {
        self.0.insert(name.into(), model)
    }

    pub fn resolve(&self, path: &ModelPath) -> Result<&Value, ExpressionError> {
        let model = self
            .0
            .get(path.model())
            .ok_or_else(|| ExpressionError::UnknownModel(path.model().to_owned()))?;

        path.keys()
            .iter()
            .try_fold(model, |value, key| match value {
                Value::Object(map) => map.get(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .ok_or_else(|| ExpressionError::Unresolved(path.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Value),
    ModelReference(ModelPath),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(value) => *value,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(value) => !value.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    let ordering = match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(l, r)| l.partial_cmp(&r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    };

    Ok(match (op, ordering) {
        (CompareOp::Eq, Some(ordering)) => ordering == Ordering::Equal,
        (CompareOp::Ne, Some(ordering)) => ordering != Ordering::Equal,
        (CompareOp::Eq, None) => left == right,
        (CompareOp::Ne, None) => left != right,
        (CompareOp::Lt, Some(ordering)) => ordering == Ordering::Less,
        (CompareOp::Le, Some(ordering)) => ordering != Ordering::Greater,
        (CompareOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
        (CompareOp::Ge, Some(ordering)) => ordering != Ordering::Less,
        (_, None) => {
            return Err(ExpressionError::NotComparable {
                op,
                left: left.clone(),
                right: right.clone(),
            })
        }
    })
}

impl Expression {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn evaluate(&self, context: &ModelContext) -> Result<Value, ExpressionError> {
        match self {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::ModelReference(path) => context.resolve(path).cloned(),
            Expression::Compare { op, left, right } => {
                let left = left.evaluate(context)?;
                let right = right.evaluate(context)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
            Expression::And(operands) => {
                for operand in operands {
                    if !operand.is_true(context)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Expression::Or(operands) => {
                for operand in operands {
                    if operand.is_true(context)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expression::Not(operand) => Ok(Value::Bool(!operand.is_true(context)?)),
        }
    }

    pub fn is_true(&self, context: &ModelContext) -> Result<bool, ExpressionError> {
        self.evaluate(context).map(|value| truthy(&value))
    }

    /// Evaluates to a whole number, for use as a node count limit.
    pub fn integer(&self, context: &ModelContext) -> Result<i64, ExpressionError> {
        let value = self.evaluate(context)?;

        value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
                    .map(|n| n as i64)
            })
            .ok_or(ExpressionError::NotAnInteger(value))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn context() -> ModelContext {
        ModelContext::new()
            .with_model("cluster", json!({"mode": "ha_compact", "status": "new"}))
            .with_model(
                "settings",
                json!({
                    "storage": {"volumes_ceph": {"value": true}, "replicas": {"value": 3}},
                    "additional_components": {"mongo": {"value": false}}
                }),
            )
            .with_model("nodes", json!([{"roles": ["controller"]}]))
    }

    fn reference(path: &str) -> Expression {
        Expression::ModelReference(path.parse().expect("valid model path"))
    }

    #[test]
    fn test_model_path() {
        let path: ModelPath = "settings:storage.volumes_ceph.value".parse().expect("valid path");
        assert_eq!(path.model(), "settings");
        assert_eq!(path.keys(), ["storage", "volumes_ceph", "value"]);
        assert_eq!(path.to_string(), "settings:storage.volumes_ceph.value");

        "settings".parse::<ModelPath>().unwrap_err();
        ":storage".parse::<ModelPath>().unwrap_err();
        "settings:storage..value".parse::<ModelPath>().unwrap_err();
    }

    #[test]
    fn test_resolve() {
        let context = context();

        assert_eq!(
            reference("settings:storage.replicas.value").integer(&context),
            Ok(3)
        );
        assert_eq!(
            reference("nodes:0.roles.0").evaluate(&context),
            Ok(json!("controller"))
        );
        assert_eq!(
            reference("release:version").evaluate(&context),
            Err(ExpressionError::UnknownModel("release".to_string()))
        );
        assert!(matches!(
            reference("cluster:mode.value").evaluate(&context),
            Err(ExpressionError::Unresolved(_))
        ));
    }

    #[test]
    fn test_conditions() {
        let context = context();

        let ha = Expression::compare(
            CompareOp::Eq,
            reference("cluster:mode"),
            Expression::literal("ha_compact"),
        );
        let ceph = reference("settings:storage.volumes_ceph.value");
        let mongo = reference("settings:additional_components.mongo.value");

        assert_eq!(ha.is_true(&context), Ok(true));
        assert_eq!(
            Expression::And(vec![ha.clone(), ceph.clone()]).is_true(&context),
            Ok(true)
        );
        assert_eq!(
            Expression::And(vec![ha.clone(), mongo.clone()]).is_true(&context),
            Ok(false)
        );
        assert_eq!(Expression::Or(vec![mongo.clone(), ceph]).is_true(&context), Ok(true));
        assert_eq!(Expression::Not(Box::new(mongo)).is_true(&context), Ok(true));
        assert_eq!(Expression::And(Vec::new()).is_true(&context), Ok(true));
        assert_eq!(Expression::Or(Vec::new()).is_true(&context), Ok(false));
    }

    #[test]
    fn test_compare_numbers() {
        let context = context();
        let replicas = reference("settings:storage.replicas.value");

        for (op, expected) in [
            (CompareOp::Eq, false),
            (CompareOp::Ne, true),
            (CompareOp::Lt, false),
            (CompareOp::Le, false),
            (CompareOp::Gt, true),
            (CompareOp::Ge, true),
        ] {
            let expression =
                Expression::compare(op, replicas.clone(), Expression::literal(2.0));
            assert_eq!(expression.is_true(&context), Ok(expected), "{op}");
        }

        assert_eq!(
            Expression::compare(CompareOp::Eq, replicas.clone(), Expression::literal(3.0))
                .is_true(&context),
            Ok(true)
        );

        let mismatch = Expression::compare(CompareOp::Lt, replicas, Expression::literal("3"));
        assert!(matches!(
            mismatch.evaluate(&context),
            Err(ExpressionError::NotComparable { .. })
        ));
    }

    #[test]
    fn test_deserialize() {
        let expression: Expression = serde_json::from_value(json!({
            "and": [
                {"compare": {
                    "op": "==",
                    "left": {"model_reference": "cluster:status"},
                    "right": {"literal": "new"}
                }},
                {"not": {"model_reference": "settings:additional_components.mongo.value"}}
            ]
        }))
        .expect("valid expression");

        assert_eq!(expression.is_true(&context()), Ok(true));
        assert_eq!(
            expression.integer(&context()),
            Err(ExpressionError::NotAnInteger(json!(true)))
        );
    }
}
