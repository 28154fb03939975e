use serde_json::Value;

/// A bind value for a positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Arrays and objects, bound as `jsonb`.
    Json(Value),
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => SqlParam::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlParam::Json(value.clone()),
        }
    }
}

impl From<Value> for SqlParam {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => SqlParam::Text(s),
            Value::Array(_) | Value::Object(_) => SqlParam::Json(value),
            other => SqlParam::from(&other),
        }
    }
}

/// Parameterized SQL text plus its positional arguments (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(text: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}
