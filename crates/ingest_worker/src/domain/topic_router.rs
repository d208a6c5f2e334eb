use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

const KEY_PATH: &[&str] = &["app", "context", "haId"];
const TYPE_PATH: &[&str] = &["app", "cdlConfig", "type"];
const REGION_PATH: &[&str] = &["app", "cdlConfig", "region"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("missing field {path}")]
    MissingField { path: String },

    #[error("field {path} is {found}, expected a string")]
    WrongType { path: String, found: &'static str },
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Walk `path` through nested objects and return the string at its end
pub fn extract_str<'a>(record: &'a Value, path: &[&str]) -> Result<&'a str, RoutingError> {
    let dotted = || path.join(".");

    let mut current = record;
    for (depth, segment) in path.iter().enumerate() {
        let Value::Object(fields) = current else {
            return Err(RoutingError::WrongType {
                path: path[..depth].join("."),
                found: json_type_name(current),
            });
        };
        current = fields
            .get(*segment)
            .ok_or_else(|| RoutingError::MissingField { path: dotted() })?;
    }

    match current {
        Value::String(s) => Ok(s),
        other => Err(RoutingError::WrongType {
            path: dotted(),
            found: json_type_name(other),
        }),
    }
}

/// Destination of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub topic: String,
    pub key: String,
}

/// What to do with a line whose routing fields are missing or mistyped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingFailurePolicy {
    /// Log the line and carry on with the rest of the object
    #[default]
    Skip,
    /// Fail the enclosing notification item so it is redelivered
    FailItem,
}

/// Derives `{base}_{type}_{region}` topics and `haId` partition keys
#[derive(Debug, Clone)]
pub struct TopicRouter {
    base_topic: String,
}

impl TopicRouter {
    pub fn new(base_topic: impl Into<String>) -> Self {
        Self {
            base_topic: base_topic.into(),
        }
    }

    pub fn base_topic(&self) -> &str {
        &self.base_topic
    }

    pub fn route(&self, record: &Value) -> Result<Route, RoutingError> {
        let key = extract_str(record, KEY_PATH)?;
        let record_type = extract_str(record, TYPE_PATH)?;
        let region = extract_str(record, REGION_PATH)?;

        Ok(Route {
            topic: format!("{}_{}_{}", self.base_topic, record_type, region),
            key: key.to_string(),
        })
    }
}
