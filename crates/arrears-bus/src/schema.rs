//! Structural validation of payloads and responses against JSON Schema.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One reason an instance does not match a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer into the instance; empty for the root.
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn root(message: impl Into<String>) -> Self {
        Self::new("", message)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A compiled JSON Schema document.
#[derive(Clone)]
pub struct Schema {
    document: Arc<Value>,
    validator: Arc<jsonschema::Validator>,
}

impl Schema {
    /// Compiles `document` with format assertions enabled, so `date-time`,
    /// `email` and friends are checked rather than treated as annotations.
    pub fn compile(document: Value) -> Result<Self, String> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&document)
            .map_err(|error| error.to_string())?;
        Ok(Self {
            document: Arc::new(document),
            validator: Arc::new(validator),
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Returns every violation, ordered as the validator reports them.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(instance)
            .map(|error| Violation::new(error.instance_path.to_string(), error.to_string()))
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_query_schema() -> Schema {
        Schema::compile(json!({
            "type": "object",
            "required": ["starting"],
            "properties": {
                "starting": { "type": "string", "format": "date-time" }
            },
            "additionalProperties": false
        }))
        .unwrap()
    }

    #[test]
    fn accepts_matching_instance() {
        let schema = event_query_schema();
        assert!(
            schema
                .validate(&json!({ "starting": "1970-01-01T00:00:00Z" }))
                .is_ok()
        );
    }

    #[test]
    fn reports_path_of_each_violation() {
        let schema = event_query_schema();
        let violations = schema
            .validate(&json!({ "starting": "next tuesday", "extra": 1 }))
            .unwrap_err();

        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.path == "/starting"));
        assert!(violations.iter().any(|v| v.path.is_empty()));
    }

    #[test]
    fn rejects_wrong_root_type() {
        let schema = event_query_schema();
        let violations = schema.validate(&json!(42)).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].path.is_empty());
    }

    #[test]
    fn validation_is_deterministic() {
        let schema = event_query_schema();
        let instance = json!({ "starting": 7, "other": true });
        assert_eq!(schema.validate(&instance), schema.validate(&instance));
    }

    #[test]
    fn invalid_schema_document_fails_to_compile() {
        let error = Schema::compile(json!({ "type": "not-a-type" })).unwrap_err();
        assert!(!error.is_empty());
    }
}
