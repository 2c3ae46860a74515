//! Tool-level errors and argument decoding helpers.

use jsonschema::ValidationError;
use jsonschema::error::ValidationErrorKind;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::collaborators::CollaboratorError;

pub const VALIDATION_FAILED: &str = "validation_failed";

/// Failure reported inside a tool result (`isError: true`), never as a
/// JSON-RPC error.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
    pub docs_hint: Option<String>,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(VALIDATION_FAILED, message).with_field(field)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.code,
            "message": self.message
        });
        if let Some(field) = &self.field {
            payload["field"] = Value::String(field.clone());
        }
        if let Some(docs_hint) = &self.docs_hint {
            payload["docs_hint"] = Value::String(docs_hint.clone());
        }
        if let Some(details) = &self.details {
            payload["details"] = details.clone();
        }
        payload
    }
}

impl From<CollaboratorError> for ToolError {
    fn from(err: CollaboratorError) -> Self {
        let code = match &err {
            CollaboratorError::NotFound(_) => "not_found",
            CollaboratorError::Invalid { .. } => VALIDATION_FAILED,
            CollaboratorError::Conflict(_) => "conflict",
            CollaboratorError::Unavailable(_) => "collaborator_unavailable",
        };
        let tool_error = ToolError::new(code, err.to_string());
        match err {
            CollaboratorError::Invalid {
                field: Some(field), ..
            } => tool_error.with_field(field),
            CollaboratorError::Unavailable(_) => {
                tool_error.with_docs_hint("Transient backend failure; retry later.")
            }
            _ => tool_error,
        }
    }
}

pub fn required_string(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::validation(key, format!("Missing required field '{key}'")))?;
    match value {
        Value::String(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        Value::String(_) => Err(ToolError::validation(key, format!("'{key}' must not be empty"))),
        _ => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

pub fn arg_optional_string(
    args: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.trim().to_string())),
        Some(_) => Err(ToolError::validation(key, format!("'{key}' must be a string"))),
    }
}

pub fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| {
                ToolError::validation(key, format!("'{key}' must be an unsigned integer"))
            })
            .map(Some),
        Some(_) => Err(ToolError::validation(
            key,
            format!("'{key}' must be an unsigned integer"),
        )),
    }
}

pub fn arg_string_array(args: &Map<String, Value>, key: &str) -> Result<Vec<String>, ToolError> {
    let Some(value) = args.get(key).filter(|value| !value.is_null()) else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| ToolError::validation(key, format!("'{key}' must be an array of strings")))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item
            .as_str()
            .ok_or_else(|| ToolError::validation(key, format!("'{key}' items must be strings")))?;
        let normalized = text.trim();
        if !normalized.is_empty() {
            out.push(normalized.to_string());
        }
    }
    Ok(out)
}

pub fn required_uuid(args: &Map<String, Value>, key: &str) -> Result<Uuid, ToolError> {
    let raw = required_string(args, key)?;
    Uuid::parse_str(&raw)
        .map_err(|_| ToolError::validation(key, format!("'{key}' must be a valid UUID")))
}

/// Collapse the violations reported for one call into a single
/// `validation_failed` error. A missing required field wins over anything
/// else so the caller fixes the most basic problem first.
pub fn schema_violation<'a>(
    errors: impl Iterator<Item = ValidationError<'a>>,
    schema: &Value,
) -> Option<ToolError> {
    let mut errors: Vec<ValidationError<'a>> = errors.collect();
    if errors.is_empty() {
        return None;
    }
    let index = errors
        .iter()
        .position(|err| matches!(err.kind, ValidationErrorKind::Required { .. }))
        .unwrap_or(0);
    let error = errors.swap_remove(index);

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            let key = property.as_str().unwrap_or_default();
            Some(ToolError::validation(key, format!("Missing required field '{key}'")))
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            let key = unexpected.first().map(String::as_str).unwrap_or_default();
            let allowed: Vec<String> = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| props.keys().cloned().collect())
                .unwrap_or_default();
            Some(
                ToolError::validation(key, format!("Unknown field '{key}'"))
                    .with_details(json!({ "allowed_fields": allowed })),
            )
        }
        _ => {
            let path = error.instance_path.to_string();
            let key = path.trim_start_matches('/').split('/').next().unwrap_or_default();
            Some(ToolError::validation(key, format!("Invalid '{key}': {error}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "limit": { "type": "integer", "minimum": 1, "maximum": 50 },
                "status": { "type": "string", "enum": ["open", "done"] }
            },
            "required": ["title"],
            "additionalProperties": false
        })
    }

    fn violation(instance: Value) -> Option<ToolError> {
        let schema = schema();
        let validator = jsonschema::validator_for(&schema).unwrap();
        schema_violation(validator.iter_errors(&instance), &schema)
    }

    #[test]
    fn required_string_rejects_missing_blank_and_wrong_type() {
        let err = required_string(&args(json!({})), "title").unwrap_err();
        assert_eq!(err.code, VALIDATION_FAILED);
        assert_eq!(err.field.as_deref(), Some("title"));

        assert!(required_string(&args(json!({"title": "  "})), "title").is_err());
        assert!(required_string(&args(json!({"title": 3})), "title").is_err());
        assert_eq!(
            required_string(&args(json!({"title": " ship it "})), "title").unwrap(),
            "ship it"
        );
    }

    #[test]
    fn optional_helpers_treat_null_as_absent() {
        let map = args(json!({"a": null, "n": 5, "tags": [" x ", "", "y"]}));
        assert_eq!(arg_optional_string(&map, "a").unwrap(), None);
        assert_eq!(arg_optional_u64(&map, "n").unwrap(), Some(5));
        assert_eq!(arg_string_array(&map, "tags").unwrap(), vec!["x", "y"]);
        assert!(arg_string_array(&map, "missing").unwrap().is_empty());
        assert!(arg_optional_u64(&args(json!({"n": -1})), "n").is_err());
    }

    #[test]
    fn conforming_arguments_have_no_violation() {
        assert!(violation(json!({"title": "x", "limit": 3, "status": "open"})).is_none());
    }

    #[test]
    fn violations_name_the_offending_field() {
        let missing = violation(json!({"owner": "y"})).unwrap();
        assert_eq!(missing.code, VALIDATION_FAILED);
        assert_eq!(missing.field.as_deref(), Some("title"));

        let wrong_type = violation(json!({"title": "x", "limit": "3"})).unwrap();
        assert_eq!(wrong_type.field.as_deref(), Some("limit"));

        let out_of_range = violation(json!({"title": "x", "limit": 0})).unwrap();
        assert_eq!(out_of_range.field.as_deref(), Some("limit"));

        let extra = violation(json!({"title": "x", "owner": "y"})).unwrap();
        assert_eq!(extra.field.as_deref(), Some("owner"));
        let allowed = extra.details.unwrap()["allowed_fields"].clone();
        assert!(allowed.as_array().unwrap().contains(&json!("title")));

        let bad_enum = violation(json!({"title": "x", "status": "lost"})).unwrap();
        assert_eq!(bad_enum.field.as_deref(), Some("status"));
    }

    #[test]
    fn collaborator_errors_map_to_tool_error_codes() {
        let not_found: ToolError = CollaboratorError::NotFound("task 7".to_string()).into();
        assert_eq!(not_found.code, "not_found");

        let invalid: ToolError = CollaboratorError::Invalid {
            field: Some("status".to_string()),
            message: "bad status".to_string(),
        }
        .into();
        assert_eq!(invalid.code, VALIDATION_FAILED);
        assert_eq!(invalid.field.as_deref(), Some("status"));

        let value = ToolError::from(CollaboratorError::Unavailable("db".to_string())).to_value();
        assert_eq!(value["error"], json!("collaborator_unavailable"));
        assert!(value["docs_hint"].is_string());
    }
}
