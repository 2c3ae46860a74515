//! Immutable table of invocable tools, built once at startup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use jsonschema::Validator;
use serde_json::{Map, Value, json};
use switchboard_core::identity::Capability;

use crate::args::{ToolError, schema_violation};

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    /// `None` means any authenticated caller may use the tool.
    pub required_permission: Option<Capability>,
    /// Only offered until the caller has completed onboarding.
    pub init_only: bool,
    validator: OnceLock<Result<Arc<Validator>, String>>,
}

impl ToolDefinition {
    pub fn new(name: &'static str, description: &'static str, input_schema: Value) -> Self {
        Self {
            name,
            description,
            input_schema,
            required_permission: None,
            init_only: false,
            validator: OnceLock::new(),
        }
    }

    pub fn requires(mut self, capability: Capability) -> Self {
        self.required_permission = Some(capability);
        self
    }

    pub fn init_only(mut self) -> Self {
        self.init_only = true;
        self
    }

    fn validator(&self) -> Result<&Arc<Validator>, &str> {
        self.validator
            .get_or_init(|| {
                jsonschema::validator_for(&self.input_schema)
                    .map(Arc::new)
                    .map_err(|err| err.to_string())
            })
            .as_ref()
            .map_err(String::as_str)
    }

    /// Check call arguments against `input_schema`. Null-valued entries
    /// count as absent.
    pub fn validate_arguments(&self, args: &Map<String, Value>) -> Result<(), ToolError> {
        let validator = self.validator().map_err(|message| {
            ToolError::new(
                "internal_error",
                format!("Tool '{}' has an unusable input schema: {message}", self.name),
            )
        })?;
        let instance = Value::Object(
            args.iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        );
        match schema_violation(validator.iter_errors(&instance), &self.input_schema) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Shape advertised by `tools/list`.
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate tool name '{0}'")]
    DuplicateTool(&'static str),
    #[error("tool '{tool}' has an invalid input schema: {message}")]
    InvalidSchema { tool: &'static str, message: String },
}

#[derive(Debug)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDefinition>) -> Result<Self, CatalogError> {
        let mut by_name = HashMap::with_capacity(tools.len());
        for (index, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name, index).is_some() {
                return Err(CatalogError::DuplicateTool(tool.name));
            }
            tool.validator()
                .map_err(|message| CatalogError::InvalidSchema {
                    tool: tool.name,
                    message: message.to_string(),
                })?;
        }
        Ok(Self { tools, by_name })
    }

    /// The production tool set. Schemas compile on first use; the
    /// `standard_schemas_compile` test covers them.
    pub fn standard() -> Self {
        let tools = standard_tools();
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(index, tool)| (tool.name, index))
            .collect();
        Self { tools, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name).map(|index| &self.tools[*index])
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn standard_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "onboard",
            "Complete one-time onboarding: declare your role and what you will work on.",
            object_schema(
                json!({
                    "role": { "type": "string", "description": "Role you are taking on, e.g. reviewer" },
                    "summary": { "type": "string", "description": "Short statement of intended focus" }
                }),
                &["role"],
            ),
        )
        .init_only(),
        ToolDefinition::new(
            "task_create",
            "Create a task, optionally assigned to another agent.",
            object_schema(
                json!({
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "assignee": { "type": "string", "description": "Agent UUID" }
                }),
                &["title"],
            ),
        ),
        ToolDefinition::new(
            "task_list",
            "List tasks, filtered by assignee and/or status.",
            object_schema(
                json!({
                    "assignee": { "type": "string", "description": "Agent UUID; 'me' for yourself" },
                    "status": { "type": "string", "enum": ["open", "in_progress", "blocked", "done"] }
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "task_update",
            "Move a task to a new status with an optional note.",
            object_schema(
                json!({
                    "task_id": { "type": "string" },
                    "status": { "type": "string", "enum": ["open", "in_progress", "blocked", "done"] },
                    "note": { "type": "string" }
                }),
                &["task_id", "status"],
            ),
        ),
        ToolDefinition::new(
            "message_send",
            "Send a direct message to another agent.",
            object_schema(
                json!({
                    "to": { "type": "string", "description": "Recipient agent UUID" },
                    "body": { "type": "string" }
                }),
                &["to", "body"],
            ),
        ),
        ToolDefinition::new(
            "message_inbox",
            "Read your most recent direct and broadcast messages.",
            object_schema(
                json!({
                    "limit": { "type": "integer", "minimum": 1, "maximum": 100, "default": 20 }
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "message_broadcast",
            "Send a message to every agent.",
            object_schema(json!({ "body": { "type": "string" } }), &["body"]),
        )
        .requires(Capability::Broadcast),
        ToolDefinition::new(
            "kb_search",
            "Search the shared knowledge base.",
            object_schema(
                json!({
                    "query": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 }
                }),
                &["query"],
            ),
        ),
        ToolDefinition::new(
            "kb_write",
            "Create or replace a knowledge base article by title.",
            object_schema(
                json!({
                    "title": { "type": "string" },
                    "body": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string" } }
                }),
                &["title", "body"],
            ),
        ),
        ToolDefinition::new(
            "memory_store",
            "Store a value in your private memory under a key.",
            object_schema(
                json!({
                    "key": { "type": "string" },
                    "value": { "description": "Any JSON value" }
                }),
                &["key", "value"],
            ),
        ),
        ToolDefinition::new(
            "memory_recall",
            "Recall a value from your private memory.",
            object_schema(json!({ "key": { "type": "string" } }), &["key"]),
        ),
        ToolDefinition::new(
            "hire",
            "Bring a new agent onto the team.",
            object_schema(
                json!({
                    "name": { "type": "string" },
                    "role": { "type": "string" }
                }),
                &["name", "role"],
            ),
        )
        .requires(Capability::Hire),
        ToolDefinition::new(
            "deploy",
            "Request a deployment of a service version to an environment.",
            object_schema(
                json!({
                    "service": { "type": "string" },
                    "version": { "type": "string" },
                    "environment": { "type": "string", "enum": ["development", "staging", "production"] }
                }),
                &["service", "version", "environment"],
            ),
        )
        .requires(Capability::Deploy),
        ToolDefinition::new(
            "metrics_query",
            "Read recent samples of an operational metric.",
            object_schema(
                json!({
                    "metric": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 500, "default": 60 }
                }),
                &["metric"],
            ),
        )
        .requires(Capability::Observe),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn standard_catalog_names_are_unique_and_indexed() {
        let catalog = ToolCatalog::standard();
        let names: HashSet<&str> = catalog.iter().map(|tool| tool.name).collect();
        assert_eq!(names.len(), catalog.len());
        for tool in catalog.iter() {
            assert_eq!(catalog.get(tool.name).map(|t| t.name), Some(tool.name));
        }
    }

    #[test]
    fn gated_and_init_only_tools_are_declared() {
        let catalog = ToolCatalog::standard();
        assert_eq!(
            catalog.get("hire").and_then(|t| t.required_permission),
            Some(Capability::Hire)
        );
        assert_eq!(
            catalog.get("metrics_query").and_then(|t| t.required_permission),
            Some(Capability::Observe)
        );
        assert!(catalog.get("onboard").is_some_and(|t| t.init_only));
        assert!(catalog.get("task_list").is_some_and(|t| t.required_permission.is_none()));
    }

    #[test]
    fn schemas_are_closed_objects() {
        for tool in ToolCatalog::standard().iter() {
            assert_eq!(tool.input_schema["type"], json!("object"), "{}", tool.name);
            assert_eq!(
                tool.input_schema["additionalProperties"],
                json!(false),
                "{}",
                tool.name
            );
        }
    }

    #[test]
    fn standard_schemas_compile() {
        let catalog = ToolCatalog::new(standard_tools()).unwrap();
        assert_eq!(catalog.len(), 14);
    }

    #[test]
    fn invalid_schema_is_rejected_at_build_time() {
        let result = ToolCatalog::new(vec![ToolDefinition::new(
            "broken",
            "a",
            json!({ "type": "object", "properties": { "n": { "type": "whole-number" } } }),
        )]);
        assert!(matches!(
            result.unwrap_err(),
            CatalogError::InvalidSchema { tool: "broken", .. }
        ));
    }

    #[test]
    fn arguments_are_checked_against_bounds_and_items() {
        let catalog = ToolCatalog::standard();
        let kb_search = catalog.get("kb_search").unwrap();
        let args = |value: Value| value.as_object().cloned().unwrap();

        assert!(kb_search.validate_arguments(&args(json!({"query": "x", "limit": 50}))).is_ok());
        let too_many = kb_search
            .validate_arguments(&args(json!({"query": "x", "limit": 9999})))
            .unwrap_err();
        assert_eq!(too_many.field.as_deref(), Some("limit"));

        let kb_write = catalog.get("kb_write").unwrap();
        let bad_tags = kb_write
            .validate_arguments(&args(json!({"title": "t", "body": "b", "tags": ["ok", 3]})))
            .unwrap_err();
        assert_eq!(bad_tags.field.as_deref(), Some("tags"));
    }

    #[test]
    fn null_arguments_count_as_absent() {
        let catalog = ToolCatalog::standard();
        let task_list = catalog.get("task_list").unwrap();
        let args = json!({"status": null}).as_object().cloned().unwrap();
        assert!(task_list.validate_arguments(&args).is_ok());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let schema = object_schema(json!({}), &[]);
        let result = ToolCatalog::new(vec![
            ToolDefinition::new("echo", "a", schema.clone()),
            ToolDefinition::new("echo", "b", schema),
        ]);
        assert_eq!(result.unwrap_err(), CatalogError::DuplicateTool("echo"));
    }

    #[test]
    fn list_shape_uses_camel_case_schema_key() {
        let value = ToolCatalog::standard()
            .get("kb_search")
            .map(ToolDefinition::to_value)
            .unwrap();
        assert!(value.get("inputSchema").is_some());
        assert!(value.get("required_permission").is_none());
    }
}
