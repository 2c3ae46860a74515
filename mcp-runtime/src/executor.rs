//! Tool adapters: decode arguments, call the owning collaborator, and shape
//! the outcome into a tool result.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value, json};
use switchboard_core::identity::Principal;
use uuid::Uuid;

use crate::args::{
    ToolError, arg_optional_string, arg_optional_u64, arg_string_array, required_string,
    required_uuid,
};
use crate::catalog::ToolDefinition;
use crate::collaborators::{Collaborators, DeployRequest, NewTask, TaskFilter, TaskStatus};

/// Normalized outcome of one tool invocation. Always a JSON-RPC success;
/// failure is carried by `is_error`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub envelope: Value,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool: &str, data: Value) -> Self {
        Self {
            tool: tool.to_string(),
            envelope: json!({
                "status": "ok",
                "tool": tool,
                "data": data
            }),
            is_error: false,
        }
    }

    pub fn failure(tool: &str, error: &ToolError) -> Self {
        Self {
            tool: tool.to_string(),
            envelope: json!({
                "status": "error",
                "tool": tool,
                "error": error.to_value()
            }),
            is_error: true,
        }
    }

    /// The `tools/call` result payload. The text block inlines the whole
    /// envelope because most agents only read text content.
    pub fn to_value(&self) -> Value {
        let text = serde_json::to_string_pretty(&self.envelope)
            .unwrap_or_else(|_| self.envelope.to_string());
        json!({
            "content": [{ "type": "text", "text": text }],
            "structuredContent": self.envelope,
            "isError": self.is_error
        })
    }
}

fn to_data<T: Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|err| ToolError::new("internal_error", format!("Failed to encode result: {err}")))
}

/// Schema bounds are enforced before the adapter runs.
fn limit_or(args: &Map<String, Value>, default: u64) -> Result<usize, ToolError> {
    let limit = arg_optional_u64(args, "limit")?.unwrap_or(default);
    Ok(usize::try_from(limit).unwrap_or(usize::MAX))
}

fn parse_status(raw: &str) -> Result<TaskStatus, ToolError> {
    raw.parse::<TaskStatus>().map_err(ToolError::from)
}

#[derive(Clone, Debug)]
pub struct ToolExecutor {
    collaborators: Collaborators,
}

impl ToolExecutor {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Run `tool` for `principal`. Never fails at the protocol level: schema
    /// violations, collaborator errors and adapter panics all come back as
    /// `is_error` results.
    pub async fn execute(
        &self,
        principal: &Principal,
        tool: &ToolDefinition,
        args: &Map<String, Value>,
    ) -> ToolResult {
        if let Err(err) = tool.validate_arguments(args) {
            tracing::debug!(
                event = "tool_arguments_rejected",
                tool = tool.name,
                field = err.field.as_deref().unwrap_or(""),
                "Tool arguments failed validation"
            );
            return ToolResult::failure(tool.name, &err);
        }

        let outcome = AssertUnwindSafe(self.run(principal, tool.name, args))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(data)) => ToolResult::success(tool.name, data),
            Ok(Err(err)) => {
                tracing::info!(
                    event = "tool_failed",
                    tool = tool.name,
                    agent_id = %principal.agent_id,
                    code = %err.code,
                    "Tool call failed"
                );
                ToolResult::failure(tool.name, &err)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                tracing::error!(
                    event = "tool_panicked",
                    tool = tool.name,
                    agent_id = %principal.agent_id,
                    detail = %detail,
                    "Tool adapter panicked"
                );
                ToolResult::failure(
                    tool.name,
                    &ToolError::new("tool_panicked", "The tool failed unexpectedly.")
                        .with_docs_hint("This is a server-side fault; retrying may not help."),
                )
            }
        }
    }

    async fn run(
        &self,
        principal: &Principal,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        match tool_name {
            "onboard" => self.tool_onboard(principal, args).await,
            "task_create" => self.tool_task_create(principal, args).await,
            "task_list" => self.tool_task_list(principal, args).await,
            "task_update" => self.tool_task_update(args).await,
            "message_send" => self.tool_message_send(principal, args).await,
            "message_inbox" => self.tool_message_inbox(principal, args).await,
            "message_broadcast" => self.tool_message_broadcast(principal, args).await,
            "kb_search" => self.tool_kb_search(args).await,
            "kb_write" => self.tool_kb_write(principal, args).await,
            "memory_store" => self.tool_memory_store(principal, args).await,
            "memory_recall" => self.tool_memory_recall(principal, args).await,
            "hire" => self.tool_hire(principal, args).await,
            "deploy" => self.tool_deploy(principal, args).await,
            "metrics_query" => self.tool_metrics_query(args).await,
            _ => Err(ToolError::new(
                "unknown_tool",
                format!("No adapter for tool '{tool_name}'"),
            )),
        }
    }

    async fn tool_onboard(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let role = required_string(args, "role")?;
        let summary = arg_optional_string(args, "summary")?;
        let record = self
            .collaborators
            .onboarding
            .complete(principal.agent_id, role, summary)
            .await?;
        Ok(json!({ "onboarded": true, "record": to_data(record)? }))
    }

    async fn tool_task_create(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let assignee = match arg_optional_string(args, "assignee")? {
            Some(_) => Some(required_uuid(args, "assignee")?),
            None => None,
        };
        let task = self
            .collaborators
            .tasks
            .create(NewTask {
                title: required_string(args, "title")?,
                description: arg_optional_string(args, "description")?,
                assignee,
                created_by: principal.agent_id,
            })
            .await?;
        to_data(task)
    }

    async fn tool_task_list(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let assignee = match arg_optional_string(args, "assignee")?.as_deref() {
            None => None,
            Some("me") => Some(principal.agent_id),
            Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| {
                ToolError::validation("assignee", "'assignee' must be a UUID or 'me'")
            })?),
        };
        let status = arg_optional_string(args, "status")?
            .map(|raw| parse_status(&raw))
            .transpose()?;
        let tasks = self
            .collaborators
            .tasks
            .list(TaskFilter { assignee, status })
            .await?;
        Ok(json!({ "count": tasks.len(), "tasks": to_data(tasks)? }))
    }

    async fn tool_task_update(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let id = required_uuid(args, "task_id")?;
        let status = parse_status(&required_string(args, "status")?)?;
        let note = arg_optional_string(args, "note")?;
        let task = self
            .collaborators
            .tasks
            .update_status(id, status, note)
            .await?;
        to_data(task)
    }

    async fn tool_message_send(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let to = required_uuid(args, "to")?;
        let body = required_string(args, "body")?;
        let message = self
            .collaborators
            .messaging
            .send(principal.agent_id, to, body)
            .await?;
        to_data(message)
    }

    async fn tool_message_inbox(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let limit = limit_or(args, 20)?;
        let messages = self
            .collaborators
            .messaging
            .inbox(principal.agent_id, limit)
            .await?;
        Ok(json!({ "count": messages.len(), "messages": to_data(messages)? }))
    }

    async fn tool_message_broadcast(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let body = required_string(args, "body")?;
        let message = self
            .collaborators
            .messaging
            .broadcast(principal.agent_id, body)
            .await?;
        to_data(message)
    }

    async fn tool_kb_search(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let query = required_string(args, "query")?;
        let limit = limit_or(args, 10)?;
        let articles = self.collaborators.knowledge.search(&query, limit).await?;
        Ok(json!({ "query": query, "count": articles.len(), "articles": to_data(articles)? }))
    }

    async fn tool_kb_write(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let article = self
            .collaborators
            .knowledge
            .write(
                principal.agent_id,
                required_string(args, "title")?,
                required_string(args, "body")?,
                arg_string_array(args, "tags")?,
            )
            .await?;
        to_data(article)
    }

    async fn tool_memory_store(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let key = required_string(args, "key")?;
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| ToolError::validation("value", "Missing required field 'value'"))?;
        let entry = self
            .collaborators
            .memory
            .store(principal.agent_id, key, value)
            .await?;
        to_data(entry)
    }

    async fn tool_memory_recall(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let key = required_string(args, "key")?;
        let entry = self
            .collaborators
            .memory
            .recall(principal.agent_id, &key)
            .await?;
        to_data(entry)
    }

    async fn tool_hire(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let record = self
            .collaborators
            .staffing
            .hire(
                principal.agent_id,
                required_string(args, "name")?,
                required_string(args, "role")?,
            )
            .await?;
        to_data(record)
    }

    async fn tool_deploy(
        &self,
        principal: &Principal,
        args: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let deployment = self
            .collaborators
            .deployments
            .deploy(DeployRequest {
                service: required_string(args, "service")?,
                version: required_string(args, "version")?,
                environment: required_string(args, "environment")?,
                requested_by: principal.agent_id,
            })
            .await?;
        to_data(deployment)
    }

    async fn tool_metrics_query(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        let metric = required_string(args, "metric")?;
        let limit = limit_or(args, 60)?;
        let report = self
            .collaborators
            .observability
            .query(&metric, limit)
            .await?;
        to_data(report)
    }
}
