//! Contracts for the services that own each tool's side effects.
//!
//! The runtime only calls these; it never inspects how they store anything.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use switchboard_core::identity::Presence;
use uuid::Uuid;

use crate::in_memory::InMemoryWorkspace;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{message}")]
    Invalid {
        field: Option<String>,
        message: String,
    },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Open,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CollaboratorError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| {
                CollaboratorError::invalid("status", format!("unknown task status '{raw}'"))
            })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub assignee: Option<Uuid>,
    pub created_by: Uuid,
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<Uuid>,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub assignee: Option<Uuid>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub from: Uuid,
    /// `None` for broadcasts.
    pub to: Option<Uuid>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub author: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub service: String,
    pub version: String,
    pub environment: String,
    pub requested_by: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deployment {
    pub id: Uuid,
    pub service: String,
    pub version: String,
    pub environment: String,
    pub status: String,
    pub requested_by: Uuid,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub metric: String,
    pub unit: String,
    pub samples: Vec<MetricSample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HireRecord {
    pub agent_id: Uuid,
    pub name: String,
    pub role: String,
    pub hired_by: Uuid,
    pub hired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OnboardingRecord {
    pub agent_id: Uuid,
    pub role: String,
    pub summary: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn create(&self, task: NewTask) -> CollaboratorResult<Task>;
    async fn list(&self, filter: TaskFilter) -> CollaboratorResult<Vec<Task>>;
    async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        note: Option<String>,
    ) -> CollaboratorResult<Task>;
}

#[async_trait]
pub trait MessagingService: Send + Sync {
    async fn send(&self, from: Uuid, to: Uuid, body: String) -> CollaboratorResult<Message>;
    /// Newest first, direct messages and broadcasts together.
    async fn inbox(&self, agent: Uuid, limit: usize) -> CollaboratorResult<Vec<Message>>;
    async fn broadcast(&self, from: Uuid, body: String) -> CollaboratorResult<Message>;
}

#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> CollaboratorResult<Vec<Article>>;
    async fn write(
        &self,
        author: Uuid,
        title: String,
        body: String,
        tags: Vec<String>,
    ) -> CollaboratorResult<Article>;
}

#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn store(&self, agent: Uuid, key: String, value: Value)
    -> CollaboratorResult<MemoryEntry>;
    async fn recall(&self, agent: Uuid, key: &str) -> CollaboratorResult<MemoryEntry>;
}

#[async_trait]
pub trait DeploymentService: Send + Sync {
    async fn deploy(&self, request: DeployRequest) -> CollaboratorResult<Deployment>;
}

#[async_trait]
pub trait ObservabilityService: Send + Sync {
    async fn query(&self, metric: &str, limit: usize) -> CollaboratorResult<MetricReport>;
}

#[async_trait]
pub trait StaffingService: Send + Sync {
    async fn hire(
        &self,
        requested_by: Uuid,
        name: String,
        role: String,
    ) -> CollaboratorResult<HireRecord>;
}

#[async_trait]
pub trait OnboardingService: Send + Sync {
    async fn complete(
        &self,
        agent: Uuid,
        role: String,
        summary: Option<String>,
    ) -> CollaboratorResult<OnboardingRecord>;
    async fn is_onboarded(&self, agent: Uuid) -> CollaboratorResult<bool>;
}

#[async_trait]
pub trait PresenceService: Send + Sync {
    /// Set the agent's presence and return the value it replaced.
    async fn set(&self, agent: Uuid, presence: Presence) -> CollaboratorResult<Presence>;
    async fn get(&self, agent: Uuid) -> CollaboratorResult<Presence>;
}

/// Handles to every collaborator the runtime calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub tasks: Arc<dyn TaskService>,
    pub messaging: Arc<dyn MessagingService>,
    pub knowledge: Arc<dyn KnowledgeService>,
    pub memory: Arc<dyn MemoryService>,
    pub deployments: Arc<dyn DeploymentService>,
    pub observability: Arc<dyn ObservabilityService>,
    pub staffing: Arc<dyn StaffingService>,
    pub onboarding: Arc<dyn OnboardingService>,
    pub presence: Arc<dyn PresenceService>,
}

impl Collaborators {
    /// Back every contract with one shared in-memory workspace.
    pub fn from_workspace(workspace: Arc<InMemoryWorkspace>) -> Self {
        Self {
            tasks: workspace.clone(),
            messaging: workspace.clone(),
            knowledge: workspace.clone(),
            memory: workspace.clone(),
            deployments: workspace.clone(),
            observability: workspace.clone(),
            staffing: workspace.clone(),
            onboarding: workspace.clone(),
            presence: workspace,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_workspace(Arc::new(InMemoryWorkspace::new()))
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
