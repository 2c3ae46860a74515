//! Non-durable reference collaborators. Everything is lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use switchboard_core::identity::Presence;
use uuid::Uuid;

use crate::collaborators::{
    Article, CollaboratorError, CollaboratorResult, DeployRequest, Deployment, DeploymentService,
    HireRecord, KnowledgeService, MemoryEntry, MemoryService, Message, MessagingService,
    MetricReport, MetricSample, NewTask, ObservabilityService, OnboardingRecord,
    OnboardingService, PresenceService, StaffingService, Task, TaskFilter, TaskService, TaskStatus,
};

const DEPLOY_ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

#[derive(Debug, Default)]
struct WorkspaceState {
    tasks: Vec<Task>,
    messages: Vec<Message>,
    articles: Vec<Article>,
    memory: HashMap<(Uuid, String), MemoryEntry>,
    deployments: Vec<Deployment>,
    metrics: HashMap<String, (String, Vec<MetricSample>)>,
    hires: Vec<HireRecord>,
    onboarding: HashMap<Uuid, OnboardingRecord>,
    presence: HashMap<Uuid, Presence>,
}

#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    state: Mutex<WorkspaceState>,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample for `metric`, creating the series if needed.
    pub fn record_metric(&self, metric: &str, unit: &str, value: f64) -> CollaboratorResult<()> {
        let mut state = self.lock()?;
        let series = state
            .metrics
            .entry(metric.to_string())
            .or_insert_with(|| (unit.to_string(), Vec::new()));
        series.1.push(MetricSample {
            value,
            observed_at: Utc::now(),
        });
        Ok(())
    }

    fn lock(&self) -> CollaboratorResult<MutexGuard<'_, WorkspaceState>> {
        self.state
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("workspace state poisoned".to_string()))
    }
}

fn non_empty(field: &str, value: &str) -> CollaboratorResult<()> {
    if value.trim().is_empty() {
        return Err(CollaboratorError::invalid(
            field,
            format!("'{field}' must not be empty"),
        ));
    }
    Ok(())
}

#[async_trait]
impl TaskService for InMemoryWorkspace {
    async fn create(&self, task: NewTask) -> CollaboratorResult<Task> {
        non_empty("title", &task.title)?;
        let now = Utc::now();
        let created = Task {
            id: Uuid::now_v7(),
            title: task.title,
            description: task.description,
            status: TaskStatus::Open,
            assignee: task.assignee,
            created_by: task.created_by,
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.lock()?.tasks.push(created.clone());
        Ok(created)
    }

    async fn list(&self, filter: TaskFilter) -> CollaboratorResult<Vec<Task>> {
        let state = self.lock()?;
        Ok(state
            .tasks
            .iter()
            .filter(|task| filter.assignee.is_none_or(|a| task.assignee == Some(a)))
            .filter(|task| filter.status.is_none_or(|s| task.status == s))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TaskStatus,
        note: Option<String>,
    ) -> CollaboratorResult<Task> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("task {id}")))?;
        if task.status == TaskStatus::Done && status != TaskStatus::Done {
            return Err(CollaboratorError::Conflict(format!(
                "task {id} is already done"
            )));
        }
        task.status = status;
        if let Some(note) = note {
            task.notes.push(note);
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }
}

#[async_trait]
impl MessagingService for InMemoryWorkspace {
    async fn send(&self, from: Uuid, to: Uuid, body: String) -> CollaboratorResult<Message> {
        non_empty("body", &body)?;
        let message = Message {
            id: Uuid::now_v7(),
            from,
            to: Some(to),
            body,
            sent_at: Utc::now(),
        };
        self.lock()?.messages.push(message.clone());
        Ok(message)
    }

    async fn inbox(&self, agent: Uuid, limit: usize) -> CollaboratorResult<Vec<Message>> {
        let state = self.lock()?;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|message| message.to.is_none_or(|to| to == agent))
            .filter(|message| message.from != agent || message.to == Some(agent))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn broadcast(&self, from: Uuid, body: String) -> CollaboratorResult<Message> {
        non_empty("body", &body)?;
        let message = Message {
            id: Uuid::now_v7(),
            from,
            to: None,
            body,
            sent_at: Utc::now(),
        };
        self.lock()?.messages.push(message.clone());
        Ok(message)
    }
}

#[async_trait]
impl KnowledgeService for InMemoryWorkspace {
    async fn search(&self, query: &str, limit: usize) -> CollaboratorResult<Vec<Article>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Err(CollaboratorError::invalid("query", "'query' must not be empty"));
        }
        let state = self.lock()?;
        Ok(state
            .articles
            .iter()
            .filter(|article| {
                article.title.to_lowercase().contains(&needle)
                    || article.body.to_lowercase().contains(&needle)
                    || article.tags.iter().any(|tag| tag.to_lowercase() == needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn write(
        &self,
        author: Uuid,
        title: String,
        body: String,
        tags: Vec<String>,
    ) -> CollaboratorResult<Article> {
        non_empty("title", &title)?;
        let mut state = self.lock()?;
        let now = Utc::now();
        if let Some(existing) = state
            .articles
            .iter_mut()
            .find(|article| article.title.eq_ignore_ascii_case(&title))
        {
            existing.body = body;
            existing.tags = tags;
            existing.author = author;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let article = Article {
            id: Uuid::now_v7(),
            title,
            body,
            tags,
            author,
            updated_at: now,
        };
        state.articles.push(article.clone());
        Ok(article)
    }
}

#[async_trait]
impl MemoryService for InMemoryWorkspace {
    async fn store(
        &self,
        agent: Uuid,
        key: String,
        value: Value,
    ) -> CollaboratorResult<MemoryEntry> {
        non_empty("key", &key)?;
        let entry = MemoryEntry {
            key: key.clone(),
            value,
            stored_at: Utc::now(),
        };
        self.lock()?.memory.insert((agent, key), entry.clone());
        Ok(entry)
    }

    async fn recall(&self, agent: Uuid, key: &str) -> CollaboratorResult<MemoryEntry> {
        self.lock()?
            .memory
            .get(&(agent, key.to_string()))
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(format!("memory '{key}'")))
    }
}

#[async_trait]
impl DeploymentService for InMemoryWorkspace {
    async fn deploy(&self, request: DeployRequest) -> CollaboratorResult<Deployment> {
        non_empty("service", &request.service)?;
        non_empty("version", &request.version)?;
        if !DEPLOY_ENVIRONMENTS.contains(&request.environment.as_str()) {
            return Err(CollaboratorError::invalid(
                "environment",
                format!(
                    "environment must be one of {}",
                    DEPLOY_ENVIRONMENTS.join(", ")
                ),
            ));
        }
        let mut state = self.lock()?;
        if state.deployments.iter().any(|deployment| {
            deployment.service == request.service
                && deployment.version == request.version
                && deployment.environment == request.environment
        }) {
            return Err(CollaboratorError::Conflict(format!(
                "{} {} is already deployed to {}",
                request.service, request.version, request.environment
            )));
        }
        let deployment = Deployment {
            id: Uuid::now_v7(),
            service: request.service,
            version: request.version,
            environment: request.environment,
            status: "queued".to_string(),
            requested_by: request.requested_by,
            requested_at: Utc::now(),
        };
        state.deployments.push(deployment.clone());
        Ok(deployment)
    }
}

#[async_trait]
impl ObservabilityService for InMemoryWorkspace {
    async fn query(&self, metric: &str, limit: usize) -> CollaboratorResult<MetricReport> {
        let state = self.lock()?;
        let (unit, samples) = state
            .metrics
            .get(metric)
            .ok_or_else(|| CollaboratorError::NotFound(format!("metric '{metric}'")))?;
        let skip = samples.len().saturating_sub(limit);
        Ok(MetricReport {
            metric: metric.to_string(),
            unit: unit.clone(),
            samples: samples[skip..].to_vec(),
        })
    }
}

#[async_trait]
impl StaffingService for InMemoryWorkspace {
    async fn hire(
        &self,
        requested_by: Uuid,
        name: String,
        role: String,
    ) -> CollaboratorResult<HireRecord> {
        non_empty("name", &name)?;
        non_empty("role", &role)?;
        let mut state = self.lock()?;
        if state
            .hires
            .iter()
            .any(|hire| hire.name.eq_ignore_ascii_case(&name))
        {
            return Err(CollaboratorError::Conflict(format!(
                "an agent named '{name}' already exists"
            )));
        }
        let record = HireRecord {
            agent_id: Uuid::now_v7(),
            name,
            role,
            hired_by: requested_by,
            hired_at: Utc::now(),
        };
        state.hires.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl OnboardingService for InMemoryWorkspace {
    async fn complete(
        &self,
        agent: Uuid,
        role: String,
        summary: Option<String>,
    ) -> CollaboratorResult<OnboardingRecord> {
        non_empty("role", &role)?;
        let mut state = self.lock()?;
        if state.onboarding.contains_key(&agent) {
            return Err(CollaboratorError::Conflict(format!(
                "agent {agent} is already onboarded"
            )));
        }
        let record = OnboardingRecord {
            agent_id: agent,
            role,
            summary,
            completed_at: Utc::now(),
        };
        state.onboarding.insert(agent, record.clone());
        Ok(record)
    }

    async fn is_onboarded(&self, agent: Uuid) -> CollaboratorResult<bool> {
        Ok(self.lock()?.onboarding.contains_key(&agent))
    }
}

#[async_trait]
impl PresenceService for InMemoryWorkspace {
    async fn set(&self, agent: Uuid, presence: Presence) -> CollaboratorResult<Presence> {
        Ok(self
            .lock()?
            .presence
            .insert(agent, presence)
            .unwrap_or_default())
    }

    async fn get(&self, agent: Uuid) -> CollaboratorResult<Presence> {
        Ok(self
            .lock()?
            .presence
            .get(&agent)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn task_lifecycle() {
        let workspace = InMemoryWorkspace::new();
        let owner = Uuid::now_v7();
        let task = TaskService::create(
            &workspace,
            NewTask {
                title: "Write runbook".to_string(),
                description: None,
                assignee: Some(owner),
                created_by: owner,
            },
        )
        .await
        .unwrap();
        assert_eq!(task.status, TaskStatus::Open);

        let updated = workspace
            .update_status(task.id, TaskStatus::Done, Some("shipped".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.notes, vec!["shipped"]);

        let reopened = workspace
            .update_status(task.id, TaskStatus::Open, None)
            .await;
        assert!(matches!(reopened, Err(CollaboratorError::Conflict(_))));

        let done = workspace
            .list(TaskFilter {
                assignee: Some(owner),
                status: Some(TaskStatus::Done),
            })
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let workspace = InMemoryWorkspace::new();
        let result = workspace
            .update_status(Uuid::now_v7(), TaskStatus::Blocked, None)
            .await;
        assert!(matches!(result, Err(CollaboratorError::NotFound(_))));
    }

    #[tokio::test]
    async fn inbox_includes_direct_messages_and_broadcasts_newest_first() {
        let workspace = InMemoryWorkspace::new();
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        workspace.send(alice, bob, "hi bob".to_string()).await.unwrap();
        workspace.broadcast(alice, "all hands".to_string()).await.unwrap();
        workspace.send(bob, alice, "hi alice".to_string()).await.unwrap();

        let inbox = workspace.inbox(bob, 10).await.unwrap();
        let bodies: Vec<&str> = inbox.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["all hands", "hi bob"]);
    }

    #[tokio::test]
    async fn knowledge_write_upserts_by_title() {
        let workspace = InMemoryWorkspace::new();
        let author = Uuid::now_v7();
        workspace
            .write(author, "Deploys".to_string(), "v1".to_string(), vec![])
            .await
            .unwrap();
        workspace
            .write(author, "deploys".to_string(), "v2".to_string(), vec!["ops".to_string()])
            .await
            .unwrap();

        let hits = workspace.search("ops", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].body, "v2");
    }

    #[tokio::test]
    async fn memory_is_scoped_per_agent() {
        let workspace = InMemoryWorkspace::new();
        let agent = Uuid::now_v7();
        workspace
            .store(agent, "focus".to_string(), json!({"area": "billing"}))
            .await
            .unwrap();
        assert_eq!(
            workspace.recall(agent, "focus").await.unwrap().value,
            json!({"area": "billing"})
        );
        assert!(workspace.recall(Uuid::now_v7(), "focus").await.is_err());
    }

    #[tokio::test]
    async fn duplicate_deploy_conflicts() {
        let workspace = InMemoryWorkspace::new();
        let request = DeployRequest {
            service: "billing".to_string(),
            version: "1.2.0".to_string(),
            environment: "staging".to_string(),
            requested_by: Uuid::now_v7(),
        };
        workspace.deploy(request.clone()).await.unwrap();
        assert!(matches!(
            workspace.deploy(request).await,
            Err(CollaboratorError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn metric_query_returns_latest_samples() {
        let workspace = InMemoryWorkspace::new();
        for value in [1.0, 2.0, 3.0] {
            workspace.record_metric("latency_p99", "ms", value).unwrap();
        }
        let report = workspace.query("latency_p99", 2).await.unwrap();
        let values: Vec<f64> = report.samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 3.0]);
        assert!(workspace.query("missing", 2).await.is_err());
    }

    #[tokio::test]
    async fn onboarding_completes_once() {
        let workspace = InMemoryWorkspace::new();
        let agent = Uuid::now_v7();
        assert!(!workspace.is_onboarded(agent).await.unwrap());
        workspace
            .complete(agent, "reviewer".to_string(), None)
            .await
            .unwrap();
        assert!(workspace.is_onboarded(agent).await.unwrap());
        assert!(workspace.complete(agent, "reviewer".to_string(), None).await.is_err());
    }

    #[tokio::test]
    async fn presence_set_returns_previous_value() {
        let workspace = InMemoryWorkspace::new();
        let agent = Uuid::now_v7();
        assert_eq!(workspace.set(agent, Presence::Online).await.unwrap(), Presence::Offline);
        assert_eq!(workspace.set(agent, Presence::Away).await.unwrap(), Presence::Online);
        assert_eq!(workspace.get(agent).await.unwrap(), Presence::Away);
    }
}
