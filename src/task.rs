use crate::err::*;
use crate::packet::{ActionPacket, CorrelationId, PacketType};
use async_trait::async_trait;
use serde_json::Value;
use std::{collections::HashMap, fmt};
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    BlockedOnOperator,
    Failed,
}

impl TaskState {
    /// Whether the task still waits for completion.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::BlockedOnOperator)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TaskState::Pending => "pending",
            TaskState::BlockedOnOperator => "blocked on operator",
            TaskState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// What is needed to re-invoke an action once the work it waits on is done.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Resumption {
    packet: ActionPacket,
}

impl Resumption {
    pub fn packet(&self) -> &ActionPacket {
        &self.packet
    }
}

/// An action that could not complete when its packet was dispatched. The correlation id is that of the
/// originating packet so a later completion can be matched back to the request.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TaskStatus {
    correlation: CorrelationId,
    state: TaskState,
    description: String,
    #[serde(default)]
    payload: Value,
    resume: Resumption,
}

impl TaskStatus {
    pub fn new(packet: &ActionPacket, state: TaskState, description: impl Into<String>) -> Self {
        TaskStatus {
            correlation: packet.correlation().clone(),
            state,
            description: description.into(),
            payload: Value::Null,
            resume: Resumption {
                packet: packet.clone(),
            },
        }
    }

    pub fn pending(packet: &ActionPacket, description: impl Into<String>) -> Self {
        Self::new(packet, TaskState::Pending, description)
    }

    pub fn blocked_on_operator(packet: &ActionPacket, description: impl Into<String>) -> Self {
        Self::new(packet, TaskState::BlockedOnOperator, description)
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn correlation(&self) -> &CorrelationId {
        &self.correlation
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn resume(&self) -> &Resumption {
        &self.resume
    }

    pub fn packet_type(&self) -> &PacketType {
        self.resume.packet.packet_type()
    }

    pub(crate) fn into_packet(self) -> ActionPacket {
        self.resume.packet
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} #{} {}: {}",
            self.packet_type(),
            &self.correlation,
            &self.state,
            &self.description
        )
    }
}

/// Keeps task status records between the dispatch that created them and their resumption. At most one
/// outstanding task may exist per correlation id.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Store a task. Errors with `TaskAlreadyPending` if an outstanding task exists for the same correlation id.
    async fn insert_pending(&self, task: TaskStatus) -> AmieResult<()>;

    async fn get(&self, correlation: &CorrelationId) -> Option<TaskStatus>;

    /// Store a task, overwriting whatever is stored for its correlation id.
    async fn replace(&self, task: TaskStatus);

    /// Remove and return the task for the given correlation id.
    async fn take(&self, correlation: &CorrelationId) -> Option<TaskStatus>;

    /// All outstanding tasks.
    async fn pending(&self) -> Vec<TaskStatus>;

    /// Terminally close the task for the given correlation id.
    async fn close(&self, correlation: &CorrelationId) -> AmieResult<TaskStatus> {
        self.take(correlation)
            .await
            .ok_or_else(|| AmieError::UnknownTask(correlation.clone()))
    }
}

/// A `TaskStore` held in process memory.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<CorrelationId, TaskStatus>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert_pending(&self, task: TaskStatus) -> AmieResult<()> {
        let mut tasks = self.tasks.lock().await;

        if let Some(existing) = tasks.get(task.correlation()) {
            if existing.state().is_outstanding() {
                return Err(AmieError::TaskAlreadyPending(task.correlation().clone()));
            }
        }

        tasks.insert(task.correlation().clone(), task);
        Ok(())
    }

    async fn get(&self, correlation: &CorrelationId) -> Option<TaskStatus> {
        self.tasks.lock().await.get(correlation).cloned()
    }

    async fn replace(&self, task: TaskStatus) {
        self.tasks
            .lock()
            .await
            .insert(task.correlation().clone(), task);
    }

    async fn take(&self, correlation: &CorrelationId) -> Option<TaskStatus> {
        self.tasks.lock().await.remove(correlation)
    }

    async fn pending(&self) -> Vec<TaskStatus> {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|t| t.state().is_outstanding())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBody;
    use std::sync::Arc;

    fn packet(correlation: &str) -> ActionPacket {
        ActionPacket::new(
            PacketType::new("request_user_modify").unwrap(),
            correlation.into(),
            PacketBody::new(),
        )
    }

    #[test]
    fn test_status_is_correlated() {
        let packet = packet("R1");
        let task = TaskStatus::blocked_on_operator(&packet, "needs review")
            .with_payload(serde_json::json!({"queue": "accounts"}));

        assert_eq!(packet.correlation(), task.correlation());
        assert_eq!(TaskState::BlockedOnOperator, task.state());
        assert_eq!(&packet, task.resume().packet());
        assert_eq!("accounts", task.payload()["queue"]);
        assert_eq!(
            "request_user_modify #R1 blocked on operator: needs review",
            task.to_string()
        );
    }

    #[tokio::test]
    async fn test_one_outstanding_task_per_correlation() {
        let store = MemoryTaskStore::new();
        store
            .insert_pending(TaskStatus::pending(&packet("R1"), "first"))
            .await
            .unwrap();

        let err = store
            .insert_pending(TaskStatus::blocked_on_operator(&packet("R1"), "second"))
            .await
            .unwrap_err();
        assert_eq!(AmieError::TaskAlreadyPending("R1".into()), err);

        store
            .insert_pending(TaskStatus::pending(&packet("R2"), "other"))
            .await
            .unwrap();

        assert_eq!(2, store.pending().await.len());
        assert_eq!("first", store.get(&"R1".into()).await.unwrap().description());
    }

    #[tokio::test]
    async fn test_failed_task_can_be_replaced() {
        let store = MemoryTaskStore::new();
        store
            .insert_pending(TaskStatus::new(&packet("R1"), TaskState::Failed, "gave up"))
            .await
            .unwrap();
        assert!(store.pending().await.is_empty());

        store
            .insert_pending(TaskStatus::pending(&packet("R1"), "retry"))
            .await
            .unwrap();
        assert_eq!(1, store.pending().await.len());
    }

    #[tokio::test]
    async fn test_replace_overwrites_outstanding_task() {
        let store = MemoryTaskStore::new();
        store
            .insert_pending(TaskStatus::pending(&packet("R1"), "first"))
            .await
            .unwrap();

        store
            .replace(TaskStatus::blocked_on_operator(&packet("R1"), "second"))
            .await;

        let task = store.get(&"R1".into()).await.unwrap();
        assert_eq!("second", task.description());
        assert_eq!(TaskState::BlockedOnOperator, task.state());
        assert_eq!(1, store.pending().await.len());
    }

    #[tokio::test]
    async fn test_close() {
        let store = MemoryTaskStore::new();
        store
            .insert_pending(TaskStatus::pending(&packet("R1"), "first"))
            .await
            .unwrap();

        let closed = store.close(&"R1".into()).await.unwrap();
        assert_eq!("first", closed.description());
        assert!(store.get(&"R1".into()).await.is_none());

        let err = store.close(&"R1".into()).await.unwrap_err();
        assert_eq!(AmieError::UnknownTask("R1".into()), err);
    }

    #[tokio::test]
    async fn test_concurrent_inserts_admit_one() {
        let store = Arc::new(MemoryTaskStore::new());
        let inserts = (0..16).map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .insert_pending(TaskStatus::pending(&packet("R1"), format!("attempt {}", i)))
                    .await
            })
        });

        let results = futures::future::join_all(inserts).await;
        let admitted = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(1, admitted);
    }
}
