//! Domain models.
//!
//! These are storage-agnostic and shared by the REST handlers, the MCP tools
//! and the embedding worker. Ids are monotonic integers assigned by the
//! store; timestamps are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Entity id type.
pub type Id = i64;

/// Sentinel actor id used when the caller is the static admin token or when
/// a deleted user's `created_by` references are rewritten.
pub const SYSTEM_ACTOR: Id = 0;

// =============================================================================
// Project
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub owner_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
    Draft,
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Archived => write!(f, "archived"),
            ProjectStatus::Draft => write!(f, "draft"),
        }
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProjectStatus::Active),
            "archived" => Ok(ProjectStatus::Archived),
            "draft" => Ok(ProjectStatus::Draft),
            _ => Err(format!("unknown project status: {}", s)),
        }
    }
}

/// Input for creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub status: ProjectStatus,
    pub owner_id: Option<Id>,
}

// =============================================================================
// Epic
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Epic {
    pub id: Id,
    pub project_id: Id,
    pub name: String,
    pub description: String,
    pub status: EpicStatus,
    /// Completion percentage in [0, 100].
    pub progress: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EpicStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for EpicStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EpicStatus::Planned => write!(f, "planned"),
            EpicStatus::Active => write!(f, "active"),
            EpicStatus::Completed => write!(f, "completed"),
            EpicStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for EpicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(EpicStatus::Planned),
            "active" => Ok(EpicStatus::Active),
            "completed" => Ok(EpicStatus::Completed),
            "cancelled" => Ok(EpicStatus::Cancelled),
            _ => Err(format!("unknown epic status: {}", s)),
        }
    }
}

// =============================================================================
// Task
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Id,
    pub project_id: Id,
    pub parent_id: Option<Id>,
    pub epic_id: Option<Id>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<Id>,
    pub due_date: Option<DateTime<Utc>>,
    /// Set iff status is `done`.
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Id,
    pub updated_by: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Review => write!(f, "review"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            "cancelled" => Ok(TaskStatus::Cancelled),
            _ => Err(format!("unknown task status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Sort rank: urgent sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub project_id: Id,
    pub parent_id: Option<Id>,
    pub epic_id: Option<Id>,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<Id>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update for a task; `None` fields are left untouched. Two-level
/// options distinguish "leave alone" from "clear".
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Option<Id>>,
    pub epic_id: Option<Option<Id>>,
    pub parent_id: Option<Option<Id>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

/// Filters for task listing.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Id>,
    pub epic_id: Option<Id>,
    pub parent_id: Option<Id>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<Id>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// =============================================================================
// Dependencies
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    #[default]
    FinishToStart,
    StartToStart,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::FinishToStart => write!(f, "finish_to_start"),
            DependencyKind::StartToStart => write!(f, "start_to_start"),
        }
    }
}

impl std::str::FromStr for DependencyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "finish_to_start" => Ok(DependencyKind::FinishToStart),
            "start_to_start" => Ok(DependencyKind::StartToStart),
            _ => Err(format!("unknown dependency kind: {}", s)),
        }
    }
}

/// A directed edge: `task_id` depends on (is blocked by) `depends_on_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TaskDependency {
    pub id: Id,
    pub task_id: Id,
    pub depends_on_id: Id,
    pub kind: DependencyKind,
    pub created_at: DateTime<Utc>,
}

/// All tasks of a project plus the intra-project dependency edges.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectGraph {
    pub nodes: Vec<Task>,
    pub edges: Vec<TaskDependency>,
}

/// Transitive closure around one task: everything upstream of it and
/// everything downstream of it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DependencyChains {
    /// Tasks this one transitively depends on.
    pub blocking: Vec<Task>,
    /// Tasks transitively depending on this one.
    pub blocked: Vec<Task>,
}

// =============================================================================
// Labels, comments, attachments
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Label {
    pub id: Id,
    pub project_id: Id,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    pub id: Id,
    pub task_id: Id,
    pub author_id: Option<Id>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub id: Id,
    pub task_id: Id,
    pub filename: String,
    /// Path relative to the upload directory:
    /// `project_{pid}/task_{tid}/{tid}_{filename}`.
    pub storage_path: String,
    pub size: i64,
    pub mime: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Users and tokens
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    #[default]
    Member,
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Manager => write!(f, "manager"),
            Role::Member => write!(f, "member"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "member" => Ok(Role::Member),
            "viewer" => Ok(Role::Viewer),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API token row. The plaintext never touches the database; `token_hash` is
/// the hex sha256 of the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiToken {
    pub id: Id,
    pub user_id: Id,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    /// Comma-separated scope list, e.g. "read,write". "*" grants everything.
    pub scopes: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ApiToken {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes
            .split(',')
            .map(str::trim)
            .any(|s| s == "*" || s == scope)
    }
}

// =============================================================================
// Activity
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Activity {
    pub id: Id,
    pub project_id: Option<Id>,
    pub task_id: Option<Id>,
    pub actor_id: Id,
    pub action: String,
    pub field: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Embedding
// =============================================================================

/// Discriminator for the polymorphic embedding tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Project,
    Task,
    Document,
}

impl EntityKind {
    /// Name of the per-kind vector table.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Project => "embedding_project",
            EntityKind::Task => "embedding_task",
            EntityKind::Document => "embedding_document",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Project => write!(f, "project"),
            EntityKind::Task => write!(f, "task"),
            EntityKind::Document => write!(f, "document"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(EntityKind::Project),
            "task" => Ok(EntityKind::Task),
            "document" => Ok(EntityKind::Document),
            _ => Err(format!("unknown entity kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmbeddingRecord {
    pub id: Id,
    pub entity_kind: EntityKind,
    pub entity_id: Id,
    pub model: String,
    pub dimension: i64,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Board
// =============================================================================

/// A task plus the dependency counters the board comparator sorts on.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoardEntry {
    #[serde(flatten)]
    pub task: Task,
    /// Immediate predecessors not yet satisfied.
    pub remaining_predecessors: i64,
    /// Tasks directly blocked by this one.
    pub dependent_count: i64,
    /// Immediate predecessors, satisfied or not.
    pub predecessor_count: i64,
}
