//! Typed identifiers and closed enums shared across the system.
//!
//! All entity ids are opaque UUID strings; [`ContextId`] additionally admits
//! the reserved global-singleton id. Enum string forms are canonical and part
//! of the tool contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

/// Reserved id of the one-and-only global context
pub const GLOBAL_SINGLETON_ID: &str = "global_singleton";

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident, $kind:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Parse a caller-supplied id, rejecting non-UUID input
            pub fn parse(raw: &str) -> Result<Self> {
                Uuid::parse_str(raw.trim())
                    .map(|u| Self(u.to_string()))
                    .map_err(|_| OrchestratorError::field_validation(
                        stringify!($name),
                        format!("{} id must be a UUID, got '{raw}'", $kind),
                    ))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

uuid_id!(
    /// Project identifier
    ProjectId, "project"
);
uuid_id!(
    /// Branch (task tree) identifier
    BranchId, "branch"
);
uuid_id!(
    /// Task identifier
    TaskId, "task"
);
uuid_id!(
    /// Subtask identifier
    SubtaskId, "subtask"
);
uuid_id!(
    /// Agent identifier
    AgentId, "agent"
);

/// Context identifier.
///
/// Project, branch and task contexts share the id of their owning entity;
/// the global context uses the reserved [`GLOBAL_SINGLETON_ID`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn global() -> Self {
        Self(GLOBAL_SINGLETON_ID.to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(OrchestratorError::field_validation(
                "context_id",
                "context id cannot be empty",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_SINGLETON_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ProjectId> for ContextId {
    fn from(id: &ProjectId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl From<&BranchId> for ContextId {
    fn from(id: &BranchId) -> Self {
        Self(id.as_str().to_string())
    }
}

impl From<&TaskId> for ContextId {
    fn from(id: &TaskId) -> Self {
        Self(id.as_str().to_string())
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Review,
    Done,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses eligible for next-task selection
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::InProgress)
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            "blocked" => Ok(TaskStatus::Blocked),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(OrchestratorError::field_validation(
                "status",
                format!(
                    "unknown status '{other}', expected one of: todo, in_progress, review, done, blocked, cancelled"
                ),
            )),
        }
    }
}

/// Task priority with the integer weight used by next-task scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Scoring weight: low=25, medium=50, high=75, critical=100
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Low => 25,
            Priority::Medium => 50,
            Priority::High => 75,
            Priority::Critical => 100,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(OrchestratorError::field_validation(
                "priority",
                format!("unknown priority '{other}', expected one of: low, medium, high, critical"),
            )),
        }
    }
}

/// The four context levels, ordered root-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextLevel {
    Global,
    Project,
    Branch,
    Task,
}

impl ContextLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextLevel::Global => "global",
            ContextLevel::Project => "project",
            ContextLevel::Branch => "branch",
            ContextLevel::Task => "task",
        }
    }

    /// The level this one inherits from, if any
    pub fn parent(&self) -> Option<ContextLevel> {
        match self {
            ContextLevel::Global => None,
            ContextLevel::Project => Some(ContextLevel::Global),
            ContextLevel::Branch => Some(ContextLevel::Project),
            ContextLevel::Task => Some(ContextLevel::Branch),
        }
    }

    /// Distance from the global root (global = 0)
    pub fn depth(&self) -> usize {
        match self {
            ContextLevel::Global => 0,
            ContextLevel::Project => 1,
            ContextLevel::Branch => 2,
            ContextLevel::Task => 3,
        }
    }

    /// Ancestor chain from global down to and including this level
    pub fn chain(&self) -> Vec<ContextLevel> {
        use ContextLevel::*;
        match self {
            Global => vec![Global],
            Project => vec![Global, Project],
            Branch => vec![Global, Project, Branch],
            Task => vec![Global, Project, Branch, Task],
        }
    }
}

impl fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextLevel {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(ContextLevel::Global),
            "project" => Ok(ContextLevel::Project),
            "branch" => Ok(ContextLevel::Branch),
            "task" => Ok(ContextLevel::Task),
            other => Err(OrchestratorError::field_validation(
                "level",
                format!("unknown context level '{other}', expected one of: global, project, branch, task"),
            )),
        }
    }
}

/// Agent capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    Coding,
    Testing,
    Review,
    Documentation,
    Architecture,
    Devops,
    Research,
    Debugging,
}

impl AgentCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCapability::Coding => "coding",
            AgentCapability::Testing => "testing",
            AgentCapability::Review => "review",
            AgentCapability::Documentation => "documentation",
            AgentCapability::Architecture => "architecture",
            AgentCapability::Devops => "devops",
            AgentCapability::Research => "research",
            AgentCapability::Debugging => "debugging",
        }
    }
}

impl fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentCapability {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "coding" => Ok(AgentCapability::Coding),
            "testing" => Ok(AgentCapability::Testing),
            "review" => Ok(AgentCapability::Review),
            "documentation" => Ok(AgentCapability::Documentation),
            "architecture" => Ok(AgentCapability::Architecture),
            "devops" => Ok(AgentCapability::Devops),
            "research" => Ok(AgentCapability::Research),
            "debugging" => Ok(AgentCapability::Debugging),
            other => Err(OrchestratorError::field_validation(
                "capabilities",
                format!("unknown capability '{other}'"),
            )),
        }
    }
}

/// Agent availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAvailability {
    Available,
    Busy,
    Paused,
    Offline,
}

impl AgentAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentAvailability::Available => "available",
            AgentAvailability::Busy => "busy",
            AgentAvailability::Paused => "paused",
            AgentAvailability::Offline => "offline",
        }
    }
}

impl Default for AgentAvailability {
    fn default() -> Self {
        AgentAvailability::Available
    }
}

impl fmt::Display for AgentAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentAvailability {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(AgentAvailability::Available),
            "busy" => Ok(AgentAvailability::Busy),
            "paused" => Ok(AgentAvailability::Paused),
            "offline" => Ok(AgentAvailability::Offline),
            other => Err(OrchestratorError::field_validation(
                "status",
                format!("unknown agent status '{other}'"),
            )),
        }
    }
}
