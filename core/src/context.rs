//! Hierarchical context entities and the merge rules between them.
//!
//! Context payloads are open-shape JSON documents wrapped in
//! [`ContextDocument`]; the wrapper owns the deep-merge rule (maps deep-merge,
//! lists append, scalars replace) used both by `update` and by inheritance
//! resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{OrchestratorError, Result};
use crate::ids::{AgentId, BranchId, ContextId, ContextLevel, Priority, ProjectId};

/// Open-shape JSON document carried by every context level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextDocument(Map<String, Value>);

impl ContextDocument {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Accept a JSON value, rejecting anything that is not an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(OrchestratorError::field_validation(
                "data",
                format!(
                    "context data must be a JSON object, got {}",
                    json_type_name(&other)
                ),
            )),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Merge `incoming` into this document: object values deep-merge,
    /// array values append, anything else replaces.
    pub fn deep_merge(&mut self, incoming: &ContextDocument) {
        for (key, new_value) in &incoming.0 {
            match self.0.get_mut(key) {
                Some(existing) => merge_value(existing, new_value),
                None => {
                    self.0.insert(key.clone(), new_value.clone());
                }
            }
        }
    }

    /// Append a record to a list-valued key, creating the list if absent
    pub fn append_to_list(&mut self, key: &str, record: Value) {
        match self.0.get_mut(key) {
            Some(Value::Array(items)) => items.push(record),
            _ => {
                self.0.insert(key.to_string(), Value::Array(vec![record]));
            }
        }
    }

    /// Stable content hash used for delegation idempotence
    pub fn content_hash(&self) -> String {
        let mut hasher = DefaultHasher::new();
        // serde_json::Map preserves insertion order; hash a sorted projection
        // so logically equal documents collapse to the same hash.
        let mut keys: Vec<_> = self.0.keys().collect();
        keys.sort();
        for key in keys {
            key.hash(&mut hasher);
            self.0[key].to_string().hash(&mut hasher);
        }
        format!("{:016x}", hasher.finish())
    }
}

fn merge_value(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, new_value) in new {
                match old.get_mut(key) {
                    Some(old_value) => merge_value(old_value, new_value),
                    None => {
                        old.insert(key.clone(), new_value.clone());
                    }
                }
            }
        }
        (Value::Array(old), Value::Array(new)) => {
            old.extend(new.iter().cloned());
        }
        (slot, new_value) => {
            *slot = new_value.clone();
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Versioning and inheritance flags shared by all four context levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    /// Monotonic; bumped on every update
    pub version: i64,
    /// When set, resolution does not inherit from ancestors
    pub inheritance_disabled: bool,
    /// When set, resolution returns only this context's data
    pub force_local_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContextState {
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            version: 1,
            inheritance_disabled: false,
            force_local_only: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// Categorisation for captured insights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightCategory {
    Technical,
    Business,
    Process,
    Risk,
}

/// An insight captured against a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub content: String,
    pub category: Option<InsightCategory>,
    pub importance: Option<Priority>,
    pub agent: Option<AgentId>,
    pub timestamp: DateTime<Utc>,
}

/// A progress note captured against a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub content: String,
    pub agent: Option<AgentId>,
    pub timestamp: DateTime<Utc>,
}

/// Process-wide root of the hierarchy; exactly one instance exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalContext {
    pub id: ContextId,
    pub organization_name: String,
    pub global_settings: ContextDocument,
    pub metadata: ContextDocument,
    #[serde(flatten)]
    pub state: ContextState,
}

impl GlobalContext {
    pub fn bootstrap(organization_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: ContextId::global(),
            organization_name: organization_name.into(),
            global_settings: ContextDocument::new(),
            metadata: ContextDocument::new(),
            state: ContextState::initial(now),
        }
    }
}

/// Context attached to a project; id equals the project id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub id: ContextId,
    pub project_name: String,
    pub project_settings: ContextDocument,
    pub metadata: ContextDocument,
    #[serde(flatten)]
    pub state: ContextState,
}

/// Context attached to a branch; id equals the branch id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchContext {
    pub id: ContextId,
    pub project_id: ProjectId,
    pub git_branch_name: String,
    pub branch_settings: ContextDocument,
    pub metadata: ContextDocument,
    #[serde(flatten)]
    pub state: ContextState,
}

/// Context attached to a task; id equals the task id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub id: ContextId,
    pub branch_id: BranchId,
    pub task_data: ContextDocument,
    pub progress: Vec<ProgressRecord>,
    pub insights: Vec<InsightRecord>,
    pub next_steps: Vec<String>,
    pub metadata: ContextDocument,
    #[serde(flatten)]
    pub state: ContextState,
}

/// A context at any of the four levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum Context {
    Global(GlobalContext),
    Project(ProjectContext),
    Branch(BranchContext),
    Task(TaskContext),
}

impl Context {
    pub fn level(&self) -> ContextLevel {
        match self {
            Context::Global(_) => ContextLevel::Global,
            Context::Project(_) => ContextLevel::Project,
            Context::Branch(_) => ContextLevel::Branch,
            Context::Task(_) => ContextLevel::Task,
        }
    }

    pub fn id(&self) -> &ContextId {
        match self {
            Context::Global(c) => &c.id,
            Context::Project(c) => &c.id,
            Context::Branch(c) => &c.id,
            Context::Task(c) => &c.id,
        }
    }

    pub fn state(&self) -> &ContextState {
        match self {
            Context::Global(c) => &c.state,
            Context::Project(c) => &c.state,
            Context::Branch(c) => &c.state,
            Context::Task(c) => &c.state,
        }
    }

    pub fn state_mut(&mut self) -> &mut ContextState {
        match self {
            Context::Global(c) => &mut c.state,
            Context::Project(c) => &mut c.state,
            Context::Branch(c) => &mut c.state,
            Context::Task(c) => &mut c.state,
        }
    }

    pub fn version(&self) -> i64 {
        self.state().version
    }

    /// The level-specific settings payload used in inheritance resolution
    pub fn data(&self) -> &ContextDocument {
        match self {
            Context::Global(c) => &c.global_settings,
            Context::Project(c) => &c.project_settings,
            Context::Branch(c) => &c.branch_settings,
            Context::Task(c) => &c.task_data,
        }
    }

    pub fn data_mut(&mut self) -> &mut ContextDocument {
        match self {
            Context::Global(c) => &mut c.global_settings,
            Context::Project(c) => &mut c.project_settings,
            Context::Branch(c) => &mut c.branch_settings,
            Context::Task(c) => &mut c.task_data,
        }
    }

    /// Id of the parent context this one inherits from, if resolvable from
    /// the entity itself
    pub fn parent_ref(&self) -> Option<(ContextLevel, ContextId)> {
        match self {
            Context::Global(_) => None,
            Context::Project(_) => Some((ContextLevel::Global, ContextId::global())),
            Context::Branch(c) => Some((ContextLevel::Project, ContextId::from(&c.project_id))),
            Context::Task(c) => Some((ContextLevel::Branch, ContextId::from(&c.branch_id))),
        }
    }

    /// Deep-merge an update payload into the data document and bump version
    pub fn apply_update(&mut self, data: &ContextDocument, now: DateTime<Utc>) {
        self.data_mut().deep_merge(data);
        self.state_mut().touch(now);
    }
}

/// How a delegation was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationTrigger {
    Manual,
    AutoPattern,
    AutoThreshold,
}

/// Queued request to propagate context data to an ancestor level.
///
/// Delegations are durable but never applied by the core; a downstream
/// processor consumes the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDelegation {
    pub id: String,
    pub source_level: ContextLevel,
    pub source_id: ContextId,
    pub target_level: ContextLevel,
    pub target_id: ContextId,
    pub delegated_data: ContextDocument,
    pub reason: Option<String>,
    pub trigger_type: DelegationTrigger,
    pub auto_delegated: bool,
    pub confidence_score: Option<f64>,
    pub processed: bool,
    pub approved: Option<bool>,
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Content hash of `delegated_data`; duplicates within a short window
    /// collapse to one record
    pub data_hash: String,
}

impl ContextDelegation {
    pub fn queued(
        source_level: ContextLevel,
        source_id: ContextId,
        target_level: ContextLevel,
        target_id: ContextId,
        delegated_data: ContextDocument,
        reason: Option<String>,
        trigger_type: DelegationTrigger,
        now: DateTime<Utc>,
    ) -> Self {
        let data_hash = delegated_data.content_hash();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_level,
            source_id,
            target_level,
            target_id,
            delegated_data,
            reason,
            auto_delegated: trigger_type != DelegationTrigger::Manual,
            trigger_type,
            confidence_score: None,
            processed: false,
            approved: None,
            processed_by: None,
            created_at: now,
            processed_at: None,
            data_hash,
        }
    }
}

/// Metadata block attached to every resolved context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InheritanceMetadata {
    pub chain: Vec<ContextLevel>,
    pub resolved_at: DateTime<Utc>,
    pub inheritance_depth: usize,
}

/// The merged view of a context and its ancestors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub level: ContextLevel,
    pub id: ContextId,
    pub data: ContextDocument,
    pub inheritance: InheritanceMetadata,
}

impl ResolvedContext {
    /// Merged document with the `_inheritance` metadata key embedded
    pub fn to_value(&self) -> Value {
        let mut doc = self.data.clone();
        doc.insert(
            "_inheritance",
            serde_json::json!({
                "chain": self.inheritance.chain,
                "resolved_at": self.inheritance.resolved_at.to_rfc3339(),
                "inheritance_depth": self.inheritance.inheritance_depth,
            }),
        );
        doc.into_value()
    }
}
