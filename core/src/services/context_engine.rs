//! Hierarchical context engine.
//!
//! Owns the four-level context lifecycle: creation with hierarchy
//! validation and parent auto-creation, deep-merge updates, cascading
//! deletes, inheritance resolution with the ephemeral cache, the delegation
//! queue, and insight/progress capture.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::{
    BranchContext, Context, ContextDelegation, ContextDocument, ContextState, DelegationTrigger,
    GlobalContext, InheritanceMetadata, InsightCategory, InsightRecord, ProgressRecord,
    ProjectContext, ResolvedContext, TaskContext,
};
use crate::error::{OrchestratorError, Result};
use crate::ids::{AgentId, BranchId, ContextId, ContextLevel, Priority, ProjectId};
use crate::repository::{
    BranchRepository, ContextRepository, DelegationRepository, ProjectRepository,
};
use crate::services::inheritance_cache::{dependencies_hash, InheritanceCache};

/// Engine-level behaviour switches, wired from the feature-flag config
#[derive(Debug, Clone)]
pub struct ContextEngineOptions {
    /// Silently create missing ancestors during `create`
    pub auto_create_parents: bool,
    /// Organization name used when bootstrapping the global singleton
    pub organization_name: String,
}

impl Default for ContextEngineOptions {
    fn default() -> Self {
        Self {
            auto_create_parents: true,
            organization_name: "default_organization".to_string(),
        }
    }
}

/// Identifiers available to `create` for hierarchy validation and
/// parent auto-creation
#[derive(Debug, Clone, Default)]
pub struct CreateContextScope {
    pub user_id: Option<String>,
    pub project_id: Option<ProjectId>,
    pub branch_id: Option<BranchId>,
    pub project_name: Option<String>,
    pub git_branch_name: Option<String>,
}

/// Flag updates applied alongside a data update
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagsUpdate {
    pub inheritance_disabled: Option<bool>,
    pub force_local_only: Option<bool>,
}

/// Listing filters; keys are level-specific
#[derive(Debug, Clone, Default)]
pub struct ContextListFilter {
    pub project_id: Option<ProjectId>,
    pub branch_id: Option<BranchId>,
}

/// Result of a `get`: either the raw entity or the merged ancestor view
#[derive(Debug, Clone)]
pub enum ContextView {
    Entity(Context),
    Resolved {
        resolved: ResolvedContext,
        from_cache: bool,
    },
}

fn kind_name(level: ContextLevel) -> &'static str {
    match level {
        ContextLevel::Global => "GlobalContext",
        ContextLevel::Project => "ProjectContext",
        ContextLevel::Branch => "BranchContext",
        ContextLevel::Task => "TaskContext",
    }
}

/// The hierarchical context engine
pub struct ContextEngine {
    contexts: Arc<dyn ContextRepository>,
    delegations: Arc<dyn DelegationRepository>,
    projects: Arc<dyn ProjectRepository>,
    branches: Arc<dyn BranchRepository>,
    cache: InheritanceCache,
    options: ContextEngineOptions,
}

impl ContextEngine {
    pub fn new(
        contexts: Arc<dyn ContextRepository>,
        delegations: Arc<dyn DelegationRepository>,
        projects: Arc<dyn ProjectRepository>,
        branches: Arc<dyn BranchRepository>,
        cache: InheritanceCache,
        options: ContextEngineOptions,
    ) -> Self {
        Self {
            contexts,
            delegations,
            projects,
            branches,
            cache,
            options,
        }
    }

    /// Bootstrap guarantee: the global singleton exists after this call
    pub async fn ensure_global(&self) -> Result<Context> {
        if let Some(existing) = self
            .contexts
            .get(ContextLevel::Global, &ContextId::global())
            .await?
        {
            return Ok(existing);
        }
        let global = Context::Global(GlobalContext::bootstrap(
            self.options.organization_name.clone(),
            Utc::now(),
        ));
        info!("bootstrapping global context singleton");
        self.contexts.create(global).await
    }

    /// Create a context at `level`, validating the ancestor chain and
    /// auto-creating missing parents where identifiers allow it
    pub async fn create(
        &self,
        level: ContextLevel,
        id: ContextId,
        data: ContextDocument,
        scope: &CreateContextScope,
    ) -> Result<Context> {
        if self.contexts.exists(level, &id).await? {
            return Err(OrchestratorError::already_exists(
                kind_name(level),
                id.as_str(),
            ));
        }

        if level == ContextLevel::Global && !id.is_global() {
            return Err(OrchestratorError::field_validation(
                "context_id",
                format!(
                    "the global context is a singleton with id '{}'",
                    ContextId::global()
                ),
            ));
        }

        let lineage = self.discover_lineage(level, &id, scope).await?;
        self.ensure_ancestors(level, &id, &lineage).await?;

        let now = Utc::now();
        let context = match level {
            ContextLevel::Global => Context::Global(GlobalContext {
                id,
                organization_name: self.options.organization_name.clone(),
                global_settings: data,
                metadata: ContextDocument::new(),
                state: ContextState::initial(now),
            }),
            ContextLevel::Project => {
                let project_name = match scope.project_name.clone() {
                    Some(name) => name,
                    None => self.project_display_name(&id).await,
                };
                Context::Project(ProjectContext {
                    id,
                    project_name,
                    project_settings: data,
                    metadata: ContextDocument::new(),
                    state: ContextState::initial(now),
                })
            }
            ContextLevel::Branch => {
                let project_id = lineage.project_id.clone().ok_or_else(|| {
                    self.violation_missing_project(level, &id)
                })?;
                let git_branch_name = match scope.git_branch_name.clone() {
                    Some(name) => name,
                    None => self.branch_display_name(&id).await,
                };
                Context::Branch(BranchContext {
                    id,
                    project_id,
                    git_branch_name,
                    branch_settings: data,
                    metadata: ContextDocument::new(),
                    state: ContextState::initial(now),
                })
            }
            ContextLevel::Task => {
                let branch_id = lineage.branch_id.clone().ok_or_else(|| {
                    self.violation_missing_branch(&id)
                })?;
                Context::Task(TaskContext {
                    id,
                    branch_id,
                    task_data: data,
                    progress: Vec::new(),
                    insights: Vec::new(),
                    next_steps: Vec::new(),
                    metadata: ContextDocument::new(),
                    state: ContextState::initial(now),
                })
            }
        };

        self.contexts.create(context).await
    }

    /// Fetch a context, optionally resolved against its ancestors
    pub async fn get(
        &self,
        level: ContextLevel,
        id: &ContextId,
        include_inherited: bool,
        force_refresh: bool,
    ) -> Result<ContextView> {
        if !include_inherited {
            let context = self
                .contexts
                .get(level, id)
                .await?
                .ok_or_else(|| OrchestratorError::not_found(kind_name(level), id.as_str()))?;
            return Ok(ContextView::Entity(context));
        }
        let (resolved, from_cache) = self.resolve_with_cache(level, id, force_refresh).await?;
        Ok(ContextView::Resolved {
            resolved,
            from_cache,
        })
    }

    /// Merged ancestor view of a context
    pub async fn resolve(
        &self,
        level: ContextLevel,
        id: &ContextId,
        force_refresh: bool,
    ) -> Result<ResolvedContext> {
        let (resolved, _) = self.resolve_with_cache(level, id, force_refresh).await?;
        Ok(resolved)
    }

    /// Deep-merge `data` into an existing context and bump its version.
    /// With `propagate`, every cache entry depending on this node is
    /// invalidated.
    pub async fn update(
        &self,
        level: ContextLevel,
        id: &ContextId,
        data: ContextDocument,
        flags: FlagsUpdate,
        propagate: bool,
    ) -> Result<Context> {
        let mut context = self
            .contexts
            .get(level, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(kind_name(level), id.as_str()))?;

        let now = Utc::now();
        context.apply_update(&data, now);
        if let Some(disabled) = flags.inheritance_disabled {
            context.state_mut().inheritance_disabled = disabled;
        }
        if let Some(local_only) = flags.force_local_only {
            context.state_mut().force_local_only = local_only;
        }

        let updated = self.contexts.update(context).await?;
        if propagate {
            let invalidated = self.cache.invalidate_containing(level, id);
            debug!(
                level = %level,
                id = %id,
                invalidated,
                "propagated context update to inheritance cache"
            );
        }
        Ok(updated)
    }

    /// Delete a context and every descendant context, per ownership chain.
    /// Returns the number of contexts removed.
    pub async fn delete(&self, level: ContextLevel, id: &ContextId) -> Result<u32> {
        if !self.contexts.exists(level, id).await? {
            return Err(OrchestratorError::not_found(kind_name(level), id.as_str()));
        }

        let mut victims: Vec<(ContextLevel, ContextId)> = Vec::new();
        match level {
            ContextLevel::Global => {
                for l in [ContextLevel::Task, ContextLevel::Branch, ContextLevel::Project] {
                    for ctx in self.contexts.list(l).await? {
                        victims.push((l, ctx.id().clone()));
                    }
                }
            }
            ContextLevel::Project => {
                for ctx in self.contexts.list(ContextLevel::Branch).await? {
                    if let Context::Branch(branch) = &ctx {
                        if branch.project_id.as_str() == id.as_str() {
                            victims.extend(
                                self.task_context_ids_of_branch(&branch.id).await?,
                            );
                            victims.push((ContextLevel::Branch, ctx.id().clone()));
                        }
                    }
                }
            }
            ContextLevel::Branch => {
                let branch_id = BranchId::parse(id.as_str())?;
                victims.extend(self.task_context_ids_of_branch(&ContextId::from(&branch_id)).await?);
            }
            ContextLevel::Task => {}
        }
        victims.push((level, id.clone()));

        let mut deleted = 0;
        for (victim_level, victim_id) in victims {
            if self.contexts.delete(victim_level, &victim_id).await? {
                deleted += 1;
            }
            self.cache.invalidate_containing(victim_level, &victim_id);
        }
        Ok(deleted)
    }

    async fn task_context_ids_of_branch(
        &self,
        branch_ctx_id: &ContextId,
    ) -> Result<Vec<(ContextLevel, ContextId)>> {
        let mut out = Vec::new();
        for ctx in self.contexts.list(ContextLevel::Task).await? {
            if let Context::Task(task_ctx) = &ctx {
                if task_ctx.branch_id.as_str() == branch_ctx_id.as_str() {
                    out.push((ContextLevel::Task, ctx.id().clone()));
                }
            }
        }
        Ok(out)
    }

    /// Queue a delegation of `data` from `(level, id)` to `target_level`.
    /// The target context is not mutated; a downstream processor applies
    /// approved records.
    pub async fn delegate(
        &self,
        level: ContextLevel,
        id: &ContextId,
        target_level: ContextLevel,
        data: ContextDocument,
        reason: Option<String>,
        trigger: DelegationTrigger,
    ) -> Result<ContextDelegation> {
        if target_level.depth() >= level.depth() {
            return Err(OrchestratorError::field_validation(
                "delegate_to",
                format!(
                    "delegation target must be strictly higher than the source: {} does not outrank {}",
                    target_level, level
                ),
            ));
        }
        if data.is_empty() {
            return Err(OrchestratorError::MissingField("delegate_data".to_string()));
        }

        let path = self.load_ancestor_path(level, id).await?;
        let target_id = match target_level {
            ContextLevel::Global => ContextId::global(),
            _ => path
                .iter()
                .find(|ctx| ctx.level() == target_level)
                .map(|ctx| ctx.id().clone())
                .ok_or_else(|| {
                    OrchestratorError::AutoDetectionFailed(format!(
                        "cannot determine the {} ancestor of {} '{}'",
                        target_level,
                        level,
                        id
                    ))
                })?,
        };

        let delegation = ContextDelegation::queued(
            level,
            id.clone(),
            target_level,
            target_id,
            data,
            reason,
            trigger,
            Utc::now(),
        );
        self.delegations.enqueue(delegation).await
    }

    /// Unprocessed delegations, oldest first
    pub async fn pending_delegations(
        &self,
        target_level: Option<ContextLevel>,
    ) -> Result<Vec<ContextDelegation>> {
        self.delegations.list_pending(target_level).await
    }

    /// Append an insight record to a context
    pub async fn add_insight(
        &self,
        level: ContextLevel,
        id: &ContextId,
        content: String,
        category: Option<InsightCategory>,
        importance: Option<Priority>,
        agent: Option<AgentId>,
    ) -> Result<Context> {
        if content.trim().is_empty() {
            return Err(OrchestratorError::MissingField("content".to_string()));
        }
        let mut context = self
            .contexts
            .get(level, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(kind_name(level), id.as_str()))?;

        let now = Utc::now();
        let record = InsightRecord {
            content,
            category,
            importance,
            agent,
            timestamp: now,
        };
        match &mut context {
            Context::Task(task_ctx) => task_ctx.insights.push(record),
            other => {
                let value = serde_json::to_value(&record)
                    .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
                other.data_mut().append_to_list("insights", value);
            }
        }
        context.state_mut().touch(now);
        self.contexts.update(context).await
    }

    /// Append a progress record to a context
    pub async fn add_progress(
        &self,
        level: ContextLevel,
        id: &ContextId,
        content: String,
        agent: Option<AgentId>,
    ) -> Result<Context> {
        if content.trim().is_empty() {
            return Err(OrchestratorError::MissingField("content".to_string()));
        }
        let mut context = self
            .contexts
            .get(level, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(kind_name(level), id.as_str()))?;

        let now = Utc::now();
        let record = ProgressRecord {
            content,
            agent,
            timestamp: now,
        };
        match &mut context {
            Context::Task(task_ctx) => task_ctx.progress.push(record),
            other => {
                let value = serde_json::to_value(&record)
                    .map_err(|e| OrchestratorError::Internal(e.to_string()))?;
                other.data_mut().append_to_list("progress", value);
            }
        }
        context.state_mut().touch(now);
        self.contexts.update(context).await
    }

    /// List contexts at a level, filtered by level-specific keys
    pub async fn list(
        &self,
        level: ContextLevel,
        filter: &ContextListFilter,
    ) -> Result<Vec<Context>> {
        let contexts = self.contexts.list(level).await?;
        Ok(contexts
            .into_iter()
            .filter(|ctx| match ctx {
                Context::Branch(branch) => filter
                    .project_id
                    .as_ref()
                    .map_or(true, |p| &branch.project_id == p),
                Context::Task(task) => filter
                    .branch_id
                    .as_ref()
                    .map_or(true, |b| &task.branch_id == b),
                _ => true,
            })
            .collect())
    }

    /// Drop the ephemeral cache; part of engine teardown
    pub fn teardown(&self) {
        self.cache.clear();
    }

    // ----- resolution internals -----

    async fn resolve_with_cache(
        &self,
        level: ContextLevel,
        id: &ContextId,
        force_refresh: bool,
    ) -> Result<(ResolvedContext, bool)> {
        let path = self.load_ancestor_path(level, id).await?;
        let hash_input: Vec<(ContextLevel, ContextId, i64)> = path
            .iter()
            .map(|ctx| (ctx.level(), ctx.id().clone(), ctx.version()))
            .collect();
        let deps_hash = dependencies_hash(&hash_input);
        let now = Utc::now();

        if !force_refresh {
            if let Some(hit) = self.cache.lookup(level, id, &deps_hash, now) {
                debug!(level = %level, id = %id, "inheritance cache hit");
                return Ok((hit, true));
            }
        }

        let resolved = resolve_chain(level, id, &path, now);
        let resolution_path = path
            .iter()
            .map(|ctx| (ctx.level(), ctx.id().clone()))
            .collect();
        self.cache
            .store(level, id, resolved.clone(), deps_hash, resolution_path, now);
        Ok((resolved, false))
    }

    /// Existing ancestor contexts, global-first, ending at the requested
    /// context (which must exist). Missing intermediates are skipped.
    async fn load_ancestor_path(
        &self,
        level: ContextLevel,
        id: &ContextId,
    ) -> Result<Vec<Context>> {
        let target = self
            .contexts
            .get(level, id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found(kind_name(level), id.as_str()))?;

        let mut path = vec![target];
        let mut next = path[0].parent_ref();
        while let Some((parent_level, parent_id)) = next {
            match self.contexts.get(parent_level, &parent_id).await? {
                Some(parent) => {
                    next = parent.parent_ref();
                    path.push(parent);
                }
                None => {
                    // An absent intermediate cannot tell us its own parent's
                    // id; the global root is the only level addressable
                    // without it.
                    next = if parent_level == ContextLevel::Global {
                        None
                    } else {
                        Some((ContextLevel::Global, ContextId::global()))
                    };
                }
            }
        }
        path.reverse();
        Ok(path)
    }

    // ----- hierarchy validation internals -----

    async fn discover_lineage(
        &self,
        level: ContextLevel,
        id: &ContextId,
        scope: &CreateContextScope,
    ) -> Result<Lineage> {
        let mut lineage = Lineage {
            project_id: scope.project_id.clone(),
            branch_id: scope.branch_id.clone(),
        };

        match level {
            ContextLevel::Global | ContextLevel::Project => {}
            ContextLevel::Branch => {
                if lineage.project_id.is_none() {
                    // The branch entity may already exist and carry its
                    // project id.
                    if let Ok(branch_id) = BranchId::parse(id.as_str()) {
                        if let Some(branch) = self.branches.get(&branch_id).await? {
                            lineage.project_id = Some(branch.project_id);
                        }
                    }
                }
            }
            ContextLevel::Task => {
                if let Some(branch_id) = &lineage.branch_id {
                    if lineage.project_id.is_none() {
                        if let Some(branch) = self.branches.get(branch_id).await? {
                            lineage.project_id = Some(branch.project_id);
                        }
                    }
                }
            }
        }
        Ok(lineage)
    }

    /// Validate the ancestor chain, auto-creating missing ancestors where
    /// allowed; otherwise fail with `HIERARCHY_VIOLATION` listing the exact
    /// remediating calls.
    async fn ensure_ancestors(
        &self,
        level: ContextLevel,
        id: &ContextId,
        lineage: &Lineage,
    ) -> Result<()> {
        if level == ContextLevel::Global {
            return Ok(());
        }

        let mut missing_steps: Vec<String> = Vec::new();

        // Global is always creatable.
        if !self
            .contexts
            .exists(ContextLevel::Global, &ContextId::global())
            .await?
        {
            if self.options.auto_create_parents {
                self.ensure_global().await?;
            } else {
                missing_steps.push(
                    "manage_context(action=\"create\", level=\"global\", context_id=\"global_singleton\")"
                        .to_string(),
                );
            }
        }

        if level >= ContextLevel::Branch {
            match &lineage.project_id {
                Some(project_id) => {
                    let project_ctx_id = ContextId::from(project_id);
                    if !self
                        .contexts
                        .exists(ContextLevel::Project, &project_ctx_id)
                        .await?
                    {
                        if self.options.auto_create_parents {
                            self.auto_create_project_context(project_id).await?;
                        } else {
                            missing_steps.push(format!(
                                "manage_context(action=\"create\", level=\"project\", context_id=\"{project_id}\")"
                            ));
                        }
                    }
                }
                None => {
                    return Err(self.violation_missing_project(level, id));
                }
            }
        }

        if level == ContextLevel::Task {
            match &lineage.branch_id {
                Some(branch_id) => {
                    let branch_ctx_id = ContextId::from(branch_id);
                    if !self
                        .contexts
                        .exists(ContextLevel::Branch, &branch_ctx_id)
                        .await?
                    {
                        if self.options.auto_create_parents {
                            let project_id = lineage.project_id.clone().ok_or_else(|| {
                                self.violation_missing_project(level, id)
                            })?;
                            self.auto_create_branch_context(branch_id, &project_id).await?;
                        } else {
                            missing_steps.push(format!(
                                "manage_context(action=\"create\", level=\"branch\", context_id=\"{branch_id}\")"
                            ));
                        }
                    }
                }
                None => {
                    return Err(self.violation_missing_branch(id));
                }
            }
        }

        if missing_steps.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::hierarchy_violation(
                level,
                id.as_str(),
                "required ancestor contexts are missing and auto-creation is disabled",
                missing_steps,
            ))
        }
    }

    async fn auto_create_project_context(&self, project_id: &ProjectId) -> Result<()> {
        let now = Utc::now();
        let mut metadata = ContextDocument::new();
        metadata.insert("auto_created", serde_json::json!(true));
        let context = Context::Project(ProjectContext {
            id: ContextId::from(project_id),
            project_name: self.project_display_name(&ContextId::from(project_id)).await,
            project_settings: ContextDocument::new(),
            metadata,
            state: ContextState::initial(now),
        });
        match self.contexts.create(context).await {
            Ok(_) => {
                info!(project_id = %project_id, "auto-created missing project context");
                Ok(())
            }
            // A concurrent creator beat us to it; that satisfies the chain.
            Err(OrchestratorError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn auto_create_branch_context(
        &self,
        branch_id: &BranchId,
        project_id: &ProjectId,
    ) -> Result<()> {
        let now = Utc::now();
        let mut metadata = ContextDocument::new();
        metadata.insert("auto_created", serde_json::json!(true));
        let context = Context::Branch(BranchContext {
            id: ContextId::from(branch_id),
            project_id: project_id.clone(),
            git_branch_name: self.branch_display_name(&ContextId::from(branch_id)).await,
            branch_settings: ContextDocument::new(),
            metadata,
            state: ContextState::initial(now),
        });
        match self.contexts.create(context).await {
            Ok(_) => {
                info!(branch_id = %branch_id, "auto-created missing branch context");
                Ok(())
            }
            Err(OrchestratorError::AlreadyExists { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn project_display_name(&self, id: &ContextId) -> String {
        if let Ok(project_id) = ProjectId::parse(id.as_str()) {
            if let Ok(Some(project)) = self.projects.get(&project_id).await {
                return project.name;
            }
        }
        id.as_str().to_string()
    }

    async fn branch_display_name(&self, id: &ContextId) -> String {
        if let Ok(branch_id) = BranchId::parse(id.as_str()) {
            if let Ok(Some(branch)) = self.branches.get(&branch_id).await {
                return branch.name;
            }
        }
        id.as_str().to_string()
    }

    fn violation_missing_project(&self, level: ContextLevel, id: &ContextId) -> OrchestratorError {
        warn!(level = %level, id = %id, "hierarchy violation: project cannot be determined");
        OrchestratorError::hierarchy_violation(
            level,
            id.as_str(),
            "the owning project could not be determined; pass project_id or create the project first",
            vec![
                "manage_project(action=\"create\", name=\"<project name>\")".to_string(),
                format!(
                    "manage_context(action=\"create\", level=\"{}\", context_id=\"{}\", project_id=\"<project_id>\")",
                    level, id
                ),
            ],
        )
    }

    fn violation_missing_branch(&self, id: &ContextId) -> OrchestratorError {
        warn!(id = %id, "hierarchy violation: branch cannot be determined");
        OrchestratorError::hierarchy_violation(
            ContextLevel::Task,
            id.as_str(),
            "the owning branch could not be determined; pass git_branch_id or create the branch first",
            vec![
                "manage_git_branch(action=\"create\", project_id=\"<project_id>\", name=\"<branch name>\")"
                    .to_string(),
                format!(
                    "manage_context(action=\"create\", level=\"task\", context_id=\"{id}\", git_branch_id=\"<branch_id>\")"
                ),
            ],
        )
    }
}

struct Lineage {
    project_id: Option<ProjectId>,
    branch_id: Option<BranchId>,
}

/// Walk the existing ancestor chain global-first, applying the level merge
/// and the two short-circuit flags.
fn resolve_chain(
    level: ContextLevel,
    id: &ContextId,
    path: &[Context],
    now: chrono::DateTime<Utc>,
) -> ResolvedContext {
    let mut data = ContextDocument::new();
    let mut chain: Vec<ContextLevel> = Vec::new();

    for ctx in path {
        if ctx.state().force_local_only || ctx.state().inheritance_disabled {
            // force_local_only discards everything inherited so far;
            // inheritance_disabled refuses to inherit in the first place.
            // Either way the chain restarts at this node.
            data = ctx.data().clone();
            chain = vec![ctx.level()];
        } else {
            data.deep_merge(ctx.data());
            chain.push(ctx.level());
        }
    }

    let depth = chain.len();
    ResolvedContext {
        level,
        id: id.clone(),
        data,
        inheritance: InheritanceMetadata {
            chain,
            resolved_at: now,
            inheritance_depth: depth,
        },
    }
}
