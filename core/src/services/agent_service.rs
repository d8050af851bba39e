//! Agent service: idempotent registration, branch assignment with
//! auto-registration, and advisory workload rebalancing.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::error::{OrchestratorError, Result};
use crate::ids::{AgentCapability, AgentId, BranchId, ProjectId};
use crate::models::Agent;
use crate::repository::{AgentRepository, BranchRepository};
use crate::validation::InputValidator;

/// Registration payload; `id` is caller-supplied so re-registration is
/// recognizable
#[derive(Debug, Clone)]
pub struct RegisterAgent {
    pub id: AgentId,
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Vec<AgentCapability>,
    pub project_id: Option<ProjectId>,
}

/// One advisory move produced by `rebalance`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RebalanceRecommendation {
    pub branch_id: BranchId,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    pub reason: String,
}

/// Result of a rebalance pass
#[derive(Debug, Clone, serde::Serialize)]
pub struct RebalancePlan {
    pub recommendations: Vec<RebalanceRecommendation>,
    pub applied: bool,
}

/// Agent registration and assignment operations
pub struct AgentService {
    agents: Arc<dyn AgentRepository>,
    branches: Arc<dyn BranchRepository>,
}

impl AgentService {
    pub fn new(agents: Arc<dyn AgentRepository>, branches: Arc<dyn BranchRepository>) -> Self {
        Self { agents, branches }
    }

    /// Register an agent. Registering an existing id again returns the
    /// stored agent unchanged (idempotent by `(project, agent)`).
    pub async fn register(&self, registration: RegisterAgent) -> Result<Agent> {
        InputValidator::validate_name("name", &registration.name)?;

        if let Some(existing) = self.agents.get(&registration.id).await? {
            let already_scoped = registration
                .project_id
                .as_ref()
                .map_or(true, |p| existing.assigned_projects.contains(p));
            if already_scoped {
                return Ok(existing);
            }
            let mut agent = existing;
            agent
                .assigned_projects
                .extend(registration.project_id.clone());
            agent.updated_at = Utc::now();
            return self.agents.update(&registration.id, agent).await;
        }

        let now = Utc::now();
        let mut agent = Agent::register(registration.id.clone(), registration.name, now);
        agent.description = registration.description;
        agent.capabilities = registration.capabilities;
        agent.assigned_projects.extend(registration.project_id);
        info!(agent_id = %agent.id, "agent registered");
        self.agents.create(agent).await
    }

    pub async fn unregister(&self, id: &AgentId) -> Result<bool> {
        if !self.agents.exists(id).await? {
            return Err(OrchestratorError::not_found("Agent", id.as_str()));
        }
        // Unbind from any branch still pointing at this agent.
        for branch in self.branches.list(None).await? {
            if branch.assigned_agent_id.as_ref() == Some(id) {
                let mut branch = branch;
                branch.assigned_agent_id = None;
                branch.updated_at = Utc::now();
                self.branches.update(&branch.id.clone(), branch).await?;
            }
        }
        self.agents.delete(id).await
    }

    pub async fn get(&self, id: &AgentId) -> Result<Agent> {
        self.agents
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Agent", id.as_str()))
    }

    pub async fn list(&self, project_id: Option<&ProjectId>) -> Result<Vec<Agent>> {
        self.agents.list(project_id).await
    }

    /// Update mutable agent attributes
    pub async fn update(
        &self,
        id: &AgentId,
        name: Option<String>,
        description: Option<String>,
        capabilities: Option<Vec<AgentCapability>>,
        max_concurrent_tasks: Option<u32>,
    ) -> Result<Agent> {
        let mut agent = self.get(id).await?;
        if let Some(name) = name {
            InputValidator::validate_name("name", &name)?;
            agent.name = name;
        }
        if let Some(description) = description {
            agent.description = Some(description);
        }
        if let Some(capabilities) = capabilities {
            agent.capabilities = capabilities;
        }
        if let Some(max) = max_concurrent_tasks {
            if max == 0 {
                return Err(OrchestratorError::field_validation(
                    "max_concurrent_tasks",
                    "must be at least 1",
                ));
            }
            agent.max_concurrent_tasks = max;
        }
        agent.updated_at = Utc::now();
        self.agents.update(id, agent).await
    }

    /// Assign an agent to a branch. Unknown agents are auto-registered
    /// first; the branch id joins the agent's `assigned_trees` and the
    /// branch records the binding.
    pub async fn assign_to_branch(&self, agent_id: &AgentId, branch_id: &BranchId) -> Result<Agent> {
        let mut branch = self
            .branches
            .get(branch_id)
            .await?
            .ok_or_else(|| OrchestratorError::not_found("Branch", branch_id.as_str()))?;

        let mut agent = match self.agents.get(agent_id).await? {
            Some(agent) => agent,
            None => {
                info!(agent_id = %agent_id, "auto-registering agent on assignment");
                self.register(RegisterAgent {
                    id: agent_id.clone(),
                    name: format!("agent-{}", &agent_id.as_str()[..8]),
                    description: None,
                    capabilities: Vec::new(),
                    project_id: Some(branch.project_id.clone()),
                })
                .await?
            }
        };

        let now = Utc::now();
        if !agent.assigned_trees.contains(branch_id) {
            agent.assigned_trees.push(branch_id.clone());
        }
        if !agent.assigned_projects.contains(&branch.project_id) {
            agent.assigned_projects.push(branch.project_id.clone());
        }
        agent.updated_at = now;
        let agent = self.agents.update(agent_id, agent).await?;

        branch.assigned_agent_id = Some(agent_id.clone());
        branch.updated_at = now;
        self.branches.update(branch_id, branch).await?;
        Ok(agent)
    }

    /// Remove a branch from the agent's tree list and clear the binding
    pub async fn unassign_from_branch(
        &self,
        agent_id: &AgentId,
        branch_id: &BranchId,
    ) -> Result<Agent> {
        let mut agent = self.get(agent_id).await?;
        agent.assigned_trees.retain(|b| b != branch_id);
        agent.updated_at = Utc::now();
        let agent = self.agents.update(agent_id, agent).await?;

        if let Some(mut branch) = self.branches.get(branch_id).await? {
            if branch.assigned_agent_id.as_ref() == Some(agent_id) {
                branch.assigned_agent_id = None;
                branch.updated_at = Utc::now();
                self.branches.update(branch_id, branch).await?;
            }
        }
        Ok(agent)
    }

    /// Inspect workloads and suggest moving branches away from saturated
    /// agents. Purely advisory unless `apply` is set.
    pub async fn rebalance(&self, project_id: Option<&ProjectId>, apply: bool) -> Result<RebalancePlan> {
        let agents = self.agents.list(project_id).await?;
        let mut recommendations = Vec::new();

        let idle: Vec<&Agent> = agents
            .iter()
            .filter(|a| a.current_workload < a.max_concurrent_tasks)
            .collect();

        for agent in &agents {
            if agent.current_workload < agent.max_concurrent_tasks {
                continue;
            }
            // Saturated agent: suggest handing surplus trees to the least
            // loaded peer.
            let Some(target) = idle
                .iter()
                .filter(|candidate| candidate.id != agent.id)
                .min_by_key(|candidate| candidate.current_workload)
            else {
                continue;
            };
            for branch_id in agent.assigned_trees.iter().skip(1) {
                recommendations.push(RebalanceRecommendation {
                    branch_id: branch_id.clone(),
                    from_agent: agent.id.clone(),
                    to_agent: target.id.clone(),
                    reason: format!(
                        "{} is at capacity ({}/{}), {} has headroom",
                        agent.name,
                        agent.current_workload,
                        agent.max_concurrent_tasks,
                        target.name
                    ),
                });
            }
        }

        if apply {
            for rec in &recommendations {
                self.unassign_from_branch(&rec.from_agent, &rec.branch_id)
                    .await?;
                self.assign_to_branch(&rec.to_agent, &rec.branch_id).await?;
            }
        }

        Ok(RebalancePlan {
            recommendations,
            applied: apply,
        })
    }
}
