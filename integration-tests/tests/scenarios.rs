//! End-to-end scenarios driven through the tool dispatcher over the
//! in-memory repositories: auto-context creation, completion gating,
//! dependency cycles, next-task determinism and inheritance merging.

use chrono::Duration;
use serde_json::{json, Value};

use mcp_protocol::{Dispatcher, DispatcherOptions, ResponseStatus, ToolResponse};
use mocks::{build_services, MockStores};
use strata_core::{
    AgentRepository, ContextId, ContextLevel, ContextRepository, TaskId, TaskRepository,
};

struct World {
    stores: MockStores,
    dispatcher: Dispatcher,
    project_id: String,
    branch_id: String,
}

fn world() -> World {
    let stores = MockStores::new();
    let (project_id, branch_id) = stores.seed_workspace_ids();
    let graph = build_services(&stores);
    let dispatcher = Dispatcher::new(
        graph.tasks,
        graph.subtasks,
        graph.engine,
        graph.branches,
        graph.agents,
        graph.projects,
        DispatcherOptions::default(),
    );
    World {
        stores,
        dispatcher,
        project_id: project_id.to_string(),
        branch_id: branch_id.to_string(),
    }
}

fn code(resp: &ToolResponse) -> String {
    serde_json::to_value(resp.error.as_ref().expect("error block").code)
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

async fn create_task(w: &World, title: &str) -> String {
    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "create", "git_branch_id": w.branch_id, "title": title}),
        )
        .await;
    assert_eq!(resp.status, ResponseStatus::Success, "{:?}", resp.error);
    resp.data.unwrap()["task"]["id"].as_str().unwrap().to_string()
}

// Scenario 1: creating a task on a branch whose branch- and project-
// contexts do not exist yet auto-creates the whole ancestor chain.
#[tokio::test]
async fn create_task_with_auto_context() {
    let w = world();

    // Precondition: no context exists at any level.
    for level in [ContextLevel::Global, ContextLevel::Project, ContextLevel::Branch] {
        assert!(w
            .stores
            .contexts
            .list(level)
            .await
            .unwrap()
            .is_empty());
    }

    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "create", "git_branch_id": w.branch_id, "title": "X", "description": "Y"}),
        )
        .await;

    assert!(resp.is_consistent());
    assert_eq!(resp.status, ResponseStatus::Success);
    let task_id = resp.data.unwrap()["task"]["id"].as_str().unwrap().to_string();

    // Task context exists at the task's id, and every ancestor was
    // silently created.
    assert!(w
        .stores
        .contexts
        .exists(ContextLevel::Task, &ContextId::parse(&task_id).unwrap())
        .await
        .unwrap());
    assert!(w
        .stores
        .contexts
        .exists(ContextLevel::Branch, &ContextId::parse(&w.branch_id).unwrap())
        .await
        .unwrap());
    assert!(w
        .stores
        .contexts
        .exists(ContextLevel::Project, &ContextId::parse(&w.project_id).unwrap())
        .await
        .unwrap());
    assert!(w
        .stores
        .contexts
        .exists(ContextLevel::Global, &ContextId::global())
        .await
        .unwrap());
}

// Scenario 2: completion is rejected while a subtask is open, names the
// subtask, and hands back the remediating subtask-complete call.
#[tokio::test]
async fn complete_blocked_by_subtask() {
    let w = world();
    let task_id = create_task(&w, "parent work").await;

    let add = w
        .dispatcher
        .dispatch(
            "manage_subtask",
            json!({"action": "add", "task_id": task_id, "title": "S"}),
        )
        .await;
    let subtask_id = add.data.unwrap()["subtask"]["id"].as_str().unwrap().to_string();

    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "complete", "task_id": task_id, "completion_summary": "done"}),
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Failure);
    assert_eq!(code(&resp), "DEPENDENCY_ERROR");
    assert!(resp.error.as_ref().unwrap().message.contains("S"));

    let actions = resp.workflow_guidance.unwrap()["next_actions"]
        .as_array()
        .unwrap()
        .clone();
    assert!(actions.iter().any(|a| a["tool"] == "manage_subtask"
        && a["params"]["action"] == "complete"
        && a["params"]["subtask_id"] == Value::String(subtask_id.clone())));
}

// Scenario 3: a dependency edge that would close a cycle is rejected.
#[tokio::test]
async fn dependency_cycle_rejected() {
    let w = world();
    let a = create_task(&w, "A").await;
    let b = create_task(&w, "B").await;
    let c = create_task(&w, "C").await;

    for (task, dep) in [(&a, &b), (&b, &c)] {
        let resp = w
            .dispatcher
            .dispatch(
                "manage_task",
                json!({"action": "add_dependency", "task_id": task, "dependency_id": dep}),
            )
            .await;
        assert_eq!(resp.status, ResponseStatus::Success);
    }

    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "add_dependency", "task_id": c, "dependency_id": a}),
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Failure);
    assert_eq!(code(&resp), "CONSTRAINT_VIOLATION");
    assert!(resp.error.unwrap().message.contains("cycle"));
}

// Scenario 4: next-task selection is deterministic: the critical candidate
// is blocked by an incomplete dependency, and among the two high-priority
// candidates the older updated_at wins.
#[tokio::test]
async fn next_task_selection_determinism() {
    let w = world();
    let t1 = create_task(&w, "T1").await;
    let t2 = create_task(&w, "T2").await;
    let t3 = create_task(&w, "T3").await;

    let now = chrono::Utc::now();
    let t1_id = TaskId::parse(&t1).unwrap();
    let t2_id = TaskId::parse(&t2).unwrap();
    let t3_id = TaskId::parse(&t3).unwrap();

    let mut stored = w.stores.tasks.get(&t1_id).await.unwrap().unwrap();
    stored.priority = strata_core::Priority::High;
    stored.updated_at = now;
    w.stores.tasks.update(&t1_id, stored).await.unwrap();

    let mut stored = w.stores.tasks.get(&t2_id).await.unwrap().unwrap();
    stored.priority = strata_core::Priority::High;
    stored.updated_at = now - Duration::seconds(5);
    w.stores.tasks.update(&t2_id, stored).await.unwrap();

    let mut stored = w.stores.tasks.get(&t3_id).await.unwrap().unwrap();
    stored.priority = strata_core::Priority::Critical;
    stored.dependencies = vec![t1_id.clone()];
    w.stores.tasks.update(&t3_id, stored).await.unwrap();

    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "next", "git_branch_id": w.branch_id}),
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Success);
    assert_eq!(resp.data.unwrap()["task"]["id"], Value::String(t2));
}

// Scenario 5: inheritance merges global -> project -> branch with the
// documented map/list/scalar rules.
#[tokio::test]
async fn inheritance_merge() {
    let w = world();

    let calls = [
        json!({"action": "create", "level": "global", "context_id": "global_singleton",
               "data": {"a": {"x": 1}, "l": [1]}}),
        json!({"action": "create", "level": "project", "context_id": w.project_id,
               "data": {"a": {"y": 2}, "l": [2]}}),
        json!({"action": "create", "level": "branch", "context_id": w.branch_id,
               "project_id": w.project_id, "data": {"a": {"x": 9}}}),
    ];
    for call in calls {
        let resp = w.dispatcher.dispatch("manage_context", call).await;
        assert_eq!(resp.status, ResponseStatus::Success, "{:?}", resp.error);
    }

    let resp = w
        .dispatcher
        .dispatch(
            "manage_context",
            json!({"action": "resolve", "level": "branch", "context_id": w.branch_id}),
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Success);
    let context = resp.data.unwrap()["context"].clone();
    assert_eq!(context["a"], json!({"x": 9, "y": 2}));
    assert_eq!(context["l"], json!([1, 2]));
    assert_eq!(
        context["_inheritance"]["chain"],
        json!(["global", "project", "branch"])
    );
    assert_eq!(context["_inheritance"]["inheritance_depth"], 3);
}

// Scenario 6: the completion happy path writes the summary, testing notes,
// completion timestamp and done status into the task context.
#[tokio::test]
async fn complete_with_summary_happy_path() {
    let w = world();
    let task_id = create_task(&w, "T").await;

    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({
                "action": "complete",
                "task_id": task_id,
                "completion_summary": "ok",
                "testing_notes": "unit tests pass",
            }),
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Success, "{:?}", resp.error);
    let data = resp.data.unwrap();
    assert_eq!(data["task"]["status"], "done");
    assert_eq!(data["task"]["progress_percentage"], 100);
    assert_eq!(data["context_updated"], true);

    let context = w
        .stores
        .contexts
        .get(ContextLevel::Task, &ContextId::parse(&task_id).unwrap())
        .await
        .unwrap()
        .unwrap();
    match context {
        strata_core::Context::Task(tc) => {
            assert_eq!(tc.task_data.get("completion_summary"), Some(&json!("ok")));
            assert_eq!(
                tc.task_data.get("testing_notes"),
                Some(&json!("unit tests pass"))
            );
            assert_eq!(tc.task_data.get("status"), Some(&json!("done")));
            assert!(tc.task_data.get("completed_at").is_some());
        }
        other => panic!("expected task context, got {other:?}"),
    }

    // Guidance points at the next actionable work.
    let guidance = resp.workflow_guidance.unwrap();
    assert!(guidance["next_actions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|a| a["params"]["action"] == "next"));
}

// Round-trip / idempotence checks of the tool surface.
#[tokio::test]
async fn idempotence_laws() {
    let w = world();
    let a = create_task(&w, "A").await;
    let b = create_task(&w, "B").await;

    // add_dependency twice leaves one edge.
    for _ in 0..2 {
        let resp = w
            .dispatcher
            .dispatch(
                "manage_task",
                json!({"action": "add_dependency", "task_id": a, "dependency_id": b}),
            )
            .await;
        assert_eq!(resp.status, ResponseStatus::Success);
    }
    let stored = w
        .stores
        .tasks
        .get(&TaskId::parse(&a).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.dependencies.len(), 1);

    // register twice returns the same agent.
    let agent_id = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
    for _ in 0..2 {
        let resp = w
            .dispatcher
            .dispatch(
                "manage_agent",
                json!({"action": "register", "agent_id": agent_id, "name": "builder"}),
            )
            .await;
        assert_eq!(resp.status, ResponseStatus::Success);
    }
    let agents = w.stores.agents.list(None).await.unwrap();
    assert_eq!(agents.len(), 1);

    // The global context was auto-created while the tasks were. An empty
    // update is a no-op except version/updated_at.
    let before = w
        .stores
        .contexts
        .get(ContextLevel::Global, &ContextId::global())
        .await
        .unwrap()
        .unwrap();
    let resp = w
        .dispatcher
        .dispatch(
            "manage_context",
            json!({"action": "update", "level": "global", "context_id": "global_singleton"}),
        )
        .await;
    assert_eq!(resp.status, ResponseStatus::Success);
    let context = resp.data.unwrap()["context"].clone();
    assert_eq!(context["version"], json!(before.version() + 1));
    assert_eq!(
        context["global_settings"],
        serde_json::to_value(before.data()).unwrap()
    );

    // A second create for the same (level, id) is rejected.
    let resp = w
        .dispatcher
        .dispatch(
            "manage_context",
            json!({"action": "create", "level": "global", "context_id": "global_singleton", "data": {}}),
        )
        .await;
    assert_eq!(resp.status, ResponseStatus::Failure);
    assert_eq!(code(&resp), "ALREADY_EXISTS");
}

// Archive/restore through the branch tool keeps tasks recoverable.
#[tokio::test]
async fn branch_archive_and_restore() {
    let w = world();
    let task_id = create_task(&w, "parked work").await;

    let resp = w
        .dispatcher
        .dispatch(
            "manage_git_branch",
            json!({"action": "archive", "git_branch_id": w.branch_id}),
        )
        .await;
    assert_eq!(resp.status, ResponseStatus::Success);

    // Archived tasks disappear from listings but stay resolvable for
    // dependency validation.
    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "list", "git_branch_id": w.branch_id}),
        )
        .await;
    assert_eq!(resp.data.unwrap()["count"], 0);
    assert!(w
        .stores
        .tasks
        .find_by_id_all_states(&TaskId::parse(&task_id).unwrap())
        .await
        .unwrap()
        .is_some());

    let resp = w
        .dispatcher
        .dispatch(
            "manage_git_branch",
            json!({"action": "restore", "git_branch_id": w.branch_id}),
        )
        .await;
    assert_eq!(resp.status, ResponseStatus::Success);

    let resp = w
        .dispatcher
        .dispatch(
            "manage_task",
            json!({"action": "list", "git_branch_id": w.branch_id}),
        )
        .await;
    assert_eq!(resp.data.unwrap()["count"], 1);
}

// Delegation queues durably and never mutates the target synchronously.
#[tokio::test]
async fn delegation_queues_without_applying() {
    let w = world();
    let task_id = create_task(&w, "discovers a pattern").await;

    let resp = w
        .dispatcher
        .dispatch(
            "manage_context",
            json!({
                "action": "delegate",
                "level": "task",
                "context_id": task_id,
                "delegate_to": "global",
                "delegate_data": {"pattern": "exponential backoff on busy sqlite"},
                "delegation_reason": "applies to every project",
            }),
        )
        .await;

    assert_eq!(resp.status, ResponseStatus::Success, "{:?}", resp.error);
    assert_eq!(resp.data.unwrap()["queued"], true);

    let pending = w.stores.delegations.all();
    assert_eq!(pending.len(), 1);
    assert!(!pending[0].processed);

    // The global context data was not touched.
    let global = w
        .stores
        .contexts
        .get(ContextLevel::Global, &ContextId::global())
        .await
        .unwrap()
        .unwrap();
    assert!(global.data().get("pattern").is_none());
}
