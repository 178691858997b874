use std::{
    fmt::Write as _,
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use monotask_graph::{Engine, Built, TaskId};
use monotask_hash::{EnvMode, GlobalHashable};
use serde::Serialize;

use crate::scheduler::{TaskCacheSummary, TaskEvent, TaskStatus};

/// Source-control context for a run, per spec.md §6's top-level `scm`
/// field. SCM diff detection is an explicit non-goal (spec.md §1/§12), so
/// this is always reported as `unknown` rather than shelling out to git.
#[derive(Debug, Clone, Serialize)]
pub struct ScmSummary {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: Option<String>,
    pub branch: Option<String>,
}

impl ScmSummary {
    pub fn unknown() -> Self {
        Self { kind: "unknown".to_string(), sha: None, branch: None }
    }
}

/// Run-wide metadata that isn't discoverable from the ledger's events,
/// assembled once in `run()` and threaded into [`RunLedger::summary`].
/// Covers spec.md §6's top-level run summary fields beyond `tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub id: String,
    pub turbo_version: String,
    pub global_cache_inputs: GlobalHashable,
    pub env_mode: EnvMode,
    pub framework_inference: bool,
    pub user: String,
    pub scm: ScmSummary,
}

impl RunMeta {
    pub fn new(global_hash: String, global_cache_inputs: GlobalHashable, env_mode: EnvMode) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            id: format!("{global_hash}-{nanos:x}"),
            turbo_version: env!("CARGO_PKG_VERSION").to_string(),
            global_cache_inputs,
            env_mode,
            framework_inference: false,
            user,
            scm: ScmSummary::unknown(),
        }
    }
}

/// Single-writer event ledger (spec.md §4.8): the scheduler reports events
/// as tasks finish, guarded by one short-held mutex per spec.md §5 ("writes
/// are short (one event)").
#[derive(Default)]
pub struct RunLedger {
    events: Mutex<Vec<TaskEvent>>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: TaskEvent) {
        self.events.lock().expect("ledger mutex poisoned").push(event);
    }

    pub fn record_all(&self, events: impl IntoIterator<Item = TaskEvent>) {
        let mut guard = self.events.lock().expect("ledger mutex poisoned");
        guard.extend(events);
    }

    /// Builds a [`RunSummary`] from the events recorded so far plus static
    /// graph metadata. Render is a pure function of the ledger's contents,
    /// sorted by task id — independent of the order events arrived in, per
    /// spec.md §4.8's "idempotent and independent of task execution
    /// ordering".
    pub fn summary(&self, engine: &Engine<Built>, meta: &RunMeta) -> RunSummary {
        let guard = self.events.lock().expect("ledger mutex poisoned");
        let mut tasks: Vec<TaskSummary> = guard
            .iter()
            .map(|event| TaskSummary {
                task_id: event.task.to_string(),
                package: event.task.package.to_string(),
                task: event.task.task.clone(),
                status: status_name(event.status).to_string(),
                exit_code: event.exit_code,
                duration_ms: event.duration.as_millis() as u64,
                error: event.error.clone(),
                dependencies: engine
                    .dependencies(&event.task)
                    .into_iter()
                    .map(TaskId::to_string)
                    .collect(),
                dependents: engine
                    .dependents(&event.task)
                    .into_iter()
                    .map(TaskId::to_string)
                    .collect(),
                hash: event.hash.clone(),
                inputs: event.inputs.clone(),
                hash_of_external_dependencies: event.hash_of_external_dependencies.clone(),
                cache: event.cache,
                command: event.command.clone(),
                outputs: event.outputs.clone(),
                excluded_outputs: event.excluded_outputs.clone(),
                log_file: event.log_file.clone(),
                resolved_task_definition: event.resolved_task_definition.clone(),
                expanded_outputs: event.expanded_outputs.clone(),
                framework: None,
                env_mode: event.env_mode,
                environment_variables: event.environment_variables.clone(),
            })
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));

        let counts = Counts {
            attempted: tasks.len(),
            success: tasks.iter().filter(|t| t.status == "built").count(),
            cached: tasks.iter().filter(|t| t.status == "cached").count(),
            failed: tasks.iter().filter(|t| t.status == "failed").count(),
            skipped: tasks.iter().filter(|t| t.status == "skipped").count(),
        };

        RunSummary { meta: meta.clone(), counts, tasks }
    }
}

fn status_name(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Built => "built",
        TaskStatus::Cached => "cached",
        TaskStatus::Failed => "failed",
        TaskStatus::Skipped => "skipped",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Counts {
    pub attempted: usize,
    pub success: usize,
    pub cached: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub package: String,
    pub task: String,
    pub status: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub hash: String,
    pub inputs: Vec<String>,
    pub hash_of_external_dependencies: String,
    pub cache: TaskCacheSummary,
    pub command: Option<String>,
    pub outputs: Vec<String>,
    pub excluded_outputs: Vec<String>,
    pub log_file: String,
    pub resolved_task_definition: serde_json::Value,
    pub expanded_outputs: Vec<String>,
    pub framework: Option<String>,
    pub env_mode: EnvMode,
    pub environment_variables: crate::scheduler::EnvironmentVariablesSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub meta: RunMeta,
    pub counts: Counts,
    pub tasks: Vec<TaskSummary>,
}

impl RunSummary {
    /// Top-level shape of spec.md §6's run summary: run-wide metadata
    /// flattened alongside `tasks`, each task carrying the full per-task
    /// fingerprint and execution detail the spec names.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.meta.id,
            "version": 1,
            "turboVersion": self.meta.turbo_version,
            "globalCacheInputs": self.meta.global_cache_inputs,
            "envMode": self.meta.env_mode,
            "frameworkInference": self.meta.framework_inference,
            "tasks": self.tasks,
            "user": self.meta.user,
            "scm": self.meta.scm,
            "counts": self.counts,
        })
    }

    /// Text rendering, grounded on the teacher's run summary table: one row
    /// per task, sorted by id, with a totals line.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        writeln!(
            out,
            "{} successful, {} cached, {} failed, {} skipped, {} total",
            self.counts.success,
            self.counts.cached,
            self.counts.failed,
            self.counts.skipped,
            self.counts.attempted,
        )
        .unwrap();
        for task in &self.tasks {
            writeln!(
                out,
                "{:<30} {:<8} {}ms{}",
                task.task_id,
                task.status,
                task.duration_ms,
                task.exit_code.map(|c| format!(" (exit {c})")).unwrap_or_default(),
            )
            .unwrap();
        }
        out
    }

    pub fn exit_code(&self) -> i32 {
        self.tasks
            .iter()
            .filter_map(|t| if t.status == "failed" { t.exit_code } else { None })
            .max()
            .unwrap_or(0)
            .max(if self.counts.failed > 0 { 1 } else { 0 })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use monotask_graph::{GraphBuilder, Pipeline, WorkspaceGraph};

    use super::*;
    use crate::scheduler::TaskOutcome;

    fn event(package: &str, status: TaskStatus, duration_ms: u64, exit_code: Option<i32>) -> TaskEvent {
        TaskEvent::from_outcome(
            TaskId::new(package.into(), "build"),
            Duration::from_millis(duration_ms),
            TaskOutcome { exit_code, ..TaskOutcome::bare(status, None) },
        )
    }

    #[test]
    fn summary_is_sorted_by_task_id_regardless_of_event_order() {
        let workspaces = WorkspaceGraph::new(std::iter::empty());
        let pipeline = Pipeline::new(Default::default(), Default::default());
        let targets: Vec<String> = Vec::new();
        let engine = GraphBuilder::new(&workspaces, &pipeline, &targets).build().unwrap();

        let ledger = RunLedger::new();
        ledger.record(event("web", TaskStatus::Built, 5, Some(0)));
        ledger.record(event("api", TaskStatus::Cached, 1, None));

        let global_cache_inputs = GlobalHashable {
            global_cache_key: "test@1".to_string(),
            global_file_hash_map: Default::default(),
            root_external_deps_hash: String::new(),
            env: Vec::new(),
            resolved_env_vars: Vec::new(),
            pass_through_env: Vec::new(),
            env_mode: EnvMode::Infer,
            framework_inference: false,
            dot_env: Vec::new(),
        };
        let meta = RunMeta::new("deadbeef".to_string(), global_cache_inputs, EnvMode::Infer);
        let summary = ledger.summary(&engine, &meta);
        assert_eq!(summary.tasks[0].task_id, "api#build");
        assert_eq!(summary.tasks[1].task_id, "web#build");
        assert_eq!(summary.counts.success, 1);
        assert_eq!(summary.counts.cached, 1);
    }
}
