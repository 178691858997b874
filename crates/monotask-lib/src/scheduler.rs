use std::{
    collections::{HashMap, HashSet, VecDeque},
    future::Future,
    time::{Duration, Instant},
};

use futures::stream::FuturesUnordered;
use monotask_graph::{Engine, Built, TaskId};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::debug;

/// Terminal state of a task at the end of a run. Exactly one per task, per
/// spec.md §8's "status ∈ {built, cached, failed, skipped} exactly once".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Built,
    Cached,
    Failed,
    Skipped,
}

/// Whether a task's execution was skipped by restoring a prior cache
/// artifact, per spec.md §6's per-task `cache` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Cache outcome detail for one task, per spec.md §6's per-task `cache`
/// field (mirrors `CacheFacade::fetch`'s [`monotask_cache::CacheHitMetadata`]
/// on a hit, defaulted on a miss).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TaskCacheSummary {
    pub status: CacheStatus,
    pub local: bool,
    pub remote: bool,
    pub time_saved_ms: u64,
}

impl TaskCacheSummary {
    pub fn miss() -> Self {
        Self { status: CacheStatus::Miss, local: false, remote: false, time_saved_ms: 0 }
    }
}

/// Resolved env var names considered for a task, per spec.md §6's
/// `environmentVariables: {configured, inferred, global, passthrough,
/// globalPassthrough}`. `inferred` is always empty — framework-driven env
/// inference is an injected dependency this workspace doesn't implement
/// (spec.md §9).
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvironmentVariablesSummary {
    pub configured: Vec<String>,
    pub inferred: Vec<String>,
    pub global: Vec<String>,
    pub passthrough: Vec<String>,
    pub global_passthrough: Vec<String>,
}

/// What an `execute` callback reports back to the scheduler for one task.
/// Persistent tasks report `Built` as soon as they're spawned — the
/// scheduler has no notion of "still running forever"; a task is either
/// dispatched-and-done-for-graph-purposes or it isn't dispatched yet. The
/// executor is responsible for keeping the actual child process alive and
/// tearing it down when the run ends. The remaining fields are the per-task
/// detail spec.md §6's run summary mandates; the executor, which already
/// holds the task's definition and fingerprint, populates them directly
/// rather than having the scheduler reconstruct them from the graph later.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub hash: String,
    pub hash_of_external_dependencies: String,
    pub command: Option<String>,
    pub cache: TaskCacheSummary,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub excluded_outputs: Vec<String>,
    pub expanded_outputs: Vec<String>,
    pub log_file: String,
    pub resolved_task_definition: serde_json::Value,
    pub environment_variables: EnvironmentVariablesSummary,
    pub env_mode: monotask_hash::EnvMode,
}

impl TaskOutcome {
    /// A terminal outcome with no further detail, for tasks the scheduler
    /// itself marks skipped or cancelled without ever calling `execute`.
    pub(crate) fn bare(status: TaskStatus, error: Option<String>) -> Self {
        Self {
            status,
            exit_code: None,
            error,
            hash: String::new(),
            hash_of_external_dependencies: String::new(),
            command: None,
            cache: TaskCacheSummary::miss(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            excluded_outputs: Vec::new(),
            expanded_outputs: Vec::new(),
            log_file: String::new(),
            resolved_task_definition: serde_json::Value::Null,
            environment_variables: EnvironmentVariablesSummary::default(),
            env_mode: monotask_hash::EnvMode::Infer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub task: TaskId,
    pub status: TaskStatus,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub hash: String,
    pub hash_of_external_dependencies: String,
    pub command: Option<String>,
    pub cache: TaskCacheSummary,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub excluded_outputs: Vec<String>,
    pub expanded_outputs: Vec<String>,
    pub log_file: String,
    pub resolved_task_definition: serde_json::Value,
    pub environment_variables: EnvironmentVariablesSummary,
    pub env_mode: monotask_hash::EnvMode,
}

impl TaskEvent {
    pub(crate) fn from_outcome(task: TaskId, duration: Duration, outcome: TaskOutcome) -> Self {
        Self {
            task,
            status: outcome.status,
            duration,
            exit_code: outcome.exit_code,
            error: outcome.error,
            hash: outcome.hash,
            hash_of_external_dependencies: outcome.hash_of_external_dependencies,
            command: outcome.command,
            cache: outcome.cache,
            inputs: outcome.inputs,
            outputs: outcome.outputs,
            excluded_outputs: outcome.excluded_outputs,
            expanded_outputs: outcome.expanded_outputs,
            log_file: outcome.log_file,
            resolved_task_definition: outcome.resolved_task_definition,
            environment_variables: outcome.environment_variables,
            env_mode: outcome.env_mode,
        }
    }

    pub(crate) fn skipped(task: TaskId, error: String) -> Self {
        let bare = TaskOutcome::bare(TaskStatus::Skipped, Some(error));
        Self::from_outcome(task, Duration::ZERO, bare)
    }
}

/// Drives `engine`'s tasks to completion respecting dependency order and a
/// fixed concurrency limit. Grounded on
/// `turborepo-lib/src/task_graph/visitor/mod.rs::Visitor::visit`'s
/// mpsc-fed, `FuturesUnordered`-drained loop, generalized over this crate's
/// own `Engine`/`TaskId` and an injected `execute` closure instead of a
/// concrete `ExecContext`.
pub struct Scheduler {
    concurrency: usize,
    continue_on_failure: bool,
}

impl Scheduler {
    pub fn new(concurrency: usize, continue_on_failure: bool) -> Self {
        Self {
            concurrency: concurrency.max(1),
            continue_on_failure,
        }
    }

    /// Runs every task in `engine` via `execute`, returning one [`TaskEvent`]
    /// per task. `execute` is called at most once per task, only once all
    /// of that task's dependencies have reached a terminal success state.
    /// Each call also receives a [`watch::Receiver`] that flips to `true`
    /// the moment a non-`--continue` run bails on a failure, so in-flight
    /// tasks can wind down instead of running to completion after the run
    /// has already decided to stop (spec.md §4.6).
    pub async fn run<E, Fut>(&self, engine: &Engine<Built>, mut execute: E) -> Vec<TaskEvent>
    where
        E: FnMut(TaskId, watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let order = engine
            .stable_order()
            .expect("engine is validated acyclic before scheduling");
        let rank: HashMap<TaskId, usize> =
            order.iter().cloned().enumerate().map(|(i, id)| (id, i)).collect();

        let mut remaining: HashMap<TaskId, usize> = order
            .iter()
            .map(|id| (id.clone(), engine.dependencies(id).len()))
            .collect();

        let mut ready: VecDeque<TaskId> =
            order.iter().filter(|id| remaining[*id] == 0).cloned().collect();

        let mut events = Vec::with_capacity(order.len());
        let mut finished: HashSet<TaskId> = HashSet::new();
        let mut bailed = false;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut in_flight: FuturesUnordered<JoinHandle<(TaskId, Instant, TaskOutcome)>> =
            FuturesUnordered::new();

        loop {
            while !bailed && in_flight.len() < self.concurrency {
                let Some(next) = pop_highest_priority(&mut ready, &rank) else {
                    break;
                };
                let fut = execute(next.clone(), cancel_rx.clone());
                let started = Instant::now();
                in_flight.push(tokio::spawn(async move {
                    let outcome = fut.await;
                    (next, started, outcome)
                }));
            }

            if in_flight.is_empty() {
                if ready.is_empty() {
                    break;
                }
                if bailed {
                    // Nothing left to run; drain remaining ready tasks as skipped.
                    while let Some(id) = ready.pop_front() {
                        events.push(TaskEvent::skipped(
                            id,
                            "run cancelled after an earlier failure".into(),
                        ));
                    }
                    break;
                }
                continue;
            }

            let Some(result) = in_flight.next().await else {
                continue;
            };
            let (id, started, outcome) = result.expect("task executor panicked");
            let duration = started.elapsed();
            debug!(task = %id, status = ?outcome.status, "task finished");

            finished.insert(id.clone());
            let failed = outcome.status == TaskStatus::Failed;
            events.push(TaskEvent::from_outcome(id.clone(), duration, outcome));

            if failed {
                if self.continue_on_failure {
                    skip_dependents(engine, &id, &mut remaining, &mut ready, &mut events, &mut finished);
                } else {
                    bailed = true;
                    let _ = cancel_tx.send(true);
                }
            } else {
                for dependent in engine.dependents(&id) {
                    if let Some(count) = remaining.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        events
    }
}

fn pop_highest_priority(ready: &mut VecDeque<TaskId>, rank: &HashMap<TaskId, usize>) -> Option<TaskId> {
    if ready.is_empty() {
        return None;
    }
    let (pos, _) = ready
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| rank.get(*id).copied().unwrap_or(usize::MAX))?;
    ready.remove(pos)
}

/// Marks every not-yet-terminal transitive dependent of `failed` as
/// `Skipped (upstream failure)`, per spec.md §4.6's `--continue` semantics.
fn skip_dependents(
    engine: &Engine<Built>,
    failed: &TaskId,
    remaining: &mut HashMap<TaskId, usize>,
    ready: &mut VecDeque<TaskId>,
    events: &mut Vec<TaskEvent>,
    finished: &mut HashSet<TaskId>,
) {
    let mut queue: VecDeque<TaskId> = engine.dependents(failed).into_iter().cloned().collect();
    while let Some(id) = queue.pop_front() {
        if finished.contains(&id) {
            continue;
        }
        finished.insert(id.clone());
        remaining.remove(&id);
        ready.retain(|queued| queued != &id);
        events.push(TaskEvent::skipped(id.clone(), format!("upstream failure in {failed}")));
        queue.extend(engine.dependents(&id).into_iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap as StdHashMap,
        sync::{Arc, Mutex},
    };

    use monotask_graph::{GraphBuilder, Pipeline, PipelineEntry, Workspace, WorkspaceGraph, WorkspaceName};
    use monotask_path::AnchoredUnixPathBuf;

    use super::*;

    fn outcome(status: TaskStatus, exit_code: Option<i32>, error: Option<&str>) -> TaskOutcome {
        TaskOutcome {
            exit_code,
            error: error.map(str::to_string),
            ..TaskOutcome::bare(status, None)
        }
    }

    fn workspace(name: &str, deps: &[&str]) -> Workspace {
        Workspace {
            name: name.into(),
            dir: AnchoredUnixPathBuf::new(format!("packages/{name}")).unwrap(),
            scripts: StdHashMap::from([("build".to_string(), "tsc".to_string())]),
            internal_deps: deps.iter().map(|d| WorkspaceName::from(*d)).collect(),
            external_deps_hash: "deadbeef".into(),
        }
    }

    #[tokio::test]
    async fn dependency_runs_before_dependent() {
        let workspaces = WorkspaceGraph::new([workspace("app", &["lib"]), workspace("lib", &[])]);
        let mut tasks = StdHashMap::new();
        tasks.insert(
            "build".to_string(),
            PipelineEntry {
                depends_on: vec!["^build".parse().unwrap()],
                ..Default::default()
            },
        );
        let pipeline = Pipeline::new(tasks, StdHashMap::new());
        let targets = vec!["build".to_string()];
        let engine = GraphBuilder::new(&workspaces, &pipeline, &targets).build().unwrap();

        let order_log = Arc::new(Mutex::new(Vec::new()));
        let scheduler = Scheduler::new(10, false);
        let log = order_log.clone();
        let events = scheduler
            .run(&engine, move |id, _cancel| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(id.clone());
                    outcome(TaskStatus::Built, Some(0), None)
                }
            })
            .await;

        assert_eq!(events.len(), 2);
        let log = order_log.lock().unwrap();
        let lib_pos = log.iter().position(|id| id.package.0 == "lib").unwrap();
        let app_pos = log.iter().position(|id| id.package.0 == "app").unwrap();
        assert!(lib_pos < app_pos);
    }

    #[tokio::test]
    async fn failure_skips_dependents_in_continue_mode() {
        let workspaces = WorkspaceGraph::new([workspace("app", &["lib"]), workspace("lib", &[])]);
        let mut tasks = StdHashMap::new();
        tasks.insert(
            "build".to_string(),
            PipelineEntry {
                depends_on: vec!["^build".parse().unwrap()],
                ..Default::default()
            },
        );
        let pipeline = Pipeline::new(tasks, StdHashMap::new());
        let targets = vec!["build".to_string()];
        let engine = GraphBuilder::new(&workspaces, &pipeline, &targets).build().unwrap();

        let scheduler = Scheduler::new(10, true);
        let events = scheduler
            .run(&engine, |id, _cancel| async move {
                if id.package.0 == "lib" {
                    outcome(TaskStatus::Failed, Some(1), Some("boom"))
                } else {
                    outcome(TaskStatus::Built, Some(0), None)
                }
            })
            .await;

        let app_event = events.iter().find(|e| e.task.package.0 == "app").unwrap();
        assert_eq!(app_event.status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn bail_without_continue_signals_cancellation() {
        let workspaces = WorkspaceGraph::new([workspace("fails", &[]), workspace("waits", &[])]);
        let mut tasks = StdHashMap::new();
        tasks.insert("build".to_string(), PipelineEntry::default());
        let pipeline = Pipeline::new(tasks, StdHashMap::new());
        let targets = vec!["build".to_string()];
        let engine = GraphBuilder::new(&workspaces, &pipeline, &targets).build().unwrap();

        let cancelled = Arc::new(Mutex::new(false));
        let observed = cancelled.clone();
        let scheduler = Scheduler::new(10, false);
        scheduler
            .run(&engine, move |id, mut cancel| {
                let observed = observed.clone();
                async move {
                    if id.package.0 == "fails" {
                        outcome(TaskStatus::Failed, Some(1), Some("boom"))
                    } else {
                        cancel.changed().await.unwrap();
                        *observed.lock().unwrap() = *cancel.borrow();
                        outcome(TaskStatus::Failed, Some(1), Some("cancelled"))
                    }
                }
            })
            .await;

        assert!(*cancelled.lock().unwrap());
    }
}
