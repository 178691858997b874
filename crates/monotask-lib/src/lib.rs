//! Run orchestration: wires the task graph builder (C5), scheduler (C6),
//! executor (C7), and run ledger (C8) into the single entry point a CLI or
//! embedding program calls. Grounded on
//! `turborepo-lib/src/run/mod.rs`'s `Run::run` — resolve the graph, then
//! hand it to a visitor that drives execution and collects a summary.

mod error;
mod executor;
mod opts;
mod pipeline_file;
mod run_state;
mod scheduler;

use std::collections::HashSet;

use monotask_cache::{CacheFacade, CacheOpts, FsCache, RemoteCache};
use monotask_env::EnvironmentVariableMap;
use monotask_graph::{render_dot, render_json, GraphBuilder, Pipeline, TaskId, WorkspaceGraph, WorkspaceName};
use monotask_hash::{GlobalHashable, TaskHashable};
use monotask_path::{AbsoluteSystemPath, AbsoluteSystemPathBuf};
use std::sync::Arc;

pub use error::Error;
pub use executor::{Executor, ExecutorConfig};
pub use opts::{DryRunMode, EnvMode as CliEnvMode, OutputLogsMode, RunArgs, RunOpts};
pub use pipeline_file::{GlobalInputs, PipelineFile};
pub use run_state::{Counts, RunLedger, RunSummary, TaskSummary};
pub use scheduler::{
    CacheStatus, EnvironmentVariablesSummary, Scheduler, TaskCacheSummary, TaskEvent, TaskOutcome,
    TaskStatus,
};

/// What a completed `run()` produced: the rendered summary plus the process
/// exit code spec.md §6 specifies (0 on success, the highest child exit code
/// on a task failure, 1 for pre-execution failures handled by the caller
/// before `run()` is even reached).
pub struct RunResult {
    pub summary: RunSummary,
    pub exit_code: i32,
}

/// Everything `run()` needs that spec.md §1 treats as externally supplied:
/// workspace discovery and the package manager binary are injected
/// dependencies, not this crate's concern.
pub struct RunContext {
    pub repo_root: AbsoluteSystemPathBuf,
    pub workspaces: WorkspaceGraph,
    pub pipeline: Pipeline,
    pub global_inputs: GlobalInputs,
    pub package_manager: String,
    pub remote_cache: Option<Arc<dyn RemoteCache>>,
}

/// Resolves the task graph, computes fingerprints, and drives the scheduler
/// to completion. This is the library's single public entry point (spec.md
/// §10.3: "constructed either programmatically ... or via a thin CLI").
pub async fn run(ctx: &RunContext, opts: &RunOpts) -> Result<RunResult, Error> {
    let scope: HashSet<WorkspaceName> = if opts.scope.is_empty() {
        ctx.workspaces.names().cloned().collect()
    } else {
        opts.scope.iter().map(|s| WorkspaceName::from(s.as_str())).collect()
    };

    let engine = GraphBuilder::new(&ctx.workspaces, &ctx.pipeline, &opts.tasks)
        .with_scope(scope)
        .with_parallel(opts.parallel)
        .with_only(opts.only)
        .build()?;

    if let Some(path) = &opts.graph {
        let json = render_json(&engine);
        match path {
            Some(path) => {
                let mut file = std::fs::File::create(path)?;
                serde_json::to_writer_pretty(&mut file, &json).map_err(std::io::Error::from)?;
            }
            None => render_dot(&engine, std::io::stdout())?,
        }
    }

    let (global_hash, global_hashable) = compute_global_hash(ctx, opts)?;
    let meta = run_state::RunMeta::new(global_hash.clone(), global_hashable, opts.env_mode);

    let cache_opts = CacheOpts {
        cache_dir: opts.cache_dir.clone(),
        remote_cache_read_only: false,
        skip_remote: ctx.remote_cache.is_none(),
        skip_filesystem: false,
    };
    let cache_dir = ctx.repo_root.join(
        cache_opts
            .cache_dir
            .to_str()
            .expect("cache dir is a valid relative path"),
    )?;
    let local_cache = FsCache::new(cache_dir)?;
    let remote = (!cache_opts.skip_remote).then(|| ctx.remote_cache.clone()).flatten();
    let cache = CacheFacade::new(local_cache, remote, cache_opts.remote_cache_read_only);

    let config = Arc::new(ExecutorConfig {
        repo_root: ctx.repo_root.clone(),
        package_manager: ctx.package_manager.clone(),
        global_hash: global_hash.clone(),
        global_env_mode: opts.env_mode,
        global_env: ctx.global_inputs.env.clone(),
        global_pass_through_env: ctx.global_inputs.pass_through_env.clone(),
        output_logs: opts.output_logs,
        force: opts.force,
        no_cache: opts.no_cache,
        single_package: ctx.workspaces.names().count() <= 1,
    });
    let cache = Arc::new(cache);
    let executor = Executor::new(config, cache);

    if opts.dry_run.is_some() {
        let ledger = RunLedger::new();
        let summary = ledger.summary(&engine, &meta);
        return Ok(RunResult { exit_code: 0, summary });
    }

    let scheduler = Scheduler::new(opts.concurrency, opts.continue_on_error);
    let ledger = RunLedger::new();

    let pass_through_args = opts.pass_through_args.clone();
    let events = scheduler
        .run(&engine, |id: TaskId, cancel: tokio::sync::watch::Receiver<bool>| {
            let workspace = ctx
                .workspaces
                .get(&id.package)
                .cloned()
                .expect("scheduler only dispatches tasks whose package exists in the engine");
            let definition = engine
                .definition(&id)
                .cloned()
                .expect("scheduler only dispatches tasks with a recorded definition");
            let task_hash =
                compute_task_hash(&global_hash, ctx, &id, &workspace, &definition, &engine, &pass_through_args)
                    .unwrap_or_else(|_| format!("unhashable-{id}"));
            let pass_through_args = pass_through_args.clone();
            let executor = executor.clone();
            async move {
                executor
                    .execute_task(id, &workspace, &definition, task_hash, &pass_through_args, cancel)
                    .await
            }
        })
        .await;

    ledger.record_all(events);
    let summary = ledger.summary(&engine, &meta);
    Ok(RunResult { exit_code: summary.exit_code(), summary })
}

/// Folds `ctx.global_inputs` (spec.md §4.2's global dependency, env, and
/// dotenv declarations) into the global fingerprint: global dependency globs
/// are scanned the same way a task's own `inputs` are, and global env
/// wildcards are resolved against the host so a changed value — not just a
/// changed declaration — perturbs the hash.
fn compute_global_hash(ctx: &RunContext, opts: &RunOpts) -> Result<(String, GlobalHashable), Error> {
    let files = monotask_scan::scan(&ctx.repo_root, &ctx.global_inputs.dependencies, &[]).unwrap_or_default();
    let global_file_hash_map = files.into_iter().map(|(path, hash)| (path.into_string(), hash)).collect();

    let host = EnvironmentVariableMap::infer();
    let mut resolved = host.from_wildcards(&ctx.global_inputs.env)?;
    resolved.union(&host.from_wildcards(&ctx.global_inputs.pass_through_env)?);
    let resolved_env_vars = resolved.to_hashable();

    let hashable = GlobalHashable {
        global_cache_key: "monotask@1".to_string(),
        global_file_hash_map,
        root_external_deps_hash: String::new(),
        env: ctx.global_inputs.env.clone(),
        resolved_env_vars,
        pass_through_env: ctx.global_inputs.pass_through_env.clone(),
        env_mode: opts.env_mode,
        framework_inference: false,
        dot_env: ctx.global_inputs.dot_env.clone(),
    };
    let hash = hashable.hash()?;
    Ok((hash, hashable))
}

fn compute_task_hash(
    global_hash: &str,
    ctx: &RunContext,
    id: &TaskId,
    workspace: &monotask_graph::Workspace,
    definition: &monotask_graph::PipelineEntry,
    engine: &monotask_graph::Engine<monotask_graph::Built>,
    pass_through_args: &[String],
) -> Result<String, Error> {
    let anchor = ctx.repo_root.resolve(workspace.dir.to_system().expect("workspace dir is valid").as_anchored_path());
    let anchor = AbsoluteSystemPath::from_path(anchor.as_path()).expect("anchor is absolute");
    let files = monotask_scan::scan(anchor, &definition.inputs, &[]).unwrap_or_default();
    let files_hash = monotask_scan::combine_file_hashes(&files);

    let mut dependency_hashes: Vec<String> = engine
        .dependencies(id)
        .into_iter()
        .map(|dep| format!("{dep}"))
        .collect();
    dependency_hashes.sort();

    // Resolved values (not just the declared wildcard names) go into the
    // fingerprint so a changed host value — e.g. `SECRET=xyz` — changes the
    // hash even when `env_mode` is loose.
    let host = EnvironmentVariableMap::infer();
    let mut resolved = host.from_wildcards(&definition.env)?;
    if let Some(pass_through) = &definition.pass_through_env {
        resolved.union(&host.from_wildcards(pass_through)?);
    }
    let resolved_env_vars = resolved.to_hashable();

    let hashable = TaskHashable {
        global_hash: global_hash.to_string(),
        package_dir: workspace.dir.as_str().to_string(),
        files_hash,
        external_deps_hash: workspace.external_deps_hash.clone(),
        task: id.task.clone(),
        env_mode: definition.env_mode,
        outputs: definition.outputs.clone(),
        task_dependency_hashes: dependency_hashes,
        pass_through_args: pass_through_args.to_vec(),
        env: definition.env.clone(),
        pass_through_env: definition.pass_through_env.clone().unwrap_or_default(),
        dot_env: definition.dot_env.iter().map(|p| p.as_str().to_string()).collect(),
        resolved_env_vars,
    };
    Ok(hashable.hash()?)
}
