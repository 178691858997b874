use std::{
    io::Write,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use console::Style;
use monotask_cache::{CacheFacade, CacheSource};
use monotask_env::{platform::PlatformEnv, EnvironmentVariableMap};
use monotask_graph::{OutputMode, PipelineEntry, TaskId, Workspace};
use monotask_hash::EnvMode;
use monotask_path::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPathBuf};
use monotask_process::{ChildHandle, Command, ShutdownStyle};
use monotask_ui::{replay_log, replays_on_hit, streams_live, PrefixedWriter, StdWriter};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};

use crate::scheduler::{CacheStatus, EnvironmentVariablesSummary, TaskCacheSummary, TaskOutcome, TaskStatus};

/// Per-run parameters constant across every task. Grounded on
/// `turborepo-lib`'s `Visitor`: "this holds the whole world" for execution,
/// minus the fields this crate's reduced scope doesn't need (telemetry,
/// microfrontends, watch mode).
pub struct ExecutorConfig {
    pub repo_root: AbsoluteSystemPathBuf,
    pub package_manager: String,
    pub global_hash: String,
    pub global_env_mode: EnvMode,
    pub global_env: Vec<String>,
    pub global_pass_through_env: Vec<String>,
    pub output_logs: monotask_graph::OutputMode,
    pub force: bool,
    pub no_cache: bool,
    pub single_package: bool,
}

/// Owns its dependencies behind `Arc` rather than borrowing them, so a
/// clone can be moved into the `'static` futures `Scheduler::run` spawns.
#[derive(Clone)]
pub struct Executor {
    config: Arc<ExecutorConfig>,
    cache: Arc<CacheFacade>,
}

impl Executor {
    pub fn new(config: Arc<ExecutorConfig>, cache: Arc<CacheFacade>) -> Self {
        Self { config, cache }
    }

    fn label(&self, id: &TaskId) -> String {
        if self.config.single_package {
            id.task.clone()
        } else {
            id.to_string()
        }
    }

    fn resolved_env_mode(&self, definition: &PipelineEntry) -> EnvMode {
        let mode = if definition.env_mode == EnvMode::Infer {
            self.config.global_env_mode
        } else {
            definition.env_mode
        };
        // Framework-detection-driven infer resolution is out of scope (an
        // injected dependency per spec.md §9); default to the conservative
        // `loose` mode when nothing more specific was configured.
        if mode == EnvMode::Infer {
            EnvMode::Loose
        } else {
            mode
        }
    }

    fn build_env(
        &self,
        definition: &PipelineEntry,
        task_hash: &str,
    ) -> Result<EnvironmentVariableMap, monotask_env::EnvError> {
        let host = EnvironmentVariableMap::infer();
        let mut resolved = match self.resolved_env_mode(definition) {
            EnvMode::Strict => {
                let mut m = host.from_wildcards(&definition.env)?;
                if let Some(pass_through) = &definition.pass_through_env {
                    m.union(&host.from_wildcards(pass_through)?);
                }
                m.union(&host.from_wildcards(PlatformEnv::new().keys())?);
                m
            }
            EnvMode::Loose | EnvMode::Infer => host,
        };
        resolved.insert("TURBO_HASH".to_string(), task_hash.to_string());
        Ok(resolved)
    }

    /// The static, definition-derived portion of a task's run-summary
    /// detail (spec.md §6): known before the task ever spawns, so every
    /// return path — including early failures — can report it consistently.
    fn environment_variables(&self, definition: &PipelineEntry) -> EnvironmentVariablesSummary {
        EnvironmentVariablesSummary {
            configured: definition.env.clone(),
            inferred: Vec::new(),
            global: self.config.global_env.clone(),
            passthrough: definition.pass_through_env.clone().unwrap_or_default(),
            global_passthrough: self.config.global_pass_through_env.clone(),
        }
    }

    /// Runs one task to completion: cache lookup, then (on miss) spawn,
    /// tee, wait, and cache write. Grounded on spec.md §4.7's five steps.
    /// `cancel` flips to `true` once the run has bailed on an earlier
    /// failure (spec.md §4.6); an in-flight child is then shut down
    /// gracefully instead of being allowed to run to completion.
    pub async fn execute_task(
        &self,
        id: TaskId,
        workspace: &Workspace,
        definition: &PipelineEntry,
        task_hash: String,
        pass_through_args: &[String],
        cancel: watch::Receiver<bool>,
    ) -> TaskOutcome {
        let env_mode = self.resolved_env_mode(definition);
        let make_outcome = |status: TaskStatus,
                             exit_code: Option<i32>,
                             error: Option<String>,
                             command: Option<String>,
                             cache: TaskCacheSummary,
                             expanded_outputs: Vec<String>,
                             log_file: String| {
            TaskOutcome {
                status,
                exit_code,
                error,
                command,
                cache,
                expanded_outputs,
                log_file,
                hash: task_hash.clone(),
                hash_of_external_dependencies: workspace.external_deps_hash.clone(),
                inputs: definition.inputs.clone(),
                outputs: definition.outputs.inclusions.clone(),
                excluded_outputs: definition.outputs.exclusions.clone(),
                resolved_task_definition: serde_json::to_value(definition).unwrap_or(serde_json::Value::Null),
                environment_variables: self.environment_variables(definition),
                env_mode,
            }
        };

        let anchor = match self.anchor_for(workspace) {
            Ok(anchor) => anchor,
            Err(err) => {
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some(err.to_string()),
                    None,
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    String::new(),
                )
            }
        };

        let log_path = match anchor.join(&format!(".turbo/turbo-{}.log", id.task)) {
            Ok(path) => path,
            Err(err) => {
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some(err.to_string()),
                    None,
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    String::new(),
                )
            }
        };
        let log_file_name = log_path.as_path().display().to_string();

        if !self.config.force && !self.config.no_cache && definition.cache {
            match self.cache.fetch(&anchor, &task_hash).await {
                Ok(Some((restored, _duration, meta))) => {
                    if replays_on_hit(self.config.output_logs) {
                        let mut out = std::io::stdout();
                        let _ = replay_log(log_path.as_absolute_path(), &mut out);
                    } else if matches!(self.config.output_logs, OutputMode::HashOnly) {
                        println!("{}: cache hit, suppressing logs {task_hash}", self.label(&id));
                    }
                    let cache = TaskCacheSummary {
                        status: CacheStatus::Hit,
                        local: meta.source == CacheSource::Local,
                        remote: meta.source == CacheSource::Remote,
                        time_saved_ms: meta.time_saved_ms,
                    };
                    let expanded_outputs = restored.iter().map(|p| p.as_str().to_string()).collect();
                    return make_outcome(
                        TaskStatus::Cached,
                        Some(0),
                        None,
                        None,
                        cache,
                        expanded_outputs,
                        log_file_name,
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(task = %id, %err, "cache fetch failed, executing instead");
                }
            }
        }

        if matches!(self.config.output_logs, OutputMode::HashOnly) {
            println!("{}: cache miss, executing {task_hash}", self.label(&id));
        }

        let env = match self.build_env(definition, &task_hash) {
            Ok(env) => env,
            Err(err) => {
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some(err.to_string()),
                    None,
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    log_file_name,
                )
            }
        };

        if !workspace.scripts.contains_key(&id.task) {
            return make_outcome(
                TaskStatus::Failed,
                None,
                Some(format!("no script named {} in {}", id.task, id.package)),
                None,
                TaskCacheSummary::miss(),
                Vec::new(),
                log_file_name,
            );
        }

        let mut args = vec!["run".to_string(), id.task.clone()];
        if !pass_through_args.is_empty() {
            args.push("--".to_string());
            args.extend(pass_through_args.iter().cloned());
        }
        let command_line = format!("{} {}", self.config.package_manager, args.join(" "));

        let command = Command::new(self.config.package_manager.clone(), anchor.clone(), self.label(&id))
            .args(args)
            .envs(env.into_inner());

        let mut child = match ChildHandle::spawn(command) {
            Ok(child) => child,
            Err(err) => {
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some(err.to_string()),
                    Some(command_line),
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    log_file_name,
                )
            }
        };

        let log_file = match std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_path.as_path())
            .or_else(|_| {
                if let Some(parent) = log_path.as_path().parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(log_path.as_path())
            }) {
            Ok(file) => Arc::new(Mutex::new(file)),
            Err(err) => {
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some(err.to_string()),
                    Some(command_line),
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    log_file_name,
                )
            }
        };

        let live = streams_live(self.config.output_logs);
        let prefix = format!("{}: ", self.label(&id));
        let stdout = child.stdout();
        let stderr = child.stderr();
        let started = Instant::now();

        let out_log = log_file.clone();
        let out_prefix = prefix.clone();
        let out_handle = tokio::spawn(async move {
            tee(stdout, out_log, live.then(|| PrefixedWriter::new(Style::new(), out_prefix, StdWriter::stdout())))
                .await
        });
        let err_log = log_file.clone();
        let err_prefix = prefix.clone();
        let err_handle = tokio::spawn(async move {
            tee(stderr, err_log, live.then(|| PrefixedWriter::new(Style::new(), err_prefix, StdWriter::stderr())))
                .await
        });

        let wait_result = tokio::select! {
            result = child.wait() => result,
            _ = wait_for_cancel(cancel) => {
                child.shutdown(ShutdownStyle::Graceful(Duration::from_secs(5))).await;
                let _ = out_handle.await;
                let _ = err_handle.await;
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some("cancelled: run stopped after an earlier failure".to_string()),
                    Some(command_line),
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    log_file_name,
                );
            }
        };
        let _ = out_handle.await;
        let _ = err_handle.await;
        let duration = started.elapsed();

        let exit_code = match wait_result {
            Ok(code) => code,
            Err(err) => {
                return make_outcome(
                    TaskStatus::Failed,
                    None,
                    Some(err.to_string()),
                    Some(command_line),
                    TaskCacheSummary::miss(),
                    Vec::new(),
                    log_file_name,
                )
            }
        };

        let succeeded = exit_code == Some(0);
        if !succeeded && monotask_ui::replays_on_failure(self.config.output_logs) && !live {
            let mut out = std::io::stdout();
            let _ = replay_log(log_path.as_absolute_path(), &mut out);
        }

        let mut expanded_outputs = Vec::new();
        if succeeded && definition.cache && !self.config.no_cache {
            if let Ok(outputs) = self.collect_outputs(&anchor, definition) {
                expanded_outputs = outputs.iter().map(|p| p.as_str().to_string()).collect();
                if let Err(err) = self.cache.put(&anchor, &task_hash, &outputs, duration.as_millis() as u32).await {
                    tracing::warn!(task = %id, %err, "cache write failed");
                }
            }
        }

        make_outcome(
            if succeeded { TaskStatus::Built } else { TaskStatus::Failed },
            exit_code,
            (!succeeded).then(|| format!("exited with {exit_code:?}")),
            Some(command_line),
            TaskCacheSummary::miss(),
            expanded_outputs,
            log_file_name,
        )
    }

    fn anchor_for(&self, workspace: &Workspace) -> Result<AbsoluteSystemPathBuf, monotask_path::PathError> {
        let anchored = workspace.dir.to_system()?;
        Ok(self.config.repo_root.resolve(anchored.as_anchored_path()))
    }

    /// Expands a task's declared output globs under its package directory.
    /// A real implementation walks the filesystem against
    /// `definition.outputs`; this crate reuses [`monotask_scan::scan`] with
    /// the output globs as the include set, since both operations are
    /// "match globs rooted at a package directory".
    fn collect_outputs(
        &self,
        anchor: &AbsoluteSystemPath,
        definition: &PipelineEntry,
    ) -> Result<Vec<AnchoredSystemPathBuf>, monotask_scan::ScanError> {
        let found = monotask_scan::scan(anchor, &definition.outputs.inclusions, &definition.outputs.exclusions)?;
        found
            .into_iter()
            .map(|(unix, _hash)| unix.to_system())
            .collect::<Result<Vec<_>, _>>()
            .map_err(monotask_scan::ScanError::from)
    }
}

/// Resolves once `cancel` carries `true`, whether that happened before this
/// call started (already-cancelled) or arrives while it's waiting.
async fn wait_for_cancel(mut cancel: watch::Receiver<bool>) {
    if *cancel.borrow() {
        return;
    }
    while cancel.changed().await.is_ok() {
        if *cancel.borrow() {
            return;
        }
    }
}

async fn tee<R>(
    reader: R,
    log: Arc<Mutex<std::fs::File>>,
    mut terminal: Option<PrefixedWriter<StdWriter>>,
) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        {
            let mut file = log.lock().expect("log file mutex poisoned");
            writeln!(file, "{line}")?;
        }
        if let Some(writer) = terminal.as_mut() {
            writeln!(writer, "{line}")?;
            writer.flush()?;
        }
    }
    Ok(())
}
