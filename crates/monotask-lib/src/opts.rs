use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use monotask_graph::OutputMode;
use monotask_hash::EnvMode as HashEnvMode;

/// `--dry-run` / `--dry-run=json` (spec.md §6).
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum DryRunMode {
    Text,
    Json,
}

/// CLI-facing mirror of [`monotask_graph::OutputMode`]. Kept separate so
/// `monotask-graph` doesn't need a `clap` dependency just for its pipeline
/// schema type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputLogsMode {
    Full,
    HashOnly,
    ErrorsOnly,
    None,
}

impl From<OutputLogsMode> for OutputMode {
    fn from(mode: OutputLogsMode) -> Self {
        match mode {
            OutputLogsMode::Full => OutputMode::Full,
            OutputLogsMode::HashOnly => OutputMode::HashOnly,
            OutputLogsMode::ErrorsOnly => OutputMode::ErrorsOnly,
            OutputLogsMode::None => OutputMode::None,
        }
    }
}

/// CLI-facing mirror of [`monotask_hash::EnvMode`], for the same reason.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EnvMode {
    Infer,
    Loose,
    Strict,
}

impl From<EnvMode> for HashEnvMode {
    fn from(mode: EnvMode) -> Self {
        match mode {
            EnvMode::Infer => HashEnvMode::Infer,
            EnvMode::Loose => HashEnvMode::Loose,
            EnvMode::Strict => HashEnvMode::Strict,
        }
    }
}

/// Parsed CLI surface for `monotask run <task>...`. Grounded on
/// `turborepo-lib/src/cli.rs`'s `clap::Parser` idiom, reduced to exactly the
/// flags spec.md §6 names; flag *parsing correctness* beyond this minimal
/// surface is explicitly not a goal (spec.md §1).
#[derive(Parser, Clone, Debug)]
#[command(name = "monotask", about = "Run monorepo tasks", long_about = None)]
pub struct RunArgs {
    /// Task names to run, e.g. `build test`.
    pub tasks: Vec<String>,

    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filter: Vec<String>,

    #[arg(long)]
    pub scope: Vec<String>,

    #[arg(long)]
    pub since: Option<String>,

    #[arg(long)]
    pub ignore: Vec<String>,

    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,

    #[arg(long)]
    pub parallel: bool,

    #[arg(long = "continue")]
    pub continue_on_error: bool,

    #[arg(long)]
    pub only: bool,

    #[arg(long)]
    pub force: bool,

    #[arg(long = "no-cache")]
    pub no_cache: bool,

    #[arg(long = "cache-dir", default_value = ".turbo/cache")]
    pub cache_dir: PathBuf,

    #[arg(long = "dry-run", value_enum, num_args = 0..=1, default_missing_value = "text")]
    pub dry_run: Option<DryRunMode>,

    #[arg(long)]
    pub graph: Option<Option<PathBuf>>,

    #[arg(long)]
    pub summarize: bool,

    #[arg(long = "output-logs", value_enum, default_value = "full")]
    pub output_logs: OutputLogsMode,

    #[arg(long = "env-mode", value_enum, default_value = "infer")]
    pub env_mode: EnvMode,

    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Everything after `--`.
    #[arg(last = true)]
    pub pass_through_args: Vec<String>,
}

/// The fully resolved options the scheduler and executor consume. Separate
/// from [`RunArgs`] so library callers can build one directly without going
/// through `clap` at all (spec.md §10.3: "constructed either
/// programmatically ... or via a thin CLI").
#[derive(Clone, Debug)]
pub struct RunOpts {
    pub tasks: Vec<String>,
    pub filter: Vec<String>,
    pub scope: Vec<String>,
    pub since: Option<String>,
    pub ignore: Vec<String>,
    pub concurrency: usize,
    pub parallel: bool,
    pub continue_on_error: bool,
    pub only: bool,
    pub force: bool,
    pub no_cache: bool,
    pub cache_dir: PathBuf,
    pub dry_run: Option<DryRunMode>,
    pub graph: Option<Option<PathBuf>>,
    pub summarize: bool,
    pub output_logs: OutputMode,
    pub env_mode: HashEnvMode,
    pub profile: Option<PathBuf>,
    pub pass_through_args: Vec<String>,
}

impl From<RunArgs> for RunOpts {
    fn from(args: RunArgs) -> Self {
        Self {
            tasks: args.tasks,
            filter: args.filter,
            scope: args.scope,
            since: args.since,
            ignore: args.ignore,
            concurrency: args.concurrency.max(1),
            parallel: args.parallel,
            continue_on_error: args.continue_on_error,
            only: args.only,
            force: args.force,
            no_cache: args.no_cache,
            cache_dir: args.cache_dir,
            dry_run: args.dry_run,
            graph: args.graph,
            summarize: args.summarize,
            output_logs: args.output_logs.into(),
            env_mode: args.env_mode.into(),
            profile: args.profile,
            pass_through_args: args.pass_through_args,
        }
    }
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            filter: Vec::new(),
            scope: Vec::new(),
            since: None,
            ignore: Vec::new(),
            concurrency: 10,
            parallel: false,
            continue_on_error: false,
            only: false,
            force: false,
            no_cache: false,
            cache_dir: PathBuf::from(".turbo/cache"),
            dry_run: None,
            graph: None,
            summarize: false,
            output_logs: OutputMode::Full,
            env_mode: HashEnvMode::Infer,
            profile: None,
            pass_through_args: Vec::new(),
        }
    }
}
