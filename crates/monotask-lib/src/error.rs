use miette::Diagnostic;

/// The seven closed error kinds of spec.md §7, aggregated at the crate
/// boundary so the `monotask` binary has one type to match on. Each variant
/// wraps a per-crate error; the per-crate types stay the source of truth
/// for their own failure modes.
#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(code(monotask::config))]
    Config(#[from] monotask_graph::GraphError),
    #[error(transparent)]
    #[diagnostic(code(monotask::path))]
    Path(#[from] monotask_path::PathError),
    #[error(transparent)]
    #[diagnostic(code(monotask::io))]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    #[diagnostic(code(monotask::cache))]
    Cache(#[from] monotask_cache::CacheError),
    #[error("task {task} failed: {detail}")]
    #[diagnostic(code(monotask::exec))]
    Exec { task: String, detail: String },
    #[error(transparent)]
    #[diagnostic(code(monotask::env))]
    Env(#[from] monotask_env::EnvError),
    #[error(transparent)]
    #[diagnostic(code(monotask::hash))]
    Hash(#[from] monotask_hash::HashError),
    #[error("run cancelled")]
    #[diagnostic(code(monotask::cancelled))]
    Cancelled,
    #[error("could not locate a package manager binary: {0}")]
    #[diagnostic(code(monotask::config))]
    Which(#[from] which::Error),
}
