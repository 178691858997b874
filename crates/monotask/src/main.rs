//! `monotask` binary: a thin `clap` CLI over `monotask-lib`. Grounded on
//! `turborepo-lib/src/cli.rs`'s parse-then-dispatch shape and its
//! `process::exit` convention for surfacing the run's exit code.
//!
//! Workspace discovery (finding packages, their scripts, their lockfile-
//! derived dependency hashes) is out of scope per spec.md §1 — it is the
//! kind of external, package-manager-specific integration the core treats
//! as an injected dependency. This binary bootstraps the minimum viable
//! single-package context so the core is actually runnable end to end: the
//! current directory is the one workspace, its `package.json` `scripts`
//! map is read directly (the same "minimal serde decode, no schema
//! validation" spirit as `PipelineFile`), and the package manager binary is
//! located with `which`.

use std::{collections::HashMap, process::ExitCode};

use clap::Parser;
use miette::Result;
use monotask_graph::{Pipeline, Workspace, WorkspaceGraph, WorkspaceName};
use monotask_lib::{GlobalInputs, PipelineFile, RunArgs, RunContext, RunOpts};
use monotask_path::{AbsoluteSystemPathBuf, AnchoredUnixPathBuf};

const PIPELINE_FILE_NAME: &str = "monotask.json";
const PACKAGE_MANIFEST_NAME: &str = "package.json";

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("MONOTASK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(serde::Deserialize, Default)]
struct PackageManifest {
    #[serde(default)]
    scripts: HashMap<String, String>,
}

fn read_pipeline(repo_root: &AbsoluteSystemPathBuf) -> (Pipeline, GlobalInputs) {
    let path = repo_root.as_path().join(PIPELINE_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => match PipelineFile::parse(&contents) {
            Ok(file) => {
                let globals = file.global_inputs();
                (file.into_pipeline(), globals)
            }
            Err(err) => {
                tracing::warn!(%err, path = %path.display(), "failed to parse pipeline file, running with an empty pipeline");
                (Pipeline::default(), GlobalInputs::default())
            }
        },
        Err(_) => {
            tracing::debug!(path = %path.display(), "no pipeline file found, running with an empty pipeline");
            (Pipeline::default(), GlobalInputs::default())
        }
    }
}

fn read_single_package_workspace(repo_root: &AbsoluteSystemPathBuf) -> Workspace {
    let path = repo_root.as_path().join(PACKAGE_MANIFEST_NAME);
    let manifest: PackageManifest = std::fs::read_to_string(&path)
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_default();

    Workspace {
        name: WorkspaceName::from("."),
        dir: AnchoredUnixPathBuf::new("").expect("empty anchored path is valid"),
        scripts: manifest.scripts,
        internal_deps: Default::default(),
        external_deps_hash: "single-package".to_string(),
    }
}

fn locate_package_manager() -> Result<String, monotask_lib::Error> {
    for candidate in ["pnpm", "yarn", "npm"] {
        if which::which(candidate).is_ok() {
            return Ok(candidate.to_string());
        }
    }
    Err(monotask_lib::Error::Which(which::which("npm").unwrap_err()))
}

async fn run() -> miette::Result<ExitCode> {
    let args = RunArgs::parse();
    let opts = RunOpts::from(args);

    let repo_root = AbsoluteSystemPathBuf::from_cwd().map_err(monotask_lib::Error::Io)?;
    let (pipeline, global_inputs) = read_pipeline(&repo_root);
    let workspace = read_single_package_workspace(&repo_root);
    let package_manager = locate_package_manager()?;

    let ctx = RunContext {
        repo_root,
        workspaces: WorkspaceGraph::new([workspace]),
        pipeline,
        global_inputs,
        package_manager,
        remote_cache: None,
    };

    let result = monotask_lib::run(&ctx, &opts).await?;

    match opts.dry_run {
        Some(monotask_lib::DryRunMode::Json) => {
            println!("{}", serde_json::to_string_pretty(&result.summary.to_json()).expect("summary serializes"));
        }
        Some(monotask_lib::DryRunMode::Text) => print!("{}", result.summary.to_text()),
        None => {
            if opts.summarize {
                println!("{}", serde_json::to_string_pretty(&result.summary.to_json()).expect("summary serializes"));
            } else {
                print!("{}", result.summary.to_text());
            }
        }
    }

    Ok(ExitCode::from(result.exit_code.clamp(0, 255) as u8))
}

fn main() -> ExitCode {
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().expect("failed to start the async runtime");
    match runtime.block_on(run()) {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}
