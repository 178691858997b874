//! Prefixed, line-buffered task output and log tee-ing — C7's UI half.
//!
//! Grounded on `turborepo-lib/src/task_graph/visitor/output.rs`'s
//! `TaskOutput`/`TaskCacheOutput`/`StdWriter` enums and on
//! `turborepo-ui/tests/threads.rs`, the only surviving source for
//! `turborepo-ui`'s own `OutputSink`/`OutputClient`/`PrefixedUI` API (its
//! `src/` was not retrieved). `OutputSink` hands out per-task
//! [`OutputClient`]s that either stream straight through to a shared
//! stdout/stderr or buffer and flush atomically on `finish()`, so
//! concurrently running tasks don't interleave mid-line.

mod error;
mod log;
mod mode;
mod prefixed;
mod sink;
mod std_writer;

pub use error::UiError;
pub use log::LogWriter;
pub use mode::{replay_log, replays_on_failure, replays_on_hit, streams_live};
pub use prefixed::{PrefixedUI, PrefixedWriter};
pub use sink::{ClientWriter, OutputClient, OutputClientBehavior, OutputSink};
pub use std_writer::StdWriter;
