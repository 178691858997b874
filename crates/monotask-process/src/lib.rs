//! Process spawn and shutdown primitives (C7's low-level half).
//!
//! Grounded on `turborepo-process/src/child.rs`: a process-group-isolated
//! child (unix `setsid` in `pre_exec`) with a graceful-then-kill shutdown
//! sequence. The teacher's dual pty/non-pty spawn path and actor-model
//! `Child`/`ChildCommandChannel` message loop are not reproduced here — this
//! crate only spawns plain piped children, since spec.md's C7 has no
//! interactive-terminal requirement; command resolution, environment
//! construction, and log tee-ing (the rest of C7) live in
//! `monotask-lib::executor`, which composes this crate with
//! `monotask-env`/`monotask-ui`.

mod child;
mod command;

pub use child::{ChildExit, ChildHandle, ShutdownStyle};
pub use command::Command;
