use std::{io, time::Duration};

use tracing::debug;

use crate::command::Command;

/// How a child process terminated. Grounded on
/// `turborepo-process/src/child.rs::ChildExit`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChildExit {
    Finished(Option<i32>),
    /// Terminated on a graceful shutdown signal before the timeout elapsed.
    Interrupted,
    /// Killed, either explicitly or after a graceful shutdown timed out.
    Killed,
    Failed,
}

/// How to stop a running child. Grounded on
/// `turborepo-process/src/child.rs::ShutdownStyle`.
#[derive(Debug, Clone, Copy)]
pub enum ShutdownStyle {
    /// POSIX: send SIGINT to the child's process group, then escalate to
    /// `Kill` if it hasn't exited within the timeout. No graceful signal on
    /// Windows; this degrades to an immediate kill there.
    Graceful(Duration),
    Kill,
}

/// A spawned child process, its own process group on unix so a shutdown
/// signal reaches anything it forked. Grounded on
/// `turborepo-process/src/child.rs::ChildHandle::spawn_normal`.
pub struct ChildHandle {
    pid: Option<u32>,
    child: tokio::process::Child,
}

impl ChildHandle {
    #[tracing::instrument(skip(command), fields(label = %command.label))]
    pub fn spawn(command: Command) -> io::Result<Self> {
        let mut tokio_command = tokio::process::Command::from(command);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            use nix::unistd::setsid;
            unsafe {
                tokio_command.pre_exec(|| {
                    setsid()?;
                    Ok(())
                });
            }
        }

        let child = tokio_command.spawn()?;
        let pid = child.id();
        Ok(Self { pid, child })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn stdout(&mut self) -> tokio::process::ChildStdout {
        self.child.stdout.take().expect("spawned with piped stdout")
    }

    pub fn stderr(&mut self) -> tokio::process::ChildStderr {
        self.child.stderr.take().expect("spawned with piped stderr")
    }

    pub async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.child.wait().await.map(|status| status.code())
    }

    pub async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    /// Applies `style`, returning the terminal [`ChildExit`]. Grounded on
    /// `ShutdownStyle::process`: `Graceful` signals the process group (not
    /// just the child) so descendants get the signal too.
    pub async fn shutdown(&mut self, style: ShutdownStyle) -> ChildExit {
        match style {
            ShutdownStyle::Graceful(timeout) => self.shutdown_gracefully(timeout).await,
            ShutdownStyle::Kill => match self.kill().await {
                Ok(()) => ChildExit::Killed,
                Err(_) => ChildExit::Failed,
            },
        }
    }

    #[cfg(unix)]
    async fn shutdown_gracefully(&mut self, timeout: Duration) -> ChildExit {
        let Some(pid) = self.pid() else {
            return ChildExit::Interrupted;
        };
        let pgid = nix::unistd::Pid::from_raw(-(pid as i32));
        debug!(pid, "sending SIGINT to child process group");
        if let Err(err) = nix::sys::signal::kill(pgid, nix::sys::signal::Signal::SIGINT) {
            debug!(pid, %err, "failed to signal child process group");
        }

        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(Ok(_)) => ChildExit::Interrupted,
            Ok(Err(_)) => ChildExit::Failed,
            Err(_) => {
                debug!(pid, "graceful shutdown timed out, killing");
                match self.kill().await {
                    Ok(()) => ChildExit::Killed,
                    Err(_) => ChildExit::Failed,
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn shutdown_gracefully(&mut self, _timeout: Duration) -> ChildExit {
        match self.kill().await {
            Ok(()) => ChildExit::Killed,
            Err(_) => ChildExit::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use monotask_path::AbsoluteSystemPathBuf;

    use super::*;

    fn cwd() -> AbsoluteSystemPathBuf {
        AbsoluteSystemPathBuf::new(std::env::temp_dir()).unwrap()
    }

    #[tokio::test]
    async fn successful_exit_reports_zero() {
        let command = Command::new("true", cwd(), "pkg:build");
        let mut child = ChildHandle::spawn(command).unwrap();
        let code = child.wait().await.unwrap();
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let command = Command::new("false", cwd(), "pkg:build");
        let mut child = ChildHandle::spawn(command).unwrap();
        let code = child.wait().await.unwrap();
        assert_eq!(code, Some(1));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn kill_terminates_a_long_running_child() {
        let command = Command::new("sleep", cwd(), "pkg:dev").args(["30".to_string()]);
        let mut child = ChildHandle::spawn(command).unwrap();
        let exit = child.shutdown(ShutdownStyle::Kill).await;
        assert_eq!(exit, ChildExit::Killed);
    }
}
