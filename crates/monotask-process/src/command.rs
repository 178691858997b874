use monotask_path::AbsoluteSystemPathBuf;

/// A process to spawn: resolved program, arguments, working directory, and
/// environment. Grounded on `turborepo-process`'s `Command` (the concrete
/// type is not in the retrieved sources; shape inferred from its usage in
/// `ChildHandle::spawn_normal`, which consumes it via `TokioCommand::from`).
#[derive(Debug, Clone)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: AbsoluteSystemPathBuf,
    pub env: Vec<(String, String)>,
    /// `package:task` label used to prefix interleaved log lines (spec.md
    /// §4.7/§5).
    pub label: String,
}

impl Command {
    pub fn new(
        program: impl Into<String>,
        cwd: AbsoluteSystemPathBuf,
        label: impl Into<String>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd,
            env: Vec::new(),
            label: label.into(),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }
}

impl From<Command> for tokio::process::Command {
    fn from(command: Command) -> Self {
        let mut tokio_command = tokio::process::Command::new(&command.program);
        tokio_command
            .args(&command.args)
            .current_dir(command.cwd.as_path())
            .env_clear()
            .envs(command.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        tokio_command
    }
}
