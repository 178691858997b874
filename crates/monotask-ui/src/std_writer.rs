use std::io::{self, Write};

/// A uniform handle over stdout, stderr, or a null sink, so callers that
/// need "a writer" don't have to reach for `Box<dyn Write>`. Grounded on
/// `turborepo-lib/src/task_graph/visitor/output.rs::StdWriter`.
pub enum StdWriter {
    Out(io::Stdout),
    Err(io::Stderr),
    Null(io::Sink),
}

impl StdWriter {
    pub fn stdout() -> Self {
        Self::Out(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::Err(io::stderr())
    }

    pub fn null() -> Self {
        Self::Null(io::sink())
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Out(w) => w,
            Self::Err(w) => w,
            Self::Null(w) => w,
        }
    }
}

impl Write for StdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer().flush()
    }
}
