use std::{
    fs::File,
    io::{self, Write},
};

use monotask_path::AbsoluteSystemPath;

use crate::UiError;

/// Tees everything written to it into a task's on-disk log file and a
/// prefixed terminal writer, so a cache-hit replay later can reproduce
/// exactly what streamed live. Grounded on
/// `turborepo-lib/src/task_graph/visitor/output.rs`'s `TaskOutput::Direct`
/// path, which wraps an `OutputClient` writer around the log file.
pub struct LogWriter<W> {
    log_file: Option<File>,
    sink: Option<W>,
}

impl<W> Default for LogWriter<W> {
    fn default() -> Self {
        Self { log_file: None, sink: None }
    }
}

impl<W: Write> LogWriter<W> {
    pub fn with_log_file(mut self, path: &AbsoluteSystemPath) -> Result<Self, UiError> {
        if let Some(parent) = path.as_path().parent() {
            std::fs::create_dir_all(parent).map_err(UiError::Io)?;
        }
        let file = File::create(path.as_path()).map_err(UiError::Io)?;
        self.log_file = Some(file);
        Ok(self)
    }

    pub fn with_sink(mut self, sink: W) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl<W: Write> Write for LogWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &mut self.log_file {
            file.write_all(buf)?;
        }
        if let Some(sink) = &mut self.sink {
            sink.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &mut self.log_file {
            file.flush()?;
        }
        if let Some(sink) = &mut self.sink {
            sink.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use monotask_path::AbsoluteSystemPathBuf;

    use super::*;

    #[test]
    fn tees_to_file_and_sink() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = AbsoluteSystemPathBuf::new(dir.path().join("turbo-build.log")).unwrap();
        let mut sink = Vec::new();
        {
            let mut writer = LogWriter::default()
                .with_log_file(&log_path)
                .unwrap()
                .with_sink(&mut sink);
            writer.write_all(b"building\n").unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(sink, b"building\n");
        let contents = std::fs::read(log_path.as_path()).unwrap();
        assert_eq!(contents, b"building\n");
    }
}
