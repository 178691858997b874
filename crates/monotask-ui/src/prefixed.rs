use std::io::{self, Write};

use console::Style;

/// Writes each line it receives through with `prefix` prepended, so
/// interleaved task output stays attributable to `package:task`. Lines are
/// buffered until a `\n` is seen, so a partial write never emits a bare
/// prefix with no content (spec.md §4.7: "each line is atomic").
pub struct PrefixedWriter<W> {
    prefix: String,
    style: Style,
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> PrefixedWriter<W> {
    pub fn new(style: Style, prefix: impl Into<String>, writer: W) -> Self {
        Self { prefix: prefix.into(), style, writer, buffer: Vec::new() }
    }

    fn emit_line(&mut self, line: &[u8]) -> io::Result<()> {
        if !line.is_empty() {
            write!(self.writer, "{}", self.style.apply_to(&self.prefix))?;
        }
        self.writer.write_all(line)
    }
}

impl<W: Write> Write for PrefixedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.emit_line(&line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.emit_line(&line)?;
        }
        self.writer.flush()
    }
}

impl<W> Drop for PrefixedWriter<W> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(prefix = %self.prefix, "prefixed writer dropped with an unterminated line");
        }
    }
}

/// Pairs a prefixed stdout/stderr writer with a couple of one-shot
/// informational lines (cache status, warnings) that aren't part of a
/// task's own output stream. Grounded on
/// `turborepo-lib/src/task_graph/visitor/output.rs`'s use of `PrefixedUI`
/// around a `TaskCacheOutput`.
pub struct PrefixedUI<W> {
    out: W,
    err: W,
    output_prefix: Option<String>,
    warn_prefix: Option<String>,
}

impl<W: Write> PrefixedUI<W> {
    pub fn new(out: W, err: W) -> Self {
        Self { out, err, output_prefix: None, warn_prefix: None }
    }

    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = Some(prefix.into());
        self
    }

    pub fn with_warn_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.warn_prefix = Some(prefix.into());
        self
    }

    pub fn output(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        if let Some(prefix) = &self.output_prefix {
            write!(self.out, "{prefix}")?;
        }
        writeln!(self.out, "{}", message.as_ref())
    }

    pub fn warn(&mut self, message: impl AsRef<str>) -> io::Result<()> {
        if let Some(prefix) = &self.warn_prefix {
            write!(self.err, "{prefix}")?;
        }
        writeln!(self.err, "{}", message.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_until_newline() {
        let mut out = Vec::new();
        let mut writer = PrefixedWriter::new(Style::new(), "pkg:build: ", &mut out);
        writer.write_all(b"hel").unwrap();
        writer.write_all(b"lo\nworld").unwrap();
        writer.flush().unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "pkg:build: hello\npkg:build: world"
        );
    }

    #[test]
    fn prefixed_ui_writes_prefix_then_message() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let mut ui = PrefixedUI::new(&mut out, &mut err).with_output_prefix(">> ");
        ui.output("ready").unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ">> ready\n");
    }
}
