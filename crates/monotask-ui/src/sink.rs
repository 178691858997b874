use std::{
    io::{self, Write},
    sync::{Arc, Mutex},
};

/// Whether an [`OutputClient`]'s writes land on the shared sink immediately,
/// or get buffered and flushed as one contiguous block on `finish()`.
/// Grouped output is what keeps two tasks' concurrently streamed logs from
/// interleaving line-by-line on a shared terminal. Grounded on
/// `turborepo-ui`'s `OutputSink`/`OutputClientBehavior` (only its test,
/// `turborepo-ui/tests/threads.rs`, survives in the retrieved sources).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputClientBehavior {
    Grouped,
    Passthrough,
}

/// Shared endpoint for stdout/stderr that any number of [`OutputClient`]s
/// can log against concurrently.
pub struct OutputSink<W> {
    out: Arc<Mutex<W>>,
    err: Arc<Mutex<W>>,
}

impl<W: Write + Send + 'static> OutputSink<W> {
    pub fn new(out: W, err: W) -> Self {
        Self { out: Arc::new(Mutex::new(out)), err: Arc::new(Mutex::new(err)) }
    }

    pub fn logger(&self, behavior: OutputClientBehavior) -> OutputClient<W> {
        OutputClient {
            behavior,
            out: Arc::clone(&self.out),
            err: Arc::clone(&self.err),
            out_buffer: Mutex::new(Vec::new()),
            err_buffer: Mutex::new(Vec::new()),
        }
    }
}

pub struct OutputClient<W> {
    behavior: OutputClientBehavior,
    out: Arc<Mutex<W>>,
    err: Arc<Mutex<W>>,
    out_buffer: Mutex<Vec<u8>>,
    err_buffer: Mutex<Vec<u8>>,
}

impl<W: Write> OutputClient<W> {
    pub fn stdout(&self) -> ClientWriter<'_, W> {
        ClientWriter { client: self, stream: Stream::Out }
    }

    pub fn stderr(&self) -> ClientWriter<'_, W> {
        ClientWriter { client: self, stream: Stream::Err }
    }

    /// Flushes any buffered (grouped) output as one block. A no-op in
    /// passthrough mode, where every write already landed on the shared
    /// sink.
    pub fn finish(self) -> io::Result<()> {
        if self.behavior == OutputClientBehavior::Grouped {
            let out_buffer = self.out_buffer.into_inner().unwrap();
            if !out_buffer.is_empty() {
                self.out.lock().unwrap().write_all(&out_buffer)?;
            }
            let err_buffer = self.err_buffer.into_inner().unwrap();
            if !err_buffer.is_empty() {
                self.err.lock().unwrap().write_all(&err_buffer)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Out,
    Err,
}

pub struct ClientWriter<'a, W> {
    client: &'a OutputClient<W>,
    stream: Stream,
}

impl<W: Write> Write for ClientWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.client.behavior {
            OutputClientBehavior::Grouped => {
                let buffer = match self.stream {
                    Stream::Out => &self.client.out_buffer,
                    Stream::Err => &self.client.err_buffer,
                };
                buffer.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            OutputClientBehavior::Passthrough => {
                let sink = match self.stream {
                    Stream::Out => &self.client.out,
                    Stream::Err => &self.client.err,
                };
                sink.lock().unwrap().write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.client.behavior == OutputClientBehavior::Passthrough {
            let sink = match self.stream {
                Stream::Out => &self.client.out,
                Stream::Err => &self.client.err,
            };
            sink.lock().unwrap().flush()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouped_output_is_held_until_finish() {
        let sink = OutputSink::new(Vec::new(), Vec::new());
        let client = sink.logger(OutputClientBehavior::Grouped);
        write!(client.stdout(), "partial").unwrap();
        assert!(sink.out.lock().unwrap().is_empty());
        client.finish().unwrap();
        assert_eq!(sink.out.lock().unwrap().as_slice(), b"partial");
    }

    #[test]
    fn passthrough_output_lands_immediately() {
        let sink = OutputSink::new(Vec::new(), Vec::new());
        let client = sink.logger(OutputClientBehavior::Passthrough);
        write!(client.stdout(), "now").unwrap();
        assert_eq!(sink.out.lock().unwrap().as_slice(), b"now");
    }
}
