//! Output collection
//!
//! Each task's stdout and stderr are drained by an [`OutputSink`] that forwards
//! bytes unchanged, prefixes every line with the task's label, or discards them.
//! All writes to the shared streams go through [`OutputStream`], whose lock is the
//! only serialization point between concurrently running tasks.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use colored::*;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::policy::RunPolicy;
use crate::tasks::{get_task_color, TaskSpec};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// A cloneable handle to a shared output stream
#[derive(Clone)]
pub struct OutputStream {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl OutputStream {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }

    /// An in-memory stream together with a handle to read back what was written
    pub fn memory() -> (Self, MemoryBuffer) {
        let buffer = MemoryBuffer::default();
        (Self::new(buffer.clone()), buffer)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write_all(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.lock();
        writer.write_all(bytes)?;
        writer.flush()
    }

    /// Write complete lines, each preceded by `label`, without letting another
    /// writer in between them
    pub fn write_labeled_lines<'a>(
        &self,
        label: &str,
        lines: impl IntoIterator<Item = &'a [u8]>,
    ) -> io::Result<()> {
        let mut writer = self.lock();
        for line in lines {
            writer.write_all(label.as_bytes())?;
            writer.write_all(line)?;
            if !line.ends_with(b"\n") {
                writer.write_all(b"\n")?;
            }
        }
        writer.flush()
    }
}

/// Shared byte buffer backing [`OutputStream::memory`]
#[derive(Clone, Default)]
pub struct MemoryBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemoryBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Splits a byte stream into `\n`-terminated lines, holding back a trailing
/// partial line until more data or the end of input arrives
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Feed a chunk and take every line it completes (terminators included)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split_inclusive(|&b| b == b'\n')
            .map(<[u8]>::to_vec)
            .collect()
    }

    /// Take the unterminated remainder, if any
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Where one of a task's output pipes goes
pub enum OutputSink {
    /// Silent mode: drained, never forwarded
    Discard,
    PassThrough(OutputStream),
    Labeled { stream: OutputStream, label: String },
}

impl OutputSink {
    pub fn for_task(
        task: &TaskSpec,
        policy: &RunPolicy,
        stream: &OutputStream,
        label_width: usize,
        colorize: bool,
    ) -> Self {
        if policy.silent {
            return Self::Discard;
        }
        if !policy.print_label {
            return Self::PassThrough(stream.clone());
        }

        let tag = format!("[{:<width$}]", task.name, width = label_width);
        let label = if colorize {
            format!("{} ", tag.color(get_task_color(&task.name)))
        } else {
            format!("{} ", tag)
        };
        Self::Labeled {
            stream: stream.clone(),
            label,
        }
    }

    /// Drain `reader` to end of input, forwarding according to this sink.
    ///
    /// Write failures on the shared stream stop forwarding but never stop
    /// draining, so the child is not blocked on a full pipe.
    pub async fn collect<R>(self, mut reader: R) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        let mut splitter = LineSplitter::default();
        let mut forwarding = !matches!(self, Self::Discard);

        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            if !forwarding {
                continue;
            }

            let chunk = &buffer[..read];
            let written = match &self {
                Self::Discard => Ok(()),
                Self::PassThrough(stream) => stream.write_all(chunk),
                Self::Labeled { stream, label } => {
                    let lines = splitter.push(chunk);
                    stream.write_labeled_lines(label, lines.iter().map(Vec::as_slice))
                }
            };
            if let Err(e) = written {
                debug!(error = %e, "output stream closed, discarding remaining output");
                forwarding = false;
            }
        }

        if let (true, Self::Labeled { stream, label }) = (forwarding, &self) {
            if let Some(rest) = splitter.finish() {
                stream.write_labeled_lines(label, [rest.as_slice()])?;
            }
        }

        Ok(())
    }
}
