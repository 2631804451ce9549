//! Output sinks for formatted log lines.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination of formatted log lines.
///
/// The poller calls [`append`](Sink::append) once per record with the complete
/// line, trailing newline included. An implementation must either write all of
/// it or return an error.
pub trait Sink: Send {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Bytes accepted by `append` so far.
    fn written_bytes(&self) -> u64;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).append(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn written_bytes(&self) -> u64 {
        (**self).written_bytes()
    }
}

/// Append-only file behind a 64 KiB buffer.
pub struct FileAppender {
    writer: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

impl FileAppender {
    pub const BUFFER_SIZE: usize = 64 * 1024;

    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(Self::BUFFER_SIZE, file),
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for FileAppender {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn written_bytes(&self) -> u64 {
        self.written
    }
}

impl Drop for FileAppender {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            tracing::error!(path = %self.path.display(), error = %err, "failed to flush log file");
        }
    }
}

/// Standard output, used when no file is configured.
#[derive(Debug, Default)]
pub struct ConsoleSink {
    written: u64,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for ConsoleSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }

    fn written_bytes(&self) -> u64 {
        self.written
    }
}
