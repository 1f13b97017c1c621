//! Log output destinations
//!
//! A sink receives fully formatted lines. File-backed sinks can hand out an
//! independent handle to the same path so a temporary attachment never shares
//! a descriptor (or its rotation state) with the sink it was cloned from.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};

/// Where a sink's lines end up
///
/// Used to avoid writing one event twice to the same place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SinkDestination {
    Console,
    File(PathBuf),
    Memory(String),
}

impl fmt::Display for SinkDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => write!(f, "console"),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Memory(name) => write!(f, "memory:{}", name),
        }
    }
}

/// A destination for formatted log lines
pub trait LogSink: Send + Sync + fmt::Debug {
    fn destination(&self) -> &SinkDestination;

    fn write_line(&self, line: &str) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    /// Open a handle that writes to the same destination without sharing
    /// state with `self`. `None` means the sink may be shared as-is.
    fn independent_handle(&self) -> io::Result<Option<Arc<dyn LogSink>>> {
        Ok(None)
    }
}

// ============================================================================
// Console
// ============================================================================

/// Writes to stderr so log lines do not interleave with chat output on stdout
#[derive(Debug)]
pub struct ConsoleSink {
    destination: SinkDestination,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            destination: SinkDestination::Console,
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for ConsoleSink {
    fn destination(&self) -> &SinkDestination {
        &self.destination
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut err = io::stderr().lock();
        writeln!(err, "{}", line)
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().lock().flush()
    }
}

// ============================================================================
// Plain append file
// ============================================================================

/// Append-only file that opens its path for every line
///
/// Holding no descriptor between writes means it keeps following the path
/// when another writer rotates the file away underneath it.
#[derive(Debug)]
pub struct FileSink {
    destination: SinkDestination,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        open_append(&path)?;
        Ok(Self {
            destination: SinkDestination::File(path.clone()),
            path,
            write_lock: Mutex::new(()),
        })
    }
}

impl LogSink for FileSink {
    fn destination(&self) -> &SinkDestination {
        &self.destination
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        open_append(&self.path)?.write_all(format!("{}\n", line).as_bytes())
    }

    fn independent_handle(&self) -> io::Result<Option<Arc<dyn LogSink>>> {
        Ok(Some(Arc::new(FileSink::open(&self.path)?)))
    }
}

// ============================================================================
// Size-rotating file
// ============================================================================

/// File that rolls over to `<path>.1 .. <path>.N` once it has grown past
/// `max_bytes`; lines are never split across files
pub struct RotatingFileSink {
    destination: SinkDestination,
    path: PathBuf,
    writer: Mutex<FileRotate<AppendCount>>,
}

impl RotatingFileSink {
    pub fn open(path: impl AsRef<Path>, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Surface permission and directory errors here rather than on first write
        open_append(&path)?;

        let writer = FileRotate::new(
            &path,
            AppendCount::new(backups),
            ContentLimit::BytesSurpassed(max_bytes as usize),
            Compression::None,
            #[cfg(unix)]
            None,
        );

        Ok(Self {
            destination: SinkDestination::File(path.clone()),
            path,
            writer: Mutex::new(writer),
        })
    }
}

impl fmt::Debug for RotatingFileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingFileSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LogSink for RotatingFileSink {
    fn destination(&self) -> &SinkDestination {
        &self.destination
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_all(format!("{}\n", line).as_bytes())
    }

    fn flush(&self) -> io::Result<()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }

    /// The independent handle appends without rotating; rotation stays with
    /// the owner of the path.
    fn independent_handle(&self) -> io::Result<Option<Arc<dyn LogSink>>> {
        Ok(Some(Arc::new(FileSink::open(&self.path)?)))
    }
}

// ============================================================================
// In-memory capture
// ============================================================================

/// Collects lines in memory; shared rather than reopened when attached
#[derive(Debug)]
pub struct CaptureSink {
    destination: SinkDestination,
    lines: Mutex<Vec<String>>,
}

impl CaptureSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            destination: SinkDestination::Memory(name.into()),
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}

impl LogSink for CaptureSink {
    fn destination(&self) -> &SinkDestination {
        &self.destination
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}
