//! Output sinks receiving result deltas.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{EdgeId, Result, VertexId};

/// How a row relates to the result set.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    /// Row of a one-time match.
    Matched,
    /// Row that entered the result set with this batch.
    Emerged,
    /// Row that left the result set with this batch.
    Deleted,
}

impl MatchKind {
    /// Upper-case label written to sinks.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Matched => "MATCHED",
            MatchKind::Emerged => "EMERGED",
            MatchKind::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result row: vertices in pattern variable order, edges in relation
/// declaration order.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct MatchRow {
    /// Bound vertices.
    pub vertices: Vec<VertexId>,
    /// Resolved edges.
    pub edges: Vec<EdgeId>,
}

impl fmt::Display for MatchRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ids: Vec<String>| ids.join(",");
        write!(
            f,
            "v=[{}] e=[{}]",
            join(self.vertices.iter().map(ToString::to_string).collect()),
            join(self.edges.iter().map(ToString::to_string).collect())
        )
    }
}

/// Append-only receiver of result rows.
pub trait OutputSink: Send {
    /// Receives one row.
    fn append(&mut self, kind: MatchKind, row: &MatchRow) -> Result<()>;

    /// Pushes buffered rows to their destination.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink shared by every delta query of one continuous query.
pub type SharedSink = Arc<Mutex<dyn OutputSink>>;

/// Wraps a sink for sharing.
pub fn shared<S: OutputSink + 'static>(sink: S) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    rows: Vec<(MatchKind, MatchRow)>,
}

impl InMemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows received so far, in arrival order.
    pub fn rows(&self) -> &[(MatchKind, MatchRow)] {
        &self.rows
    }

    /// Removes and returns every collected row.
    pub fn take(&mut self) -> Vec<(MatchKind, MatchRow)> {
        std::mem::take(&mut self.rows)
    }

    /// Number of rows of `kind`.
    pub fn count(&self, kind: MatchKind) -> usize {
        self.rows.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Number of rows received.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` before the first row.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl OutputSink for InMemorySink {
    fn append(&mut self, kind: MatchKind, row: &MatchRow) -> Result<()> {
        self.rows.push((kind, row.clone()));
        Ok(())
    }
}

/// Line format written by [`FileSink`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `KIND v=[..] e=[..]`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    kind: MatchKind,
    vertices: &'a [VertexId],
    edges: &'a [EdgeId],
}

/// Appends rows to a file, one line per row.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    format: OutputFormat,
}

impl FileSink {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>, format: OutputFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            format,
        })
    }

    /// File the sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OutputSink for FileSink {
    fn append(&mut self, kind: MatchKind, row: &MatchRow) -> Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.writer, "{kind} {row}")?,
            OutputFormat::Json => {
                let line = JsonLine {
                    kind,
                    vertices: &row.vertices,
                    edges: &row.edges,
                };
                serde_json::to_writer(&mut self.writer, &line)?;
                self.writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        trace!(path = %self.path.display(), "sink.file.flush");
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Boxed row callback.
pub type RowCallback = Box<dyn FnMut(MatchKind, &MatchRow) + Send>;

/// Forwards rows to a closure.
pub struct CallbackSink {
    callback: RowCallback,
}

impl CallbackSink {
    /// Wraps `callback`.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(MatchKind, &MatchRow) + Send + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl OutputSink for CallbackSink {
    fn append(&mut self, kind: MatchKind, row: &MatchRow) -> Result<()> {
        (self.callback)(kind, row);
        Ok(())
    }
}
