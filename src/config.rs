//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! [planner]
//! explain = true
//!
//! [output]
//! format = "json"
//! flush_each_batch = true
//!
//! [graph]
//! vertex_capacity = 100000
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sink::OutputFormat;
use crate::storage::GraphOptions;
use crate::types::{FlowError, Result};

/// `[planner]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerSection {
    /// Log the explain tree of every plan at debug level.
    pub explain: bool,
}

/// `[output]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputSection {
    /// Line format of file sinks.
    pub format: OutputFormat,
    /// Flush every continuous query's sink after each batch.
    pub flush_each_batch: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            flush_each_batch: true,
        }
    }
}

/// `[graph]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GraphSection {
    /// Expected vertex count.
    pub vertex_capacity: usize,
}

/// Settings consumed by [`Engine`](crate::Engine).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Planner settings.
    pub planner: PlannerSection,
    /// Sink settings.
    pub output: OutputSection,
    /// Storage sizing.
    pub graph: GraphSection,
}

impl EngineConfig {
    /// Plans are explained, file sinks write JSON lines.
    pub fn verbose() -> Self {
        Self {
            planner: PlannerSection { explain: true },
            output: OutputSection {
                format: OutputFormat::Json,
                flush_each_batch: true,
            },
            graph: GraphSection::default(),
        }
    }

    /// No explain logging, sinks are flushed only when dropped.
    pub fn quiet() -> Self {
        Self {
            planner: PlannerSection { explain: false },
            output: OutputSection {
                format: OutputFormat::Text,
                flush_each_batch: false,
            },
            graph: GraphSection::default(),
        }
    }

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| FlowError::Config(err.to_string()))
    }

    /// Reads a TOML file. Missing sections and keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|err| FlowError::Config(format!("{}: {err}", path.display())))
    }

    /// Serializes back to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| FlowError::Config(err.to_string()))
    }

    /// Storage options derived from the `[graph]` table.
    pub fn graph_options(&self) -> GraphOptions {
        GraphOptions::new().vertex_capacity(self.graph.vertex_capacity)
    }
}
