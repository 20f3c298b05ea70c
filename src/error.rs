use std::path::{Path, PathBuf};

use thiserror::Error;

/// Everything that can abort a batch of simulations.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("cannot read input table {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("input table {} has no usable lines", path.display())]
    EmptyTable { path: PathBuf },
    #[error("{table} table has no rows")]
    NoRows { table: &'static str },
    #[error("cannot write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed line in {table} table: {line:?}")]
    MalformedLine { table: &'static str, line: String },
    #[error("demographic events out of order: event at time {time} follows event at time {previous}")]
    EventOrder { previous: f64, time: f64 },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("simulation {sim}: {source}")]
    Run {
        sim: u32,
        #[source]
        source: Box<SimError>,
    },
    #[error("simulation {sim}, segment {segment}: {source}")]
    Segment {
        sim: u32,
        segment: u32,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    pub(crate) fn output(path: &Path, source: std::io::Error) -> Self {
        Self::Output {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn in_run(self, sim: u32) -> Self {
        Self::Run {
            sim,
            source: Box::new(self),
        }
    }

    pub(crate) fn in_segment(self, sim: u32, segment: u32) -> Self {
        Self::Segment {
            sim,
            segment,
            source: Box::new(self),
        }
    }
}
