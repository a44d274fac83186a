//
// error.rs
// HP-Stats-rs
//
// Error taxonomy shared by discovery, conversion, statistics and workbook export.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Every way a collection run can stop. None of them is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid paths and other bad input detected before work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "the condition directories live in different folders, they must all be in the same folder. \
         Found folders that contain possible conditions: {parents:?}. \
         Consider excluding the offending scan folders by name"
    )]
    AmbiguousHierarchy { parents: Vec<PathBuf> },

    #[error("segment '{name}' was not found in the segmentation. Found segments: {available:?}")]
    UnknownNoiseSegment { name: String, available: Vec<String> },

    #[error("condition '{condition}' has no '{denominator}' series to compute ratios against")]
    MissingDenominator {
        condition: String,
        denominator: String,
    },

    #[error(
        "condition '{condition}': series '{series}' has {series_len} timepoint(s) \
         but denominator '{denominator}' has {denominator_len}"
    )]
    TimepointMismatch {
        condition: String,
        series: String,
        series_len: usize,
        denominator: String,
        denominator_len: usize,
    },

    #[error("conversion failed for {}: {reason}", .leaf.display())]
    Conversion { leaf: PathBuf, reason: String },

    #[error("statistics could not be computed for volume {}: {reason}", .volume.display())]
    Statistics { volume: PathBuf, reason: String },

    #[error(
        "failed to write {}: {source}\nPerhaps the file is open or used by another application",
        .path.display()
    )]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn output(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PipelineError::OutputWrite {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
