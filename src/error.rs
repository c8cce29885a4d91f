// This module defines the error taxonomy for the pipeline using the thiserror crate for
// idiomatic Rust error handling. PipelineError is the main error enum covering the ways
// a run can end early: a tool binary that cannot be launched, a stage that ran but
// exited nonzero, a stage that claimed success without producing its declared output
// file, workspace setup failures, cancellation, and i/o faults around stage artifacts.
// Setup-time errors that occur before any external process runs (WorkspaceError,
// CatalogError) and the recoverable UnknownOptimization toggle error live here as well.
// Each variant carries the failing stage identity and any captured diagnostic text so
// callers can distinguish "compile error" from "graph tool missing".

//! Error types for the pipeline.
//!
//! Using thiserror for more idiomatic error handling.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::StageId;

/// Main error type for a pipeline run.
///
/// Every variant is fatal to the run it occurs in; later stages never start.
/// Results already delivered to the [`ResultSink`](crate::pipeline::ResultSink)
/// by earlier stages stay delivered.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The named program could not be located or started. Distinct from a
    /// nonzero exit, which is a normal stage outcome reported as
    /// [`PipelineError::StageFailure`].
    #[error("failed to launch `{command}` during {stage}: {source}")]
    Launch {
        stage: StageId,
        command: String,
        #[source]
        source: io::Error,
    },

    /// The process ran but exited nonzero.
    #[error("{stage} failed with exit code {exit_code}: {stderr}")]
    StageFailure {
        stage: StageId,
        exit_code: i32,
        stderr: String,
    },

    /// A stage exited 0 but its declared output file is absent. Later stages
    /// cannot proceed without it, so this is treated as a stage failure.
    #[error("{stage} reported success but produced no `{expected}`")]
    NoArtifactProduced { stage: StageId, expected: PathBuf },

    /// The run was cancelled while the named stage's process was outstanding.
    #[error("{stage} cancelled")]
    Cancelled { stage: StageId },

    /// Scratch directory setup failed before any external process ran.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// I/o fault while reading or monitoring a stage artifact.
    #[error("i/o error during {stage}: {source}")]
    Io {
        stage: StageId,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    /// Stage the run failed in, if the failure is attributable to one.
    pub fn stage(&self) -> Option<StageId> {
        match self {
            PipelineError::Launch { stage, .. }
            | PipelineError::StageFailure { stage, .. }
            | PipelineError::NoArtifactProduced { stage, .. }
            | PipelineError::Cancelled { stage }
            | PipelineError::Io { stage, .. } => Some(*stage),
            PipelineError::Workspace(_) => None,
        }
    }
}

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Scratch-directory allocation or population failed.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("could not allocate scratch directory: {0}")]
    Create(#[source] io::Error),

    #[error("could not write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not scan scratch directory `{path}`: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The optimization-pass catalog could not be loaded at startup.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("could not read catalog `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed catalog `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A toggle referenced a pass name the registry does not hold.
///
/// Recoverable: the caller's UI layer may ignore it, and it never aborts an
/// in-flight run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown optimization pass `{name}`")]
pub struct UnknownOptimization {
    pub name: String,
}
