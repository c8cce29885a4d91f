//! irpipe - External toolchain pipeline driver.
//!
//! irpipe chains a sequence of external compiler tools to turn Java source text
//! into a rendered LLVM flow-graph image, exposing every intermediate artifact
//! along the way: the javac compile, the javap bytecode listing, the LLVM-JVM
//! translation to textual IR, bitcode assembly, optimization-pass selection and
//! graph emission through opt, and PNG rasterization through dot.
//!
//! # Primary Usage
//!
//! ```ignore
//! use irpipe::{GraphKind, OptimizationRegistry, PipelineOrchestrator, SystemRunner, ToolchainConfig};
//!
//! let registry = OptimizationRegistry::default_catalog().into_shared();
//! {
//!     let mut reg = registry.lock().unwrap();
//!     reg.toggle("mem2reg", true)?;
//! }
//!
//! let config = ToolchainConfig::from_env();
//! let orchestrator = PipelineOrchestrator::new(
//!     SystemRunner::new(),
//!     config,
//!     registry,
//!     GraphKind::ControlFlowGraph,
//! );
//! orchestrator.run(source_text, &mut sink)?;
//! ```
//!
//! # Architecture
//!
//! - [`pipeline`] - The stage state machine and the `ResultSink` boundary
//! - [`process`] - External process execution and cancellation
//! - [`optimizations`] - Optimization-pass catalog and selection state
//! - [`workspace`] - Per-run scratch directory and file-name conventions
//! - [`worker`] - Background execution of one pipeline run
//! - [`config`] - Toolchain location and tool names

pub mod config;
pub mod error;
pub mod optimizations;
pub mod pipeline;
pub mod process;
pub mod worker;
pub mod workspace;

// Re-export the types most callers need.
pub use config::ToolchainConfig;
pub use error::{CatalogError, PipelineError, PipelineResult, UnknownOptimization, WorkspaceError};
pub use optimizations::{Optimization, OptimizationRegistry, SharedRegistry};
pub use pipeline::{GraphKind, PipelineOrchestrator, ResultSink, StageId, StageResult};
pub use process::{CancelToken, CommandSpec, OutputTarget, ProcessRunner, SystemRunner};
pub use worker::{spawn_run, PipelineHandle};
pub use workspace::Workspace;
