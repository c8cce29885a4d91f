// This module runs one pipeline on a dedicated background thread so a long-running
// external tool never blocks the interactive context. spawn_run moves the orchestrator,
// the source text, and the sink onto the worker thread; results arrive through the
// sink's callbacks. The returned PipelineHandle carries the run's cancel token (cancel
// kills the outstanding external process) and joins the thread for the final outcome.

//! Background execution of one pipeline run.

use std::io;
use std::thread::{self, JoinHandle};

use crate::config::ToolchainConfig;
use crate::error::PipelineResult;
use crate::optimizations::SharedRegistry;
use crate::pipeline::{GraphKind, PipelineOrchestrator, ResultSink};
use crate::process::{CancelToken, SystemRunner};

/// Handle to a pipeline run in flight on a worker thread.
pub struct PipelineHandle {
    cancel: CancelToken,
    join: JoinHandle<PipelineResult<()>>,
}

impl PipelineHandle {
    /// Request termination: the currently running external process is killed
    /// and the run fails with a cancellation error for that stage.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish and return its outcome.
    ///
    /// The sink has already observed everything by the time this returns.
    pub fn join(self) -> PipelineResult<()> {
        self.join
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }
}

/// Start one pipeline run on a fresh worker thread.
///
/// The registry stays shared with the caller; selection is sampled on the
/// worker immediately before the graph stage. One active run per registry.
pub fn spawn_run(
    config: ToolchainConfig,
    registry: SharedRegistry,
    graph_kind: GraphKind,
    source_text: String,
    mut sink: Box<dyn ResultSink>,
) -> io::Result<PipelineHandle> {
    let orchestrator =
        PipelineOrchestrator::new(SystemRunner::new(), config, registry, graph_kind);
    let cancel = orchestrator.cancel_token();

    let join = thread::Builder::new()
        .name("irpipe-worker".to_string())
        .spawn(move || orchestrator.run(&source_text, sink.as_mut()))?;

    Ok(PipelineHandle { cancel, join })
}
