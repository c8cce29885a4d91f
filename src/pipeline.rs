// This module drives the ordered stage sequence that turns source text into a rendered
// flow-graph image. PipelineOrchestrator owns one run: it creates a fresh Workspace,
// invokes each external tool through the ProcessRunner seam, gates every stage on the
// previous one's exit code, verifies each stage's declared output file exists before
// depending on it, and pushes results to the ResultSink boundary. The pass-flag list
// for the graph stage is re-derived from the shared OptimizationRegistry immediately
// before that stage runs; toggle events are never accumulated. Any failure transitions
// the run to a terminal failed state carrying the stage identity and captured stderr.
// Nothing is retried and no stage ever starts after a failure.

//! The pipeline state machine.
//!
//! Stages run in strict forward order, each gated on the previous stage's
//! exit code being 0:
//!
//! 1. **Init** - create the workspace, write the source text
//! 2. **Compile** - `javac` the source, locate the produced class file
//! 3. **Disassemble** - `javap -c`, deliver the bytecode listing
//! 4. **Translate** - LLVM-JVM emits textual IR
//! 5. **Assemble** - `llvm-as` emits bitcode
//! 6. **GraphGenerate** - `opt` with the selected pass flags emits a dot file
//! 7. **Rasterize** - `dot` renders the PNG
//! 8. **Deliver** - hand the image to the sink
//!
//! A listing delivered by stage 3 stays delivered even when a later stage
//! fails. Re-running re-enters Init with a fresh workspace; registry selection
//! is read, never reset implicitly.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ToolchainConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::optimizations::SharedRegistry;
use crate::process::{CancelToken, CommandSpec, OutputTarget, ProcessRunner};
use crate::workspace::Workspace;

/// Which flow-graph variant a run requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    ControlFlowGraph,
    Dominator,
    PostDominator,
}

impl GraphKind {
    /// File-name prefix and flag suffix the graph tool uses for this kind.
    pub fn prefix(self) -> &'static str {
        match self {
            GraphKind::ControlFlowGraph => "cfg",
            GraphKind::Dominator => "dom",
            GraphKind::PostDominator => "postdom",
        }
    }

    /// Graph-emission flag handed to the optimizer.
    pub fn dot_flag(self) -> String {
        format!("-dot-{}", self.prefix())
    }

    /// Name of the dot file the graph tool writes for the entry function.
    pub fn dot_file_name(self) -> String {
        format!("{}.main.dot", self.prefix())
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Identity of one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Init,
    Compile,
    Disassemble,
    Translate,
    Assemble,
    GraphGenerate,
    Rasterize,
    Deliver,
}

impl StageId {
    pub fn name(self) -> &'static str {
        match self {
            StageId::Init => "init",
            StageId::Compile => "compile",
            StageId::Disassemble => "disassemble",
            StageId::Translate => "translate",
            StageId::Assemble => "assemble",
            StageId::GraphGenerate => "graph-generate",
            StageId::Rasterize => "rasterize",
            StageId::Deliver => "deliver",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one external invocation, inspected after every stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage: StageId,
    pub exit_code: i32,
    /// Capture file the child's stdout was redirected to, if any.
    pub stdout: Option<PathBuf>,
    /// Captured stderr text, empty when stderr was passed through.
    pub stderr: String,
}

impl StageResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Boundary the orchestrator reports through, implemented by the presentation
/// layer (or by a collecting sink in tests).
pub trait ResultSink: Send {
    /// A stage is about to run. Default: ignore.
    fn on_stage_started(&mut self, stage: StageId) {
        let _ = stage;
    }

    /// The bytecode listing, delivered as soon as the disassemble stage
    /// succeeds. Stays delivered even if a later stage fails.
    fn on_bytecode_listing(&mut self, listing: String);

    /// The rendered graph image, delivered on a successful run.
    fn on_graph_image(&mut self, png: Vec<u8>);

    /// The run ended early; no further callbacks follow.
    fn on_failure(&mut self, error: &PipelineError);
}

/// One pipeline run's driver.
///
/// The registry is shared with the editing session that keeps toggling
/// selections; it is sampled fresh immediately before the graph stage. At most
/// one run may be active per registry instance.
pub struct PipelineOrchestrator<R: ProcessRunner> {
    runner: R,
    config: ToolchainConfig,
    registry: SharedRegistry,
    graph_kind: GraphKind,
    cancel: CancelToken,
}

impl<R: ProcessRunner> PipelineOrchestrator<R> {
    pub fn new(
        runner: R,
        config: ToolchainConfig,
        registry: SharedRegistry,
        graph_kind: GraphKind,
    ) -> Self {
        Self {
            runner,
            config,
            registry,
            graph_kind,
            cancel: CancelToken::new(),
        }
    }

    /// Token that cancels this run's outstanding external process.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn graph_kind(&self) -> GraphKind {
        self.graph_kind
    }

    /// Drive one run to completion, reporting through the sink.
    ///
    /// On failure the sink's `on_failure` has already been called when this
    /// returns; the error is also returned for callers that want it.
    pub fn run(&self, source_text: &str, sink: &mut dyn ResultSink) -> PipelineResult<()> {
        match self.run_stages(source_text, sink) {
            Ok(()) => {
                log::info!("pipeline done");
                Ok(())
            }
            Err(error) => {
                log::error!("pipeline failed: {error}");
                sink.on_failure(&error);
                Err(error)
            }
        }
    }

    fn run_stages(&self, source_text: &str, sink: &mut dyn ResultSink) -> PipelineResult<()> {
        // Init
        sink.on_stage_started(StageId::Init);
        let mut workspace = Workspace::create()?;
        let source_file = workspace.write_source(source_text)?;

        // Compile
        let class_file = self.compile(&workspace, &source_file, sink)?;
        workspace.set_class_file(class_file.clone());

        // Disassemble
        let listing = self.disassemble(&workspace, &class_file, sink)?;
        sink.on_bytecode_listing(listing);

        // Translate
        self.translate(&workspace, &class_file, sink)?;

        // Assemble
        self.assemble(&workspace, sink)?;

        // GraphGenerate
        self.generate_graph(&workspace, sink)?;

        // Rasterize
        self.rasterize(&workspace, sink)?;

        // Deliver
        sink.on_stage_started(StageId::Deliver);
        let png = fs::read(workspace.graph_image_file()).map_err(|source| PipelineError::Io {
            stage: StageId::Deliver,
            source,
        })?;
        sink.on_graph_image(png);
        Ok(())
    }

    fn compile(
        &self,
        workspace: &Workspace,
        source_file: &Path,
        sink: &mut dyn ResultSink,
    ) -> PipelineResult<PathBuf> {
        let spec = CommandSpec::new(&self.config.javac, workspace.root())
            .arg(source_file.display().to_string())
            .args(self.config.compile_flags())
            .stderr(OutputTarget::CaptureFile(
                workspace.stderr_file(StageId::Compile),
            ));
        self.exec(StageId::Compile, spec, sink)?;

        // javac names its output after the class, not the source file, so the
        // exact path cannot be declared up front. The scan is guarded and
        // deterministic instead.
        let candidates = workspace.class_candidates()?;
        match candidates.into_iter().next() {
            Some(class_file) => {
                log::debug!("compiled artifact {}", class_file.display());
                Ok(class_file)
            }
            None => Err(PipelineError::NoArtifactProduced {
                stage: StageId::Compile,
                expected: workspace.root().join("*.class"),
            }),
        }
    }

    fn disassemble(
        &self,
        workspace: &Workspace,
        class_file: &Path,
        sink: &mut dyn ResultSink,
    ) -> PipelineResult<String> {
        let listing_file = workspace.listing_file();
        let spec = CommandSpec::new(&self.config.javap, workspace.root())
            .arg("-c")
            .arg(class_file.display().to_string())
            .stdout(OutputTarget::CaptureFile(listing_file.clone()))
            .stderr(OutputTarget::CaptureFile(
                workspace.stderr_file(StageId::Disassemble),
            ));
        self.exec(StageId::Disassemble, spec, sink)?;
        self.expect_artifact(StageId::Disassemble, &listing_file)?;

        let raw = fs::read_to_string(&listing_file).map_err(|source| PipelineError::Io {
            stage: StageId::Disassemble,
            source,
        })?;
        // The first line is the tool banner, not bytecode.
        let listing = raw.lines().skip(1).collect::<Vec<_>>().join("\n");
        Ok(listing)
    }

    fn translate(
        &self,
        workspace: &Workspace,
        class_file: &Path,
        sink: &mut dyn ResultSink,
    ) -> PipelineResult<()> {
        let class_base = class_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let stdout_file = workspace.stdout_file(StageId::Translate);
        let spec = CommandSpec::new(
            self.config.translator_exe().display().to_string(),
            workspace.root(),
        )
        .arg("-cp")
        .arg(self.config.translator_classpath())
        .arg(class_base)
        .stdout(OutputTarget::CaptureFile(stdout_file.clone()))
        .stderr(OutputTarget::CaptureFile(
            workspace.stderr_file(StageId::Translate),
        ));
        self.exec(StageId::Translate, spec, sink)?;
        self.expect_artifact(StageId::Translate, &workspace.ir_file())?;

        if let Ok(output) = fs::read_to_string(&stdout_file) {
            if !output.is_empty() {
                log::debug!("translator output: {}", output.trim_end());
            }
        }
        Ok(())
    }

    fn assemble(&self, workspace: &Workspace, sink: &mut dyn ResultSink) -> PipelineResult<()> {
        let spec = CommandSpec::new(&self.config.llvm_as, workspace.root())
            .arg(crate::workspace::IR_FILE)
            .arg("-o")
            .arg(crate::workspace::BITCODE_FILE)
            .stderr(OutputTarget::CaptureFile(
                workspace.stderr_file(StageId::Assemble),
            ));
        self.exec(StageId::Assemble, spec, sink)?;
        self.expect_artifact(StageId::Assemble, &workspace.bitcode_file())
    }

    fn generate_graph(
        &self,
        workspace: &Workspace,
        sink: &mut dyn ResultSink,
    ) -> PipelineResult<()> {
        // Single source of truth: the registry is sampled here, not when the
        // orchestrator was constructed, so toggles and un-toggles issued up to
        // this moment all take effect.
        let passes = self.selected_passes();
        log::info!(
            "generating {} graph with passes [{}]",
            self.graph_kind,
            passes.join(", ")
        );

        let mut spec = CommandSpec::new(&self.config.opt, workspace.root())
            .arg(crate::workspace::BITCODE_FILE);
        for pass in &passes {
            spec = spec.arg(format!("-{pass}"));
        }
        let spec = spec.arg(self.graph_kind.dot_flag()).stderr(
            OutputTarget::CaptureFile(workspace.stderr_file(StageId::GraphGenerate)),
        );
        self.exec(StageId::GraphGenerate, spec, sink)?;
        self.expect_artifact(
            StageId::GraphGenerate,
            &workspace.graph_dot_file(self.graph_kind),
        )
    }

    fn rasterize(&self, workspace: &Workspace, sink: &mut dyn ResultSink) -> PipelineResult<()> {
        let spec = CommandSpec::new(&self.config.dot, workspace.root())
            .arg("-Tpng")
            .arg(self.graph_kind.dot_file_name())
            .arg("-o")
            .arg(crate::workspace::IMAGE_FILE)
            .stderr(OutputTarget::CaptureFile(
                workspace.stderr_file(StageId::Rasterize),
            ));
        self.exec(StageId::Rasterize, spec, sink)?;
        self.expect_artifact(StageId::Rasterize, &workspace.graph_image_file())
    }

    /// Run one stage and gate on its exit code.
    fn exec(
        &self,
        stage: StageId,
        spec: CommandSpec,
        sink: &mut dyn ResultSink,
    ) -> PipelineResult<StageResult> {
        sink.on_stage_started(stage);
        let result = self.runner.run(stage, &spec, &self.cancel)?;
        if !result.success() {
            return Err(PipelineError::StageFailure {
                stage,
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        Ok(result)
    }

    /// A zero exit is not enough: the declared output must exist before any
    /// later stage may read it.
    fn expect_artifact(&self, stage: StageId, path: &Path) -> PipelineResult<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(PipelineError::NoArtifactProduced {
                stage,
                expected: path.to_path_buf(),
            })
        }
    }

    fn selected_passes(&self) -> Vec<String> {
        let registry = match self.registry.lock() {
            Ok(guard) => guard,
            // A poisoned lock still holds the last written selection.
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.selected_names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_kind_conventions() {
        assert_eq!(GraphKind::ControlFlowGraph.dot_flag(), "-dot-cfg");
        assert_eq!(GraphKind::Dominator.dot_file_name(), "dom.main.dot");
        assert_eq!(GraphKind::PostDominator.prefix(), "postdom");
    }

    #[test]
    fn test_stage_ids_display_as_stable_names() {
        assert_eq!(StageId::GraphGenerate.to_string(), "graph-generate");
        assert_eq!(StageId::Compile.to_string(), "compile");
    }

    #[test]
    fn test_stage_result_success_gate() {
        let ok = StageResult {
            stage: StageId::Assemble,
            exit_code: 0,
            stdout: None,
            stderr: String::new(),
        };
        assert!(ok.success());
        let failed = StageResult { exit_code: 2, ..ok };
        assert!(!failed.success());
    }
}
