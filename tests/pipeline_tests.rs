//! Tests for the pipeline state machine against a fake process runner.
//!
//! The fake records every invocation and fabricates the output files each
//! stage is contracted to produce, so these tests verify stage ordering,
//! argument shapes, fail-fast behavior, and selection-state handling without
//! spawning any real toolchain process.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use irpipe::{
    CancelToken, CommandSpec, GraphKind, OptimizationRegistry, PipelineError,
    PipelineOrchestrator, ProcessRunner, ResultSink, SharedRegistry, StageId, StageResult,
    ToolchainConfig,
};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake";
const LISTING_BODY: &str = "class Addition {\n  public static int RunMe();\n    Code:\n       0: sipush 1023";

/// One recorded invocation.
#[derive(Debug, Clone)]
struct RecordedCall {
    stage: StageId,
    program: String,
    args: Vec<String>,
}

type CallLog = Arc<Mutex<Vec<RecordedCall>>>;

/// Fake runner: logs calls, writes the artifacts later stages depend on.
#[derive(Clone)]
struct FakeRunner {
    calls: CallLog,
    /// Stage that exits nonzero instead of producing its output.
    fail_at: Option<StageId>,
    /// Stage that exits 0 without producing its output.
    skip_artifact_at: Option<StageId>,
}

impl FakeRunner {
    fn new() -> (Self, CallLog) {
        let calls: CallLog = Arc::default();
        (
            Self {
                calls: calls.clone(),
                fail_at: None,
                skip_artifact_at: None,
            },
            calls,
        )
    }

    fn failing_at(stage: StageId) -> (Self, CallLog) {
        let (mut runner, calls) = Self::new();
        runner.fail_at = Some(stage);
        (runner, calls)
    }

    fn fabricate_outputs(&self, stage: StageId, spec: &CommandSpec) {
        let dir = &spec.working_dir;
        match stage {
            StageId::Compile => {
                // The compiler emits the entry class plus an inner class.
                fs::write(dir.join("Addition.class"), b"\xca\xfe\xba\xbe").unwrap();
                fs::write(dir.join("Addition$1.class"), b"\xca\xfe\xba\xbe").unwrap();
            }
            StageId::Disassemble => {
                let capture = spec.stdout.capture_path().expect("javap stdout captured");
                fs::write(
                    capture,
                    format!("Compiled from \"source.java\"\n{LISTING_BODY}"),
                )
                .unwrap();
            }
            StageId::Translate => {
                fs::write(dir.join("unoptimizedIR.ll"), "define i32 @main()").unwrap();
                if let Some(capture) = spec.stdout.capture_path() {
                    fs::write(capture, "Output: 31\n").unwrap();
                }
            }
            StageId::Assemble => {
                fs::write(dir.join("unoptimized.bc"), b"BC\xc0\xde").unwrap();
            }
            StageId::GraphGenerate => {
                let prefix = spec
                    .args
                    .iter()
                    .find_map(|a| a.strip_prefix("-dot-"))
                    .expect("graph stage carries a -dot- flag");
                fs::write(dir.join(format!("{prefix}.main.dot")), "digraph main {}").unwrap();
            }
            StageId::Rasterize => {
                let out = spec
                    .args
                    .iter()
                    .position(|a| a == "-o")
                    .map(|i| &spec.args[i + 1])
                    .expect("rasterize stage names its output");
                fs::write(dir.join(out), PNG_BYTES).unwrap();
            }
            StageId::Init | StageId::Deliver => unreachable!("not external stages"),
        }
    }
}

impl ProcessRunner for FakeRunner {
    fn run(
        &self,
        stage: StageId,
        spec: &CommandSpec,
        _cancel: &CancelToken,
    ) -> Result<StageResult, PipelineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            stage,
            program: spec.program.clone(),
            args: spec.args.clone(),
        });

        if self.fail_at == Some(stage) {
            return Ok(StageResult {
                stage,
                exit_code: 1,
                stdout: None,
                stderr: format!("{stage}: synthetic tool failure"),
            });
        }
        if self.skip_artifact_at != Some(stage) {
            self.fabricate_outputs(stage, spec);
        }

        Ok(StageResult {
            stage,
            exit_code: 0,
            stdout: spec.stdout.capture_path().map(Path::to_path_buf),
            stderr: String::new(),
        })
    }
}

#[derive(Default)]
struct CollectingSink {
    stages: Vec<StageId>,
    listing: Option<String>,
    image: Option<Vec<u8>>,
    failures: Vec<String>,
}

impl ResultSink for CollectingSink {
    fn on_stage_started(&mut self, stage: StageId) {
        self.stages.push(stage);
    }

    fn on_bytecode_listing(&mut self, listing: String) {
        self.listing = Some(listing);
    }

    fn on_graph_image(&mut self, png: Vec<u8>) {
        self.image = Some(png);
    }

    fn on_failure(&mut self, error: &PipelineError) {
        self.failures.push(error.to_string());
    }
}

fn test_config() -> ToolchainConfig {
    ToolchainConfig::with_home("/opt/llvm-jvm")
}

fn orchestrator(
    runner: FakeRunner,
    registry: SharedRegistry,
    kind: GraphKind,
) -> PipelineOrchestrator<FakeRunner> {
    let _ = env_logger::builder().is_test(true).try_init();
    PipelineOrchestrator::new(runner, test_config(), registry, kind)
}

fn graph_args(calls: &CallLog) -> Vec<String> {
    calls
        .lock()
        .unwrap()
        .iter()
        .rev()
        .find(|c| c.stage == StageId::GraphGenerate)
        .expect("graph stage ran")
        .args
        .clone()
}

const SOURCE: &str = "class Addition { public static int RunMe() { return 31; } }";

#[test]
fn test_successful_run_reaches_done_with_both_artifacts() {
    let (runner, calls) = FakeRunner::new();
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);

    let mut sink = CollectingSink::default();
    orch.run(SOURCE, &mut sink).unwrap();

    // Every stage announced, in strict forward order.
    assert_eq!(
        sink.stages,
        vec![
            StageId::Init,
            StageId::Compile,
            StageId::Disassemble,
            StageId::Translate,
            StageId::Assemble,
            StageId::GraphGenerate,
            StageId::Rasterize,
            StageId::Deliver,
        ]
    );

    // The banner line is stripped from the listing.
    let listing = sink.listing.expect("listing delivered");
    assert!(!listing.is_empty());
    assert!(listing.starts_with("class Addition"));
    assert!(!listing.contains("Compiled from"));

    assert_eq!(sink.image.as_deref(), Some(PNG_BYTES));
    assert!(sink.failures.is_empty());

    let calls = calls.lock().unwrap();
    let stages: Vec<_> = calls.iter().map(|c| c.stage).collect();
    assert_eq!(
        stages,
        vec![
            StageId::Compile,
            StageId::Disassemble,
            StageId::Translate,
            StageId::Assemble,
            StageId::GraphGenerate,
            StageId::Rasterize,
        ]
    );
}

#[test]
fn test_stage_argument_shapes() {
    let (runner, calls) = FakeRunner::new();
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);
    orch.run(SOURCE, &mut CollectingSink::default()).unwrap();

    let calls = calls.lock().unwrap();
    let by_stage = |stage: StageId| calls.iter().find(|c| c.stage == stage).unwrap();

    let compile = by_stage(StageId::Compile);
    assert_eq!(compile.program, "javac");
    assert!(compile.args[0].ends_with("source.java"));
    assert_eq!(&compile.args[1..], ["-target", "1.7", "-source", "1.7"]);

    let disassemble = by_stage(StageId::Disassemble);
    assert_eq!(disassemble.program, "javap");
    assert_eq!(disassemble.args[0], "-c");
    // The inner class is skipped; the entry class is the artifact.
    assert!(disassemble.args[1].ends_with("Addition.class"));
    assert!(!disassemble.args[1].contains('$'));

    let translate = by_stage(StageId::Translate);
    assert_eq!(translate.program, "/opt/llvm-jvm/Main.exe");
    assert_eq!(
        translate.args,
        vec!["-cp", "./:/opt/llvm-jvm/rt", "Addition"]
    );

    let assemble = by_stage(StageId::Assemble);
    assert_eq!(assemble.program, "llvm-as");
    assert_eq!(assemble.args, vec!["unoptimizedIR.ll", "-o", "unoptimized.bc"]);

    let graph = by_stage(StageId::GraphGenerate);
    assert_eq!(graph.program, "opt");
    assert_eq!(graph.args, vec!["unoptimized.bc", "-dot-cfg"]);

    let rasterize = by_stage(StageId::Rasterize);
    assert_eq!(rasterize.program, "dot");
    assert_eq!(
        rasterize.args,
        vec!["-Tpng", "cfg.main.dot", "-o", "unoptimizedIR.png"]
    );
}

#[test]
fn test_compile_failure_launches_nothing_further() {
    let (runner, calls) = FakeRunner::failing_at(StageId::Compile);
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);

    let mut sink = CollectingSink::default();
    let err = orch.run(SOURCE, &mut sink).unwrap_err();

    match err {
        PipelineError::StageFailure {
            stage, exit_code, ..
        } => {
            assert_eq!(stage, StageId::Compile);
            assert_eq!(exit_code, 1);
        }
        other => panic!("expected compile stage failure, got {other}"),
    }

    // Only the compiler was ever invoked.
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].stage, StageId::Compile);

    assert!(sink.listing.is_none());
    assert!(sink.image.is_none());
    assert_eq!(sink.failures.len(), 1);
    assert!(sink.failures[0].contains("compile"));
}

#[test]
fn test_selection_is_rederived_per_run_not_cached() {
    let (runner, calls) = FakeRunner::new();
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry.clone(), GraphKind::ControlFlowGraph);

    // Selected, then unselected before the run: must not appear.
    {
        let mut reg = registry.lock().unwrap();
        reg.toggle("mem2reg", true).unwrap();
        reg.toggle("mem2reg", false).unwrap();
    }
    orch.run(SOURCE, &mut CollectingSink::default()).unwrap();
    assert!(!graph_args(&calls).contains(&"-mem2reg".to_string()));

    // Toggled back on: the same orchestrator's next run must carry it.
    registry.lock().unwrap().toggle("mem2reg", true).unwrap();
    orch.run(SOURCE, &mut CollectingSink::default()).unwrap();
    assert!(graph_args(&calls).contains(&"-mem2reg".to_string()));
}

#[test]
fn test_pass_flag_order_follows_registry_order() {
    let (runner, calls) = FakeRunner::new();
    // Registry order: mem2reg before gvn before licm.
    let registry = OptimizationRegistry::default_catalog().into_shared();
    {
        let mut reg = registry.lock().unwrap();
        // Toggle in the opposite order.
        reg.toggle("licm", true).unwrap();
        reg.toggle("mem2reg", true).unwrap();
    }

    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);
    orch.run(SOURCE, &mut CollectingSink::default()).unwrap();

    let args = graph_args(&calls);
    assert_eq!(args, vec!["unoptimized.bc", "-mem2reg", "-licm", "-dot-cfg"]);
}

#[test]
fn test_reset_empties_pass_flags() {
    let (runner, calls) = FakeRunner::new();
    let registry = OptimizationRegistry::default_catalog().into_shared();
    {
        let mut reg = registry.lock().unwrap();
        reg.toggle("mem2reg", true).unwrap();
        reg.toggle("gvn", true).unwrap();
        reg.reset();
    }

    let orch = orchestrator(runner, registry, GraphKind::Dominator);
    orch.run(SOURCE, &mut CollectingSink::default()).unwrap();

    assert_eq!(graph_args(&calls), vec!["unoptimized.bc", "-dot-dom"]);
}

#[test]
fn test_graph_kind_changes_only_prefix_and_flag() {
    let kinds = [
        GraphKind::ControlFlowGraph,
        GraphKind::Dominator,
        GraphKind::PostDominator,
    ];

    let mut per_kind = Vec::new();
    for kind in kinds {
        let (runner, calls) = FakeRunner::new();
        let registry = OptimizationRegistry::default_catalog().into_shared();
        let orch = orchestrator(runner, registry, kind);
        orch.run(SOURCE, &mut CollectingSink::default()).unwrap();
        per_kind.push((kind, calls.lock().unwrap().clone()));
    }

    for (kind, calls) in &per_kind {
        let graph = calls
            .iter()
            .find(|c| c.stage == StageId::GraphGenerate)
            .unwrap();
        assert_eq!(
            graph.args.last().unwrap(),
            &format!("-dot-{}", kind.prefix())
        );

        let rasterize = calls.iter().find(|c| c.stage == StageId::Rasterize).unwrap();
        assert_eq!(rasterize.args[1], format!("{}.main.dot", kind.prefix()));
        assert_eq!(rasterize.args[3], "unoptimizedIR.png");
    }

    // Everything before the graph stage is byte-identical across kinds,
    // ignoring the scratch-dir portion of absolute paths.
    let shape = |calls: &[RecordedCall]| -> Vec<(StageId, String, usize)> {
        calls
            .iter()
            .filter(|c| {
                !matches!(c.stage, StageId::GraphGenerate | StageId::Rasterize)
            })
            .map(|c| (c.stage, c.program.clone(), c.args.len()))
            .collect()
    };
    let baseline = shape(&per_kind[0].1);
    for (_, calls) in &per_kind[1..] {
        assert_eq!(shape(calls), baseline);
    }
}

#[test]
fn test_rasterize_failure_keeps_delivered_listing() {
    let (runner, _calls) = FakeRunner::failing_at(StageId::Rasterize);
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);

    let mut sink = CollectingSink::default();
    let err = orch.run(SOURCE, &mut sink).unwrap_err();

    assert!(matches!(
        err,
        PipelineError::StageFailure {
            stage: StageId::Rasterize,
            ..
        }
    ));
    // The listing delivered at the disassemble stage is intact.
    assert_eq!(sink.listing.as_deref(), Some(LISTING_BODY));
    assert!(sink.image.is_none());
    assert_eq!(sink.failures.len(), 1);
}

#[test]
fn test_zero_exit_without_artifact_is_a_failure() {
    let (mut runner, calls) = FakeRunner::new();
    runner.skip_artifact_at = Some(StageId::Translate);
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);

    let err = orch
        .run(SOURCE, &mut CollectingSink::default())
        .unwrap_err();
    match err {
        PipelineError::NoArtifactProduced { stage, expected } => {
            assert_eq!(stage, StageId::Translate);
            assert!(expected.ends_with("unoptimizedIR.ll"));
        }
        other => panic!("expected missing-artifact failure, got {other}"),
    }

    // Translate ran, but nothing after it did.
    let stages: Vec<_> = calls.lock().unwrap().iter().map(|c| c.stage).collect();
    assert_eq!(
        stages,
        vec![StageId::Compile, StageId::Disassemble, StageId::Translate]
    );
}

#[test]
fn test_compile_with_no_class_output_is_no_artifact() {
    let (mut runner, _calls) = FakeRunner::new();
    runner.skip_artifact_at = Some(StageId::Compile);
    let registry = OptimizationRegistry::default_catalog().into_shared();
    let orch = orchestrator(runner, registry, GraphKind::ControlFlowGraph);

    let mut sink = CollectingSink::default();
    let err = orch.run(SOURCE, &mut sink).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::NoArtifactProduced {
            stage: StageId::Compile,
            ..
        }
    ));
    assert!(sink.listing.is_none());
}
