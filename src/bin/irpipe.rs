// Command-line front end for the pipeline. Reads a Java source file, loads the
// optimization-pass catalog, applies the requested pass toggles, runs the full pipeline
// on a worker thread, prints the bytecode listing, and copies the rendered graph image
// out of the scratch directory before it is cleaned up. Exit status 0 means the run
// reached Deliver; any stage failure exits 1 after the stage-tagged error is reported.

//! irpipe - run the source-to-flow-graph toolchain pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use irpipe::{
    worker, GraphKind, OptimizationRegistry, PipelineError, ResultSink, StageId,
    ToolchainConfig,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GraphArg {
    Cfg,
    Dom,
    Postdom,
}

impl From<GraphArg> for GraphKind {
    fn from(arg: GraphArg) -> Self {
        match arg {
            GraphArg::Cfg => GraphKind::ControlFlowGraph,
            GraphArg::Dom => GraphKind::Dominator,
            GraphArg::Postdom => GraphKind::PostDominator,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "irpipe", about = "Compile source and render its LLVM flow graph")]
struct Cli {
    /// Java source file to run through the pipeline.
    source: Option<PathBuf>,

    /// Flow-graph variant to render.
    #[arg(long, value_enum, default_value = "cfg")]
    graph: GraphArg,

    /// Optimization pass to apply before graph emission (repeatable).
    #[arg(short = 'O', long = "opt", value_name = "PASS")]
    passes: Vec<String>,

    /// Pass catalog JSON file; the built-in catalog is used when omitted.
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// List the known passes and exit.
    #[arg(long)]
    list_passes: bool,

    /// LLVM-JVM translator install directory (overrides LLVM_JVM_HOME).
    #[arg(long, value_name = "DIR")]
    toolchain_home: Option<PathBuf>,

    /// Directory the listing and image are copied into (default: current).
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
}

/// Sink that writes pipeline outputs next to the user.
struct CliSink {
    out_dir: PathBuf,
}

impl ResultSink for CliSink {
    fn on_stage_started(&mut self, stage: StageId) {
        log::info!("stage {stage}");
    }

    fn on_bytecode_listing(&mut self, listing: String) {
        let path = self.out_dir.join("bytecode.txt");
        match fs::write(&path, &listing) {
            Ok(()) => println!("bytecode listing written to {}", path.display()),
            Err(e) => log::error!("could not write {}: {e}", path.display()),
        }
    }

    fn on_graph_image(&mut self, png: Vec<u8>) {
        let path = self.out_dir.join("unoptimizedIR.png");
        match fs::write(&path, &png) {
            Ok(()) => println!("graph image written to {}", path.display()),
            Err(e) => log::error!("could not write {}: {e}", path.display()),
        }
    }

    fn on_failure(&mut self, error: &PipelineError) {
        eprintln!("error: {error}");
    }
}

fn load_registry(catalog: Option<&Path>) -> Result<OptimizationRegistry, PipelineExit> {
    match catalog {
        Some(path) => OptimizationRegistry::load_catalog(path).map_err(|e| {
            eprintln!("error: {e}");
            PipelineExit
        }),
        None => Ok(OptimizationRegistry::default_catalog()),
    }
}

/// Marker for "already reported, exit 1".
struct PipelineExit;

fn run(cli: Cli) -> Result<(), PipelineExit> {
    let mut registry = load_registry(cli.catalog.as_deref())?;

    if cli.list_passes {
        for pass in registry.passes() {
            println!("{pass}");
        }
        return Ok(());
    }

    let Some(source_path) = cli.source else {
        eprintln!("error: no source file given (try --help)");
        return Err(PipelineExit);
    };
    let source_text = fs::read_to_string(&source_path).map_err(|e| {
        eprintln!("error: could not read {}: {e}", source_path.display());
        PipelineExit
    })?;

    for name in &cli.passes {
        if let Err(e) = registry.toggle(name, true) {
            // Recoverable: the run proceeds without the unknown pass.
            log::warn!("{e}, ignoring");
        }
    }

    let config = match cli.toolchain_home {
        Some(home) => ToolchainConfig::with_home(home),
        None => ToolchainConfig::from_env(),
    };

    let out_dir = cli.out.unwrap_or_else(|| PathBuf::from("."));
    if let Err(e) = fs::create_dir_all(&out_dir) {
        eprintln!("error: could not create {}: {e}", out_dir.display());
        return Err(PipelineExit);
    }

    let handle = worker::spawn_run(
        config,
        registry.into_shared(),
        cli.graph.into(),
        source_text,
        Box::new(CliSink { out_dir }),
    )
    .map_err(|e| {
        eprintln!("error: could not start pipeline worker: {e}");
        PipelineExit
    })?;

    // The sink already reported the failure; just carry the status.
    handle.join().map_err(|_| PipelineExit)
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(PipelineExit) => ExitCode::FAILURE,
    }
}
