// This module executes the external tools. CommandSpec describes one invocation: the
// program name, its arguments, the working directory, and where stdout/stderr go
// (inherited from the parent or captured to a file). ProcessRunner is the seam the
// orchestrator drives invocations through, so tests substitute a recording fake without
// spawning anything. SystemRunner is the real implementation over std::process: it
// blocks until the child exits, polling a shared CancelToken so an explicit cancel or a
// closed workspace kills the outstanding child instead of waiting it out. A launch
// failure (program missing) is an error; a nonzero exit is a normal StageResult the
// orchestrator inspects.

//! External process execution and cancellation.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::PipelineError;
use crate::pipeline::{StageId, StageResult};

/// Interval between cancellation checks while a child is outstanding.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exit code reported when the child was terminated by a signal.
const SIGNALED_EXIT_CODE: i32 = -1;

/// Where a child's output stream goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Pass through to the parent's stream.
    Inherit,
    /// Redirect into the given file.
    CaptureFile(PathBuf),
}

impl OutputTarget {
    /// Capture file path, if this target captures.
    pub fn capture_path(&self) -> Option<&Path> {
        match self {
            OutputTarget::Inherit => None,
            OutputTarget::CaptureFile(path) => Some(path),
        }
    }
}

/// One external invocation: program, arguments, working directory, streams.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub stdout: OutputTarget,
    pub stderr: OutputTarget,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            stdout: OutputTarget::Inherit,
            stderr: OutputTarget::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdout(mut self, target: OutputTarget) -> Self {
        self.stdout = target;
        self
    }

    pub fn stderr(mut self, target: OutputTarget) -> Self {
        self.stderr = target;
        self
    }

    /// Full command line, for logs and launch-failure messages.
    pub fn rendered(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Shared flag that requests termination of the in-flight run.
///
/// Cloned tokens observe the same flag; cancelling any clone cancels the run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination of the currently running external process.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Seam between the orchestrator and external processes.
///
/// The real implementation is [`SystemRunner`]; tests substitute a fake that
/// records the call log and fabricates stage outputs.
pub trait ProcessRunner {
    /// Run the command to completion, blocking the calling thread.
    ///
    /// A nonzero exit is a normal [`StageResult`]; only launch failure,
    /// cancellation, and i/o faults around the capture files are errors.
    /// No timeout is imposed here.
    fn run(
        &self,
        stage: StageId,
        spec: &CommandSpec,
        cancel: &CancelToken,
    ) -> Result<StageResult, PipelineError>;
}

/// `ProcessRunner` over `std::process::Command`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    fn stdio_for(stage: StageId, target: &OutputTarget) -> Result<Stdio, PipelineError> {
        match target {
            OutputTarget::Inherit => Ok(Stdio::inherit()),
            OutputTarget::CaptureFile(path) => {
                let file = File::create(path)
                    .map_err(|source| PipelineError::Io { stage, source })?;
                Ok(Stdio::from(file))
            }
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(
        &self,
        stage: StageId,
        spec: &CommandSpec,
        cancel: &CancelToken,
    ) -> Result<StageResult, PipelineError> {
        log::debug!("{stage}: {}", spec.rendered());

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdout(Self::stdio_for(stage, &spec.stdout)?)
            .stderr(Self::stdio_for(stage, &spec.stderr)?)
            .spawn()
            .map_err(|source| PipelineError::Launch {
                stage,
                command: spec.rendered(),
                source,
            })?;

        let status = loop {
            if cancel.is_cancelled() {
                log::info!("{stage}: cancelled, killing pid {}", child.id());
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::Cancelled { stage });
            }
            match child
                .try_wait()
                .map_err(|source| PipelineError::Io { stage, source })?
            {
                Some(status) => break status,
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stderr = match spec.stderr.capture_path() {
            Some(path) => fs::read_to_string(path).unwrap_or_default(),
            None => String::new(),
        };

        Ok(StageResult {
            stage,
            exit_code: status.code().unwrap_or(SIGNALED_EXIT_CODE),
            stdout: spec.stdout.capture_path().map(Path::to_path_buf),
            stderr,
        })
    }
}
