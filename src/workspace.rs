// This module owns the per-run scratch directory and the file-name conventions the
// stages chain through. Every derived path is a pure function of the workspace root
// (and the GraphKind for the dot file); the names are a hard contract between stages,
// since each external tool reads exactly what the previous one wrote. The directory is
// held through tempfile::TempDir, so it is removed on every exit path, including stage
// failure and cancellation. A Workspace is single-use: one pipeline run owns it
// exclusively and a re-run allocates a fresh one.

//! Per-run scratch directory and file-name conventions.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::WorkspaceError;
use crate::pipeline::{GraphKind, StageId};

/// File the user's source text is written to.
pub const SOURCE_FILE: &str = "source.java";
/// Capture file for the disassembler's stdout.
pub const LISTING_FILE: &str = "out.txt";
/// Textual IR emitted by the translator.
pub const IR_FILE: &str = "unoptimizedIR.ll";
/// Bitcode emitted by the IR assembler.
pub const BITCODE_FILE: &str = "unoptimized.bc";
/// Rendered graph image emitted by the layout tool.
pub const IMAGE_FILE: &str = "unoptimizedIR.png";

/// Extension of the compiled artifact the compile stage must produce.
const CLASS_EXTENSION: &str = "class";

/// One pipeline run's scratch directory.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    source_file: Option<PathBuf>,
    class_file: Option<PathBuf>,
}

impl Workspace {
    /// Allocate a new empty scratch directory with a process-unique name.
    pub fn create() -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix("irpipe-")
            .tempdir()
            .map_err(WorkspaceError::Create)?;
        log::debug!("workspace at {}", dir.path().display());
        Ok(Self {
            dir,
            source_file: None,
            class_file: None,
        })
    }

    /// Root directory every stage runs in.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write the user's source text into the workspace.
    pub fn write_source(&mut self, text: &str) -> Result<PathBuf, WorkspaceError> {
        let path = self.root().join(SOURCE_FILE);
        fs::write(&path, text).map_err(|source| WorkspaceError::Write {
            path: path.clone(),
            source,
        })?;
        self.source_file = Some(path.clone());
        Ok(path)
    }

    /// Path of the written source, once `write_source` has run.
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Compiled artifacts present in the workspace, sorted by name.
    ///
    /// Inner-class artifacts (a `$` in the stem) are skipped; the compiler
    /// emits one per nested class and none of them is the entry class.
    pub fn class_candidates(&self) -> Result<Vec<PathBuf>, WorkspaceError> {
        let entries = fs::read_dir(self.root()).map_err(|source| WorkspaceError::Scan {
            path: self.root().to_path_buf(),
            source,
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(CLASS_EXTENSION)
                    && path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|stem| !stem.contains('$'))
            })
            .collect();
        candidates.sort();
        Ok(candidates)
    }

    /// Record the compiled artifact located after a successful compile.
    pub fn set_class_file(&mut self, path: PathBuf) {
        self.class_file = Some(path);
    }

    /// Compiled artifact, valid only after the compile stage succeeded.
    pub fn class_file(&self) -> Option<&Path> {
        self.class_file.as_deref()
    }

    /// Capture file the disassembler's stdout is redirected to.
    pub fn listing_file(&self) -> PathBuf {
        self.root().join(LISTING_FILE)
    }

    /// Textual IR the translator emits.
    pub fn ir_file(&self) -> PathBuf {
        self.root().join(IR_FILE)
    }

    /// Bitcode the IR assembler emits.
    pub fn bitcode_file(&self) -> PathBuf {
        self.root().join(BITCODE_FILE)
    }

    /// Dot file the graph stage emits for the given kind.
    pub fn graph_dot_file(&self, kind: GraphKind) -> PathBuf {
        self.root().join(kind.dot_file_name())
    }

    /// Rendered graph image.
    pub fn graph_image_file(&self) -> PathBuf {
        self.root().join(IMAGE_FILE)
    }

    /// Per-stage stderr capture file.
    pub fn stderr_file(&self, stage: StageId) -> PathBuf {
        self.root().join(format!("{stage}.stderr.txt"))
    }

    /// Per-stage stdout capture file, for stages whose stdout is kept but is
    /// not part of the artifact chain.
    pub fn stdout_file(&self, stage: StageId) -> PathBuf {
        self.root().join(format!("{stage}.stdout.txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_write_source() {
        let mut ws = Workspace::create().unwrap();
        let path = ws.write_source("class A {}").unwrap();
        assert_eq!(path.file_name().unwrap(), SOURCE_FILE);
        assert_eq!(fs::read_to_string(&path).unwrap(), "class A {}");
        assert_eq!(ws.source_file(), Some(path.as_path()));
    }

    #[test]
    fn test_directory_removed_on_drop() {
        let root = {
            let ws = Workspace::create().unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn test_derived_paths_share_the_root() {
        let ws = Workspace::create().unwrap();
        for path in [
            ws.listing_file(),
            ws.ir_file(),
            ws.bitcode_file(),
            ws.graph_image_file(),
            ws.graph_dot_file(GraphKind::Dominator),
        ] {
            assert_eq!(path.parent().unwrap(), ws.root());
        }
        assert_eq!(
            ws.graph_dot_file(GraphKind::Dominator).file_name().unwrap(),
            "dom.main.dot"
        );
    }

    #[test]
    fn test_class_candidates_skip_inner_classes_and_sort() {
        let ws = Workspace::create().unwrap();
        for name in ["Outer$1.class", "B.class", "A.class", "notes.txt"] {
            fs::write(ws.root().join(name), b"").unwrap();
        }
        let names: Vec<_> = ws
            .class_candidates()
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["A.class", "B.class"]);
    }
}
