// This module provides the optimization-pass catalog and selection state. The registry
// is an insertion-ordered list of named passes, each with a selected flag; the order of
// selected_names() determines the order of -<pass> flags handed to the graph-generation
// stage, so it must be stable and reproducible. Catalogs load once at startup, either
// from a JSON file (an array of {name, description} entries, the same shape the
// reference toolchain shipped) or from the built-in default list. The registry is a
// plain value owned by one editing session; SharedRegistry wraps it in Arc<Mutex<..>>
// so a background pipeline run can re-derive the selection immediately before the
// graph stage while the presentation layer keeps toggling checkboxes.

//! Optimization-pass catalog and selection state.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::{fmt, fs};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, UnknownOptimization};

/// One catalog entry as serialized in a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A named optimization pass and whether it is currently selected.
///
/// Identity is `name`, unique within a registry. Entries are never removed
/// during a run; only the selection flag mutates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Optimization {
    name: String,
    description: String,
    selected: bool,
}

impl Optimization {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }
}

impl fmt::Display for Optimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.description)
    }
}

/// Registry shared between an editing session and a background pipeline run.
pub type SharedRegistry = Arc<Mutex<OptimizationRegistry>>;

/// Insertion-ordered set of optimization passes with selection flags.
///
/// There is no process-wide instance: each editing session constructs its own
/// registry and passes it to the orchestrator explicitly.
#[derive(Debug, Default, Clone)]
pub struct OptimizationRegistry {
    passes: Vec<Optimization>,
}

/// Passes the stock `opt` tool accepts, used when no catalog file is given.
const DEFAULT_PASSES: &[(&str, &str)] = &[
    ("mem2reg", "Promote stack slots to SSA registers"),
    ("instcombine", "Combine redundant instructions"),
    ("simplifycfg", "Simplify the control-flow graph"),
    ("sroa", "Scalar replacement of aggregates"),
    ("gvn", "Global value numbering"),
    ("sccp", "Sparse conditional constant propagation"),
    ("dce", "Dead code elimination"),
    ("adce", "Aggressive dead code elimination"),
    ("licm", "Loop invariant code motion"),
    ("loop-rotate", "Rotate loops into do-while form"),
    ("loop-unroll", "Unroll loops"),
    ("indvars", "Canonicalize induction variables"),
    ("reassociate", "Reassociate commutative expressions"),
    ("tailcallelim", "Eliminate tail calls"),
    ("jump-threading", "Thread jumps over conditional branches"),
];

impl OptimizationRegistry {
    /// Build a registry from catalog entries, preserving their order.
    ///
    /// Duplicate names violate the registry invariant; the first occurrence
    /// wins and later ones are dropped with a warning.
    pub fn from_catalog(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut registry = Self::default();
        for entry in entries {
            if registry.contains(&entry.name) {
                log::warn!("dropping duplicate catalog entry `{}`", entry.name);
                continue;
            }
            registry.passes.push(Optimization {
                name: entry.name,
                description: entry.description,
                selected: false,
            });
        }
        registry
    }

    /// Load a catalog from a JSON file: an array of `{name, description}`.
    pub fn load_catalog(path: &Path) -> Result<Self, CatalogError> {
        let text = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<CatalogEntry> =
            serde_json::from_str(&text).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        log::info!("loaded {} passes from {}", entries.len(), path.display());
        Ok(Self::from_catalog(entries))
    }

    /// Built-in catalog of passes the stock `opt` tool accepts.
    pub fn default_catalog() -> Self {
        Self::from_catalog(DEFAULT_PASSES.iter().map(|(name, description)| {
            CatalogEntry {
                name: (*name).to_string(),
                description: (*description).to_string(),
            }
        }))
    }

    /// Wrap the registry for sharing with a background run.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Set the selection flag of the named pass.
    pub fn toggle(&mut self, name: &str, selected: bool) -> Result<(), UnknownOptimization> {
        match self.passes.iter_mut().find(|opt| opt.name == name) {
            Some(opt) => {
                opt.selected = selected;
                Ok(())
            }
            None => Err(UnknownOptimization {
                name: name.to_string(),
            }),
        }
    }

    /// Clear every selection.
    pub fn reset(&mut self) {
        for opt in &mut self.passes {
            opt.selected = false;
        }
    }

    /// Names of the selected passes, in registry insertion order.
    ///
    /// This order, not the order toggles were issued in, determines the order
    /// of pass flags in the graph-generation argument list.
    pub fn selected_names(&self) -> Vec<String> {
        self.passes
            .iter()
            .filter(|opt| opt.selected)
            .map(|opt| opt.name.clone())
            .collect()
    }

    /// Whether the registry holds a pass with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.passes.iter().any(|opt| opt.name == name)
    }

    /// All passes, in insertion order.
    pub fn passes(&self) -> impl Iterator<Item = &Optimization> {
        self.passes.iter()
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}
