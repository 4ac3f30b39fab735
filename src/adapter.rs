//! Backend adapter interface
//!
//! A backend consumes validated [`Ir`] and writes runnable assets for some
//! workflow framework, returning the path of the entry-point file. No backend
//! lives in this crate; this module is the contract they implement and the
//! registry the host uses to find them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::AttributeKey;
use crate::ir::Ir;

/// Something a workflow needs, or a backend can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Sequential,
    Agents,
    Steps,
    Artifacts,
    Retry,
    Timeout,
    Branching,
    Parallel,
    Loops,
    Secrets,
    EscapeBlocks,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Sequential => "sequential",
            Feature::Agents => "agents",
            Feature::Steps => "steps",
            Feature::Artifacts => "artifacts",
            Feature::Retry => "retry",
            Feature::Timeout => "timeout",
            Feature::Branching => "branching",
            Feature::Parallel => "parallel",
            Feature::Loops => "loops",
            Feature::Secrets => "secrets",
            Feature::EscapeBlocks => "escape_blocks",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Unknown adapter '{name}'. Available adapters: {}", available.join(", "))]
    UnknownAdapter { name: String, available: Vec<String> },

    #[error("Adapter '{target}' failed: {message}")]
    Emit { target: String, message: String },

    #[error("Adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A code-emission backend.
pub trait Adapter: Send + Sync {
    /// Canonical lowercase identifier, e.g. `"langgraph"`
    fn target(&self) -> &str;

    fn capabilities(&self) -> BTreeSet<Feature> {
        BTreeSet::from([Feature::Sequential, Feature::Agents, Feature::Steps, Feature::Artifacts])
    }

    /// Write assets for `ir` under `output_dir`; returns the entry-point path.
    fn emit(&self, ir: &Ir, output_dir: &Path) -> Result<PathBuf, AdapterError>;

    /// Whether escape blocks are passed through to the generated code
    fn supports_escape_blocks(&self) -> bool {
        false
    }

    /// What `ir` needs from a backend.
    fn required_features(&self, ir: &Ir) -> BTreeSet<Feature> {
        required_features(ir)
    }

    /// What `ir` needs that this backend cannot do.
    fn capability_gaps(&self, ir: &Ir) -> BTreeSet<Feature> {
        let supported = self.capabilities();
        self.required_features(ir)
            .into_iter()
            .filter(|feature| !supported.contains(feature))
            .collect()
    }
}

/// Features a workflow uses, derived from its IR alone.
pub fn required_features(ir: &Ir) -> BTreeSet<Feature> {
    let mut features = BTreeSet::new();
    let workflow = &ir.workflow;

    if !workflow.agents.is_empty() {
        features.insert(Feature::Agents);
    }

    for step in workflow.agents.iter().flat_map(|agent| &agent.steps) {
        features.insert(Feature::Steps);
        for key in step.attributes.keys() {
            match key {
                AttributeKey::Artifact => features.insert(Feature::Artifacts),
                AttributeKey::Retry => features.insert(Feature::Retry),
                AttributeKey::Timeout => features.insert(Feature::Timeout),
                AttributeKey::Branch => features.insert(Feature::Branching),
                AttributeKey::OnError | AttributeKey::Finally => false,
            };
        }
    }

    if !workflow.secrets.is_empty() {
        features.insert(Feature::Secrets);
    }
    if !workflow.escape_blocks.is_empty() {
        features.insert(Feature::EscapeBlocks);
    }

    features
}

/// Adapters by target name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under its target, replacing any previous one.
    pub fn register(&mut self, adapter: Box<dyn Adapter>) {
        self.adapters.insert(adapter.target().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Result<&dyn Adapter, AdapterError> {
        self.adapters
            .get(name)
            .map(|adapter| adapter.as_ref())
            .ok_or_else(|| AdapterError::UnknownAdapter {
                name: name.to_string(),
                available: self.targets(),
            })
    }

    /// Registered targets, sorted
    pub fn targets(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }
}
