//! Error types for the StanzaFlow front-end
//!
//! Parsing and validation fail with distinct types so callers can tell
//! "the workflow syntax is wrong" apart from "the workflow is syntactically
//! fine but structurally disallowed". [`CompileError`] wraps both without
//! changing their kind.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/* ===================== Parse Errors ===================== */

/// The source text could not be turned into a workflow.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The grammar rejected the input. `message` is pest's rendering, which
    /// quotes the offending line.
    #[error("Parse error in {source_label}: {message}")]
    Pest {
        source_label: String,
        message: String,
        location: Option<Location>,
    },

    /// The parse tree did not have the shape the builder expects.
    #[error("Unexpected error parsing {source_label}: {message}")]
    Build {
        source_label: String,
        message: String,
        location: Option<Location>,
    },

    #[error("Failed to read file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ParseError {
    pub fn location(&self) -> Option<Location> {
        match self {
            ParseError::Pest { location, .. } | ParseError::Build { location, .. } => *location,
            ParseError::Io { .. } => None,
        }
    }

    /// Label of the input that failed: the file path or `<string>`.
    pub fn source_label(&self) -> String {
        match self {
            ParseError::Pest { source_label, .. } | ParseError::Build { source_label, .. } => {
                source_label.clone()
            }
            ParseError::Io { path, .. } => path.display().to_string(),
        }
    }
}

/* ===================== Validation Errors ===================== */

/// Which schema rule an IR document broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// A required property is absent
    Required,
    /// A value has the wrong JSON type
    Type,
    /// A value is outside an enumerated or constant set
    Enum,
    /// An object carries a property the schema does not allow
    NotAllowed,
    /// Any other schema rule
    Other,
}

/// The IR failed schema validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable message naming the path and the violation
    pub message: String,
    /// Location in the IR, e.g. `workflow → agents[0] → steps[0]`, or `root`
    pub path: String,
    /// The offending value
    pub value: JsonValue,
    pub kind: ViolationKind,
    /// The jsonschema error behind this violation. `None` when the document
    /// passed the schema but could not be read as typed IR.
    #[source]
    pub source: Option<Arc<jsonschema::ValidationError<'static>>>,
}

/* ===================== Schema Errors ===================== */

/// The IR schema document itself could not be loaded.
///
/// This is a packaging fault, not a problem with the workflow being compiled.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read IR schema {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IR schema {origin} is not valid JSON: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("IR schema {origin} could not be compiled: {message}")]
    Compile { origin: String, message: String },
}

/* ===================== Compile Errors ===================== */

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl CompileError {
    pub fn is_parse(&self) -> bool {
        matches!(self, CompileError::Parse(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CompileError::Validation(_))
    }
}
