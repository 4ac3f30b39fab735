//! Compiler facade
//!
//! The only entry points downstream code needs:
//!
//! - [`parse`] / [`parse_file`]: source → [`Workflow`]
//! - [`compile`] / [`compile_file`]: source → validated [`Ir`]
//!
//! The pipeline is strictly linear (text → parse tree → AST → IR → validated
//! IR) and synchronous. A failure at any stage aborts the call; parse failures
//! and validation failures keep their distinct kinds inside [`CompileError`].

use std::path::Path;

use tracing::{debug, instrument};

use crate::ast::{self, Workflow};
use crate::error::{CompileError, ParseError};
use crate::ir::{self, schema, Ir};
use crate::parser;

/// Label used for sources that did not come from a file.
pub const STRING_SOURCE: &str = "<string>";

/// Parse source text into a workflow.
///
/// `source_label` appears in error messages.
#[instrument(skip(source), fields(bytes = source.len()))]
pub fn parse(source: &str, source_label: &str) -> Result<Workflow, ParseError> {
    let tree = parser::parse_tree(source, source_label)?;
    let workflow = ast::transform(&tree);
    debug!(
        title = %workflow.title,
        agents = workflow.agents.len(),
        escape_blocks = workflow.escape_blocks.len(),
        secrets = workflow.secret_blocks.len(),
        "Parsed workflow"
    );
    Ok(workflow)
}

/// Read a UTF-8 file and parse it. Read failures are parse failures.
pub fn parse_file(path: &Path) -> Result<Workflow, ParseError> {
    let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&source, &path.display().to_string())
}

/// Lower a workflow and validate the result.
pub fn workflow_to_ir(workflow: &Workflow) -> Result<Ir, CompileError> {
    let ir = ir::lower(workflow);
    schema::shared()?.validate(&ir.to_value())?;
    Ok(ir)
}

/// Parse, lower and validate source text.
#[instrument(skip(source), fields(bytes = source.len()))]
pub fn compile(source: &str, source_label: &str) -> Result<Ir, CompileError> {
    let workflow = parse(source, source_label)?;
    workflow_to_ir(&workflow)
}

/// Parse, lower and validate a file.
#[instrument]
pub fn compile_file(path: &Path) -> Result<Ir, CompileError> {
    let workflow = parse_file(path)?;
    workflow_to_ir(&workflow)
}
