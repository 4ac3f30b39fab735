//! StanzaFlow compiler front-end
//!
//! Parses the StanzaFlow markdown workflow dialect, lowers it to the
//! versioned IR and validates that IR against the bundled schema.
//!
//! ```no_run
//! let ir = stanzaflow::compile("# Demo\n## Agent: Bot\n- Step: Greet\n  retry: 2\n", "<string>")?;
//! assert_eq!(ir.workflow.agents[0].steps[0].name, "Greet");
//! # Ok::<(), stanzaflow::CompileError>(())
//! ```

pub mod adapter;
pub mod ast;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod ir;
pub mod parser;


// Re-export the facade and main types
pub use ast::{
    Agent, AttributeKey, AttributeValue, EscapeBlock, SecretBlock, Step, StepAttribute, Workflow,
};
pub use compiler::{compile, compile_file, parse, parse_file, workflow_to_ir};
pub use error::{CompileError, Location, ParseError, SchemaError, ValidationError, ViolationKind};
pub use ir::{Ir, IR_VERSION};
