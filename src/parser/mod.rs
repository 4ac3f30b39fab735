//! Parser - PEST-based tokenizer for the StanzaFlow markdown dialect
//!
//! Produces a [`ParseTree`]: a closed set of node types, one per grammar
//! production the AST transformer consumes. Nothing here interprets
//! attribute lines or strips heading markup; that is the transformer's job
//! (see [`crate::ast::transform`]).

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use crate::error::{Location, ParseError};


/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/stanzaflow.pest"]
struct StanzaParser;

/* ===================== Parse Tree ===================== */

/// Root production: the whole document, blocks in source order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseTree {
    pub blocks: Vec<Block>,
}

/// One top-level production of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// `# Title` line, markup included
    Heading { raw: String, location: Location },
    /// `## Agent: Name` followed by its steps
    Agent(AgentNode),
    /// `%%escape target` ... `%%`
    Escape {
        target: String,
        body: String,
        location: Location,
    },
    /// `!env VAR_NAME`
    Secret { env_var: String, location: Location },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentNode {
    pub name: Option<String>,
    pub steps: Vec<StepNode>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
    pub name: Option<String>,
    pub attr_lines: Vec<AttrLine>,
    pub location: Location,
}

/// An indented line under a step, exactly as written (minus indentation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrLine {
    pub text: String,
    pub location: Location,
}

/* ===================== Public API ===================== */

/// Tokenize `source` into a parse tree.
///
/// `source_label` names the input in diagnostics (a file path or `<string>`).
pub fn parse_tree(source: &str, source_label: &str) -> Result<ParseTree, ParseError> {
    let mut pairs = StanzaParser::parse(Rule::document, source)
        .map_err(|err| pest_failure(err, source_label))?;

    let document = pairs
        .next()
        .ok_or_else(|| build_failure(source_label, "Empty parse result", None))?;

    let builder = TreeBuilder { source_label };
    builder.build_document(document.into_inner())
}

/* ===================== Error Conversion ===================== */

fn pest_failure(err: pest::error::Error<Rule>, source_label: &str) -> ParseError {
    let location = match err.line_col {
        pest::error::LineColLocation::Pos((line, column)) => Location { line, column },
        pest::error::LineColLocation::Span((line, column), _) => Location { line, column },
    };
    ParseError::Pest {
        source_label: source_label.to_string(),
        message: err.to_string(),
        location: Some(location),
    }
}

fn build_failure(
    source_label: &str,
    message: impl Into<String>,
    location: Option<Location>,
) -> ParseError {
    ParseError::Build {
        source_label: source_label.to_string(),
        message: message.into(),
        location,
    }
}

fn pair_location(pair: &Pair<Rule>) -> Location {
    let (line, column) = pair.as_span().start_pos().line_col();
    Location { line, column }
}

/* ===================== Tree Builder ===================== */

struct TreeBuilder<'a> {
    source_label: &'a str,
}

impl TreeBuilder<'_> {
    fn build_document(&self, pairs: Pairs<Rule>) -> Result<ParseTree, ParseError> {
        let mut blocks = Vec::new();

        for pair in pairs {
            let location = pair_location(&pair);
            match pair.as_rule() {
                Rule::heading => blocks.push(Block::Heading {
                    raw: pair.as_str().to_string(),
                    location,
                }),
                Rule::agent_block => blocks.push(Block::Agent(self.build_agent(pair)?)),
                Rule::escape_block => blocks.push(self.build_escape(pair)?),
                Rule::secret_decl => blocks.push(self.build_secret(pair)?),
                Rule::EOI => {}
                other => return Err(self.unexpected("document", other, location)),
            }
        }

        Ok(ParseTree { blocks })
    }

    fn build_agent(&self, pair: Pair<Rule>) -> Result<AgentNode, ParseError> {
        // agent_block = { agent_header ~ (blank_line* ~ step)* }
        let location = pair_location(&pair);
        let mut name = None;
        let mut steps = Vec::new();

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::agent_header => {
                    name = child
                        .into_inner()
                        .find(|p| p.as_rule() == Rule::agent_name)
                        .map(|p| p.as_str().to_string());
                }
                Rule::step => steps.push(self.build_step(child)?),
                other => return Err(self.unexpected("agent block", other, pair_location(&child))),
            }
        }

        Ok(AgentNode {
            name,
            steps,
            location,
        })
    }

    fn build_step(&self, pair: Pair<Rule>) -> Result<StepNode, ParseError> {
        // step = { step_marker ~ step_name? ~ line_end ~ (blank_line* ~ step_attr)* }
        let location = pair_location(&pair);
        let mut name = None;
        let mut attr_lines = Vec::new();

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::step_name => name = Some(child.as_str().to_string()),
                Rule::step_attr => {
                    let line = child.into_inner().next().ok_or_else(|| {
                        let message = "Step attribute without text";
                        build_failure(self.source_label, message, Some(location))
                    })?;
                    attr_lines.push(AttrLine {
                        text: line.as_str().to_string(),
                        location: pair_location(&line),
                    });
                }
                other => return Err(self.unexpected("step", other, pair_location(&child))),
            }
        }

        Ok(StepNode {
            name,
            attr_lines,
            location,
        })
    }

    fn build_escape(&self, pair: Pair<Rule>) -> Result<Block, ParseError> {
        // escape_block = { escape_open ~ escape_body ~ escape_close }
        let location = pair_location(&pair);
        let mut target = None;
        let mut body = String::new();

        for child in pair.into_inner() {
            match child.as_rule() {
                Rule::escape_target => target = Some(child.as_str().to_string()),
                Rule::escape_body => body = child.as_str().to_string(),
                other => {
                    return Err(self.unexpected("escape block", other, pair_location(&child)))
                }
            }
        }

        let target = target.ok_or_else(|| {
            build_failure(
                self.source_label,
                "Escape block is missing its target",
                Some(location),
            )
        })?;

        Ok(Block::Escape {
            target,
            body,
            location,
        })
    }

    fn build_secret(&self, pair: Pair<Rule>) -> Result<Block, ParseError> {
        let location = pair_location(&pair);
        let env_var = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::env_var)
            .map(|p| p.as_str().to_string())
            .ok_or_else(|| {
                build_failure(
                    self.source_label,
                    "Secret declaration is missing a variable name",
                    Some(location),
                )
            })?;

        Ok(Block::Secret { env_var, location })
    }

    fn unexpected(&self, context: &str, rule: Rule, location: Location) -> ParseError {
        build_failure(
            self.source_label,
            format!("Unexpected {} content: {:?}", context, rule),
            Some(location),
        )
    }
}
