//! Workflow AST and the parse-tree transformer
//!
//! [`transform`] walks a [`ParseTree`] and builds a [`Workflow`]. It is a pure
//! function of the tree: no I/O, and identical trees always produce identical
//! workflows.
//!
//! Attribute lines are recognised here rather than in the grammar. A line that
//! is not a recognised `key: value` pair is dropped, not reported; see
//! [`parse_attribute`].

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::parser::{AgentNode, Block, ParseTree, StepNode};


/* ===================== Attribute Types ===================== */

/// The recognised step attribute keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    Artifact,
    Retry,
    Timeout,
    OnError,
    Branch,
    Finally,
}

impl AttributeKey {
    pub const ALL: [AttributeKey; 6] = [
        AttributeKey::Artifact,
        AttributeKey::Retry,
        AttributeKey::Timeout,
        AttributeKey::OnError,
        AttributeKey::Branch,
        AttributeKey::Finally,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKey::Artifact => "artifact",
            AttributeKey::Retry => "retry",
            AttributeKey::Timeout => "timeout",
            AttributeKey::OnError => "on_error",
            AttributeKey::Branch => "branch",
            AttributeKey::Finally => "finally",
        }
    }

    /// Keys whose value must be a non-negative integer
    pub fn is_numeric(&self) -> bool {
        matches!(self, AttributeKey::Retry | AttributeKey::Timeout)
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a key is not one of [`AttributeKey::ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAttributeKey(pub String);

impl fmt::Display for UnknownAttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown step attribute '{}'", self.0)
    }
}

impl std::error::Error for UnknownAttributeKey {}

impl FromStr for AttributeKey {
    type Err = UnknownAttributeKey;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        AttributeKey::ALL
            .into_iter()
            .find(|key| key.as_str() == lowered)
            .ok_or_else(|| UnknownAttributeKey(s.to_string()))
    }
}

/// A step attribute value.
///
/// Reading from JSON accepts integral floats such as `3.0` as integers, the
/// same way the IR schema's `integer` type does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(u64),
    Text(String),
}

impl TryFrom<JsonValue> for AttributeValue {
    type Error = String;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::String(s) => Ok(AttributeValue::Text(s)),
            JsonValue::Number(n) => {
                if let Some(int) = n.as_u64() {
                    return Ok(AttributeValue::Integer(int));
                }
                match n.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 => {
                        Ok(AttributeValue::Integer(f as u64))
                    }
                    _ => Err(format!("expected a non-negative integer, got {}", n)),
                }
            }
            other => Err(format!("expected a string or integer, got {}", other)),
        }
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        AttributeValue::try_from(value).map_err(de::Error::custom)
    }
}

impl AttributeValue {
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            AttributeValue::Integer(n) => Some(*n),
            AttributeValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Integer(_) => None,
        }
    }
}

impl From<u64> for AttributeValue {
    fn from(n: u64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepAttribute {
    pub key: AttributeKey,
    pub value: AttributeValue,
}

/* ===================== Workflow AST ===================== */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub attributes: Vec<StepAttribute>,
}

impl Step {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// First attribute with `key`. Later duplicates are not reachable here.
    pub fn get_attribute(&self, key: AttributeKey) -> Option<&StepAttribute> {
        self.attributes.iter().find(|attr| attr.key == key)
    }
}

/// An agent and its steps, in execution order. Names need not be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Agent {
    pub name: String,
    pub steps: Vec<Step>,
}

/// Raw target-specific code passed through to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscapeBlock {
    pub target: String,
    pub code: String,
}

/// An environment variable expected to hold a secret at run time.
/// Only the name is recorded; the value is never read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBlock {
    pub env_var: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Workflow {
    pub title: String,
    pub agents: Vec<Agent>,
    pub escape_blocks: Vec<EscapeBlock>,
    pub secret_blocks: Vec<SecretBlock>,
}

/* ===================== Transformer ===================== */

/// Build a workflow from a parse tree.
pub fn transform(tree: &ParseTree) -> Workflow {
    let mut workflow = Workflow::default();
    let mut title = None;

    for block in &tree.blocks {
        match block {
            Block::Heading { raw, .. } => {
                if title.is_none() {
                    title = Some(strip_heading(raw));
                }
            }
            Block::Agent(agent) => workflow.agents.push(transform_agent(agent)),
            Block::Escape { target, body, .. } => workflow.escape_blocks.push(EscapeBlock {
                target: target.trim().to_string(),
                code: body.trim().to_string(),
            }),
            Block::Secret { env_var, .. } => workflow.secret_blocks.push(SecretBlock {
                env_var: env_var.clone(),
            }),
        }
    }

    workflow.title = title.unwrap_or_default();
    workflow
}

fn strip_heading(raw: &str) -> String {
    raw.trim()
        .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
        .trim_end()
        .to_string()
}

fn transform_agent(node: &AgentNode) -> Agent {
    Agent {
        name: node.name.as_deref().map(str::trim).unwrap_or_default().to_string(),
        steps: node.steps.iter().map(transform_step).collect(),
    }
}

fn transform_step(node: &StepNode) -> Step {
    let mut step = Step::new(node.name.as_deref().map(str::trim).unwrap_or_default());

    for line in &node.attr_lines {
        match parse_attribute(&line.text) {
            Some(attr) => step.attributes.push(attr),
            None => tracing::debug!(
                step = %step.name,
                line = line.location.line,
                text = %line.text.trim(),
                "Ignoring unrecognized step attribute line"
            ),
        }
    }

    step
}

static ATTRIBUTE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<key>[a-zA-Z_]+)\s*:\s*(?P<val>.+)$").expect("attribute pattern is valid")
});

/// Recognise one attribute line.
///
/// The line must look like `key: value` (any whitespace around the colon).
/// Returns `None` when the shape does not match, the key is not recognised,
/// or a `retry`/`timeout` value is not made entirely of decimal digits.
pub fn parse_attribute(raw_line: &str) -> Option<StepAttribute> {
    let captures = ATTRIBUTE_LINE.captures(raw_line.trim())?;
    let key: AttributeKey = captures["key"].parse().ok()?;
    let raw_value = captures["val"].trim();

    let value = if key.is_numeric() {
        if raw_value.is_empty() || !raw_value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // all digits but too large for u64 is treated like any other non-number
        AttributeValue::Integer(raw_value.parse().ok()?)
    } else {
        AttributeValue::Text(raw_value.to_string())
    };

    Some(StepAttribute { key, value })
}
