//! IR 0.2 - the versioned contract between the front-end and every backend
//!
//! [`lower`] turns a [`Workflow`] into an [`Ir`] without validating it;
//! [`schema`] validates the JSON form. The facade always does both, so a
//! backend never sees IR that has not passed the schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use crate::ast::{AttributeKey, AttributeValue, Workflow};
use crate::error::{CompileError, ValidationError, ViolationKind};

pub mod schema;


pub const IR_VERSION: &str = "0.2";

/* ===================== IR Types ===================== */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ir {
    pub ir_version: String,
    pub workflow: IrWorkflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrWorkflow {
    pub title: String,
    pub agents: Vec<IrAgent>,
    #[serde(default)]
    pub escape_blocks: Vec<IrEscapeBlock>,
    #[serde(default)]
    pub secrets: Vec<IrSecret>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrAgent {
    pub name: String,
    pub steps: Vec<IrStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrStep {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<AttributeKey, AttributeValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrEscapeBlock {
    pub target: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrSecret {
    pub env_var: String,
}

/* ===================== Lowering ===================== */

/// Lower a workflow to IR. Never fails, including for empty workflows.
///
/// Attributes are written into the step's map in source order, so when a key
/// repeats the last occurrence wins. This is the opposite of
/// [`crate::ast::Step::get_attribute`], which returns the first.
pub fn lower(workflow: &Workflow) -> Ir {
    let agents = workflow
        .agents
        .iter()
        .map(|agent| IrAgent {
            name: agent.name.clone(),
            steps: agent
                .steps
                .iter()
                .map(|step| {
                    let mut attributes = BTreeMap::new();
                    for attr in &step.attributes {
                        attributes.insert(attr.key, attr.value.clone());
                    }
                    IrStep {
                        name: step.name.clone(),
                        attributes,
                    }
                })
                .collect(),
        })
        .collect();

    Ir {
        ir_version: IR_VERSION.to_string(),
        workflow: IrWorkflow {
            title: workflow.title.clone(),
            agents,
            escape_blocks: workflow
                .escape_blocks
                .iter()
                .map(|escape| IrEscapeBlock {
                    target: escape.target.clone(),
                    code: escape.code.clone(),
                })
                .collect(),
            secrets: workflow
                .secret_blocks
                .iter()
                .map(|secret| IrSecret {
                    env_var: secret.env_var.clone(),
                })
                .collect(),
        },
    }
}

/* ===================== JSON Form ===================== */

impl Ir {
    /// The mapping form handed to the schema validator and to backends.
    pub fn to_value(&self) -> JsonValue {
        JsonValue::from(self)
    }

    /// Validate an externally supplied IR document, then read it as typed IR.
    pub fn from_value(value: &JsonValue) -> Result<Ir, CompileError> {
        schema::validate_value(value)?;
        serde_json::from_value(value.clone()).map_err(|err| {
            CompileError::Validation(ValidationError {
                message: format!("IR does not match the 0.2 layout: {}", err),
                path: "root".to_string(),
                value: value.clone(),
                kind: ViolationKind::Other,
                source: None,
            })
        })
    }

    pub fn to_json_pretty(&self) -> String {
        // Value's Display with `#` is the pretty printer and cannot fail.
        format!("{:#}", self.to_value())
    }
}

impl From<&Ir> for JsonValue {
    fn from(ir: &Ir) -> Self {
        let agents: Vec<JsonValue> = ir
            .workflow
            .agents
            .iter()
            .map(|agent| {
                let steps: Vec<JsonValue> = agent
                    .steps
                    .iter()
                    .map(|step| {
                        let attributes: Map<String, JsonValue> = step
                            .attributes
                            .iter()
                            .map(|(key, value)| (key.as_str().to_string(), attribute_json(value)))
                            .collect();
                        json!({ "name": step.name, "attributes": attributes })
                    })
                    .collect();
                json!({ "name": agent.name, "steps": steps })
            })
            .collect();

        let escape_blocks: Vec<JsonValue> = ir
            .workflow
            .escape_blocks
            .iter()
            .map(|escape| json!({ "target": escape.target, "code": escape.code }))
            .collect();

        let secrets: Vec<JsonValue> = ir
            .workflow
            .secrets
            .iter()
            .map(|secret| json!({ "env_var": secret.env_var }))
            .collect();

        json!({
            "ir_version": ir.ir_version,
            "workflow": {
                "title": ir.workflow.title,
                "agents": agents,
                "escape_blocks": escape_blocks,
                "secrets": secrets,
            }
        })
    }
}

fn attribute_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Integer(n) => JsonValue::from(*n),
        AttributeValue::Text(s) => JsonValue::from(s.as_str()),
    }
}
