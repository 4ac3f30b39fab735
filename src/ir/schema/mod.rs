//! IR schema validation
//!
//! The IR 0.2 JSON Schema ships inside the binary (`schemas/ir-0.2.json`).
//! [`shared`] and [`validate_value`] always use that bundled copy; nothing
//! in the environment can replace it. A schema on disk can still be compiled
//! explicitly with [`IrSchema::load`], which is never cached.
//!
//! The compiled validator is built once per process and shared. The first
//! caller takes an init lock, so concurrent first use never loads the schema
//! twice. After that, reads are lock-free.
//!
//! Validation is fail-fast: the first violation is reported as a
//! [`ValidationError`] with a human-readable path such as
//! `workflow → agents[0] → steps[0] → attributes`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use jsonschema::error::{TypeKind, ValidationErrorKind};
use jsonschema::Validator;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{CompileError, SchemaError, ValidationError, ViolationKind};

#[cfg(test)]
mod tests;

const BUNDLED_SCHEMA: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/schemas/ir-0.2.json"));
const BUNDLED_ORIGIN: &str = "<bundled ir-0.2.json>";

static SHARED: OnceLock<IrSchema> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/* ===================== Schema Source ===================== */

/// Where an explicitly loaded schema document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// The copy compiled into the crate
    Bundled,
    /// A file on disk, with the bundled copy as fallback
    File(PathBuf),
}

/* ===================== Compiled Schema ===================== */

/// A compiled IR schema.
pub struct IrSchema {
    validator: Validator,
    origin: String,
}

impl std::fmt::Debug for IrSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IrSchema").field("origin", &self.origin).finish()
    }
}

impl IrSchema {
    /// Load and compile a schema. A [`SchemaSource::File`] that fails for any
    /// reason falls back to the bundled schema.
    pub fn load(source: &SchemaSource) -> Result<Self, SchemaError> {
        match source {
            SchemaSource::Bundled => Self::bundled(),
            SchemaSource::File(path) => match Self::from_file(path) {
                Ok(schema) => Ok(schema),
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Falling back to bundled IR schema"
                    );
                    Self::bundled()
                }
            },
        }
    }

    pub fn bundled() -> Result<Self, SchemaError> {
        Self::from_text(BUNDLED_SCHEMA, BUNDLED_ORIGIN)
    }

    /// Load from `path` with no fallback.
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_text(&text, &path.display().to_string())
    }

    fn from_text(text: &str, origin: &str) -> Result<Self, SchemaError> {
        let document: JsonValue = serde_json::from_str(text).map_err(|source| SchemaError::Json {
            origin: origin.to_string(),
            source,
        })?;
        let validator = jsonschema::validator_for(&document).map_err(|err| SchemaError::Compile {
            origin: origin.to_string(),
            message: err.to_string(),
        })?;

        Ok(Self {
            validator,
            origin: origin.to_string(),
        })
    }

    /// Where this schema was loaded from
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Validate `ir`, reporting the first violation.
    pub fn validate(&self, ir: &JsonValue) -> Result<(), ValidationError> {
        match self.validator.iter_errors(ir).next() {
            None => Ok(()),
            Some(err) => Err(to_validation_error(ir, err)),
        }
    }
}

/* ===================== Process-wide Cache ===================== */

/// The shared bundled schema, compiled on first use.
///
/// A failed load is not cached; the next call tries again.
pub fn shared() -> Result<&'static IrSchema, SchemaError> {
    init_once(&SHARED, &INIT_LOCK, || {
        debug!("Initializing shared IR schema");
        let schema = IrSchema::bundled()?;
        info!(origin = %schema.origin(), "IR schema loaded");
        Ok(schema)
    })
}

/// Fill `cell` with `load` at most once, serialising first use on `lock`.
///
/// Readers after the fill never touch the lock. An `Err` from `load` leaves
/// the cell empty.
pub(crate) fn init_once<'a, T, E>(
    cell: &'a OnceLock<T>,
    lock: &Mutex<()>,
    load: impl FnOnce() -> Result<T, E>,
) -> Result<&'a T, E> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }

    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    // Another caller may have finished while we waited for the lock
    if let Some(value) = cell.get() {
        return Ok(value);
    }

    let value = load()?;
    Ok(cell.get_or_init(|| value))
}

/// Validate `ir` against the shared schema.
pub fn validate_value(ir: &JsonValue) -> Result<(), CompileError> {
    shared()?.validate(ir)?;
    Ok(())
}

/* ===================== Error Rendering ===================== */

fn to_validation_error(
    instance: &JsonValue,
    err: jsonschema::ValidationError<'_>,
) -> ValidationError {
    let path = human_path(instance, &err.instance_path.to_string());
    let value = err.instance.clone().into_owned();

    let (kind, message) = match &err.kind {
        ValidationErrorKind::Required { property } => (
            ViolationKind::Required,
            format!("Missing required property '{}' at {}", plain(property), path),
        ),
        ValidationErrorKind::Type { kind } => {
            let expected = match kind {
                TypeKind::Single(ty) => ty.to_string(),
                TypeKind::Multiple(_) => "one of the allowed types".to_string(),
            };
            (
                ViolationKind::Type,
                format!("Expected {} at {}, got {}", expected, path, json_type_name(&value)),
            )
        }
        ValidationErrorKind::Enum { options } => {
            let allowed = match options {
                JsonValue::Array(items) => items.iter().map(plain).collect::<Vec<_>>().join(", "),
                other => plain(other),
            };
            (
                ViolationKind::Enum,
                format!("Invalid value at {}. Allowed values: {}", path, allowed),
            )
        }
        ValidationErrorKind::Constant { expected_value } => (
            ViolationKind::Enum,
            format!("Invalid value at {}. Allowed values: {}", path, plain(expected_value)),
        ),
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            let names = unexpected
                .iter()
                .map(|name| format!("'{}'", name))
                .collect::<Vec<_>>()
                .join(", ");
            (
                ViolationKind::NotAllowed,
                format!("Property {} is not allowed at {}", names, path),
            )
        }
        _ => (
            ViolationKind::Other,
            format!("Validation error at {}: {}", path, err),
        ),
    };

    ValidationError {
        message,
        path,
        value,
        kind,
        source: Some(Arc::new(jsonschema::ValidationError {
            instance: std::borrow::Cow::Owned(err.instance.into_owned()),
            kind: err.kind,
            instance_path: err.instance_path,
            schema_path: err.schema_path,
        })),
    }
}

/// Render a JSON pointer as `workflow → agents[0] → steps[1]`, or `root`.
///
/// Whether a segment is an array index is decided by walking `instance`,
/// so object keys that happen to be numeric stay keys.
pub(crate) fn human_path(instance: &JsonValue, pointer: &str) -> String {
    let mut rendered = String::new();
    let mut current = Some(instance);

    for raw in pointer.split('/').skip(1) {
        let segment = raw.replace("~1", "/").replace("~0", "~");

        match current {
            Some(JsonValue::Array(items)) => {
                rendered.push_str(&format!("[{}]", segment));
                current = segment.parse::<usize>().ok().and_then(|i| items.get(i));
            }
            _ => {
                if !rendered.is_empty() {
                    rendered.push_str(" → ");
                }
                rendered.push_str(&segment);
                current = current.and_then(|v| v.get(segment.as_str()));
            }
        }
    }

    if rendered.is_empty() {
        "root".to_string()
    } else {
        rendered
    }
}

/// Strings without their JSON quotes; everything else as JSON.
fn plain(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
