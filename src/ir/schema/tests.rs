use std::error::Error as _;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::time::Duration;

use jsonschema::error::ValidationErrorKind;
use serde_json::json;

use super::*;

fn valid_ir() -> JsonValue {
    json!({
        "ir_version": "0.2",
        "workflow": {
            "title": "Ticket Triage",
            "agents": [{
                "name": "Bot",
                "steps": [{
                    "name": "Hello",
                    "attributes": { "artifact": "hello.txt", "timeout": 30 }
                }]
            }],
            "escape_blocks": [{ "target": "langgraph", "code": "pass" }],
            "secrets": [{ "env_var": "OPENAI_API_KEY" }]
        }
    })
}

fn schema() -> IrSchema {
    IrSchema::bundled().expect("Bundled schema should compile")
}

fn rejection(ir: &JsonValue) -> ValidationError {
    schema().validate(ir).expect_err("IR should be rejected")
}

fn schema_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/* ===================== Accepted Documents ===================== */

#[test]
fn test_valid_ir_passes() {
    assert!(schema().validate(&valid_ir()).is_ok());
}

#[test]
fn test_minimal_ir_passes() {
    let ir = json!({
        "ir_version": "0.2",
        "workflow": { "title": "", "agents": [] }
    });
    assert!(schema().validate(&ir).is_ok());
}

#[test]
fn test_bundled_origin() {
    assert_eq!(schema().origin(), BUNDLED_ORIGIN);
}

/* ===================== Rejections ===================== */

#[test]
fn test_missing_ir_version() {
    let mut ir = valid_ir();
    ir.as_object_mut().unwrap().remove("ir_version");

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Required);
    assert_eq!(err.path, "root");
    assert_eq!(err.message, "Missing required property 'ir_version' at root");
}

#[test]
fn test_missing_workflow() {
    let ir = json!({ "ir_version": "0.2" });

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Required);
    assert_eq!(err.path, "root");
    assert!(err.message.contains("'workflow'"));
}

#[test]
fn test_wrong_ir_version() {
    let mut ir = valid_ir();
    ir["ir_version"] = json!("0.1");

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Enum);
    assert_eq!(err.path, "ir_version");
    assert_eq!(err.value, json!("0.1"));
    assert_eq!(err.message, "Invalid value at ir_version. Allowed values: 0.2");
}

#[test]
fn test_unknown_attribute_key() {
    let mut ir = valid_ir();
    ir["workflow"]["agents"][0]["steps"][0]["attributes"]["color"] = json!("blue");

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::NotAllowed);
    assert_eq!(err.path, "workflow → agents[0] → steps[0] → attributes");
    assert!(err.message.contains("'color'"));
    assert!(err.message.contains("not allowed"));
}

#[test]
fn test_numeric_attribute_must_be_integer() {
    let mut ir = valid_ir();
    ir["workflow"]["agents"][0]["steps"][0]["attributes"]["retry"] = json!("three");

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Type);
    assert_eq!(err.path, "workflow → agents[0] → steps[0] → attributes → retry");
    assert_eq!(
        err.message,
        "Expected integer at workflow → agents[0] → steps[0] → attributes → retry, got string"
    );
}

#[test]
fn test_step_requires_attributes() {
    let mut ir = valid_ir();
    ir["workflow"]["agents"][0]["steps"][0]
        .as_object_mut()
        .unwrap()
        .remove("attributes");

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Required);
    assert_eq!(err.path, "workflow → agents[0] → steps[0]");
}

#[test]
fn test_agents_must_be_array() {
    let mut ir = valid_ir();
    ir["workflow"]["agents"] = json!({ "Bot": [] });

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Type);
    assert_eq!(err.path, "workflow → agents");
    assert!(err.message.contains("got object"));
}

#[test]
fn test_empty_secret_name() {
    let mut ir = valid_ir();
    ir["workflow"]["secrets"][0]["env_var"] = json!("");

    let err = rejection(&ir);
    assert_eq!(err.kind, ViolationKind::Other);
    assert_eq!(err.path, "workflow → secrets[0] → env_var");
    assert!(err.message.starts_with("Validation error at workflow → secrets[0] → env_var"));
}

#[test]
fn test_violation_keeps_underlying_error() {
    let mut ir = valid_ir();
    ir["workflow"]["secrets"][0]["env_var"] = json!("");

    let err = rejection(&ir);
    let source = err.source.as_ref().expect("jsonschema error should be kept");
    assert!(matches!(source.kind, ValidationErrorKind::MinLength { .. }));
    assert_eq!(*source.instance, json!(""));
    assert!(err.source().is_some());
}

#[test]
fn test_validation_error_is_cloneable() {
    let err = rejection(&json!({}));
    let copy = err.clone();
    assert_eq!(copy.message, err.message);
    assert_eq!(copy.to_string(), err.message);
}

/* ===================== Path Rendering ===================== */

#[test]
fn test_human_path() {
    let ir = valid_ir();

    assert_eq!(human_path(&ir, ""), "root");
    assert_eq!(human_path(&ir, "/workflow"), "workflow");
    assert_eq!(
        human_path(&ir, "/workflow/agents/0/steps/0"),
        "workflow → agents[0] → steps[0]"
    );
}

#[test]
fn test_human_path_numeric_object_key() {
    let instance = json!({ "attributes": { "0": { "x": [1, 2] } } });

    assert_eq!(human_path(&instance, "/attributes/0/x/1"), "attributes → 0 → x[1]");
}

#[test]
fn test_human_path_escaped_segments() {
    let instance = json!({ "a/b": { "c~d": 1 } });

    assert_eq!(human_path(&instance, "/a~1b/c~0d"), "a/b → c~d");
}

/* ===================== Loading ===================== */

#[test]
fn test_missing_override_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let source = SchemaSource::File(dir.path().join("missing.json"));

    let schema = IrSchema::load(&source).unwrap();
    assert_eq!(schema.origin(), BUNDLED_ORIGIN);
    assert!(schema.validate(&valid_ir()).is_ok());
}

#[test]
fn test_invalid_override_falls_back() {
    let file = schema_file("{ not json");

    assert!(matches!(
        IrSchema::from_file(file.path()),
        Err(SchemaError::Json { .. })
    ));

    let schema = IrSchema::load(&SchemaSource::File(file.path().to_path_buf())).unwrap();
    assert_eq!(schema.origin(), BUNDLED_ORIGIN);
}

#[test]
fn test_uncompilable_override() {
    let file = schema_file(r#"{ "type": 12 }"#);

    assert!(matches!(
        IrSchema::from_file(file.path()),
        Err(SchemaError::Compile { .. })
    ));
}

#[test]
fn test_override_replaces_bundled() {
    let file = schema_file(r#"{ "type": "object", "required": ["owner"] }"#);

    let schema = IrSchema::load(&SchemaSource::File(file.path().to_path_buf())).unwrap();
    assert_eq!(schema.origin(), file.path().display().to_string());

    let err = schema.validate(&valid_ir()).unwrap_err();
    assert_eq!(err.message, "Missing required property 'owner' at root");
}

#[test]
fn test_environment_cannot_replace_shared_schema() {
    // A schema that accepts anything, offered through every configuration
    // channel the harness knows about
    let permissive = schema_file("{}");
    std::env::set_var("STANZAFLOW_SCHEMA__PATH", permissive.path());

    let mut ir = valid_ir();
    ir["ir_version"] = json!("9.9");
    ir["workflow"]["agents"][0]["steps"][0]["attributes"]["color"] = json!("blue");
    let result = validate_value(&ir);

    std::env::remove_var("STANZAFLOW_SCHEMA__PATH");

    assert!(result.unwrap_err().is_validation());
    assert_eq!(shared().unwrap().origin(), BUNDLED_ORIGIN);
}

/* ===================== Shared Cache ===================== */

#[test]
fn test_shared_is_loaded_once() {
    let first = shared().unwrap() as *const IrSchema;
    let second = shared().unwrap() as *const IrSchema;
    assert_eq!(first, second);
}

#[test]
fn test_init_once_loads_once_under_concurrent_first_use() {
    let cell: OnceLock<String> = OnceLock::new();
    let lock = Mutex::new(());
    let loads = AtomicUsize::new(0);
    let barrier = Barrier::new(8);

    let addresses: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    let value = init_once(&cell, &lock, || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        // Keep the loader busy so the others pile up on the lock
                        std::thread::sleep(Duration::from_millis(50));
                        Ok::<_, SchemaError>("schema".to_string())
                    })
                    .unwrap();
                    value as *const String as usize
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(cell.get().map(String::as_str), Some("schema"));
}

#[test]
fn test_init_once_does_not_cache_failure() {
    let cell: OnceLock<u32> = OnceLock::new();
    let lock = Mutex::new(());

    let first: Result<&u32, &str> = init_once(&cell, &lock, || Err("unreadable"));
    assert_eq!(first, Err("unreadable"));
    assert!(cell.get().is_none());

    let second: Result<&u32, &str> = init_once(&cell, &lock, || Ok(7));
    assert_eq!(second, Ok(&7));

    let third: Result<&u32, &str> = init_once(&cell, &lock, || panic!("already loaded"));
    assert_eq!(third, Ok(&7));
}

#[test]
fn test_validate_value_wraps_error() {
    let err = validate_value(&json!({ "ir_version": "0.2" })).unwrap_err();
    assert!(err.is_validation());
    assert!(validate_value(&valid_ir()).is_ok());
}
