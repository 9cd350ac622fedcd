//! Integration tests for contextfield-shell
//!
//! Parse → execute against a real field, checking the execution record
//! rather than handler internals.

use contextfield_core::Error;
use contextfield_field::{Field, FieldConfig, SeedAttractor};
use contextfield_shell::*;
use serde_json::{json, Value};

fn field() -> Field {
    let config = FieldConfig {
        seeds: vec![
            SeedAttractor::new("vector search over embeddings", 0.8, 0.5),
            SeedAttractor::new("keyword search with inverted indexes", 0.6, 0.5),
            SeedAttractor::new("query planning for relational databases", 0.4, 0.5),
        ],
        ..Default::default()
    };
    Field::new("shell-tests", config).unwrap()
}

fn input(pairs: &[(&str, &str)]) -> StateMap {
    pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
}

// ============================================================
// Parsing
// ============================================================

#[test]
fn unknown_operation_fails_execution_not_parse() {
    let text = r#"/test.shell{ intent:="x" process:=[ "/unknown.op{a=1}" ] output:={} }"#;
    let shell = parse_shell(text).unwrap();
    assert_eq!(shell.name, "test.shell");
    assert_eq!(shell.operation_names(), vec!["unknown.op"]);
    assert_eq!(shell.process[0].param("a"), Some(&contextfield_core::ParamValue::Int(1)));

    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
    assert_eq!(e.state, ExecutionState::Failed);
    let err = e.error.as_ref().unwrap();
    assert_eq!(err.error_type, "UnknownOperation");
    assert_eq!(err.operation.as_deref(), Some("unknown.op"));
    assert_eq!(e.operations_executed(), 0);
    assert!(e.output.is_empty());
}

#[test]
fn missing_sections() {
    let err = parse_shell(r#"/s{ process:=[ /field.measure{} ] }"#).unwrap_err();
    assert!(matches!(err, Error::MissingSection(ref s) if s == "intent"));
    assert_eq!(err.error_type(), "ParseError");
    let err = parse_shell(r#"/s{ intent:="no process" }"#).unwrap_err();
    assert!(matches!(err, Error::MissingSection(ref s) if s == "process"));
    let err = parse_shell("just some prose").unwrap_err();
    assert_eq!(err.error_type(), "ParseError");
}

#[test]
fn process_with_only_malformed_items_is_a_parse_error() {
    let err = parse_shell(r#"/s{ intent:="x", process:=[ not-an-op, "also not" ] }"#).unwrap_err();
    assert_eq!(err.error_type(), "ParseError");
}

#[test]
fn malformed_items_are_skipped_with_diagnostics() {
    let text = r#"/mixed{
    intent:="keep the good ones",
    // a comment line
    process:=[
        /field.measure{},
        garbage here,
        /attractor.scan{threshold=0.5, limit=2}
    ]
}"#;
    let result = parse_with_diagnostics(text).unwrap();
    assert_eq!(result.shell.operation_names(), vec!["field.measure", "attractor.scan"]);
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].raw, "garbage here");
    assert_eq!(result.diagnostics[0].line, 6);
}

#[test]
fn pareto_round_trip_keeps_operations() {
    for shell in builtin_shells().unwrap() {
        let reparsed = parse_shell(&shell.to_pareto()).unwrap();
        assert_eq!(reparsed.name, shell.name);
        assert_eq!(reparsed.intent, shell.intent);
        assert_eq!(reparsed.operation_names(), shell.operation_names());
        assert_eq!(reparsed.process.len(), shell.process.len());
        for (a, b) in reparsed.process.iter().zip(&shell.process) {
            assert_eq!(a.parameters, b.parameters);
        }
        assert_eq!(reparsed.input_spec, shell.input_spec);
        assert_eq!(reparsed.output_spec, shell.output_spec);
    }
}

#[test]
fn unterminated_non_ascii_input_is_a_parse_error() {
    let err = parse_shell("/s{ intent:=\"x\" process:=[ /field.measure{} é").unwrap_err();
    assert_eq!(err.error_type(), "ParseError");

    let err = parse_shell("/s{ intent:=\"ü\" process:=[ /résumé").unwrap_err();
    assert_eq!(err.error_type(), "ParseError");
}

#[test]
fn pareto_round_trip_escapes_quotes() {
    let shell = parse_shell(
        r#"/ask{
            intent:="find \"what's new\"",
            process:=[ /attractor.identify{query="what's new", path='C:\\tmp'} ]
        }"#,
    )
    .unwrap();
    assert_eq!(shell.intent, r#"find "what's new""#);
    let query = shell.process[0].param("query").and_then(|v| v.as_str());
    assert_eq!(query, Some("what's new"));
    assert_eq!(shell.process[0].param("path").and_then(|v| v.as_str()), Some(r"C:\tmp"));

    let reparsed = parse_shell(&shell.to_pareto()).unwrap();
    assert_eq!(reparsed.intent, shell.intent);
    assert_eq!(reparsed.process[0].parameters, shell.process[0].parameters);
}

#[test]
fn required_inputs_skip_default_sentinel() {
    let shell = builtin_shell("neural.field.process").unwrap();
    let required: Vec<&str> = shell.required_inputs().collect();
    assert_eq!(required, vec!["query"]);
}

// ============================================================
// Execution
// ============================================================

#[test]
fn neural_field_process_runs_end_to_end() {
    let shell = builtin_shell("neural.field.process").unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, input(&[("query", "vector search")]));
    assert_eq!(e.state, ExecutionState::Converged, "{:?}", e.error);
    assert_eq!(e.operations_executed(), 7);
    assert!(e.error.is_none());

    for key in shell.output_spec.keys() {
        assert!(e.output.contains_key(key), "missing output {}", key);
    }
    assert!(e.output["field_metrics"].is_object());
    let scores = e.output["resonance_scores"].as_object().unwrap();
    assert!(!scores.is_empty());
    let response = e.output["response"].as_str().unwrap();
    assert!(response.contains("shell-tests"));
    assert!(response.contains("vector search"));

    assert_eq!(e.meta["success"], json!(true));
    assert_eq!(e.meta["operations_executed"], json!(7));
    assert_eq!(e.meta["protocol"], json!("neural.field.process"));
    assert_eq!(e.meta["shell"]["category"], json!("field"));
    assert_eq!(e.field_updates.len(), 7);
    assert!(e.field_updates[0].starts_with("field.measure: "));
}

#[test]
fn builtin_without_required_input_fails() {
    let shell = builtin_shell("neural.field.process").unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
    assert_eq!(e.state, ExecutionState::Failed);
    assert_eq!(e.error.as_ref().unwrap().error_type, "MissingInputField");
    assert_eq!(e.meta["success"], json!(false));
}

#[test]
fn scaffold_and_co_emerge_builtins_converge() {
    let mut f = field();
    for name in ["field.resonance.scaffold", "attractor.co.emerge"] {
        let shell = builtin_shell(name).unwrap();
        let e = ProtocolExecutor::new().execute(&mut f, &shell, input(&[("query", "search")]));
        assert_eq!(e.state, ExecutionState::Converged, "{}: {:?}", name, e.error);
        assert_eq!(e.operations_executed(), shell.process.len());
    }
    assert_eq!(f.config().boundary_permeability, 1.0);
}

#[test]
fn unmet_outputs_fall_back_to_placeholders() {
    let shell = parse_shell(
        r#"/partial{
            intent:="measure only",
            process:=[ /field.measure{} ],
            output:={ field_metrics="<m>", never_set="<never_set>" }
        }"#,
    )
    .unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
    assert!(e.succeeded());
    assert!(e.output["field_metrics"]["coherence"].is_number());
    assert_eq!(e.output["never_set"], json!("<never_set>"));
}

#[test]
fn state_flows_between_steps() {
    let shell = parse_shell(
        r#"/flow{
            intent:="track twice then trace",
            process:=[ /monitor.track{}, /monitor.track{}, /audit.trace{} ],
            output:={ monitoring="<samples>", audit="<audit>" }
        }"#,
    )
    .unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
    assert!(e.succeeded());
    assert_eq!(e.output["monitoring"].as_array().unwrap().len(), 2);
    assert_eq!(e.output["audit"]["operations"], json!(["monitor.track", "monitor.track"]));
}

#[test]
fn invalid_parameter_surfaces_as_operation_failure() {
    let text = r#"/bad{ intent:="x", process:=[ /attractor.scan{threshold="high"} ] }"#;
    let shell = parse_shell(text).unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
    assert_eq!(e.state, ExecutionState::Failed);
    let err = e.error.as_ref().unwrap();
    assert_eq!(err.error_type, "OperationFailure");
    assert_eq!(err.operation.as_deref(), Some("attractor.scan"));
    assert!(err.message.contains("threshold"));
}

#[test]
fn state_history_is_a_legal_path() {
    let shell = builtin_shell("neural.field.process").unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, input(&[("query", "embeddings")]));
    let states: Vec<ExecutionState> = e.state_history.iter().map(|c| c.state).collect();
    assert_eq!(states.first(), Some(&ExecutionState::Inactive));
    assert_eq!(states.last(), Some(&ExecutionState::Converged));
    for pair in states.windows(2) {
        assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
    }
    assert!(states.contains(&ExecutionState::Emerging));
}

#[test]
fn execution_exports_yaml_and_json() {
    let shell = builtin_shell("attractor.co.emerge").unwrap();
    let mut f = field();
    let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
    let yaml = e.to_yaml();
    assert!(yaml.contains("attractor.co.emerge"));
    assert!(yaml.contains("converged"));
    let value: Value = serde_json::to_value(&e).unwrap();
    assert_eq!(value["state"], json!("converged"));
    assert!(e.summary_line().contains("7 ops"));
}
