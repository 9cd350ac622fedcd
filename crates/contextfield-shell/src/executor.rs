//! Protocol executor: runs a parsed shell against a field.
//!
//! Operations run strictly in order. Each resolves through the closed
//! registry, moves the execution into its phase, and merges its result
//! into `current_state`. The first error stops the run; effects already
//! applied to the field stay applied, and the record is returned with
//! `state = failed`.

use crate::execution::{ExecutionState, ProtocolExecution, StateMap};
use crate::handlers;
use crate::registry::Operation;
use crate::shell::ProtocolShell;
use contextfield_core::{Error, ParamValue, Result};
use contextfield_field::Field;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default)]
pub struct ProtocolExecutor;

impl ProtocolExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `shell` with `input`. Never fails outright: errors are
    /// recorded on the returned execution.
    pub fn execute(
        &self,
        field: &mut Field,
        shell: &ProtocolShell,
        input: StateMap,
    ) -> ProtocolExecution {
        let mut execution = ProtocolExecution::new(&shell.name, input, field.store().now());
        info!(
            execution_id = %execution.execution_id,
            protocol = %shell.name,
            field = %field.name(),
            operations = shell.process.len(),
            "protocol execution started"
        );

        if let Err((err, operation)) = self.run(field, shell, &mut execution) {
            warn!(
                execution_id = %execution.execution_id,
                protocol = %shell.name,
                operation = operation.as_deref().unwrap_or("-"),
                error = %err,
                "protocol execution failed"
            );
            execution.fail(&err, operation.as_deref(), field.store().now());
        }

        execution.output = build_output(shell, &execution.current_state);
        execution.meta = build_meta(shell, &execution);
        info!(
            execution_id = %execution.execution_id,
            state = %execution.state,
            operations_executed = execution.operations_executed(),
            "protocol execution finished"
        );
        execution
    }

    fn run(
        &self,
        field: &mut Field,
        shell: &ProtocolShell,
        execution: &mut ProtocolExecution,
    ) -> std::result::Result<(), (Error, Option<String>)> {
        let no_op = |e: Error| (e, None);

        execution.transition(ExecutionState::Initializing, field.store().now()).map_err(no_op)?;
        validate_input(shell, &execution.input_data).map_err(no_op)?;
        execution.transition(ExecutionState::Active, field.store().now()).map_err(no_op)?;

        for step in &shell.process {
            let name = step.full_name();
            let fail = |e: Error| (e, Some(name.clone()));
            let op = Operation::from_name(&name)
                .ok_or_else(|| fail(Error::UnknownOperation(name.clone())))?;
            execution.transition(op.phase(), field.store().now()).map_err(fail)?;

            let output = handlers::dispatch(op, field, &step.parameters, execution)
                .map_err(|e| fail(Error::operation_failure(&name, e.to_string())))?;
            debug!(
                execution_id = %execution.execution_id,
                operation = %name,
                keys = output.values.len(),
                summary = %output.summary,
                "operation complete"
            );
            execution.record_step(&name, output.values, output.summary, field.store().now());
        }

        execution.complete(field.store().now()).map_err(no_op)
    }
}

/// Every input key without the `<default>` sentinel must be supplied.
pub fn validate_input(shell: &ProtocolShell, input: &StateMap) -> Result<()> {
    match shell.required_inputs().find(|k| !input.contains_key(*k)) {
        Some(missing) => Err(Error::MissingInputField(missing.to_string())),
        None => Ok(()),
    }
}

/// Copy each declared output key from `state`, or its placeholder.
fn build_output(shell: &ProtocolShell, state: &StateMap) -> StateMap {
    shell
        .output_spec
        .iter()
        .map(|(key, placeholder)| {
            let value = state.get(key).cloned().unwrap_or_else(|| match placeholder {
                ParamValue::Str(s) => Value::String(s.clone()),
                other => Value::String(other.to_string()),
            });
            (key.clone(), value)
        })
        .collect()
}

fn build_meta(shell: &ProtocolShell, execution: &ProtocolExecution) -> StateMap {
    let timestamp = execution.completed_at.unwrap_or(execution.started_at);
    let mut meta = StateMap::new();
    meta.insert("timestamp".into(), json!(timestamp.to_rfc3339()));
    meta.insert("operations_executed".into(), json!(execution.operations_executed()));
    meta.insert("success".into(), json!(execution.succeeded()));
    meta.insert("execution_id".into(), json!(execution.execution_id));
    meta.insert("protocol".into(), json!(shell.name));
    if !shell.meta.is_empty() {
        let declared: serde_json::Map<String, Value> =
            shell.meta.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        meta.insert("shell".into(), Value::Object(declared));
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_shell;
    use contextfield_field::{FieldConfig, SeedAttractor};

    fn field() -> Field {
        let config = FieldConfig {
            seeds: vec![
                SeedAttractor::new("stream processing pipelines", 0.8, 0.5),
                SeedAttractor::new("batch processing jobs", 0.5, 0.5),
            ],
            ..Default::default()
        };
        Field::new("exec", config).unwrap()
    }

    fn input(pairs: &[(&str, &str)]) -> StateMap {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    #[test]
    fn runs_to_convergence() {
        let shell = parse_shell(
            r#"/demo{
                intent:="measure then scan",
                input:={ query="<query>" },
                process:=[ /field.measure{}, /attractor.identify{}, /attractor.scan{limit=1} ],
                output:={ field_metrics="<metrics>", attractors="<list>", missing="<nothing>" }
            }"#,
        )
        .unwrap();
        let mut f = field();
        let query = input(&[("query", "stream processing")]);
        let e = ProtocolExecutor::new().execute(&mut f, &shell, query);
        assert_eq!(e.state, ExecutionState::Converged);
        assert_eq!(e.operations_executed(), 3);
        assert!(e.output["field_metrics"].is_object());
        assert_eq!(e.output["attractors"].as_array().unwrap().len(), 1);
        assert_eq!(e.output["missing"], json!("<nothing>"));
        assert_eq!(e.meta["success"], json!(true));
        assert_eq!(e.meta["operations_executed"], json!(3));
        let states: Vec<ExecutionState> = e.state_history.iter().map(|s| s.state).collect();
        assert!(states.contains(&ExecutionState::Resonating));
    }

    #[test]
    fn missing_required_input_fails_before_any_step() {
        let shell = parse_shell(
            r#"/demo{
                intent:="x",
                input:={ query="<query>", depth="<default>" },
                process:=[ /field.measure{} ]
            }"#,
        )
        .unwrap();
        let mut f = field();
        let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
        assert_eq!(e.state, ExecutionState::Failed);
        assert_eq!(e.error.as_ref().unwrap().error_type, "MissingInputField");
        assert_eq!(e.operations_executed(), 0);
        assert_eq!(e.meta["success"], json!(false));
    }

    #[test]
    fn handler_error_keeps_prior_effects() {
        let shell = parse_shell(
            r#"/demo{
                intent:="x",
                process:=[ /boundary.collapse{}, /field.tune{decay_rate=7.0}, /field.measure{} ]
            }"#,
        )
        .unwrap();
        let mut f = field();
        let e = ProtocolExecutor::new().execute(&mut f, &shell, StateMap::new());
        assert_eq!(e.state, ExecutionState::Failed);
        let err = e.error.as_ref().unwrap();
        assert_eq!(err.error_type, "OperationFailure");
        assert_eq!(err.operation.as_deref(), Some("field.tune"));
        assert_eq!(e.operations_executed(), 1);
        assert!(e.current_state.contains_key("boundary"));
        assert_eq!(f.config().boundary_permeability, 1.0);
    }
}
