//! contextfield-shell: Pareto-lang protocol shells
//!
//! A shell is a small declarative program: an intent, an input schema, an
//! ordered list of `/namespace.operation{params}` calls and an output
//! schema. This crate parses shell text, resolves each call against a
//! closed operation registry and runs the sequence against a field.
//!
//! - `parser`: tolerant text → `ProtocolShell`
//! - `registry`, `handlers`: the operation set and what each one does
//! - `executor`, `execution`: sequencing, state machine, run record
//! - `builtin`: shells every manager ships with

pub mod builtin;
pub mod execution;
pub mod executor;
pub mod handlers;
pub mod parser;
pub mod registry;
pub mod shell;

pub use builtin::{builtin_shell, builtin_shells, builtin_source, BUILTIN_NAMES};
pub use execution::{
    ExecutionError, ExecutionState, ProtocolExecution, StateChange, StateMap, StepResult,
};
pub use executor::{validate_input, ProtocolExecutor};
pub use handlers::StepOutput;
pub use parser::{parse_shell, parse_with_diagnostics, ParseDiagnostic, ParseResult};
pub use registry::Operation;
pub use shell::{ParamMap, ProtocolOperation, ProtocolShell, DEFAULT_SENTINEL};
