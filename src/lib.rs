//! contextfield: semantic field simulation driven by Pareto-lang protocol shells
//!
//! The `FieldManager` is the composition root. It owns named fields, turns
//! raw context into field state with `process_context`, and runs protocol
//! shells against that state with `execute_protocol_shell`.

pub mod manager;

pub use manager::{ContextAnalysis, FieldManager, ShellResponse, SurfacedResidue, DEFAULT_FIELD};
