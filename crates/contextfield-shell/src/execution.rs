//! Execution record: state machine, per-step results and the final output
//! of one protocol run.

use chrono::{DateTime, Utc};
use contextfield_core::{new_id, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type StateMap = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Inactive,
    Initializing,
    Active,
    Resonating,
    Emerging,
    Converged,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Converged | Self::Failed)
    }

    /// Inactive → Initializing → Active ⇄ (Resonating | Emerging) → Converged,
    /// with Failed reachable from any non-terminal state.
    pub fn can_transition(self, to: ExecutionState) -> bool {
        use ExecutionState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (_, Failed) => true,
            (Inactive, Initializing) => true,
            (Initializing, Active) => true,
            (Active | Resonating | Emerging, Active | Resonating | Emerging | Converged) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Initializing => write!(f, "initializing"),
            Self::Active => write!(f, "active"),
            Self::Resonating => write!(f, "resonating"),
            Self::Emerging => write!(f, "emerging"),
            Self::Converged => write!(f, "converged"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateChange {
    pub state: ExecutionState,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub operation: String,
    pub state: ExecutionState,
    pub result: Value,
    pub at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// One of `ParseError`, `MissingInputField`, `UnknownOperation`,
    /// `OperationFailure`, `InvalidConfiguration`.
    pub error_type: String,
    pub operation: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolExecution {
    pub execution_id: String,
    pub protocol_name: String,
    pub state: ExecutionState,
    pub state_history: Vec<StateChange>,
    pub input_data: StateMap,
    pub current_state: StateMap,
    pub intermediate_results: Vec<StepResult>,
    pub field_updates: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<ExecutionError>,
    pub output: StateMap,
    pub meta: StateMap,
}

impl ProtocolExecution {
    pub fn new(protocol_name: &str, input: StateMap, now: DateTime<Utc>) -> Self {
        Self {
            execution_id: new_id("exec"),
            protocol_name: protocol_name.into(),
            state: ExecutionState::Inactive,
            state_history: vec![StateChange {
                state: ExecutionState::Inactive,
                at: now,
            }],
            current_state: input.clone(),
            input_data: input,
            intermediate_results: Vec::new(),
            field_updates: Vec::new(),
            started_at: now,
            completed_at: None,
            error: None,
            output: StateMap::new(),
            meta: StateMap::new(),
        }
    }

    /// Move to `to`. Re-entering the current state is a no-op.
    pub fn transition(&mut self, to: ExecutionState, now: DateTime<Utc>) -> Result<()> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.can_transition(to) {
            return Err(Error::operation_failure(
                "state",
                format!("illegal transition {} -> {}", self.state, to),
            ));
        }
        self.state = to;
        self.state_history.push(StateChange { state: to, at: now });
        Ok(())
    }

    /// Merge a step's partial result into `current_state` and keep it.
    pub fn record_step(
        &mut self,
        operation: &str,
        result: serde_json::Map<String, Value>,
        summary: String,
        now: DateTime<Utc>,
    ) {
        for (k, v) in &result {
            self.current_state.insert(k.clone(), v.clone());
        }
        self.intermediate_results.push(StepResult {
            index: self.intermediate_results.len(),
            operation: operation.into(),
            state: self.state,
            result: Value::Object(result),
            at: now,
        });
        self.field_updates.push(format!("{}: {}", operation, summary));
    }

    /// Short-circuit to `Failed`, keeping everything recorded so far.
    pub fn fail(&mut self, error: &Error, operation: Option<&str>, now: DateTime<Utc>) {
        if !self.state.is_terminal() {
            self.state = ExecutionState::Failed;
            self.state_history.push(StateChange {
                state: ExecutionState::Failed,
                at: now,
            });
        }
        self.error = Some(ExecutionError {
            error_type: error.error_type().into(),
            operation: operation.map(String::from),
            message: error.to_string(),
        });
        self.completed_at = Some(now);
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(ExecutionState::Converged, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.state == ExecutionState::Converged
    }

    pub fn operations_executed(&self) -> usize {
        self.intermediate_results.len()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0))
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    pub fn summary_line(&self) -> String {
        let error = self
            .error
            .as_ref()
            .map(|e| format!(" | {}: {}", e.error_type, e.message))
            .unwrap_or_default();
        format!(
            "| {} | {} | {} | {} ops | {}{} |",
            self.execution_id,
            self.protocol_name,
            self.state,
            self.operations_executed(),
            self.started_at.format("%Y-%m-%dT%H:%M:%S"),
            error,
        )
    }
}
