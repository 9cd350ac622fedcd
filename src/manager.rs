//! Field Manager: owns the named fields and is the one entry point the
//! analysis pipeline talks to.
//!
//! There is no process-wide instance. Callers construct a manager, pass
//! it by reference to whatever needs it and drop it when done.

use contextfield_core::text::truncate;
use contextfield_core::{Clock, Error, Result, SystemClock};
use contextfield_field::{
    EmergentPattern, Field, FieldConfig, FieldMetrics, FieldRepresentation, InjectionOutcome,
};
use contextfield_shell::{
    builtin_shell, parse_shell, ProtocolExecution, ProtocolExecutor, ProtocolShell, StateMap,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_FIELD: &str = "default";

/// Strength each context segment is injected with before boundary filtering.
const SEGMENT_STRENGTH: f64 = 1.0;
/// Field time advanced per `process_context` call.
const PROCESS_TIME_STEP: f64 = 1.0;
const REPRESENTATION_TOP_N: usize = 5;

#[derive(Clone, Debug, Serialize)]
pub struct SurfacedResidue {
    pub id: String,
    pub symbol: String,
    pub strength: f64,
    pub origin_attractor_id: Option<String>,
}

/// Result of feeding one piece of context through a field.
#[derive(Clone, Debug, Serialize)]
pub struct ContextAnalysis {
    pub field: String,
    pub injections: Vec<InjectionOutcome>,
    /// Attractor id → resonance with the query (or the text itself).
    pub resonance_scores: BTreeMap<String, f64>,
    pub surfaced_residues: Vec<SurfacedResidue>,
    pub emergent_patterns: Vec<EmergentPattern>,
    pub field_metrics: FieldMetrics,
    pub recommendations: Vec<String>,
    pub field_representation: FieldRepresentation,
}

/// `{output, meta}` of a shell run plus the full execution record.
#[derive(Clone, Debug, Serialize)]
pub struct ShellResponse {
    pub output: StateMap,
    pub meta: StateMap,
    #[serde(skip)]
    pub execution: ProtocolExecution,
}

pub struct FieldManager {
    config: FieldConfig,
    clock: Arc<dyn Clock>,
    fields: BTreeMap<String, Field>,
    executor: ProtocolExecutor,
}

impl FieldManager {
    pub fn new(config: FieldConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build a manager whose fields all read time from `clock`.
    pub fn with_clock(config: FieldConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let default = Field::with_clock(DEFAULT_FIELD, config.clone(), clock.clone())?;
        let mut fields = BTreeMap::new();
        fields.insert(DEFAULT_FIELD.to_string(), default);
        info!(
            seeds = config.seeds.len(),
            max_attractors = config.max_attractors,
            "field manager ready"
        );
        Ok(Self {
            config,
            clock,
            fields,
            executor: ProtocolExecutor::new(),
        })
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    pub fn default_field(&self) -> Option<&Field> {
        self.field(DEFAULT_FIELD)
    }

    /// Create a named field, using the manager's config unless one is given.
    pub fn create_field(&mut self, name: &str, config: Option<FieldConfig>) -> Result<&mut Field> {
        if name.trim().is_empty() {
            return Err(Error::invalid_parameter("field", "field name is empty"));
        }
        if self.fields.contains_key(name) {
            let message = format!("field '{}' already exists", name);
            return Err(Error::invalid_parameter("field", message));
        }
        let config = config.unwrap_or_else(|| self.config.clone());
        let field = Field::with_clock(name, config, self.clock.clone())?;
        Ok(self.fields.entry(name.to_string()).or_insert(field))
    }

    /// Drop a named field. The default field always stays.
    pub fn remove_field(&mut self, name: &str) -> Result<Field> {
        if name == DEFAULT_FIELD {
            return Err(Error::invalid_parameter("field", "the default field cannot be removed"));
        }
        let field = self.fields.remove(name).ok_or_else(|| no_such_field(name))?;
        info!(field = %name, "field removed");
        Ok(field)
    }

    fn require_field(&mut self, name: &str) -> Result<&mut Field> {
        self.fields.get_mut(name).ok_or_else(|| no_such_field(name))
    }

    // ============================================================
    // Context processing
    // ============================================================

    pub fn process_context(&mut self, text: &str, query: Option<&str>) -> Result<ContextAnalysis> {
        self.process_context_in(DEFAULT_FIELD, text, query)
    }

    /// Inject `text` paragraph by paragraph, advance the field one step,
    /// surface residues and detect emergence, then report.
    pub fn process_context_in(
        &mut self,
        field_name: &str,
        text: &str,
        query: Option<&str>,
    ) -> Result<ContextAnalysis> {
        let field = self.require_field(field_name)?;

        let injections: Vec<InjectionOutcome> = segments(text)
            .iter()
            .map(|segment| field.inject(segment, SEGMENT_STRENGTH, None))
            .collect();
        field.evolve(PROCESS_TIME_STEP);
        let surface_threshold = field.config().surface_threshold;
        let surfaced_ids = field.surface_residues(surface_threshold);
        let emergent_patterns = field.detect_emergence();

        let probe = query.filter(|q| !q.trim().is_empty()).unwrap_or(text);
        let resonance_scores = field.measure_resonance(probe);
        let surfaced_residues = surfaced_ids
            .iter()
            .filter_map(|id| field.store().get_residue(id))
            .map(|r| SurfacedResidue {
                id: r.id.clone(),
                symbol: truncate(&r.symbol, 120),
                strength: r.strength(),
                origin_attractor_id: r.origin_attractor_id.clone(),
            })
            .collect::<Vec<_>>();
        let field_metrics = field.metrics();
        let recommendations = recommendations(&field_metrics, surfaced_residues.len());
        let field_representation = field.representation(REPRESENTATION_TOP_N);

        debug!(
            field = %field_name,
            segments = injections.len(),
            resonating = resonance_scores.len(),
            surfaced = surfaced_residues.len(),
            emergent = emergent_patterns.len(),
            "context processed"
        );
        Ok(ContextAnalysis {
            field: field_name.to_string(),
            injections,
            resonance_scores,
            surfaced_residues,
            emergent_patterns,
            field_metrics,
            recommendations,
            field_representation,
        })
    }

    // ============================================================
    // Protocol shells
    // ============================================================

    /// Parse and run shell text against the default field. Parse errors
    /// are returned; execution errors are reported inside the response.
    pub fn execute_protocol_shell(&mut self, text: &str, input: StateMap) -> Result<ShellResponse> {
        self.execute_protocol_shell_in(DEFAULT_FIELD, text, input)
    }

    pub fn execute_protocol_shell_in(
        &mut self,
        field_name: &str,
        text: &str,
        input: StateMap,
    ) -> Result<ShellResponse> {
        let shell = parse_shell(text)?;
        self.execute_shell_in(field_name, &shell, input)
    }

    /// Run one of the built-in shells by name.
    pub fn execute_builtin(&mut self, name: &str, input: StateMap) -> Result<ShellResponse> {
        let shell = builtin_shell(name)?;
        self.execute_shell_in(DEFAULT_FIELD, &shell, input)
    }

    pub fn execute_shell_in(
        &mut self,
        field_name: &str,
        shell: &ProtocolShell,
        input: StateMap,
    ) -> Result<ShellResponse> {
        let executor = self.executor.clone();
        let field = self.require_field(field_name)?;
        let execution = executor.execute(field, shell, input);
        Ok(ShellResponse {
            output: execution.output.clone(),
            meta: execution.meta.clone(),
            execution,
        })
    }
}

fn no_such_field(name: &str) -> Error {
    Error::invalid_parameter("field", format!("no field named '{}'", name))
}

/// Non-empty paragraphs of `text`; the whole text when it has no blank lines.
/// CRLF line endings are treated as LF.
fn segments(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

const LOW_COHERENCE: f64 = 0.3;
const HIGH_ENTROPY: f64 = 0.85;
const CAPACITY_PRESSURE: f64 = 0.8;

fn recommendations(m: &FieldMetrics, surfaced: usize) -> Vec<String> {
    if m.attractor_count == 0 {
        return vec!["Field is empty: inject context before analysing it.".into()];
    }
    let mut out = Vec::new();
    if m.attractor_count > 1 && m.coherence < LOW_COHERENCE {
        out.push(format!(
            "Coherence is low ({:.2}): narrow the context or merge related attractors.",
            m.coherence
        ));
    }
    if m.attractor_count > 2 && m.entropy > HIGH_ENTROPY {
        out.push(format!(
            "Entropy is high ({:.2}): no concept dominates; reinforce the ones that matter.",
            m.entropy
        ));
    }
    if m.field_capacity > CAPACITY_PRESSURE {
        out.push(format!(
            "Capacity at {:.0}%: compress residues or collapse weak attractors.",
            m.field_capacity * 100.0
        ));
    }
    if surfaced > 0 {
        out.push(format!(
            "{} residue(s) surfaced: consider integrating them back into the field.",
            surfaced
        ));
    }
    if m.emergent_count > 0 {
        out.push(format!(
            "{} emergent pattern(s) present: run attractor.co.emerge to consolidate them.",
            m.emergent_count
        ));
    }
    if out.is_empty() {
        out.push("Field is stable: no action needed.".into());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> FieldMetrics {
        FieldMetrics {
            coherence: 0.6,
            stability: 0.7,
            field_energy: 1.0,
            entropy: 0.5,
            field_capacity: 0.1,
            attractor_count: 3,
            residue_count: 0,
            resonance_count: 0,
            emergent_count: 0,
            activation_count: 0,
            field_time: 0.0,
        }
    }

    #[test]
    fn segments_split_on_blank_lines() {
        let parts = segments("first para\n\n\n  second para  \n\n");
        assert_eq!(parts, vec!["first para", "second para"]);
        assert_eq!(segments("one line").len(), 1);
        assert!(segments("  \n\n ").is_empty());
    }

    #[test]
    fn segments_split_crlf_paragraphs() {
        let parts = segments("first para\r\nstill first\r\n\r\nsecond para\r\n");
        assert_eq!(parts, vec!["first para\nstill first", "second para"]);
    }

    #[test]
    fn stable_field_recommendation() {
        assert_eq!(recommendations(&metrics(), 0), vec!["Field is stable: no action needed."]);
    }

    #[test]
    fn threshold_recommendations() {
        let m = FieldMetrics {
            coherence: 0.1,
            entropy: 0.95,
            field_capacity: 0.9,
            emergent_count: 2,
            ..metrics()
        };
        let recs = recommendations(&m, 1);
        assert_eq!(recs.len(), 5);
        assert!(recs[0].starts_with("Coherence is low"));
        assert!(recs[2].starts_with("Capacity at 90%"));
    }

    #[test]
    fn empty_field_recommendation() {
        let m = FieldMetrics {
            attractor_count: 0,
            ..metrics()
        };
        let recs = recommendations(&m, 0);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].starts_with("Field is empty"));
    }
}
