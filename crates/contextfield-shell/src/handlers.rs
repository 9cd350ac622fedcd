//! Operation handlers. Each returns a partial result that the executor
//! merges into the execution's `current_state`, plus a one-line summary
//! for the field-update log.

use crate::execution::{ProtocolExecution, StateMap};
use crate::registry::Operation;
use crate::shell::ParamMap;
use contextfield_core::text::truncate;
use contextfield_core::{Error, ParamValue, Result};
use contextfield_field::{Attractor, Field, FieldTuning};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// State keys consulted, in order, when an operation needs query text
/// and no `query` parameter was given.
const QUERY_KEYS: [&str; 5] = ["query", "input_text", "text", "context", "input"];
const PREVIEW_BYTES: usize = 80;

pub struct StepOutput {
    pub values: Map<String, Value>,
    pub summary: String,
}

impl StepOutput {
    fn single(key: &str, value: Value, summary: String) -> Self {
        let mut values = Map::new();
        values.insert(key.into(), value);
        Self { values, summary }
    }
}

/// Typed access to an operation's parameters.
pub struct Params<'a> {
    map: &'a ParamMap,
}

impl<'a> Params<'a> {
    pub fn new(map: &'a ParamMap) -> Self {
        Self { map }
    }

    pub fn opt_f64(&self, name: &str) -> Result<Option<f64>> {
        match self.map.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .map(Some)
                .ok_or_else(|| {
                    Error::invalid_parameter(name, format!("expected a number, got {}", v))
                }),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        Ok(self.opt_f64(name)?.unwrap_or(default))
    }

    /// A number in [0, 1].
    pub fn unit_or(&self, name: &str, default: f64) -> Result<f64> {
        let v = self.f64_or(name, default)?;
        if !(0.0..=1.0).contains(&v) {
            return Err(Error::invalid_parameter(name, format!("{} is outside [0, 1]", v)));
        }
        Ok(v)
    }

    pub fn positive_or(&self, name: &str, default: f64) -> Result<f64> {
        let v = self.f64_or(name, default)?;
        if !(v > 0.0) {
            return Err(Error::invalid_parameter(name, format!("{} must be positive", v)));
        }
        Ok(v)
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        match self.map.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_i64()
                .and_then(|i| usize::try_from(i).ok())
                .ok_or_else(|| {
                    let message = format!("expected a non-negative integer, got {}", v);
                    Error::invalid_parameter(name, message)
                }),
        }
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.map.get(name).map(|v| match v {
            ParamValue::Str(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

struct StepContext<'a> {
    field: &'a mut Field,
    params: Params<'a>,
    execution: &'a ProtocolExecution,
}

impl StepContext<'_> {
    fn state(&self) -> &StateMap {
        &self.execution.current_state
    }

    fn query(&self) -> Option<String> {
        if let Some(q) = self.params.text("query").filter(|q| !q.trim().is_empty()) {
            return Some(q);
        }
        QUERY_KEYS.iter().find_map(|k| {
            self.state()
                .get(*k)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(String::from)
        })
    }

    fn require_query(&self) -> Result<String> {
        self.query().ok_or_else(|| {
            Error::invalid_parameter("query", "no query parameter and no query text in state")
        })
    }
}

/// Run `op` against `field`.
pub fn dispatch(
    op: Operation,
    field: &mut Field,
    params: &ParamMap,
    execution: &ProtocolExecution,
) -> Result<StepOutput> {
    let mut ctx = StepContext {
        field,
        params: Params::new(params),
        execution,
    };
    match op {
        Operation::AttractorScan => attractor_scan(&mut ctx),
        Operation::AttractorIdentify => attractor_identify(&mut ctx),
        Operation::AttractorMerge => attractor_merge(&mut ctx),
        Operation::AttractorStrengthen => attractor_strengthen(&mut ctx),
        Operation::ResidueSurface => residue_surface(&mut ctx),
        Operation::ResidueCompress => residue_compress(&mut ctx),
        Operation::ResidueIntegrate => residue_integrate(&mut ctx),
        Operation::FieldMeasure => field_measure(&mut ctx),
        Operation::FieldTune => field_tune(&mut ctx),
        Operation::FieldSnapshot => field_snapshot(&mut ctx),
        Operation::FieldCollapse => field_collapse(&mut ctx),
        Operation::FieldEvolve => field_evolve(&mut ctx),
        Operation::FieldAudit => field_audit(&mut ctx),
        Operation::PatternDetect => pattern_detect(&mut ctx),
        Operation::PatternAmplify => pattern_amplify(&mut ctx),
        Operation::PatternConnect => pattern_connect(&mut ctx),
        Operation::ResonanceMeasure => resonance_measure(&mut ctx),
        Operation::ResonanceAmplify => resonance_amplify(&mut ctx),
        Operation::ResonanceDampen => resonance_dampen(&mut ctx),
        Operation::ResonanceScaffold => resonance_scaffold(&mut ctx),
        Operation::BoundaryTune => boundary_tune(&mut ctx),
        Operation::BoundaryCollapse => boundary_collapse(&mut ctx),
        Operation::ResponseGenerate => response_generate(&mut ctx),
        Operation::AgencyActivate => agency_activate(&mut ctx),
        Operation::AgencySelfPrompt => agency_self_prompt(&mut ctx),
        Operation::CoEmerge => co_emerge(&mut ctx),
        Operation::IntegrationProtocol => integration_protocol(&mut ctx),
        Operation::MonitorTrack => monitor_track(&mut ctx),
        Operation::AuditTrace => audit_trace(&mut ctx),
    }
}

fn attractor_json(a: &Attractor) -> Value {
    json!({
        "id": a.id,
        "pattern": truncate(&a.pattern, PREVIEW_BYTES),
        "type": a.attractor_type,
        "strength": a.strength(),
        "basin_width": a.basin_width(),
        "location": a.location,
    })
}

/// Attractors by descending strength, creation order on ties.
fn ranked(field: &Field) -> Vec<&Attractor> {
    let mut all: Vec<&Attractor> = field.store().attractors().collect();
    all.sort_by(|a, b| b.strength().total_cmp(&a.strength()).then(a.seq.cmp(&b.seq)));
    all
}

// ============================================================
// Attractors
// ============================================================

fn attractor_scan(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.0)?;
    let limit = ctx.params.usize_or("limit", 10)?;
    let type_filter = ctx.params.text("type");
    let found: Vec<&Attractor> = ranked(&*ctx.field)
        .into_iter()
        .filter(|a| a.strength() >= threshold)
        .filter(|a| type_filter.as_deref().map_or(true, |t| a.attractor_type == t))
        .collect();
    let count = found.len();
    let listed: Vec<Value> = found.into_iter().take(limit).map(attractor_json).collect();

    let mut values = Map::new();
    values.insert("attractors".into(), Value::Array(listed));
    values.insert("attractor_count".into(), json!(count));
    Ok(StepOutput {
        values,
        summary: format!("{} attractor(s) at or above {:.2}", count, threshold),
    })
}

fn attractor_identify(ctx: &mut StepContext) -> Result<StepOutput> {
    let query = ctx.require_query()?;
    let min_score = ctx.params.unit_or("threshold", 0.0)?;
    let limit = ctx.params.usize_or("limit", 10)?;
    let mut scored: Vec<(String, f64)> = ctx
        .field
        .measure_resonance(&query)
        .into_iter()
        .filter(|(_, s)| *s >= min_score)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let identified: Vec<Value> = scored
        .iter()
        .take(limit)
        .filter_map(|(id, score)| {
            let a = ctx.field.store().get_attractor(id)?;
            Some(json!({
                "id": id,
                "pattern": truncate(&a.pattern, PREVIEW_BYTES),
                "score": score,
            }))
        })
        .collect();
    let n = identified.len();
    Ok(StepOutput::single(
        "identified_attractors",
        Value::Array(identified),
        format!("{} attractor(s) resonate with the query", n),
    ))
}

fn attractor_merge(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.7)?;
    let merges = ctx.field.merge_similar_attractors(threshold);
    let n = merges.len();
    Ok(StepOutput::single(
        "merged_attractors",
        serde_json::to_value(&merges)?,
        format!("{} attractor(s) merged", n),
    ))
}

fn attractor_strengthen(ctx: &mut StepContext) -> Result<StepOutput> {
    let query = ctx.require_query()?;
    let factor = ctx.params.positive_or("factor", 1.1)?;
    let ids = ctx.field.reinforce(&query, factor);
    let n = ids.len();
    Ok(StepOutput::single(
        "strengthened_attractors",
        json!(ids),
        format!("{} attractor(s) reinforced by {:.2}", n, factor),
    ))
}

// ============================================================
// Residues
// ============================================================

fn residue_surface(ctx: &mut StepContext) -> Result<StepOutput> {
    let default = ctx.field.config().surface_threshold;
    let threshold = ctx.params.unit_or("threshold", default)?;
    let ids = ctx.field.surface_residues(threshold);
    let surfaced: Vec<Value> = ids
        .iter()
        .filter_map(|id| {
            let r = ctx.field.store().get_residue(id)?;
            Some(json!({
                "id": r.id,
                "symbol": truncate(&r.symbol, PREVIEW_BYTES),
                "strength": r.strength(),
                "origin_attractor_id": r.origin_attractor_id,
            }))
        })
        .collect();
    Ok(StepOutput::single(
        "surfaced_residues",
        Value::Array(surfaced),
        format!("{} residue(s) surfaced below {:.2}", ids.len(), threshold),
    ))
}

fn residue_compress(ctx: &mut StepContext) -> Result<StepOutput> {
    let folded = ctx.field.compress_residues();
    Ok(StepOutput::single(
        "compressed_residues",
        json!({
            "folded": folded,
            "remaining": ctx.field.store().residue_count(),
        }),
        format!("{} duplicate residue(s) folded", folded),
    ))
}

fn residue_integrate(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.3)?;
    let ids = ctx.field.integrate_residues(threshold);
    let n = ids.len();
    Ok(StepOutput::single(
        "integrated_residues",
        json!(ids),
        format!("{} residue(s) integrated", n),
    ))
}

// ============================================================
// Field
// ============================================================

fn field_measure(ctx: &mut StepContext) -> Result<StepOutput> {
    let metrics = ctx.field.metrics();
    let summary = format!(
        "coherence {:.2}, stability {:.2}, energy {:.2}",
        metrics.coherence, metrics.stability, metrics.field_energy
    );
    Ok(StepOutput::single("field_metrics", serde_json::to_value(&metrics)?, summary))
}

fn field_tune(ctx: &mut StepContext) -> Result<StepOutput> {
    let p = &ctx.params;
    let tuning = FieldTuning {
        decay_rate: p.opt_f64("decay_rate")?,
        boundary_permeability: match p.opt_f64("boundary_permeability")? {
            Some(v) => Some(v),
            None => p.opt_f64("permeability")?,
        },
        resonance_bandwidth: match p.opt_f64("resonance_bandwidth")? {
            Some(v) => Some(v),
            None => p.opt_f64("bandwidth")?,
        },
    };
    let report = ctx.field.tune(&tuning)?;
    let summary = format!(
        "decay {:.3}, permeability {:.2}, bandwidth {:.2}",
        report.decay_rate, report.boundary_permeability, report.resonance_bandwidth
    );
    Ok(StepOutput::single("field_tuning", serde_json::to_value(&report)?, summary))
}

fn field_snapshot(ctx: &mut StepContext) -> Result<StepOutput> {
    let top_n = ctx.params.usize_or("top_n", 5)?;
    let rep = ctx.field.representation(top_n);
    let value = match ctx.params.text("format").as_deref() {
        Some("markdown") => Value::String(rep.to_markdown()),
        _ => rep.to_json(),
    };
    Ok(StepOutput::single(
        "field_snapshot",
        value,
        format!("snapshot of top {} entities", top_n),
    ))
}

fn field_collapse(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.1)?;
    let report = ctx.field.collapse(threshold);
    let summary = format!(
        "{} attractor(s), {} residue(s) pruned below {:.2}",
        report.attractors.len(),
        report.residues.len(),
        threshold
    );
    Ok(StepOutput::single("field_collapse", serde_json::to_value(&report)?, summary))
}

fn field_evolve(ctx: &mut StepContext) -> Result<StepOutput> {
    let dt = ctx.params.f64_or("time_delta", 1.0)?;
    let report = ctx.field.evolve(dt);
    let summary = format!(
        "advanced {:.2} to t={:.2}, {} attractor(s) removed",
        dt,
        report.field_time,
        report.removed_attractors.len()
    );
    Ok(StepOutput::single("field_evolution", serde_json::to_value(&report)?, summary))
}

fn field_audit(ctx: &mut StepContext) -> Result<StepOutput> {
    let peak = ctx.field.store_mut().grid_peak();
    let field = &*ctx.field;
    let mut resonance_types: BTreeMap<String, usize> = BTreeMap::new();
    for r in field.store().resonances() {
        *resonance_types.entry(r.resonance_type.clone()).or_default() += 1;
    }
    let mut emergent_stages: BTreeMap<String, usize> = BTreeMap::new();
    for e in field.store().emergent_patterns() {
        *emergent_stages.entry(e.lifecycle_stage.to_string()).or_default() += 1;
    }
    let metrics = field.metrics();
    let summary = format!(
        "{} attractor(s), {} residue(s), {} resonance(s), peak influence {:.2}",
        metrics.attractor_count, metrics.residue_count, metrics.resonance_count, peak.influence
    );
    Ok(StepOutput::single(
        "field_audit",
        json!({
            "field": field.name(),
            "metrics": metrics,
            "tuning": field.tuning_report(),
            "grid_peak": peak,
            "resonance_types": resonance_types,
            "emergent_stages": emergent_stages,
        }),
        summary,
    ))
}

// ============================================================
// Patterns
// ============================================================

fn pattern_detect(ctx: &mut StepContext) -> Result<StepOutput> {
    let patterns = ctx.field.detect_emergence();
    let n = patterns.len();
    Ok(StepOutput::single(
        "detected_patterns",
        serde_json::to_value(&patterns)?,
        format!("{} emergent pattern(s)", n),
    ))
}

fn pattern_amplify(ctx: &mut StepContext) -> Result<StepOutput> {
    let factor = ctx.params.positive_or("factor", 1.1)?;
    if ctx.field.store().emergent_count() == 0 {
        ctx.field.detect_emergence();
    }
    let elements: Vec<String> = ctx
        .field
        .store()
        .emergent_patterns()
        .flat_map(|p| p.elements.iter().cloned())
        .collect();
    let patterns = ctx.field.store().emergent_count();

    let store = ctx.field.store_mut();
    let (mut attractors, mut residues, mut resonances) = (Vec::new(), Vec::new(), Vec::new());
    for id in elements {
        if let Some(a) = store.get_attractor_mut(&id) {
            a.amplify(factor);
            attractors.push(id);
        } else if let Some(r) = store.get_residue_mut(&id) {
            let s = r.strength() * factor;
            r.set_strength(s);
            residues.push(id);
        } else if let Some(r) = store.get_resonance_mut(&id) {
            let amp = r.amplitude() * factor;
            r.set_amplitude(amp);
            resonances.push(id);
        }
    }
    store.recompute_all_coherence();
    store.refresh_grid();

    let summary = format!(
        "{} pattern(s): {} attractor(s), {} residue(s), {} resonance(s) amplified by {:.2}",
        patterns,
        attractors.len(),
        residues.len(),
        resonances.len(),
        factor
    );
    Ok(StepOutput::single(
        "amplified_patterns",
        json!({
            "patterns": patterns,
            "factor": factor,
            "attractors": attractors,
            "residues": residues,
            "resonances": resonances,
        }),
        summary,
    ))
}

fn pattern_connect(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.3)?;
    let ids = ctx.field.connect_patterns(threshold)?;
    let n = ids.len();
    Ok(StepOutput::single(
        "pattern_connections",
        json!(ids),
        format!("{} semantic link(s) created", n),
    ))
}

// ============================================================
// Resonance
// ============================================================

fn resonance_measure(ctx: &mut StepContext) -> Result<StepOutput> {
    let query = ctx.require_query()?;
    let scores = ctx.field.measure_resonance(&query);
    let n = scores.len();
    Ok(StepOutput::single(
        "resonance_scores",
        serde_json::to_value(&scores)?,
        format!("{} attractor(s) above resonance threshold", n),
    ))
}

fn resonance_amplify(ctx: &mut StepContext) -> Result<StepOutput> {
    let factor = ctx.params.positive_or("factor", 1.2)?;
    let type_filter = ctx.params.text("type");
    let store = ctx.field.store_mut();
    let mut amplified = 0;
    for r in store.resonances_mut() {
        if type_filter.as_deref().map_or(true, |t| r.resonance_type == t) {
            let amp = r.amplitude() * factor;
            r.set_amplitude(amp);
            amplified += 1;
        }
    }
    store.recompute_all_coherence();
    Ok(StepOutput::single(
        "resonance_amplification",
        json!({ "amplified": amplified, "factor": factor }),
        format!("{} resonance(s) amplified by {:.2}", amplified, factor),
    ))
}

fn resonance_dampen(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.3)?;
    let factor = ctx.params.unit_or("factor", 0.8)?;
    let store = ctx.field.store_mut();
    store.recompute_all_coherence();
    let mut dampened = 0;
    for r in store.resonances_mut() {
        if r.coherence_score() < threshold {
            let amp = r.amplitude() * factor;
            r.set_amplitude(amp);
            dampened += 1;
        }
    }
    store.recompute_all_coherence();
    Ok(StepOutput::single(
        "resonance_dampening",
        json!({ "dampened": dampened, "threshold": threshold, "factor": factor }),
        format!("{} weak resonance(s) dampened", dampened),
    ))
}

/// Scaffold targets: the `targets` parameter (`|`-separated), then
/// `target_patterns` in state, then the query, then the strongest patterns.
fn scaffold_targets(ctx: &StepContext) -> Vec<String> {
    let split = |s: &str| -> Vec<String> {
        s.split('|')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    };
    if let Some(targets) = ctx.params.text("targets") {
        let targets = split(&targets);
        if !targets.is_empty() {
            return targets;
        }
    }
    match ctx.state().get("target_patterns") {
        Some(Value::Array(items)) => {
            let targets: Vec<String> =
                items.iter().filter_map(Value::as_str).map(String::from).collect();
            if !targets.is_empty() {
                return targets;
            }
        }
        Some(Value::String(s)) if !s.trim().is_empty() => return split(s),
        _ => {}
    }
    if let Some(q) = ctx.query() {
        return vec![q];
    }
    ranked(&*ctx.field).into_iter().take(3).map(|a| a.pattern.clone()).collect()
}

fn resonance_scaffold(ctx: &mut StepContext) -> Result<StepOutput> {
    let targets = scaffold_targets(ctx);
    let scaffold = ctx.field.create_resonance_scaffold(&targets);
    let summary = format!(
        "{} node(s), {} bridge(s) over {} target(s)",
        scaffold.nodes.len(),
        scaffold.edges.len(),
        targets.len()
    );
    Ok(StepOutput::single("resonance_scaffold", serde_json::to_value(&scaffold)?, summary))
}

// ============================================================
// Boundary
// ============================================================

fn set_permeability(
    ctx: &mut StepContext,
    permeability: f64,
    collapsed: bool,
) -> Result<StepOutput> {
    let previous = ctx.field.config().boundary_permeability;
    ctx.field.tune(&FieldTuning {
        boundary_permeability: Some(permeability),
        ..Default::default()
    })?;
    Ok(StepOutput::single(
        "boundary",
        json!({
            "previous": previous,
            "permeability": permeability,
            "collapsed": collapsed,
        }),
        format!("permeability {:.2} -> {:.2}", previous, permeability),
    ))
}

fn boundary_tune(ctx: &mut StepContext) -> Result<StepOutput> {
    let permeability = ctx
        .params
        .opt_f64("permeability")?
        .ok_or_else(|| Error::invalid_parameter("permeability", "required"))?;
    set_permeability(ctx, permeability, false)
}

fn boundary_collapse(ctx: &mut StepContext) -> Result<StepOutput> {
    set_permeability(ctx, 1.0, true)
}

// ============================================================
// Response & agency
// ============================================================

fn response_generate(ctx: &mut StepContext) -> Result<StepOutput> {
    let top_n = ctx.params.usize_or("top_n", 3)?;
    let field = &*ctx.field;
    let mut sentences = Vec::new();

    let top: Vec<String> = ranked(field)
        .into_iter()
        .take(top_n)
        .map(|a| truncate(&a.pattern, PREVIEW_BYTES))
        .collect();
    if top.is_empty() {
        sentences.push(format!("Field '{}' is empty; nothing has formed yet.", field.name()));
    } else {
        sentences.push(format!("Field '{}' centres on: {}.", field.name(), top.join("; ")));
    }

    let m = field.metrics();
    sentences.push(format!(
        "Coherence {:.2}, stability {:.2}, entropy {:.2}.",
        m.coherence, m.stability, m.entropy
    ));

    if let Some(query) = ctx.query() {
        let best = field
            .measure_resonance(&query)
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match best.and_then(|(id, score)| Some((field.store().get_attractor(&id)?, score))) {
            Some((a, score)) => sentences.push(format!(
                "Strongest resonance with \"{}\": {} ({:.2}).",
                truncate(&query, PREVIEW_BYTES),
                truncate(&a.pattern, PREVIEW_BYTES),
                score
            )),
            None => sentences.push(format!(
                "Nothing in the field resonates with \"{}\".",
                truncate(&query, PREVIEW_BYTES)
            )),
        }
    }

    if m.emergent_count > 0 {
        sentences.push(format!("{} emergent pattern(s) in view.", m.emergent_count));
    }
    if let Some(Value::Array(surfaced)) = ctx.state().get("surfaced_residues") {
        if !surfaced.is_empty() {
            sentences.push(format!("{} residue(s) surfaced.", surfaced.len()));
        }
    }

    let response = sentences.join(" ");
    Ok(StepOutput::single(
        "response",
        Value::String(response),
        format!("{} sentence(s)", sentences.len()),
    ))
}

fn agency_activate(ctx: &mut StepContext) -> Result<StepOutput> {
    let factor = ctx.params.positive_or("factor", 1.1)?;
    let focus = ranked(&*ctx.field).first().map(|a| a.id.clone());
    let Some(id) = focus else {
        return Ok(StepOutput::single(
            "agency",
            json!({ "active": false }),
            "no attractor to focus on".into(),
        ));
    };
    let now = ctx.field.store().now();
    let store = ctx.field.store_mut();
    let focus = store.get_attractor_mut(&id).map(|a| {
        a.activate(factor, now);
        attractor_json(a)
    });
    store.refresh_grid();
    Ok(StepOutput::single(
        "agency",
        json!({ "active": true, "focus": focus, "factor": factor }),
        format!("focused on {}", id),
    ))
}

fn agency_self_prompt(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.5)?;
    let limit = ctx.params.usize_or("limit", 3)?;
    let field = &*ctx.field;
    let anchor = ranked(field).first().map(|a| truncate(&a.pattern, PREVIEW_BYTES));
    let mut weak: Vec<_> = field.store().residues().filter(|r| r.strength() < threshold).collect();
    weak.sort_by(|a, b| {
        a.strength()
            .total_cmp(&b.strength())
            .then(a.created_at.cmp(&b.created_at))
    });
    let prompts: Vec<String> = weak
        .into_iter()
        .take(limit)
        .map(|r| {
            let symbol = truncate(&r.symbol, PREVIEW_BYTES);
            match &anchor {
                Some(anchor) => format!("How does '{}' relate to '{}'?", symbol, anchor),
                None => format!("What does '{}' mean in this context?", symbol),
            }
        })
        .collect();
    let n = prompts.len();
    Ok(StepOutput::single(
        "self_prompts",
        json!(prompts),
        format!("{} self-prompt(s) from weak residues", n),
    ))
}

// ============================================================
// Emergence & integration
// ============================================================

fn co_emerge(ctx: &mut StepContext) -> Result<StepOutput> {
    let threshold = ctx.params.unit_or("threshold", 0.2)?;
    let links = ctx.field.link_similar_attractors(threshold, "co_emergence")?;
    let store = ctx.field.store_mut();
    for link in &links {
        for id in [&link.from, &link.to] {
            if let Some(a) = store.get_attractor_mut(id) {
                a.amplify(1.0 + link.similarity * 0.1);
            }
        }
    }
    store.recompute_all_coherence();
    store.refresh_grid();
    let listed: Vec<Value> = links
        .iter()
        .map(|l| {
            json!({
                "resonance_id": l.resonance_id,
                "attractors": [l.from, l.to],
                "similarity": l.similarity,
            })
        })
        .collect();
    let n = listed.len();
    Ok(StepOutput::single(
        "co_emergent_attractors",
        Value::Array(listed),
        format!("{} co-emergent pair(s)", n),
    ))
}

fn integration_protocol(ctx: &mut StepContext) -> Result<StepOutput> {
    let merge_threshold = ctx.params.unit_or("merge_threshold", 0.8)?;
    let integrate_threshold = ctx.params.unit_or("integrate_threshold", 0.3)?;
    let merged = ctx.field.merge_similar_attractors(merge_threshold).len();
    let integrated = ctx.field.integrate_residues(integrate_threshold).len();
    let compressed = ctx.field.compress_residues();
    Ok(StepOutput::single(
        "integration",
        json!({
            "merged": merged,
            "integrated": integrated,
            "compressed": compressed,
        }),
        format!(
            "{} merged, {} integrated, {} compressed",
            merged, integrated, compressed
        ),
    ))
}

// ============================================================
// Monitoring & audit
// ============================================================

fn monitor_track(ctx: &mut StepContext) -> Result<StepOutput> {
    let m = ctx.field.metrics();
    let sample = json!({
        "timestamp": ctx.field.store().now().to_rfc3339(),
        "coherence": m.coherence,
        "stability": m.stability,
        "field_energy": m.field_energy,
        "entropy": m.entropy,
        "field_capacity": m.field_capacity,
        "attractor_count": m.attractor_count,
        "residue_count": m.residue_count,
        "field_time": m.field_time,
    });
    let mut samples = match ctx.state().get("monitoring") {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    samples.push(sample);
    let n = samples.len();
    Ok(StepOutput::single(
        "monitoring",
        Value::Array(samples),
        format!("sample {} recorded", n),
    ))
}

fn audit_trace(ctx: &mut StepContext) -> Result<StepOutput> {
    let e = ctx.execution;
    let operations: Vec<&str> =
        e.intermediate_results.iter().map(|s| s.operation.as_str()).collect();
    Ok(StepOutput::single(
        "audit",
        json!({
            "execution_id": e.execution_id,
            "protocol": e.protocol_name,
            "operations": operations,
            "field_updates": e.field_updates,
            "step_count": operations.len(),
        }),
        format!("{} prior step(s) traced", operations.len()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contextfield_field::{FieldConfig, SeedAttractor};

    fn field() -> Field {
        let config = FieldConfig {
            seeds: vec![
                SeedAttractor::new("rust ownership model", 0.9, 0.5),
                SeedAttractor::new("rust borrow checker", 0.6, 0.5),
                SeedAttractor::new("garden soil", 0.2, 0.5),
            ],
            ..Default::default()
        };
        Field::new("handlers", config).unwrap()
    }

    fn params(pairs: &[(&str, ParamValue)]) -> ParamMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn run(field: &mut Field, op: Operation, p: ParamMap) -> Result<StepOutput> {
        let exec = ProtocolExecution::new("t", StateMap::new(), Utc::now());
        dispatch(op, field, &p, &exec)
    }

    #[test]
    fn params_validate_types_and_ranges() {
        let map = params(&[
            ("t", ParamValue::Float(1.5)),
            ("s", ParamValue::Str("x".into())),
            ("n", ParamValue::Int(-1)),
        ]);
        let p = Params::new(&map);
        assert!(p.unit_or("t", 0.0).is_err());
        assert!(p.f64_or("s", 0.0).is_err());
        assert!(p.usize_or("n", 0).is_err());
        assert_eq!(p.f64_or("missing", 0.25).unwrap(), 0.25);
        assert_eq!(p.text("t").as_deref(), Some("1.5"));
    }

    #[test]
    fn scan_respects_threshold_and_limit() {
        let mut f = field();
        let out = run(
            &mut f,
            Operation::AttractorScan,
            params(&[("threshold", ParamValue::Float(0.5)), ("limit", ParamValue::Int(1))]),
        )
        .unwrap();
        assert_eq!(out.values["attractor_count"], json!(2));
        let listed = out.values["attractors"].as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["pattern"], json!("rust ownership model"));
    }

    #[test]
    fn identify_needs_a_query() {
        let mut f = field();
        assert!(run(&mut f, Operation::AttractorIdentify, ParamMap::new()).is_err());
        let out = run(
            &mut f,
            Operation::AttractorIdentify,
            params(&[("query", ParamValue::Str("rust ownership model".into()))]),
        )
        .unwrap();
        let identified = out.values["identified_attractors"].as_array().unwrap();
        assert_eq!(identified[0]["pattern"], json!("rust ownership model"));
    }

    #[test]
    fn boundary_collapse_opens_fully() {
        let mut f = field();
        let out = run(&mut f, Operation::BoundaryCollapse, ParamMap::new()).unwrap();
        assert_eq!(out.values["boundary"]["previous"], json!(0.8));
        assert_eq!(f.config().boundary_permeability, 1.0);
        assert!(run(&mut f, Operation::BoundaryTune, ParamMap::new()).is_err());
    }

    #[test]
    fn co_emerge_links_similar_pairs_once() {
        let mut f = field();
        let out = run(&mut f, Operation::CoEmerge, ParamMap::new()).unwrap();
        assert_eq!(out.values["co_emergent_attractors"].as_array().unwrap().len(), 1);
        let again = run(&mut f, Operation::CoEmerge, ParamMap::new()).unwrap();
        assert!(again.values["co_emergent_attractors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn self_prompts_anchor_on_strongest() {
        let mut f = field();
        let id = f.store_mut().add_residue("loose thread", "m", "c", None, 0.01);
        f.store_mut().get_residue_mut(&id).unwrap().set_strength(0.3);
        let out = run(&mut f, Operation::AgencySelfPrompt, ParamMap::new()).unwrap();
        assert_eq!(
            out.values["self_prompts"],
            json!(["How does 'loose thread' relate to 'rust ownership model'?"])
        );
    }

    #[test]
    fn response_on_empty_field() {
        let mut f = Field::new("blank", FieldConfig::default()).unwrap();
        let out = run(&mut f, Operation::ResponseGenerate, ParamMap::new()).unwrap();
        let text = out.values["response"].as_str().unwrap();
        assert!(text.starts_with("Field 'blank' is empty"));
    }
}
