//! Human- and machine-readable dumps of a field for display and logging.

use crate::field::Field;
use crate::metrics::FieldMetrics;
use crate::model::{EmergentKind, LifecycleStage};
use chrono::{DateTime, Utc};
use contextfield_core::text::truncate;
use contextfield_core::{Lifecycle, Location};
use serde::Serialize;

const PATTERN_PREVIEW_BYTES: usize = 160;

#[derive(Clone, Debug, Serialize)]
pub struct AttractorSummary {
    pub id: String,
    pub pattern: String,
    pub attractor_type: String,
    pub strength: f64,
    pub basin_width: f64,
    pub lifecycle: Lifecycle,
    pub location: Location,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResidueSummary {
    pub id: String,
    pub symbol: String,
    pub strength: f64,
    pub lifecycle: Lifecycle,
    pub origin_attractor_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmergentSummary {
    pub id: String,
    pub pattern_type: EmergentKind,
    pub elements: usize,
    pub emergence_strength: f64,
    pub stability: f64,
    pub lifecycle_stage: LifecycleStage,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldRepresentation {
    pub field: String,
    pub generated_at: DateTime<Utc>,
    pub attractors: Vec<AttractorSummary>,
    pub residues: Vec<ResidueSummary>,
    pub emergent: Vec<EmergentSummary>,
    pub metrics: FieldMetrics,
}

impl Field {
    /// Top `top_n` attractors and residues by strength plus current metrics.
    pub fn representation(&self, top_n: usize) -> FieldRepresentation {
        let mut attractors: Vec<_> = self.store.attractors().collect();
        attractors.sort_by(|a, b| b.strength().total_cmp(&a.strength()).then(a.seq.cmp(&b.seq)));
        let attractors = attractors
            .into_iter()
            .take(top_n)
            .map(|a| AttractorSummary {
                id: a.id.clone(),
                pattern: truncate(&a.pattern, PATTERN_PREVIEW_BYTES),
                attractor_type: a.attractor_type.clone(),
                strength: a.strength(),
                basin_width: a.basin_width(),
                lifecycle: a.lifecycle,
                location: a.location,
            })
            .collect();

        let mut residues: Vec<_> = self.store.residues().collect();
        residues.sort_by(|a, b| {
            b.strength()
                .total_cmp(&a.strength())
                .then(a.created_at.cmp(&b.created_at))
        });
        let residues = residues
            .into_iter()
            .take(top_n)
            .map(|r| ResidueSummary {
                id: r.id.clone(),
                symbol: truncate(&r.symbol, PATTERN_PREVIEW_BYTES),
                strength: r.strength(),
                lifecycle: r.lifecycle,
                origin_attractor_id: r.origin_attractor_id.clone(),
            })
            .collect();

        let emergent = self
            .store
            .emergent_patterns()
            .map(|e| EmergentSummary {
                id: e.id.clone(),
                pattern_type: e.pattern_type,
                elements: e.elements.len(),
                emergence_strength: e.emergence_strength,
                stability: e.stability(),
                lifecycle_stage: e.lifecycle_stage,
            })
            .collect();

        FieldRepresentation {
            field: self.name().to_string(),
            generated_at: self.store.now(),
            attractors,
            residues,
            emergent,
            metrics: self.metrics(),
        }
    }
}

impl FieldRepresentation {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_markdown(&self) -> String {
        let m = &self.metrics;
        let mut out = format!(
            "# Field: {}\n\n## Metrics\n\
             - Coherence: {:.3}\n\
             - Stability: {:.3}\n\
             - Energy: {:.3}\n\
             - Entropy: {:.3}\n\
             - Capacity: {:.1}%\n\
             - Attractors: {} | Residues: {} | Resonances: {} | Emergent: {}\n",
            self.field,
            m.coherence,
            m.stability,
            m.field_energy,
            m.entropy,
            m.field_capacity * 100.0,
            m.attractor_count,
            m.residue_count,
            m.resonance_count,
            m.emergent_count,
        );

        out.push_str("\n## Attractors\n");
        if self.attractors.is_empty() {
            out.push_str("_none_\n");
        }
        for a in &self.attractors {
            out.push_str(&format!(
                "- **{:.2}** {} _({}, basin {:.2})_\n",
                a.strength, a.pattern, a.attractor_type, a.basin_width
            ));
        }

        out.push_str("\n## Residues\n");
        if self.residues.is_empty() {
            out.push_str("_none_\n");
        }
        for r in &self.residues {
            out.push_str(&format!("- {:.2} {} [{}]\n", r.strength, r.symbol, r.lifecycle));
        }

        if !self.emergent.is_empty() {
            out.push_str("\n## Emergent Patterns\n");
            for e in &self.emergent {
                out.push_str(&format!(
                    "- {} ×{} strength {:.2} stability {:.2} ({})\n",
                    e.pattern_type, e.elements, e.emergence_strength, e.stability, e.lifecycle_stage
                ));
            }
        }
        out
    }
}
