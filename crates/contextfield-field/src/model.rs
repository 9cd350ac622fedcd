//! Field entities. Cross-references between entities are plain ids and
//! may dangle; resolve them through the store.

use chrono::{DateTime, Utc};
use contextfield_core::{clamp_unit, Lifecycle, Location};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable weighted concept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attractor {
    pub id: String,
    pub pattern: String,
    /// Free-form category; clusters only form within one type.
    pub attractor_type: String,
    strength: f64,
    basin_width: f64,
    pub location: Location,
    pub lifecycle: Lifecycle,
    pub created_at: DateTime<Utc>,
    pub last_activated: DateTime<Utc>,
    pub activation_count: u64,
    /// Creation order; breaks eviction ties.
    pub seq: u64,
}

impl Attractor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        pattern: impl Into<String>,
        attractor_type: impl Into<String>,
        location: Location,
        strength: f64,
        basin_width: f64,
        now: DateTime<Utc>,
        seq: u64,
    ) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            attractor_type: attractor_type.into(),
            strength: clamp_unit(strength),
            basin_width: clamp_unit(basin_width),
            location: location.clamped(),
            lifecycle: Lifecycle::Attractor,
            created_at: now,
            last_activated: now,
            activation_count: 0,
            seq,
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn basin_width(&self) -> f64 {
        self.basin_width
    }

    pub fn set_strength(&mut self, strength: f64) {
        self.strength = clamp_unit(strength);
    }

    pub fn set_basin_width(&mut self, basin_width: f64) {
        self.basin_width = clamp_unit(basin_width);
    }

    /// Multiply strength by `factor`, clamped.
    pub fn amplify(&mut self, factor: f64) {
        self.set_strength(self.strength * factor);
    }

    /// Access-based reinforcement.
    pub fn activate(&mut self, factor: f64, now: DateTime<Utc>) {
        self.amplify(factor);
        self.activation_count += 1;
        self.last_activated = now;
    }
}

/// A weaker, decaying trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymbolicResidue {
    pub id: String,
    /// The trace content itself.
    pub symbol: String,
    pub meaning: String,
    pub context: String,
    strength: f64,
    /// Per-residue exponential decay rate.
    pub decay_rate: f64,
    pub lifecycle: Lifecycle,
    pub origin_attractor_id: Option<String>,
    pub location: Location,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SymbolicResidue {
    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn set_strength(&mut self, strength: f64) {
        self.strength = clamp_unit(strength);
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        symbol: String,
        meaning: String,
        context: String,
        strength: f64,
        decay_rate: f64,
        location: Location,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            symbol,
            meaning,
            context,
            strength: clamp_unit(strength),
            decay_rate: decay_rate.max(0.0),
            lifecycle: Lifecycle::Echo,
            origin_attractor_id: None,
            location: location.clamped(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A link over a set of source ids (attractors and/or residues).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResonancePattern {
    pub id: String,
    pub source_ids: Vec<String>,
    pub frequency: f64,
    amplitude: f64,
    pub phase: f64,
    pub resonance_type: String,
    coherence_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ResonancePattern {
    pub(crate) fn new(
        id: String,
        source_ids: Vec<String>,
        frequency: f64,
        amplitude: f64,
        resonance_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_ids,
            frequency,
            amplitude: clamp_unit(amplitude),
            phase: 0.0,
            resonance_type: resonance_type.into(),
            coherence_score: 0.0,
            created_at: now,
        }
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn set_amplitude(&mut self, amplitude: f64) {
        self.amplitude = clamp_unit(amplitude);
    }

    /// Last computed coherence. Call `FieldStore::recompute_coherence` to refresh.
    pub fn coherence_score(&self) -> f64 {
        self.coherence_score
    }

    pub(crate) fn set_coherence(&mut self, score: f64) {
        self.coherence_score = clamp_unit(score);
    }
}

/// A transient pattern activation: a sub-threshold injection that never
/// becomes an attractor by itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternActivation {
    pub id: String,
    pub pattern: String,
    strength: f64,
    pub location: Location,
    pub created_at: DateTime<Utc>,
    /// Set once the activation has produced a residue.
    pub surfaced: bool,
}

impl PatternActivation {
    pub(crate) fn new(
        id: String,
        pattern: String,
        strength: f64,
        location: Location,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            pattern,
            strength: clamp_unit(strength),
            location: location.clamped(),
            created_at: now,
            surfaced: false,
        }
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn set_strength(&mut self, strength: f64) {
        self.strength = clamp_unit(strength);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergentKind {
    AttractorCluster,
    ResonanceNetwork,
    SymbolicConvergence,
}

impl fmt::Display for EmergentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttractorCluster => write!(f, "attractor_cluster"),
            Self::ResonanceNetwork => write!(f, "resonance_network"),
            Self::SymbolicConvergence => write!(f, "symbolic_convergence"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    Forming,
    Stabilizing,
    Mature,
    Decaying,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forming => write!(f, "forming"),
            Self::Stabilizing => write!(f, "stabilizing"),
            Self::Mature => write!(f, "mature"),
            Self::Decaying => write!(f, "decaying"),
        }
    }
}

/// A detected higher-order structure. Only the emergence pass creates these.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmergentPattern {
    pub id: String,
    pub pattern_type: EmergentKind,
    pub elements: Vec<String>,
    pub emergence_strength: f64,
    stability: f64,
    pub lifecycle_stage: LifecycleStage,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl EmergentPattern {
    pub(crate) fn new(
        id: String,
        pattern_type: EmergentKind,
        mut elements: Vec<String>,
        emergence_strength: f64,
        stability: f64,
        now: DateTime<Utc>,
    ) -> Self {
        elements.sort();
        Self {
            id,
            pattern_type,
            elements,
            emergence_strength: emergence_strength.max(0.0),
            stability: clamp_unit(stability),
            lifecycle_stage: LifecycleStage::Forming,
            created_at: now,
            last_seen: now,
        }
    }

    pub fn stability(&self) -> f64 {
        self.stability
    }

    pub(crate) fn set_stability(&mut self, stability: f64) {
        self.stability = clamp_unit(stability);
    }

    /// Identity used to match re-detections of the same structure.
    pub(crate) fn signature(&self) -> String {
        format!("{}:{}", self.pattern_type, self.elements.join(","))
    }
}
