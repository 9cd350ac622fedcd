//! contextfield-field: semantic field simulation
//!
//! A field holds weighted concepts (attractors), decaying traces
//! (symbolic residues), links between them (resonance patterns) and the
//! higher-order structures detected over all of it (emergent patterns).
//!
//! - `store`: owning maps by id, capacity, influence grid
//! - `resonance`: lexical resonance, injection, scaffolding
//! - `decay`: time advancement and maintenance passes
//! - `emergence`: cluster / network / convergence detection
//! - `metrics`, `represent`: derived views

pub mod config;
pub mod decay;
pub mod emergence;
pub mod field;
pub mod grid;
pub mod metrics;
pub mod model;
pub mod represent;
pub mod resonance;
pub mod store;

pub use config::{
    DecayConfig, EmergenceConfig, FieldConfig, GridConfig, ResonanceConfig, SeedAttractor,
};
pub use decay::{CollapseReport, EvolutionReport, MergeRecord};
pub use field::{Field, FieldTuning, TuningReport, DEFAULT_ATTRACTOR_TYPE};
pub use grid::GridPeak;
pub use metrics::FieldMetrics;
pub use model::{
    Attractor, EmergentKind, EmergentPattern, LifecycleStage, PatternActivation, ResonancePattern,
    SymbolicResidue,
};
pub use represent::FieldRepresentation;
pub use resonance::{
    InjectionKind, InjectionOutcome, PairLink, ResonanceScaffold, ScaffoldEdge, ScaffoldNode,
};
pub use store::FieldStore;
