//! Operation registry: the closed set of operations a shell may name.
//!
//! Names arriving from parsed text resolve to an `Operation` variant or to
//! nothing; dispatch itself is an exhaustive match in `handlers`.

use crate::execution::ExecutionState;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    AttractorScan,
    AttractorIdentify,
    AttractorMerge,
    AttractorStrengthen,
    ResidueSurface,
    ResidueCompress,
    ResidueIntegrate,
    FieldMeasure,
    FieldTune,
    FieldSnapshot,
    FieldCollapse,
    FieldEvolve,
    FieldAudit,
    PatternDetect,
    PatternAmplify,
    PatternConnect,
    ResonanceMeasure,
    ResonanceAmplify,
    ResonanceDampen,
    ResonanceScaffold,
    BoundaryTune,
    BoundaryCollapse,
    ResponseGenerate,
    AgencyActivate,
    AgencySelfPrompt,
    CoEmerge,
    IntegrationProtocol,
    MonitorTrack,
    AuditTrace,
}

impl Operation {
    pub const ALL: [Operation; 29] = [
        Self::AttractorScan,
        Self::AttractorIdentify,
        Self::AttractorMerge,
        Self::AttractorStrengthen,
        Self::ResidueSurface,
        Self::ResidueCompress,
        Self::ResidueIntegrate,
        Self::FieldMeasure,
        Self::FieldTune,
        Self::FieldSnapshot,
        Self::FieldCollapse,
        Self::FieldEvolve,
        Self::FieldAudit,
        Self::PatternDetect,
        Self::PatternAmplify,
        Self::PatternConnect,
        Self::ResonanceMeasure,
        Self::ResonanceAmplify,
        Self::ResonanceDampen,
        Self::ResonanceScaffold,
        Self::BoundaryTune,
        Self::BoundaryCollapse,
        Self::ResponseGenerate,
        Self::AgencyActivate,
        Self::AgencySelfPrompt,
        Self::CoEmerge,
        Self::IntegrationProtocol,
        Self::MonitorTrack,
        Self::AuditTrace,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AttractorScan => "attractor.scan",
            Self::AttractorIdentify => "attractor.identify",
            Self::AttractorMerge => "attractor.merge",
            Self::AttractorStrengthen => "attractor.strengthen",
            Self::ResidueSurface => "residue.surface",
            Self::ResidueCompress => "residue.compress",
            Self::ResidueIntegrate => "residue.integrate",
            Self::FieldMeasure => "field.measure",
            Self::FieldTune => "field.tune",
            Self::FieldSnapshot => "field.snapshot",
            Self::FieldCollapse => "field.collapse",
            Self::FieldEvolve => "field.evolve",
            Self::FieldAudit => "field.audit",
            Self::PatternDetect => "pattern.detect",
            Self::PatternAmplify => "pattern.amplify",
            Self::PatternConnect => "pattern.connect",
            Self::ResonanceMeasure => "resonance.measure",
            Self::ResonanceAmplify => "resonance.amplify",
            Self::ResonanceDampen => "resonance.dampen",
            Self::ResonanceScaffold => "resonance.scaffold",
            Self::BoundaryTune => "boundary.tune",
            Self::BoundaryCollapse => "boundary.collapse",
            Self::ResponseGenerate => "response.generate",
            Self::AgencyActivate => "agency.activate",
            Self::AgencySelfPrompt => "agency.self_prompt",
            Self::CoEmerge => "co.emerge",
            Self::IntegrationProtocol => "integration.protocol",
            Self::MonitorTrack => "monitor.track",
            Self::AuditTrace => "audit.trace",
        }
    }

    /// Execution state entered while this operation runs.
    pub fn phase(self) -> ExecutionState {
        match self {
            Self::ResonanceMeasure
            | Self::ResonanceAmplify
            | Self::ResonanceDampen
            | Self::ResonanceScaffold
            | Self::PatternConnect
            | Self::AttractorIdentify => ExecutionState::Resonating,
            Self::PatternDetect | Self::CoEmerge | Self::IntegrationProtocol => {
                ExecutionState::Emerging
            }
            _ => ExecutionState::Active,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::AttractorScan => "list attractors at or above a strength threshold",
            Self::AttractorIdentify => "attractors resonating with the query",
            Self::AttractorMerge => "fold near-duplicate attractors together",
            Self::AttractorStrengthen => "reinforce attractors matching the query",
            Self::ResidueSurface => "surface residues from weak attractors and activations",
            Self::ResidueCompress => "merge residues with identical symbols",
            Self::ResidueIntegrate => "fold strong residues back into attractors",
            Self::FieldMeasure => "field metrics",
            Self::FieldTune => "adjust decay, permeability and bandwidth",
            Self::FieldSnapshot => "structured or markdown field representation",
            Self::FieldCollapse => "prune entities below a threshold",
            Self::FieldEvolve => "advance field time",
            Self::FieldAudit => "metrics, counts and influence peak",
            Self::PatternDetect => "detect emergent patterns",
            Self::PatternAmplify => "amplify attractors taking part in emergent patterns",
            Self::PatternConnect => "link similar attractors",
            Self::ResonanceMeasure => "resonance scores for the query",
            Self::ResonanceAmplify => "scale resonance amplitudes up",
            Self::ResonanceDampen => "scale weak resonance amplitudes down",
            Self::ResonanceScaffold => "bridge strongly resonating attractors",
            Self::BoundaryTune => "set boundary permeability",
            Self::BoundaryCollapse => "open the boundary fully",
            Self::ResponseGenerate => "summarise the field as text",
            Self::AgencyActivate => "focus on the strongest attractor",
            Self::AgencySelfPrompt => "questions raised by weak residues",
            Self::CoEmerge => "link co-emergent attractor pairs",
            Self::IntegrationProtocol => "merge, integrate and compress in one step",
            Self::MonitorTrack => "append a timestamped metric sample",
            Self::AuditTrace => "operations and field updates so far",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
