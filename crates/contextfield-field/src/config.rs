//! Field configuration: boundary, decay, resonance, grid and emergence
//! tuning plus the seed attractors a new field starts with.
//!
//! `validate` enforces the value ranges. A missing or invalid TOML file
//! leaves the field on `FieldConfig::default()`.

use contextfield_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level field configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Attractor decay per unit of field time.
    pub decay_rate: f64,
    /// Fraction of injected strength that crosses the field boundary.
    pub boundary_permeability: f64,
    /// Basin width given to newly formed attractors.
    pub resonance_bandwidth: f64,
    /// Effective strength needed for an injection to form an attractor.
    pub attractor_formation_threshold: f64,
    /// Soft token ceiling, reporting only.
    pub max_capacity: usize,
    /// Tokens held back from `max_capacity`.
    pub reserved_tokens: usize,
    /// Hard limit on live attractors; the weakest is evicted beyond it.
    pub max_attractors: usize,
    /// Attractors weaker than this surface as residues.
    pub surface_threshold: f64,
    /// Attractors planted when a field is created.
    pub seeds: Vec<SeedAttractor>,
    pub resonance: ResonanceConfig,
    pub decay: DecayConfig,
    pub emergence: EmergenceConfig,
    pub grid: GridConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceConfig {
    /// Minimum similarity for an attractor to resonate at all.
    pub threshold: f64,
    pub amplification: f64,
    pub distance_factor: f64,
    /// Similarity at which an injection blends into an existing attractor.
    pub blend_threshold: f64,
    /// Weight of the incoming strength when blending.
    pub blend_ratio: f64,
    pub blend_separator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Fraction of decay suppressed for attractors above 0.8 strength.
    pub strong_protection: f64,
    pub attractor_floor: f64,
    pub residue_floor: f64,
    pub transient_floor: f64,
    /// Residue decay rate as a fraction of `decay_rate`.
    pub residue_rate_factor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergenceConfig {
    /// Cluster proximity radius in grid units.
    pub cluster_radius: f64,
    /// Grid units spanned by the unit square.
    pub grid_scale: f64,
    pub min_cluster_size: usize,
    pub min_network_size: usize,
    pub min_convergence_size: usize,
    /// Residues converge when their meanings share this many leading chars.
    pub meaning_prefix_chars: usize,
    pub stabilizing_after_secs: i64,
    pub mature_after_secs: i64,
    /// Mature patterns below this stability start decaying.
    pub decaying_below_stability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cells per side of the influence grid.
    pub resolution: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedAttractor {
    pub pattern: String,
    #[serde(default = "default_seed_strength")]
    pub strength: f64,
    #[serde(default = "default_seed_basin")]
    pub basin_width: f64,
}

fn default_seed_strength() -> f64 {
    0.5
}

fn default_seed_basin() -> f64 {
    0.5
}

impl SeedAttractor {
    pub fn new(pattern: impl Into<String>, strength: f64, basin_width: f64) -> Self {
        Self {
            pattern: pattern.into(),
            strength,
            basin_width,
        }
    }
}

// ============================================================
// Defaults
// ============================================================

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            decay_rate: 0.05,
            boundary_permeability: 0.8,
            resonance_bandwidth: 0.6,
            attractor_formation_threshold: 0.7,
            max_capacity: 8000,
            reserved_tokens: 2000,
            max_attractors: 100,
            surface_threshold: 0.3,
            seeds: Vec::new(),
            resonance: ResonanceConfig::default(),
            decay: DecayConfig::default(),
            emergence: EmergenceConfig::default(),
            grid: GridConfig::default(),
        }
    }
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            threshold: 0.2,
            amplification: 1.2,
            distance_factor: 0.5,
            blend_threshold: 0.7,
            blend_ratio: 0.3,
            blend_separator: " | ".into(),
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            strong_protection: 0.8,
            attractor_floor: 0.01,
            residue_floor: 0.1,
            transient_floor: 0.01,
            residue_rate_factor: 0.5,
        }
    }
}

impl Default for EmergenceConfig {
    fn default() -> Self {
        Self {
            cluster_radius: 25.0,
            grid_scale: 100.0,
            min_cluster_size: 3,
            min_network_size: 2,
            min_convergence_size: 3,
            meaning_prefix_chars: 12,
            stabilizing_after_secs: 3600,
            mature_after_secs: 6 * 3600,
            decaying_below_stability: 0.3,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { resolution: 32 }
    }
}

// ============================================================
// Loading
// ============================================================

impl FieldConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded field config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Reject out-of-range parameters before any field is built from them.
    pub fn validate(&self) -> Result<()> {
        let unit = [
            ("decay_rate", self.decay_rate),
            ("boundary_permeability", self.boundary_permeability),
            ("resonance_bandwidth", self.resonance_bandwidth),
            ("attractor_formation_threshold", self.attractor_formation_threshold),
            ("surface_threshold", self.surface_threshold),
            ("resonance.threshold", self.resonance.threshold),
            ("resonance.blend_threshold", self.resonance.blend_threshold),
            ("resonance.blend_ratio", self.resonance.blend_ratio),
            ("decay.strong_protection", self.decay.strong_protection),
            ("decay.attractor_floor", self.decay.attractor_floor),
            ("decay.residue_floor", self.decay.residue_floor),
            ("decay.transient_floor", self.decay.transient_floor),
            ("decay.residue_rate_factor", self.decay.residue_rate_factor),
            ("emergence.decaying_below_stability", self.emergence.decaying_below_stability),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid_config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.max_capacity <= self.reserved_tokens {
            return Err(Error::invalid_config(format!(
                "max_capacity ({}) must exceed reserved_tokens ({})",
                self.max_capacity, self.reserved_tokens
            )));
        }
        if self.max_attractors == 0 {
            return Err(Error::invalid_config("max_attractors must be > 0"));
        }
        if !(self.resonance.amplification > 0.0) {
            return Err(Error::invalid_config("resonance.amplification must be > 0"));
        }
        if !(self.resonance.distance_factor > 0.0) {
            return Err(Error::invalid_config("resonance.distance_factor must be > 0"));
        }
        if !(1..=256).contains(&self.grid.resolution) {
            return Err(Error::invalid_config("grid.resolution must be in 1..=256"));
        }
        if !(self.emergence.cluster_radius >= 0.0) || !(self.emergence.grid_scale > 0.0) {
            return Err(Error::invalid_config(
                "emergence.cluster_radius must be >= 0 and grid_scale > 0",
            ));
        }
        if self.emergence.stabilizing_after_secs < 0
            || self.emergence.mature_after_secs < self.emergence.stabilizing_after_secs
        {
            return Err(Error::invalid_config(
                "emergence thresholds must satisfy 0 <= stabilizing_after <= mature_after",
            ));
        }
        for seed in &self.seeds {
            if !(0.0..=1.0).contains(&seed.strength) || !(0.0..=1.0).contains(&seed.basin_width) {
                return Err(Error::invalid_config(format!(
                    "seed '{}' strength and basin_width must be in [0, 1]",
                    seed.pattern
                )));
            }
        }
        Ok(())
    }

    /// Tokens available before the soft ceiling.
    pub fn usable_capacity(&self) -> usize {
        self.max_capacity.saturating_sub(self.reserved_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(FieldConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_permeability_rejected() {
        let config = FieldConfig {
            boundary_permeability: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_type(), "InvalidConfiguration");
    }

    #[test]
    fn capacity_must_exceed_reserve() {
        let config = FieldConfig {
            max_capacity: 100,
            reserved_tokens: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_roundtrip_keeps_defaults() {
        let text = FieldConfig::default().to_toml();
        let parsed = FieldConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.decay_rate, 0.05);
        assert_eq!(parsed.resonance.blend_separator, " | ");
        assert_eq!(parsed.emergence.mature_after_secs, 21600);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed = FieldConfig::from_toml_str(
            r#"
decay_rate = 0.1

[[seeds]]
pattern = "ownership rules"
strength = 0.9
"#,
        )
        .unwrap();
        assert_eq!(parsed.decay_rate, 0.1);
        assert_eq!(parsed.boundary_permeability, 0.8);
        assert_eq!(parsed.seeds.len(), 1);
        assert_eq!(parsed.seeds[0].basin_width, 0.5);
    }
}
