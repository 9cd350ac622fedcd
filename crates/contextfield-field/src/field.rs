//! Field: one store plus the configuration its engines run under.
//!
//! The engines live in sibling modules as `impl Field` blocks:
//! resonance/injection (`resonance`), decay and maintenance (`decay`),
//! emergence detection (`emergence`), metrics (`metrics`) and the
//! display export (`represent`).

use crate::config::FieldConfig;
use crate::store::FieldStore;
use contextfield_core::{clamp_unit, Clock, Error, Result, SystemClock};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Attractor type given to seeds and injected patterns.
pub const DEFAULT_ATTRACTOR_TYPE: &str = "semantic";

pub struct Field {
    name: String,
    pub(crate) config: FieldConfig,
    pub(crate) store: FieldStore,
    pub(crate) field_time: f64,
}

/// Runtime adjustments accepted by `Field::tune`. Unset fields are left alone.
#[derive(Clone, Debug, Default)]
pub struct FieldTuning {
    pub decay_rate: Option<f64>,
    pub boundary_permeability: Option<f64>,
    pub resonance_bandwidth: Option<f64>,
}

/// Parameter values in effect after tuning.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TuningReport {
    pub decay_rate: f64,
    pub boundary_permeability: f64,
    pub resonance_bandwidth: f64,
}

impl Field {
    pub fn new(name: impl Into<String>, config: FieldConfig) -> Result<Self> {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Build a field on an explicit clock and plant the configured seeds.
    pub fn with_clock(
        name: impl Into<String>,
        config: FieldConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let mut store = FieldStore::new(config.max_attractors, config.grid.resolution, clock);
        for seed in &config.seeds {
            store.spawn_attractor(
                &seed.pattern,
                DEFAULT_ATTRACTOR_TYPE,
                None,
                seed.strength,
                seed.basin_width,
            );
        }
        store.refresh_grid();
        info!(field = %name, seeds = config.seeds.len(), "field created");
        Ok(Self {
            name,
            config,
            store,
            field_time: 0.0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut FieldStore {
        &mut self.store
    }

    /// Total field time advanced by `evolve`.
    pub fn field_time(&self) -> f64 {
        self.field_time
    }

    /// Adjust engine parameters at runtime. Values must lie in [0, 1].
    pub fn tune(&mut self, tuning: &FieldTuning) -> Result<TuningReport> {
        let checks = [
            ("decay_rate", tuning.decay_rate),
            ("boundary_permeability", tuning.boundary_permeability),
            ("resonance_bandwidth", tuning.resonance_bandwidth),
        ];
        for (name, value) in checks {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(Error::invalid_parameter(name, format!("{} is outside [0, 1]", v)));
                }
            }
        }
        if let Some(v) = tuning.decay_rate {
            self.config.decay_rate = v;
        }
        if let Some(v) = tuning.boundary_permeability {
            self.config.boundary_permeability = v;
        }
        if let Some(v) = tuning.resonance_bandwidth {
            self.config.resonance_bandwidth = v;
        }
        info!(
            field = %self.name,
            decay_rate = self.config.decay_rate,
            permeability = self.config.boundary_permeability,
            bandwidth = self.config.resonance_bandwidth,
            "field tuned"
        );
        Ok(self.tuning_report())
    }

    pub fn tuning_report(&self) -> TuningReport {
        TuningReport {
            decay_rate: self.config.decay_rate,
            boundary_permeability: clamp_unit(self.config.boundary_permeability),
            resonance_bandwidth: clamp_unit(self.config.resonance_bandwidth),
        }
    }
}
