//! Field-level metrics. Pure functions of the current state, recomputed
//! on every call; empty state yields neutral values, never an error.

use crate::field::Field;
use contextfield_core::text::{estimate_tokens, jaccard_sets, token_set};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldMetrics {
    pub coherence: f64,
    pub stability: f64,
    pub field_energy: f64,
    pub entropy: f64,
    /// Estimated token use over usable capacity; may exceed 1.0.
    pub field_capacity: f64,
    pub attractor_count: usize,
    pub residue_count: usize,
    pub resonance_count: usize,
    pub emergent_count: usize,
    pub activation_count: usize,
    pub field_time: f64,
}

impl Field {
    /// Mean pairwise similarity across attractors: 0.0 for an empty
    /// field, 1.0 for a single attractor.
    pub fn get_field_coherence(&self) -> f64 {
        let sets: Vec<HashSet<String>> =
            self.store.attractors().map(|a| token_set(&a.pattern)).collect();
        match sets.len() {
            0 => 0.0,
            1 => 1.0,
            n => {
                let mut total = 0.0;
                for i in 0..n {
                    for j in (i + 1)..n {
                        total += jaccard_sets(&sets[i], &sets[j]);
                    }
                }
                total / (n * (n - 1) / 2) as f64
            }
        }
    }

    /// mean(strength) × (1 − stddev(strength)), never negative.
    pub fn get_field_stability(&self) -> f64 {
        let strengths: Vec<f64> = self.store.attractors().map(|a| a.strength()).collect();
        if strengths.is_empty() {
            return 0.0;
        }
        let n = strengths.len() as f64;
        let mean = strengths.iter().sum::<f64>() / n;
        let stddev = (strengths.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
        (mean * (1.0 - stddev)).max(0.0)
    }

    /// Attractor strengths + resonance amplitudes + emergence strengths.
    pub fn get_field_energy(&self) -> f64 {
        let attractors: f64 = self.store.attractors().map(|a| a.strength()).sum();
        let resonances: f64 = self.store.resonances().map(|r| r.amplitude()).sum();
        let emergent: f64 = self.store.emergent_patterns().map(|e| e.emergence_strength).sum();
        attractors + resonances + emergent
    }

    /// Normalized Shannon entropy of the strength distribution: 1.0 when
    /// empty (or all strengths zero), 0.0 for a single attractor.
    pub fn get_field_entropy(&self) -> f64 {
        let strengths: Vec<f64> = self.store.attractors().map(|a| a.strength()).collect();
        let total: f64 = strengths.iter().sum();
        if strengths.is_empty() || total <= 0.0 {
            return 1.0;
        }
        if strengths.len() == 1 {
            return 0.0;
        }
        let h: f64 = strengths
            .iter()
            .filter(|s| **s > 0.0)
            .map(|s| {
                let p = s / total;
                -p * p.log2()
            })
            .sum();
        h / (strengths.len() as f64).log2()
    }

    pub fn estimated_tokens(&self) -> usize {
        let attractors: usize =
            self.store.attractors().map(|a| estimate_tokens(&a.pattern)).sum();
        let residues: usize = self.store.residues().map(|r| estimate_tokens(&r.symbol)).sum();
        let activations: usize =
            self.store.activations().map(|a| estimate_tokens(&a.pattern)).sum();
        attractors + residues + activations
    }

    pub fn get_field_capacity(&self) -> f64 {
        let usable = self.config.usable_capacity().max(1);
        self.estimated_tokens() as f64 / usable as f64
    }

    pub fn metrics(&self) -> FieldMetrics {
        FieldMetrics {
            coherence: self.get_field_coherence(),
            stability: self.get_field_stability(),
            field_energy: self.get_field_energy(),
            entropy: self.get_field_entropy(),
            field_capacity: self.get_field_capacity(),
            attractor_count: self.store.attractor_count(),
            residue_count: self.store.residue_count(),
            resonance_count: self.store.resonance_count(),
            emergent_count: self.store.emergent_count(),
            activation_count: self.store.activation_count(),
            field_time: self.field_time,
        }
    }
}
