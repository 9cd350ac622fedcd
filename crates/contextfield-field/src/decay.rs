//! Decay and field maintenance: time advancement, residue surfacing,
//! compression and integration, attractor merging and collapse.

use crate::field::Field;
use crate::model::SymbolicResidue;
use contextfield_core::text::{jaccard, truncate};
use contextfield_core::{new_id, Lifecycle};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Strength above which attractors get decay protection.
pub const PROTECTED_STRENGTH: f64 = 0.8;

#[derive(Clone, Debug, Default, Serialize)]
pub struct EvolutionReport {
    pub time_delta: f64,
    pub field_time: f64,
    pub decayed_attractors: usize,
    pub removed_attractors: Vec<String>,
    pub removed_residues: Vec<String>,
    pub removed_activations: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CollapseReport {
    pub threshold: f64,
    pub attractors: Vec<String>,
    pub residues: Vec<String>,
    pub activations: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MergeRecord {
    pub kept: String,
    pub merged: String,
    pub similarity: f64,
}

impl Field {
    /// Advance field time. Decay scales with `time_delta`; a zero or
    /// negative delta changes nothing.
    pub fn evolve(&mut self, time_delta: f64) -> EvolutionReport {
        if !(time_delta > 0.0) {
            return EvolutionReport {
                field_time: self.field_time,
                ..Default::default()
            };
        }

        let rate = (self.config.decay_rate * time_delta).min(1.0);
        let protection = self.config.decay.strong_protection;
        let mut decayed = 0;
        for attractor in self.store.attractors_mut() {
            let factor = if attractor.strength() > PROTECTED_STRENGTH {
                1.0 - rate * (1.0 - protection)
            } else {
                1.0 - rate
            };
            if factor < 1.0 {
                decayed += 1;
            }
            attractor.amplify(factor);
        }
        let attractor_floor = self.config.decay.attractor_floor;
        let removed_attractors = self.store.retain_attractors(|a| a.strength() >= attractor_floor);

        for residue in self.store.residues_mut() {
            let s = residue.strength() * (-residue.decay_rate * time_delta).exp();
            residue.set_strength(s);
        }
        let residue_floor = self.config.decay.residue_floor;
        let removed_residues = self.store.retain_residues(|r| r.strength() >= residue_floor);

        for activation in self.store.activations_mut() {
            let s = activation.strength() * (1.0 - rate);
            activation.set_strength(s);
        }
        let transient_floor = self.config.decay.transient_floor;
        let removed_activations = self
            .store
            .retain_activations(|a| a.strength() >= transient_floor);

        self.field_time += time_delta;
        self.store.recompute_all_coherence();
        self.store.refresh_grid();

        debug!(
            field = %self.name(),
            time_delta,
            removed_attractors = removed_attractors.len(),
            removed_residues = removed_residues.len(),
            removed_activations = removed_activations.len(),
            "field evolved"
        );
        EvolutionReport {
            time_delta,
            field_time: self.field_time,
            decayed_attractors: decayed,
            removed_attractors,
            removed_residues,
            removed_activations,
        }
    }

    fn residue_decay_rate(&self) -> f64 {
        self.config.decay_rate * self.config.decay.residue_rate_factor
    }

    /// Turn weak attractors and live transient activations into residues.
    /// Each origin surfaces at most once. Returns the new residue ids.
    pub fn surface_residues(&mut self, threshold: f64) -> Vec<String> {
        let floor = self.config.decay.residue_floor;
        let decay_rate = self.residue_decay_rate();
        let now = self.store.now();
        let already: HashSet<String> = self
            .store
            .residues()
            .filter_map(|r| r.origin_attractor_id.clone())
            .collect();

        let mut fresh = Vec::new();
        for attractor in self.store.attractors() {
            if attractor.strength() >= threshold
                || attractor.strength() < floor
                || already.contains(&attractor.id)
            {
                continue;
            }
            let mut residue = SymbolicResidue::new(
                new_id("residue"),
                attractor.pattern.clone(),
                truncate(&attractor.pattern, 240),
                format!("attractor:{}", attractor.attractor_type),
                attractor.strength(),
                decay_rate,
                attractor.location,
                now,
            );
            residue.lifecycle = Lifecycle::Surfaced;
            residue.origin_attractor_id = Some(attractor.id.clone());
            fresh.push(residue);
        }

        let mut surfaced_activations = Vec::new();
        for activation in self.store.activations() {
            if activation.surfaced || activation.strength() < floor {
                continue;
            }
            let mut residue = SymbolicResidue::new(
                new_id("residue"),
                activation.pattern.clone(),
                truncate(&activation.pattern, 240),
                "activation".into(),
                activation.strength(),
                decay_rate,
                activation.location,
                now,
            );
            residue.lifecycle = Lifecycle::Surfaced;
            fresh.push(residue);
            surfaced_activations.push(activation.id.clone());
        }
        for activation in self.store.activations_mut() {
            if surfaced_activations.contains(&activation.id) {
                activation.surfaced = true;
            }
        }

        let ids: Vec<String> = fresh.into_iter().map(|r| self.store.insert_residue(r)).collect();
        debug!(field = %self.name(), surfaced = ids.len(), "residues surfaced");
        ids
    }

    /// Merge residues carrying identical symbols into the strongest of
    /// each group. Returns how many residues were folded away.
    pub fn compress_residues(&mut self) -> usize {
        let mut strongest: BTreeMap<String, (String, f64)> = BTreeMap::new();
        for residue in self.store.residues() {
            let entry = strongest
                .entry(residue.symbol.clone())
                .or_insert_with(|| (residue.id.clone(), residue.strength()));
            if residue.strength() > entry.1 {
                *entry = (residue.id.clone(), residue.strength());
            }
        }
        let keep: HashSet<String> = strongest.into_values().map(|(id, _)| id).collect();
        let removed = self.store.retain_residues(|r| keep.contains(&r.id));
        debug!(field = %self.name(), compressed = removed.len(), "residues compressed");
        removed.len()
    }

    /// Fold strong residues back into their closest attractor: the
    /// attractor is reinforced and the residue is marked integrated.
    pub fn integrate_residues(&mut self, threshold: f64) -> Vec<String> {
        let min_similarity = self.config.resonance.threshold;
        let now = self.store.now();
        let candidates: Vec<(String, String, f64)> = self
            .store
            .residues()
            .filter(|r| r.strength() >= threshold && r.lifecycle != Lifecycle::Integrated)
            .map(|r| (r.id.clone(), r.symbol.clone(), r.strength()))
            .collect();

        let mut integrated = Vec::new();
        for (residue_id, symbol, strength) in candidates {
            let Some((attractor_id, similarity)) = self.most_similar_attractor(&symbol) else {
                break;
            };
            if similarity < min_similarity {
                continue;
            }
            if let Some(attractor) = self.store.get_attractor_mut(&attractor_id) {
                attractor.activate(1.0 + strength * 0.1, now);
            }
            if let Some(residue) = self.store.get_residue_mut(&residue_id) {
                residue.lifecycle = Lifecycle::Integrated;
                residue.updated_at = now;
            }
            integrated.push(residue_id);
        }
        self.store.refresh_grid();
        integrated
    }

    /// Fold near-duplicate attractors into the stronger of each pair.
    pub fn merge_similar_attractors(&mut self, threshold: f64) -> Vec<MergeRecord> {
        let mut ordered: Vec<(String, String, f64, u64)> = self
            .store
            .attractors()
            .map(|a| (a.id.clone(), a.pattern.clone(), a.strength(), a.seq))
            .collect();
        ordered.sort_by(|a, b| b.2.total_cmp(&a.2).then(a.3.cmp(&b.3)));

        let separator = self.config.resonance.blend_separator.clone();
        let mut gone: HashSet<String> = HashSet::new();
        let mut merges = Vec::new();
        for i in 0..ordered.len() {
            if gone.contains(&ordered[i].0) {
                continue;
            }
            for j in (i + 1)..ordered.len() {
                if gone.contains(&ordered[j].0) {
                    continue;
                }
                let similarity = jaccard(&ordered[i].1, &ordered[j].1);
                if similarity < threshold {
                    continue;
                }
                let (weak_id, weak_pattern, weak_strength) =
                    (ordered[j].0.clone(), ordered[j].1.clone(), ordered[j].2);
                if let Some(keeper) = self.store.get_attractor_mut(&ordered[i].0) {
                    keeper.pattern = format!("{}{}{}", keeper.pattern, separator, weak_pattern);
                    let combined = keeper.strength() + weak_strength * 0.1;
                    keeper.set_strength(combined);
                    ordered[i].1 = keeper.pattern.clone();
                }
                self.store.remove_attractor(&weak_id);
                gone.insert(weak_id.clone());
                merges.push(MergeRecord {
                    kept: ordered[i].0.clone(),
                    merged: weak_id,
                    similarity,
                });
            }
        }
        self.store.recompute_all_coherence();
        self.store.refresh_grid();
        merges
    }

    /// Remove every attractor, residue and activation weaker than `threshold`.
    pub fn collapse(&mut self, threshold: f64) -> CollapseReport {
        let attractors = self.store.retain_attractors(|a| a.strength() >= threshold);
        let residues = self.store.retain_residues(|r| r.strength() >= threshold);
        let activations = self.store.retain_activations(|a| a.strength() >= threshold);
        self.store.recompute_all_coherence();
        self.store.refresh_grid();
        debug!(
            field = %self.name(),
            threshold,
            attractors = attractors.len(),
            residues = residues.len(),
            "field collapsed"
        );
        CollapseReport {
            threshold,
            attractors,
            residues,
            activations,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{FieldConfig, SeedAttractor};
    use crate::field::Field;

    fn field_with(seeds: Vec<SeedAttractor>) -> Field {
        Field::new(
            "decay",
            FieldConfig {
                seeds,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn strong_attractors_decay_slower() {
        let mut field = field_with(vec![
            SeedAttractor::new("strong pattern", 0.9, 0.5),
            SeedAttractor::new("weak pattern here", 0.5, 0.5),
        ]);
        field.evolve(1.0);
        let mut strengths: Vec<f64> = field.store().attractors().map(|a| a.strength()).collect();
        strengths.sort_by(f64::total_cmp);
        // weak: 0.5 × 0.95; strong: 0.9 × (1 - 0.05 × 0.2)
        assert!((strengths[0] - 0.475).abs() < 1e-9);
        assert!((strengths[1] - 0.891).abs() < 1e-9);
    }

    #[test]
    fn evolve_zero_is_noop() {
        let mut field = field_with(vec![SeedAttractor::new("steady", 0.005, 0.5)]);
        let report = field.evolve(0.0);
        assert_eq!(field.store().attractor_count(), 1);
        assert!(report.removed_attractors.is_empty());
        assert_eq!(field.field_time(), 0.0);
    }

    #[test]
    fn near_zero_attractors_are_removed() {
        let mut field = field_with(vec![SeedAttractor::new("fading", 0.0101, 0.5)]);
        let report = field.evolve(1.0);
        assert_eq!(report.removed_attractors.len(), 1);
        assert_eq!(field.store().attractor_count(), 0);
    }

    #[test]
    fn merge_folds_duplicates() {
        let mut field = field_with(vec![
            SeedAttractor::new("error handling with results", 0.8, 0.5),
            SeedAttractor::new("error handling with results", 0.4, 0.5),
            SeedAttractor::new("unrelated topic", 0.4, 0.5),
        ]);
        let merges = field.merge_similar_attractors(0.7);
        assert_eq!(merges.len(), 1);
        assert_eq!(field.store().attractor_count(), 2);
        let kept = field.store().get_attractor(&merges[0].kept).unwrap();
        assert!((kept.strength() - 0.84).abs() < 1e-9);
        assert_eq!(kept.pattern, "error handling with results | error handling with results");
    }
}
