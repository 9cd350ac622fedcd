//! Field Store: owning maps of every field entity, keyed by id.
//!
//! Removal never cascades: links that point at a removed entity stay in
//! place and resolve to nothing on the next read.

use crate::grid::{GridPeak, InfluenceGrid};
use crate::model::{
    Attractor, EmergentPattern, PatternActivation, ResonancePattern, SymbolicResidue,
};
use chrono::{DateTime, Utc};
use contextfield_core::{new_id, Clock, Error, Location, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_ATTRACTOR_STRENGTH: f64 = 0.5;
pub const DEFAULT_BASIN_WIDTH: f64 = 0.5;
pub const DEFAULT_RESIDUE_STRENGTH: f64 = 0.5;
pub const DEFAULT_RESIDUE_DECAY: f64 = 0.01;

pub struct FieldStore {
    attractors: BTreeMap<String, Attractor>,
    residues: BTreeMap<String, SymbolicResidue>,
    resonances: BTreeMap<String, ResonancePattern>,
    emergent: BTreeMap<String, EmergentPattern>,
    activations: BTreeMap<String, PatternActivation>,
    grid: InfluenceGrid,
    grid_dirty: bool,
    max_attractors: usize,
    next_seq: u64,
    clock: Arc<dyn Clock>,
}

impl FieldStore {
    pub fn new(max_attractors: usize, grid_resolution: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            attractors: BTreeMap::new(),
            residues: BTreeMap::new(),
            resonances: BTreeMap::new(),
            emergent: BTreeMap::new(),
            activations: BTreeMap::new(),
            grid: InfluenceGrid::new(grid_resolution),
            grid_dirty: false,
            max_attractors: max_attractors.max(1),
            next_seq: 0,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // =========================================================================
    // ATTRACTORS
    // =========================================================================

    /// Create an attractor with the default basin width. Placement falls
    /// back to a position derived from the concept text.
    pub fn create_attractor(
        &mut self,
        concept: &str,
        attractor_type: &str,
        location: Option<Location>,
        strength: f64,
    ) -> String {
        self.spawn_attractor(concept, attractor_type, location, strength, DEFAULT_BASIN_WIDTH)
    }

    pub fn spawn_attractor(
        &mut self,
        concept: &str,
        attractor_type: &str,
        location: Option<Location>,
        strength: f64,
        basin_width: f64,
    ) -> String {
        let seq = self.next_seq();
        let location = location.unwrap_or_else(|| Location::from_text(concept));
        let attractor = Attractor::new(
            new_id("attractor"),
            concept,
            attractor_type,
            location,
            strength,
            basin_width,
            self.now(),
            seq,
        );
        let id = attractor.id.clone();
        debug!(attractor_id = %id, strength = attractor.strength(), "attractor created");
        self.attractors.insert(id.clone(), attractor);
        self.grid_dirty = true;
        self.enforce_capacity(&id);
        id
    }

    /// Evict the weakest attractors (oldest first on ties) until the
    /// limit holds. The attractor just created is never the victim.
    fn enforce_capacity(&mut self, keep: &str) {
        while self.attractors.len() > self.max_attractors {
            let victim = self
                .attractors
                .values()
                .filter(|a| a.id != keep)
                .min_by(|a, b| {
                    a.strength()
                        .total_cmp(&b.strength())
                        .then(a.seq.cmp(&b.seq))
                })
                .map(|a| a.id.clone());
            match victim {
                Some(id) => {
                    debug!(attractor_id = %id, "attractor evicted at capacity");
                    self.attractors.remove(&id);
                }
                None => break,
            }
        }
    }

    pub fn max_attractors(&self) -> usize {
        self.max_attractors
    }

    pub fn get_attractor(&self, id: &str) -> Option<&Attractor> {
        self.attractors.get(id)
    }

    pub fn get_attractor_mut(&mut self, id: &str) -> Option<&mut Attractor> {
        self.grid_dirty = true;
        self.attractors.get_mut(id)
    }

    pub fn remove_attractor(&mut self, id: &str) -> Option<Attractor> {
        let removed = self.attractors.remove(id);
        if removed.is_some() {
            self.grid_dirty = true;
        }
        removed
    }

    pub fn attractors(&self) -> impl Iterator<Item = &Attractor> {
        self.attractors.values()
    }

    pub fn attractors_mut(&mut self) -> impl Iterator<Item = &mut Attractor> {
        self.grid_dirty = true;
        self.attractors.values_mut()
    }

    pub fn attractor_count(&self) -> usize {
        self.attractors.len()
    }

    /// Drop every attractor for which `keep` is false; returns removed ids.
    pub fn retain_attractors(&mut self, mut keep: impl FnMut(&Attractor) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.attractors.retain(|id, a| {
            let k = keep(a);
            if !k {
                removed.push(id.clone());
            }
            k
        });
        if !removed.is_empty() {
            self.grid_dirty = true;
        }
        removed
    }

    // =========================================================================
    // RESIDUES
    // =========================================================================

    pub fn add_residue(
        &mut self,
        symbol: &str,
        meaning: &str,
        context: &str,
        location: Option<Location>,
        decay_rate: f64,
    ) -> String {
        let residue = SymbolicResidue::new(
            new_id("residue"),
            symbol.to_string(),
            meaning.to_string(),
            context.to_string(),
            DEFAULT_RESIDUE_STRENGTH,
            decay_rate,
            location.unwrap_or_else(|| Location::from_text(symbol)),
            self.now(),
        );
        self.insert_residue(residue)
    }

    pub fn insert_residue(&mut self, residue: SymbolicResidue) -> String {
        let id = residue.id.clone();
        debug!(residue_id = %id, strength = residue.strength(), "residue added");
        self.residues.insert(id.clone(), residue);
        id
    }

    pub fn get_residue(&self, id: &str) -> Option<&SymbolicResidue> {
        self.residues.get(id)
    }

    pub fn get_residue_mut(&mut self, id: &str) -> Option<&mut SymbolicResidue> {
        self.residues.get_mut(id)
    }

    pub fn remove_residue(&mut self, id: &str) -> Option<SymbolicResidue> {
        self.residues.remove(id)
    }

    pub fn residues(&self) -> impl Iterator<Item = &SymbolicResidue> {
        self.residues.values()
    }

    pub fn residues_mut(&mut self) -> impl Iterator<Item = &mut SymbolicResidue> {
        self.residues.values_mut()
    }

    pub fn residue_count(&self) -> usize {
        self.residues.len()
    }

    pub fn retain_residues(
        &mut self,
        mut keep: impl FnMut(&SymbolicResidue) -> bool,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        self.residues.retain(|id, r| {
            let k = keep(r);
            if !k {
                removed.push(id.clone());
            }
            k
        });
        removed
    }

    // =========================================================================
    // RESONANCE PATTERNS
    // =========================================================================

    pub fn create_resonance(
        &mut self,
        source_ids: &[String],
        frequency: f64,
        amplitude: f64,
        resonance_type: &str,
    ) -> Result<String> {
        if source_ids.is_empty() {
            return Err(Error::invalid_parameter(
                "source_ids",
                "a resonance pattern needs at least one source",
            ));
        }
        let mut ordered: Vec<String> = Vec::with_capacity(source_ids.len());
        for id in source_ids {
            if !ordered.contains(id) {
                ordered.push(id.clone());
            }
        }
        let pattern = ResonancePattern::new(
            new_id("resonance"),
            ordered,
            frequency,
            amplitude,
            resonance_type,
            self.now(),
        );
        let id = pattern.id.clone();
        self.resonances.insert(id.clone(), pattern);
        self.recompute_coherence(&id);
        debug!(resonance_id = %id, resonance_type, "resonance created");
        Ok(id)
    }

    pub fn get_resonance(&self, id: &str) -> Option<&ResonancePattern> {
        self.resonances.get(id)
    }

    pub fn get_resonance_mut(&mut self, id: &str) -> Option<&mut ResonancePattern> {
        self.resonances.get_mut(id)
    }

    pub fn remove_resonance(&mut self, id: &str) -> Option<ResonancePattern> {
        self.resonances.remove(id)
    }

    pub fn resonances(&self) -> impl Iterator<Item = &ResonancePattern> {
        self.resonances.values()
    }

    pub fn resonances_mut(&mut self) -> impl Iterator<Item = &mut ResonancePattern> {
        self.resonances.values_mut()
    }

    pub fn resonance_count(&self) -> usize {
        self.resonances.len()
    }

    /// Strength of any entity by id; unknown ids read as zero.
    pub fn source_strength(&self, id: &str) -> f64 {
        if let Some(a) = self.attractors.get(id) {
            return a.strength();
        }
        if let Some(r) = self.residues.get(id) {
            return r.strength();
        }
        0.0
    }

    /// Coherence = amplitude × mean source strength. Dangling sources
    /// count as zero.
    pub fn recompute_coherence(&mut self, id: &str) -> Option<f64> {
        let (amplitude, sources) = {
            let pattern = self.resonances.get(id)?;
            (pattern.amplitude(), pattern.source_ids.clone())
        };
        let mean = if sources.is_empty() {
            0.0
        } else {
            sources.iter().map(|s| self.source_strength(s)).sum::<f64>() / sources.len() as f64
        };
        let pattern = self.resonances.get_mut(id)?;
        pattern.set_coherence(amplitude * mean);
        Some(pattern.coherence_score())
    }

    pub fn recompute_all_coherence(&mut self) {
        let ids: Vec<String> = self.resonances.keys().cloned().collect();
        for id in ids {
            self.recompute_coherence(&id);
        }
    }

    // =========================================================================
    // EMERGENT PATTERNS
    // =========================================================================

    pub fn get_emergent(&self, id: &str) -> Option<&EmergentPattern> {
        self.emergent.get(id)
    }

    pub fn remove_emergent(&mut self, id: &str) -> Option<EmergentPattern> {
        self.emergent.remove(id)
    }

    pub fn emergent_patterns(&self) -> impl Iterator<Item = &EmergentPattern> {
        self.emergent.values()
    }

    pub(crate) fn emergent_map_mut(&mut self) -> &mut BTreeMap<String, EmergentPattern> {
        &mut self.emergent
    }

    pub fn emergent_count(&self) -> usize {
        self.emergent.len()
    }

    // =========================================================================
    // TRANSIENT ACTIVATIONS
    // =========================================================================

    pub fn add_activation(
        &mut self,
        pattern: &str,
        strength: f64,
        location: Option<Location>,
    ) -> String {
        let activation = PatternActivation::new(
            new_id("activation"),
            pattern.to_string(),
            strength,
            location.unwrap_or_else(|| Location::from_text(pattern)),
            self.now(),
        );
        let id = activation.id.clone();
        self.activations.insert(id.clone(), activation);
        id
    }

    pub fn get_activation(&self, id: &str) -> Option<&PatternActivation> {
        self.activations.get(id)
    }

    pub fn activations(&self) -> impl Iterator<Item = &PatternActivation> {
        self.activations.values()
    }

    pub fn activations_mut(&mut self) -> impl Iterator<Item = &mut PatternActivation> {
        self.activations.values_mut()
    }

    pub fn activation_count(&self) -> usize {
        self.activations.len()
    }

    pub fn retain_activations(
        &mut self,
        mut keep: impl FnMut(&PatternActivation) -> bool,
    ) -> Vec<String> {
        let mut removed = Vec::new();
        self.activations.retain(|id, a| {
            let k = keep(a);
            if !k {
                removed.push(id.clone());
            }
            k
        });
        removed
    }

    // =========================================================================
    // INFLUENCE GRID
    // =========================================================================

    /// Rebuild the grid if any attractor changed since the last refresh.
    pub fn refresh_grid(&mut self) {
        if self.grid_dirty {
            self.grid.rebuild(self.attractors.values());
            self.grid_dirty = false;
        }
    }

    pub fn influence_at(&mut self, location: &Location) -> f64 {
        self.refresh_grid();
        self.grid.value_at(location)
    }

    pub fn grid_peak(&mut self) -> GridPeak {
        self.refresh_grid();
        self.grid.peak()
    }

    pub fn grid_resolution(&self) -> usize {
        self.grid.resolution()
    }

    pub fn is_empty(&self) -> bool {
        self.attractors.is_empty()
            && self.residues.is_empty()
            && self.resonances.is_empty()
            && self.emergent.is_empty()
            && self.activations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextfield_core::ManualClock;

    fn store(max: usize) -> FieldStore {
        FieldStore::new(max, 8, Arc::new(ManualClock::default()))
    }

    #[test]
    fn capacity_evicts_weakest_then_oldest() {
        let mut s = store(2);
        let a = s.create_attractor("a", "semantic", None, 0.5);
        let b = s.create_attractor("b", "semantic", None, 0.9);
        let c = s.create_attractor("c", "semantic", None, 0.5);
        assert_eq!(s.attractor_count(), 2);
        assert!(s.get_attractor(&a).is_none());
        assert!(s.get_attractor(&b).is_some());
        assert!(s.get_attractor(&c).is_some());
    }

    #[test]
    fn removal_leaves_dangling_links() {
        let mut s = store(10);
        let a = s.create_attractor("a", "semantic", None, 0.8);
        let b = s.create_attractor("b", "semantic", None, 0.6);
        let r = s.create_resonance(&[a.clone(), b.clone()], 1.0, 1.0, "test").unwrap();
        assert!((s.get_resonance(&r).unwrap().coherence_score() - 0.7).abs() < 1e-9);

        s.remove_attractor(&a);
        let link = s.get_resonance(&r).unwrap();
        assert_eq!(link.source_ids, vec![a.clone(), b.clone()]);
        assert!((s.recompute_coherence(&r).unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn resonance_requires_sources() {
        let mut s = store(10);
        assert!(s.create_resonance(&[], 1.0, 0.5, "empty").is_err());
    }

    #[test]
    fn resonance_deduplicates_sources_in_order() {
        let mut s = store(10);
        let ids = vec!["x".to_string(), "y".to_string(), "x".to_string()];
        let r = s.create_resonance(&ids, 1.0, 0.5, "dup").unwrap();
        assert_eq!(s.get_resonance(&r).unwrap().source_ids, vec!["x", "y"]);
    }

    #[test]
    fn residue_defaults() {
        let mut s = store(10);
        let id = s.add_residue("trace", "meaning", "ctx", None, DEFAULT_RESIDUE_DECAY);
        let r = s.get_residue(&id).unwrap();
        assert_eq!(r.strength(), DEFAULT_RESIDUE_STRENGTH);
        assert_eq!(r.decay_rate, 0.01);
        assert!(r.origin_attractor_id.is_none());
    }
}
