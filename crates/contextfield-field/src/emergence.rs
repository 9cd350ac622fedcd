//! Emergence detection: attractor clusters, resonance networks and
//! symbolic convergence, plus the emergent-pattern lifecycle.

use crate::config::EmergenceConfig;
use crate::field::Field;
use crate::model::{EmergentKind, EmergentPattern, LifecycleStage};
use chrono::{DateTime, Duration, Utc};
use contextfield_core::new_id;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Residues at or below this strength never take part in convergence.
pub const CONVERGENCE_MIN_STRENGTH: f64 = 0.1;
/// Fixed stability reported for symbolic convergence.
pub const CONVERGENCE_STABILITY: f64 = 0.7;

/// Disjoint-set over indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
        }
    }

    /// Components in first-seen order.
    fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

/// Population variance; zero for fewer than two values.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

/// Move a re-detected pattern through its lifecycle. Stages only advance,
/// with two exceptions: a mature pattern whose stability drops starts
/// decaying, and a decaying pattern seen again with enough stability goes
/// back to the stage its age has earned.
pub fn advance_lifecycle(pattern: &mut EmergentPattern, now: DateTime<Utc>, cfg: &EmergenceConfig) {
    let age = now - pattern.created_at;
    let stabilizing_after = Duration::seconds(cfg.stabilizing_after_secs);
    let mature_after = Duration::seconds(cfg.mature_after_secs);
    let stable = pattern.stability() >= cfg.decaying_below_stability;
    loop {
        let next = match pattern.lifecycle_stage {
            LifecycleStage::Forming if age > stabilizing_after => LifecycleStage::Stabilizing,
            LifecycleStage::Stabilizing if age > mature_after => LifecycleStage::Mature,
            LifecycleStage::Mature if !stable => LifecycleStage::Decaying,
            LifecycleStage::Decaying if stable => {
                if age > mature_after {
                    LifecycleStage::Mature
                } else if age > stabilizing_after {
                    LifecycleStage::Stabilizing
                } else {
                    LifecycleStage::Forming
                }
            }
            _ => break,
        };
        pattern.lifecycle_stage = next;
    }
}

impl Field {
    /// Detect emergent structures in the current state.
    ///
    /// Re-detections of a known structure update the stored pattern (and
    /// keep its age). Stored patterns that are not seen again start
    /// decaying, and are dropped if they were already decaying.
    pub fn detect_emergence(&mut self) -> Vec<EmergentPattern> {
        let now = self.store.now();
        self.store.recompute_all_coherence();

        let mut detected = self.detect_clusters(now);
        detected.extend(self.detect_networks(now));
        detected.extend(self.detect_convergence(now));

        let cfg = self.config.emergence.clone();
        let map = self.store.emergent_map_mut();
        let known: HashMap<String, String> = map
            .iter()
            .map(|(id, p)| (p.signature(), id.clone()))
            .collect();

        let mut seen: Vec<String> = Vec::new();
        for pattern in detected {
            match known.get(&pattern.signature()) {
                Some(id) => {
                    if let Some(existing) = map.get_mut(id) {
                        existing.emergence_strength = pattern.emergence_strength;
                        existing.set_stability(pattern.stability());
                        existing.last_seen = now;
                    }
                    seen.push(id.clone());
                }
                None => {
                    seen.push(pattern.id.clone());
                    map.insert(pattern.id.clone(), pattern);
                }
            }
        }

        let seen_set: HashSet<&String> = seen.iter().collect();
        map.retain(|id, p| seen_set.contains(id) || p.lifecycle_stage != LifecycleStage::Decaying);
        for (id, pattern) in map.iter_mut() {
            if seen_set.contains(id) {
                advance_lifecycle(pattern, now, &cfg);
            } else {
                pattern.lifecycle_stage = LifecycleStage::Decaying;
            }
        }

        let current: Vec<EmergentPattern> =
            seen.iter().filter_map(|id| map.get(id).cloned()).collect();
        debug!(field = %self.name(), patterns = current.len(), "emergence detected");
        current
    }

    fn detect_clusters(&self, now: DateTime<Utc>) -> Vec<EmergentPattern> {
        let cfg = &self.config.emergence;
        let attractors: Vec<_> = self.store.attractors().collect();
        let mut uf = UnionFind::new(attractors.len());
        for i in 0..attractors.len() {
            for j in (i + 1)..attractors.len() {
                let (a, b) = (attractors[i], attractors[j]);
                if a.attractor_type != b.attractor_type {
                    continue;
                }
                let distance = a.location.distance(&b.location) * cfg.grid_scale;
                if distance <= cfg.cluster_radius {
                    uf.union(i, j);
                }
            }
        }
        uf.groups()
            .into_iter()
            .filter(|g| g.len() >= cfg.min_cluster_size)
            .map(|g| {
                let strengths: Vec<f64> = g.iter().map(|&i| attractors[i].strength()).collect();
                EmergentPattern::new(
                    new_id("emergent"),
                    EmergentKind::AttractorCluster,
                    g.iter().map(|&i| attractors[i].id.clone()).collect(),
                    g.len() as f64 / 10.0,
                    1.0 - variance(&strengths),
                    now,
                )
            })
            .collect()
    }

    fn detect_networks(&self, now: DateTime<Utc>) -> Vec<EmergentPattern> {
        let cfg = &self.config.emergence;
        let patterns: Vec<_> = self.store.resonances().collect();
        let mut uf = UnionFind::new(patterns.len());
        for i in 0..patterns.len() {
            for j in (i + 1)..patterns.len() {
                let shares = patterns[i]
                    .source_ids
                    .iter()
                    .any(|s| patterns[j].source_ids.contains(s));
                if shares {
                    uf.union(i, j);
                }
            }
        }
        uf.groups()
            .into_iter()
            .filter(|g| g.len() >= cfg.min_network_size)
            .map(|g| {
                let coherence: Vec<f64> =
                    g.iter().map(|&i| patterns[i].coherence_score()).collect();
                EmergentPattern::new(
                    new_id("emergent"),
                    EmergentKind::ResonanceNetwork,
                    g.iter().map(|&i| patterns[i].id.clone()).collect(),
                    g.len() as f64 / 10.0,
                    1.0 - variance(&coherence),
                    now,
                )
            })
            .collect()
    }

    fn detect_convergence(&self, now: DateTime<Utc>) -> Vec<EmergentPattern> {
        let cfg = &self.config.emergence;
        let mut groups: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for residue in self.store.residues() {
            if residue.strength() <= CONVERGENCE_MIN_STRENGTH {
                continue;
            }
            let prefix: String = residue
                .meaning
                .trim()
                .to_lowercase()
                .chars()
                .take(cfg.meaning_prefix_chars)
                .collect();
            if prefix.is_empty() {
                continue;
            }
            groups
                .entry(prefix)
                .or_default()
                .push((residue.id.clone(), residue.strength()));
        }
        groups
            .into_values()
            .filter(|g| g.len() >= cfg.min_convergence_size)
            .map(|g| {
                let mean = g.iter().map(|(_, s)| s).sum::<f64>() / g.len() as f64;
                EmergentPattern::new(
                    new_id("emergent"),
                    EmergentKind::SymbolicConvergence,
                    g.into_iter().map(|(id, _)| id).collect(),
                    mean,
                    CONVERGENCE_STABILITY,
                    now,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variance_of_constant_is_zero() {
        assert_eq!(variance(&[0.4, 0.4, 0.4]), 0.0);
        assert_eq!(variance(&[]), 0.0);
        assert!((variance(&[0.0, 1.0]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn union_find_groups() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 2);
        uf.union(3, 4);
        uf.union(2, 4);
        let groups = uf.groups();
        assert_eq!(groups, vec![vec![0, 2, 3, 4], vec![1]]);
    }

    #[test]
    fn lifecycle_cascades_with_age() {
        let cfg = EmergenceConfig::default();
        let created = Utc::now();
        let kind = EmergentKind::AttractorCluster;
        let mut p = EmergentPattern::new("e".into(), kind, vec![], 0.3, 0.2, created);
        advance_lifecycle(&mut p, created + Duration::minutes(30), &cfg);
        assert_eq!(p.lifecycle_stage, LifecycleStage::Forming);
        advance_lifecycle(&mut p, created + Duration::hours(2), &cfg);
        assert_eq!(p.lifecycle_stage, LifecycleStage::Stabilizing);
        // Past maturity with stability 0.2 < 0.3 → straight on to decaying.
        advance_lifecycle(&mut p, created + Duration::hours(7), &cfg);
        assert_eq!(p.lifecycle_stage, LifecycleStage::Decaying);
    }

    #[test]
    fn stable_decaying_pattern_recovers_by_age() {
        let cfg = EmergenceConfig::default();
        let created = Utc::now();
        let kind = EmergentKind::AttractorCluster;
        let mut p = EmergentPattern::new("e".into(), kind, vec![], 0.3, 0.9, created);
        p.lifecycle_stage = LifecycleStage::Decaying;
        advance_lifecycle(&mut p, created + Duration::minutes(10), &cfg);
        assert_eq!(p.lifecycle_stage, LifecycleStage::Forming);

        p.lifecycle_stage = LifecycleStage::Decaying;
        advance_lifecycle(&mut p, created + Duration::hours(7), &cfg);
        assert_eq!(p.lifecycle_stage, LifecycleStage::Mature);

        p.set_stability(0.1);
        p.lifecycle_stage = LifecycleStage::Decaying;
        advance_lifecycle(&mut p, created + Duration::hours(8), &cfg);
        assert_eq!(p.lifecycle_stage, LifecycleStage::Decaying);
    }
}
