//! Resonance & injection: lexical resonance scoring, pattern injection
//! (blend / create / transient), and resonance scaffolding.

use crate::field::{Field, DEFAULT_ATTRACTOR_TYPE};
use contextfield_core::text::{jaccard, jaccard_sets, token_set};
use contextfield_core::{Location, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Scaffold nodes must resonate above this score.
pub const SCAFFOLD_NODE_THRESHOLD: f64 = 0.6;
/// Node pairs whose averaged score exceeds this get a bridge.
pub const SCAFFOLD_EDGE_THRESHOLD: f64 = 0.5;
/// Bridge strength to amplification factor: 1 + strength × this.
pub const SCAFFOLD_GAIN: f64 = 0.2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionKind {
    /// Folded into an existing similar attractor.
    Blended,
    /// Formed a new attractor.
    Created,
    /// Below formation threshold; registered as a transient activation.
    Transient,
}

#[derive(Clone, Debug, Serialize)]
pub struct InjectionOutcome {
    pub id: String,
    pub kind: InjectionKind,
    pub effective_strength: f64,
    /// Attractors amplified by the post-injection resonance pass.
    pub amplified: Vec<String>,
    /// Link created between the injected attractor and the others it excited.
    pub resonance_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScaffoldNode {
    pub target: String,
    pub attractor_id: String,
    pub score: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScaffoldEdge {
    pub from: String,
    pub to: String,
    pub strength: f64,
    pub edge_type: String,
    pub resonance_id: String,
}

/// A resonance created between two similar attractors.
#[derive(Clone, Debug, Serialize)]
pub struct PairLink {
    pub resonance_id: String,
    pub from: String,
    pub to: String,
    pub similarity: f64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ResonanceScaffold {
    pub nodes: Vec<ScaffoldNode>,
    pub edges: Vec<ScaffoldEdge>,
}

impl Field {
    /// Resonance of every attractor with `query`. Attractors whose lexical
    /// similarity is under the resonance threshold are omitted.
    pub fn measure_resonance(&self, query: &str) -> BTreeMap<String, f64> {
        let cfg = &self.config.resonance;
        let query_tokens = token_set(query);
        let mut scores = BTreeMap::new();
        for attractor in self.store.attractors() {
            let similarity = jaccard_sets(&query_tokens, &token_set(&attractor.pattern));
            if similarity < cfg.threshold {
                continue;
            }
            let distance = 1.0 - similarity;
            let distance_decay = (-distance * cfg.distance_factor).exp();
            let score =
                (similarity * cfg.amplification * distance_decay * attractor.strength()).min(1.0);
            scores.insert(attractor.id.clone(), score);
        }
        scores
    }

    /// The attractor lexically closest to `text`, with its similarity.
    pub fn most_similar_attractor(&self, text: &str) -> Option<(String, f64)> {
        let tokens = token_set(text);
        self.store
            .attractors()
            .map(|a| (a, jaccard_sets(&tokens, &token_set(&a.pattern))))
            .max_by(|(a, sa), (b, sb)| {
                sa.total_cmp(sb)
                    .then(a.strength().total_cmp(&b.strength()))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(a, s)| (a.id.clone(), s))
    }

    /// Inject a pattern and return the id of the entity it landed in.
    pub fn inject_pattern(
        &mut self,
        pattern: &str,
        strength: f64,
        location: Option<Location>,
    ) -> String {
        self.inject(pattern, strength, location).id
    }

    /// Inject a pattern, reporting how it was absorbed.
    pub fn inject(
        &mut self,
        pattern: &str,
        strength: f64,
        location: Option<Location>,
    ) -> InjectionOutcome {
        let effective_strength = (strength * self.config.boundary_permeability).clamp(0.0, 1.0);
        let blend_target = self
            .most_similar_attractor(pattern)
            .filter(|(_, similarity)| *similarity >= self.config.resonance.blend_threshold);

        let (id, kind) = if let Some((id, similarity)) = blend_target {
            let ratio = self.config.resonance.blend_ratio;
            let separator = self.config.resonance.blend_separator.clone();
            let now = self.store.now();
            if let Some(attractor) = self.store.get_attractor_mut(&id) {
                attractor.pattern = format!("{}{}{}", attractor.pattern, separator, pattern);
                let blended = attractor.strength() * (1.0 - ratio) + effective_strength * ratio;
                attractor.set_strength(blended);
                attractor.last_activated = now;
                attractor.activation_count += 1;
            }
            debug!(attractor_id = %id, similarity, "pattern blended");
            (id, InjectionKind::Blended)
        } else if effective_strength >= self.config.attractor_formation_threshold {
            let id = self.store.spawn_attractor(
                pattern,
                DEFAULT_ATTRACTOR_TYPE,
                location,
                effective_strength,
                self.config.resonance_bandwidth,
            );
            (id, InjectionKind::Created)
        } else {
            let id = self.store.add_activation(pattern, effective_strength, location);
            debug!(activation_id = %id, effective_strength, "transient activation");
            (id, InjectionKind::Transient)
        };

        // Resonance side effect: everything the pattern excites gets amplified.
        let gain = self.config.resonance.amplification - 1.0;
        let threshold = self.config.resonance.threshold;
        let scores = self.measure_resonance(pattern);
        let mut amplified = Vec::new();
        let mut peak_other: f64 = 0.0;
        for (attractor_id, score) in &scores {
            if *score <= threshold {
                continue;
            }
            if let Some(attractor) = self.store.get_attractor_mut(attractor_id) {
                attractor.amplify(1.0 + score * gain);
                amplified.push(attractor_id.clone());
                if *attractor_id != id {
                    peak_other = peak_other.max(*score);
                }
            }
        }

        let mut resonance_id = None;
        if kind != InjectionKind::Transient {
            let mut sources = vec![id.clone()];
            sources.extend(amplified.iter().filter(|a| **a != id).cloned());
            if sources.len() > 1 {
                let frequency = (sources.len() - 1) as f64;
                resonance_id = self
                    .store
                    .create_resonance(&sources, frequency, peak_other, "injection_resonance")
                    .ok();
            }
        }

        self.store.recompute_all_coherence();
        self.store.refresh_grid();
        InjectionOutcome {
            id,
            kind,
            effective_strength,
            amplified,
            resonance_id,
        }
    }

    /// Build a scaffold of strongly resonating attractors for the given
    /// targets, bridge node pairs, and apply the bridges as amplification.
    pub fn create_resonance_scaffold(&mut self, target_patterns: &[String]) -> ResonanceScaffold {
        let mut best: BTreeMap<String, ScaffoldNode> = BTreeMap::new();
        for target in target_patterns {
            for (attractor_id, score) in self.measure_resonance(target) {
                if score <= SCAFFOLD_NODE_THRESHOLD {
                    continue;
                }
                let replace = best.get(&attractor_id).map_or(true, |n| score > n.score);
                if replace {
                    best.insert(
                        attractor_id.clone(),
                        ScaffoldNode {
                            target: target.clone(),
                            attractor_id,
                            score,
                        },
                    );
                }
            }
        }
        let nodes: Vec<ScaffoldNode> = best.into_values().collect();

        let mut edges = Vec::new();
        for (i, a) in nodes.iter().enumerate() {
            for b in &nodes[i + 1..] {
                let strength = (a.score + b.score) / 2.0;
                if strength <= SCAFFOLD_EDGE_THRESHOLD {
                    continue;
                }
                let sources = [a.attractor_id.clone(), b.attractor_id.clone()];
                let Ok(resonance_id) =
                    self.store
                        .create_resonance(&sources, 1.0, strength, "resonance_bridge")
                else {
                    continue;
                };
                edges.push(ScaffoldEdge {
                    from: a.attractor_id.clone(),
                    to: b.attractor_id.clone(),
                    strength,
                    edge_type: "resonance_bridge".into(),
                    resonance_id,
                });
            }
        }

        for edge in &edges {
            for id in [&edge.from, &edge.to] {
                if let Some(attractor) = self.store.get_attractor_mut(id) {
                    attractor.amplify(1.0 + edge.strength * SCAFFOLD_GAIN);
                }
            }
        }
        self.store.recompute_all_coherence();
        self.store.refresh_grid();
        debug!(nodes = nodes.len(), edges = edges.len(), "resonance scaffold applied");
        ResonanceScaffold { nodes, edges }
    }

    /// Link attractor pairs whose similarity reaches `threshold` with a
    /// `semantic_link` resonance, skipping pairs already linked.
    pub fn connect_patterns(&mut self, threshold: f64) -> Result<Vec<String>> {
        Ok(self
            .link_similar_attractors(threshold, "semantic_link")?
            .into_iter()
            .map(|link| link.resonance_id)
            .collect())
    }

    /// Create a `resonance_type` link for every attractor pair whose
    /// similarity reaches `threshold` and that has no such link yet.
    pub fn link_similar_attractors(
        &mut self,
        threshold: f64,
        resonance_type: &str,
    ) -> Result<Vec<PairLink>> {
        let attractors: Vec<(String, String)> = self
            .store
            .attractors()
            .map(|a| (a.id.clone(), a.pattern.clone()))
            .collect();
        let mut created = Vec::new();
        for (i, (id_a, pattern_a)) in attractors.iter().enumerate() {
            for (id_b, pattern_b) in &attractors[i + 1..] {
                let similarity = jaccard(pattern_a, pattern_b);
                if similarity < threshold {
                    continue;
                }
                let already = self.store.resonances().any(|r| {
                    r.resonance_type == resonance_type
                        && r.source_ids.contains(id_a)
                        && r.source_ids.contains(id_b)
                });
                if already {
                    continue;
                }
                let resonance_id = self.store.create_resonance(
                    &[id_a.clone(), id_b.clone()],
                    1.0,
                    similarity,
                    resonance_type,
                )?;
                created.push(PairLink {
                    resonance_id,
                    from: id_a.clone(),
                    to: id_b.clone(),
                    similarity,
                });
            }
        }
        debug!(
            field = %self.name(),
            resonance_type,
            links = created.len(),
            "attractor pairs linked"
        );
        Ok(created)
    }

    /// Access-based reinforcement of every attractor that resonates with `query`.
    pub fn reinforce(&mut self, query: &str, factor: f64) -> Vec<String> {
        let now = self.store.now();
        let ids: Vec<String> = self.measure_resonance(query).into_keys().collect();
        for id in &ids {
            if let Some(attractor) = self.store.get_attractor_mut(id) {
                attractor.activate(factor, now);
            }
        }
        self.store.refresh_grid();
        ids
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{FieldConfig, SeedAttractor};
    use crate::field::Field;
    use crate::resonance::InjectionKind;

    fn seeded() -> Field {
        let config = FieldConfig {
            seeds: vec![
                SeedAttractor::new("rust ownership borrowing rules", 0.5, 0.5),
                SeedAttractor::new("async runtime scheduling", 0.9, 0.5),
            ],
            ..Default::default()
        };
        Field::new("test", config).unwrap()
    }

    #[test]
    fn resonance_omits_unrelated_attractors() {
        let field = seeded();
        let scores = field.measure_resonance("rust ownership borrowing rules");
        assert_eq!(scores.len(), 1);
    }

    #[test]
    fn exact_resonance_score_formula() {
        let field = seeded();
        let scores = field.measure_resonance("async runtime scheduling");
        let score = *scores.values().next().unwrap();
        // similarity 1.0, distance 0 → 1.0 × 1.2 × 1.0 × 0.9
        assert!((score - 1.0_f64.min(1.2 * 0.9)).abs() < 1e-9);
    }

    #[test]
    fn blend_updates_strength_and_pattern() {
        let mut field = seeded();
        let before = field.store().attractor_count();
        let outcome = field.inject("rust ownership borrowing rules", 1.0, None);
        assert_eq!(outcome.kind, InjectionKind::Blended);
        assert_eq!(field.store().attractor_count(), before);
        let a = field.store().get_attractor(&outcome.id).unwrap();
        // blend: 0.5 × 0.7 + 0.8 × 0.3 = 0.59, then amplified by the resonance pass
        let score = (0.59_f64 * 1.2).min(1.0);
        let expected = 0.59 * (1.0 + score * 0.2);
        assert!((a.strength() - expected).abs() < 1e-9);
        assert_eq!(a.pattern, "rust ownership borrowing rules | rust ownership borrowing rules");
    }

    #[test]
    fn blend_appends_case_variants_and_repeats_alike() {
        let mut field = seeded();
        let first = field.inject("Rust Ownership Borrowing Rules", 1.0, None);
        let second = field.inject("Rust Ownership Borrowing Rules", 1.0, None);
        assert_eq!(first.id, second.id);
        let a = field.store().get_attractor(&first.id).unwrap();
        let variant = "Rust Ownership Borrowing Rules";
        let expected = format!("rust ownership borrowing rules | {} | {}", variant, variant);
        assert_eq!(a.pattern, expected);
        assert_eq!(a.activation_count, 2);
    }

    #[test]
    fn sub_threshold_injection_is_transient() {
        let mut field = seeded();
        let outcome = field.inject("weak signal", 0.5, None);
        assert_eq!(outcome.kind, InjectionKind::Transient);
        assert_eq!(field.store().activation_count(), 1);
        assert!((outcome.effective_strength - 0.4).abs() < 1e-9);
    }
}
