use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use milhar_db::models::{DrawRecord, HitRecord, RectificationRecord, THOUSAND_RANKS};

use crate::aggregator::{DigitDistribution, FrequencyAggregator, WeightedDistributions, joint_probability};
use crate::analysis::{Analysis, analyze};
use crate::config::EngineConfig;
use crate::projections::{AdvancedPredictions, project};
use crate::sampler::EntropySampler;
use crate::snapshot::{Module, merge_snapshot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub sequence: [u8; 4],
    /// Probabilité jointe dans la distribution non mélangée du premier rang.
    pub confidence: f64,
}

/// Résultat complet d'un cycle de génération.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationBundle {
    pub result: DrawRecord,
    pub candidates: Vec<Candidate>,
    pub advanced_predictions: AdvancedPredictions,
    pub analysis: Analysis,
    pub entropy: f64,
}

/// Instantané explicite passé à chaque génération. `modules` et `history` sont
/// ordonnés du plus récent au plus ancien.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    pub modules: &'a [Module],
    pub history: &'a [DrawRecord],
    pub hits: &'a [HitRecord],
    pub rectifications: &'a [RectificationRecord],
    pub entropy: f64,
}

pub struct Generator {
    config: EngineConfig,
}

impl Generator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn generate<R: Rng + ?Sized>(&self, input: &GenerationInput<'_>, rng: &mut R) -> GenerationBundle {
        let sampler = EntropySampler::new(input.entropy);
        let snapshot = merge_snapshot(input.modules, input.history);

        let distributions = if snapshot.is_empty() {
            debug!("instantané vide, distributions uniformes");
            WeightedDistributions::uniform()
        } else {
            FrequencyAggregator::new(&self.config).aggregate(&snapshot, input.hits, input.rectifications)
        };

        let result = sample_draw(&distributions, &sampler, rng);
        let candidates = self.candidates(&distributions, &sampler, &result.thousands[0], rng);
        let advanced_predictions = project(&distributions, self.config.projection_ranks());
        let (hot, cold) = self.config.percentiles();
        let analysis = analyze(&snapshot, hot, cold);

        debug!(
            entries = snapshot.len(),
            entropy = sampler.entropy(),
            first = ?result.thousands[0],
            candidates = candidates.len(),
            "cycle de génération terminé"
        );

        GenerationBundle {
            result,
            candidates,
            advanced_predictions,
            analysis,
            entropy: sampler.entropy(),
        }
    }

    /// Séquences de 4 chiffres tirées des distributions du premier rang, distinctes
    /// entre elles et du résultat principal. Si l'échantillonnage ne suffit pas
    /// (entropie nulle notamment), complète avec les séquences les plus probables.
    fn candidates<R: Rng + ?Sized>(
        &self,
        distributions: &WeightedDistributions,
        sampler: &EntropySampler,
        primary: &[u8; 4],
        rng: &mut R,
    ) -> Vec<Candidate> {
        let wanted = self.config.candidate_count();
        let first = distributions.rank(0);
        let mut seen: Vec<[u8; 4]> = vec![*primary];
        let mut candidates = Vec::with_capacity(wanted);

        if !sampler.is_deterministic() {
            let attempts = wanted * self.config.candidate_oversample.max(1);
            for _ in 0..attempts {
                if candidates.len() >= wanted {
                    break;
                }
                let sequence: [u8; 4] = sampler.sample_row(first, rng);
                if !seen.contains(&sequence) {
                    seen.push(sequence);
                    candidates.push(Candidate { sequence, confidence: joint_probability(first, &sequence) });
                }
            }
        }

        if candidates.len() < wanted {
            for (sequence, confidence) in ranked_sequences(first) {
                if candidates.len() >= wanted {
                    break;
                }
                if !seen.contains(&sequence) {
                    seen.push(sequence);
                    candidates.push(Candidate { sequence, confidence });
                }
            }
        }

        // Tri stable : à égalité, le premier généré reste devant
        candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        candidates
    }
}

fn sample_draw<R: Rng + ?Sized>(
    distributions: &WeightedDistributions,
    sampler: &EntropySampler,
    rng: &mut R,
) -> DrawRecord {
    let mut thousands = [[0u8; 4]; THOUSAND_RANKS];
    for (rank, row) in thousands.iter_mut().enumerate() {
        *row = sampler.sample_row(distributions.rank(rank), rng);
    }
    let hundred = sampler.sample_row(distributions.rank(THOUSAND_RANKS), rng);

    DrawRecord { thousands, hundred }
}

/// Les 10 000 séquences de 4 chiffres par probabilité jointe décroissante.
fn ranked_sequences(distributions: &[DigitDistribution]) -> Vec<([u8; 4], f64)> {
    let mut all: Vec<([u8; 4], f64)> = (0..10_000u32)
        .map(|n| {
            let sequence = [(n / 1000) as u8, (n / 100 % 10) as u8, (n / 10 % 10) as u8, (n % 10) as u8];
            (sequence, joint_probability(distributions, &sequence))
        })
        .collect();
    all.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    all
}

/// Génération avec un générateur pseudo-aléatoire local : seed explicite pour la
/// reproductibilité, sinon initialisé depuis l'aléa du système.
pub fn generate_seeded(config: EngineConfig, input: &GenerationInput<'_>, seed: Option<u64>) -> GenerationBundle {
    let mut rng: StdRng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    Generator::new(config).generate(input, &mut rng)
}

#[cfg(test)]
mod tests {
    use super::*;
    use milhar_db::models::{HitStatus, RankType, row_len};

    const CHI2_CRITICAL_DF9: f64 = 27.877;

    fn history() -> Vec<DrawRecord> {
        (0..40)
            .map(|i: usize| {
                let rows: Vec<String> = (0..7)
                    .map(|rank| {
                        (0..row_len(rank))
                            .map(|p| char::from(b'0' + ((i * 3 + rank + p * 7) % 10) as u8))
                            .collect()
                    })
                    .collect();
                DrawRecord::from_rows(&rows).unwrap()
            })
            .collect()
    }

    fn input<'a>(history: &'a [DrawRecord], entropy: f64) -> GenerationInput<'a> {
        GenerationInput { modules: &[], history, hits: &[], rectifications: &[], entropy }
    }

    fn assert_well_formed(bundle: &GenerationBundle) {
        for row in &bundle.result.thousands {
            assert!(row.iter().all(|&d| d <= 9));
        }
        assert!(bundle.result.hundred.iter().all(|&d| d <= 9));
        assert!(bundle.candidates.len() >= 3);
        assert!(bundle.candidates.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        assert!(bundle.candidates.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
        assert!(bundle.candidates.iter().all(|c| c.sequence.iter().all(|&d| d <= 9)));
        assert_eq!(bundle.advanced_predictions.elite_tens.len(), 2);
        assert_eq!(bundle.advanced_predictions.super_tens.len(), 3);
        assert_eq!(bundle.advanced_predictions.hundreds.len(), 3);
    }

    #[test]
    fn test_bundle_well_formed_across_entropies() {
        let history = history();
        let generator = Generator::new(EngineConfig::default());
        for (seed, entropy) in [0.0, 0.25, 0.45, 0.8, 1.0].into_iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            let bundle = generator.generate(&input(&history, entropy), &mut rng);
            assert_well_formed(&bundle);
            assert_eq!(bundle.analysis.entries_analyzed, 40);
        }
    }

    #[test]
    fn test_zero_entropy_is_deterministic() {
        let history = history();
        let a = generate_seeded(EngineConfig::default(), &input(&history, 0.0), Some(1));
        let b = generate_seeded(EngineConfig::default(), &input(&history, 0.0), Some(2));
        let c = generate_seeded(EngineConfig::default(), &input(&history, 0.0), None);
        assert_eq!(a.result, b.result);
        assert_eq!(a.result, c.result);
        assert_eq!(a.candidates, b.candidates);
    }

    #[test]
    fn test_zero_entropy_picks_argmax() {
        let history = history();
        let generator = Generator::new(EngineConfig::default());
        let bundle = generator.generate(&input(&history, 0.0), &mut StdRng::seed_from_u64(3));
        let dists = FrequencyAggregator::new(&EngineConfig::default()).aggregate(&history, &[], &[]);
        for rank in 0..7 {
            let expected: Vec<u8> = dists.rank(rank).iter().map(|d| d.argmax()).collect();
            assert_eq!(bundle.result.row(rank), expected.as_slice());
        }
    }

    #[test]
    fn test_same_seed_same_bundle() {
        let history = history();
        let a = generate_seeded(EngineConfig::default(), &input(&history, 0.45), Some(2024));
        let b = generate_seeded(EngineConfig::default(), &input(&history, 0.45), Some(2024));
        assert_eq!(a, b);
    }

    #[test]
    fn test_candidates_distinct_from_primary() {
        let history = history();
        let config = EngineConfig { candidate_count: 6, ..EngineConfig::default() };
        for entropy in [0.0, 0.5] {
            let bundle = generate_seeded(config.clone(), &input(&history, entropy), Some(11));
            assert_eq!(bundle.candidates.len(), 6);
            let mut seen: Vec<[u8; 4]> = bundle.candidates.iter().map(|c| c.sequence).collect();
            assert!(!seen.contains(&bundle.result.thousands[0]));
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), 6);
        }
    }

    #[test]
    fn test_candidate_confidence_ignores_entropy() {
        let history = history();
        let dists = FrequencyAggregator::new(&EngineConfig::default()).aggregate(&history, &[], &[]);
        let bundle = generate_seeded(EngineConfig::default(), &input(&history, 0.9), Some(5));
        for c in &bundle.candidates {
            let expected = joint_probability(dists.rank(0), &c.sequence);
            assert!((c.confidence - expected).abs() < 1e-15);
        }
    }

    #[test]
    fn test_empty_snapshot_falls_back_to_uniform() {
        let empty: Vec<DrawRecord> = vec![];
        for entropy in [0.0, 0.5, 1.0] {
            let bundle = generate_seeded(EngineConfig::default(), &input(&empty, entropy), Some(8));
            assert_well_formed(&bundle);
            for c in &bundle.candidates {
                assert!((c.confidence - 1e-4).abs() < 1e-15);
            }
            assert_eq!(bundle.analysis.entries_analyzed, 0);
        }
        let bundle = generate_seeded(EngineConfig::default(), &input(&empty, 0.0), Some(8));
        assert_eq!(bundle.result.thousands, [[0; 4]; 6]);
    }

    #[test]
    fn test_out_of_range_entropy_is_clamped() {
        let history = history();
        let low = generate_seeded(EngineConfig::default(), &input(&history, -3.0), Some(1));
        let zero = generate_seeded(EngineConfig::default(), &input(&history, 0.0), Some(1));
        assert_eq!(low.result, zero.result);
        assert_eq!(low.entropy, 0.0);
        let high = generate_seeded(EngineConfig::default(), &input(&history, 9.0), Some(1));
        assert_eq!(high.entropy, 1.0);
    }

    #[test]
    fn test_modules_are_merged_without_mutation() {
        let history = history();
        let before = history.clone();
        let modules = vec![Module::parse(&["7777", "7777", "7777", "7777", "7777", "7777", "777"]); 30];
        let bundle = Generator::new(EngineConfig::default()).generate(
            &GenerationInput { modules: &modules, history: &history, hits: &[], rectifications: &[], entropy: 0.0 },
            &mut StdRng::seed_from_u64(0),
        );
        assert_eq!(bundle.result.thousands[0], [7, 7, 7, 7]);
        assert_eq!(bundle.result.hundred, [7, 7, 7]);
        assert_eq!(bundle.analysis.entries_analyzed, 70);
        assert_eq!(history, before);
    }

    #[test]
    fn test_feedback_steers_zero_entropy_result() {
        let history = history();
        let baseline = generate_seeded(EngineConfig::default(), &input(&history, 0.0), Some(1));
        let target = "8642";
        let hits: Vec<HitRecord> = (0..10)
            .map(|_| HitRecord::new(target, RankType::Thousand, 1, HitStatus::FullHit).unwrap())
            .collect();
        let steered = generate_seeded(
            EngineConfig::default(),
            &GenerationInput { modules: &[], history: &history, hits: &hits, rectifications: &[], entropy: 0.0 },
            Some(1),
        );
        assert_ne!(baseline.result.thousands[0], [8, 6, 4, 2]);
        assert_eq!(steered.result.thousands[0], [8, 6, 4, 2]);
    }

    #[test]
    fn test_full_entropy_is_uniform_per_position() {
        let history = history();
        let generator = Generator::new(EngineConfig::default());
        let mut rng = StdRng::seed_from_u64(20_250);
        let n = 1000u32;
        let mut counts = [[0u32; 10]; 4];
        for _ in 0..n {
            let bundle = generator.generate(&input(&history, 1.0), &mut rng);
            for (pos, &d) in bundle.result.thousands[0].iter().enumerate() {
                counts[pos][d as usize] += 1;
            }
        }
        let expected = n as f64 / 10.0;
        for (pos, c) in counts.iter().enumerate() {
            let chi2: f64 = c.iter().map(|&o| (o as f64 - expected).powi(2) / expected).sum();
            assert!(chi2 < CHI2_CRITICAL_DF9, "position {pos} : chi² = {chi2}, comptes = {c:?}");
        }
    }
}
