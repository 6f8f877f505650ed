use tracing::debug;

use milhar_db::models::{
    DIGIT_COUNT, HitRecord, HitStatus, RANK_COUNT, RectificationRecord, row_len,
};

use crate::config::{EngineConfig, MIN_RECENCY_WEIGHT};
use crate::snapshot::RankSource;

const UNIFORM_PROBABILITY: f64 = 1.0 / DIGIT_COUNT as f64;

/// Distribution des chiffres 0-9 pour une position d'un rang.
#[derive(Debug, Clone, PartialEq)]
pub struct DigitDistribution {
    /// Poids accumulés (récence + retours), jamais négatifs.
    pub tallies: [f64; DIGIT_COUNT],
    /// Probabilités normalisées, somme = 1.0.
    pub probabilities: [f64; DIGIT_COUNT],
}

impl DigitDistribution {
    pub fn uniform() -> Self {
        Self {
            tallies: [0.0; DIGIT_COUNT],
            probabilities: [UNIFORM_PROBABILITY; DIGIT_COUNT],
        }
    }

    fn from_tallies(mut tallies: [f64; DIGIT_COUNT]) -> Self {
        for t in &mut tallies {
            if t.is_nan() || *t < 0.0 {
                *t = 0.0;
            }
        }
        let total: f64 = tallies.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Self { tallies, probabilities: [UNIFORM_PROBABILITY; DIGIT_COUNT] };
        }

        let mut probabilities = [0.0; DIGIT_COUNT];
        for (p, &t) in probabilities.iter_mut().zip(tallies.iter()) {
            *p = t / total;
        }
        Self { tallies, probabilities }
    }

    pub fn probability(&self, digit: u8) -> f64 {
        self.probabilities.get(digit as usize).copied().unwrap_or(0.0)
    }

    /// Chiffre le plus probable ; à égalité, le plus petit.
    pub fn argmax(&self) -> u8 {
        self.ranked_digits()[0]
    }

    /// Chiffres triés par probabilité décroissante (tri stable : le plus petit d'abord).
    pub fn ranked_digits(&self) -> [u8; DIGIT_COUNT] {
        let mut digits: [u8; DIGIT_COUNT] = std::array::from_fn(|d| d as u8);
        digits.sort_by(|&a, &b| {
            self.probabilities[b as usize]
                .partial_cmp(&self.probabilities[a as usize])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        digits
    }
}

/// Probabilité jointe d'une séquence sous l'hypothèse d'indépendance des positions :
/// produit des probabilités de chaque chiffre. Toujours dans [0, 1].
pub fn joint_probability(distributions: &[DigitDistribution], digits: &[u8]) -> f64 {
    distributions
        .iter()
        .zip(digits.iter())
        .map(|(dist, &d)| dist.probability(d))
        .product()
}

/// Une distribution par (rang, position).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedDistributions {
    ranks: Vec<Vec<DigitDistribution>>,
}

impl WeightedDistributions {
    pub fn uniform() -> Self {
        Self {
            ranks: (0..RANK_COUNT)
                .map(|rank| vec![DigitDistribution::uniform(); row_len(rank)])
                .collect(),
        }
    }

    pub fn rank(&self, rank: usize) -> &[DigitDistribution] {
        &self.ranks[rank]
    }

    pub fn get(&self, rank: usize, position: usize) -> &DigitDistribution {
        &self.ranks[rank][position]
    }

    /// Les `width` dernières positions d'un rang.
    pub fn suffix(&self, rank: usize, width: usize) -> &[DigitDistribution] {
        let row = self.rank(rank);
        &row[row.len().saturating_sub(width)..]
    }
}

type Tallies = Vec<Vec<[f64; DIGIT_COUNT]>>;

/// Ajoute `amount` aux chiffres d'une valeur alignée à droite sur la ligne du rang.
/// Une valeur plus longue que la ligne garde ses derniers chiffres.
fn apply_aligned(tallies: &mut Tallies, rank: usize, digits: &[u8], amount: f64) {
    let row = &mut tallies[rank];
    let len = row.len();
    let digits = &digits[digits.len().saturating_sub(len)..];
    let offset = len - digits.len();
    for (i, &d) in digits.iter().enumerate() {
        if (d as usize) < DIGIT_COUNT {
            row[offset + i][d as usize] += amount;
        }
    }
}

pub struct FrequencyAggregator {
    recency_decay: f64,
    hit_boost: f64,
    rectification_weight: f64,
}

impl FrequencyAggregator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            recency_decay: config.recency_decay(),
            hit_boost: config.hit_boost.max(0.0),
            rectification_weight: config.rectification_weight.max(0.0),
        }
    }

    /// Poids d'une entrée selon son âge (0 = la plus récente). Décroissant, jamais nul.
    pub fn recency_weight(&self, age: usize) -> f64 {
        let exponent = i32::try_from(age).unwrap_or(i32::MAX);
        self.recency_decay.powi(exponent).max(MIN_RECENCY_WEIGHT)
    }

    /// window[0] = entrée la plus récente.
    pub fn aggregate<S: RankSource>(
        &self,
        window: &[S],
        hits: &[HitRecord],
        rectifications: &[RectificationRecord],
    ) -> WeightedDistributions {
        let mut tallies: Tallies = (0..RANK_COUNT)
            .map(|rank| vec![[0.0f64; DIGIT_COUNT]; row_len(rank)])
            .collect();

        for (age, entry) in window.iter().enumerate() {
            let weight = self.recency_weight(age);
            for (rank, positions) in tallies.iter_mut().enumerate() {
                let Some(row) = entry.rank_row(rank) else { continue };
                for (slot, &d) in positions.iter_mut().zip(row.iter()) {
                    if (d as usize) < DIGIT_COUNT {
                        slot[d as usize] += weight;
                    }
                }
            }
        }

        let mut boosted = 0usize;
        for hit in hits.iter().filter(|h| h.status == HitStatus::FullHit) {
            apply_aligned(&mut tallies, hit.target_rank(), &hit.digits(), self.hit_boost);
            boosted += 1;
        }

        for rect in rectifications {
            let rank = rect.target_rank();
            apply_aligned(&mut tallies, rank, &rect.generated_digits(), -self.rectification_weight);
            apply_aligned(&mut tallies, rank, &rect.actual_digits(), self.rectification_weight);
        }

        debug!(
            entries = window.len(),
            full_hits = boosted,
            rectifications = rectifications.len(),
            "distributions agrégées"
        );

        WeightedDistributions {
            ranks: tallies
                .into_iter()
                .map(|positions| positions.into_iter().map(DigitDistribution::from_tallies).collect())
                .collect(),
        }
    }
}
