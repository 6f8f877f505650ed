use serde::{Deserialize, Serialize};

use milhar_db::models::{THOUSAND_RANKS, digits_to_string};

use crate::aggregator::{DigitDistribution, WeightedDistributions, joint_probability};

pub const ELITE_TENS: usize = 2;
pub const SUPER_TENS: usize = 3;
pub const TOP_HUNDREDS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredValue {
    pub value: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedPredictions {
    pub elite_tens: Vec<ScoredValue>,
    pub super_tens: Vec<ScoredValue>,
    pub hundreds: Vec<ScoredValue>,
}

/// Classe toutes les valeurs de `width` chiffres. La confiance d'une valeur est la
/// moyenne, sur les sources, de sa probabilité jointe. Tri stable : à égalité,
/// la plus petite valeur passe devant.
fn rank_values(sources: &[&[DigitDistribution]], width: usize) -> Vec<ScoredValue> {
    let count = 10usize.pow(width as u32);
    let mut scored: Vec<ScoredValue> = (0..count)
        .map(|n| {
            let digits: Vec<u8> = (0..width)
                .rev()
                .map(|i| ((n / 10usize.pow(i as u32)) % 10) as u8)
                .collect();
            let confidence = if sources.is_empty() {
                0.0
            } else {
                sources.iter().map(|s| joint_probability(s, &digits)).sum::<f64>() / sources.len() as f64
            };
            ScoredValue { value: digits_to_string(&digits), confidence }
        })
        .collect();

    scored.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Projections courtes : dezenas à partir des deux dernières positions des premiers
/// rangs, centenas à partir de leurs trois dernières positions et du rang à 3 chiffres.
pub fn project(distributions: &WeightedDistributions, projection_ranks: usize) -> AdvancedPredictions {
    let ranks = projection_ranks.clamp(1, THOUSAND_RANKS);

    let ten_sources: Vec<&[DigitDistribution]> =
        (0..ranks).map(|r| distributions.suffix(r, 2)).collect();
    let tens = rank_values(&ten_sources, 2);

    let mut hundred_sources: Vec<&[DigitDistribution]> =
        (0..ranks).map(|r| distributions.suffix(r, 3)).collect();
    hundred_sources.push(distributions.rank(THOUSAND_RANKS));
    let hundreds = rank_values(&hundred_sources, 3);

    AdvancedPredictions {
        elite_tens: tens.iter().take(ELITE_TENS).cloned().collect(),
        super_tens: tens.iter().skip(ELITE_TENS).take(SUPER_TENS).cloned().collect(),
        hundreds: hundreds.into_iter().take(TOP_HUNDREDS).collect(),
    }
}
