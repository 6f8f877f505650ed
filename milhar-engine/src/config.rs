use std::path::Path;

use serde::{Deserialize, Serialize};

use milhar_db::models::THOUSAND_RANKS;

pub const MIN_CANDIDATES: usize = 3;

/// Poids minimal d'une entrée de l'historique, quel que soit son âge.
pub const MIN_RECENCY_WEIGHT: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Décroissance exponentielle par tirage : poids = decay^âge.
    pub recency_decay: f64,
    /// Bonus ajouté au chiffre confirmé par un acerto complet.
    pub hit_boost: f64,
    /// Poids retiré au chiffre généré et ajouté au chiffre réel d'une rectification.
    pub rectification_weight: f64,
    pub candidate_count: usize,
    /// Tentatives d'échantillonnage par candidat avant le repli déterministe.
    pub candidate_oversample: usize,
    /// Nombre de premiers rangs dont les suffixes alimentent dezenas et centenas.
    pub projection_ranks: usize,
    pub hot_percentile: f64,
    pub cold_percentile: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recency_decay: 0.97,
            hit_boost: 2.0,
            rectification_weight: 5.0,
            candidate_count: MIN_CANDIDATES,
            candidate_oversample: 10,
            projection_ranks: 2,
            hot_percentile: 0.7,
            cold_percentile: 0.3,
        }
    }
}

impl EngineConfig {
    pub fn recency_decay(&self) -> f64 {
        if self.recency_decay.is_nan() || self.recency_decay <= 0.0 {
            1.0
        } else {
            self.recency_decay.min(1.0)
        }
    }

    pub fn candidate_count(&self) -> usize {
        self.candidate_count.max(MIN_CANDIDATES)
    }

    pub fn projection_ranks(&self) -> usize {
        self.projection_ranks.clamp(1, THOUSAND_RANKS)
    }

    pub fn percentiles(&self) -> (f64, f64) {
        let hot = if self.hot_percentile.is_nan() { 0.7 } else { self.hot_percentile.clamp(0.0, 1.0) };
        let cold = if self.cold_percentile.is_nan() { 0.3 } else { self.cold_percentile.clamp(0.0, 1.0) };
        (hot, cold.min(hot))
    }
}

pub fn save_config(config: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let json = std::fs::read_to_string(path)?;
    let config: EngineConfig = serde_json::from_str(&json)?;
    Ok(config)
}
