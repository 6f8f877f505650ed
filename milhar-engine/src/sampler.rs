use rand::{Rng, RngExt};
use rand::distr::weighted::WeightedIndex;
use rand::prelude::Distribution;
use tracing::warn;

use milhar_db::models::{DIGIT_COUNT, clamp_entropy};

use crate::aggregator::DigitDistribution;

/// `(1 - entropy) * distribution + entropy * uniforme`.
pub fn blend(probabilities: &[f64; DIGIT_COUNT], entropy: f64) -> [f64; DIGIT_COUNT] {
    let entropy = clamp_entropy(entropy);
    let uniform = 1.0 / DIGIT_COUNT as f64;
    let mut blended = [0.0; DIGIT_COUNT];
    for (b, &p) in blended.iter_mut().zip(probabilities.iter()) {
        *b = (1.0 - entropy) * p + entropy * uniform;
    }
    blended
}

/// Tire un chiffre par position. Sans état : chaque appel est indépendant et toute
/// l'aléa passe par le générateur fourni.
#[derive(Debug, Clone, Copy)]
pub struct EntropySampler {
    entropy: f64,
}

impl EntropySampler {
    pub fn new(entropy: f64) -> Self {
        let clamped = clamp_entropy(entropy);
        if clamped != entropy {
            warn!(requested = entropy, used = clamped, "entropie hors de [0, 1], bornée");
        }
        Self { entropy: clamped }
    }

    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn is_deterministic(&self) -> bool {
        self.entropy <= 0.0
    }

    pub fn sample<R: Rng + ?Sized>(&self, distribution: &DigitDistribution, rng: &mut R) -> u8 {
        if self.entropy <= 0.0 {
            return distribution.argmax();
        }
        if self.entropy >= 1.0 {
            return rng.random_range(0..DIGIT_COUNT as u8);
        }

        let blended = blend(&distribution.probabilities, self.entropy);
        match WeightedIndex::new(blended) {
            Ok(dist) => dist.sample(rng) as u8,
            Err(_) => distribution.argmax(),
        }
    }

    /// Une ligne de `N` chiffres, positions tirées dans l'ordre. Une position sans
    /// distribution vaut 0.
    pub fn sample_row<const N: usize, R: Rng + ?Sized>(
        &self,
        distributions: &[DigitDistribution],
        rng: &mut R,
    ) -> [u8; N] {
        std::array::from_fn(|i| distributions.get(i).map_or(0, |d| self.sample(d, rng)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Valeur critique du chi² à 9 degrés de liberté, α = 0.001.
    const CHI2_CRITICAL_DF9: f64 = 27.877;

    fn skewed() -> DigitDistribution {
        let mut dist = DigitDistribution::uniform();
        dist.probabilities = [0.0, 0.05, 0.05, 0.6, 0.05, 0.05, 0.05, 0.05, 0.05, 0.05];
        dist
    }

    fn chi_square(counts: &[u32; DIGIT_COUNT], n: u32) -> f64 {
        let expected = n as f64 / DIGIT_COUNT as f64;
        counts.iter().map(|&c| (c as f64 - expected).powi(2) / expected).sum()
    }

    #[test]
    fn test_blend_bounds() {
        let p = skewed().probabilities;
        assert_eq!(blend(&p, 0.0), p);
        assert!(blend(&p, 1.0).iter().all(|&b| (b - 0.1).abs() < 1e-12));
        let half = blend(&p, 0.5);
        assert!((half.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((half[3] - 0.35).abs() < 1e-12);
        assert!((half[0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_zero_entropy_is_argmax() {
        let sampler = EntropySampler::new(0.0);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(sampler.sample(&skewed(), &mut rng), 3);
        }
        assert_eq!(sampler.sample(&DigitDistribution::uniform(), &mut rng), 0);
    }

    #[test]
    fn test_entropy_is_clamped() {
        assert_eq!(EntropySampler::new(-2.0).entropy(), 0.0);
        assert_eq!(EntropySampler::new(7.0).entropy(), 1.0);
        assert!(EntropySampler::new(f64::NAN).is_deterministic());
    }

    #[test]
    fn test_full_entropy_is_uniform() {
        let sampler = EntropySampler::new(1.0);
        let mut rng = StdRng::seed_from_u64(42);
        let n = 5000;
        let mut counts = [0u32; DIGIT_COUNT];
        for _ in 0..n {
            counts[sampler.sample(&skewed(), &mut rng) as usize] += 1;
        }
        let chi2 = chi_square(&counts, n);
        assert!(chi2 < CHI2_CRITICAL_DF9, "chi² = {chi2}, comptes = {counts:?}");
    }

    #[test]
    fn test_intermediate_entropy_follows_blend() {
        let sampler = EntropySampler::new(0.5);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 4000;
        let mut counts = [0u32; DIGIT_COUNT];
        for _ in 0..n {
            counts[sampler.sample(&skewed(), &mut rng) as usize] += 1;
        }
        // Attendu : 35 % de 3, 5 % de 0
        let share3 = counts[3] as f64 / n as f64;
        let share0 = counts[0] as f64 / n as f64;
        assert!((share3 - 0.35).abs() < 0.05, "part de 3 = {share3}");
        assert!((share0 - 0.05).abs() < 0.03, "part de 0 = {share0}");
    }

    #[test]
    fn test_seed_determinism() {
        let sampler = EntropySampler::new(0.6);
        let dists = vec![skewed(); 4];
        let a: [u8; 4] = sampler.sample_row(&dists, &mut StdRng::seed_from_u64(99));
        let b: [u8; 4] = sampler.sample_row(&dists, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);

        let deterministic: [u8; 4] = EntropySampler::new(0.0).sample_row(&dists, &mut StdRng::seed_from_u64(1));
        assert_eq!(deterministic, [3, 3, 3, 3]);
        let padded: [u8; 4] = EntropySampler::new(0.0).sample_row(&dists[..2], &mut StdRng::seed_from_u64(1));
        assert_eq!(padded, [3, 3, 0, 0]);
    }
}
