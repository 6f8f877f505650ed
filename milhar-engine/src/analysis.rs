use serde::{Deserialize, Serialize};

use milhar_db::models::{DIGIT_COUNT, RANK_COUNT};

use crate::snapshot::RankSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigitTag {
    Hot,
    Cold,
    Normal,
}

impl std::fmt::Display for DigitTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigitTag::Hot => write!(f, "QUENTE"),
            DigitTag::Cold => write!(f, "FRIO"),
            DigitTag::Normal => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitStats {
    pub digit: u8,
    pub frequency: u32,
    pub share: f64,
    /// Nombre d'entrées depuis la dernière apparition (0 = présent dans la plus récente).
    pub gap: u32,
    pub tag: DigitTag,
}

/// Résumé descriptif pour l'affichage ; n'alimente jamais la génération.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub entries_analyzed: usize,
    pub total_digits: u32,
    pub digits: Vec<DigitStats>,
}

impl Analysis {
    pub fn hot(&self) -> Vec<u8> {
        self.tagged(DigitTag::Hot)
    }

    pub fn cold(&self) -> Vec<u8> {
        self.tagged(DigitTag::Cold)
    }

    fn tagged(&self, tag: DigitTag) -> Vec<u8> {
        self.digits.iter().filter(|d| d.tag == tag).map(|d| d.digit).collect()
    }
}

fn percentile(sorted: &[u32], q: f64) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub fn analyze<S: RankSource>(snapshot: &[S], hot_percentile: f64, cold_percentile: f64) -> Analysis {
    let mut frequency = [0u32; DIGIT_COUNT];
    let mut gap: [Option<u32>; DIGIT_COUNT] = [None; DIGIT_COUNT];

    for (i, entry) in snapshot.iter().enumerate() {
        for rank in 0..RANK_COUNT {
            let Some(row) = entry.rank_row(rank) else { continue };
            for &d in row {
                let idx = d as usize;
                if idx < DIGIT_COUNT {
                    frequency[idx] += 1;
                    gap[idx].get_or_insert(i as u32);
                }
            }
        }
    }

    let total: u32 = frequency.iter().sum();
    let mut sorted = frequency;
    sorted.sort_unstable();
    let hot_threshold = percentile(&sorted, hot_percentile);
    let cold_threshold = percentile(&sorted, cold_percentile);

    let digits = (0..DIGIT_COUNT)
        .map(|idx| {
            let f = frequency[idx];
            // Strictement au-dessus / en dessous : une distribution plate n'a ni chaud ni froid
            let tag = if f > hot_threshold {
                DigitTag::Hot
            } else if f < cold_threshold {
                DigitTag::Cold
            } else {
                DigitTag::Normal
            };
            DigitStats {
                digit: idx as u8,
                frequency: f,
                share: if total > 0 { f as f64 / total as f64 } else { 0.0 },
                gap: gap[idx].unwrap_or(snapshot.len() as u32),
                tag,
            }
        })
        .collect();

    Analysis {
        entries_analyzed: snapshot.len(),
        total_digits: total,
        digits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use milhar_db::models::DrawRecord;

    #[test]
    fn test_empty_snapshot() {
        let analysis = analyze::<DrawRecord>(&[], 0.7, 0.3);
        assert_eq!(analysis.entries_analyzed, 0);
        assert_eq!(analysis.total_digits, 0);
        assert_eq!(analysis.digits.len(), 10);
        assert!(analysis.hot().is_empty());
        assert!(analysis.cold().is_empty());
        assert!(analysis.digits.iter().all(|d| d.gap == 0));
    }

    #[test]
    fn test_frequency_and_gap() {
        let snapshot = vec![
            DrawRecord::from_rows(&["1111", "1111", "1111", "2222", "2222", "3333", "444"]).unwrap(),
            DrawRecord::from_rows(&["1111", "5555", "5555", "5555", "6666", "7777", "899"]).unwrap(),
        ];
        let analysis = analyze(&snapshot, 0.7, 0.3);
        assert_eq!(analysis.total_digits, 54);
        assert_eq!(analysis.digits[1].frequency, 16);
        assert_eq!(analysis.digits[1].gap, 0);
        assert_eq!(analysis.digits[5].gap, 1);
        assert_eq!(analysis.digits[0].frequency, 0);
        assert_eq!(analysis.digits[0].gap, 2);

        let share_sum: f64 = analysis.digits.iter().map(|d| d.share).sum();
        assert!((share_sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_ties_are_not_hot() {
        // 0-6 apparaissent 3 fois, 7-9 deux fois : les deux seuils valent 3
        let snapshot = vec![
            DrawRecord::from_rows(&["0123", "4567", "8901", "2345", "6789", "0123", "456"]).unwrap(),
        ];
        let analysis = analyze(&snapshot, 0.7, 0.3);
        assert!(analysis.hot().is_empty());
        assert_eq!(analysis.cold(), vec![7, 8, 9]);
    }

    #[test]
    fn test_hot_and_cold_tags() {
        let snapshot = vec![
            DrawRecord::from_rows(&["1111", "1111", "1111", "2222", "2222", "3333", "444"]).unwrap(),
            DrawRecord::from_rows(&["1111", "5555", "5555", "5555", "6666", "7777", "899"]).unwrap(),
        ];
        let analysis = analyze(&snapshot, 0.7, 0.3);
        // Fréquences triées : 0 1 2 3 4 4 4 8 12 16 ; seuils 4 (70 %) et 3 (30 %)
        assert_eq!(analysis.hot(), vec![1, 2, 5]);
        assert_eq!(analysis.cold(), vec![0, 8, 9]);
        // Égal au seuil chaud : pas chaud
        assert_eq!(analysis.digits[6].frequency, 4);
        assert_eq!(analysis.digits[6].tag, DigitTag::Normal);
        assert_eq!(analysis.digits[4].tag, DigitTag::Normal);
    }
}
