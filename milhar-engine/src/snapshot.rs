use serde::{Deserialize, Serialize};

use milhar_db::models::{DrawRecord, RANK_COUNT, parse_row};

/// Source de lignes par rang. Un module partiellement saisi peut ne pas avoir toutes ses lignes.
pub trait RankSource {
    fn rank_row(&self, rank: usize) -> Option<&[u8]>;
}

impl RankSource for DrawRecord {
    fn rank_row(&self, rank: usize) -> Option<&[u8]> {
        (rank < RANK_COUNT).then(|| self.row(rank))
    }
}

/// Module de saisie de l'opérateur : 7 lignes, chacune présente seulement si valide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    rows: [Option<Vec<u8>>; RANK_COUNT],
}

impl Module {
    /// Analyse tolérante : une ligne invalide est simplement absente.
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Self {
        let mut module = Self::default();
        for (rank, slot) in module.rows.iter_mut().enumerate() {
            *slot = raw.get(rank).and_then(|r| parse_row(r.as_ref(), rank).ok());
        }
        module
    }

    pub fn filled_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.filled_rows() == 0
    }
}

impl RankSource for Module {
    fn rank_row(&self, rank: usize) -> Option<&[u8]> {
        self.rows.get(rank)?.as_deref()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum SnapshotEntry<'a> {
    Module(&'a Module),
    Draw(&'a DrawRecord),
}

impl RankSource for SnapshotEntry<'_> {
    fn rank_row(&self, rank: usize) -> Option<&[u8]> {
        match self {
            SnapshotEntry::Module(m) => m.rank_row(rank),
            SnapshotEntry::Draw(d) => d.rank_row(rank),
        }
    }
}

/// Instantané effectif : modules (du plus récent au plus ancien) puis historique.
/// Les modules vides sont ignorés ; rien n'est copié ni modifié.
pub fn merge_snapshot<'a>(modules: &'a [Module], history: &'a [DrawRecord]) -> Vec<SnapshotEntry<'a>> {
    modules
        .iter()
        .filter(|m| !m.is_empty())
        .map(SnapshotEntry::Module)
        .chain(history.iter().map(SnapshotEntry::Draw))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_rows() -> Vec<&'static str> {
        vec!["1234", "2345", "3456", "4567", "5678", "6789", "789"]
    }

    #[test]
    fn test_module_parse_partial() {
        let module = Module::parse(&["1234", "", "12a", "9-8-7-6", "", "", "55"]);
        assert_eq!(module.filled_rows(), 2);
        assert_eq!(module.rank_row(0), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(module.rank_row(2), None);
        assert_eq!(module.rank_row(3), Some(&[9u8, 8, 7, 6][..]));
        assert_eq!(module.rank_row(6), None);
    }

    #[test]
    fn test_module_short_input() {
        let module = Module::parse(&["1234"]);
        assert_eq!(module.filled_rows(), 1);
        assert!(Module::parse::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_module_complete_matches_draw() {
        let module = Module::parse(&full_rows());
        let draw = DrawRecord::from_rows(&full_rows()).unwrap();
        assert_eq!(module.filled_rows(), 7);
        for rank in 0..RANK_COUNT {
            assert_eq!(module.rank_row(rank), draw.rank_row(rank));
        }
    }

    #[test]
    fn test_merge_snapshot_order() {
        let draw = DrawRecord::from_rows(&full_rows()).unwrap();
        let history = vec![draw.clone()];
        let modules = vec![Module::parse(&["9999"]), Module::default()];

        let snapshot = merge_snapshot(&modules, &history);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].rank_row(0), Some(&[9u8, 9, 9, 9][..]));
        assert_eq!(snapshot[0].rank_row(1), None);
        assert_eq!(snapshot[1].rank_row(6), Some(&[7u8, 8, 9][..]));
        assert_eq!(history, vec![draw]);
    }
}
