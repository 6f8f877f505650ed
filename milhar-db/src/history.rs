use tracing::{debug, warn};

use crate::models::{DrawRecord, HitRecord, IngestError, RectificationRecord, WINDOW_CAP};

/// Fenêtre d'historique plafonnée + journaux de retours (acertos, rectifications).
///
/// `draws[0]` = tirage le plus récent. La fenêtre n'est jamais réordonnée ; seule
/// l'ingestion la modifie. Un `ingest` réussi signale à l'appelant que l'entrée a
/// changé : c'est lui qui lève alors son verrou de génération.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    draws: Vec<DrawRecord>,
    hits: Vec<HitRecord>,
    rectifications: Vec<RectificationRecord>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Corpus initial, du plus récent au plus ancien. Tronqué au plafond.
    pub fn with_seed(mut draws: Vec<DrawRecord>) -> Self {
        draws.truncate(WINDOW_CAP);
        Self {
            draws,
            ..Self::default()
        }
    }

    pub fn from_parts(
        draws: Vec<DrawRecord>,
        hits: Vec<HitRecord>,
        rectifications: Vec<RectificationRecord>,
    ) -> Self {
        let mut store = Self::with_seed(draws);
        store.hits = hits;
        store.rectifications = rectifications;
        store
    }

    /// Nettoie et valide 7 lignes brutes puis insère le tirage en tête.
    /// En cas d'échec la fenêtre reste intacte.
    pub fn ingest<S: AsRef<str>>(&mut self, rows: &[S]) -> Result<DrawRecord, IngestError> {
        let draw = DrawRecord::from_rows(rows).inspect_err(|e| {
            warn!(error = %e, "tirage rejeté");
        })?;
        self.push(draw.clone());
        Ok(draw)
    }

    /// Insère un tirage déjà validé. Retourne les tirages évincés (les plus anciens).
    pub fn push(&mut self, draw: DrawRecord) -> Vec<DrawRecord> {
        self.draws.insert(0, draw);
        let evicted = if self.draws.len() > WINDOW_CAP {
            self.draws.split_off(WINDOW_CAP)
        } else {
            Vec::new()
        };
        debug!(len = self.draws.len(), evicted = evicted.len(), "fenêtre mise à jour");
        evicted
    }

    pub fn window(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn hits(&self) -> &[HitRecord] {
        &self.hits
    }

    pub fn rectifications(&self) -> &[RectificationRecord] {
        &self.rectifications
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}
