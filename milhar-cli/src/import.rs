use anyhow::{Context, Result};
use milhar_db::rusqlite::Connection;
use std::path::Path;
use tracing::warn;

use milhar_db::db::insert_draw;
use milhar_db::history::HistoryStore;

fn record_rows(record: &csv::StringRecord) -> Vec<String> {
    record.iter().map(|field| field.trim().to_string()).collect()
}

pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub rejected: u32,
    pub evicted: u32,
}

/// Importe un CSV `;` de 7 champs par ligne, du tirage le plus ancien au plus récent.
/// Chaque ligne passe par l'ingestion : une ligne invalide est rejetée en entier.
pub fn import_csv(conn: &Connection, path: &Path) -> Result<ImportResult> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;

    let mut staging = HistoryStore::new();
    let mut result = ImportResult {
        total_records: 0,
        inserted: 0,
        rejected: 0,
        evicted: 0,
    };

    for record_result in reader.records() {
        result.total_records += 1;
        let record = match record_result {
            Ok(record) => record,
            Err(e) => {
                warn!(line = result.total_records, error = %e, "ligne illisible");
                result.rejected += 1;
                continue;
            }
        };

        match staging.ingest(record_rows(&record).as_slice()) {
            Ok(draw) => {
                let evicted = insert_draw(&tx, &draw)
                    .with_context(|| format!("Erreur insertion ligne {}", result.total_records))?;
                result.inserted += 1;
                result.evicted += evicted as u32;
            }
            Err(e) => {
                warn!(line = result.total_records, error = %e, "ligne rejetée");
                result.rejected += 1;
            }
        }
    }

    tx.commit().context("Échec du commit")?;
    Ok(result)
}
