use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::history::HistoryStore;
use crate::models::{
    DrawRecord, GateState, HitRecord, RANK_COUNT, RectificationRecord, Settings, WINDOW_CAP,
};

pub const MODULE_SLOTS: usize = 3;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS draws (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    rank_1      TEXT NOT NULL,
    rank_2      TEXT NOT NULL,
    rank_3      TEXT NOT NULL,
    rank_4      TEXT NOT NULL,
    rank_5      TEXT NOT NULL,
    rank_6      TEXT NOT NULL,
    rank_7      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS hits (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    hit_id      TEXT NOT NULL,
    value       TEXT NOT NULL,
    rank_type   TEXT NOT NULL,
    position    INTEGER NOT NULL,
    status      TEXT NOT NULL,
    timestamp   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS rectifications (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    rect_id     TEXT NOT NULL,
    generated   TEXT NOT NULL,
    actual      TEXT NOT NULL,
    rank_type   TEXT NOT NULL,
    rank_label  TEXT NOT NULL,
    timestamp   INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS settings (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS modules (
    slot        INTEGER NOT NULL,
    rank        INTEGER NOT NULL,
    raw         TEXT NOT NULL,
    PRIMARY KEY (slot, rank)
);
";

const KEY_ENTROPY: &str = "entropy";
const KEY_GATE: &str = "gate";
const KEY_LAST_BUNDLE: &str = "last_bundle";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("milhar.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la migration")?;
    Ok(())
}

/// Insère un tirage en tête de fenêtre et évince les plus anciens au-delà du plafond.
/// Retourne le nombre de tirages évincés. L'appelant fournit la transaction.
pub fn insert_draw(conn: &Connection, draw: &DrawRecord) -> Result<usize> {
    let rows = draw.row_strings();
    conn.execute(
        "INSERT INTO draws (rank_1, rank_2, rank_3, rank_4, rank_5, rank_6, rank_7)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![rows[0], rows[1], rows[2], rows[3], rows[4], rows[5], rows[6]],
    ).context("Échec de l'insertion")?;

    let evicted = conn.execute(
        "DELETE FROM draws WHERE id NOT IN (SELECT id FROM draws ORDER BY id DESC LIMIT ?1)",
        [WINDOW_CAP as i64],
    ).context("Échec de l'éviction")?;
    Ok(evicted)
}

pub fn fetch_window(conn: &Connection, limit: u32) -> Result<Vec<DrawRecord>> {
    let mut stmt = conn.prepare(
        "SELECT rank_1, rank_2, rank_3, rank_4, rank_5, rank_6, rank_7
         FROM draws ORDER BY id DESC LIMIT ?1"
    )?;
    let raw = stmt.query_map([limit], |row| {
        (0..RANK_COUNT)
            .map(|i| row.get::<_, String>(i))
            .collect::<Result<Vec<_>, _>>()
    })?.collect::<Result<Vec<_>, _>>()?;

    raw.iter()
        .map(|rows| {
            DrawRecord::from_rows(rows)
                .with_context(|| format!("Tirage corrompu en base : {:?}", rows))
        })
        .collect()
}

pub fn count_draws(conn: &Connection) -> Result<u32> {
    let count: u32 = conn.query_row("SELECT COUNT(*) FROM draws", [], |row| row.get(0))?;
    Ok(count)
}

pub fn insert_hit(conn: &Connection, hit: &HitRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO hits (hit_id, value, rank_type, position, status, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            hit.id,
            hit.value,
            hit.rank_type.label(),
            hit.position,
            hit.status.to_string(),
            hit.timestamp,
        ],
    ).context("Échec de l'enregistrement de l'acerto")?;
    Ok(())
}

pub fn fetch_hits(conn: &Connection) -> Result<Vec<HitRecord>> {
    let mut stmt = conn.prepare(
        "SELECT hit_id, value, rank_type, position, status, timestamp FROM hits ORDER BY seq ASC"
    )?;
    let raw = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u8>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?.collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, value, rank_type, position, status, timestamp)| -> Result<HitRecord> {
            Ok(HitRecord {
                id,
                value,
                rank_type: rank_type.parse()?,
                position,
                status: status.parse()?,
                timestamp,
            })
        })
        .collect()
}

pub fn insert_rectification(conn: &Connection, rect: &RectificationRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO rectifications (rect_id, generated, actual, rank_type, rank_label, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            rect.id,
            rect.generated,
            rect.actual,
            rect.rank_type.label(),
            rect.rank_label,
            rect.timestamp,
        ],
    ).context("Échec de l'enregistrement de la rectification")?;
    Ok(())
}

pub fn fetch_rectifications(conn: &Connection) -> Result<Vec<RectificationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT rect_id, generated, actual, rank_type, rank_label, timestamp
         FROM rectifications ORDER BY seq ASC"
    )?;
    let raw = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?.collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, generated, actual, rank_type, rank_label, timestamp)| -> Result<RectificationRecord> {
            Ok(RectificationRecord {
                id,
                generated,
                actual,
                rank_type: rank_type.parse()?,
                rank_label,
                timestamp,
            })
        })
        .collect()
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    ).with_context(|| format!("Échec de l'écriture du paramètre {key}"))?;
    Ok(())
}

pub fn load_settings(conn: &Connection) -> Result<Settings> {
    let settings = get_setting(conn, KEY_ENTROPY)?
        .and_then(|v| v.parse::<f64>().ok())
        .map(Settings::new)
        .unwrap_or_default();
    Ok(settings)
}

pub fn save_settings(conn: &Connection, settings: &Settings) -> Result<()> {
    set_setting(conn, KEY_ENTROPY, &Settings::new(settings.entropy).entropy.to_string())
}

pub fn load_gate(conn: &Connection) -> Result<GateState> {
    Ok(get_setting(conn, KEY_GATE)?
        .map(|v| GateState::from_str_lossy(&v))
        .unwrap_or_default())
}

pub fn save_gate(conn: &Connection, gate: GateState) -> Result<()> {
    set_setting(conn, KEY_GATE, gate.as_str())
}

/// Conserve le dernier résultat généré (JSON) pour le réafficher tant que le verrou tient.
pub fn save_last_bundle<T: Serialize>(conn: &Connection, bundle: &T) -> Result<()> {
    let json = serde_json::to_string(bundle).context("Échec de la sérialisation du résultat")?;
    set_setting(conn, KEY_LAST_BUNDLE, &json)
}

pub fn load_last_bundle<T: DeserializeOwned>(conn: &Connection) -> Result<Option<T>> {
    get_setting(conn, KEY_LAST_BUNDLE)?
        .map(|json| serde_json::from_str(&json).context("Dernier résultat illisible"))
        .transpose()
}

/// Modules de saisie, slot 1 (le plus ancien) à 3 (le plus récent). Lignes vides si absentes.
pub fn fetch_modules(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let mut modules = vec![vec![String::new(); RANK_COUNT]; MODULE_SLOTS];
    let mut stmt = conn.prepare("SELECT slot, rank, raw FROM modules")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
    })?.collect::<Result<Vec<_>, _>>()?;

    for (slot, rank, raw) in rows {
        let (slot, rank) = (slot as usize, rank as usize);
        if (1..=MODULE_SLOTS).contains(&slot) && rank < RANK_COUNT {
            modules[slot - 1][rank] = raw;
        }
    }
    Ok(modules)
}

fn write_module(conn: &Connection, slot: usize, rows: &[String]) -> Result<()> {
    for rank in 0..RANK_COUNT {
        let raw = rows.get(rank).map(String::as_str).unwrap_or("");
        conn.execute(
            "INSERT INTO modules (slot, rank, raw) VALUES (?1, ?2, ?3)
             ON CONFLICT(slot, rank) DO UPDATE SET raw = excluded.raw",
            rusqlite::params![slot as i64, rank as i64, raw],
        )?;
    }
    Ok(())
}

/// Décale les modules (1 <- 2 <- 3) et place `rows` dans le slot 3.
pub fn shift_modules(conn: &Connection, rows: &[String]) -> Result<()> {
    let current = fetch_modules(conn)?;
    for slot in 1..MODULE_SLOTS {
        write_module(conn, slot, &current[slot])?;
    }
    write_module(conn, MODULE_SLOTS, rows)
        .context("Échec de l'enregistrement du module")
}

/// Reconstruit un instantané complet de l'historique à partir de la base.
pub fn load_store(conn: &Connection) -> Result<HistoryStore> {
    let draws = fetch_window(conn, WINDOW_CAP as u32)?;
    let hits = fetch_hits(conn)?;
    let rectifications = fetch_rectifications(conn)?;
    Ok(HistoryStore::from_parts(draws, hits, rectifications))
}
