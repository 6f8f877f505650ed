use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nombre de rangs d'un tirage : 6 milhares + 1 centena.
pub const RANK_COUNT: usize = 7;
pub const THOUSAND_RANKS: usize = 6;
pub const DIGIT_COUNT: usize = 10;
/// Taille maximale de la fenêtre d'historique.
pub const WINDOW_CAP: usize = 250;
pub const DEFAULT_ENTROPY: f64 = 0.45;
/// Une position d'acerto désigne une ligne du résultat : 1-6 milhares, 7 centena.
pub const MAX_HIT_POSITION: u8 = RANK_COUNT as u8;

/// Longueur attendue d'une ligne selon son rang (0-5 : 4 chiffres, 6 : 3 chiffres).
pub fn row_len(rank: usize) -> usize {
    if rank < THOUSAND_RANKS { 4 } else { 3 }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("{actual} ligne(s) reçue(s), {expected} attendues")]
    RowCount { expected: usize, actual: usize },
    #[error("ligne {} : {found} chiffre(s) après nettoyage ({sanitized:?}), {expected} attendus", .rank + 1)]
    RowLength {
        rank: usize,
        expected: usize,
        found: usize,
        sanitized: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    #[error("valeur {value:?} : {expected} chiffres attendus pour {rank_type}")]
    ValueLength {
        value: String,
        rank_type: RankType,
        expected: usize,
    },
    #[error("position {0} hors limites (1-7)")]
    Position(u8),
    #[error("la ligne {position} a {row} chiffres, trop courte pour une {rank_type}")]
    NarrowRow {
        position: u8,
        row: usize,
        rank_type: RankType,
    },
    #[error("type de rang inconnu : {0:?}")]
    UnknownRankType(String),
    #[error("statut inconnu : {0:?}")]
    UnknownStatus(String),
}

/// Conserve uniquement les chiffres ASCII d'une ligne brute.
pub fn sanitize_row(raw: &str) -> Vec<u8> {
    raw.chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as u8)
        .collect()
}

pub fn digits_to_string(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

/// Nettoie une ligne et la valide pour le rang donné.
/// Les chiffres en trop sont tronqués ; il n'en manque jamais un seul sans rejet.
pub fn parse_row(raw: &str, rank: usize) -> Result<Vec<u8>, IngestError> {
    let expected = row_len(rank);
    let mut digits = sanitize_row(raw);
    if digits.len() < expected {
        return Err(IngestError::RowLength {
            rank,
            expected,
            found: digits.len(),
            sanitized: digits_to_string(&digits),
        });
    }
    digits.truncate(expected);
    Ok(digits)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub thousands: [[u8; 4]; THOUSAND_RANKS],
    pub hundred: [u8; 3],
}

impl DrawRecord {
    /// Construit un tirage complet à partir de 7 lignes brutes. Atomique : une seule
    /// ligne invalide rejette l'ensemble.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Self, IngestError> {
        if rows.len() != RANK_COUNT {
            return Err(IngestError::RowCount {
                expected: RANK_COUNT,
                actual: rows.len(),
            });
        }

        let mut thousands = [[0u8; 4]; THOUSAND_RANKS];
        for (rank, slot) in thousands.iter_mut().enumerate() {
            let digits = parse_row(rows[rank].as_ref(), rank)?;
            slot.copy_from_slice(&digits);
        }

        let mut hundred = [0u8; 3];
        hundred.copy_from_slice(&parse_row(rows[THOUSAND_RANKS].as_ref(), THOUSAND_RANKS)?);

        Ok(Self { thousands, hundred })
    }

    pub fn row(&self, rank: usize) -> &[u8] {
        debug_assert!(rank < RANK_COUNT, "rang {rank} hors limites");
        if rank < THOUSAND_RANKS {
            &self.thousands[rank]
        } else {
            &self.hundred
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        (0..RANK_COUNT).map(move |rank| self.row(rank))
    }

    pub fn row_strings(&self) -> Vec<String> {
        self.rows().map(digits_to_string).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankType {
    Thousand,
    Hundred,
    Ten,
}

impl RankType {
    pub fn digits(&self) -> usize {
        match self {
            RankType::Thousand => 4,
            RankType::Hundred => 3,
            RankType::Ten => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RankType::Thousand => "MILHAR",
            RankType::Hundred => "CENTENA",
            RankType::Ten => "DEZENA",
        }
    }
}

impl std::fmt::Display for RankType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for RankType {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "milhar" | "thousand" | "4" => Ok(RankType::Thousand),
            "centena" | "hundred" | "3" => Ok(RankType::Hundred),
            "dezena" | "ten" | "2" => Ok(RankType::Ten),
            _ => Err(FeedbackError::UnknownRankType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitStatus {
    FullHit,
    NearHit,
}

impl std::fmt::Display for HitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HitStatus::FullHit => write!(f, "ACERTO"),
            HitStatus::NearHit => write!(f, "QUASE ACERTO"),
        }
    }
}

impl std::str::FromStr for HitStatus {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "acerto" | "full" | "full-hit" => Ok(HitStatus::FullHit),
            "quase acerto" | "near" | "near-hit" => Ok(HitStatus::NearHit),
            _ => Err(FeedbackError::UnknownStatus(s.to_string())),
        }
    }
}

fn validate_value(raw: &str, rank_type: RankType) -> Result<String, FeedbackError> {
    let digits = sanitize_row(raw);
    if digits.len() != rank_type.digits() {
        return Err(FeedbackError::ValueLength {
            value: raw.to_string(),
            rank_type,
            expected: rank_type.digits(),
        });
    }
    Ok(digits_to_string(&digits))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub id: String,
    pub value: String,
    pub rank_type: RankType,
    pub position: u8,
    pub status: HitStatus,
    pub timestamp: i64,
}

impl HitRecord {
    pub fn new(value: &str, rank_type: RankType, position: u8, status: HitStatus) -> Result<Self, FeedbackError> {
        if !(1..=MAX_HIT_POSITION).contains(&position) {
            return Err(FeedbackError::Position(position));
        }
        let row = row_len(position as usize - 1);
        if rank_type.digits() > row {
            return Err(FeedbackError::NarrowRow { position, row, rank_type });
        }
        let value = validate_value(value, rank_type)?;
        let timestamp = now_millis();
        Ok(Self {
            id: format!("H{timestamp}-{position}-{value}"),
            value,
            rank_type,
            position,
            status,
            timestamp,
        })
    }

    pub fn digits(&self) -> Vec<u8> {
        sanitize_row(&self.value)
    }

    /// Ligne ciblée : la position 1 correspond au premier prix, la 7 à la centena.
    pub fn target_rank(&self) -> usize {
        (self.position.max(1) as usize - 1).min(RANK_COUNT - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectificationRecord {
    pub id: String,
    pub generated: String,
    pub actual: String,
    pub rank_type: RankType,
    pub rank_label: String,
    pub timestamp: i64,
}

impl RectificationRecord {
    pub fn new(generated: &str, actual: &str, rank_type: RankType, rank_label: &str) -> Result<Self, FeedbackError> {
        let generated = validate_value(generated, rank_type)?;
        let actual = validate_value(actual, rank_type)?;
        let timestamp = now_millis();
        Ok(Self {
            id: format!("R{timestamp}-{generated}-{actual}"),
            generated,
            actual,
            rank_type,
            rank_label: rank_label.trim().to_string(),
            timestamp,
        })
    }

    pub fn generated_digits(&self) -> Vec<u8> {
        sanitize_row(&self.generated)
    }

    pub fn actual_digits(&self) -> Vec<u8> {
        sanitize_row(&self.actual)
    }

    /// Rang déduit de la première suite de chiffres du libellé ("2º" -> 1).
    /// Sans chiffre, le premier rang est ciblé.
    pub fn target_rank(&self) -> usize {
        let number: String = self
            .rank_label
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        match number.parse::<usize>() {
            Ok(n) if n >= 1 => (n - 1).min(RANK_COUNT - 1),
            _ => 0,
        }
    }
}

pub fn clamp_entropy(entropy: f64) -> f64 {
    if entropy.is_nan() {
        0.0
    } else {
        entropy.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub entropy: f64,
}

impl Settings {
    pub fn new(entropy: f64) -> Self {
        Self { entropy: clamp_entropy(entropy) }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self { entropy: DEFAULT_ENTROPY }
    }
}

/// Verrou tenu par l'appelant : empêche deux générations sur une entrée inchangée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    Locked,
    #[default]
    Unlocked,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Locked => "locked",
            GateState::Unlocked => "unlocked",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        if s == "locked" { GateState::Locked } else { GateState::Unlocked }
    }
}
