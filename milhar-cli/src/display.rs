use comfy_table::{Table, ContentArrangement, presets::UTF8_FULL, Cell, Color};

use crate::import::ImportResult;
use milhar_db::models::{DrawRecord, HitRecord, HitStatus, RectificationRecord, digits_to_string};
use milhar_engine::analysis::{Analysis, DigitTag};
use milhar_engine::generator::GenerationBundle;
use milhar_engine::projections::ScoredValue;

/// Libellé ordinal d'un rang : "1º" .. "7º".
pub fn rank_label(rank: usize) -> String {
    format!("{}º", rank + 1)
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "—".to_string())
}

pub fn display_draws(draws: &[DrawRecord]) {
    if draws.is_empty() {
        println!("Aucun tirage à afficher.");
        return;
    }

    let mut header = vec!["#".to_string()];
    header.extend((0..7).map(rank_label));
    let mut table = new_table(header.iter().map(String::as_str).collect());

    for (i, draw) in draws.iter().enumerate() {
        let mut row = vec![(i + 1).to_string()];
        row.extend(draw.row_strings());
        table.add_row(row);
    }

    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Total lignes lues : {}", result.total_records);
    println!("  Insérés           : {}", result.inserted);
    println!("  Rejetés           : {}", result.rejected);
    if result.evicted > 0 {
        println!("  Évincés (plafond) : {}", result.evicted);
    }
}

pub fn display_modules(modules: &[Vec<String>]) {
    let mut table = new_table(vec!["Rang", "M1", "M2", "M3"]);
    for rank in 0..7 {
        let mut row = vec![rank_label(rank)];
        for module in modules {
            let raw = module.get(rank).map(String::as_str).unwrap_or("");
            row.push(if raw.is_empty() { "—".to_string() } else { raw.to_string() });
        }
        table.add_row(row);
    }
    println!("{table}");
}

fn display_scored(title: &str, values: &[ScoredValue]) {
    println!("\n── {title} ──");
    let mut table = new_table(vec!["#", "Valeur", "Confiance"]);
    for (i, v) in values.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            v.value.clone(),
            format!("{:.6}", v.confidence),
        ]);
    }
    println!("{table}");
}

pub fn display_bundle(bundle: &GenerationBundle) {
    println!("\n🎯 Resultado (entropie {:.2})\n", bundle.entropy);
    let mut table = new_table(vec!["Rang", "Valeur"]);
    for rank in 0..7 {
        table.add_row(vec![rank_label(rank), digits_to_string(bundle.result.row(rank))]);
    }
    println!("{table}");

    println!("\n🎲 Candidats\n");
    let mut table = new_table(vec!["#", "Séquence", "Confiance"]);
    for (i, c) in bundle.candidates.iter().enumerate() {
        table.add_row(vec![
            format!("REFORÇO #{}", i + 1),
            digits_to_string(&c.sequence),
            format!("{:.6}", c.confidence),
        ]);
    }
    println!("{table}");

    let advanced = &bundle.advanced_predictions;
    display_scored("Dezenas elite", &advanced.elite_tens);
    display_scored("Dezenas super", &advanced.super_tens);
    display_scored("Centenas", &advanced.hundreds);

    display_analysis(&bundle.analysis);
}

pub fn display_analysis(analysis: &Analysis) {
    println!("\n📊 Analyse sur {} entrée(s), {} chiffres\n", analysis.entries_analyzed, analysis.total_digits);

    let mut table = new_table(vec!["Chiffre", "Fréquence", "Part", "Retard", "Tag"]);
    let mut sorted = analysis.digits.clone();
    sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency));

    for stat in &sorted {
        let color = match stat.tag {
            DigitTag::Hot => Color::Green,
            DigitTag::Cold => Color::Red,
            DigitTag::Normal => Color::White,
        };
        table.add_row(vec![
            Cell::new(stat.digit),
            Cell::new(stat.frequency),
            Cell::new(format!("{:.2} %", stat.share * 100.0)),
            Cell::new(stat.gap),
            Cell::new(stat.tag.to_string()).fg(color),
        ]);
    }
    println!("{table}");

    let join = |digits: Vec<u8>| {
        if digits.is_empty() {
            "—".to_string()
        } else {
            digits.iter().map(u8::to_string).collect::<Vec<_>>().join(" ")
        }
    };
    println!("Chauds : {}", join(analysis.hot()));
    println!("Froids : {}", join(analysis.cold()));
}

pub fn display_feedback(hits: &[HitRecord], rectifications: &[RectificationRecord]) {
    println!("\n✅ Acertos ({})\n", hits.len());
    if hits.is_empty() {
        println!("Aucun acerto enregistré.");
    } else {
        let mut table = new_table(vec!["Date", "Valeur", "Type", "Position", "Statut"]);
        for hit in hits {
            let color = match hit.status {
                HitStatus::FullHit => Color::Green,
                HitStatus::NearHit => Color::Yellow,
            };
            table.add_row(vec![
                Cell::new(format_timestamp(hit.timestamp)),
                Cell::new(&hit.value),
                Cell::new(hit.rank_type),
                Cell::new(format!("{}º", hit.position)),
                Cell::new(hit.status).fg(color),
            ]);
        }
        println!("{table}");
    }

    println!("\n🔧 Rectifications ({})\n", rectifications.len());
    if rectifications.is_empty() {
        println!("Aucune rectification enregistrée.");
    } else {
        let mut table = new_table(vec!["Date", "Rang", "Type", "Généré", "Réel"]);
        for rect in rectifications {
            table.add_row(vec![
                format_timestamp(rect.timestamp),
                rect.rank_label.clone(),
                rect.rank_type.to_string(),
                rect.generated.clone(),
                rect.actual.clone(),
            ]);
        }
        println!("{table}");
    }
}
