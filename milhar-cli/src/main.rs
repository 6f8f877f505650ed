mod display;
mod import;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use milhar_db::db::{
    count_draws, db_path, fetch_hits, fetch_modules, fetch_rectifications, fetch_window, insert_draw,
    insert_hit, insert_rectification, load_gate, load_settings, load_store, migrate, open_db,
    load_last_bundle, save_gate, save_last_bundle, save_settings, shift_modules,
};
use milhar_db::history::HistoryStore;
use milhar_db::models::{
    GateState, HitRecord, HitStatus, RANK_COUNT, RankType, RectificationRecord, Settings, row_len,
};
use milhar_db::rusqlite::Connection;
use milhar_engine::analysis::analyze;
use milhar_engine::config::{EngineConfig, load_config, save_config};
use milhar_engine::generator::{GenerationBundle, GenerationInput, generate_seeded};
use milhar_engine::snapshot::{Module, merge_snapshot};
use crate::display::{
    display_analysis, display_bundle, display_draws, display_feedback, display_import_summary,
    display_modules, rank_label,
};

#[derive(Parser)]
#[command(name = "milhar", about = "Générateur de milhares pondéré par l'historique")]
struct Cli {
    /// Journalisation détaillée (niveau DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer des tirages depuis un fichier CSV (7 champs séparés par ';', plus ancien d'abord)
    Import {
        /// Chemin vers le fichier CSV
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tirages
    List {
        /// Nombre de tirages à afficher
        #[arg(short, long, default_value = "10")]
        last: u32,
    },

    /// Afficher l'analyse des chiffres (fréquences, retards, chauds/froids)
    Stats {
        /// Fichier de configuration du moteur
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },

    /// Ajouter un tirage complet (7 lignes) à l'historique
    Add {
        /// Les 7 lignes ; demandées une à une si absentes
        rows: Vec<String>,
    },

    /// Coller un module : décale M1 <- M2 <- M3 <- nouveau et l'ajoute à l'historique
    Paste {
        /// Les lignes du module (partielles acceptées) ; demandées si absentes
        rows: Vec<String>,
    },

    /// Afficher les trois modules de saisie
    Modules,

    /// Générer une prédiction
    Generate {
        /// Fichier de configuration du moteur
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Seed pour la reproductibilité
        #[arg(long)]
        seed: Option<u64>,

        /// Générer même si l'entrée n'a pas changé depuis la dernière génération
        #[arg(long)]
        force: bool,
    },

    /// Réafficher la dernière génération
    Last,

    /// Enregistrer un acerto
    Hit {
        /// Valeur confirmée
        value: String,

        /// Type : milhar, centena ou dezena
        #[arg(short, long, default_value = "milhar")]
        rank_type: RankType,

        /// Ligne du résultat (1-6 milhares, 7 centena)
        #[arg(short, long, default_value = "1")]
        position: u8,

        /// Quase acerto (enregistré sans pondérer)
        #[arg(long)]
        near: bool,
    },

    /// Enregistrer une rectification (valeur générée -> valeur réelle)
    Rectify {
        generated: String,
        actual: String,

        /// Type : milhar, centena ou dezena
        #[arg(short, long, default_value = "milhar")]
        rank_type: RankType,

        /// Rang concerné ("1º" .. "7º")
        #[arg(short, long, default_value = "1º")]
        label: String,
    },

    /// Lister les acertos et rectifications
    Feedback,

    /// Afficher ou modifier l'entropie (0.0 - 1.0)
    Entropy {
        #[arg(allow_hyphen_values = true)]
        value: Option<f64>,
    },

    /// Écrire la configuration par défaut du moteur
    InitConfig {
        #[arg(short, long, default_value = "config.json")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let path = db_path();
    let conn = open_db(&path)?;
    migrate(&conn)?;

    match cli.command {
        Command::Import { file } => cmd_import(&conn, &file),
        Command::DbPath => {
            println!("{}", path.display());
            Ok(())
        }
        Command::List { last } => cmd_list(&conn, last),
        Command::Stats { config } => cmd_stats(&conn, &config),
        Command::Add { rows } => cmd_add(&conn, rows),
        Command::Paste { rows } => cmd_paste(&conn, rows),
        Command::Modules => {
            display_modules(&fetch_modules(&conn)?);
            Ok(())
        }
        Command::Generate { config, seed, force } => cmd_generate(&conn, &config, seed, force),
        Command::Last => cmd_last(&conn),
        Command::Hit { value, rank_type, position, near } => {
            cmd_hit(&conn, &value, rank_type, position, near)
        }
        Command::Rectify { generated, actual, rank_type, label } => {
            cmd_rectify(&conn, &generated, &actual, rank_type, &label)
        }
        Command::Feedback => {
            display_feedback(&fetch_hits(&conn)?, &fetch_rectifications(&conn)?);
            Ok(())
        }
        Command::Entropy { value } => cmd_entropy(&conn, value),
        Command::InitConfig { path } => {
            save_config(&EngineConfig::default(), &path)?;
            println!("Configuration écrite dans {}", path.display());
            Ok(())
        }
    }
}

fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        println!("(Pas de fichier de configuration, valeurs par défaut)");
        return Ok(EngineConfig::default());
    }
    load_config(path).with_context(|| format!("Configuration invalide : {:?}", path))
}

/// Modules du plus récent (M3) au plus ancien (M1).
fn load_modules(conn: &Connection) -> Result<Vec<Module>> {
    Ok(fetch_modules(conn)?
        .iter()
        .rev()
        .map(|rows| Module::parse(rows))
        .collect())
}

fn cmd_import(conn: &Connection, file: &Path) -> Result<()> {
    let result = import::import_csv(conn, file)?;
    if result.inserted > 0 {
        save_gate(conn, GateState::Unlocked)?;
    }
    display_import_summary(&result);
    Ok(())
}

fn cmd_list(conn: &Connection, last: u32) -> Result<()> {
    let n = count_draws(conn)?;
    if n == 0 {
        println!("Base vide. Lancez d'abord : milhar import --file <csv>");
        return Ok(());
    }
    let draws = fetch_window(conn, last)?;
    display_draws(&draws);
    Ok(())
}

fn cmd_stats(conn: &Connection, config_path: &Path) -> Result<()> {
    let config = load_engine_config(config_path)?;
    let store = load_store(conn)?;
    let modules = load_modules(conn)?;
    let snapshot = merge_snapshot(&modules, store.window());
    if snapshot.is_empty() {
        println!("Base vide. Lancez d'abord : milhar import --file <csv>");
        return Ok(());
    }
    let (hot, cold) = config.percentiles();
    display_analysis(&analyze(&snapshot, hot, cold));
    Ok(())
}

fn cmd_add(conn: &Connection, rows: Vec<String>) -> Result<()> {
    let rows = if rows.is_empty() { prompt_rows()? } else { rows };

    let mut staging = HistoryStore::new();
    let draw = match staging.ingest(&rows) {
        Ok(draw) => draw,
        Err(e) => bail!("Tirage rejeté : {e}"),
    };

    println!("\nTirage à insérer :");
    display_draws(std::slice::from_ref(&draw));

    let confirm = prompt("\nConfirmer l'insertion ? (o/n) : ")?;
    if confirm.trim().to_lowercase() != "o" {
        println!("Insertion annulée.");
        return Ok(());
    }

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    let evicted = insert_draw(&tx, &draw)?;
    save_gate(&tx, GateState::Unlocked)?;
    tx.commit().context("Échec du commit")?;

    info!(evicted, "tirage ajouté");
    println!("Tirage inséré avec succès.");
    Ok(())
}

fn cmd_paste(conn: &Connection, rows: Vec<String>) -> Result<()> {
    let rows = if rows.is_empty() { prompt_rows()? } else { rows };
    let module = Module::parse(&rows);
    if module.is_empty() {
        bail!("Module vide : aucune ligne valide");
    }

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    shift_modules(&tx, &rows)?;

    // Un module incomplet reste utilisable comme module mais n'entre pas dans l'historique
    let mut staging = HistoryStore::new();
    match staging.ingest(&rows) {
        Ok(draw) => {
            let evicted = insert_draw(&tx, &draw)?;
            info!(evicted, "module ajouté à l'historique");
        }
        Err(e) => warn!(error = %e, "module conservé hors historique"),
    }
    save_gate(&tx, GateState::Unlocked)?;
    tx.commit().context("Échec du commit")?;

    display_modules(&fetch_modules(conn)?);
    Ok(())
}

fn cmd_generate(conn: &Connection, config_path: &Path, seed: Option<u64>, force: bool) -> Result<()> {
    if load_gate(conn)? == GateState::Locked && !force {
        println!("Entrée inchangée depuis la dernière génération.");
        println!("Ajoutez un tirage, un module ou un retour, ou relancez avec --force.");
        return cmd_last(conn);
    }

    let config = load_engine_config(config_path)?;
    let store = load_store(conn)?;
    let modules = load_modules(conn)?;
    let settings = load_settings(conn)?;

    if store.is_empty() && modules.iter().all(Module::is_empty) {
        warn!("aucun historique : distributions uniformes");
    }

    let input = GenerationInput {
        modules: &modules,
        history: store.window(),
        hits: store.hits(),
        rectifications: store.rectifications(),
        entropy: settings.entropy,
    };
    let bundle = generate_seeded(config, &input, seed);
    display_bundle(&bundle);

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    save_last_bundle(&tx, &bundle)?;
    save_gate(&tx, GateState::Locked)?;
    tx.commit().context("Échec du commit")?;
    Ok(())
}

fn cmd_last(conn: &Connection) -> Result<()> {
    match load_last_bundle::<GenerationBundle>(conn)? {
        Some(bundle) => display_bundle(&bundle),
        None => println!("Aucune génération enregistrée. Lancez : milhar generate"),
    }
    Ok(())
}

fn cmd_hit(conn: &Connection, value: &str, rank_type: RankType, position: u8, near: bool) -> Result<()> {
    let status = if near { HitStatus::NearHit } else { HitStatus::FullHit };
    let hit = HitRecord::new(value, rank_type, position, status)
        .context("Acerto invalide")?;

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    insert_hit(&tx, &hit)?;
    save_gate(&tx, GateState::Unlocked)?;
    tx.commit().context("Échec du commit")?;

    println!("{} {} {} enregistré ({}).", hit.status, hit.rank_type, hit.value, rank_label(hit.target_rank()));
    Ok(())
}

fn cmd_rectify(
    conn: &Connection,
    generated: &str,
    actual: &str,
    rank_type: RankType,
    label: &str,
) -> Result<()> {
    let rect = RectificationRecord::new(generated, actual, rank_type, label)
        .context("Rectification invalide")?;

    let tx = conn.unchecked_transaction()
        .context("Impossible de démarrer la transaction")?;
    insert_rectification(&tx, &rect)?;
    save_gate(&tx, GateState::Unlocked)?;
    tx.commit().context("Échec du commit")?;

    println!(
        "Rectification {} : {} -> {} ({}).",
        rect.rank_type, rect.generated, rect.actual, rank_label(rect.target_rank())
    );
    Ok(())
}

fn cmd_entropy(conn: &Connection, value: Option<f64>) -> Result<()> {
    let Some(requested) = value else {
        println!("Entropie : {:.2}", load_settings(conn)?.entropy);
        return Ok(());
    };

    let settings = Settings::new(requested);
    if settings.entropy != requested {
        warn!(requested, used = settings.entropy, "entropie bornée à [0, 1]");
    }
    save_settings(conn, &settings)?;
    save_gate(conn, GateState::Unlocked)?;
    println!("Entropie : {:.2}", settings.entropy);
    Ok(())
}

fn prompt(msg: &str) -> Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Erreur de lecture")?;
    Ok(input.trim().to_string())
}

fn prompt_rows() -> Result<Vec<String>> {
    (0..RANK_COUNT)
        .map(|rank| prompt(&format!("{} ({} chiffres) : ", rank_label(rank), row_len(rank))))
        .collect()
}
