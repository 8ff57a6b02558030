use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use training_catalog::{
    get_database_path, init_logging, insert_categories, load_catalog, load_config, load_csv,
    set_training_flag, setup_database, upgrade_schema, CategoryId,
};

#[derive(Parser)]
#[command(name = "training-catalog")]
#[command(about = "Course categories as a training hierarchy")]
#[command(version)]
struct Cli {
    /// Configuration file (default: config.toml next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables and upgrade legacy ones
    Init,

    /// Import category rows (id,name,description,parent) from a CSV file
    Import {
        csv: PathBuf,
    },

    /// List categories with their hierarchy and training flag
    List {
        #[arg(long)]
        json: bool,
    },

    /// List the categories flagged as trainings
    Trainings {
        #[arg(long)]
        json: bool,
    },

    /// Flag or unflag a category as a training
    SetTraining {
        id: i64,
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.log);

    let db_path = cli.db.unwrap_or_else(|| get_database_path(&config));

    match cli.command {
        Commands::Init => run_init(&db_path),
        Commands::Import { csv } => run_import(&db_path, &csv),
        Commands::List { json } => run_list(&db_path, json),
        Commands::Trainings { json } => run_trainings(&db_path, json),
        Commands::SetTraining { id, value } => run_set_training(&db_path, CategoryId(id), value),
    }
}

fn open_database(db_path: &Path) -> Result<Connection> {
    if !db_path.exists() {
        eprintln!("❌ Database not found at {:?}", db_path);
        eprintln!("   Run: training-catalog init");
        std::process::exit(1);
    }

    Connection::open(db_path).with_context(|| format!("Failed to open {}", db_path.display()))
}

fn run_init(db_path: &Path) -> Result<()> {
    println!("🔧 Setting up database...");
    let mut conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let applied = upgrade_schema(&mut conn)?;
    for step in &applied {
        println!("✓ {}", step);
    }
    setup_database(&conn)?;

    println!("✓ Database ready at {:?} ({} upgrade steps applied)", db_path, applied.len());
    Ok(())
}

fn run_import(db_path: &Path, csv_path: &Path) -> Result<()> {
    println!("📂 Loading CSV...");
    let rows = load_csv(csv_path)?;
    println!("✓ Loaded {} category rows from CSV", rows.len());

    let conn = open_database(db_path)?;
    let inserted = insert_categories(&conn, &rows)?;

    println!("✓ Inserted: {} categories", inserted);
    println!("✓ Skipped duplicates: {}", rows.len() - inserted);
    Ok(())
}

fn run_list(db_path: &Path, json: bool) -> Result<()> {
    let conn = open_database(db_path)?;
    let catalog = load_catalog(&conn)?;
    let views = catalog.category_views()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    println!("{:>6}  {:<8}  {}", "ID", "TRAINING", "HIERARCHY");
    for view in &views {
        let flag = if view.is_training { "yes" } else { "" };
        println!("{:>6}  {:<8}  {}", view.id.get(), flag, view.hierarchy);
    }
    println!("\n✓ {} categories", views.len());
    Ok(())
}

fn run_trainings(db_path: &Path, json: bool) -> Result<()> {
    let conn = open_database(db_path)?;
    let catalog = load_catalog(&conn)?;

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.trainings.trainings())?);
        return Ok(());
    }

    for training in catalog.trainings.trainings() {
        let hierarchy = catalog.store.hierarchy(training.category_id)?;
        println!("🎓 {:>6}  {}", training.category_id.get(), hierarchy);
    }
    println!("\n✓ {} trainings", catalog.trainings.len());
    Ok(())
}

fn run_set_training(db_path: &Path, id: CategoryId, value: bool) -> Result<()> {
    let mut conn = open_database(db_path)?;
    let mut catalog = load_catalog(&conn)?;

    let changed = set_training_flag(
        &mut conn,
        &mut catalog.store,
        &mut catalog.trainings,
        id,
        value,
    )?;

    if changed {
        println!("✅ Category {} training flag set to {}", id, value);
    } else {
        println!("✓ Category {} already has training flag {}, nothing to do", id, value);
    }
    Ok(())
}
