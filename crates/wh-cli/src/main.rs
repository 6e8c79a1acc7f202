//! Wahapedia import CLI
//!
//! Command-line tool for importing Wahapedia CSV exports into a JSON-backed
//! entity store.

mod logging;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use wh_core::{
    delete_entities, parse_csv, scan_sources, EntityStore, EntityType, ImportConfig, ImportRun,
    MemoryStore, ParseOptions, StatusLevel,
};

#[derive(Parser)]
#[command(name = "wh-cli")]
#[command(about = "Wahapedia CSV importer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import the configured sources into a store
    Import {
        /// Path to import configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the store file (JSON), created if missing
        #[arg(short, long)]
        store: PathBuf,

        /// Overwrite existing entities that are not locked
        #[arg(short, long)]
        update: bool,

        /// Records reconciled per step
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Parse a single CSV file with an entity type's column mapping
    Parse {
        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Entity type whose mapping to apply
        #[arg(short = 't', long = "type")]
        entity_type: EntityType,

        /// Maximum number of records to display
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Scan directories for export files and write a configuration
    Discover {
        /// Root directories to scan
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,

        /// Output path for the configuration file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Create a configuration template with the standard file names
    InitConfig {
        /// Output path for the configuration file
        #[arg(short, long)]
        output: PathBuf,

        /// Directory holding the CSV exports
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Delete every entity of the given types
    Delete {
        /// Path to the store file (JSON)
        #[arg(short, long)]
        store: PathBuf,

        /// Entity types to delete
        #[arg(short = 't', long = "type", required = true)]
        types: Vec<EntityType>,
    },

    /// List stored entities of one type
    List {
        /// Path to the store file (JSON)
        #[arg(short, long)]
        store: PathBuf,

        /// Entity type to list
        #[arg(short = 't', long = "type")]
        entity_type: EntityType,
    },
}

fn main() {
    logging::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> wh_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Import {
            config,
            store,
            update,
            chunk_size,
        } => cmd_import(&config, &store, update, chunk_size),
        Commands::Parse {
            file,
            entity_type,
            limit,
        } => cmd_parse(&file, entity_type, limit),
        Commands::Discover { root, output } => cmd_discover(&root, &output),
        Commands::InitConfig { output, dir } => cmd_init_config(&output, &dir),
        Commands::Delete { store, types } => cmd_delete(&store, &types),
        Commands::List { store, entity_type } => cmd_list(&store, entity_type),
    }
}

fn cmd_import(
    config_path: &Path,
    store_path: &Path,
    update: bool,
    chunk_size: Option<usize>,
) -> wh_core::Result<()> {
    let mut config = ImportConfig::load(config_path)?;
    if update {
        config.update_existing = true;
    }
    if let Some(size) = chunk_size {
        config.chunk_size = size;
    }
    let options = config.to_options()?;
    let sources = config.resolved_sources();

    let mut store = MemoryStore::load(store_path)?;
    let mut run = ImportRun::new(&sources, options)?;

    println!("Importing {} source(s) into {}", sources.len(), store_path.display());
    let queued: Vec<String> = run.remaining().iter().map(|t| t.to_string()).collect();
    println!("Entity types: {}", queued.join(", "));
    while let Some(step) = run.step(&mut store) {
        println!(
            "  {} chunk {}/{}: {} saved, {} errors, {} not updated",
            step.entity_type,
            step.chunk,
            step.total_chunks,
            step.result.saved,
            step.result.errors,
            step.result.existing_not_updated
        );
    }
    store.persist(store_path)?;

    println!();
    let summary = run.summary();
    for message in summary.messages() {
        match message.level {
            StatusLevel::Error => eprintln!("{}", message),
            _ => println!("{}", message),
        }
    }

    Ok(())
}

fn cmd_parse(file: &Path, entity_type: EntityType, limit: usize) -> wh_core::Result<()> {
    let mapping = entity_type.spec().mapping();
    let set = parse_csv(file, Some(&mapping), &ParseOptions::default())?;

    println!("File: {}", file.display());
    println!("Entity type: {}", entity_type);
    println!("Columns: {}", set.columns.join(", "));
    println!("Records: {}", set.len());
    println!();

    for record in set.records.iter().take(limit) {
        println!("{}", serde_json::to_string(record)?);
    }

    if set.len() > limit {
        println!("... ({} more records)", set.len() - limit);
    }

    Ok(())
}

fn cmd_discover(roots: &[PathBuf], output: &Path) -> wh_core::Result<()> {
    let result = scan_sources(roots)?;

    println!("Scanned {} root(s):", result.roots.len());
    for root in &result.roots {
        println!("  {}", root.display());
    }
    println!();
    println!(
        "Found {} sources in {} CSV files",
        result.sources.len(),
        result.total_files
    );
    for (name, path) in &result.sources {
        println!("  {:<18} {}", name, path.display());
    }

    let missing = result.missing();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
        println!("\nMissing: {}", names.join(", "));
    }
    if !result.shadowed.is_empty() {
        println!("\nIgnored duplicates:");
        for path in &result.shadowed {
            println!("  {}", path.display());
        }
    }

    ImportConfig::from_scan(&result).save(output)?;
    println!("\nCreated config file: {}", output.display());

    Ok(())
}

fn cmd_init_config(output: &Path, dir: &Path) -> wh_core::Result<()> {
    let config = ImportConfig::template(dir);
    config.save(output)?;

    println!("Created config file: {}", output.display());
    println!("Sources: {}", config.sources.len());
    println!();
    println!("Edit the file to adjust paths and options, then run:");
    println!(
        "  wh-cli import --config {} --store <store.json>",
        output.display()
    );

    Ok(())
}

fn cmd_delete(store_path: &Path, types: &[EntityType]) -> wh_core::Result<()> {
    let mut store = MemoryStore::load(store_path)?;
    let reports = delete_entities(&mut store, types);
    store.persist(store_path)?;

    for report in &reports {
        println!("Deleted {} {} entities", report.deleted, report.entity_type);
        if report.errors > 0 {
            eprintln!("  {} errors", report.errors);
        }
    }

    Ok(())
}

fn cmd_list(store_path: &Path, entity_type: EntityType) -> wh_core::Result<()> {
    let store = MemoryStore::load(store_path)?;
    let entities = store.load_multiple(entity_type)?;

    println!("{} ({}):", entity_type.spec().label, entities.len());
    for entity in &entities {
        let locked = if entity.is_locked() { " [locked]" } else { "" };
        println!(
            "  #{:<6} {:<16} {}{}",
            entity.id.unwrap_or_default(),
            entity.wid().unwrap_or("-"),
            entity.name().unwrap_or(""),
            locked
        );
    }

    Ok(())
}
