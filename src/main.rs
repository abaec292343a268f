//! Rowmap CLI - inspect a convention-mapped SQLite database

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use rowmap::config::{self, RowmapConfig};
use rowmap::ui;
use rowmap::{Attribute, Entity, Session, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rowmap")]
#[command(version)]
#[command(about = "Convention-driven entity mapping over SQLite")]
#[command(long_about = r#"
Rowmap reads a registry of entity types from rowmap.toml and derives
every table, key and junction name from it.

Example usage:
  rowmap init --database blog.db
  rowmap tables
  rowmap list --entity User
  rowmap get --entity Post --id 2 --attribute tags
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config skeleton
    Init {
        /// Path to the database file
        #[arg(short, long, default_value = "rowmap.db")]
        database: String,

        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show the storage layout derived for every entity
    Tables,

    /// List every row of an entity type
    List {
        /// Entity type name
        #[arg(short, long)]
        entity: String,
    },

    /// Show one entity, or one of its attributes
    Get {
        /// Entity type name
        #[arg(short, long)]
        entity: String,

        /// Row id
        #[arg(short, long)]
        id: i64,

        /// Column or relation name
        #[arg(short, long)]
        attribute: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);

    match cli.command {
        Commands::Init { database, force } => {
            let config = RowmapConfig {
                database: Some(database),
                ..RowmapConfig::default()
            };
            config::write_config(&config_path, &config, force)?;
            tracing::info!("Wrote {}", config_path.display());
        }

        Commands::Tables => {
            let config = require_config(&config_path)?;
            let schema = config.schema()?;
            if cli.json {
                let layout: Vec<_> = schema
                    .descriptors()
                    .map(|d| {
                        serde_json::json!({
                            "entity": d.name,
                            "table": d.table,
                            "key": d.id_column,
                            "columns": d.columns.iter().map(|c| &c.storage).collect::<Vec<_>>(),
                            "foreign_keys": d.parents.iter().map(|p| &p.storage).collect::<Vec<_>>(),
                            "junctions": d.siblings.iter().map(|s| &s.junction.table).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&layout)?);
            } else {
                println!("{}", ui::layout_table(&schema));
            }
        }

        Commands::List { entity } => {
            let config = require_config(&config_path)?;
            let session = Session::from_config(&config)?;
            let rows = session.all(&entity)?;
            tracing::info!("{} {} rows", rows.len(), entity);
            print_entities(&session, &rows, cli.json)?;
        }

        Commands::Get { entity, id, attribute } => {
            let config = require_config(&config_path)?;
            let session = Session::from_config(&config)?;
            let mut instance = session.find(&entity, id)?;

            match attribute {
                None => {
                    instance.load(&session)?;
                    print_entities(&session, std::slice::from_ref(&instance), cli.json)?;
                }
                Some(name) => match instance.get(&session, &name)? {
                    Attribute::Value(value) => print_value(&value, cli.json)?,
                    Attribute::Parent(None) => print_value(&Value::Null, cli.json)?,
                    Attribute::Parent(Some(mut parent)) => {
                        parent.load(&session)?;
                        print_entities(&session, std::slice::from_ref(&parent), cli.json)?;
                    }
                    Attribute::Entities(related) => print_entities(&session, &related, cli.json)?,
                },
            }
        }
    }

    Ok(())
}

fn require_config(path: &std::path::Path) -> anyhow::Result<RowmapConfig> {
    config::load_config(Some(path))?.ok_or_else(|| {
        anyhow::anyhow!("no config at {} (run `rowmap init` first)", path.display())
    })
}

fn print_value(value: &Value, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

fn print_entities(session: &Session, entities: &[Entity], json: bool) -> anyhow::Result<()> {
    let snapshots = entities
        .iter()
        .map(|e| e.snapshot(session))
        .collect::<rowmap::Result<Vec<_>>>()?;

    if json {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> = snapshots
            .into_iter()
            .map(|fields| {
                fields
                    .into_iter()
                    .map(|(name, value)| serde_json::to_value(value).map(|v| (name, v)))
                    .collect::<serde_json::Result<_>>()
            })
            .collect::<serde_json::Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&objects)?);
        return Ok(());
    }

    let Some(first) = snapshots.first() else {
        println!("(no rows)");
        return Ok(());
    };
    let header: Vec<String> = first.iter().map(|(name, _)| name.clone()).collect();
    let rows = snapshots
        .iter()
        .map(|fields| {
            header
                .iter()
                .map(|column| {
                    fields
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, value)| value.to_string())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();
    println!("{}", ui::records_table(header, rows));
    Ok(())
}
