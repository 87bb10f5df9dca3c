mod catalog;
mod scrape;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "eggdb-cli")]
#[command(about = "Egg price collection command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape egg prices for a sample or the full store catalog
    Scrape {
        /// `sample` (randomized subset) or `full` (every location)
        #[arg(long, default_value = "sample")]
        scope: String,

        /// Restrict the run to one chain (case-insensitive)
        #[arg(long)]
        chain: Option<String>,

        /// Fetch, extract, and verify without writing to the database
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Store catalog tools
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Database tools
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum CatalogCommands {
    /// Load and validate the catalog, printing each location's formatted URL
    Check {
        #[arg(long, env = "EGGDB_CATALOG_PATH", default_value = "./config/catalog.yaml")]
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let default_level = std::env::var("EGGDB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Scrape {
            scope,
            chain,
            dry_run,
            json,
        }) => {
            let config = eggdb_core::load_app_config()?;
            scrape::run_scrape(&config, &scope, chain.as_deref(), dry_run, json).await?;
        }
        Some(Commands::Catalog {
            command: CatalogCommands::Check { path },
        }) => catalog::run_catalog_check(&path)?,
        Some(Commands::Db { command }) => {
            let pool = eggdb_db::connect_pool_from_env().await?;
            match command {
                DbCommands::Ping => {
                    eggdb_db::health_check(&pool).await?;
                    println!("database ok");
                }
                DbCommands::Migrate => {
                    let applied = eggdb_db::run_migrations(&pool).await?;
                    println!("migrations applied: {applied}");
                }
            }
        }
        None => println!("eggdb-cli: run with --help for available commands"),
    }

    Ok(())
}
