use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use sneaky::announcer::RoutineTable;
use sneaky::db::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Utility commands for sneaky management.
#[derive(Parser, Debug)]
#[command(name = "sneaky-manage", version)]
struct Cli {
    /// Setup SQL tables
    #[arg(long)]
    setup_db: bool,

    /// Seed the routine announcer from a TOML routine table
    #[arg(long, value_name = "FILE")]
    import_routine: Option<PathBuf>,

    /// Database path; defaults to DATABASE_URL or data/sneaky.db
    #[arg(long)]
    database: Option<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sneaky=info,warn")),
        )
        .init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if !cli.setup_db && cli.import_routine.is_none() {
        Cli::command().print_help()?;
        return Ok(());
    }

    let url = cli
        .database
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "data/sneaky.db".to_string());
    let db = Database::open(&url)?;
    // Creates cog_config if missing
    db.execute_init()?;
    if cli.setup_db {
        info!("Database ready at {}", url);
    }

    if let Some(path) = cli.import_routine {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Could not read {}: {}", path.display(), e))?;
        let config = RoutineTable::from_toml(&text)?.import(&db)?;
        info!(
            "Imported {} weekday rows and {} links from {}",
            config.routine.len(),
            config.links.len(),
            path.display()
        );
    }

    Ok(())
}
