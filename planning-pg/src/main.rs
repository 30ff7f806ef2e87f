//! Point d'entrée CLI pour planning-pg

use anyhow::Result;
use clap::Parser;
use tracing::{debug, Level};
use tracing_subscriber::{fmt, EnvFilter};

use planning_pg::Config;

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Ingérer des plans KML/KMZ et gérer les affectations zone / block dans PostGIS
#[derive(Parser)]
#[command(name = "planning-pg")]
#[command(author, version)]
#[command(about = "Ingérer des plans KML/KMZ et gérer les affectations zone / block dans PostGIS")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Preset de configuration (default) ou chemin vers un JSON
    #[arg(long, global = true, default_value = "default")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = Config::resolve(&cli.config)?;
    debug!(config = %cli.config, schema = %config.schema, "Configuration loaded");

    match &cli.command {
        Commands::Inspect { input, report } => {
            cli::cmd_inspect(input, report.as_deref(), &config).await?;
        }
        Commands::ToGeojson {
            input,
            output,
            project,
            store,
        } => {
            cli::cmd_to_geojson(input, output, project.as_deref(), store, &config).await?;
        }
        Commands::Match {
            input,
            project,
            selected,
            json,
            store,
        } => {
            cli::cmd_match(input, project, *selected, json.as_deref(), store, &config).await?;
        }
        Commands::AssignZone {
            target,
            zone,
            zone_name,
            store,
        } => {
            cli::cmd_assign_zone(target, zone, zone_name.as_deref(), store, &config).await?;
        }
        Commands::AssignBlock {
            target,
            zone,
            block_id,
            block_name,
            store,
        } => {
            cli::cmd_assign_block(target, zone, block_id.as_deref(), block_name, store, &config)
                .await?;
        }
        Commands::Unassign {
            project,
            zone,
            block,
            store,
        } => {
            cli::cmd_unassign(project, zone.as_deref(), block.as_deref(), store, &config).await?;
        }
        Commands::InitSchema { drop, db } => {
            cli::cmd_init_schema(db, *drop, &config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
