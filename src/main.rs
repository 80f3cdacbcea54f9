//! EduHub CLI - schema setup, sample data and the query walkthrough

use bson::Bson;
use clap::{Parser, Subcommand};
use eduhub::config::{DEFAULT_DATABASE, DEFAULT_URI};
use eduhub::{demo, ConnectionConfig, EduHub, SchemaRegistry};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eduhub")]
#[command(about = "Schema, sample data and query catalog for the EduHub learning platform", long_about = None)]
struct Cli {
    /// Connection URI (mongodb://, mongodb+srv:// or memory://)
    #[arg(long, env = "EDUHUB_URI", default_value = DEFAULT_URI)]
    uri: String,

    /// Database name
    #[arg(long, env = "EDUHUB_DATABASE", default_value = DEFAULT_DATABASE)]
    database: String,

    /// Directory of YAML schema overrides
    #[arg(long)]
    schemas: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the database and run every catalog operation (default)
    Demo,

    /// Create collections, insert sample data and build indexes
    Setup,

    /// Text search, recommendations, archiving and geospatial queries
    Bonus,

    /// Write every collection to a JSON file
    Export {
        #[arg(short, long, default_value = "eduhub_export.json")]
        output: PathBuf,
    },

    /// Show the collection schemas
    Schemas {
        /// Write each schema to <dir>/<collection>.yaml instead of printing
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let registry = match &cli.schemas {
        Some(dir) => SchemaRegistry::load(dir)?,
        None => SchemaRegistry::eduhub(),
    };

    let command = cli.command.unwrap_or(Commands::Demo);
    if let Commands::Schemas { save } = &command {
        return show_schemas(&registry, save.as_deref());
    }

    let config = ConnectionConfig::new(cli.uri, cli.database);
    println!("Connecting to {} (database '{}')...", config.redacted_uri(), config.database);
    let hub = EduHub::connect(&config).await?.with_schemas(registry);

    let outcome = match command {
        Commands::Demo => demo::run(&hub).await.map_err(anyhow::Error::from),
        Commands::Setup => setup(&hub).await,
        Commands::Bonus => demo::run_bonus(&hub).await.map_err(anyhow::Error::from),
        Commands::Export { output } => export(&hub, &output).await,
        Commands::Schemas { .. } => Ok(()),
    };

    hub.close().await?;
    println!("\nConnection closed.");
    outcome
}

async fn setup(hub: &EduHub) -> anyhow::Result<()> {
    let summary = hub.prepare().await?;
    println!("Collections created with validators.");
    println!("Inserted {} documents:", summary.total());
    println!("  users:       {}", summary.users);
    println!("  courses:     {}", summary.courses);
    println!("  enrollments: {}", summary.enrollments);
    println!("  lessons:     {}", summary.lessons);
    println!("  assignments: {}", summary.assignments);
    println!("  submissions: {}", summary.submissions);
    Ok(())
}

async fn export(hub: &EduHub, output: &Path) -> anyhow::Result<()> {
    let count = hub.export_collections(output).await?;
    println!("Exported {} documents to {}", count, output.display());
    Ok(())
}

fn show_schemas(registry: &SchemaRegistry, save: Option<&Path>) -> anyhow::Result<()> {
    if let Some(dir) = save {
        registry.save(dir)?;
        println!("Saved {} schemas to {}", registry.len(), dir.display());
        return Ok(());
    }

    for schema in registry.list() {
        let required: Vec<&str> = schema.required_fields().collect();
        println!("--- {} ---", schema.name);
        println!("required: {}", required.join(", "));
        let validator = Bson::Document(schema.validator()).into_relaxed_extjson();
        println!("{}", serde_json::to_string_pretty(&validator)?);
        println!();
    }
    Ok(())
}
