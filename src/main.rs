//! errstore - maintenance CLI for the error store

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use errstore::{
    config::{default_sqlite_connection_string, get_config_dir, load_config, render_config, Config, StoreKind},
    open_store, ErrorRecord, ErrorStore,
};

#[derive(Parser)]
#[command(name = "errstore")]
#[command(version)]
#[command(about = "Relational error store with rollup of duplicate exceptions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to <config dir>/errstore/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Connection string, overrides the configured one
    #[arg(long, env = "ERRSTORE_CONNECTION_STRING")]
    connection_string: Option<String>,

    /// Backend: sqlite, postgres or memory
    #[arg(long)]
    kind: Option<StoreKind>,

    /// Application namespace
    #[arg(short, long)]
    app: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the errors table if missing
    Init,
    /// Log an error read as JSON from a file, or stdin with "-"
    Log { input: PathBuf },
    /// List active errors, newest first
    List {
        #[arg(short, long)]
        max: Option<u32>,
    },
    /// Count active errors
    Count {
        /// Only errors created at or after this RFC 3339 timestamp
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,
    },
    /// Show one error, deleted or not
    Get { guid: Uuid },
    /// Protect errors from deletion (also undeletes them)
    Protect {
        #[arg(required = true)]
        guids: Vec<Uuid>,
    },
    /// Soft delete errors
    Delete {
        #[arg(required = true)]
        guids: Vec<Uuid>,
    },
    /// Soft delete every unprotected error of the application
    DeleteAll,
    /// Permanently remove an error
    HardDelete { guid: Uuid },
    /// Show effective configuration
    Config,
}

fn parse_since(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{}': {}", s, e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "errstore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = effective_config(&cli)?;

    if let Commands::Config = cli.command {
        println!("errstore configuration");
        println!("======================");
        println!("Config directory: {}", get_config_dir().display());
        println!();
        print!("{}", render_config(&config)?);
        return Ok(());
    }

    let store = open_store(&config.store, &config.connection_strings)
        .await
        .context("failed to open error store")?;

    run(cli.command, store.as_ref()).await
}

/// File and environment settings with command line overrides applied
fn effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = load_config(cli.config.as_deref())?;

    if let Some(kind) = cli.kind {
        config.store.kind = kind;
    }
    if let Some(app) = &cli.app {
        config.store.application_name = app.clone();
    }
    if let Some(cs) = &cli.connection_string {
        config.store.connection_string = Some(cs.clone());
    }
    if config.store.kind == StoreKind::Sqlite
        && config.store.connection_string.is_none()
        && config.store.connection_string_name.is_none()
    {
        config.store.connection_string = Some(default_sqlite_connection_string());
    }

    Ok(config)
}

async fn run(command: Commands, store: &dyn ErrorStore) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            println!("{} ready for '{}'", store.name(), store.application_name());
        }
        Commands::Log { input } => {
            let mut error = read_record(&input)?;
            store.log(&mut error).await?;
            println!("{}", error.guid);
        }
        Commands::List { max } => {
            let errors = store.list(None, max).await?;
            println!("{}", serde_json::to_string_pretty(&errors)?);
        }
        Commands::Count { since } => {
            println!("{}", store.count(None, since).await?);
        }
        Commands::Get { guid } => match store.get(guid).await? {
            Some(error) => println!("{}", serde_json::to_string_pretty(&error)?),
            None => anyhow::bail!("error {} not found", guid),
        },
        Commands::Protect { guids } => {
            report(store.protect_many(&guids).await?, "protected");
        }
        Commands::Delete { guids } => {
            report(store.delete_many(&guids).await?, "deleted");
        }
        Commands::DeleteAll => {
            report(store.delete_all(None).await?, "deleted");
        }
        Commands::HardDelete { guid } => {
            report(store.hard_delete(guid).await?, "hard deleted");
        }
        Commands::Config => {}
    }

    Ok(())
}

fn read_record(input: &PathBuf) -> anyhow::Result<ErrorRecord> {
    let json = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?
    };

    serde_json::from_str(&json).context("parsing error record")
}

fn report(affected: bool, action: &str) {
    if affected {
        println!("Errors {}", action);
    } else {
        println!("No errors {}", action);
    }
}
