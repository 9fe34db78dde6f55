use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gator::commands::{self, State};
use gator::config::Config;
use gator::session::Session;
use gator::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "gator", version, about = "Blog aggregator: polls RSS feeds and stores new posts")]
struct Args {
    /// Config file (default: ~/.config/gator/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// List users, marking the current one
    Users,
    /// Delete all users together with their feeds and posts
    Reset,
    /// Register a feed owned by the current user
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List registered feeds
    Feeds,
    /// Fetch feeds on an interval (e.g. 30s, 1m, 1h30m) until Ctrl-C
    Agg { interval: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    ensure_db_dir(&config.db_url)?;

    let db = Database::connect(&config.db_url)
        .await
        .context("Failed to open database")?;
    let mut state = State {
        db,
        config,
        config_path,
    };

    let mut out = std::io::stdout();
    match args.command {
        Command::Register { name } => commands::register(&mut state, &name, &mut out).await?,
        Command::Login { name } => commands::login(&mut state, &name, &mut out).await?,
        Command::Users => commands::users(&state, &mut out).await?,
        Command::Reset => commands::reset(&state, &mut out).await?,
        Command::AddFeed { name, url } => {
            let session = Session::resolve(&state.db, &state.config).await?;
            commands::add_feed(&state, &session, &name, &url, &mut out).await?
        }
        Command::Feeds => commands::feeds(&state, &mut out).await?,
        Command::Agg { interval } => {
            commands::agg(&state, interval.as_deref(), &mut out).await?;
        }
    }

    Ok(())
}

/// Create the directory of a file-backed `sqlite:` URL so SQLite can create
/// the database file in it.
fn ensure_db_dir(db_url: &str) -> Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite:") else {
        return Ok(());
    };
    let path = path.trim_start_matches("//");
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }

    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
            restrict_permissions(dir);
        }
    }
    Ok(())
}

/// Set directory permissions on Unix (user-only access)
fn restrict_permissions(dir: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }
    #[cfg(not(unix))]
    let _ = dir;
}
