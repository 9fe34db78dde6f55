//! Command handlers behind the CLI.
//!
//! Each handler takes the shared [`State`] and writes its human-readable
//! output to `out`, so tests can capture it.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{parse_interval, Config};
use crate::feed::HttpFeedFetcher;
use crate::ingest::{IngestionCycle, Scheduler, SchedulerSummary};
use crate::session::Session;
use crate::storage::{Database, StoreError};
use crate::util::validate_feed_url;

/// Everything a handler may touch.
pub struct State {
    pub db: Database,
    pub config: Config,
    /// Where `config` is saved after `login` and `register`
    pub config_path: PathBuf,
}

impl State {
    fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.set_current_user(name);
        self.config
            .save(&self.config_path)
            .with_context(|| format!("Failed to save config to {}", self.config_path.display()))
    }
}

// ============================================================================
// Users
// ============================================================================

pub async fn register(state: &mut State, name: &str, out: &mut impl Write) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("User name must not be empty");
    }

    let user = match state.db.create_user(name, Utc::now()).await {
        Ok(user) => user,
        Err(StoreError::Conflict(_)) => bail!("User '{}' already exists", name),
        Err(e) => return Err(e).context("Failed to create user"),
    };
    state.set_current_user(&user.name)?;

    tracing::info!(user = %user.name, id = %user.id, "Registered user");
    writeln!(out, "Registered user: {}", user.name)?;
    Ok(())
}

pub async fn login(state: &mut State, name: &str, out: &mut impl Write) -> Result<()> {
    let user = state
        .db
        .get_user_by_name(name.trim())
        .await
        .context("Failed to look up user")?;
    let Some(user) = user else {
        bail!("User '{}' does not exist", name.trim());
    };
    state.set_current_user(&user.name)?;

    writeln!(out, "Logged in as {}", user.name)?;
    Ok(())
}

pub async fn users(state: &State, out: &mut impl Write) -> Result<()> {
    let users = state.db.list_users().await.context("Failed to list users")?;
    if users.is_empty() {
        writeln!(out, "No users registered, run `register <name>` first")?;
        return Ok(());
    }

    let current = state.config.current_user_name.as_deref();
    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", user.name)?;
        } else {
            writeln!(out, "* {}", user.name)?;
        }
    }
    Ok(())
}

/// Delete every user, and with them every feed and post.
pub async fn reset(state: &State, out: &mut impl Write) -> Result<()> {
    let removed = state.db.reset_users().await.context("Failed to reset users")?;
    tracing::info!(users = removed, "Reset users table");
    writeln!(out, "Removed {} user(s)", removed)?;
    Ok(())
}

// ============================================================================
// Feeds
// ============================================================================

pub async fn add_feed(
    state: &State,
    session: &Session,
    name: &str,
    url: &str,
    out: &mut impl Write,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Feed name must not be empty");
    }
    let url = validate_feed_url(url).with_context(|| format!("Rejected feed URL '{}'", url))?;

    let feed = match state
        .db
        .create_feed(name, url.as_str(), session.user.id, Utc::now())
        .await
    {
        Ok(feed) => feed,
        Err(StoreError::Conflict(_)) => bail!("A feed with URL {} is already registered", url),
        Err(e) => return Err(e).context("Failed to add feed"),
    };

    tracing::info!(feed_id = %feed.id, url = %feed.url, owner = %session.user.name, "Added feed");
    writeln!(out, "Feed created:")?;
    writeln!(out, "ID:        {}", feed.id)?;
    writeln!(out, "Name:      {}", feed.name)?;
    writeln!(out, "URL:       {}", feed.url)?;
    writeln!(out, "Owner:     {}", session.user.name)?;
    Ok(())
}

pub async fn feeds(state: &State, out: &mut impl Write) -> Result<()> {
    let feeds = state.db.list_feeds().await.context("Failed to list feeds")?;
    if feeds.is_empty() {
        writeln!(out, "No feeds registered, run `addfeed <name> <url>` first")?;
        return Ok(());
    }

    for entry in feeds {
        let last = entry
            .feed
            .last_fetched_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        writeln!(out, "Name:         {}", entry.feed.name)?;
        writeln!(out, "URL:          {}", entry.feed.url)?;
        writeln!(out, "Created by:   {}", entry.owner_name)?;
        writeln!(out, "Last fetched: {}", last)?;
        writeln!(out)?;
    }
    Ok(())
}

// ============================================================================
// Aggregation
// ============================================================================

/// Poll feeds every `interval` (or the configured default) until SIGINT or
/// SIGTERM.
pub async fn agg(
    state: &State,
    interval: Option<&str>,
    out: &mut impl Write,
) -> Result<SchedulerSummary> {
    let interval = match interval {
        Some(raw) => parse_interval(raw)?,
        None => state.config.default_interval()?,
    };
    let fetch_timeout = state.config.fetch_timeout()?;

    let fetcher = HttpFeedFetcher::new().context("Failed to create HTTP client")?;
    let store = Arc::new(state.db.clone());
    let cycle = IngestionCycle::new(store.clone(), store, Arc::new(fetcher), fetch_timeout);
    let scheduler = Scheduler::new(interval, cycle)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listener =
        spawn_signal_listener(shutdown_tx).context("Failed to install signal handlers")?;

    writeln!(out, "Collecting feeds every {:?}", scheduler.interval())?;
    out.flush()?;
    let summary = scheduler.run(shutdown_rx).await;
    listener.abort();

    writeln!(
        out,
        "Stopped after {} tick(s): {} post(s) stored, {} failed tick(s)",
        summary.ticks, summary.inserted, summary.failed_ticks
    )?;
    Ok(summary)
}

/// Flip `shutdown` to `true` on the first SIGINT or SIGTERM.
#[cfg(unix)]
fn spawn_signal_listener(shutdown: watch::Sender<bool>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
        let _ = shutdown.send(true);
    }))
}

#[cfg(not(unix))]
fn spawn_signal_listener(shutdown: watch::Sender<bool>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, shutting down gracefully");
                let _ = shutdown.send(true);
            }
            Err(e) => {
                // Keep the sender alive so the scheduler keeps running
                tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    }))
}
