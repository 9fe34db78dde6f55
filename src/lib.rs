//! gator: a blog aggregator that polls RSS feeds on an interval and stores
//! new posts in SQLite.
//!
//! The binary in `main.rs` is a thin clap front end over [`commands`].

pub mod commands;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod session;
pub mod storage;
pub mod util;
