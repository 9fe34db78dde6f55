//! SQLite persistence for users, feeds and posts.
//!
//! [`Database`] owns the connection pool and implements the two collaborator
//! traits the ingestion cycle depends on, [`FeedStore`] and [`PostStore`].

mod feeds;
mod posts;
mod schema;
mod store;
mod types;
mod users;

pub use schema::Database;
pub use store::{FeedStore, PostStore};
pub use types::{Feed, FeedWithOwner, Post, PostInsertError, StoreError, User};
