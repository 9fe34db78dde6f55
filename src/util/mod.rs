//! Small helpers shared by the command handlers.
//!
//! - **URL validation**: reject feed URLs the fetcher could never retrieve

mod url_validator;

pub use url_validator::{validate_feed_url, UrlValidationError};
