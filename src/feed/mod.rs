//! RSS retrieval and decoding.
//!
//! - [`parser`] - Streaming RSS 2.0 parsing with `quick-xml`
//! - [`fetcher`] - HTTP GET with a caller-supplied timeout and a size cap
//!
//! The ingestion cycle only sees the [`FeedFetcher`] trait; [`HttpFeedFetcher`]
//! is the production implementation.

mod fetcher;
mod parser;

pub use fetcher::{FeedFetcher, FetchError, HttpFeedFetcher};
pub use parser::{parse_rss, ParseError, ParsedFeed, RawFeedItem};
