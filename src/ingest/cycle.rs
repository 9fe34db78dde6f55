use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::feed::{FeedFetcher, RawFeedItem};
use crate::storage::{FeedStore, Post, PostInsertError, PostStore, StoreError};

/// `pubDate` layout after the weekday (RFC 1123 with a numeric zone).
const PUB_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Failures that abort a tick before any item is processed.
///
/// Fetch failures are not here: they end the tick normally and are recorded
/// in [`IngestionReport::fetch_error`].
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to select next feed: {0}")]
    SelectFeed(#[source] StoreError),

    #[error("Failed to mark feed {feed_id} as fetched: {source}")]
    MarkFetched {
        feed_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Feed a tick worked on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickFeed {
    pub id: Uuid,
    pub name: String,
}

/// What one tick did.
///
/// For every report `seen == inserted + skipped + duplicate + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    /// `None` on an idle tick (no feeds registered)
    pub feed: Option<TickFeed>,
    pub seen: usize,
    pub inserted: usize,
    /// Items dropped for having an empty title
    pub skipped: usize,
    /// Items whose URL was already stored
    pub duplicate: usize,
    /// Items the post store rejected for any other reason
    pub failed: usize,
    pub fetch_error: Option<String>,
}

impl IngestionReport {
    /// Report for a tick that found no feed to work on.
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.feed.is_none()
    }

    fn for_feed(id: Uuid, name: &str) -> Self {
        Self {
            feed: Some(TickFeed {
                id,
                name: name.to_string(),
            }),
            ..Self::default()
        }
    }
}

/// One feed per tick: select, mark, fetch, normalize, persist.
pub struct IngestionCycle {
    feeds: Arc<dyn FeedStore>,
    posts: Arc<dyn PostStore>,
    fetcher: Arc<dyn FeedFetcher>,
    fetch_timeout: Duration,
}

impl IngestionCycle {
    pub fn new(
        feeds: Arc<dyn FeedStore>,
        posts: Arc<dyn PostStore>,
        fetcher: Arc<dyn FeedFetcher>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            feeds,
            posts,
            fetcher,
            fetch_timeout,
        }
    }

    /// Run a single tick with `now` as the fetch and creation timestamp.
    ///
    /// The selected feed is marked fetched before the HTTP request is made,
    /// so a feed that keeps failing still rotates to the back of the queue.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<IngestionReport, CycleError> {
        let Some(feed) = self
            .feeds
            .next_feed_to_fetch()
            .await
            .map_err(CycleError::SelectFeed)?
        else {
            tracing::debug!("No feeds registered, nothing to fetch");
            return Ok(IngestionReport::idle());
        };

        self.feeds
            .mark_fetched(feed.id, now)
            .await
            .map_err(|source| CycleError::MarkFetched {
                feed_id: feed.id,
                source,
            })?;

        let mut report = IngestionReport::for_feed(feed.id, &feed.name);

        let parsed = match self.fetcher.fetch(&feed.url, self.fetch_timeout).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    feed_id = %feed.id,
                    feed = %feed.name,
                    url = %feed.url,
                    error = %e,
                    "Failed to fetch feed"
                );
                report.fetch_error = Some(e.to_string());
                return Ok(report);
            }
        };

        report.seen = parsed.items.len();
        for raw in parsed.items {
            let Some(post) = normalize_item(raw, feed.id, now) else {
                report.skipped += 1;
                continue;
            };

            match self.posts.create_post(&post).await {
                Ok(_) => report.inserted += 1,
                Err(PostInsertError::DuplicateUrl { url }) => {
                    tracing::debug!(feed_id = %feed.id, url = %url, "Post already stored");
                    report.duplicate += 1;
                }
                Err(PostInsertError::Store(e)) => {
                    tracing::warn!(
                        feed_id = %feed.id,
                        url = %post.url,
                        error = %e,
                        "Failed to store post"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            feed_id = %feed.id,
            feed = %feed.name,
            seen = report.seen,
            inserted = report.inserted,
            skipped = report.skipped,
            duplicate = report.duplicate,
            failed = report.failed,
            "Feed ingested"
        );
        Ok(report)
    }
}

/// Turn a raw item into a post, or `None` if it has no title.
pub fn normalize_item(raw: RawFeedItem, feed_id: Uuid, now: DateTime<Utc>) -> Option<Post> {
    let title = raw.title.trim();
    if title.is_empty() {
        return None;
    }

    let published_at = parse_pub_date(&raw.pub_date).unwrap_or_else(|| {
        if !raw.pub_date.is_empty() {
            tracing::debug!(pub_date = %raw.pub_date, "Unparseable pubDate, using fetch time");
        }
        now
    });
    let description = match raw.description.trim() {
        "" => None,
        d => Some(d.to_string()),
    };

    Some(Post {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        title: title.to_string(),
        url: raw.link.trim().to_string(),
        description,
        published_at,
        feed_id,
    })
}

/// Parse `Mon, 02 Jan 2006 15:04:05 -0700` style dates, normalized to UTC.
///
/// The weekday must be a valid abbreviation but is not checked against the
/// date. The day of month must have two digits.
pub fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    let (weekday, rest) = value.trim().split_once(", ")?;
    if !WEEKDAYS.iter().any(|day| day.eq_ignore_ascii_case(weekday)) {
        return None;
    }

    let day = rest.split(' ').next()?;
    if day.len() != 2 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    DateTime::parse_from_str(rest, PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
