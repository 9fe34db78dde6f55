//! In-memory collaborators for exercising the cycle and scheduler without
//! SQLite or HTTP.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use crate::feed::{FeedFetcher, FetchError, ParsedFeed, RawFeedItem};
use crate::storage::{Feed, FeedStore, Post, PostInsertError, PostStore, StoreError};

#[derive(Default)]
pub(crate) struct MemoryFeeds {
    pub feeds: Mutex<Vec<Feed>>,
    pub fail_select: bool,
    pub fail_mark: bool,
}

impl MemoryFeeds {
    pub fn with(feeds: Vec<Feed>) -> Self {
        Self {
            feeds: Mutex::new(feeds),
            ..Default::default()
        }
    }
}

#[async_trait]
impl FeedStore for MemoryFeeds {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        if self.fail_select {
            return Err(StoreError::Schema("select broken".into()));
        }
        let feeds = self.feeds.lock().unwrap();
        Ok(feeds
            .iter()
            .min_by_key(|f| (f.last_fetched_at.is_some(), f.last_fetched_at, f.created_at))
            .cloned())
    }

    async fn mark_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.fail_mark {
            return Err(StoreError::NotFound(feed_id.to_string()));
        }
        let mut feeds = self.feeds.lock().unwrap();
        let feed = feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or_else(|| StoreError::NotFound(feed_id.to_string()))?;
        feed.last_fetched_at = Some(at);
        feed.updated_at = at;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryPosts {
    pub posts: Mutex<Vec<Post>>,
    pub broken_urls: HashSet<String>,
}

#[async_trait]
impl PostStore for MemoryPosts {
    async fn create_post(&self, post: &Post) -> Result<Post, PostInsertError> {
        if self.broken_urls.contains(&post.url) {
            return Err(StoreError::Schema("disk full".into()).into());
        }
        let mut posts = self.posts.lock().unwrap();
        if posts.iter().any(|p| p.url == post.url) {
            return Err(PostInsertError::DuplicateUrl {
                url: post.url.clone(),
            });
        }
        posts.push(post.clone());
        Ok(post.clone())
    }
}

/// Returns the same outcome for every URL, optionally after a delay.
pub(crate) struct StaticFetcher {
    result: fn() -> Result<ParsedFeed, FetchError>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new(result: fn() -> Result<ParsedFeed, FetchError>) -> Self {
        Self {
            result,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(result: fn() -> Result<ParsedFeed, FetchError>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(result)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl FeedFetcher for StaticFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<ParsedFeed, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.result)()
    }
}

pub(crate) fn item(title: &str, link: &str, pub_date: &str) -> RawFeedItem {
    RawFeedItem {
        title: title.to_string(),
        link: link.to_string(),
        description: String::new(),
        pub_date: pub_date.to_string(),
    }
}

/// One dated item plus one item without a title
pub(crate) fn two_items() -> Result<ParsedFeed, FetchError> {
    Ok(ParsedFeed {
        channel_title: "Blog".to_string(),
        items: vec![
            item("A", "https://x/a", "Mon, 02 Jan 2006 15:04:05 -0700"),
            item("", "https://x/b", ""),
        ],
        ..Default::default()
    })
}

pub(crate) fn not_found() -> Result<ParsedFeed, FetchError> {
    Err(FetchError::HttpStatus(404))
}

pub(crate) fn test_feed(name: &str, last_fetched_at: Option<DateTime<Utc>>) -> Feed {
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Feed {
        id: Uuid::new_v4(),
        name: name.to_string(),
        url: format!("https://example.com/{}.xml", name),
        owner_user_id: Uuid::new_v4(),
        created_at: created,
        updated_at: created,
        last_fetched_at,
    }
}
