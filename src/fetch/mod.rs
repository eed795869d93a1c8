//! Content source adapters
//!
//! A [`SourceAdapter`] turns a configured source into a batch of [`RawItem`]s.
//! The only adapter today is [`RssAdapter`] (RSS with Atom fallback); the
//! trait is the seam for future source kinds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::SourceConfig;
use crate::error::FetchError;

/// A content item as fetched from a source, before ingestion
#[derive(Debug, Clone)]
pub struct RawItem {
    /// Stable identity key, md5 of `feed_url:guid`
    pub natural_key: String,
    /// Item title
    pub title: String,
    /// Plain-text body
    pub body: String,
    /// Original item link
    pub link: Option<String>,
    /// Item author, if the feed carried one
    pub author: Option<String>,
    /// Unix timestamp the item claims it was published
    pub published_at: i64,
}

/// Fetches items from one kind of content source
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch the current batch of items from `source`
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>, FetchError>;
}

/// RSS/Atom feed adapter
pub struct RssAdapter {
    client: reqwest::Client,
}

impl RssAdapter {
    /// Create an adapter with a fresh HTTP client
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for RssAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    async fn fetch(&self, source: &SourceConfig) -> Result<Vec<RawItem>, FetchError> {
        tracing::debug!(source_id = %source.id, url = %source.url, "Fetching feed");

        let response = self
            .client
            .get(&source.url)
            .timeout(source.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Transient {
                source_id: source.id.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                source_id: source.id.clone(),
                status: status.as_u16(),
            });
        }

        let content = response.bytes().await.map_err(|e| FetchError::Transient {
            source_id: source.id.clone(),
            reason: e.to_string(),
        })?;

        // Try RSS first, then fall back to Atom
        match parse_as_rss(source, &content) {
            Ok(items) => Ok(items),
            Err(rss_err) => match parse_as_atom(source, &content) {
                Ok(items) => Ok(items),
                Err(_) => Err(FetchError::MalformedFeed {
                    source_id: source.id.clone(),
                    reason: rss_err,
                }),
            },
        }
    }
}

fn parse_as_rss(source: &SourceConfig, content: &[u8]) -> Result<Vec<RawItem>, String> {
    let channel = rss::Channel::read_from(content).map_err(|e| e.to_string())?;

    let items = channel
        .items()
        .iter()
        .map(|item| {
            let guid = item
                .guid()
                .map(|g| g.value().to_string())
                .or_else(|| item.link().map(String::from))
                .or_else(|| item.title().map(String::from))
                .unwrap_or_default();

            let body_html = item
                .content()
                .or_else(|| item.description())
                .unwrap_or_default();

            RawItem {
                natural_key: natural_key(&source.url, &guid),
                title: item.title().unwrap_or("Untitled").to_string(),
                body: html_to_text(body_html),
                link: item.link().map(String::from),
                author: item.author().map(String::from),
                published_at: item
                    .pub_date()
                    .and_then(parse_rfc2822)
                    .unwrap_or_else(|| Utc::now().timestamp()),
            }
        })
        .collect();

    Ok(items)
}

fn parse_as_atom(source: &SourceConfig, content: &[u8]) -> Result<Vec<RawItem>, String> {
    let feed = atom_syndication::Feed::read_from(content).map_err(|e| e.to_string())?;

    let items = feed
        .entries()
        .iter()
        .map(|entry| {
            let body_html = entry
                .content()
                .and_then(|c| c.value())
                .map(String::from)
                .or_else(|| entry.summary().map(|s| s.value.clone()))
                .unwrap_or_default();

            RawItem {
                natural_key: natural_key(&source.url, entry.id()),
                title: entry.title().value.clone(),
                body: html_to_text(&body_html),
                link: entry.links().first().map(|l| l.href().to_string()),
                author: entry.authors().first().map(|a| a.name().to_string()),
                published_at: entry
                    .published()
                    .map(|d| d.timestamp())
                    .unwrap_or_else(|| entry.updated().timestamp()),
            }
        })
        .collect();

    Ok(items)
}

/// Stable identity key for an item: md5 over `feed_url:guid`
fn natural_key(feed_url: &str, guid: &str) -> String {
    format!("{:x}", md5::compute(format!("{feed_url}:{guid}")))
}

fn parse_rfc2822(date: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(date)
        .map(|d| d.timestamp())
        .ok()
}

/// Reduce HTML to readable plain text
///
/// Drops script/style blocks, strips tags, unescapes the common entities,
/// and collapses runs of whitespace.
pub fn html_to_text(html: &str) -> String {
    use std::sync::OnceLock;

    static BLOCKS: OnceLock<regex::Regex> = OnceLock::new();
    static TAGS: OnceLock<regex::Regex> = OnceLock::new();
    static SPACE: OnceLock<regex::Regex> = OnceLock::new();

    let blocks = BLOCKS.get_or_init(|| {
        regex::Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>")
            .expect("static pattern")
    });
    let tags =
        TAGS.get_or_init(|| regex::Regex::new(r"<[^>]+>").expect("static pattern"));
    let space = SPACE.get_or_init(|| regex::Regex::new(r"\s+").expect("static pattern"));

    let text = blocks.replace_all(html, " ");
    let text = tags.replace_all(&text, " ");
    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    space.replace_all(&text, " ").trim().to_string()
}
