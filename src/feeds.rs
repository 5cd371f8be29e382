//! Feed retrieval: download each configured RSS/Atom document and keep the
//! items published inside the lookback window.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use feed_rs::model::Link;
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::model::Candidate;

/// Source of the current run's candidate batch. Never fails as a whole:
/// broken feeds are logged and skipped.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_candidates(&self) -> Vec<Candidate>;
}

pub struct HttpFeeds {
    http: Client,
    feeds: Vec<String>,
    lookback: Duration,
}

impl HttpFeeds {
    pub fn new(http: Client, feeds: Vec<String>, lookback_days: i64) -> Self {
        Self {
            http,
            feeds,
            lookback: Duration::days(lookback_days),
        }
    }

    pub fn from_config(http: Client, cfg: &Config) -> Self {
        let feeds = cfg
            .feeds
            .iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        Self::new(http, feeds, cfg.app.lookback_days)
    }

    async fn fetch_one(&self, feed_url: &str) -> Result<Vec<u8>> {
        let res = self
            .http
            .get(feed_url)
            .send()
            .await
            .context("failed to reach feed")?;
        if !res.status().is_success() {
            return Err(anyhow!("feed returned {}", res.status()));
        }
        let body = res.bytes().await.context("failed to read feed body")?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedSource for HttpFeeds {
    #[instrument(skip_all)]
    async fn fetch_candidates(&self) -> Vec<Candidate> {
        let now = Utc::now();
        let mut items = Vec::new();
        for feed_url in &self.feeds {
            info!(feed = %feed_url, "fetching feed");
            let parsed = match self.fetch_one(feed_url).await {
                Ok(body) => parse_feed(&body, now, self.lookback),
                Err(err) => Err(err),
            };
            match parsed {
                Ok(parsed) => {
                    info!(
                        feed = %feed_url,
                        total = parsed.total,
                        kept = parsed.kept.len(),
                        "feed done"
                    );
                    items.extend(parsed.kept);
                }
                Err(err) => warn!(feed = %feed_url, ?err, "feed failed; skipping"),
            }
        }
        info!(total_kept = items.len(), "feeds fetched");
        items
    }
}

/// Result of parsing one feed document.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub total: usize,
    pub kept: Vec<Candidate>,
}

/// Parse an RSS/Atom document and keep items within `lookback` of `now`.
/// Items without a usable date are kept; items without a link are dropped.
pub fn parse_feed(body: &[u8], now: DateTime<Utc>, lookback: Duration) -> Result<ParsedFeed> {
    let feed = feed_rs::parser::parse(body).map_err(|e| anyhow!("failed to parse feed: {}", e))?;
    let total = feed.entries.len();
    let cutoff = now - lookback;

    let kept = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = article_link(&entry.links)?.href.trim().to_string();
            if url.is_empty() {
                return None;
            }
            let published = entry.published.or(entry.updated);
            if matches!(published, Some(ts) if ts < cutoff) {
                return None;
            }
            Some(Candidate {
                url,
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                summary: entry.summary.map(|s| s.content).unwrap_or_default(),
                published: published.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            })
        })
        .collect();

    Ok(ParsedFeed { total, kept })
}

/// The article link: `rel` absent or `alternate`, else the first link.
fn article_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Gadgets</title>
    <link>https://news.example</link>
    <description>test</description>
    <item>
      <title>Fresh phone</title>
      <link>https://news.example/fresh</link>
      <description>New chip, new price.</description>
      <pubDate>Thu, 15 Oct 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Old laptop</title>
      <link>https://news.example/old</link>
      <description>Last month.</description>
      <pubDate>Tue, 01 Sep 2026 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated</title>
      <link>https://news.example/undated</link>
    </item>
  </channel>
</rss>"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn keeps_recent_and_undated_items() {
        let parsed = parse_feed(RSS.as_bytes(), now(), Duration::days(3)).unwrap();
        assert_eq!(parsed.total, 3);
        let urls: Vec<_> = parsed.kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://news.example/fresh", "https://news.example/undated"]
        );

        let fresh = &parsed.kept[0];
        assert_eq!(fresh.title, "Fresh phone");
        assert_eq!(fresh.summary, "New chip, new price.");
        assert!(fresh.published.starts_with("2026-10-15T10:00:00"));
        assert_eq!(parsed.kept[1].published, "");
        assert_eq!(parsed.kept[1].summary, "");
    }

    #[test]
    fn wider_window_keeps_everything() {
        let parsed = parse_feed(RSS.as_bytes(), now(), Duration::days(90)).unwrap();
        assert_eq!(parsed.kept.len(), 3);
    }

    #[test]
    fn atom_entries_are_supported() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom</title>
  <id>urn:feed</id>
  <updated>2026-10-16T09:00:00Z</updated>
  <entry>
    <title>GPU launch</title>
    <id>urn:gpu</id>
    <link href="https://atom.example/gpu"/>
    <updated>2026-10-16T09:00:00Z</updated>
    <summary>Specs inside.</summary>
  </entry>
</feed>"#;
        let parsed = parse_feed(atom.as_bytes(), now(), Duration::days(3)).unwrap();
        assert_eq!(parsed.kept.len(), 1);
        assert_eq!(parsed.kept[0].url, "https://atom.example/gpu");
        assert_eq!(parsed.kept[0].summary, "Specs inside.");
    }

    #[test]
    fn atom_prefers_the_alternate_link() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom</title>
  <id>urn:feed</id>
  <updated>2026-10-16T09:00:00Z</updated>
  <entry>
    <title>Chip news</title>
    <id>urn:chip</id>
    <link rel="self" href="https://atom.example/api/chip.xml"/>
    <link rel="replies" href="https://atom.example/chip/comments"/>
    <link rel="alternate" href="https://atom.example/chip"/>
    <updated>2026-10-16T09:00:00Z</updated>
  </entry>
  <entry>
    <title>Only self</title>
    <id>urn:self</id>
    <link rel="self" href="https://atom.example/api/self.xml"/>
    <updated>2026-10-16T09:00:00Z</updated>
  </entry>
</feed>"#;
        let parsed = parse_feed(atom.as_bytes(), now(), Duration::days(3)).unwrap();
        let urls: Vec<_> = parsed.kept.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://atom.example/chip", "https://atom.example/api/self.xml"]
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_feed(b"not a feed", now(), Duration::days(3)).is_err());
    }
}
