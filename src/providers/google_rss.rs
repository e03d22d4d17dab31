// src/providers/google_rss.rs
//! Google News RSS provider. No API key, so it anchors the bottom of every
//! failover chain and guarantees the chain never fully starves.

use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::providers::{
    http_client, ArticleCandidate, FetchError, NewsProvider,
};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<Source>,
}

// Google News emits `<source url="...">Name</source>`; only the text matters.
#[derive(Debug, Deserialize)]
struct Source {
    #[serde(rename = "$text")]
    name: Option<String>,
}

pub struct GoogleNewsRssProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http,
}

impl GoogleNewsRssProvider {
    pub fn new() -> Self {
        Self { mode: Mode::Http }
    }

    /// Parse a canned feed instead of calling the network.
    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn feed_url(category: &str) -> String {
        let query = match category {
            "ai" => "artificial+intelligence+OR+machine+learning",
            "data-security" => "data+security+OR+cybersecurity+OR+data+breach",
            "data-governance" => "data+governance+OR+data+management",
            "data-privacy" => "data+privacy+OR+GDPR+OR+privacy+regulation",
            "data-engineering" => "data+engineering+OR+data+pipeline+OR+big+data",
            "business-intelligence" => "business+intelligence+OR+BI+tools",
            "business-analytics" => "business+analytics",
            "customer-data-platform" => "customer+data+platform+OR+CDP",
            "data-centers" => "data+centers+OR+data+centre",
            "cloud-computing" => "cloud+computing+OR+AWS+OR+Azure+OR+Google+Cloud",
            "magazines" => "technology+magazine",
            other => return format!(
                "https://news.google.com/rss/search?q={}&hl=en-US&gl=US&ceid=US:en",
                other.replace(' ', "+")
            ),
        };
        format!("https://news.google.com/rss/search?q={query}&hl=en-US&gl=US&ceid=US:en")
    }

    fn parse_feed(xml: &str, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        let t0 = std::time::Instant::now();
        let cleaned = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&cleaned).map_err(|e| FetchError::parse(e.to_string()))?;

        let out: Vec<ArticleCandidate> = rss
            .channel
            .item
            .into_iter()
            .map(|it| ArticleCandidate {
                title: it.title.unwrap_or_default(),
                description: it.description.unwrap_or_default(),
                url: it.link.unwrap_or_default(),
                image: None,
                published_at: it.pub_date,
                source: it
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "Google News".to_string()),
                category: category.to_string(),
            })
            .collect();

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_events_total", "provider" => "google_rss").increment(out.len() as u64);
        Ok(out)
    }
}

impl Default for GoogleNewsRssProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsProvider for GoogleNewsRssProvider {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        match &self.mode {
            Mode::Fixture(xml) => Self::parse_feed(xml, category),
            Mode::Http => {
                let resp = http_client().get(Self::feed_url(category)).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::from_status(status.as_u16()));
                }
                let body = resp.text().await?;
                Self::parse_feed(&body, category)
            }
        }
    }

    fn name(&self) -> &'static str {
        "google_rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Search results</title>
    <item>
      <title>AI lab opens new campus</title>
      <link>https://example.com/rss-1</link>
      <pubDate>Thu, 22 Jan 2026 05:58:33 GMT</pubDate>
      <description>Machine learning expansion&nbsp;continues</description>
      <source>Example Tribune</source>
    </item>
    <item>
      <title>Untitled follow-up</title>
      <link>https://example.com/rss-2</link>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn parses_fixture_feed() {
        let p = GoogleNewsRssProvider::from_fixture(FIXTURE);
        let articles = p.fetch("ai").await.unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].source, "Example Tribune");
        assert_eq!(
            articles[0].published_at.as_deref(),
            Some("Thu, 22 Jan 2026 05:58:33 GMT")
        );
        assert_eq!(articles[1].source, "Google News");
    }

    #[tokio::test]
    async fn broken_xml_is_parse_error() {
        let p = GoogleNewsRssProvider::from_fixture("<rss><channel>");
        let err = p.fetch("ai").await.unwrap_err();
        assert_eq!(err.kind, crate::providers::FetchErrorKind::Parse);
    }

    #[test]
    fn unknown_category_builds_search_url() {
        let url = GoogleNewsRssProvider::feed_url("quantum computing");
        assert!(url.contains("q=quantum+computing"));
    }
}
