// src/providers/newsdata.rs
//! NewsData.io provider (API-keyed JSON endpoint).

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::providers::{
    http_client, ArticleCandidate, FetchError, NewsProvider,
};

const BASE_URL: &str = "https://newsdata.io/api/1";
const MAX_RESULTS: usize = 20;

#[derive(Debug, Deserialize)]
struct NewsDataResponse {
    #[serde(default)]
    results: Vec<NewsDataArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsDataArticle {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    image_url: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    source_id: Option<String>,
}

pub struct NewsDataProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { api_key: String },
}

impl NewsDataProvider {
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                api_key: api_key.into(),
            },
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn query_for(category: &str) -> &str {
        match category {
            "ai" => "artificial intelligence,machine learning",
            "data-security" => "data security,cybersecurity",
            "data-governance" => "data governance,compliance",
            "data-privacy" => "data privacy,GDPR",
            "data-engineering" => "data engineering,big data",
            "business-intelligence" => "business intelligence",
            "business-analytics" => "business analytics",
            "customer-data-platform" => "customer data platform",
            "data-centers" => "data centers",
            "cloud-computing" => "cloud computing,AWS,Azure,Google Cloud",
            "magazines" => "technology",
            other => other,
        }
    }

    fn parse_body(body: &str, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        let parsed: NewsDataResponse =
            serde_json::from_str(body).map_err(|e| FetchError::parse(e.to_string()))?;

        let out: Vec<ArticleCandidate> = parsed
            .results
            .into_iter()
            .take(MAX_RESULTS)
            .map(|a| ArticleCandidate {
                title: a.title.unwrap_or_default(),
                description: a.description.unwrap_or_default(),
                url: a.link.unwrap_or_default(),
                image: a.image_url.filter(|s| !s.is_empty()),
                published_at: a.pub_date,
                source: a.source_id.unwrap_or_else(|| "NewsData".to_string()),
                category: category.to_string(),
            })
            .collect();

        counter!("ingest_events_total", "provider" => "newsdata").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl NewsProvider for NewsDataProvider {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body, category),
            Mode::Http { api_key } => {
                let resp = http_client()
                    .get(format!("{BASE_URL}/news"))
                    .query(&[
                        ("q", Self::query_for(category)),
                        ("language", "en"),
                        ("country", "us"),
                        ("apikey", api_key.as_str()),
                    ])
                    .send()
                    .await?;

                let status = resp.status();
                if !status.is_success() {
                    return Err(FetchError::from_status(status.as_u16()));
                }
                let body = resp.text().await?;
                Self::parse_body(&body, category)
            }
        }
    }

    fn name(&self) -> &'static str {
        "newsdata"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "status": "success",
        "results": [
            {
                "title": "Ransomware wave hits hospitals",
                "description": "Security teams respond",
                "link": "https://example.com/sec-1",
                "image_url": null,
                "pubDate": "2026-01-22 06:00:00",
                "source_id": "example_wire"
            }
        ]
    }"#;

    #[tokio::test]
    async fn parses_fixture() {
        let p = NewsDataProvider::from_fixture(FIXTURE);
        let articles = p.fetch("data-security").await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "example_wire");
        assert_eq!(articles[0].image, None);
    }
}
