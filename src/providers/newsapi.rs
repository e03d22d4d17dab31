// src/providers/newsapi.rs
//! NewsAPI.org provider (API-keyed JSON endpoint).

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::providers::{
    http_client, ArticleCandidate, FetchError, NewsProvider,
};

const BASE_URL: &str = "https://newsapi.org/v2";
const PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "urlToImage")]
    url_to_image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<NewsApiSource>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    name: Option<String>,
}

pub struct NewsApiProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { api_key: String },
}

impl NewsApiProvider {
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
            "ai" => r#"artificial intelligence OR "machine learning" OR "deep learning""#,
            "data-security" => r#""data security" OR cybersecurity OR "data breach""#,
            "data-governance" => r#""data governance" OR "data management" OR compliance"#,
            "data-privacy" => r#""data privacy" OR GDPR OR "privacy regulation""#,
            "data-engineering" => r#""data engineering" OR "data pipeline" OR "big data""#,
            "business-intelligence" => r#""business intelligence" OR "BI tools""#,
            "business-analytics" => r#""business analytics" OR analytics"#,
            "customer-data-platform" => r#""customer data platform" OR CDP"#,
            "data-centers" => r#""data centers" OR "data centre""#,
            "cloud-computing" => r#""cloud computing" OR AWS OR Azure OR "Google Cloud""#,
            "magazines" => "technology",
            other => other,
        }
    }

    fn parse_body(body: &str, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        let parsed: NewsApiResponse =
            serde_json::from_str(body).map_err(|e| FetchError::parse(e.to_string()))?;

        let out: Vec<ArticleCandidate> = parsed
            .articles
            .into_iter()
            .map(|a| ArticleCandidate {
                title: a.title.unwrap_or_default(),
                description: a.description.unwrap_or_default(),
                url: a.url.unwrap_or_default(),
                image: a.url_to_image.filter(|s| !s.is_empty()),
                published_at: a.published_at,
                source: a
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "NewsAPI".to_string()),
                category: category.to_string(),
            })
            .collect();

        counter!("ingest_events_total", "provider" => "newsapi").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl NewsProvider for NewsApiProvider {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body, category),
            Mode::Http { api_key } => {
                let page_size = PAGE_SIZE.to_string();
                let resp = http_client()
                    .get(format!("{BASE_URL}/everything"))
                    .query(&[
                        ("q", Self::query_for(category)),
                        ("language", "en"),
                        ("sortBy", "publishedAt"),
                        ("pageSize", page_size.as_str()),
                        ("apiKey", api_key.as_str()),
                    ])
                    .send()
                    .await?;

                let status = resp.status();
                if !status.is_success() {
                    // NewsAPI signals free-tier exhaustion as 426 as well as 429.
                    return Err(FetchError::from_status(status.as_u16()));
                }
                let body = resp.text().await?;
                Self::parse_body(&body, category)
            }
        }
    }

    fn name(&self) -> &'static str {
        "newsapi"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "status": "ok",
        "articles": [
            {
                "title": "Cloud migration accelerates",
                "description": "Enterprises move workloads",
                "url": "https://example.com/cloud-1",
                "urlToImage": "https://example.com/cloud-1.png",
                "publishedAt": "2026-01-22T06:00:00Z",
                "source": {"id": null, "name": "Example Daily"}
            }
        ]
    }"#;

    #[tokio::test]
    async fn parses_fixture() {
        let p = NewsApiProvider::from_fixture(FIXTURE);
        let articles = p.fetch("cloud-computing").await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "Example Daily");
        assert_eq!(
            articles[0].image.as_deref(),
            Some("https://example.com/cloud-1.png")
        );
    }
}
