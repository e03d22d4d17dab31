// src/providers/gnews.rs
//! GNews.io provider (API-keyed JSON endpoint).

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;

use crate::providers::{
    http_client, ArticleCandidate, FetchError, NewsProvider,
};

const BASE_URL: &str = "https://gnews.io/api/v4";
/// GNews free tier caps results at 10 per request.
const MAX_RESULTS: u32 = 10;

#[derive(Debug, Deserialize)]
struct GNewsResponse {
    #[serde(default)]
    articles: Vec<GNewsArticle>,
}

#[derive(Debug, Deserialize)]
struct GNewsArticle {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    image: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    source: Option<GNewsSource>,
}

#[derive(Debug, Deserialize)]
struct GNewsSource {
    name: Option<String>,
}

pub struct GNewsProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { api_key: String },
}

impl GNewsProvider {
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                api_key: api_key.into(),
            },
        }
    }

    /// Parse a canned JSON body instead of calling the network.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn query_for(category: &str) -> &str {
        match category {
            "ai" => "artificial intelligence machine learning",
            "data-security" => "data security cybersecurity",
            "data-governance" => "data governance compliance",
            "data-privacy" => "data privacy GDPR",
            "data-engineering" => "data engineering pipeline",
            "business-intelligence" => "business intelligence BI",
            "business-analytics" => "business analytics",
            "customer-data-platform" => "customer data platform CDP",
            "data-centers" => "data centers infrastructure",
            "cloud-computing" => "cloud computing AWS Azure Google Cloud",
            "magazines" => "technology news",
            other => other,
        }
    }

    fn parse_body(body: &str, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        let parsed: GNewsResponse =
            serde_json::from_str(body).map_err(|e| FetchError::parse(e.to_string()))?;

        let out: Vec<ArticleCandidate> = parsed
            .articles
            .into_iter()
            .map(|a| ArticleCandidate {
                title: a.title.unwrap_or_default(),
                description: a.description.unwrap_or_default(),
                url: a.url.unwrap_or_default(),
                image: a.image.filter(|s| !s.is_empty()),
                published_at: a.published_at,
                source: a
                    .source
                    .and_then(|s| s.name)
                    .unwrap_or_else(|| "GNews".to_string()),
                category: category.to_string(),
            })
            .collect();

        counter!("ingest_events_total", "provider" => "gnews").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl NewsProvider for GNewsProvider {
    async fn fetch(&self, category: &str) -> Result<Vec<ArticleCandidate>, FetchError> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_body(body, category),
            Mode::Http { api_key } => {
                let max = MAX_RESULTS.to_string();
                let resp = http_client()
                    .get(format!("{BASE_URL}/search"))
                    .query(&[
                        ("q", Self::query_for(category)),
                        ("lang", "en"),
                        ("country", "us"),
                        ("max", max.as_str()),
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
        "gnews"
    }
}
