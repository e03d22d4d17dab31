// src/validate.rs
//! Quality/relevance gates and field sanitization for article candidates.
//!
//! Both gates run before anything reaches the store: the quality gate rejects
//! structurally broken candidates, the relevance gate rejects category
//! pollution ("Apple pie" in a tech category). Accepted candidates are
//! truncated to storage limits and their dates normalized to UTC ISO-8601.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;
use tracing::warn;
use url::Url;

use crate::canonical::url_hash;
use crate::providers::ArticleCandidate;

const TITLE_MIN: usize = 10;
const TITLE_MAX: usize = 500;
const URL_MAX: usize = 2048;
const DESCRIPTION_MAX: usize = 2000;
const IMAGE_MAX: usize = 1000;
const SOURCE_MAX: usize = 200;
const CATEGORY_MAX: usize = 100;
const SLUG_MAX: usize = 200;

const PREMIUM_SOURCES: &[&str] = &[
    "reuters",
    "bloomberg",
    "techcrunch",
    "wired",
    "the verge",
    "zdnet",
    "cnet",
    "ars technica",
];

/// Why the quality gate rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityIssue {
    MissingTitle,
    TitleLength,
    MissingUrl,
    MalformedUrl,
    MissingDate,
}

impl QualityIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityIssue::MissingTitle => "missing_title",
            QualityIssue::TitleLength => "title_length",
            QualityIssue::MissingUrl => "missing_url",
            QualityIssue::MalformedUrl => "malformed_url",
            QualityIssue::MissingDate => "missing_date",
        }
    }
}

/// Gate verdict for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Invalid(QualityIssue),
    Irrelevant,
}

/// Article shape handed to the store after both gates and sanitization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    /// Stable hash of the canonical URL; the store's idempotency key.
    pub key: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub image: Option<String>,
    /// UTC ISO-8601 with `Z` suffix.
    pub published_at: String,
    pub source: String,
    pub category: String,
    pub slug: String,
    pub quality_score: u8,
}

/// Quality + relevance gates with a per-category keyword table.
#[derive(Debug)]
pub struct Validator {
    keywords: HashMap<String, Vec<String>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }

    /// Defaults plus per-category overrides from configuration.
    pub fn with_overrides(overrides: HashMap<String, Vec<String>>) -> Self {
        let mut keywords = default_keywords();
        for (category, words) in overrides {
            keywords.insert(category, words);
        }
        Self { keywords }
    }

    /// Run both gates. `Ok(())` means the candidate may proceed to storage.
    pub fn check(&self, candidate: &ArticleCandidate) -> Result<(), Rejection> {
        self.check_quality(candidate).map_err(Rejection::Invalid)?;
        if !self.is_relevant(candidate) {
            return Err(Rejection::Irrelevant);
        }
        Ok(())
    }

    fn check_quality(&self, candidate: &ArticleCandidate) -> Result<(), QualityIssue> {
        let title = candidate.title.trim();
        if title.is_empty() {
            return Err(QualityIssue::MissingTitle);
        }
        let len = title.chars().count();
        if !(TITLE_MIN..=TITLE_MAX).contains(&len) {
            return Err(QualityIssue::TitleLength);
        }

        let url = candidate.url.trim();
        if url.is_empty() {
            return Err(QualityIssue::MissingUrl);
        }
        match Url::parse(url) {
            Ok(parsed) => {
                if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
                    return Err(QualityIssue::MalformedUrl);
                }
            }
            Err(_) => return Err(QualityIssue::MalformedUrl),
        }

        if candidate
            .published_at
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
        {
            return Err(QualityIssue::MissingDate);
        }

        // A malformed image URL is cleared during sanitization, never a
        // reason to reject.
        Ok(())
    }

    fn is_relevant(&self, candidate: &ArticleCandidate) -> bool {
        let Some(words) = self.keywords.get(&candidate.category) else {
            // Unknown category: never rejected by this gate.
            return true;
        };
        let haystack = format!(
            "{} {}",
            candidate.title.to_lowercase(),
            candidate.description.to_lowercase()
        );
        words.iter().any(|w| haystack.contains(w.as_str()))
    }

    /// Truncate fields to storage limits and normalize the published date.
    pub fn sanitize(&self, candidate: ArticleCandidate) -> StoredArticle {
        let title = truncate(&collapse_ws(&decode(&candidate.title)), TITLE_MAX);
        let url = truncate(candidate.url.trim(), URL_MAX);
        let description = truncate(&collapse_ws(&decode(&candidate.description)), DESCRIPTION_MAX);

        let image = candidate
            .image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
            .map(|s| truncate(s, IMAGE_MAX));

        let source = truncate(candidate.source.trim(), SOURCE_MAX);
        let published_at = normalize_date(candidate.published_at.as_deref().unwrap_or_default());
        let quality_score = quality_score(&title, &description, &source, image.is_some());

        StoredArticle {
            key: url_hash(&url),
            slug: slugify(&title),
            title,
            description,
            image,
            published_at,
            source,
            category: truncate(candidate.category.trim(), CATEGORY_MAX),
            url,
            quality_score,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse RFC 3339/ISO-8601, RFC 2822, or unix seconds into UTC ISO-8601 with
/// a `Z` suffix. Unparseable input falls back to the current time.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return now_iso();
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc2822) {
        if let Some(utc) = DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0) {
            return utc.to_rfc3339_opts(SecondsFormat::Secs, true);
        }
    }

    // NewsData-style "2026-01-22 06:00:00" (no timezone, assumed UTC).
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return naive
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
    }

    if let Ok(secs) = trimmed.parse::<i64>() {
        if let Some(utc) = DateTime::<Utc>::from_timestamp(secs, 0) {
            return utc.to_rfc3339_opts(SecondsFormat::Secs, true);
        }
    }

    warn!(target: "validate", date = trimmed, "unparseable published date, using now");
    now_iso()
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode(s: &str) -> String {
    html_escape::decode_html_entities(s).to_string()
}

fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    re.replace_all(s.trim(), " ").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// URL-friendly slug: "Google Announces New AI" -> "google-announces-new-ai".
pub fn slugify(title: &str) -> String {
    static RE_STRIP: OnceCell<Regex> = OnceCell::new();
    static RE_DASHES: OnceCell<Regex> = OnceCell::new();
    let strip = RE_STRIP.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").expect("slug strip regex"));
    let dashes = RE_DASHES.get_or_init(|| Regex::new(r"[\s-]+").expect("slug dash regex"));

    let lowered = title.to_lowercase();
    let stripped = strip.replace_all(&lowered, "");
    let dashed = dashes.replace_all(stripped.trim(), "-");
    truncate(dashed.trim_matches('-'), SLUG_MAX)
}

/// Score article quality 0-100; used downstream for sorting and filtering.
fn quality_score(title: &str, description: &str, source: &str, has_image: bool) -> u8 {
    let mut score: i32 = 50;
    if has_image {
        score += 20;
    }
    if description.chars().count() > 100 {
        score += 15;
    }
    let source_lower = source.to_lowercase();
    if PREMIUM_SOURCES.iter().any(|p| source_lower.contains(p)) {
        score += 15;
    }
    if title.chars().count() > 100 {
        // Overlong titles tend to be clickbait.
        score -= 10;
    }
    score.clamp(0, 100) as u8
}

fn default_keywords() -> HashMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        (
            "ai",
            &[
                "ai",
                "artificial intelligence",
                "machine learning",
                "deep learning",
                "neural network",
                "gpt",
                "llm",
                "chatgpt",
                "generative ai",
                "computer vision",
                "nlp",
                "natural language",
                "transformer",
            ],
        ),
        (
            "data-security",
            &[
                "security",
                "cybersecurity",
                "data breach",
                "hacking",
                "vulnerability",
                "encryption",
                "malware",
                "ransomware",
                "firewall",
                "threat",
            ],
        ),
        (
            "data-governance",
            &[
                "governance",
                "compliance",
                "regulation",
                "audit",
                "policy",
                "data quality",
                "metadata",
                "lineage",
                "stewardship",
            ],
        ),
        (
            "data-privacy",
            &[
                "privacy",
                "gdpr",
                "ccpa",
                "consent",
                "personal data",
                "pii",
                "anonymization",
                "data protection",
                "privacy law",
            ],
        ),
        (
            "data-engineering",
            &[
                "data engineering",
                "pipeline",
                "etl",
                "big data",
                "spark",
                "hadoop",
                "kafka",
                "airflow",
                "data warehouse",
                "snowflake",
            ],
        ),
        (
            "business-intelligence",
            &[
                "business intelligence",
                "bi",
                "analytics",
                "dashboard",
                "tableau",
                "power bi",
                "looker",
                "reporting",
                "kpi",
            ],
        ),
        (
            "business-analytics",
            &[
                "analytics",
                "analysis",
                "insights",
                "metrics",
                "data-driven",
                "business analytics",
                "predictive",
                "forecasting",
            ],
        ),
        (
            "customer-data-platform",
            &[
                "cdp",
                "customer data",
                "customer platform",
                "crm",
                "customer experience",
                "personalization",
                "segmentation",
            ],
        ),
        (
            "data-centers",
            &[
                "data center",
                "data centre",
                "datacenter",
                "server",
                "infrastructure",
                "colocation",
                "edge computing",
                "hyperscale",
            ],
        ),
        (
            "cloud-computing",
            &[
                "cloud",
                "aws",
                "azure",
                "google cloud",
                "gcp",
                "salesforce",
                "saas",
                "paas",
                "iaas",
                "serverless",
                "kubernetes",
            ],
        ),
        (
            "magazines",
            &[
                "technology",
                "tech",
                "innovation",
                "digital",
                "startup",
                "software",
                "hardware",
                "gadget",
            ],
        ),
    ];

    table
        .iter()
        .map(|(cat, words)| {
            (
                cat.to_string(),
                words.iter().map(|w| w.to_string()).collect(),
            )
        })
        .collect()
}
