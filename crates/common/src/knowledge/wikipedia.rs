//! Wikipedia client over the MediaWiki Action API
//!
//! All queries use `formatversion=2`, follow redirects, and send the
//! configured identifying User-Agent. Every request waits on the shared
//! politeness limiter first.

use super::{article_url, KnowledgeSource, Page};
use crate::config::KnowledgeConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::politeness::Politeness;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Upper bound on continuation pages fetched for one list
const MAX_CONTINUATIONS: usize = 20;

/// Marks a section heading in wiki-formatted extracts
const SECTION_MARKER: &str = "==";

type Params = Vec<(String, String)>;

#[derive(Deserialize)]
struct ApiResponse<Q> {
    query: Option<Q>,
    #[serde(rename = "continue", default)]
    continuation: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Deserialize, Default)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<ApiPage>,
}

#[derive(Deserialize)]
struct ApiPage {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    fullurl: Option<String>,
    #[serde(default)]
    pageprops: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    links: Vec<ApiLink>,
    #[serde(default)]
    imageinfo: Vec<ApiImageInfo>,
}

impl ApiPage {
    fn exists(&self) -> bool {
        !self.missing && !self.invalid
    }
}

#[derive(Deserialize)]
struct ApiLink {
    title: String,
}

#[derive(Deserialize)]
struct ApiImageInfo {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize, Default)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

/// MediaWiki Action API client
pub struct WikipediaClient {
    client: reqwest::Client,
    config: KnowledgeConfig,
    politeness: Arc<Politeness>,
}

impl WikipediaClient {
    /// Create a new client
    pub fn new(config: KnowledgeConfig, politeness: Arc<Politeness>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            politeness,
        })
    }

    /// Run one API request and decode its body
    async fn query<Q: DeserializeOwned>(&self, operation: &'static str, params: &Params) -> Result<ApiResponse<Q>> {
        self.politeness.wait(&self.config.api_base).await;

        let start = Instant::now();
        let result = self.send::<Q>(operation, params).await;
        metrics::record_knowledge_call(start.elapsed().as_secs_f64(), operation, result.is_ok());

        result
    }

    async fn send<Q: DeserializeOwned>(&self, operation: &'static str, params: &Params) -> Result<ApiResponse<Q>> {
        let transport = |message: String| AppError::KnowledgeSource {
            operation: operation.to_string(),
            message,
        };

        let response = self
            .client
            .get(&self.config.api_base)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|e| transport(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(transport(format!("API error {}: {}", status, body)));
        }

        let decoded: ApiResponse<Q> = response
            .json()
            .await
            .map_err(|e| transport(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = &decoded.error {
            return Err(transport(format!("{}: {}", error.code, error.info)));
        }

        Ok(decoded)
    }

    /// Follow `continue` tokens, handing every page of results to `collect`
    async fn query_all<F>(&self, operation: &'static str, base: Params, mut collect: F) -> Result<()>
    where
        F: FnMut(PagesQuery) -> Result<()>,
    {
        let mut continuation: Params = Vec::new();

        for _ in 0..MAX_CONTINUATIONS {
            let mut params = base.clone();
            params.extend(continuation.drain(..));

            let response = self.query::<PagesQuery>(operation, &params).await?;
            collect(response.query.unwrap_or_default())?;

            match response.continuation {
                Some(tokens) => {
                    continuation = tokens
                        .into_iter()
                        .map(|(k, v)| {
                            let value = match v {
                                serde_json::Value::String(s) => s,
                                other => other.to_string(),
                            };
                            (k, value)
                        })
                        .collect();
                }
                None => return Ok(()),
            }
        }

        tracing::warn!(operation, limit = MAX_CONTINUATIONS, "Continuation limit reached, list truncated");
        Ok(())
    }

    fn single_page(&self, operation: &str, title: &str, query: Option<PagesQuery>) -> Result<ApiPage> {
        query
            .and_then(|q| q.pages.into_iter().next())
            .filter(ApiPage::exists)
            .ok_or_else(|| AppError::KnowledgeSource {
                operation: operation.to_string(),
                message: format!("page '{}' does not exist", title),
            })
    }
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Lead section of a wiki-formatted extract: everything before the first heading
fn lead_section(extract: &str) -> String {
    let mut lead = Vec::new();
    for line in extract.lines() {
        if line.trim_start().starts_with(SECTION_MARKER) {
            break;
        }
        lead.push(line);
    }
    lead.join("\n").trim().to_string()
}

/// Body text with heading markup stripped
fn plain_body(extract: &str) -> String {
    extract
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with(SECTION_MARKER) {
                trimmed.trim_matches('=').trim()
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl KnowledgeSource for WikipediaClient {
    async fn page(&self, title: &str) -> Result<Option<Page>> {
        let response = self
            .query::<PagesQuery>(
                "page",
                &params(&[
                    ("titles", title),
                    ("prop", "extracts|info|pageprops"),
                    ("explaintext", "1"),
                    ("exsectionformat", "wiki"),
                    ("inprop", "url"),
                    ("ppprop", "disambiguation"),
                    ("redirects", "1"),
                ]),
            )
            .await?;

        let Some(page) = response.query.and_then(|q| q.pages.into_iter().next()) else {
            return Ok(None);
        };
        if !page.exists() {
            tracing::debug!(title, "Page does not exist");
            return Ok(None);
        }

        let extract = page.extract.unwrap_or_default();
        let is_disambiguation = page
            .pageprops
            .as_ref()
            .is_some_and(|props| props.contains_key("disambiguation"));
        let full_url = page
            .fullurl
            .unwrap_or_else(|| article_url(&self.config.article_base, &page.title));

        Ok(Some(Page {
            summary: lead_section(&extract),
            content: plain_body(&extract),
            title: page.title,
            full_url,
            is_disambiguation,
        }))
    }

    async fn search(&self, text: &str) -> Result<Vec<String>> {
        let limit = self.config.search_limit.to_string();
        let response = self
            .query::<SearchQuery>(
                "search",
                &params(&[
                    ("list", "search"),
                    ("srsearch", text),
                    ("srlimit", &limit),
                    ("srprop", ""),
                ]),
            )
            .await?;

        Ok(response
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    async fn summary(&self, title: &str, sentences: usize) -> Result<String> {
        let sentences = sentences.to_string();
        let response = self
            .query::<PagesQuery>(
                "summary",
                &params(&[
                    ("titles", title),
                    ("prop", "extracts"),
                    ("explaintext", "1"),
                    ("exintro", "1"),
                    ("exsentences", &sentences),
                    ("redirects", "1"),
                ]),
            )
            .await?;

        let page = self.single_page("summary", title, response.query)?;
        Ok(page.extract.unwrap_or_default().trim().to_string())
    }

    async fn links(&self, title: &str) -> Result<Vec<String>> {
        let mut links = Vec::new();
        let base = params(&[
            ("titles", title),
            ("prop", "links"),
            ("plnamespace", "0"),
            ("pllimit", "max"),
            ("redirects", "1"),
        ]);

        self.query_all("links", base, |query| {
            let page = self.single_page("links", title, Some(query))?;
            links.extend(page.links.into_iter().map(|l| l.title));
            Ok(())
        })
        .await?;

        Ok(links)
    }

    async fn images(&self, title: &str) -> Result<Vec<String>> {
        let mut images = Vec::new();
        let base = params(&[
            ("titles", title),
            ("generator", "images"),
            ("gimlimit", "max"),
            ("prop", "imageinfo"),
            ("iiprop", "url"),
            ("redirects", "1"),
        ]);

        // A page without files yields no `query` at all
        self.query_all("images", base, |query| {
            for file in query.pages {
                images.extend(file.imageinfo.into_iter().filter_map(|info| info.url));
            }
            Ok(())
        })
        .await?;

        Ok(images)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}
