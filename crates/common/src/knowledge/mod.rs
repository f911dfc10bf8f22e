//! Knowledge source abstraction
//!
//! Provides a unified interface over the online encyclopedia:
//! - Wikipedia (MediaWiki Action API)
//! - An in-memory source for development and tests

mod wikipedia;

pub use wikipedia::WikipediaClient;

use crate::config::KnowledgeConfig;
use crate::errors::{AppError, Result};
use crate::politeness::Politeness;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A page as seen by the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Canonical title after redirects
    pub title: String,

    /// Lead section as plain text
    pub summary: String,

    /// Canonical article URL
    pub full_url: String,

    /// Whether the source flags this page as a disambiguation page
    pub is_disambiguation: bool,

    /// Full plain-text body
    pub content: String,
}

/// Capabilities the pipeline needs from the encyclopedia.
///
/// Lookups never auto-suggest: a title either resolves (following redirects)
/// or it does not.
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    /// Fetch a page by title; `None` when no such page exists
    async fn page(&self, title: &str) -> Result<Option<Page>>;

    /// Full-text search, best match first
    async fn search(&self, text: &str) -> Result<Vec<String>>;

    /// The first `sentences` sentences of a page's lead section
    async fn summary(&self, title: &str, sentences: usize) -> Result<String>;

    /// Titles of article links on a page, in source order
    async fn links(&self, title: &str) -> Result<Vec<String>>;

    /// URLs of every file used on a page
    async fn images(&self, title: &str) -> Result<Vec<String>>;

    /// Name of the backing source
    fn name(&self) -> &str;
}

/// Synthesize an article URL from a title: spaces become underscores
pub fn article_url(article_base: &str, title: &str) -> String {
    format!("{}{}", article_base, title.replace(' ', "_"))
}

/// First `n` sentences of `text`. A sentence ends at `.`, `!` or `?`
/// followed by whitespace or the end of the text.
pub fn first_sentences(text: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }

    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                count += 1;
                if count == n {
                    return text[..idx + c.len_utf8()].trim().to_string();
                }
            }
        }
    }

    text.trim().to_string()
}

/// A page held by [`MockKnowledgeSource`]
#[derive(Debug, Clone)]
pub struct MockPage {
    pub page: Page,
    pub links: Vec<String>,
    pub images: Vec<String>,
}

impl MockPage {
    pub fn new(title: &str, summary: &str) -> Self {
        Self {
            page: Page {
                title: title.to_string(),
                summary: summary.to_string(),
                full_url: article_url("https://en.wikipedia.org/wiki/", title),
                is_disambiguation: false,
                content: summary.to_string(),
            },
            links: Vec::new(),
            images: Vec::new(),
        }
    }

    /// A disambiguation page listing `links`
    pub fn disambiguation(title: &str, links: &[&str]) -> Self {
        let mut mock = Self::new(title, &format!("{} may refer to:", title));
        mock.page.is_disambiguation = true;
        mock.links = links.iter().map(|l| l.to_string()).collect();
        mock
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.page.content = content.to_string();
        self
    }

    pub fn with_links(mut self, links: &[&str]) -> Self {
        self.links = links.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_images(mut self, images: &[&str]) -> Self {
        self.images = images.iter().map(|i| i.to_string()).collect();
        self
    }
}

/// In-memory knowledge source for development and testing.
///
/// Titles match case-insensitively. Every call is recorded so tests can
/// assert which capabilities were used.
#[derive(Default)]
pub struct MockKnowledgeSource {
    pages: HashMap<String, MockPage>,
    redirects: HashMap<String, String>,
    search_results: HashMap<String, Vec<String>>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl MockKnowledgeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small naval history corpus used when no live source is configured
    pub fn demo() -> Self {
        Self::new()
            .with_page(
                MockPage::new(
                    "Chester W. Nimitz",
                    "Chester William Nimitz was a fleet admiral of the United States Navy. \
                     He played a major role in the naval history of World War II as \
                     Commander in Chief, US Pacific Fleet. He was the leading US Navy \
                     authority on submarines.",
                )
                .with_images(&[
                    "https://upload.wikimedia.org/wikipedia/commons/8/86/Chester_Nimitz.jpg",
                    "https://upload.wikimedia.org/wikipedia/commons/a/a4/Flag_of_the_United_States.svg",
                ]),
            )
            .with_redirect("Chester Nimitz", "Chester W. Nimitz")
            .with_page(MockPage::disambiguation(
                "Yamato",
                &["Yamato-class battleship", "Japanese battleship Yamato", "Yamato Province"],
            ))
            .with_page(
                MockPage::new(
                    "Japanese battleship Yamato",
                    "Yamato was the lead ship of her class of battleships built for the \
                     Imperial Japanese Navy shortly before World War II. She and her sister \
                     ship Musashi were the heaviest and most powerfully armed battleships \
                     ever constructed. Yamato was sunk in April 1945 during Operation Ten-Go.",
                )
                .with_images(&["https://upload.wikimedia.org/wikipedia/commons/9/9e/Yamato1945.png"]),
            )
            .with_search("yamato", &["Yamato"])
    }

    pub fn with_page(mut self, page: MockPage) -> Self {
        self.pages.insert(page.page.title.to_lowercase(), page);
        self
    }

    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_lowercase(), to.to_lowercase());
        self
    }

    pub fn with_search(mut self, text: &str, titles: &[&str]) -> Self {
        self.search_results.insert(
            text.to_lowercase(),
            titles.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Make every call to `operation` fail with a transport error
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    /// All recorded calls as `(operation, argument)`
    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded calls to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|(op, _)| *op == operation).count()
    }

    fn record(&self, operation: &'static str, argument: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((operation, argument.to_string()));
        }
        if self.failing.contains(operation) {
            return Err(AppError::KnowledgeSource {
                operation: operation.to_string(),
                message: "simulated transport failure".to_string(),
            });
        }
        Ok(())
    }

    fn lookup(&self, title: &str) -> Option<&MockPage> {
        let key = title.trim().to_lowercase();
        let key = self.redirects.get(&key).unwrap_or(&key);
        self.pages.get(key)
    }

    fn require(&self, operation: &str, title: &str) -> Result<&MockPage> {
        self.lookup(title).ok_or_else(|| AppError::KnowledgeSource {
            operation: operation.to_string(),
            message: format!("page '{}' does not exist", title),
        })
    }
}

#[async_trait]
impl KnowledgeSource for MockKnowledgeSource {
    async fn page(&self, title: &str) -> Result<Option<Page>> {
        self.record("page", title)?;
        Ok(self.lookup(title).map(|p| p.page.clone()))
    }

    async fn search(&self, text: &str) -> Result<Vec<String>> {
        self.record("search", text)?;
        Ok(self
            .search_results
            .get(&text.trim().to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn summary(&self, title: &str, sentences: usize) -> Result<String> {
        self.record("summary", title)?;
        let page = self.require("summary", title)?;
        Ok(first_sentences(&page.page.summary, sentences))
    }

    async fn links(&self, title: &str) -> Result<Vec<String>> {
        self.record("links", title)?;
        Ok(self.require("links", title)?.links.clone())
    }

    async fn images(&self, title: &str) -> Result<Vec<String>> {
        self.record("images", title)?;
        Ok(self.require("images", title)?.images.clone())
    }

    fn name(&self) -> &str {
        "mock-knowledge"
    }
}

/// Create a knowledge source based on configuration
pub fn create_knowledge_source(
    config: &KnowledgeConfig,
    politeness: Arc<Politeness>,
) -> Result<Arc<dyn KnowledgeSource>> {
    match config.provider.as_str() {
        "wikipedia" => Ok(Arc::new(WikipediaClient::new(config.clone(), politeness)?)),
        "mock" => Ok(Arc::new(MockKnowledgeSource::demo())),
        other => Err(AppError::Configuration {
            message: format!("Unknown knowledge provider '{}'", other),
        }),
    }
}
