//! Citation Finder - first reachable reference URL for a subject
//!
//! Candidates are URL templates probed in order with a bounded GET. The first
//! success status wins; errors and non-success statuses move on to the next
//! candidate. Every probe waits for the politeness limiter first.

use super::subject::Subject;
use crate::config::CitationConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::politeness::Politeness;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Placeholder substituted with the subject in candidate templates
pub const SUBJECT_PLACEHOLDER: &str = "{subject}";

/// Minimal HTTP capability used for reachability checks
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// GET `url` and return the response status code
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16>;
}

/// Probe backed by a shared reqwest client
pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str, timeout: Duration) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AppError::Probe {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(response.status().as_u16())
    }
}

/// Scripted probe for tests and offline runs.
///
/// Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct MockProbe {
    statuses: HashMap<String, u16>,
    probed: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// URLs probed so far, in order
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpProbe for MockProbe {
    async fn get(&self, url: &str, _timeout: Duration) -> Result<u16> {
        if let Ok(mut probed) = self.probed.lock() {
            probed.push(url.to_string());
        }

        self.statuses.get(url).copied().ok_or_else(|| AppError::Probe {
            url: url.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

/// Ordered candidate prober
pub struct CitationFinder {
    probe: Arc<dyn HttpProbe>,
    politeness: Arc<Politeness>,
    candidates: Vec<String>,
    timeout: Duration,
}

impl CitationFinder {
    pub fn new(probe: Arc<dyn HttpProbe>, politeness: Arc<Politeness>, config: &CitationConfig) -> Self {
        Self {
            probe,
            politeness,
            candidates: config.candidates.clone(),
            timeout: config.probe_timeout(),
        }
    }

    /// Candidate URLs for a subject, in probe order
    pub fn candidates(&self, subject: &Subject) -> Vec<String> {
        let slug = subject.as_str().replace(' ', "_");
        self.candidates
            .iter()
            .map(|template| template.replace(SUBJECT_PLACEHOLDER, &slug))
            .collect()
    }

    /// First reachable candidate, if any
    pub async fn find_citation(&self, subject: &Subject) -> Option<String> {
        for url in self.candidates(subject) {
            self.politeness.wait(&url).await;

            match self.probe.get(&url, self.timeout).await {
                Ok(status) if (200..300).contains(&status) => {
                    metrics::record_citation_probe(true);
                    info!(subject = %subject, url = %url, "Citation found");
                    return Some(url);
                }
                Ok(status) => {
                    metrics::record_citation_probe(false);
                    debug!(url = %url, status, "Citation candidate rejected");
                }
                Err(e) => {
                    metrics::record_citation_probe(false);
                    debug!(url = %url, error = %e, "Citation candidate unreachable");
                }
            }
        }

        info!(subject = %subject, "No reachable citation");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::subject::SubjectExtractor;
    use std::time::Instant;

    fn subject(question: &str) -> Subject {
        SubjectExtractor::new().extract(question)
    }

    fn finder(probe: Arc<MockProbe>) -> CitationFinder {
        CitationFinder::new(probe, Arc::new(Politeness::disabled()), &CitationConfig::default())
    }

    #[test]
    fn test_candidates_substitute_subject() {
        let finder = finder(Arc::new(MockProbe::new()));
        let candidates = finder.candidates(&subject("Tell me about the Battle of Midway"));
        assert_eq!(
            candidates,
            vec![
                "https://en.wikipedia.org/wiki/battle_of_midway",
                "https://www.navweaps.com/Weapons/index.html",
                "https://www.naval-history.net/WW2CampaignsOtherNavies.htm",
            ]
        );
    }

    #[tokio::test]
    async fn test_first_reachable_wins() {
        let probe = Arc::new(
            MockProbe::new()
                .with_status("https://en.wikipedia.org/wiki/chester_nimitz", 200)
                .with_status("https://www.navweaps.com/Weapons/index.html", 200),
        );
        let citation = finder(probe.clone()).find_citation(&subject("Who is Chester Nimitz")).await;

        assert_eq!(citation.as_deref(), Some("https://en.wikipedia.org/wiki/chester_nimitz"));
        assert_eq!(probe.probed().len(), 1);
    }

    #[tokio::test]
    async fn test_errors_and_bad_statuses_move_on() {
        let probe = Arc::new(
            MockProbe::new()
                .with_status("https://en.wikipedia.org/wiki/musashi", 404)
                .with_status("https://www.naval-history.net/WW2CampaignsOtherNavies.htm", 204),
        );
        let citation = finder(probe.clone()).find_citation(&subject("Tell me about Musashi")).await;

        assert_eq!(citation.as_deref(), Some("https://www.naval-history.net/WW2CampaignsOtherNavies.htm"));
        assert_eq!(probe.probed().len(), 3);
    }

    #[tokio::test]
    async fn test_nothing_reachable() {
        let probe = Arc::new(MockProbe::new().with_status("https://www.navweaps.com/Weapons/index.html", 503));
        assert_eq!(finder(probe.clone()).find_citation(&subject("Tell me about Musashi")).await, None);
        assert_eq!(probe.probed().len(), 3);
    }

    #[tokio::test]
    async fn test_probes_to_one_host_are_spaced() {
        let config = CitationConfig {
            candidates: vec![
                "https://example.org/a/{subject}".to_string(),
                "https://example.org/b/{subject}".to_string(),
            ],
            probe_timeout_secs: 1,
        };
        let probe = Arc::new(MockProbe::new().with_status("https://example.org/b/hood", 200));
        let finder = CitationFinder::new(probe, Arc::new(Politeness::new(Duration::from_millis(100))), &config);

        let start = Instant::now();
        let citation = finder.find_citation(&subject("hood")).await;
        assert_eq!(citation.as_deref(), Some("https://example.org/b/hood"));
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
