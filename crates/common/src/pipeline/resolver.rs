//! Knowledge Resolver - resolves a subject against the knowledge source
//!
//! Tiers run strictly in order and each runs at most once:
//! 1. Exact lookup of the subject as a page title
//! 2. Fuzzy search, accepting the top title only above a similarity threshold
//! 3. Disambiguation expansion of the fetched page, or a short summary
//!
//! Each tier reports an explicit [`TierOutcome`]; transport failures never
//! escape the resolver.

use super::similarity::{SequenceRatio, Similarity};
use super::subject::Subject;
use crate::config::KnowledgeConfig;
use crate::errors::AppError;
use crate::knowledge::{article_url, KnowledgeSource};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Body phrase that marks a disambiguation page even without the source flag
const DISAMBIGUATION_PHRASE: &str = "may refer to:";

/// One topic offered from a disambiguation page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationCandidate {
    pub title: String,
    pub url: String,
}

/// Outcome of resolving one subject
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// A single page with its grounding summary
    Found {
        title: String,
        summary: String,
        canonical_url: String,
    },
    /// Several plausible topics, in the source's link order
    Ambiguous { options: Vec<DisambiguationCandidate> },
    /// Nothing suitable
    NotFound,
}

impl Resolution {
    /// Short label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Resolution::Found { .. } => "found",
            Resolution::Ambiguous { .. } => "ambiguous",
            Resolution::NotFound => "not_found",
        }
    }
}

/// Result of running one tier
#[derive(Debug)]
pub enum TierOutcome<T> {
    /// The tier produced a result; stop here
    Hit(T),
    /// The tier had nothing; advance
    Miss,
    /// The tier could not run to completion
    Failed(AppError),
}

/// Resolver thresholds and URL synthesis settings
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub fuzzy_threshold: f64,
    pub disambiguation_threshold: f64,
    pub summary_sentences: usize,
    pub article_base: String,
}

impl From<&KnowledgeConfig> for ResolverSettings {
    fn from(config: &KnowledgeConfig) -> Self {
        Self {
            fuzzy_threshold: config.fuzzy_threshold,
            disambiguation_threshold: config.disambiguation_threshold,
            summary_sentences: config.summary_sentences,
            article_base: config.article_base.clone(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from(&KnowledgeConfig::default())
    }
}

/// Tiered subject resolver
pub struct KnowledgeResolver {
    source: Arc<dyn KnowledgeSource>,
    similarity: Arc<dyn Similarity>,
    settings: ResolverSettings,
}

impl KnowledgeResolver {
    pub fn new(source: Arc<dyn KnowledgeSource>, settings: ResolverSettings) -> Self {
        Self {
            source,
            similarity: Arc::new(SequenceRatio),
            settings,
        }
    }

    /// Replace the similarity scorer
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    /// Resolve a subject. Never fails: transport errors become `NotFound`.
    pub async fn resolve(&self, subject: &Subject) -> Resolution {
        let start = Instant::now();
        let (resolution, tier) = self.run_tiers(subject).await;

        metrics::record_resolution(start.elapsed().as_secs_f64(), resolution.outcome(), tier);
        info!(
            subject = %subject,
            outcome = resolution.outcome(),
            tier,
            "Resolution finished"
        );

        resolution
    }

    async fn run_tiers(&self, subject: &Subject) -> (Resolution, &'static str) {
        if subject.is_empty() {
            info!("Empty subject, nothing to resolve");
            return (Resolution::NotFound, "none");
        }

        match self.exact_lookup(subject).await {
            TierOutcome::Hit(resolution) => return (resolution, "exact"),
            TierOutcome::Miss => {
                info!(subject = %subject, "Exact page not found, trying fuzzy search");
            }
            TierOutcome::Failed(e) => {
                warn!(subject = %subject, error = %e, "Exact lookup failed, trying fuzzy search");
            }
        }

        let title = match self.fuzzy_match(subject).await {
            TierOutcome::Hit(title) => title,
            TierOutcome::Miss => return (Resolution::NotFound, "fuzzy"),
            TierOutcome::Failed(e) => {
                error!(subject = %subject, error = %e, "Fuzzy search error");
                return (Resolution::NotFound, "fuzzy");
            }
        };

        match self.expand(subject, &title).await {
            TierOutcome::Hit(resolution) => (resolution, "fuzzy"),
            TierOutcome::Miss => (Resolution::NotFound, "fuzzy"),
            TierOutcome::Failed(e) => {
                error!(subject = %subject, title = %title, error = %e, "Fuzzy search error");
                (Resolution::NotFound, "fuzzy")
            }
        }
    }

    /// Tier 1: the subject itself is a page title
    async fn exact_lookup(&self, subject: &Subject) -> TierOutcome<Resolution> {
        match self.source.page(subject.as_str()).await {
            Ok(Some(page)) => {
                info!(url = %page.full_url, "Page found");
                TierOutcome::Hit(Resolution::Found {
                    title: page.title,
                    summary: page.summary,
                    canonical_url: page.full_url,
                })
            }
            Ok(None) => TierOutcome::Miss,
            Err(e) => TierOutcome::Failed(e),
        }
    }

    /// Tier 2: top search hit, if it is similar enough to the subject
    async fn fuzzy_match(&self, subject: &Subject) -> TierOutcome<String> {
        let results = match self.source.search(subject.as_str()).await {
            Ok(results) => results,
            Err(e) => return TierOutcome::Failed(e),
        };

        let Some(best) = results.into_iter().next() else {
            info!(subject = %subject, "Fuzzy search found no results");
            return TierOutcome::Miss;
        };

        let similarity = self.score(subject, &best);
        info!(title = %best, similarity = format!("{:.2}", similarity), "Fuzzy match found");

        if similarity > self.settings.fuzzy_threshold {
            TierOutcome::Hit(best)
        } else {
            info!(
                title = %best,
                similarity = format!("{:.2}", similarity),
                threshold = self.settings.fuzzy_threshold,
                "Fuzzy match rejected due to low similarity"
            );
            TierOutcome::Miss
        }
    }

    /// Tier 3: disambiguation expansion, or a short summary of the matched page
    async fn expand(&self, subject: &Subject, title: &str) -> TierOutcome<Resolution> {
        let page = match self.source.page(title).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                info!(title, "Matched page vanished before it could be fetched");
                return TierOutcome::Miss;
            }
            Err(e) => return TierOutcome::Failed(e),
        };

        if page.is_disambiguation || page.content.contains(DISAMBIGUATION_PHRASE) {
            info!(title, "Disambiguation page detected");
            return self.disambiguate(subject, title).await;
        }

        match self.source.summary(title, self.settings.summary_sentences).await {
            Ok(summary) => TierOutcome::Hit(Resolution::Found {
                title: title.to_string(),
                summary,
                canonical_url: article_url(&self.settings.article_base, title),
            }),
            Err(e) => TierOutcome::Failed(e),
        }
    }

    async fn disambiguate(&self, subject: &Subject, title: &str) -> TierOutcome<Resolution> {
        let links = match self.source.links(title).await {
            Ok(links) => links,
            Err(e) => return TierOutcome::Failed(e),
        };

        let options: Vec<DisambiguationCandidate> = links
            .into_iter()
            .filter(|link| self.score(subject, link) > self.settings.disambiguation_threshold)
            .map(|link| DisambiguationCandidate {
                url: article_url(&self.settings.article_base, &link),
                title: link,
            })
            .collect();

        if options.is_empty() {
            info!(title, "No suitable non-disambiguation option found");
            return TierOutcome::Miss;
        }

        TierOutcome::Hit(Resolution::Ambiguous { options })
    }

    fn score(&self, subject: &Subject, candidate: &str) -> f64 {
        self.similarity
            .ratio(&subject.as_str().to_lowercase(), &candidate.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{MockKnowledgeSource, MockPage};
    use crate::pipeline::subject::SubjectExtractor;
    use std::collections::HashMap;

    /// Scores candidates from a fixed table, ignoring the subject
    struct FixedScores(HashMap<String, f64>);

    impl FixedScores {
        fn new(scores: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self(scores.iter().map(|(t, s)| (t.to_lowercase(), *s)).collect()))
        }
    }

    impl Similarity for FixedScores {
        fn ratio(&self, _a: &str, b: &str) -> f64 {
            self.0.get(b).copied().unwrap_or(0.0)
        }
    }

    fn subject(question: &str) -> Subject {
        SubjectExtractor::new().extract(question)
    }

    fn resolver(source: &Arc<MockKnowledgeSource>) -> KnowledgeResolver {
        KnowledgeResolver::new(source.clone(), ResolverSettings::default())
    }

    #[tokio::test]
    async fn test_exact_page_short_circuits() {
        let source = Arc::new(MockKnowledgeSource::demo());
        let subject = subject("Who is Chester Nimitz");
        assert_eq!(subject.as_str(), "chester nimitz");

        let resolution = resolver(&source).resolve(&subject).await;
        match resolution {
            Resolution::Found { summary, canonical_url, .. } => {
                assert!(summary.starts_with("Chester William Nimitz"));
                assert_eq!(canonical_url, "https://en.wikipedia.org/wiki/Chester_W._Nimitz");
            }
            other => panic!("expected Found, got {:?}", other),
        }
        assert_eq!(source.call_count("search"), 0);
    }

    #[tokio::test]
    async fn test_no_search_results_is_not_found() {
        let source = Arc::new(MockKnowledgeSource::demo());
        let resolution = resolver(&source).resolve(&subject("What is xyznonexistent123")).await;
        assert_eq!(resolution, Resolution::NotFound);
        assert_eq!(source.call_count("page"), 1);
        assert_eq!(source.call_count("search"), 1);
    }

    #[tokio::test]
    async fn test_low_similarity_rejected() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("hood", &["Robin Hood"])
                .with_page(MockPage::new("Robin Hood", "Robin Hood is a legendary outlaw.")),
        );
        let resolution = resolver(&source).resolve(&subject("Tell me about Hood")).await;
        assert_eq!(resolution, Resolution::NotFound);
        // The candidate page is never fetched
        assert_eq!(source.calls().iter().filter(|(op, arg)| *op == "page" && arg == "Robin Hood").count(), 0);
    }

    #[tokio::test]
    async fn test_similarity_at_threshold_is_rejected() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("musashi", &["Musashi Province"])
                .with_page(MockPage::new("Musashi Province", "Musashi was a province of Japan.")),
        );
        let resolver = resolver(&source).with_similarity(FixedScores::new(&[("Musashi Province", 0.7)]));
        assert_eq!(resolver.resolve(&subject("musashi")).await, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_fuzzy_match_returns_short_summary() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("battleship bismark", &["German battleship Bismarck"])
                .with_page(MockPage::new(
                    "German battleship Bismarck",
                    "Bismarck was the first of two battleships. She was named after Otto von Bismarck. \
                     She was laid down in 1936. She was sunk in May 1941.",
                )),
        );
        let resolver = resolver(&source)
            .with_similarity(FixedScores::new(&[("German battleship Bismarck", 0.82)]));

        match resolver.resolve(&subject("What is the battleship Bismark?")).await {
            Resolution::Found { title, summary, canonical_url } => {
                assert_eq!(title, "German battleship Bismarck");
                assert_eq!(
                    summary,
                    "Bismarck was the first of two battleships. She was named after Otto von Bismarck. She was laid down in 1936."
                );
                assert_eq!(canonical_url, "https://en.wikipedia.org/wiki/German_battleship_Bismarck");
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disambiguation_keeps_passing_links_in_source_order() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("yamato", &["Yamato (disambiguation)"])
                .with_page(MockPage::disambiguation(
                    "Yamato (disambiguation)",
                    &["Yamato-class battleship", "Yamato Province", "Yamato (mythology)"],
                )),
        );
        let resolver = resolver(&source).with_similarity(FixedScores::new(&[
            ("Yamato (disambiguation)", 0.9),
            ("Yamato-class battleship", 0.8),
            ("Yamato Province", 0.55),
            ("Yamato (mythology)", 0.3),
        ]));

        let resolution = resolver.resolve(&subject("Tell me about Yamato")).await;
        assert_eq!(
            resolution,
            Resolution::Ambiguous {
                options: vec![
                    DisambiguationCandidate {
                        title: "Yamato-class battleship".into(),
                        url: "https://en.wikipedia.org/wiki/Yamato-class_battleship".into(),
                    },
                    DisambiguationCandidate {
                        title: "Yamato Province".into(),
                        url: "https://en.wikipedia.org/wiki/Yamato_Province".into(),
                    },
                ]
            }
        );
        assert_eq!(source.call_count("summary"), 0);
    }

    #[tokio::test]
    async fn test_disambiguation_without_passing_links_is_not_found() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("kongo", &["Kongo (disambiguation)"])
                .with_page(MockPage::disambiguation(
                    "Kongo (disambiguation)",
                    &["Kingdom of Kongo", "Kongo people"],
                )),
        );
        let resolver = resolver(&source)
            .with_similarity(FixedScores::new(&[("Kongo (disambiguation)", 0.95)]));
        assert_eq!(resolver.resolve(&subject("kongo")).await, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_disambiguation_phrase_without_flag() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("enterprise", &["Enterprise (disambiguation)"])
                .with_page(
                    MockPage::new("Enterprise (disambiguation)", "Enterprise may refer to:")
                        .with_content("Enterprise may refer to:\nUSS Enterprise (CV-6)\nEnterprise (ship)")
                        .with_links(&["USS Enterprise (CV-6)", "Enterprise (ship)"]),
                ),
        );
        let resolver = resolver(&source).with_similarity(FixedScores::new(&[
            ("Enterprise (disambiguation)", 0.9),
            ("Enterprise (ship)", 0.75),
        ]));

        match resolver.resolve(&subject("enterprise")).await {
            Resolution::Ambiguous { options } => {
                assert_eq!(options.len(), 1);
                assert_eq!(options[0].title, "Enterprise (ship)");
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_real_ratio_on_disambiguation_links() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("yamato battleship", &["Yamato battleships"])
                .with_page(MockPage::disambiguation(
                    "Yamato battleships",
                    &["Yamato-class battleship", "Zuikaku", "Battleship"],
                )),
        );

        match resolver(&source).resolve(&subject("Tell me about the Yamato battleship")).await {
            Resolution::Ambiguous { options } => {
                let titles: Vec<&str> = options.iter().map(|o| o.title.as_str()).collect();
                assert_eq!(titles, vec!["Yamato-class battleship", "Battleship"]);
            }
            other => panic!("expected Ambiguous, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_failure_is_contained() {
        let source = Arc::new(MockKnowledgeSource::demo().failing("search"));
        let resolution = resolver(&source).resolve(&subject("Tell me about Musashi")).await;
        assert_eq!(resolution, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_exact_failure_falls_through_to_fuzzy() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("hornet", &["USS Hornet"])
                .with_page(MockPage::new("USS Hornet", "Hornet was an aircraft carrier."))
                .failing("page"),
        );
        let resolution = resolver(&source).resolve(&subject("hornet")).await;
        // The candidate fetch fails too, which ends the fuzzy tier
        assert_eq!(resolution, Resolution::NotFound);
        assert_eq!(source.call_count("search"), 1);
        assert_eq!(source.call_count("page"), 2);
    }

    #[tokio::test]
    async fn test_link_failure_is_contained() {
        let source = Arc::new(
            MockKnowledgeSource::new()
                .with_search("yamato", &["Yamato (disambiguation)"])
                .with_page(MockPage::disambiguation("Yamato (disambiguation)", &["Yamato Province"]))
                .failing("links"),
        );
        let resolver = resolver(&source).with_similarity(FixedScores::new(&[
            ("Yamato (disambiguation)", 0.9),
            ("Yamato Province", 0.9),
        ]));
        assert_eq!(resolver.resolve(&subject("yamato")).await, Resolution::NotFound);
    }

    #[tokio::test]
    async fn test_empty_subject_makes_no_calls() {
        let source = Arc::new(MockKnowledgeSource::demo());
        assert_eq!(resolver(&source).resolve(&subject("???")).await, Resolution::NotFound);
        assert!(source.calls().is_empty());
    }
}
