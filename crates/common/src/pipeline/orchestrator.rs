//! Pipeline Orchestrator - question in, answer payload out
//!
//! Every collaborator is constructed by the caller and injected here; the
//! orchestrator holds no global state of its own.

use super::citation::{CitationFinder, HttpProbe};
use super::media::MediaLocator;
use super::resolver::{DisambiguationCandidate, KnowledgeResolver, Resolution, ResolverSettings};
use super::similarity::Similarity;
use super::subject::{Subject, SubjectExtractor};
use crate::composer::{extract_answer, AnswerComposer, GroundingPrompt};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::history::{ChatTurn, ConversationHistory};
use crate::knowledge::KnowledgeSource;
use crate::politeness::Politeness;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Answer given when nothing could be resolved
pub const NOT_FOUND_ANSWER: &str = "I'm sorry, I don't know the answer to that.";

/// First line of the answer listing disambiguation options
pub const AMBIGUOUS_PREAMBLE: &str =
    "I found multiple possible entries for your question. Please specify one of the following:";

/// Response contract handed to the web layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerPayload {
    /// Composed answer, or the apology when nothing was found
    Grounded {
        answer: String,
        citation: Option<String>,
        images: Vec<String>,
    },
    /// Clickable options for an ambiguous subject
    Disambiguation {
        answer: String,
        citation: Option<String>,
        disambiguation: bool,
        options: Vec<DisambiguationCandidate>,
    },
}

impl AnswerPayload {
    pub fn not_found() -> Self {
        AnswerPayload::Grounded {
            answer: NOT_FOUND_ANSWER.to_string(),
            citation: None,
            images: Vec::new(),
        }
    }

    pub fn ambiguous(options: Vec<DisambiguationCandidate>) -> Self {
        let listing: Vec<String> = options
            .iter()
            .map(|o| {
                format!(
                    "- <a href='{}' target='_blank'>{}</a>",
                    escape_markup(&o.url),
                    escape_markup(&o.title)
                )
            })
            .collect();

        AnswerPayload::Disambiguation {
            answer: format!("{}\n{}", AMBIGUOUS_PREAMBLE, listing.join("\n")),
            citation: None,
            disambiguation: true,
            options,
        }
    }

    pub fn answer(&self) -> &str {
        match self {
            AnswerPayload::Grounded { answer, .. } | AnswerPayload::Disambiguation { answer, .. } => answer,
        }
    }

    pub fn citation(&self) -> Option<&str> {
        match self {
            AnswerPayload::Grounded { citation, .. } | AnswerPayload::Disambiguation { citation, .. } => {
                citation.as_deref()
            }
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, AnswerPayload::Disambiguation { .. })
    }
}

/// Escape text placed in the single-quoted option markup
fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&#39;"),
            '"' => escaped.push_str("&quot;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Externally constructed services the pipeline depends on
#[derive(Clone)]
pub struct Collaborators {
    pub knowledge: Arc<dyn KnowledgeSource>,
    pub composer: Arc<dyn AnswerComposer>,
    pub probe: Arc<dyn HttpProbe>,
    pub history: Arc<dyn ConversationHistory>,
    pub politeness: Arc<Politeness>,
}

/// The question answering pipeline
pub struct Orchestrator {
    extractor: SubjectExtractor,
    resolver: KnowledgeResolver,
    media: MediaLocator,
    citations: CitationFinder,
    composer: Arc<dyn AnswerComposer>,
    prompt: GroundingPrompt,
    history: Arc<dyn ConversationHistory>,
    max_output_tokens: usize,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        let Collaborators {
            knowledge,
            composer,
            probe,
            history,
            politeness,
        } = collaborators;

        Self {
            extractor: SubjectExtractor::new(),
            resolver: KnowledgeResolver::new(knowledge.clone(), ResolverSettings::from(&config.knowledge)),
            media: MediaLocator::new(knowledge),
            citations: CitationFinder::new(probe, politeness, &config.citation),
            composer,
            prompt: GroundingPrompt::new(config.composer.topic.clone()),
            history,
            max_output_tokens: config.composer.max_output_tokens,
        }
    }

    /// Replace the resolver's similarity scorer
    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.resolver = self.resolver.with_similarity(similarity);
        self
    }

    /// Answer one question without touching the conversation history
    #[instrument(skip(self), fields(subject = tracing::field::Empty))]
    pub async fn answer(&self, question: &str) -> Result<AnswerPayload> {
        if question.trim().is_empty() {
            return Err(AppError::no_question());
        }

        let subject = self.extractor.extract(question);
        tracing::Span::current().record("subject", subject.as_str());
        info!(subject = %subject, "Extracted subject");

        match self.resolver.resolve(&subject).await {
            Resolution::Found { title, summary, canonical_url } => {
                info!(title = %title, "Composing grounded answer");
                let prompt = self.prompt.render(&summary, question);

                let (images, generated) = futures::join!(
                    self.media.find_images(&subject),
                    self.composer.generate(&prompt, self.max_output_tokens),
                );

                Ok(AnswerPayload::Grounded {
                    answer: extract_answer(&generated?),
                    citation: Some(canonical_url),
                    images,
                })
            }
            Resolution::Ambiguous { options } => Ok(AnswerPayload::ambiguous(options)),
            Resolution::NotFound => Ok(AnswerPayload::not_found()),
        }
    }

    /// Answer a question and record the exchange in the session's history
    pub async fn ask(&self, session: &str, question: &str) -> Result<AnswerPayload> {
        let payload = self.answer(question).await?;

        let turns = vec![
            ChatTurn::user(question),
            ChatTurn::ai(payload.answer(), payload.citation().map(str::to_string)),
        ];
        if let Err(e) = self.history.append(session, turns).await {
            warn!(session, error = %e, "Failed to record chat history");
        }

        Ok(payload)
    }

    /// Probe reference sites for the subject of `text`
    pub async fn find_citation(&self, text: &str) -> Result<(Subject, Option<String>)> {
        let subject = self.extractor.extract(text);
        if subject.is_empty() {
            return Err(AppError::MissingField {
                field: "subject".to_string(),
            });
        }

        let citation = self.citations.find_citation(&subject).await;
        Ok((subject, citation))
    }

    pub async fn history(&self, session: &str) -> Result<Vec<ChatTurn>> {
        self.history.turns(session).await
    }

    pub async fn clear_history(&self, session: &str) -> Result<()> {
        self.history.clear(session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::MockComposer;
    use crate::history::{InMemoryHistory, Role};
    use crate::knowledge::{MockKnowledgeSource, MockPage};
    use crate::pipeline::citation::MockProbe;
    use std::collections::HashMap;

    struct FixedScores(HashMap<String, f64>);

    impl Similarity for FixedScores {
        fn ratio(&self, _a: &str, b: &str) -> f64 {
            self.0.get(b).copied().unwrap_or(0.0)
        }
    }

    fn fixed_scores(scores: &[(&str, f64)]) -> Arc<FixedScores> {
        Arc::new(FixedScores(scores.iter().map(|(t, s)| (t.to_lowercase(), *s)).collect()))
    }

    fn orchestrator_with(
        knowledge: Arc<MockKnowledgeSource>,
        composer: Arc<dyn AnswerComposer>,
        probe: Arc<MockProbe>,
    ) -> (Orchestrator, Arc<InMemoryHistory>) {
        let history = Arc::new(InMemoryHistory::new());
        let collaborators = Collaborators {
            knowledge,
            composer,
            probe,
            history: history.clone(),
            politeness: Arc::new(Politeness::disabled()),
        };
        (Orchestrator::new(collaborators, &AppConfig::default()), history)
    }

    fn orchestrator(knowledge: Arc<MockKnowledgeSource>) -> (Orchestrator, Arc<InMemoryHistory>) {
        orchestrator_with(knowledge, Arc::new(MockComposer::new()), Arc::new(MockProbe::new()))
    }

    #[tokio::test]
    async fn test_found_answer_is_grounded_and_cited() {
        let knowledge = Arc::new(MockKnowledgeSource::demo());
        let (orchestrator, _) = orchestrator(knowledge);

        let payload = orchestrator.answer("Who is Chester Nimitz").await.unwrap();
        match payload {
            AnswerPayload::Grounded { answer, citation, images } => {
                assert!(answer.starts_with("Based on the provided information: Chester William Nimitz"));
                assert!(!answer.contains("Question:"));
                assert_eq!(citation.as_deref(), Some("https://en.wikipedia.org/wiki/Chester_W._Nimitz"));
                assert_eq!(images, vec!["https://upload.wikimedia.org/wikipedia/commons/8/86/Chester_Nimitz.jpg".to_string()]);
            }
            other => panic!("expected grounded answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_question_makes_no_calls() {
        let knowledge = Arc::new(MockKnowledgeSource::demo());
        let probe = Arc::new(MockProbe::new());
        let (orchestrator, history) =
            orchestrator_with(knowledge.clone(), Arc::new(MockComposer::failing()), probe.clone());

        for question in ["", "   ", "\n"] {
            let err = orchestrator.ask("s1", question).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
            assert_eq!(err.to_string(), "No question provided.");
            assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        }

        assert!(knowledge.calls().is_empty());
        assert!(probe.probed().is_empty());
        assert!(history.turns("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_subject_lists_options() {
        let knowledge = Arc::new(
            MockKnowledgeSource::new()
                .with_search("yamato", &["Yamato (disambiguation)"])
                .with_page(MockPage::disambiguation(
                    "Yamato (disambiguation)",
                    &["Yamato-class battleship", "Yamato Province", "Yamato (mythology)"],
                )),
        );
        let (orchestrator, _) = orchestrator(knowledge.clone());
        let orchestrator = orchestrator.with_similarity(fixed_scores(&[
            ("Yamato (disambiguation)", 0.9),
            ("Yamato-class battleship", 0.8),
            ("Yamato Province", 0.55),
            ("Yamato (mythology)", 0.3),
        ]));

        let payload = orchestrator.answer("Tell me about Yamato").await.unwrap();
        assert!(payload.is_ambiguous());
        assert_eq!(payload.citation(), None);
        assert_eq!(
            payload.answer(),
            "I found multiple possible entries for your question. Please specify one of the following:\n\
             - <a href='https://en.wikipedia.org/wiki/Yamato-class_battleship' target='_blank'>Yamato-class battleship</a>\n\
             - <a href='https://en.wikipedia.org/wiki/Yamato_Province' target='_blank'>Yamato Province</a>"
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["disambiguation"], true);
        assert!(json["citation"].is_null());
        assert_eq!(json["options"][1]["title"], "Yamato Province");
        assert!(json.get("images").is_none());
        // Ambiguous subjects skip image lookup
        assert_eq!(knowledge.call_count("images"), 0);
    }

    #[test]
    fn test_option_markup_is_escaped() {
        let payload = AnswerPayload::ambiguous(vec![DisambiguationCandidate {
            title: "Jane's Fighting Ships & <Navies>".to_string(),
            url: "https://en.wikipedia.org/wiki/Jane's_Fighting_Ships".to_string(),
        }]);

        let listing = payload.answer().lines().nth(1).unwrap();
        assert_eq!(
            listing,
            "- <a href='https://en.wikipedia.org/wiki/Jane&#39;s_Fighting_Ships' target='_blank'>\
             Jane&#39;s Fighting Ships &amp; &lt;Navies&gt;</a>"
        );
        // Options themselves stay raw for JSON clients
        match payload {
            AnswerPayload::Disambiguation { options, .. } => {
                assert_eq!(options[0].title, "Jane's Fighting Ships & <Navies>");
            }
            other => panic!("expected disambiguation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_subject_gets_apology() {
        let knowledge = Arc::new(MockKnowledgeSource::demo());
        let (orchestrator, _) = orchestrator(knowledge.clone());

        let payload = orchestrator.answer("What is xyznonexistent123").await.unwrap();
        assert_eq!(payload, AnswerPayload::not_found());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["answer"], "I'm sorry, I don't know the answer to that.");
        assert!(json["citation"].is_null());
        assert_eq!(json["images"], serde_json::json!([]));
        assert_eq!(knowledge.call_count("images"), 0);
    }

    #[tokio::test]
    async fn test_composer_failure_is_an_error() {
        let knowledge = Arc::new(MockKnowledgeSource::demo());
        let (orchestrator, history) =
            orchestrator_with(knowledge, Arc::new(MockComposer::failing()), Arc::new(MockProbe::new()));

        let err = orchestrator.ask("s1", "Who is Chester Nimitz").await.unwrap_err();
        assert!(matches!(err, AppError::ComposerError { .. }));
        assert!(history.turns("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ask_records_both_turns() {
        let knowledge = Arc::new(MockKnowledgeSource::demo());
        let (orchestrator, history) = orchestrator(knowledge);

        orchestrator.ask("s1", "Who is Chester Nimitz").await.unwrap();
        orchestrator.ask("s1", "What is xyznonexistent123").await.unwrap();

        let turns = orchestrator.history("s1").await.unwrap();
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "Who is Chester Nimitz");
        assert_eq!(turns[1].role, Role::Ai);
        assert_eq!(turns[1].citation.as_deref(), Some("https://en.wikipedia.org/wiki/Chester_W._Nimitz"));
        assert_eq!(turns[3].text, NOT_FOUND_ANSWER);
        assert_eq!(turns[3].citation, None);

        orchestrator.clear_history("s1").await.unwrap();
        assert!(history.turns("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_citation_uses_extracted_subject() {
        let knowledge = Arc::new(MockKnowledgeSource::demo());
        let probe = Arc::new(MockProbe::new().with_status("https://www.navweaps.com/Weapons/index.html", 200));
        let (orchestrator, _) = orchestrator_with(knowledge.clone(), Arc::new(MockComposer::new()), probe.clone());

        let (subject, citation) = orchestrator.find_citation("Tell me about the Graf Spee").await.unwrap();
        assert_eq!(subject.as_str(), "graf spee");
        assert_eq!(citation.as_deref(), Some("https://www.navweaps.com/Weapons/index.html"));
        assert_eq!(probe.probed()[0], "https://en.wikipedia.org/wiki/graf_spee");
        // Citation probing never consults the knowledge source
        assert!(knowledge.calls().is_empty());

        assert!(orchestrator.find_citation("???").await.is_err());
    }
}
