//! Subject Extractor - turns a free-form question into a search subject
//!
//! Questions are matched against an ordered table of question framings.
//! The first framing that matches wins; the last entry is a catch-all, so
//! extraction never fails.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Characters removed before matching
const STRIPPED: [char; 3] = ['?', '!', '.'];

/// Leading articles removed from the captured subject
const ARTICLES: [&str; 3] = ["the ", "a ", "an "];

/// Question framings in priority order: (name, pattern capturing the subject)
const FRAMINGS: &[(&str, &str)] = &[
    ("what_can_you_tell_me_about", r"^what can you tell me about (.+)"),
    ("tell_me_about", r"^tell me about (.+)"),
    ("give_me_information_about", r"^give me information about (.+)"),
    ("what_is", r"^what is (.+)"),
    ("who_is", r"^who is (.+)"),
    ("where_is", r"^where is (.+)"),
    ("when_was", r"^when was (.+)"),
    ("info_about", r"^info about (.+)"),
    ("details_about", r"^details about (.+)"),
    ("can_you_tell_me_about", r"^can you tell me about (.+)"),
    ("whole_question", r"^(.+)"),
];

/// One compiled entry of the framing table
#[derive(Debug)]
pub struct Framing {
    pub name: &'static str,
    pattern: Regex,
}

impl Framing {
    /// The captured subject span, if this framing matches
    fn capture<'q>(&self, question: &'q str) -> Option<&'q str> {
        self.pattern
            .captures(question)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Normalized search term derived from a question
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject(String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Subject extractor over the framing table
#[derive(Debug)]
pub struct SubjectExtractor {
    framings: &'static [Framing],
}

impl SubjectExtractor {
    pub fn new() -> Self {
        Self { framings: framings() }
    }

    /// The framing table in priority order
    pub fn framings(&self) -> &[Framing] {
        self.framings
    }

    /// Extract the subject of a question. Pure and total.
    pub fn extract(&self, question: &str) -> Subject {
        let cleaned = clean(question);

        let subject = self
            .framings
            .iter()
            .find_map(|framing| framing.capture(&cleaned))
            .map(strip_article)
            .unwrap_or_else(|| cleaned.trim().to_string());

        Subject(subject)
    }

    /// Name of the framing that decides `question`, if any
    pub fn framing(&self, question: &str) -> Option<&'static str> {
        let cleaned = clean(question);
        self.framings
            .iter()
            .find(|framing| framing.capture(&cleaned).is_some())
            .map(|framing| framing.name)
    }
}

impl Default for SubjectExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn framings() -> &'static [Framing] {
    static TABLE: OnceLock<Vec<Framing>> = OnceLock::new();
    TABLE.get_or_init(|| {
        FRAMINGS
            .iter()
            .map(|&(name, pattern)| Framing {
                name,
                pattern: Regex::new(pattern).expect("framing patterns are valid"),
            })
            .collect()
    })
}

/// Lowercase and drop `?`, `!` and `.`
fn clean(question: &str) -> String {
    question.to_lowercase().replace(STRIPPED, "")
}

fn strip_article(span: &str) -> String {
    let span = span.trim();
    let span = ARTICLES
        .iter()
        .find_map(|article| span.strip_prefix(article))
        .unwrap_or(span);
    span.trim().to_string()
}
