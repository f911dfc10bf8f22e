//! Retrieval pipeline
//!
//! The question answering path:
//! - Subject extraction from free-form questions
//! - Tiered resolution against the knowledge source
//! - Image lookup and citation probing
//! - Orchestration into the answer payload

mod citation;
mod media;
mod orchestrator;
mod resolver;
mod similarity;
mod subject;

pub use citation::{CitationFinder, HttpProbe, MockProbe, ReqwestProbe, SUBJECT_PLACEHOLDER};
pub use media::MediaLocator;
pub use orchestrator::{AnswerPayload, Collaborators, Orchestrator, AMBIGUOUS_PREAMBLE, NOT_FOUND_ANSWER};
pub use resolver::{DisambiguationCandidate, KnowledgeResolver, Resolution, ResolverSettings, TierOutcome};
pub use similarity::{sequence_ratio, SequenceRatio, Similarity};
pub use subject::{Framing, Subject, SubjectExtractor};
