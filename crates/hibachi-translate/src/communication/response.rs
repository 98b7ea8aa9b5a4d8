use serde::Serialize;

use super::job::RequestId;
use crate::engine::Hypothesis;
use crate::options::Protocol;

/// A translated sentence together with its n-best hypotheses, best first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentenceTranslation {
    pub source: String,
    pub hypotheses: Vec<Hypothesis>,
}

impl SentenceTranslation {
    pub fn new(source: impl Into<String>, hypotheses: Vec<Hypothesis>) -> Self {
        Self {
            source: source.into(),
            hypotheses,
        }
    }

    /// The highest ranked hypothesis, if the engine produced any.
    pub fn best(&self) -> Option<&Hypothesis> {
        self.hypotheses.first()
    }
}

/// Why a single sentence has no translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The engine rejected this particular sentence
    Engine,
    /// The batch holding the sentence hit a fatal engine error, or its retry failed
    Fatal,
    /// No worker was left to run the sentence
    Unavailable,
}

/// Structured error marker occupying a failed sentence's slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SentenceFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Terminal outcome of one sentence job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceResult {
    Translated(SentenceTranslation),
    Failed(SentenceFailure),
}

impl SentenceResult {
    pub fn is_failed(&self) -> bool {
        matches!(self, SentenceResult::Failed(_))
    }
}

/// Successful response: one translation per input sentence, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub request_id: RequestId,
    pub protocol: Protocol,
    pub sentences: Vec<SentenceTranslation>,
}

impl Translation {
    pub(crate) fn empty(request_id: RequestId, protocol: Protocol) -> Self {
        Self {
            request_id,
            protocol,
            sentences: vec![],
        }
    }

    /// Best hypothesis of every sentence joined with single spaces.
    pub fn text(&self) -> String {
        self.sentences
            .iter()
            .filter_map(|s| s.best().map(|h| h.text.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Failure response carrying every slot of the request in input order, so
/// sentences that did translate are not lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialTranslation {
    results: Vec<SentenceResult>,
}

impl PartialTranslation {
    pub fn new(results: Vec<SentenceResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failed()).count()
    }

    pub fn results(&self) -> &[SentenceResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<SentenceResult> {
        self.results
    }
}
