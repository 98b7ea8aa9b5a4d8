use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A sentence as handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceInput {
    /// Source text of the sentence
    pub text: String,

    /// Whitespace tokens of `text`; their count is what batch budgets measure
    pub tokens: Vec<String>,

    /// Number of hypotheses requested for this sentence
    pub n_best: usize,
}

impl SentenceInput {
    pub fn new(text: impl Into<String>, n_best: usize) -> Self {
        let text = text.into();
        let tokens = text.split_whitespace().map(str::to_owned).collect();
        Self { text, tokens, n_best }
    }
}

/// One scored translation candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub text: String,
    pub score: f32,
}

impl Hypothesis {
    pub fn new(text: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            score,
        }
    }
}

/// Per-sentence engine outcome: the n-best list, or a message explaining why
/// that one sentence could not be translated.
pub type SentenceOutcome = Result<Vec<Hypothesis>, String>;

/// The compute resource a worker, and therefore its engine, is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeResource {
    /// A CPU thread slot
    Cpu { slot: usize },
    /// An accelerator device
    Device { id: usize },
}

impl fmt::Display for ComputeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeResource::Cpu { slot } => write!(f, "cpu:{slot}"),
            ComputeResource::Device { id } => write!(f, "device:{id}"),
        }
    }
}

/// # Translate
///
/// The decoding capability a worker drives.
///
/// ```ignore
/// use hibachi_translate::engine::{Hypothesis, SentenceInput, SentenceOutcome, Translate};
/// use hibachi_translate::EngineError;
/// use async_trait::async_trait;
///
/// struct Shout;
///
/// #[async_trait]
/// impl Translate for Shout {
///     async fn translate(&mut self, batch: &[SentenceInput]) -> Result<Vec<SentenceOutcome>, EngineError> {
///         Ok(batch
///             .iter()
///             .map(|s| Ok(vec![Hypothesis::new(s.text.to_uppercase(), 0.0)]))
///             .collect())
///     }
/// }
/// ```
///
/// ## Contract
///
/// - The returned vector has exactly one outcome per input, in input order.
///   A length mismatch is treated as a fatal fault.
/// - Each input asks for `n_best` hypotheses; implementations return at most
///   that many, best first.
/// - [`EngineError::Transient`] signals resource exhaustion; the batch is
///   retried once in smaller pieces. [`EngineError::Fatal`] fails the whole
///   batch and retires the worker that owns this engine.
///
/// The receiver is `&mut self`: every worker owns its engine outright and no
/// two workers ever reach the same instance.
#[async_trait]
pub trait Translate: Send {
    async fn translate(&mut self, batch: &[SentenceInput]) -> Result<Vec<SentenceOutcome>, EngineError>;
}

#[async_trait]
impl<T: Translate + ?Sized> Translate for Box<T> {
    async fn translate(&mut self, batch: &[SentenceInput]) -> Result<Vec<SentenceOutcome>, EngineError> {
        (**self).translate(batch).await
    }
}

/// Builds one engine per worker at pool start-up.
///
/// Any `Fn(ComputeResource) -> Result<E, EngineError>` closure is a factory,
/// which is how a decoding strategy gets picked at construction time.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: Translate + 'static;

    fn create(&self, resource: ComputeResource) -> Result<Self::Engine, EngineError>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(ComputeResource) -> Result<E, EngineError> + Send + Sync + 'static,
    E: Translate + 'static,
{
    type Engine = E;

    fn create(&self, resource: ComputeResource) -> Result<E, EngineError> {
        self(resource)
    }
}
