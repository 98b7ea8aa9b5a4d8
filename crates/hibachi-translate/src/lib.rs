//! # Hibachi Translate
//!
//! The batching and dispatch core of a sentence translation service: many
//! concurrent requests go in, their sentences are packed into batches, and the
//! batches run on a fixed pool of inference workers.
//!
//! ## Overview
//!
//! A request is a piece of text plus [`TranslationOptions`] and a [`Protocol`]
//! tag. [`TranslationService::submit`] splits it into sentences, queues one
//! job per sentence and hands back a [`RequestHandle`] straight away. From
//! there:
//!
//! - the **scheduler** packs queued jobs, across requests and in arrival
//!   order, into batches bounded by a sentence count and a token count. A
//!   full batch leaves at once; an underfull one leaves after the oldest job
//!   has waited the configured queue timeout.
//! - the **worker pool** runs each batch on whichever worker is idle first.
//!   Every worker owns one engine bound to one [`ComputeResource`].
//! - the **result router** puts sentences back in input order and resolves
//!   the handle exactly once, however batches interleave.
//!
//! ## Engines
//!
//! Decoding lives behind the [`Translate`] trait. Engines are built once per
//! worker by an [`EngineFactory`] and are never shared. An engine reports
//! [`EngineError::Transient`] for resource exhaustion, which gets the batch
//! retried once in halves, and [`EngineError::Fatal`] for faults, which take
//! the worker out of rotation.
//!
//! ## Backpressure
//!
//! Intake rejects work with [`TranslateError::QueueOverflow`] once the
//! dispatch queue is saturated or the job queue is at capacity, and with
//! [`TranslateError::Unavailable`] once no worker is left.
//!

pub mod communication;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod splitter;
pub mod stats;

mod handle;
mod pool;
mod router;
mod scheduler;
mod service;

pub use communication::{PartialTranslation, RequestId, SentenceResult, Translation};
pub use config::ServiceConfig;
pub use engine::{ComputeResource, EngineFactory, Hypothesis, SentenceInput, SentenceOutcome, Translate};
pub use error::{EngineError, Result, TranslateError};
pub use handle::{CancelToken, RequestHandle};
pub use options::{InputFormat, Protocol, TranslationOptions};
pub use pool::WorkerStatus;
pub use service::TranslationService;
pub use splitter::{RuleSplitter, SentenceSplitter};
pub use stats::StatsSnapshot;
