//! # Inference engine seam
//!
//! The service never decodes anything itself. Each worker owns one value
//! implementing [`Translate`], built for that worker's [`ComputeResource`] by
//! an [`EngineFactory`] when the pool starts. Swapping a decoding strategy is
//! a matter of handing the service a different factory.

mod core_trait;

pub use core_trait::*;

#[cfg(test)]
/// Scripted engine for tests.
///
/// Records every batch it sees and can be told to stall, fail transiently,
/// fail fatally, or reject individual sentences.
pub(crate) mod mock;
