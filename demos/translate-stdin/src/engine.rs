use std::time::Duration;

use async_trait::async_trait;
use hibachi_translate::{ComputeResource, EngineError, Hypothesis, SentenceInput, SentenceOutcome, Translate};

/// Stand-in for a real model: "translates" by reversing word order.
///
/// Alternatives rotate the reversed sentence by one word each, scoring a
/// little worse every step.
pub struct ReverseWords {
    resource: ComputeResource,
    per_sentence: Duration,
}

impl ReverseWords {
    pub fn new(resource: ComputeResource) -> Self {
        Self {
            resource,
            per_sentence: Duration::from_millis(2),
        }
    }
}

#[async_trait]
impl Translate for ReverseWords {
    async fn translate(&mut self, batch: &[SentenceInput]) -> Result<Vec<SentenceOutcome>, EngineError> {
        tracing::trace!(resource = %self.resource, sentences = batch.len(), "decoding batch");
        tokio::time::sleep(self.per_sentence * batch.len() as u32).await;

        Ok(batch
            .iter()
            .map(|sentence| {
                let mut words: Vec<&str> = sentence.tokens.iter().map(String::as_str).rev().collect();
                let hypotheses = (0..sentence.n_best)
                    .map(|k| {
                        let text = words.join(" ");
                        if !words.is_empty() {
                            words.rotate_left(1);
                        }
                        Hypothesis::new(text, -(k as f32) * 0.5)
                    })
                    .collect();
                Ok(hypotheses)
            })
            .collect())
    }
}
