use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::{ComputeResource, Hypothesis, SentenceInput, SentenceOutcome, Translate};
use crate::error::EngineError;

/// Behaviour shared by every mock engine built from the same script.
#[derive(Clone, Default)]
pub struct Script {
    /// Source texts of every batch the engines were called with, in call order
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,

    /// When set, every call waits for one permit before translating
    pub gate: Option<Arc<Semaphore>>,

    /// Number of upcoming calls that fail with a transient error
    pub transient_failures: Arc<AtomicUsize>,

    /// A batch containing this substring fails fatally
    pub fatal_on: Option<String>,

    /// A sentence containing this substring fails on its own
    pub reject_on: Option<String>,

    pub delay: Option<Duration>,
}

impl Script {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let script = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (script, gate)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn engine(&self, resource: ComputeResource) -> MockEngine {
        MockEngine {
            script: self.clone(),
            resource,
        }
    }
}

/// Upper-cases its input; the n-th alternative gets a ` #n` suffix.
pub struct MockEngine {
    script: Script,
    #[allow(dead_code)]
    resource: ComputeResource,
}

pub fn translate_text(text: &str) -> String {
    text.to_uppercase()
}

#[async_trait]
impl Translate for MockEngine {
    async fn translate(&mut self, batch: &[SentenceInput]) -> Result<Vec<SentenceOutcome>, EngineError> {
        self.script
            .calls
            .lock()
            .unwrap()
            .push(batch.iter().map(|s| s.text.clone()).collect());

        if let Some(gate) = &self.script.gate {
            gate.acquire()
                .await
                .map_err(|_| EngineError::Fatal("gate closed".into()))?
                .forget();
        }
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }

        let transient = self
            .script
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(EngineError::Transient("out of device memory".into()));
        }

        if let Some(poison) = &self.script.fatal_on {
            if batch.iter().any(|s| s.text.contains(poison.as_str())) {
                return Err(EngineError::Fatal("device lost".into()));
            }
        }

        Ok(batch
            .iter()
            .map(|sentence| {
                if let Some(reject) = &self.script.reject_on {
                    if sentence.text.contains(reject.as_str()) {
                        return Err(format!("cannot translate {:?}", sentence.text));
                    }
                }
                let best = translate_text(&sentence.text);
                Ok((0..sentence.n_best)
                    .map(|k| match k {
                        0 => Hypothesis::new(best.clone(), 0.0),
                        _ => Hypothesis::new(format!("{best} #{k}"), -(k as f32)),
                    })
                    .collect())
            })
            .collect())
    }
}
