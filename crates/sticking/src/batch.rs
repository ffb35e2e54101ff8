//! Parallel transcription of independent requests.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

use crate::engine::StickingEngine;
use crate::onset::OnsetSequence;
use crate::ranker::HypothesisList;
use crate::{Error, Result};

/// Transcribe every request on the blocking pool.
///
/// Each search is CPU-bound and shares nothing with the others except the
/// engine's read-only scorer. Results come back in request order and one
/// failing request does not affect the rest.
pub async fn transcribe_all(
    engine: Arc<StickingEngine>,
    requests: Vec<OnsetSequence>,
) -> Vec<Result<HypothesisList>> {
    let count = requests.len();
    let mut tasks = JoinSet::new();

    for (index, onsets) in requests.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        tasks.spawn_blocking(move || (index, engine.transcribe(&onsets)));
    }

    let mut results: Vec<Option<Result<HypothesisList>>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!(error = %e, "transcription task did not complete"),
        }
    }

    results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(Error::InvalidState(
                    "transcription task panicked or was cancelled".into(),
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::onset::{DrumType, OnsetEvent};

    #[tokio::test]
    async fn results_keep_request_order() {
        let engine = Arc::new(StickingEngine::new(EngineConfig::default()).unwrap());
        let requests: Vec<OnsetSequence> = (1..=5)
            .map(|n| {
                OnsetSequence::new(
                    (0..n)
                        .map(|i| OnsetEvent::new(i as f64 * 0.3, DrumType::Snare, 0.7))
                        .collect(),
                )
                .unwrap()
            })
            .collect();

        let results = transcribe_all(engine, requests).await;
        assert_eq!(results.len(), 5);
        for (i, result) in results.into_iter().enumerate() {
            let list = result.unwrap();
            assert_eq!(list.primary().sticking.len(), i + 1);
        }
    }

    #[tokio::test]
    async fn empty_batch() {
        let engine = Arc::new(StickingEngine::new(EngineConfig::default()).unwrap());
        assert!(transcribe_all(engine, Vec::new()).await.is_empty());
    }
}
