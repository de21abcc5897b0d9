use std::thread;

use crag_core::error::{AppError, ErrorKind};

use crate::embeddings::Embedder;

/// Embed `texts` in `batch_size` slices, up to `parallel` slices in flight at a time.
///
/// Output order always equals input order. Any failed batch fails the whole call;
/// no partial result is returned.
pub fn embed_in_batches(
    embedder: &dyn Embedder,
    model: &str,
    texts: &[String],
    batch_size: usize,
    parallel: usize,
) -> Result<Vec<Vec<f32>>, AppError> {
    if batch_size == 0 || parallel == 0 {
        return Err(AppError::new(
            ErrorKind::Configuration,
            "RAG_CONFIG_INVALID",
            "batch_size and parallel_batches must be greater than zero",
        )
        .with_details(format!("batch_size={batch_size}; parallel={parallel}")));
    }

    let batches: Vec<&[String]> = texts.chunks(batch_size).collect();
    let mut out: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
    let mut done = 0usize;

    for (wave_idx, wave) in batches.chunks(parallel).enumerate() {
        let first = wave_idx * parallel;
        let results: Vec<Result<Vec<Vec<f32>>, AppError>> = if wave.len() == 1 {
            vec![embed_batch(embedder, model, wave[0])]
        } else {
            thread::scope(|scope| {
                let handles: Vec<_> = wave
                    .iter()
                    .map(|batch| scope.spawn(move || embed_batch(embedder, model, batch)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(AppError::new(
                                ErrorKind::Provider,
                                "RAG_EMBEDDINGS_FAILED",
                                "Embedding worker panicked",
                            ))
                        })
                    })
                    .collect()
            })
        };

        // Results are in wave order, so appending keeps input order.
        for (offset, result) in results.into_iter().enumerate() {
            let batch_no = first + offset;
            let vectors = result.map_err(|e| {
                tracing::warn!(batch = batch_no, code = %e.code, "embedding batch failed; aborting ingest");
                let details = format!(
                    "batch={batch_no}; batch_size={batch_size}; {}",
                    e.details.clone().unwrap_or_default()
                );
                e.with_details(details)
            })?;
            out.extend(vectors);
        }
        done += wave.len();
        tracing::info!(batches_done = done, batches_total = batches.len(), "embedding progress");
    }

    Ok(out)
}

fn embed_batch(embedder: &dyn Embedder, model: &str, batch: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
    let vectors = embedder.embed(model, batch)?;
    if vectors.len() != batch.len() {
        return Err(AppError::new(
            ErrorKind::Provider,
            "RAG_EMBEDDINGS_MISALIGNED",
            "Provider returned a different number of vectors than inputs",
        )
        .with_details(format!("inputs={}; vectors={}", batch.len(), vectors.len())));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text's numeric suffix so order can be checked.
    struct IndexEmbedder {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        drop_one: bool,
    }

    impl IndexEmbedder {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on_call: None,
                drop_one: false,
            }
        }
    }

    impl Embedder for IndexEmbedder {
        fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_call == Some(call) {
                return Err(AppError::new(ErrorKind::Provider, "RAG_EMBEDDINGS_FAILED", "boom").with_retryable(true));
            }
            let mut out: Vec<Vec<f32>> = inputs
                .iter()
                .map(|s| vec![s.trim_start_matches('t').parse::<f32>().unwrap_or(-1.0)])
                .collect();
            if self.drop_one {
                out.pop();
            }
            Ok(out)
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{i}")).collect()
    }

    #[test]
    fn preserves_order_for_any_batch_size_and_parallelism() {
        let input = texts(23);
        for batch_size in [1, 2, 5, 23, 128] {
            for parallel in [1, 3, 8] {
                let e = IndexEmbedder::ok();
                let out = embed_in_batches(&e, "m", &input, batch_size, parallel).unwrap();
                let got: Vec<f32> = out.iter().map(|v| v[0]).collect();
                let want: Vec<f32> = (0..23).map(|i| i as f32).collect();
                assert_eq!(got, want, "batch_size={batch_size} parallel={parallel}");
                assert_eq!(e.calls.load(Ordering::SeqCst), 23usize.div_ceil(batch_size));
            }
        }
    }

    #[test]
    fn a_failed_batch_fails_everything() {
        let e = IndexEmbedder {
            fail_on_call: Some(2),
            ..IndexEmbedder::ok()
        };
        let err = embed_in_batches(&e, "m", &texts(10), 2, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Provider);
        assert!(err.retryable);
        assert!(err.details.unwrap().contains("batch=2"));
    }

    #[test]
    fn short_batch_is_misalignment() {
        let e = IndexEmbedder {
            drop_one: true,
            ..IndexEmbedder::ok()
        };
        let err = embed_in_batches(&e, "m", &texts(4), 4, 1).unwrap_err();
        assert_eq!(err.code, "RAG_EMBEDDINGS_MISALIGNED");
    }

    #[test]
    fn empty_input_makes_no_calls() {
        let e = IndexEmbedder::ok();
        assert!(embed_in_batches(&e, "m", &[], 4, 2).unwrap().is_empty());
        assert_eq!(e.calls.load(Ordering::SeqCst), 0);
    }
}
