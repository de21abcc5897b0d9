use crag_core::error::AppError;

/// External embedding capability.
///
/// Contract: one vector per input, in input order, all of the same length for a given
/// `model`. Implementations should return vectors already L2-normalized; the store scores
/// with a plain dot product.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

pub mod voyage_embed;
