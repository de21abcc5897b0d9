use crag_core::domain::ChunkMetadata;
use crag_core::error::{AppError, ErrorKind};

/// Embeddings and their metadata, row-aligned: row `i` of `values` and `metadata[i]`
/// describe the same chunk. Only constructed whole; never mutated row by row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorTable {
    dims: usize,
    values: Vec<f32>,
    metadata: Vec<ChunkMetadata>,
}

impl VectorTable {
    /// Build from provider output. Shape problems here mean the provider broke its contract.
    pub fn from_rows(vectors: Vec<Vec<f32>>, metadata: Vec<ChunkMetadata>) -> Result<Self, AppError> {
        if vectors.len() != metadata.len() {
            return Err(AppError::new(
                ErrorKind::Provider,
                "RAG_EMBEDDINGS_MISALIGNED",
                "Embedding count does not match chunk count",
            )
            .with_details(format!("vectors={}; chunks={}", vectors.len(), metadata.len())));
        }
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        let mut values = Vec::with_capacity(dims * vectors.len());
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != dims || dims == 0 {
                return Err(AppError::new(
                    ErrorKind::Provider,
                    "RAG_DIMENSION_MISMATCH",
                    "Embedding dimension mismatch across chunks",
                )
                .with_details(format!("expected={dims}; got={}; row={row}", v.len())));
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(AppError::new(
                    ErrorKind::Provider,
                    "RAG_EMBEDDINGS_NON_FINITE",
                    "Embedding contains non-finite values",
                )
                .with_details(format!("row={row}")));
            }
            values.extend_from_slice(v);
        }
        Ok(Self { dims, values, metadata })
    }

    /// Build from decoded snapshot sections. Shape problems here mean the snapshot is corrupt.
    pub(crate) fn from_flat(dims: usize, values: Vec<f32>, metadata: Vec<ChunkMetadata>) -> Result<Self, AppError> {
        let expected = dims.checked_mul(metadata.len());
        if expected != Some(values.len()) || (dims == 0 && !metadata.is_empty()) {
            return Err(AppError::new(
                ErrorKind::CorruptState,
                "RAG_SNAPSHOT_CORRUPT",
                "Snapshot vector and metadata sections disagree",
            )
            .with_details(format!("dims={dims}; values={}; metadata={}", values.len(), metadata.len())));
        }
        Ok(Self { dims, values, metadata })
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn metadata(&self, row: usize) -> Option<&ChunkMetadata> {
        self.metadata.get(row)
    }

    pub fn all_metadata(&self) -> &[ChunkMetadata] {
        &self.metadata
    }

    pub(crate) fn raw_values(&self) -> &[f32] {
        &self.values
    }

    /// `(vector, metadata)` pairs in storage order.
    pub fn rows(&self) -> impl Iterator<Item = (&[f32], &ChunkMetadata)> + '_ {
        let dims = self.dims.max(1);
        self.values.chunks_exact(dims).zip(self.metadata.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(s: &str) -> ChunkMetadata {
        ChunkMetadata {
            content: s.to_string(),
            context: String::new(),
            source_url: "u".to_string(),
        }
    }

    #[test]
    fn rows_stay_aligned() {
        let t = VectorTable::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![meta("a"), meta("b")]).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.dims(), 2);
        assert_eq!(t.metadata(1).map(|m| m.content.as_str()), Some("b"));
        assert!(t.metadata(2).is_none());
        let rows: Vec<(&[f32], &str)> = t.rows().map(|(v, m)| (v, m.content.as_str())).collect();
        assert_eq!(rows, vec![(&[1.0, 2.0][..], "a"), (&[3.0, 4.0][..], "b")]);
    }

    #[test]
    fn rejects_mixed_dimensions_and_count_mismatch() {
        let err = VectorTable::from_rows(vec![vec![1.0, 2.0], vec![3.0]], vec![meta("a"), meta("b")]).unwrap_err();
        assert_eq!(err.code, "RAG_DIMENSION_MISMATCH");
        let err = VectorTable::from_rows(vec![vec![1.0]], vec![meta("a"), meta("b")]).unwrap_err();
        assert_eq!(err.code, "RAG_EMBEDDINGS_MISALIGNED");
        let err = VectorTable::from_rows(vec![vec![f32::NAN]], vec![meta("a")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Provider);
    }

    #[test]
    fn flat_shape_mismatch_is_corrupt() {
        let err = VectorTable::from_flat(2, vec![1.0, 2.0, 3.0], vec![meta("a")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CorruptState);
    }
}
