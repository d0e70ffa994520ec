//! Embedding byte encoding and cosine similarity.
//!
//! Mirrors the normalize/compare shape of a model-free feature vector
//! comparator: L2-normalize once, then cosine similarity is a dot product.

use crate::error::{OrchestratorError, Result};
use crate::types::Embedding;

impl Embedding {
    /// Encode as the raw little-endian float32 byte sequence (the store's
    /// on-disk representation).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for v in &self.0 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Decode from the raw little-endian float32 byte sequence.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(OrchestratorError::Recognition(format!(
                "embedding byte length {} is not a multiple of 4",
                bytes.len()
            )));
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self(values))
    }
}

/// Cosine similarity between two embeddings. `None` if dimensions mismatch
/// or either vector is empty.
#[must_use]
pub fn similarity(a: &Embedding, b: &Embedding) -> Option<f32> {
    if a.0.len() != b.0.len() || a.0.is_empty() {
        return None;
    }
    let dot: f32 = a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(&a.0);
    let norm_b = l2_norm(&b.0);
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Fold a new observation into a running centroid average.
///
/// `avg <- (avg * count + e) / (count + 1)`.
pub fn fold_average(avg: &Embedding, count: u32, e: &Embedding) -> Embedding {
    let folded = avg
        .0
        .iter()
        .zip(e.0.iter())
        .map(|(a, b)| (a * count as f32 + b) / (count as f32 + 1.0))
        .collect();
    Embedding(folded)
}
