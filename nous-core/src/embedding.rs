//! Vector embedding abstraction layer.
//!
//! Embeddings are optional: when a provider is configured, the connection
//! analyzer compares concepts by cosine similarity instead of token overlap.
//! The crate ships a deterministic feature-hashing provider so the
//! embedding path works without any model.

use crate::error::{NousError, Result};
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Embedding`] if the model fails to produce an
    /// embedding.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts; defaults to calling `embed` in a loop.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Cosine similarity in \[-1, 1\]; `0.0` for mismatched or zero vectors.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() || a.0.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;
    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

// ---------------------------------------------------------------------------
// Feature-hashing provider
// ---------------------------------------------------------------------------

/// Deterministic embeddings from hashed character trigrams.
///
/// Each padded trigram of the lowercase text is hashed into one of
/// `dimensions` buckets with a ±1 sign; the result is L2-normalized. Texts
/// sharing many trigrams ("python" / "pythonic") land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dims: usize,
}

impl HashingEmbeddingProvider {
    /// Create a provider with the given dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Config`] for zero dimensions.
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(NousError::Config("embedding dimensions must be non-zero".into()));
        }
        Ok(Self { dims: dimensions })
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl EmbeddingProvider for HashingEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let padded: Vec<char> = format!("  {}  ", text.trim().to_lowercase()).chars().collect();
        let mut v = vec![0.0_f32; self.dims];
        for gram in padded.windows(3) {
            let gram: String = gram.iter().collect();
            let digest = blake3::hash(gram.as_bytes());
            let bytes = digest.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]);
            let idx = usize::try_from(bucket % self.dims as u64).unwrap_or(0);
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }

        let mag: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag >= f32::EPSILON {
            for x in &mut v {
                *x /= mag;
            }
        }
        Ok(Embedding(v))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hashed-char-trigrams"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
