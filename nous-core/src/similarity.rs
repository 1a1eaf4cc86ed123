//! Semantic similarity strategies.
//!
//! The connection analyzer only sees [`SemanticSimilarity`]; the graph core
//! has no dependency on any particular embedding or NLP library.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::extraction::content_words;
use crate::types::Embedding;

/// Similarity of two concept names, in [0, 1].
pub trait SemanticSimilarity: Send + Sync {
    /// Compare two normalized concept names.
    fn similarity(&self, a: &str, b: &str) -> f64;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// `|words(a) ∩ words(b)| / |words(a) ∪ words(b)|`, stopwords excluded.
#[must_use]
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let wa: BTreeSet<String> = content_words(a).into_iter().collect();
    let wb: BTreeSet<String> = content_words(b).into_iter().collect();
    let union = wa.union(&wb).count();
    if union == 0 {
        return 0.0;
    }
    wa.intersection(&wb).count() as f64 / union as f64
}

/// Jaccard overlap of content words.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenOverlap;

impl SemanticSimilarity for TokenOverlap {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        token_overlap(a, b)
    }

    fn name(&self) -> &str {
        "token_overlap"
    }
}

/// Cosine similarity of embeddings, falling back to token overlap when
/// either side has no usable embedding.
///
/// Embeddings are cached per concept name; a failed or zero embedding is
/// cached as `None` so the provider is not retried for the same name.
pub struct EmbeddingSimilarity<P: EmbeddingProvider> {
    provider: P,
    cache: Mutex<LruCache<String, Option<Embedding>>>,
}

impl<P: EmbeddingProvider> EmbeddingSimilarity<P> {
    /// Wrap a provider with an LRU cache of `capacity` names.
    #[must_use]
    pub fn new(provider: P, capacity: NonZeroUsize) -> Self {
        Self {
            provider,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Embeddings of `a` and `b`, embedding every cache miss in one batch.
    fn embeddings(&self, a: &str, b: &str) -> (Option<Embedding>, Option<Embedding>) {
        let (mut ea, mut eb) = {
            let mut cache = self.cache.lock();
            (cache.get(a).cloned(), cache.get(b).cloned())
        };
        let mut misses: Vec<&str> = Vec::with_capacity(2);
        if ea.is_none() {
            misses.push(a);
        }
        if eb.is_none() && a != b {
            misses.push(b);
        }
        if !misses.is_empty() {
            let computed: Vec<Option<Embedding>> = match self.provider.embed_batch(&misses) {
                Ok(batch) if batch.len() == misses.len() => batch
                    .into_iter()
                    .map(|e| (!e.is_zero()).then_some(e))
                    .collect(),
                Ok(_) => vec![None; misses.len()],
                Err(e) => {
                    debug!(error = %e, "Embedding failed, using token overlap");
                    vec![None; misses.len()]
                }
            };
            let mut cache = self.cache.lock();
            for (name, embedding) in misses.iter().zip(computed) {
                cache.put((*name).to_string(), embedding.clone());
                if *name == a && ea.is_none() {
                    ea = Some(embedding.clone());
                }
                if *name == b && eb.is_none() {
                    eb = Some(embedding);
                }
            }
        }
        (ea.flatten(), eb.flatten())
    }
}

impl<P: EmbeddingProvider> std::fmt::Debug for EmbeddingSimilarity<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSimilarity")
            .field("model", &self.provider.model_name())
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

impl<P: EmbeddingProvider> SemanticSimilarity for EmbeddingSimilarity<P> {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        match self.embeddings(a, b) {
            (Some(ea), Some(eb)) => f64::from(cosine_similarity(&ea, &eb)).clamp(0.0, 1.0),
            _ => token_overlap(a, b),
        }
    }

    fn name(&self) -> &str {
        "embedding_cosine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::error::{NousError, Result};

    struct Failing;

    impl EmbeddingProvider for Failing {
        fn embed(&self, _text: &str) -> Result<Embedding> {
            Err(NousError::Embedding("offline".into()))
        }
        fn dimensions(&self) -> usize {
            8
        }
        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn cap() -> NonZeroUsize {
        NonZeroUsize::new(16).expect("non-zero")
    }

    #[test]
    fn token_overlap_is_jaccard() {
        assert!((token_overlap("machine learning", "deep learning") - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(token_overlap("python", "coding"), 0.0);
        assert_eq!(token_overlap("the", "a"), 0.0);
        assert!((token_overlap("rust", "Rust") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn embedding_similarity_is_bounded() {
        let sim = EmbeddingSimilarity::new(HashingEmbeddingProvider::default(), cap());
        let s = sim.similarity("python", "pythonic");
        assert!((0.0..=1.0).contains(&s));
        assert!((sim.similarity("rust", "rust") - 1.0).abs() < 1e-5);
    }

    #[test]
    fn failing_provider_falls_back_to_overlap() {
        let sim = EmbeddingSimilarity::new(Failing, cap());
        let s = sim.similarity("machine learning", "deep learning");
        assert!((s - 1.0 / 3.0).abs() < 1e-12);
    }

    #[derive(Default)]
    struct Counting {
        batches: std::sync::atomic::AtomicUsize,
        texts: std::sync::atomic::AtomicUsize,
    }

    impl EmbeddingProvider for Counting {
        fn embed(&self, text: &str) -> Result<Embedding> {
            HashingEmbeddingProvider::default().embed(text)
        }
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
            use std::sync::atomic::Ordering;
            self.batches.fetch_add(1, Ordering::Relaxed);
            self.texts.fetch_add(texts.len(), Ordering::Relaxed);
            texts.iter().map(|t| self.embed(t)).collect()
        }
        fn dimensions(&self) -> usize {
            HashingEmbeddingProvider::default().dimensions()
        }
        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn cache_misses_are_embedded_in_one_batch() {
        use std::sync::atomic::Ordering;
        let sim = EmbeddingSimilarity::new(Counting::default(), cap());
        sim.similarity("python", "pythonic");
        assert_eq!(sim.provider.batches.load(Ordering::Relaxed), 1);
        assert_eq!(sim.provider.texts.load(Ordering::Relaxed), 2);

        sim.similarity("pythonic", "python");
        assert_eq!(sim.provider.batches.load(Ordering::Relaxed), 1);

        sim.similarity("python", "rust");
        assert_eq!(sim.provider.batches.load(Ordering::Relaxed), 2);
        assert_eq!(sim.provider.texts.load(Ordering::Relaxed), 3);
    }
}
