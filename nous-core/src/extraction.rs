//! Concept extraction.
//!
//! The engine only depends on the [`ConceptExtractor`] contract: text in,
//! a deduplicated, salience-ranked list of normalized candidates out.
//! [`KeywordExtractor`] is a deterministic default for deployments without
//! an NLP pipeline; real entity/keyword extractors plug in through the
//! same trait.

use std::collections::HashMap;

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::types::normalize_name;

/// Common English function words, never concepts on their own.
pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "get", "got", "had", "has", "have", "having", "he", "her", "here",
    "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it",
    "its", "itself", "just", "let", "like", "me", "more", "most", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "really", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they",
    "this", "those", "through", "to", "too", "under", "until", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours", "yourself", "yourselves",
];

/// Whether `word` (already lowercase) is a stopword.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

/// Lowercase alphanumeric words of `text`, stopwords removed.
#[must_use]
pub fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-').to_lowercase())
        .filter(|w| !w.is_empty() && !is_stopword(w))
        .collect()
}

/// Turns free text into concept candidates.
pub trait ConceptExtractor: Send + Sync {
    /// Extract candidates, most salient first.
    ///
    /// # Errors
    ///
    /// Implementations return [`NousError::Extraction`](crate::NousError::Extraction)
    /// when they cannot produce output; the engine treats that as zero
    /// concepts.
    fn extract(&self, text: &str) -> Result<Vec<String>>;
}

/// Enforce the candidate contract on any extractor's output: normalized,
/// non-empty, at most `max_tokens_per_concept` tokens, not a stopword or an
/// excluded term, deduplicated (first occurrence wins), at most `limit`.
#[must_use]
pub fn sanitize_candidates(raw: &[String], config: &ExtractionConfig, limit: usize) -> Vec<String> {
    let excluded: Vec<String> = config.excluded_terms.iter().map(|t| normalize_name(t)).collect();
    let mut out: Vec<String> = Vec::new();
    for candidate in raw {
        let name = normalize_name(candidate);
        if name.is_empty()
            || name.split(' ').count() > config.max_tokens_per_concept
            || is_stopword(&name)
            || excluded.contains(&name)
            || !name.chars().any(char::is_alphanumeric)
            || out.contains(&name)
        {
            continue;
        }
        out.push(name);
        if out.len() >= limit {
            break;
        }
    }
    out
}

/// Deterministic frequency-ranked keyword extractor.
///
/// Ranks single content words by frequency, ties broken by first
/// occurrence. Words shorter than `min_word_chars` are dropped.
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    max_concepts: usize,
    min_word_chars: usize,
    excluded: Vec<String>,
}

impl KeywordExtractor {
    /// Build from the extraction config.
    #[must_use]
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            max_concepts: config.max_concepts,
            min_word_chars: config.min_word_chars,
            excluded: config.excluded_terms.iter().map(|t| normalize_name(t)).collect(),
        }
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

impl ConceptExtractor for KeywordExtractor {
    fn extract(&self, text: &str) -> Result<Vec<String>> {
        let mut stats: HashMap<String, (usize, usize)> = HashMap::new();
        for (pos, word) in content_words(text).into_iter().enumerate() {
            if word.chars().count() < self.min_word_chars
                || word.chars().all(|c| c.is_ascii_digit())
                || self.excluded.contains(&word)
            {
                continue;
            }
            stats.entry(word).or_insert((0, pos)).0 += 1;
        }

        let mut ranked: Vec<(String, usize, usize)> =
            stats.into_iter().map(|(w, (count, first))| (w, count, first)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        Ok(ranked
            .into_iter()
            .take(self.max_concepts)
            .map(|(w, _, _)| w)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopword_list_is_sorted_for_binary_search() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn keyword_extractor_is_deterministic() {
        let ex = KeywordExtractor::default();
        let a = ex.extract("I love coding in python").expect("extract");
        assert_eq!(a, vec!["love", "coding", "python"]);
        assert_eq!(ex.extract("I love coding in python").expect("extract"), a);
    }

    #[test]
    fn frequency_outranks_position() {
        let ex = KeywordExtractor::default();
        let out = ex
            .extract("graphs are fun; rust graphs are fast, graphs everywhere")
            .expect("extract");
        assert_eq!(out[0], "graphs");
    }

    #[test]
    fn excluded_terms_and_limits() {
        let config = ExtractionConfig {
            max_concepts: 2,
            excluded_terms: vec!["Nous".into()],
            ..ExtractionConfig::default()
        };
        let ex = KeywordExtractor::new(&config);
        let out = ex.extract("nous likes python rust and haskell").expect("extract");
        assert_eq!(out, vec!["likes", "python"]);
    }

    #[test]
    fn min_word_length_comes_from_config() {
        let config = ExtractionConfig {
            min_word_chars: 6,
            ..ExtractionConfig::default()
        };
        let out = KeywordExtractor::new(&config)
            .extract("I love coding in python")
            .expect("extract");
        assert_eq!(out, vec!["coding", "python"]);
    }

    #[test]
    fn sanitize_enforces_contract() {
        let config = ExtractionConfig::default();
        let raw: Vec<String> = vec![
            "  Machine Learning ".into(),
            "machine learning".into(),
            "the".into(),
            "".into(),
            "one two three four five".into(),
            "!!!".into(),
            "Rust".into(),
        ];
        let out = sanitize_candidates(&raw, &config, 10);
        assert_eq!(out, vec!["machine learning", "rust"]);
    }
}
