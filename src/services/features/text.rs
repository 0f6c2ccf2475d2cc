//! Top-k TF-IDF keyword weights for short free-text fields.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// TF-IDF keyword extractor fitted over the item description corpus.
///
/// IDF uses add-one smoothing so terms absent from the fitted corpus
/// still get a finite weight at transform time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfIdfKeywords {
    doc_freq: HashMap<String, usize>,
    n_docs: usize,
}

impl TfIdfKeywords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, documents: &[&str]) {
        self.doc_freq.clear();
        self.n_docs = documents.len();

        for doc in documents {
            let mut seen: Vec<&str> = tokenize(doc).collect();
            seen.sort_unstable();
            seen.dedup();
            for token in seen {
                *self.doc_freq.entry(token.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.n_docs > 0
    }

    fn idf(&self, token: &str) -> f64 {
        let df = self.doc_freq.get(token).copied().unwrap_or(0);
        (1.0 + (1.0 + self.n_docs as f64) / (1.0 + df as f64)).ln()
    }

    /// Top-k keywords of `text` by tf × idf, highest first.
    pub fn top_k(&self, text: &str, k: usize) -> Vec<(String, f64)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut total = 0usize;
        for token in tokenize(text) {
            *counts.entry(token).or_insert(0) += 1;
            total += 1;
        }
        if total == 0 {
            return Vec::new();
        }

        let mut weighted: Vec<(String, f64)> = counts
            .into_iter()
            .map(|(token, count)| {
                let tf = count as f64 / total as f64;
                (token.to_string(), tf * self.idf(token))
            })
            .collect();

        weighted.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        weighted.truncate(k);
        weighted
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
}
