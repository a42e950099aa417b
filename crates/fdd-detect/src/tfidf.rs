//! Small TF-IDF index over the canonical section headers, used for the
//! cosine-similarity evidence method.
//!
//! The reference set is the ~60 canonical names and variations, vectorized
//! with word n-grams of length 1-3. Each reference vector remembers the
//! item that contributed its source string, so the best match resolves
//! directly to an item.

use std::collections::HashMap;

const STOP_WORDS: [&str; 28] = [
    "a", "an", "and", "any", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "may",
    "of", "on", "or", "our", "that", "the", "this", "to", "we", "what", "which", "with", "you",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty() && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Word n-grams of length 1..=3 over the filtered token stream.
fn ngrams(tokens: &[String]) -> Vec<String> {
    let mut grams = Vec::new();
    for n in 1..=3usize {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            grams.push(window.join(" "));
        }
    }
    grams
}

struct ReferenceVector {
    item_no: u8,
    weights: HashMap<usize, f64>,
    norm: f64,
}

/// TF-IDF index over the fixed reference headers.
pub struct TfidfIndex {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
    references: Vec<ReferenceVector>,
}

impl TfidfIndex {
    /// Fit the index on `(item_no, reference_text)` pairs.
    pub fn fit(references: &[(u8, &str)]) -> Self {
        let tokenized: Vec<(u8, Vec<String>)> = references
            .iter()
            .map(|(item_no, text)| (*item_no, ngrams(&tokenize(text))))
            .collect();

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut document_frequency: Vec<usize> = Vec::new();
        for (_, grams) in &tokenized {
            let mut seen = std::collections::HashSet::new();
            for gram in grams {
                let index = *vocabulary.entry(gram.clone()).or_insert_with(|| {
                    document_frequency.push(0);
                    document_frequency.len() - 1
                });
                if seen.insert(index) {
                    document_frequency[index] += 1;
                }
            }
        }

        let doc_count = tokenized.len().max(1) as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|&df| ((1.0 + doc_count) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let references = tokenized
            .into_iter()
            .map(|(item_no, grams)| {
                let weights = Self::weigh(&grams, &vocabulary, &idf);
                let norm = vector_norm(&weights);
                ReferenceVector {
                    item_no,
                    weights,
                    norm,
                }
            })
            .collect();

        Self {
            vocabulary,
            idf,
            references,
        }
    }

    fn weigh(
        grams: &[String],
        vocabulary: &HashMap<String, usize>,
        idf: &[f64],
    ) -> HashMap<usize, f64> {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for gram in grams {
            if let Some(&index) = vocabulary.get(gram) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }
        for (index, count) in counts.iter_mut() {
            *count *= idf[*index];
        }
        counts
    }

    /// Best cosine similarity of `text` against the reference set.
    /// Returns `(item_no, similarity)`; `None` when the text shares no
    /// vocabulary with any reference.
    pub fn best_match(&self, text: &str) -> Option<(u8, f64)> {
        let grams = ngrams(&tokenize(text));
        if grams.is_empty() {
            return None;
        }
        let weights = Self::weigh(&grams, &self.vocabulary, &self.idf);
        let norm = vector_norm(&weights);
        if norm == 0.0 {
            return None;
        }

        let mut best: Option<(u8, f64)> = None;
        for reference in &self.references {
            if reference.norm == 0.0 {
                continue;
            }
            let mut dot = 0.0;
            for (index, weight) in &weights {
                if let Some(ref_weight) = reference.weights.get(index) {
                    dot += weight * ref_weight;
                }
            }
            let similarity = dot / (norm * reference.norm);
            if best.map_or(true, |(_, s)| similarity > s) && similarity > 0.0 {
                best = Some((reference.item_no, similarity));
            }
        }
        best
    }
}

fn vector_norm(weights: &HashMap<usize, f64>) -> f64 {
    weights.values().map(|w| w * w).sum::<f64>().sqrt()
}
