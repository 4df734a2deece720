// Corpus statistics (IDF weights)
use crate::remapper::normalize::NormalizedMethod;
use std::collections::HashMap;

/// Token → IDF maps over the union of both snapshots.
///
/// `idf = ln((N + 1) / (df + 1)) + 1`. Aggregation only sums document
/// counts, so the result does not depend on iteration order.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    pub invoked_idf: HashMap<String, f64>,
    pub string_idf: HashMap<String, f64>,
    pub documents: usize,
}

impl CorpusStats {
    pub fn build<'a, I>(methods: I) -> Self
    where
        I: IntoIterator<Item = &'a NormalizedMethod>,
    {
        let mut invoked_df: HashMap<&'a str, u32> = HashMap::new();
        let mut string_df: HashMap<&'a str, u32> = HashMap::new();
        let mut documents: usize = 0;

        for method in methods {
            documents += 1;
            for token in method.canonical_invoked() {
                *invoked_df.entry(token.as_str()).or_insert(0) += 1;
            }
            for token in method.strings() {
                *string_df.entry(token.as_str()).or_insert(0) += 1;
            }
        }

        let to_idf = |df: HashMap<&str, u32>| -> HashMap<String, f64> {
            df.into_iter()
                .map(|(token, count)| (token.to_string(), idf(documents, count)))
                .collect()
        };

        log::debug!(
            "Corpus statistics: {} methods, {} invoked tokens, {} string tokens",
            documents,
            invoked_df.len(),
            string_df.len()
        );

        Self {
            invoked_idf: to_idf(invoked_df),
            string_idf: to_idf(string_df),
            documents,
        }
    }
}

#[inline]
pub fn idf(documents: usize, document_frequency: u32) -> f64 {
    ((documents as f64 + 1.0) / (document_frequency as f64 + 1.0)).ln() + 1.0
}
