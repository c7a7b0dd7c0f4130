//! Set-union fusion of dense and lexical candidates

use super::{Candidate, RetrievalError};
use crate::corpus::{Passage, PassageKey};
use ahash::AHashSet;
use std::sync::Arc;

/// Merge both candidate lists into one passage set
///
/// Scores are discarded. Passages keep first-seen order (dense first, then
/// lexical) and appear once per identity triple.
pub fn merge(dense: Vec<Candidate>, lexical: Vec<Candidate>) -> Vec<Arc<Passage>> {
    let mut seen: AHashSet<PassageKey> = AHashSet::with_capacity(dense.len() + lexical.len());
    let mut merged = Vec::with_capacity(dense.len() + lexical.len());

    for candidate in dense.into_iter().chain(lexical) {
        if seen.insert(candidate.passage().id().clone()) {
            merged.push(candidate.into_passage());
        }
    }

    merged
}

/// Fail if any identity triple occurs twice
pub fn verify_unique(passages: &[Arc<Passage>]) -> Result<(), RetrievalError> {
    let mut seen: AHashSet<&PassageKey> = AHashSet::with_capacity(passages.len());
    for passage in passages {
        if !seen.insert(passage.id()) {
            return Err(RetrievalError::FusionInvariantViolation(
                passage.id().clone(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievalPath;

    fn candidate(source: &str, page: u32, score: f32, path: RetrievalPath) -> Candidate {
        let passage = Passage::new(source, page, 0, format!("{} page {}", source, page)).unwrap();
        Candidate::new(Arc::new(passage), score, path)
    }

    #[test]
    fn test_merge_is_union_without_duplicates() {
        let dense = vec![
            candidate("a.pdf", 1, 0.9, RetrievalPath::Dense),
            candidate("b.pdf", 1, 0.8, RetrievalPath::Dense),
        ];
        let lexical = vec![
            candidate("b.pdf", 1, 12.0, RetrievalPath::Lexical),
            candidate("c.pdf", 2, 7.5, RetrievalPath::Lexical),
        ];

        let merged = merge(dense, lexical);
        let sources: Vec<&str> = merged.iter().map(|p| p.source()).collect();
        assert_eq!(sources, vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert!(verify_unique(&merged).is_ok());
    }

    #[test]
    fn test_fully_overlapping_paths() {
        let dense = vec![candidate("a.pdf", 1, 0.5, RetrievalPath::Dense)];
        let lexical = vec![candidate("a.pdf", 1, 3.0, RetrievalPath::Lexical)];
        assert_eq!(merge(dense, lexical).len(), 1);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(merge(Vec::new(), Vec::new()).is_empty());
        let lexical = vec![candidate("a.pdf", 1, 3.0, RetrievalPath::Lexical)];
        assert_eq!(merge(Vec::new(), lexical).len(), 1);
    }

    #[test]
    fn test_verify_unique_flags_duplicates() {
        let passage = Arc::new(Passage::new("a.pdf", 1, 0, "text").unwrap());
        let result = verify_unique(&[Arc::clone(&passage), passage]);
        assert!(matches!(
            result,
            Err(RetrievalError::FusionInvariantViolation(_))
        ));
    }
}
