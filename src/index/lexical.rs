/// Tantivy keyword index ranked by BM25
use super::IndexError;
use std::collections::BTreeSet;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::TokenStream;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

/// Writer heap for snapshot builds (single indexing thread)
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Stemming English analyzer registered by default in Tantivy
const TOKENIZER: &str = "en_stem";

/// Lexical hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalHit {
    /// Document slot in the owning snapshot
    pub doc: usize,
    /// BM25 relevance score
    pub score: f32,
}

struct Inner {
    index: Index,
    reader: IndexReader,
    doc_field: Field,
    text_field: Field,
}

/// In-memory Tantivy index wrapper
///
/// Built from the full passage set of one snapshot, so corpus statistics
/// (document frequencies, average length) are never stale. User text is
/// never handed to Tantivy's query parser: it is tokenized with the field's
/// analyzer and turned into a disjunction of term queries, so punctuation
/// like `?` or `:` cannot produce parse errors.
pub struct LexicalIndex {
    inner: Option<Inner>,
    len: usize,
}

impl LexicalIndex {
    /// An index over no documents
    pub fn empty() -> Self {
        Self {
            inner: None,
            len: 0,
        }
    }

    /// Build an index from `texts`, where slot `i` is document `i`
    pub fn build(texts: &[&str]) -> Result<Self, IndexError> {
        if texts.is_empty() {
            return Ok(Self::empty());
        }

        let mut schema_builder = Schema::builder();

        let doc_field = schema_builder.add_u64_field("doc", INDEXED | STORED);
        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let text_field = schema_builder.add_text_field("text", text_options);

        let schema = schema_builder.build();
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| IndexError::BuildError(e.to_string()))?;

        for (slot, text) in texts.iter().enumerate() {
            writer
                .add_document(doc!(
                    doc_field => slot as u64,
                    text_field => *text,
                ))
                .map_err(|e| IndexError::BuildError(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| IndexError::BuildError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::BuildError(e.to_string()))?;

        tracing::debug!("Built lexical index over {} documents", texts.len());

        Ok(Self {
            inner: Some(Inner {
                index,
                reader,
                doc_field,
                text_field,
            }),
            len: texts.len(),
        })
    }

    /// Search the index
    ///
    /// # Returns
    /// Up to `limit` hits sorted by BM25 score descending, ties by document
    /// slot. Queries with no indexable terms yield no hits.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>, IndexError> {
        let inner = match &self.inner {
            Some(inner) if limit > 0 => inner,
            _ => return Ok(Vec::new()),
        };

        let terms = inner.query_terms(query)?;
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .into_iter()
            .map(|term| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(inner.text_field, &term),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = inner.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| IndexError::SearchError(e.to_string()))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| IndexError::SearchError(e.to_string()))?;

            let slot = retrieved
                .get_first(inner.doc_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    IndexError::SearchError("Missing or invalid doc field".to_string())
                })?;

            hits.push(LexicalHit {
                doc: slot as usize,
                score,
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc.cmp(&b.doc)));

        Ok(hits)
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Inner {
    /// Distinct analyzed terms of `query`, in sorted order
    fn query_terms(&self, query: &str) -> Result<BTreeSet<String>, IndexError> {
        let mut analyzer = self.index.tokenizer_for_field(self.text_field)?;
        let mut stream = analyzer.token_stream(query);

        let mut terms = BTreeSet::new();
        while let Some(token) = stream.next() {
            terms.insert(token.text.clone());
        }

        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let index = LexicalIndex::build(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.search("aspirin", 10).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_search() {
        let index = LexicalIndex::build(&[
            "The quick brown fox jumps over the lazy dog",
            "A fast red fox leaps above a sleepy canine",
            "Python programming language tutorial",
        ])
        .unwrap();

        assert_eq!(index.len(), 3);

        let hits = index.search("fox", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].doc == 0 || hits[0].doc == 1);

        let hits = index.search("python", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc, 2);
    }

    #[test]
    fn test_punctuation_does_not_break_queries() {
        let index = LexicalIndex::build(&["Aspirin dosage is 325mg", "Ibuprofen: take with food"])
            .unwrap();

        let hits = index.search("What is the aspirin dosage?", 10).unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].doc, 0);

        let hits = index.search("ibuprofen: \"food", 10).unwrap();
        assert_eq!(hits[0].doc, 1);
    }

    #[test]
    fn test_stemming_matches_inflections() {
        let index = LexicalIndex::build(&["Patients were treated with antibiotics"]).unwrap();
        let hits = index.search("treating patient", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_limit_bounds_results() {
        let texts: Vec<String> = (0..20).map(|i| format!("dosage table row {}", i)).collect();
        let refs: Vec<&str> = texts.iter().map(|t| t.as_str()).collect();
        let index = LexicalIndex::build(&refs).unwrap();

        assert_eq!(index.search("dosage", 5).unwrap().len(), 5);
        assert!(index.search("dosage", 0).unwrap().is_empty());
        assert!(index.search("?!", 5).unwrap().is_empty());
    }
}
