//! Lexical memory search using the Tantivy full-text engine
//!
//! Content is indexed with BM25 scoring. Query terms are matched both
//! exactly and as prefixes, so a cue like `deploy` also finds `deployment`.

use crate::error::{MemoryError, Result};
use crate::keywords::tokenize;
use crate::types::{Memory, MemoryId};
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};

const WRITER_BUDGET: usize = 15_000_000;

/// Tantivy schema field handles
#[derive(Clone, Copy)]
struct SchemaFields {
    id: Field,
    content: Field,
}

/// Full-text index over memory content
pub struct MemorySearch {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

impl std::fmt::Debug for MemorySearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySearch")
            .field("index", &"<TantivyIndex>")
            .finish()
    }
}

impl MemorySearch {
    fn build_schema() -> (Schema, SchemaFields) {
        let mut schema_builder = Schema::builder();

        let id = schema_builder.add_text_field("id", STRING | STORED);
        let content = schema_builder.add_text_field("content", TEXT | STORED);

        (schema_builder.build(), SchemaFields { id, content })
    }

    /// Create an in-RAM index. The store rebuilds it from SQLite on open.
    pub fn in_ram() -> Result<Self> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema);

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| MemoryError::SearchIndex(format!("Failed to create reader: {}", e)))?;

        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    fn writer(&self) -> Result<IndexWriter> {
        self.index
            .writer(WRITER_BUDGET)
            .map_err(|e| MemoryError::SearchIndex(format!("Failed to create writer: {}", e)))
    }

    fn commit(&self, mut writer: IndexWriter) -> Result<()> {
        writer
            .commit()
            .map_err(|e| MemoryError::SearchIndex(format!("Failed to commit: {}", e)))?;

        self.reader
            .reload()
            .map_err(|e| MemoryError::SearchIndex(format!("Failed to reload reader: {}", e)))?;

        Ok(())
    }

    /// Index (or re-index) a single memory
    pub fn index_memory(&self, memory: &Memory) -> Result<()> {
        let writer = self.writer()?;

        writer.delete_term(Term::from_field_text(self.fields.id, &memory.id));
        writer
            .add_document(doc!(
                self.fields.id => memory.id.as_str(),
                self.fields.content => memory.content.as_str(),
            ))
            .map_err(|e| MemoryError::SearchIndex(format!("Failed to add document: {}", e)))?;

        self.commit(writer)
    }

    /// Remove a memory from the index
    pub fn remove_memory(&self, memory_id: &str) -> Result<()> {
        let writer = self.writer()?;
        writer.delete_term(Term::from_field_text(self.fields.id, memory_id));
        self.commit(writer)
    }

    /// Replace the whole index with `memories`
    pub fn reindex_all(&self, memories: &[Memory]) -> Result<usize> {
        let writer = self.writer()?;

        writer
            .delete_all_documents()
            .map_err(|e| MemoryError::SearchIndex(format!("Failed to clear index: {}", e)))?;

        for memory in memories {
            writer
                .add_document(doc!(
                    self.fields.id => memory.id.as_str(),
                    self.fields.content => memory.content.as_str(),
                ))
                .map_err(|e| MemoryError::SearchIndex(format!("Failed to add document: {}", e)))?;
        }

        self.commit(writer)?;

        tracing::info!("Reindexed {} memories", memories.len());
        Ok(memories.len())
    }

    /// Ids of the best lexical matches, best first.
    ///
    /// The cue is reduced to plain alphanumeric tokens, so query syntax in
    /// user input is never interpreted.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryId>> {
        let terms = tokenize(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(terms.len() * 2);
        for word in &terms {
            let term = Term::from_field_text(self.fields.content, word);
            subqueries.push((
                Occur::Should,
                Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs)),
            ));
            subqueries.push((
                Occur::Should,
                Box::new(FuzzyTermQuery::new_prefix(term, 0, true)),
            ));
        }
        let combined = BooleanQuery::new(subqueries);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&combined, &TopDocs::with_limit(limit))
            .map_err(|e| MemoryError::SearchIndex(format!("Search failed: {}", e)))?;

        let ids = top_docs
            .into_iter()
            .filter_map(|(_score, doc_address)| {
                let doc: tantivy::TantivyDocument = searcher.doc(doc_address).ok()?;
                let id = doc.get_first(self.fields.id)?.as_str()?.to_string();
                Some(id)
            })
            .collect();

        Ok(ids)
    }

    /// Number of indexed documents
    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Emotion, MemoryKind};
    use chrono::Utc;

    fn memory(id: &str, content: &str) -> Memory {
        Memory {
            id: id.to_string(),
            kind: MemoryKind::Episodic,
            content: content.to_string(),
            encoded_at: Utc::now(),
            last_recalled_at: None,
            recall_count: 0,
            activation: 0.0,
            emotion: Emotion::Neutral,
            emotion_weight: 0.0,
            context: None,
            chunk_id: None,
            reconsolidation_count: 0,
        }
    }

    #[test]
    fn finds_exact_and_prefix_matches() {
        let search = MemorySearch::in_ram().unwrap();
        search.index_memory(&memory("a", "deployment pipeline failed")).unwrap();
        search.index_memory(&memory("b", "coffee with the team")).unwrap();

        assert_eq!(search.search("deploy", 10).unwrap(), vec!["a".to_string()]);
        assert_eq!(search.search("pipeline", 10).unwrap(), vec!["a".to_string()]);
        assert!(search.search("kubernetes", 10).unwrap().is_empty());
    }

    #[test]
    fn query_syntax_is_ignored() {
        let search = MemorySearch::in_ram().unwrap();
        search.index_memory(&memory("a", "auth bug in login")).unwrap();

        assert_eq!(search.search("auth AND (login", 5).unwrap(), vec!["a".to_string()]);
        assert!(search.search("*** ::", 5).unwrap().is_empty());
        assert!(search.search("auth", 0).unwrap().is_empty());
    }

    #[test]
    fn reindex_and_remove() {
        let search = MemorySearch::in_ram().unwrap();
        let docs = vec![memory("a", "rust borrow checker"), memory("b", "rust macros")];
        assert_eq!(search.reindex_all(&docs).unwrap(), 2);
        assert_eq!(search.num_docs(), 2);

        search.remove_memory("a").unwrap();
        assert_eq!(search.search("rust", 10).unwrap(), vec!["b".to_string()]);

        // Re-indexing the same id replaces the document
        search.index_memory(&memory("b", "python decorators")).unwrap();
        assert_eq!(search.num_docs(), 1);
        assert!(search.search("rust", 10).unwrap().is_empty());
    }
}
