//! Hybrid search: BM25 lexical ranking over a tantivy in-RAM index, an
//! optional semantic stage, and Reciprocal Rank Fusion to merge the two.

use std::collections::HashMap;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING,
};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::CatalogError;
use crate::model::OperationRecord;

/// One lexical-stage hit.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub endpoint_id: String,
    pub score: f32,
    pub snippet: Option<String>,
}

/// Field handles for the operation index.
#[derive(Clone)]
struct LexicalFields {
    id: Field,
    operation_id: Field,
    method: Field,
    path: Field,
    summary: Field,
    description: Field,
    tags: Field,
    audience: Field,
}

/// Immutable BM25 index over one snapshot's operation records.
pub struct LexicalIndex {
    index: Index,
    reader: IndexReader,
    fields: LexicalFields,
}

impl LexicalIndex {
    /// Build an in-RAM index over the given records. The index is committed
    /// once and never written again; the owning snapshot is immutable.
    pub fn build<'a, I>(records: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = &'a OperationRecord>,
    {
        let schema = build_schema();
        let fields = extract_fields(&schema)?;
        let index = Index::create_in_ram(schema);

        let mut writer: IndexWriter = index.writer(15_000_000)?;
        for record in records {
            let mut doc = TantivyDocument::new();
            doc.add_text(fields.id, &record.endpoint_id);
            if let Some(op_id) = &record.operation_id {
                doc.add_text(fields.operation_id, op_id);
            }
            doc.add_text(fields.method, &record.method);
            doc.add_text(fields.path, &record.path);
            if let Some(summary) = &record.summary {
                doc.add_text(fields.summary, summary);
            }
            if let Some(description) = &record.description {
                doc.add_text(fields.description, description);
            }
            doc.add_text(fields.tags, record.tags.join(" "));
            doc.add_text(fields.audience, &record.audience);
            writer.add_document(doc)?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;

        Ok(LexicalIndex {
            index,
            reader,
            fields,
        })
    }

    /// BM25 search. The query is sanitized to lowercase alphanumeric tokens
    /// before parsing; an empty sanitized query yields no hits. When
    /// `audience` is set, a term filter excludes other audiences from the
    /// stage entirely.
    pub fn search(
        &self,
        query: &str,
        audience: Option<&str>,
        limit: usize,
    ) -> Result<Vec<LexicalHit>, CatalogError> {
        let sanitized = sanitize_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let parser = QueryParser::for_index(
            &self.index,
            vec![
                self.fields.operation_id,
                self.fields.method,
                self.fields.path,
                self.fields.summary,
                self.fields.description,
                self.fields.tags,
            ],
        );
        let parsed = parser
            .parse_query(&sanitized)
            .map_err(|e| CatalogError::QueryParse {
                message: e.to_string(),
            })?;

        let effective: Box<dyn Query> = match audience {
            Some(aud) => {
                let filter = TermQuery::new(
                    Term::from_field_text(self.fields.audience, aud),
                    IndexRecordOption::Basic,
                );
                Box::new(BooleanQuery::new(vec![
                    (Occur::Must, parsed),
                    (Occur::Must, Box::new(filter)),
                ]))
            }
            None => parsed,
        };

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&effective, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let endpoint_id = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let summary = doc
                .get_first(self.fields.summary)
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            hits.push(LexicalHit {
                endpoint_id,
                score,
                snippet: make_snippet(summary, &sanitized),
            });
        }
        Ok(hits)
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    let text = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("default")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );

    builder.add_text_field("id", STRING | STORED);
    builder.add_text_field("operation_id", text.clone());
    builder.add_text_field("method", text.clone());
    builder.add_text_field("path", text.clone());
    builder.add_text_field("summary", text.clone() | STORED);
    builder.add_text_field("description", text.clone());
    builder.add_text_field("tags", text);
    builder.add_text_field("audience", STRING);
    builder.build()
}

fn extract_fields(schema: &Schema) -> Result<LexicalFields, CatalogError> {
    let field = |name: &str| {
        schema.get_field(name).map_err(|_| {
            CatalogError::Index(tantivy::TantivyError::SchemaError(format!(
                "missing {name} field"
            )))
        })
    };
    Ok(LexicalFields {
        id: field("id")?,
        operation_id: field("operation_id")?,
        method: field("method")?,
        path: field("path")?,
        summary: field("summary")?,
        description: field("description")?,
        tags: field("tags")?,
        audience: field("audience")?,
    })
}

/// Keep lowercase alphanumeric tokens only. Strips query-language syntax so
/// caller input can never break the parser.
fn sanitize_query(query: &str) -> String {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Bracket the first query token found in the stored summary, truncated to a
/// dozen words. `None` when nothing matches.
fn make_snippet(summary: &str, sanitized_query: &str) -> Option<String> {
    if summary.is_empty() {
        return None;
    }
    let tokens: Vec<&str> = sanitized_query.split(' ').collect();
    let words: Vec<&str> = summary.split_whitespace().take(12).collect();

    let mut out = Vec::with_capacity(words.len());
    let mut matched = false;
    for word in &words {
        let bare: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if !matched && tokens.contains(&bare.as_str()) {
            out.push(format!("[{word}]"));
            matched = true;
        } else {
            out.push((*word).to_string());
        }
    }
    if matched {
        Some(out.join(" "))
    } else {
        None
    }
}

/// Fuse two ranked lists with Reciprocal Rank Fusion.
///
/// Each entry scores `weight / (k + rank)` per stage it appears in, summed.
/// Output is sorted by fused score descending, ties broken by lexicographic
/// endpoint id — never by map iteration order.
pub fn fuse(
    lexical: &[(String, f32)],
    semantic: &[(String, f32)],
    k: f32,
    lexical_weight: f32,
    semantic_weight: f32,
) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (rank, (endpoint_id, _)) in lexical.iter().enumerate() {
        let contribution = lexical_weight / (k + (rank + 1) as f32);
        *scores.entry(endpoint_id.clone()).or_insert(0.0) += contribution;
    }
    for (rank, (endpoint_id, _)) in semantic.iter().enumerate() {
        let contribution = semantic_weight / (k + (rank + 1) as f32);
        *scores.entry(endpoint_id.clone()).or_insert(0.0) += contribution;
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
        Some(std::cmp::Ordering::Equal) | None => a.0.cmp(&b.0),
        Some(other) => other,
    });
    fused
}
