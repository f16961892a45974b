//! Chroma-Backed Index
//!
//! `ChromaIndex` implements the similarity index capability over one
//! Chroma collection. Embeddings are computed client-side by the injected
//! embedder and sent alongside documents and metadata.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::client::{ChromaClient, ChromaError, ChromaQueryResult, CollectionInfo};
use crate::documents::chunker::ChunkMetadata;
use crate::documents::embeddings::Embedder;
use crate::documents::index::{DistanceMetric, IndexError, IndexRecord, RawHit, VectorIndex};

/// Default collection name
pub const COLLECTION_DOCUMENTS: &str = "docs";

/// Fields requested from every query
const QUERY_INCLUDE: &[&str] = &["documents", "metadatas", "distances"];

impl From<ChromaError> for IndexError {
    fn from(e: ChromaError) -> Self {
        IndexError::Backend(e.to_string())
    }
}

/// Build metadata for a document chunk
pub fn chunk_metadata(meta: &ChunkMetadata) -> Value {
    let mut value = json!({ "source_file": meta.source_file });
    if let Some(page) = meta.page_number {
        value["page_number"] = json!(page as i64);
    }
    value
}

/// Read chunk metadata back; missing fields degrade to `"?"` / unknown page
pub fn parse_chunk_metadata(value: Option<&Value>) -> ChunkMetadata {
    let source_file = value
        .and_then(|m| m.get("source_file"))
        .and_then(|v| v.as_str())
        .unwrap_or("?")
        .to_string();

    let page_number = value
        .and_then(|m| m.get("page_number"))
        .and_then(|v| v.as_u64())
        .and_then(|p| u32::try_from(p).ok());

    ChunkMetadata {
        source_file,
        page_number,
    }
}

/// Flatten the first (only) query of a query result
pub fn first_query_hits(result: ChromaQueryResult) -> Result<Vec<RawHit>, IndexError> {
    let Some(ids) = result.ids.into_iter().next() else {
        return Ok(Vec::new());
    };

    let documents = result.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
    let metadatas = result.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
    let distances = result
        .distances
        .and_then(|d| d.into_iter().next())
        .ok_or_else(|| IndexError::Malformed("query result has no distances".to_string()))?;

    if distances.len() != ids.len() {
        return Err(IndexError::Malformed(format!(
            "{} ids but {} distances",
            ids.len(),
            distances.len()
        )));
    }

    let hits = distances
        .into_iter()
        .enumerate()
        .map(|(i, distance)| RawHit {
            text: documents.get(i).cloned().flatten().unwrap_or_default(),
            metadata: parse_chunk_metadata(metadatas.get(i).and_then(|m| m.as_ref())),
            distance,
        })
        .collect();

    Ok(hits)
}

/// Handle on one Chroma collection. Lifecycle: `open`, use, `close`.
pub struct ChromaIndex {
    client: ChromaClient,
    collection: CollectionInfo,
    metric: DistanceMetric,
    embedder: Arc<dyn Embedder>,
}

impl ChromaIndex {
    /// Get or create the collection. The metric only applies on creation.
    pub async fn open(
        client: ChromaClient,
        name: &str,
        metric: DistanceMetric,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        let metadata = json!({ "hnsw:space": metric.as_space() });
        let collection = client.get_or_create_collection(name, Some(metadata)).await?;
        debug!(name = %name, id = %collection.id, space = metric.as_space(), "Opened collection");

        Ok(Self {
            client,
            collection,
            metric,
            embedder,
        })
    }

    pub fn collection(&self) -> &CollectionInfo {
        &self.collection
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn insert(&self, records: Vec<IndexRecord>) -> Result<(), IndexError> {
        if records.is_empty() {
            return Err(IndexError::InvalidInput("records cannot be empty".to_string()));
        }

        let documents: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embedder.embed(&documents).await?;
        let metadatas: Vec<Value> = records.iter().map(|r| chunk_metadata(&r.metadata)).collect();
        let ids: Vec<String> = records.into_iter().map(|r| r.id).collect();

        self.client
            .add(&self.collection.id, ids, documents, Some(embeddings), metadatas)
            .await?;
        Ok(())
    }

    async fn query(&self, query_text: &str, n_results: usize) -> Result<Vec<RawHit>, IndexError> {
        let embedding = self.embedder.embed_one(query_text).await?;
        let n_results = u32::try_from(n_results).unwrap_or(u32::MAX);
        let result = self
            .client
            .query(&self.collection.id, vec![embedding], n_results, QUERY_INCLUDE)
            .await?;
        first_query_hits(result)
    }

    async fn count(&self) -> Result<usize, IndexError> {
        Ok(self.client.count(&self.collection.id).await? as usize)
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn close(&self) -> Result<(), IndexError> {
        info!(collection = %self.collection.name, "Closed collection handle");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::embeddings::HashingEmbedder;
    use crate::test_util::{http_response, ScriptedServer};

    const COLLECTION_JSON: &str = r#"{"id":"c-123","name":"docs","metadata":{"hnsw:space":"l2"}}"#;

    #[test]
    fn test_metadata_round_trip() {
        let meta = ChunkMetadata {
            source_file: "paper.pdf".to_string(),
            page_number: Some(7),
        };
        let value = chunk_metadata(&meta);
        assert_eq!(value, json!({"source_file": "paper.pdf", "page_number": 7}));
        assert_eq!(parse_chunk_metadata(Some(&value)), meta);
    }

    #[test]
    fn test_missing_metadata_is_lenient() {
        let parsed = parse_chunk_metadata(None);
        assert_eq!(parsed.label(), "? p.?");
    }

    #[test]
    fn test_first_query_hits_flattens_batch() {
        let result: ChromaQueryResult = serde_json::from_value(json!({
            "ids": [["a", "b"]],
            "documents": [["first text", null]],
            "metadatas": [[{"source_file": "x.pdf", "page_number": 2}, null]],
            "distances": [[0.15, 0.6]]
        }))
        .unwrap();

        let hits = first_query_hits(result).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "first text");
        assert_eq!(hits[0].metadata.label(), "x.pdf p.2");
        assert_eq!(hits[0].distance, 0.15);
        assert_eq!(hits[1].text, "");
        assert_eq!(hits[1].metadata.source_file, "?");
    }

    #[test]
    fn test_first_query_hits_empty_index() {
        let result: ChromaQueryResult = serde_json::from_value(json!({
            "ids": [[]],
            "documents": [[]],
            "metadatas": [[]],
            "distances": [[]]
        }))
        .unwrap();
        assert!(first_query_hits(result).unwrap().is_empty());
    }

    #[test]
    fn test_first_query_hits_requires_distances() {
        let result: ChromaQueryResult = serde_json::from_value(json!({
            "ids": [["a"]],
            "documents": [["t"]],
            "metadatas": [[{}]],
            "distances": null
        }))
        .unwrap();
        assert!(matches!(first_query_hits(result), Err(IndexError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_open_insert_query_lifecycle() {
        let server = ScriptedServer::start(vec![
            http_response(200, "application/json", COLLECTION_JSON),
            http_response(201, "application/json", "true"),
            http_response(
                200,
                "application/json",
                r#"{"ids":[["id1"]],"documents":[["alpha"]],"metadatas":[[{"source_file":"a.pdf","page_number":1}]],"distances":[[0.3]]}"#,
            ),
        ])
        .await;

        let embedder = Arc::new(HashingEmbedder::new(8));
        let client = ChromaClient::new(&server.url());
        let index = ChromaIndex::open(client, "docs", DistanceMetric::L2, embedder)
            .await
            .unwrap();
        assert_eq!(index.collection().id, "c-123");

        index
            .insert(vec![IndexRecord {
                id: "id1".to_string(),
                text: "alpha".to_string(),
                metadata: ChunkMetadata {
                    source_file: "a.pdf".to_string(),
                    page_number: Some(1),
                },
            }])
            .await
            .unwrap();

        let hits = index.query("alpha", 4).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance, 0.3);
        index.close().await.unwrap();

        let requests = server.finish().await;
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].json()["metadata"]["hnsw:space"], "l2");
        assert_eq!(requests[0].json()["get_or_create"], true);

        let add = requests[1].json();
        assert!(requests[1].path.ends_with("/collections/c-123/add"));
        assert_eq!(add["ids"], json!(["id1"]));
        assert_eq!(add["documents"], json!(["alpha"]));
        assert_eq!(add["metadatas"][0]["page_number"], 1);
        assert_eq!(add["embeddings"][0].as_array().map(|e| e.len()), Some(8));

        let query = requests[2].json();
        assert_eq!(query["n_results"], 4);
        assert_eq!(query["include"], json!(["documents", "metadatas", "distances"]));
        assert_eq!(query["query_embeddings"].as_array().map(|e| e.len()), Some(1));
    }

    #[tokio::test]
    async fn test_insert_failure_surfaces() {
        let server = ScriptedServer::start(vec![
            http_response(200, "application/json", COLLECTION_JSON),
            http_response(500, "application/json", r#"{"error":"payload too large"}"#),
        ])
        .await;

        let index = ChromaIndex::open(
            ChromaClient::new(&server.url()),
            "docs",
            DistanceMetric::L2,
            Arc::new(HashingEmbedder::default()),
        )
        .await
        .unwrap();

        let result = index
            .insert(vec![IndexRecord {
                id: "x".to_string(),
                text: "t".to_string(),
                metadata: ChunkMetadata {
                    source_file: "a.pdf".to_string(),
                    page_number: Some(1),
                },
            }])
            .await;
        assert!(matches!(result, Err(IndexError::Backend(_))));
    }
}
