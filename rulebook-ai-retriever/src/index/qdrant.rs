//! Qdrant REST adapter.
//!
//! Uses the plain HTTP API rather than a client SDK:
//!
//! | operation | request |
//! |---|---|
//! | describe | `GET /collections/{name}` (404 means absent) |
//! | create | `PUT /collections/{name}` |
//! | drop | `DELETE /collections/{name}` |
//! | upsert | `PUT /collections/{name}/points?wait=true` |
//! | search | `POST /collections/{name}/points/search` |
//! | delete tail | `POST /collections/{name}/points/delete?wait=true` |

use super::{IndexError, Point, PointPayload, SearchHit, SimilarityQuery, TagFilter, VectorIndex};
use crate::config::QdrantSettings;
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct QdrantIndex {
    http: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: VectorsConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

#[derive(Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExternalId {
    Num(u64),
    Uuid(String),
}

#[derive(Deserialize)]
struct ScoredPoint {
    id: ExternalId,
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

impl QdrantIndex {
    pub fn new(settings: &QdrantSettings) -> Result<Self, IndexError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            collection: settings.collection.clone(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), IndexError> {
        debug!("{} {}", method, url);
        let mut request = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// Send a request that must succeed, decoding the `result` field.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T, IndexError> {
        let (status, text) = self.send(method, url, body).await?;
        if !status.is_success() {
            return Err(IndexError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| IndexError::Decode {
            message: e.to_string(),
        })?;
        Ok(envelope.result)
    }
}

fn filter_json(filter: &TagFilter) -> Value {
    let mut should = Vec::new();
    if !filter.format.is_empty() {
        should.push(json!({ "key": "format", "match": { "any": filter.format } }));
    }
    if !filter.phase.is_empty() {
        should.push(json!({ "key": "phase", "match": { "any": filter.phase } }));
    }
    json!({ "should": should })
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn collection_dimension(&self) -> Result<Option<usize>, IndexError> {
        let (status, text) = self.send(Method::GET, &self.collection_url(""), None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IndexError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let info: Envelope<CollectionInfo> =
            serde_json::from_str(&text).map_err(|e| IndexError::Decode {
                message: e.to_string(),
            })?;
        match info.result.config.params.vectors {
            VectorsConfig::Single(params) => Ok(Some(params.size)),
            // Points are written to the unnamed vector, which a named-vector
            // layout lacks; report size 0 so reconciliation rebuilds it.
            VectorsConfig::Named(_) => Ok(Some(0)),
        }
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), IndexError> {
        let body = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
        let _: Value = self
            .call(Method::PUT, &self.collection_url(""), Some(&body))
            .await?;
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), IndexError> {
        let _: Value = self
            .call(Method::DELETE, &self.collection_url(""), None)
            .await?;
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<Point>) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }
        let body = json!({ "points": points });
        let _: Value = self
            .call(Method::PUT, &self.collection_url("/points?wait=true"), Some(&body))
            .await?;
        Ok(())
    }

    async fn search(&self, query: &SimilarityQuery) -> Result<Vec<SearchHit>, IndexError> {
        let request = SearchRequest {
            vector: &query.vector,
            limit: query.limit,
            with_payload: true,
            score_threshold: query.score_threshold,
            filter: query.filter.as_ref().filter(|f| !f.is_empty()).map(filter_json),
        };
        let body = serde_json::to_value(&request).map_err(|e| IndexError::Decode {
            message: e.to_string(),
        })?;

        let scored: Vec<ScoredPoint> = self
            .call(Method::POST, &self.collection_url("/points/search"), Some(&body))
            .await?;

        Ok(scored
            .into_iter()
            .filter_map(|p| match p.id {
                ExternalId::Num(id) => Some(SearchHit {
                    id,
                    score: p.score,
                    payload: p.payload.unwrap_or_default(),
                }),
                ExternalId::Uuid(uuid) => {
                    debug!("Skipping point {} with a non-numeric id", uuid);
                    None
                }
            })
            .collect())
    }

    async fn delete_document_tail(
        &self,
        doc_id: &str,
        from_chunk_index: usize,
    ) -> Result<(), IndexError> {
        let body = json!({
            "filter": {
                "must": [
                    { "key": "doc_id", "match": { "value": doc_id } },
                    { "key": "chunk_index", "range": { "gte": from_chunk_index } }
                ]
            }
        });
        let _: Value = self
            .call(Method::POST, &self.collection_url("/points/delete?wait=true"), Some(&body))
            .await?;
        Ok(())
    }
}
