//! Process-local vector index.

use super::{IndexError, Point, PointId, SearchHit, SimilarityQuery, VectorIndex};
use crate::similarity::cosine_similarity;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug)]
struct Collection {
    dimension: usize,
    points: BTreeMap<PointId, Point>,
}

/// A single collection held in memory, searched exhaustively.
///
/// Mirrors the Qdrant behaviour the engine relies on: cosine scoring, an
/// inclusive score threshold, match-any tag filters, overwrite on upsert and
/// rejection of vectors that do not fit the collection.
#[derive(Debug)]
pub struct InMemoryIndex {
    name: String,
    collection: RwLock<Option<Collection>>,
}

impl InMemoryIndex {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            collection: RwLock::new(None),
        }
    }

    /// Snapshot of the stored points in id order.
    pub async fn points(&self) -> Vec<Point> {
        self.collection
            .read()
            .await
            .as_ref()
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.collection
            .read()
            .await
            .as_ref()
            .map_or(0, |c| c.points.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn missing(&self) -> IndexError {
        IndexError::MissingCollection {
            collection: self.name.clone(),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn collection_dimension(&self) -> Result<Option<usize>, IndexError> {
        Ok(self.collection.read().await.as_ref().map(|c| c.dimension))
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), IndexError> {
        *self.collection.write().await = Some(Collection {
            dimension,
            points: BTreeMap::new(),
        });
        Ok(())
    }

    async fn delete_collection(&self) -> Result<(), IndexError> {
        *self.collection.write().await = None;
        Ok(())
    }

    async fn upsert_points(&self, points: Vec<Point>) -> Result<(), IndexError> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(|| self.missing())?;

        // Validate the whole batch before writing any of it.
        if let Some(bad) = points.iter().find(|p| p.vector.len() != collection.dimension) {
            return Err(IndexError::DimensionMismatch {
                collection: self.name.clone(),
                expected: collection.dimension,
                actual: bad.vector.len(),
            });
        }

        for point in points {
            collection.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(&self, query: &SimilarityQuery) -> Result<Vec<SearchHit>, IndexError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(|| self.missing())?;
        if query.vector.len() != collection.dimension {
            return Err(IndexError::DimensionMismatch {
                collection: self.name.clone(),
                expected: collection.dimension,
                actual: query.vector.len(),
            });
        }

        let mut hits: Vec<SearchHit> = collection
            .points
            .values()
            .filter(|p| {
                query
                    .filter
                    .as_ref()
                    .is_none_or(|f| f.is_empty() || f.matches(&p.payload))
            })
            .map(|p| SearchHit {
                id: p.id,
                score: cosine_similarity(&query.vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|h| query.score_threshold.is_none_or(|t| h.score >= t))
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn delete_document_tail(
        &self,
        doc_id: &str,
        from_chunk_index: usize,
    ) -> Result<(), IndexError> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(|| self.missing())?;
        collection.points.retain(|_, p| {
            p.payload.doc_id != doc_id || p.payload.chunk_index < from_chunk_index
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{CollectionStatus, PointPayload, TagFilter};
    use tracing_test::traced_test;

    fn point(id: PointId, doc_id: &str, chunk_index: usize, vector: Vec<f32>, phase: &[&str]) -> Point {
        Point {
            id,
            vector,
            payload: PointPayload {
                doc_id: doc_id.to_string(),
                chunk_index,
                phase: phase.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_ensure_collection_lifecycle() {
        let index = InMemoryIndex::new("rules");

        assert_eq!(index.ensure_collection(3, true).await.unwrap(), CollectionStatus::Created);
        assert_eq!(index.ensure_collection(3, true).await.unwrap(), CollectionStatus::Unchanged);

        index
            .upsert_points(vec![point(1, "a", 0, vec![1.0, 0.0, 0.0], &[])])
            .await
            .unwrap();
        assert_eq!(index.len().await, 1);

        assert_eq!(
            index.ensure_collection(4, true).await.unwrap(),
            CollectionStatus::Recreated { previous: 3 }
        );
        assert!(index.is_empty().await);
        assert_eq!(index.collection_dimension().await.unwrap(), Some(4));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_rebuild_is_logged_as_warning() {
        let index = InMemoryIndex::new("rules");
        index.create_collection(3).await.unwrap();

        index.ensure_collection(8, true).await.unwrap();

        assert!(logs_contain("Vector size mismatch on collection rules: current=3, expected=8"));
        assert!(logs_contain("all stored points are dropped"));
    }

    #[tokio::test]
    async fn test_mismatch_refused_when_recreate_disabled() {
        let index = InMemoryIndex::new("rules");
        index.create_collection(3).await.unwrap();
        index
            .upsert_points(vec![point(1, "a", 0, vec![1.0, 0.0, 0.0], &[])])
            .await
            .unwrap();

        let err = index.ensure_collection(5, false).await.unwrap_err();

        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 5,
                actual: 3,
                ..
            }
        ));
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_rejects_wrong_size() {
        let index = InMemoryIndex::new("rules");
        index.create_collection(2).await.unwrap();

        index.upsert_points(vec![point(7, "a", 0, vec![1.0, 0.0], &[])]).await.unwrap();
        index.upsert_points(vec![point(7, "a", 0, vec![0.0, 1.0], &[])]).await.unwrap();
        assert_eq!(index.points().await[0].vector, vec![0.0, 1.0]);

        let err = index
            .upsert_points(vec![
                point(8, "a", 1, vec![1.0, 0.0], &[]),
                point(9, "a", 2, vec![1.0, 0.0, 0.0], &[]),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_search_orders_filters_and_thresholds() {
        let index = InMemoryIndex::new("rules");
        index.create_collection(2).await.unwrap();
        index
            .upsert_points(vec![
                point(1, "a", 0, vec![1.0, 0.0], &["deal"]),
                point(2, "a", 1, vec![0.8, 0.6], &["showdown"]),
                point(3, "b", 0, vec![0.0, 1.0], &["deal"]),
                point(4, "b", 1, vec![0.6, 0.8], &[]),
            ])
            .await
            .unwrap();

        let hits = index.search(&SimilarityQuery::new(vec![1.0, 0.0], 10)).await.unwrap();
        let ids: Vec<PointId> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);

        let hits = index
            .search(&SimilarityQuery::new(vec![1.0, 0.0], 10).with_score_threshold(Some(0.5)))
            .await
            .unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2, 4]);

        let hits = index
            .search(
                &SimilarityQuery::new(vec![1.0, 0.0], 1)
                    .with_filter(Some(TagFilter::new(vec![], vec!["showdown".into()]))),
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 2);
    }

    #[tokio::test]
    async fn test_delete_document_tail() {
        let index = InMemoryIndex::new("rules");
        index.create_collection(1).await.unwrap();
        index
            .upsert_points(vec![
                point(1, "a", 0, vec![1.0], &[]),
                point(2, "a", 1, vec![1.0], &[]),
                point(3, "a", 2, vec![1.0], &[]),
                point(4, "b", 5, vec![1.0], &[]),
            ])
            .await
            .unwrap();

        index.delete_document_tail("a", 1).await.unwrap();

        let ids: Vec<PointId> = index.points().await.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[tokio::test]
    async fn test_operations_on_missing_collection() {
        let index = InMemoryIndex::new("rules");
        assert_eq!(index.collection_dimension().await.unwrap(), None);
        assert!(matches!(
            index.search(&SimilarityQuery::new(vec![1.0], 1)).await,
            Err(IndexError::MissingCollection { .. })
        ));
    }
}
