//! Re-ranking search over the vector index.
//!
//! A search runs in four steps:
//!
//! 1. **Over-fetch** `k_raw` neighbours (twice `k_final` when the caller asks
//!    for `k_raw` results or more), narrowed by the classification tags
//!    when there are any, and floored by the score threshold. When the tag
//!    filter leaves fewer than `k_final` candidates, an unfiltered over-fetch
//!    is merged in behind the filtered hits.
//! 2. **Rescore** each hit:
//!    `s' = s * doc_boost + tag_bonus * (matched format tags + matched phase tags) + freshness(version)`
//!    where `freshness = max(0, year - freshness_base_year) * freshness_step`
//!    for the first standalone four-digit number in the version label.
//! 3. **Sort** by `s'` descending. The sort is stable, so ties keep their
//!    retrieval order.
//! 4. **Diversify** in a single greedy pass: admit a hit only while its
//!    document has fewer than `max_per_doc` admitted hits, stop at `k_final`.
//!
//! The diversity pass is intentionally not a globally optimal diverse top-k.
//! With a cap of two, a document's third hit is skipped even when it outscores
//! every remaining hit of other documents.

use crate::boost::DocBoosts;
use crate::error::{Result, RetrieverError};
use crate::index::{PointId, PointPayload, SearchHit, SimilarityQuery, TagFilter, VectorIndex};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^0-9])([0-9]{4})(?:[^0-9]|$)").expect("valid year regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Neighbours fetched before re-ranking.
    pub k_raw: usize,
    /// Results kept after re-ranking.
    pub k_final: usize,
    pub max_per_doc: usize,
    /// Similarity floor applied by the index.
    pub score_threshold: Option<f32>,
    /// Bonus per classification tag found on a hit.
    pub tag_bonus: f32,
    pub freshness_base_year: i32,
    pub freshness_step: f32,
    /// Merge unfiltered hits when the tag filter returns too few.
    pub soft_filter_fallback: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            k_raw: 40,
            k_final: 12,
            max_per_doc: 3,
            score_threshold: Some(0.2),
            tag_bonus: 0.03,
            freshness_base_year: 2018,
            freshness_step: 0.005,
            soft_filter_fallback: true,
        }
    }
}

impl SearchOptions {
    pub fn validate(&self) -> Result<()> {
        if self.k_final == 0 {
            return Err(RetrieverError::config("search.k_final must be positive"));
        }
        if self.k_raw <= self.k_final {
            return Err(RetrieverError::config(format!(
                "search.k_raw ({}) must exceed search.k_final ({})",
                self.k_raw, self.k_final
            )));
        }
        if self.max_per_doc == 0 {
            return Err(RetrieverError::config("search.max_per_doc must be positive"));
        }
        if self.tag_bonus < 0.0 || self.freshness_step < 0.0 {
            return Err(RetrieverError::config(
                "search.tag_bonus and search.freshness_step must not be negative",
            ));
        }
        Ok(())
    }
}

/// A search hit with its raw similarity and re-ranked score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescoredHit {
    pub id: PointId,
    pub similarity: f32,
    pub score: f32,
    pub payload: PointPayload,
}

/// Year found in a version label such as `2025-02` or `v3 (2021)`.
pub fn version_year(version: &str) -> Option<i32> {
    YEAR.captures(version)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn freshness_bonus(version: &str, options: &SearchOptions) -> f32 {
    version_year(version)
        .map(|year| (year - options.freshness_base_year).max(0) as f32 * options.freshness_step)
        .unwrap_or(0.0)
}

fn matched(wanted: &[String], present: &[String]) -> usize {
    wanted.iter().filter(|tag| present.contains(tag)).count()
}

/// Adjusted score of one hit.
pub fn adjusted_score(
    hit: &SearchHit,
    preferred: &TagFilter,
    boosts: &DocBoosts,
    options: &SearchOptions,
) -> f32 {
    let payload = &hit.payload;
    let tags = matched(&preferred.format, &payload.format) + matched(&preferred.phase, &payload.phase);

    hit.score * boosts.factor(&payload.doc_id)
        + options.tag_bonus * tags as f32
        + freshness_bonus(&payload.version, options)
}

/// Rescore and sort hits, best first. Equal scores keep their input order.
pub fn rescore(
    hits: Vec<SearchHit>,
    preferred: &TagFilter,
    boosts: &DocBoosts,
    options: &SearchOptions,
) -> Vec<RescoredHit> {
    let mut rescored: Vec<RescoredHit> = hits
        .into_iter()
        .map(|hit| RescoredHit {
            score: adjusted_score(&hit, preferred, boosts, options),
            similarity: hit.score,
            id: hit.id,
            payload: hit.payload,
        })
        .collect();
    rescored.sort_by(|a, b| b.score.total_cmp(&a.score));
    rescored
}

/// Greedy per-document cap over an already sorted list.
pub fn diversify(sorted: Vec<RescoredHit>, max_per_doc: usize, k_final: usize) -> Vec<RescoredHit> {
    let mut per_doc: HashMap<String, usize> = HashMap::new();
    let mut admitted = Vec::with_capacity(k_final.min(sorted.len()));

    for hit in sorted {
        if admitted.len() >= k_final {
            break;
        }
        let count = per_doc.entry(hit.payload.doc_id.clone()).or_insert(0);
        if *count < max_per_doc {
            *count += 1;
            admitted.push(hit);
        }
    }
    admitted
}

/// Filtered hits first, then unseen unfiltered ones.
fn merge_unique(primary: Vec<SearchHit>, fallback: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen: HashSet<PointId> = primary.iter().map(|h| h.id).collect();
    let mut merged = primary;
    merged.extend(fallback.into_iter().filter(|h| seen.insert(h.id)));
    merged
}

/// Over-fetch, rescore and diversify against a [`VectorIndex`].
#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    options: SearchOptions,
}

impl SearchEngine {
    pub fn new(options: SearchOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Neighbours fetched for `k_final` results: `k_raw`, or twice `k_final`
    /// when the caller asks for `k_raw` results or more.
    pub fn fetch_limit(&self, k_final: usize) -> usize {
        if k_final < self.options.k_raw {
            self.options.k_raw
        } else {
            k_final.saturating_mul(2)
        }
    }

    /// Return at most `k_final` re-ranked hits for `vector`.
    ///
    /// `tags` narrows the over-fetch and earns the tag bonus; pass an empty
    /// filter to search unfiltered.
    pub async fn search(
        &self,
        index: &dyn VectorIndex,
        vector: Vec<f32>,
        k_final: usize,
        tags: &TagFilter,
        boosts: &DocBoosts,
    ) -> Result<Vec<RescoredHit>> {
        let options = &self.options;
        let base = SimilarityQuery::new(vector, self.fetch_limit(k_final))
            .with_score_threshold(options.score_threshold);

        let hits = if tags.is_empty() {
            index.search(&base).await?
        } else {
            let filtered = index
                .search(&base.clone().with_filter(Some(tags.clone())))
                .await?;
            if options.soft_filter_fallback && filtered.len() < k_final {
                debug!(
                    "Tag filter kept {} hits, below {}; merging unfiltered results",
                    filtered.len(),
                    k_final
                );
                let unfiltered = index.search(&base).await?;
                merge_unique(filtered, unfiltered)
            } else {
                filtered
            }
        };

        let candidates = hits.len();
        let ranked = diversify(rescore(hits, tags, boosts, options), options.max_per_doc, k_final);
        debug!("Re-ranked {} candidates into {} results", candidates, ranked.len());
        Ok(ranked)
    }
}
