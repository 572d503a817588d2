//! Score semantics, filtering, merge/dedup ordering, and maximal-marginal-
//! relevance reranking for vector retrieval (§4.1.a, §4.1.e).
//!
//! All distance-to-similarity conversion lives on
//! [`crate::models::DistanceMetric::similarity`]; this module consumes
//! already-converted similarities.

use crate::embedding::cosine_similarity;

/// One candidate chunk returned from a single table's similarity search,
/// already converted to a similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub document_id: String,
    pub searched_table: String,
    pub similarity: f64,
    pub snippet: String,
    /// Present only when the caller needs MMR reranking.
    pub embedding: Option<Vec<f32>>,
}

/// Apply the score-threshold rule from §4.1.a: `threshold == 0` disables
/// filtering; otherwise the test is inclusive at the boundary
/// (`similarity >= threshold` passes).
pub fn apply_threshold(chunks: Vec<ScoredChunk>, threshold: f64) -> Vec<ScoredChunk> {
    if threshold == 0.0 {
        return chunks;
    }
    chunks.into_iter().filter(|c| c.similarity >= threshold).collect()
}

/// Merge per-table candidate lists, deduplicate by content (exact
/// page-content equality, matching the Two-phase merge's dedup rule),
/// order by similarity descending with `searched_table` name as the stable
/// tie-breaker (§4.1.e), and truncate to `top_k` globally.
pub fn merge_dedup_truncate(mut chunks: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    let mut seen = std::collections::HashSet::new();
    chunks.retain(|c| seen.insert(c.snippet.clone()));

    chunks.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.searched_table.cmp(&b.searched_table))
    });

    chunks.truncate(top_k);
    chunks
}

/// Maximal marginal relevance reranking. Selects up to `k` items from
/// `candidates` (which must carry an embedding) balancing relevance to
/// `query` against diversity from already-selected items, per
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`.
///
/// `candidates` is expected to already be the `mmr_fetch_k`-sized candidate
/// pool; this function does not perform the initial similarity fetch.
pub fn mmr_select(query: &[f32], candidates: &[ScoredChunk], k: usize, lambda: f32) -> Vec<ScoredChunk> {
    let mut pool: Vec<&ScoredChunk> = candidates.iter().filter(|c| c.embedding.is_some()).collect();
    let mut selected: Vec<ScoredChunk> = Vec::new();

    while selected.len() < k && !pool.is_empty() {
        let mut best_idx = 0usize;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, cand) in pool.iter().enumerate() {
            let emb = cand.embedding.as_ref().unwrap();
            let relevance = cosine_similarity(query, emb);
            let diversity_penalty = selected
                .iter()
                .filter_map(|s| s.embedding.as_ref())
                .map(|sel_emb| cosine_similarity(emb, sel_emb))
                .fold(f32::MIN, f32::max);
            let diversity_penalty = if diversity_penalty == f32::MIN { 0.0 } else { diversity_penalty };
            let score = lambda * relevance - (1.0 - lambda) * diversity_penalty;
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        selected.push(pool.remove(best_idx).clone());
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, table: &str, sim: f64) -> ScoredChunk {
        ScoredChunk {
            id: id.into(),
            document_id: id.into(),
            searched_table: table.into(),
            similarity: sim,
            snippet: format!("snippet-{id}"),
            embedding: None,
        }
    }

    #[test]
    fn threshold_zero_disables_filtering() {
        let chunks = vec![chunk("a", "t", 0.1), chunk("b", "t", 0.9)];
        assert_eq!(apply_threshold(chunks, 0.0).len(), 2);
    }

    #[test]
    fn threshold_is_inclusive_at_boundary() {
        let chunks = vec![chunk("a", "t", 0.65), chunk("b", "t", 0.64)];
        let kept = apply_threshold(chunks, 0.65);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "a");
    }

    #[test]
    fn merge_orders_by_similarity_then_table() {
        let chunks = vec![chunk("a", "zeta", 0.5), chunk("b", "alpha", 0.5), chunk("c", "mid", 0.9)];
        let merged = merge_dedup_truncate(chunks, 10);
        assert_eq!(merged[0].id, "c");
        assert_eq!(merged[1].id, "b"); // alpha < zeta at equal similarity
        assert_eq!(merged[2].id, "a");
    }

    #[test]
    fn merge_dedups_by_content() {
        let mut a = chunk("a", "t", 0.9);
        let mut b = chunk("b", "t", 0.8);
        a.snippet = "same text".into();
        b.snippet = "same text".into();
        let merged = merge_dedup_truncate(vec![a, b], 10);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn merge_truncates_to_top_k() {
        let chunks = (0..10).map(|i| chunk(&i.to_string(), "t", i as f64)).collect();
        let merged = merge_dedup_truncate(chunks, 3);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn mmr_prefers_relevance_when_lambda_is_one() {
        let query = vec![1.0f32, 0.0];
        let mut a = chunk("a", "t", 0.0);
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = chunk("b", "t", 0.0);
        b.embedding = Some(vec![0.0, 1.0]);
        let selected = mmr_select(&query, &[a, b], 1, 1.0);
        assert_eq!(selected[0].id, "a");
    }
}
