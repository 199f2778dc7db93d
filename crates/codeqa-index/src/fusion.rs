//! Rank fusion for hybrid search.
//!
//! Two steps combine the three engines:
//!
//! 1. [`merge_keyword_hits`] folds fuzzy hits into BM25 hits per ordinal
//!    with `max`, after scaling fuzzy scores by a boost factor.
//! 2. [`weighted_rrf`] fuses the dense list with that keyword list by rank:
//!    `score(d) += w / (k + rank + 1)` for the dense list and
//!    `(1 - w) / (k + rank + 1)` for the keyword list, rank 0 being best.
//!
//! Raw scores from the engines live on different scales, so only the
//! keyword merge looks at them; fusion looks at rank position alone.

use std::cmp::Ordering;
use std::collections::HashMap;

/// A `(document ordinal, score)` pair.
pub type Hit = (usize, f32);

/// Sort descending by score, then ascending by ordinal.
pub(crate) fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
}

/// Merge BM25 and fuzzy hits into one keyword list.
///
/// Each ordinal keeps the larger of its BM25 score and its fuzzy score
/// times `fuzzy_boost`. Ordinals from either list are kept.
pub fn merge_keyword_hits(bm25: &[Hit], fuzzy: &[Hit], fuzzy_boost: f32) -> Vec<Hit> {
    let mut merged: HashMap<usize, f32> = HashMap::with_capacity(bm25.len() + fuzzy.len());
    for &(ordinal, score) in bm25 {
        let entry = merged.entry(ordinal).or_insert(score);
        *entry = entry.max(score);
    }
    for &(ordinal, score) in fuzzy {
        let boosted = score * fuzzy_boost;
        let entry = merged.entry(ordinal).or_insert(boosted);
        *entry = entry.max(boosted);
    }

    let mut hits: Vec<Hit> = merged.into_iter().collect();
    sort_hits(&mut hits);
    hits
}

/// Fuse dense and keyword hits with weighted reciprocal rank fusion.
///
/// `fusion_weight` is clamped to `[0, 1]` (NaN counts as 0.5) and weights
/// the dense list; the keyword list gets the remainder. A list with zero
/// weight contributes nothing, so `1.0` reproduces the dense ranking and
/// `0.0` the keyword ranking. Ranks are list positions, so inputs must
/// already be sorted best-first.
pub fn weighted_rrf(dense: &[Hit], keyword: &[Hit], fusion_weight: f32, k: usize) -> Vec<Hit> {
    let weight = clamp_weight(fusion_weight);
    let mut scores: HashMap<usize, f32> = HashMap::new();

    for (hits, list_weight) in [(dense, weight), (keyword, 1.0 - weight)] {
        if list_weight <= 0.0 {
            continue;
        }
        for (rank, &(ordinal, _)) in hits.iter().enumerate() {
            *scores.entry(ordinal).or_insert(0.0) += list_weight / (k + rank + 1) as f32;
        }
    }

    let mut fused: Vec<Hit> = scores.into_iter().collect();
    sort_hits(&mut fused);
    fused
}

/// Clamp a fusion weight into `[0, 1]`.
pub fn clamp_weight(fusion_weight: f32) -> f32 {
    if fusion_weight.is_nan() {
        return 0.5;
    }
    fusion_weight.clamp(0.0, 1.0)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinals(hits: &[Hit]) -> Vec<usize> {
        hits.iter().map(|h| h.0).collect()
    }

    #[test]
    fn test_merge_takes_max_per_ordinal() {
        let bm25 = vec![(0, 2.0), (1, 0.5)];
        let fuzzy = vec![(1, 1.0), (2, 0.3)];
        let merged = merge_keyword_hits(&bm25, &fuzzy, 1.1);

        assert_eq!(ordinals(&merged), vec![0, 1, 2]);
        assert_eq!(merged[0].1, 2.0);
        assert!((merged[1].1 - 1.1).abs() < 1e-6);
        assert!((merged[2].1 - 0.33).abs() < 1e-6);
    }

    #[test]
    fn test_merge_does_not_sum() {
        let merged = merge_keyword_hits(&[(4, 1.0)], &[(4, 0.5)], 1.1);
        assert_eq!(merged, vec![(4, 1.0)]);
    }

    #[test]
    fn test_merge_boost_can_lift_fuzzy_above_bm25() {
        let merged = merge_keyword_hits(&[(0, 1.0)], &[(0, 1.0)], 1.5);
        assert_eq!(merged, vec![(0, 1.5)]);
    }

    #[test]
    fn test_rrf_worked_example() {
        // "cat" over ["the cat sat", "the dog ran", "cats and dogs"]
        let dense = vec![(0, 0.9), (2, 0.4)];
        let keyword = vec![(0, 1.2), (2, 0.1)];
        let fused = weighted_rrf(&dense, &keyword, 0.5, 60);

        assert_eq!(ordinals(&fused), vec![0, 2]);
        assert!((fused[0].1 - 1.0 / 61.0).abs() < 1e-7);
        assert!(fused[0].1 > fused[1].1);
        assert!(!fused.iter().any(|h| h.0 == 1));
    }

    #[test]
    fn test_rrf_both_lists_accumulate() {
        let fused = weighted_rrf(&[(3, 1.0), (5, 0.5)], &[(5, 9.0)], 0.5, 60);
        // 5: 0.5/62 + 0.5/61 beats 3: 0.5/61
        assert_eq!(ordinals(&fused), vec![5, 3]);
    }

    #[test]
    fn test_rrf_weight_one_is_dense_order() {
        let dense = vec![(2, 0.9), (0, 0.8), (1, 0.1)];
        let keyword = vec![(1, 5.0), (0, 4.0), (7, 1.0)];
        let fused = weighted_rrf(&dense, &keyword, 1.0, 60);
        assert_eq!(ordinals(&fused), vec![2, 0, 1]);
    }

    #[test]
    fn test_rrf_weight_zero_is_keyword_order() {
        let dense = vec![(2, 0.9), (0, 0.8)];
        let keyword = vec![(1, 5.0), (0, 4.0), (7, 1.0)];
        let fused = weighted_rrf(&dense, &keyword, 0.0, 60);
        assert_eq!(ordinals(&fused), vec![1, 0, 7]);
    }

    #[test]
    fn test_rrf_weight_is_clamped() {
        let dense = vec![(2, 0.9)];
        let keyword = vec![(1, 5.0)];
        assert_eq!(
            weighted_rrf(&dense, &keyword, 7.0, 60),
            weighted_rrf(&dense, &keyword, 1.0, 60)
        );
        assert_eq!(
            weighted_rrf(&dense, &keyword, -3.0, 60),
            weighted_rrf(&dense, &keyword, 0.0, 60)
        );
    }

    #[test]
    fn test_rrf_ties_break_by_ordinal() {
        let fused = weighted_rrf(&[(9, 1.0)], &[(4, 1.0)], 0.5, 60);
        assert_eq!(ordinals(&fused), vec![4, 9]);
    }

    #[test]
    fn test_rrf_empty_inputs() {
        assert!(weighted_rrf(&[], &[], 0.5, 60).is_empty());
    }

    #[test]
    fn test_clamp_weight() {
        assert_eq!(clamp_weight(0.3), 0.3);
        assert_eq!(clamp_weight(1.5), 1.0);
        assert_eq!(clamp_weight(-0.1), 0.0);
        assert_eq!(clamp_weight(f32::NAN), 0.5);
    }
}
