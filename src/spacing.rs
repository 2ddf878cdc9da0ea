//! Maximum-cardinality packing of non-overlapping probe pairs.
//!
//! Unweighted interval scheduling with a minimum separation: candidate `b` may
//! follow `a` when `b.start - a.end >= min_distance`. The DP runs over
//! candidates ordered by end position; `prev[i]` is the number of candidates
//! that end early enough to precede candidate `i`, found by binary search.

use crate::candidate::{CandidateId, CandidatePool};
use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpacingSelector {
    /// Minimum number of bases strictly between two selected probes.
    pub min_distance: usize,
}

impl SpacingSelector {
    pub fn new(min_distance: usize) -> Self {
        Self { min_distance }
    }

    /// Picks a maximum set of pairwise compatible candidates. Among maximum sets
    /// the one with the earliest positions is returned. Output is ordered by start.
    pub fn select(&self, pool: &CandidatePool, ids: &[CandidateId]) -> Vec<CandidateId> {
        let intervals: Vec<(CandidateId, Range<usize>)> = pool
            .select(ids)
            .map(|c| (c.id(), c.span()))
            .collect();
        self.select_intervals(&intervals)
    }

    /// Same as [`select`](Self::select) on raw `(id, [start, end))` intervals.
    pub fn select_intervals(&self, intervals: &[(CandidateId, Range<usize>)]) -> Vec<CandidateId> {
        let mut order: Vec<&(CandidateId, Range<usize>)> = intervals.iter().collect();
        order.sort_by(|a, b| {
            a.1.end
                .cmp(&b.1.end)
                .then(a.1.start.cmp(&b.1.start))
                .then(a.0.cmp(&b.0))
        });
        let n = order.len();
        if n == 0 {
            return vec![];
        }

        let ends: Vec<usize> = order.iter().map(|(_, r)| r.end).collect();

        // dp[i]: best count among the first i candidates (by end).
        let mut dp = vec![0usize; n + 1];
        let mut prev = vec![0usize; n];
        for (i, (_, span)) in order.iter().enumerate() {
            prev[i] = ends.partition_point(|&end| end.saturating_add(self.min_distance) <= span.start);
            dp[i + 1] = dp[i].max(dp[prev[i]] + 1);
        }

        // Skip on ties so every chosen element is the earliest that still
        // reaches the required count.
        let mut chosen = Vec::with_capacity(dp[n]);
        let mut i = n;
        while i > 0 {
            if dp[prev[i - 1]] + 1 > dp[i - 1] {
                chosen.push(order[i - 1]);
                i = prev[i - 1];
            } else {
                i -= 1;
            }
        }
        chosen.sort_by_key(|(id, span)| (span.start, *id));
        chosen.into_iter().map(|(id, _)| *id).collect()
    }
}

/// True when consecutive spans keep at least `min_distance` bases apart.
pub fn is_well_spaced(spans: &[Range<usize>], min_distance: usize) -> bool {
    spans
        .windows(2)
        .all(|w| w[0].start < w[1].start && w[0].end.saturating_add(min_distance) <= w[1].start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spans(intervals: &[(CandidateId, Range<usize>)], ids: &[CandidateId]) -> Vec<Range<usize>> {
        ids.iter()
            .map(|id| intervals.iter().find(|(i, _)| i == id).unwrap().1.clone())
            .collect()
    }

    /// Largest compatible subset by exhaustive search.
    fn brute_force(intervals: &[(CandidateId, Range<usize>)], min_distance: usize) -> usize {
        let n = intervals.len();
        let mut best = 0;
        for mask in 0u32..(1 << n) {
            let mut chosen: Vec<Range<usize>> = (0..n)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| intervals[i].1.clone())
                .collect();
            chosen.sort_by_key(|r| r.start);
            if is_well_spaced(&chosen, min_distance) {
                best = best.max(chosen.len());
            }
        }
        best
    }

    fn fixed_width(starts: &[usize], width: usize) -> Vec<(CandidateId, Range<usize>)> {
        starts
            .iter()
            .enumerate()
            .map(|(id, &s)| (id, s..s + width))
            .collect()
    }

    #[test]
    fn test_empty() {
        assert!(SpacingSelector::new(2).select_intervals(&[]).is_empty());
    }

    #[test]
    fn test_abutting_allowed_with_zero_distance() {
        let intervals = fixed_width(&[0, 10, 20], 10);
        assert_eq!(SpacingSelector::new(0).select_intervals(&intervals), vec![0, 1, 2]);
        assert_eq!(SpacingSelector::new(1).select_intervals(&intervals), vec![0, 2]);
    }

    #[test]
    fn test_huge_distance_keeps_one() {
        let intervals = fixed_width(&[0, 10, 20], 10);
        assert_eq!(SpacingSelector::new(usize::MAX).select_intervals(&intervals), vec![0]);
        assert!(is_well_spaced(&[0..10], usize::MAX));
        assert!(!is_well_spaced(&[0..10, 20..30], usize::MAX));
    }

    #[test]
    fn test_prefers_earliest_chain() {
        let intervals = fixed_width(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11], 5);
        let chosen = SpacingSelector::new(0).select_intervals(&intervals);
        assert_eq!(chosen, vec![0, 5, 10]);
    }

    #[test]
    fn test_greedy_on_start_would_lose() {
        // A long early interval blocks two short ones.
        let intervals = vec![(0, 0..20), (1, 1..5), (2, 6..10), (3, 21..25)];
        let chosen = SpacingSelector::new(0).select_intervals(&intervals);
        assert_eq!(chosen, vec![1, 2, 3]);
    }

    #[test]
    fn test_fixed_example_with_gap() {
        let intervals = fixed_width(&[0, 3, 52, 54, 106, 110, 160], 52);
        let chosen = SpacingSelector::new(2).select_intervals(&intervals);
        let chosen_spans = spans(&intervals, &chosen);
        assert!(is_well_spaced(&chosen_spans, 2));
        assert_eq!(chosen.len(), brute_force(&intervals, 2));
        assert_eq!(chosen, vec![0, 3, 5]);
    }

    proptest! {
        #[test]
        fn prop_matches_brute_force(
            starts in prop::collection::vec(0usize..120, 0..10),
            width in 1usize..30,
            min_distance in 0usize..6,
        ) {
            let mut starts = starts;
            starts.sort();
            let intervals = fixed_width(&starts, width);
            let chosen = SpacingSelector::new(min_distance).select_intervals(&intervals);
            let chosen_spans = spans(&intervals, &chosen);
            prop_assert!(is_well_spaced(&chosen_spans, min_distance));
            prop_assert_eq!(chosen.len(), brute_force(&intervals, min_distance));
        }

        #[test]
        fn prop_variable_width_matches_brute_force(
            raw in prop::collection::vec((0usize..100, 1usize..25), 0..9),
            min_distance in 0usize..4,
        ) {
            let intervals: Vec<(CandidateId, Range<usize>)> = raw
                .iter()
                .enumerate()
                .map(|(id, &(s, w))| (id, s..s + w))
                .collect();
            let chosen = SpacingSelector::new(min_distance).select_intervals(&intervals);
            let chosen_spans = spans(&intervals, &chosen);
            prop_assert!(is_well_spaced(&chosen_spans, min_distance));
            prop_assert_eq!(chosen.len(), brute_force(&intervals, min_distance));
        }
    }
}
