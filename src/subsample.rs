use std::collections::BTreeSet;

/// Indices of `k` evenly spaced picks out of `n` ordered items.
///
/// Index `i` maps to `round(i * (n - 1) / (k - 1))`, rounding half up. The first
/// and last items are always kept. Returns every index when `n <= k`.
pub fn even_indices(n: usize, k: usize) -> Vec<usize> {
    if n <= k {
        return (0..n).collect();
    }
    match k {
        0 => return vec![],
        1 => return vec![0],
        _ => {}
    }

    let num = n - 1;
    let den = k - 1;
    let mut taken = BTreeSet::new();
    let mut ret = Vec::with_capacity(k);
    for i in 0..k {
        let ideal = (2 * i * num + den) / (2 * den);
        let idx = nearest_unused(ideal, n, &taken);
        taken.insert(idx);
        ret.push(idx);
    }
    ret.sort_unstable();
    ret
}

/// `ideal` if free, otherwise the closest free index, preferring the later one.
fn nearest_unused(ideal: usize, n: usize, taken: &BTreeSet<usize>) -> usize {
    if !taken.contains(&ideal) {
        return ideal;
    }
    for delta in 1..n {
        if ideal + delta < n && !taken.contains(&(ideal + delta)) {
            return ideal + delta;
        }
        if delta <= ideal && !taken.contains(&(ideal - delta)) {
            return ideal - delta;
        }
    }
    ideal
}

/// Reduces `items` to at most `cap` evenly spaced entries, keeping order.
pub fn subsample<T: Clone>(items: &[T], cap: usize) -> Vec<T> {
    even_indices(items.len(), cap)
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forty_to_thirty_three() {
        let idx = even_indices(40, 33);
        assert_eq!(idx.len(), 33);
        assert_eq!(idx[0], 0);
        assert_eq!(idx[32], 39);
        let deltas: Vec<usize> = idx.windows(2).map(|w| w[1] - w[0]).collect();
        let min = *deltas.iter().min().unwrap();
        let max = *deltas.iter().max().unwrap();
        assert!(min >= 1);
        assert!(max - min <= 1);
    }

    #[test]
    fn test_small_sets_unchanged() {
        let items = vec!['a', 'b', 'c'];
        assert_eq!(subsample(&items, 3), items);
        assert_eq!(subsample(&items, 10), items);
    }

    #[test]
    fn test_degenerate_caps() {
        assert!(even_indices(5, 0).is_empty());
        assert_eq!(even_indices(5, 1), vec![0]);
        assert_eq!(even_indices(5, 2), vec![0, 4]);
    }

    #[test]
    fn test_unique_and_sorted() {
        for n in 2..60 {
            for k in 2..n {
                let idx = even_indices(n, k);
                assert_eq!(idx.len(), k);
                assert!(idx.windows(2).all(|w| w[0] < w[1]));
                assert_eq!(*idx.last().unwrap(), n - 1);
            }
        }
    }

    #[test]
    fn test_nearest_unused_shifts() {
        let taken: BTreeSet<usize> = [3, 4].into_iter().collect();
        assert_eq!(nearest_unused(3, 10, &taken), 2);
        assert_eq!(nearest_unused(4, 10, &taken), 5);
        assert_eq!(nearest_unused(6, 10, &taken), 6);
    }
}
