//! Greedy balanced partitioning of sentence lengths.

use std::ops::Range;

const MAX_ITERATIONS: usize = 100;
const STALE_LIMIT: usize = 5;

/// Partition `lens` into `k` contiguous runs with roughly equal sums.
///
/// Boundaries start evenly spaced; each iteration moves a boundary of
/// the worst-offending run in the direction that shrinks it, stopping
/// after five non-improving iterations or one hundred total. Returns
/// the best boundary set seen, as index ranges into `lens`.
pub fn balanced_partition(lens: &[usize], k: usize) -> Vec<Range<usize>> {
    let n = lens.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    let k = k.min(n);
    let mut bounds: Vec<usize> = (0..=k).map(|i| i * n / k).collect();

    let worst = |bounds: &[usize]| -> (usize, usize) {
        let mut index = 0;
        let mut max = 0;
        for i in 0..k {
            let sum: usize = lens[bounds[i]..bounds[i + 1]].iter().sum();
            if sum > max {
                max = sum;
                index = i;
            }
        }
        (index, max)
    };

    let (_, mut best_max) = worst(&bounds);
    let mut best_bounds = bounds.clone();
    let mut stale = 0;

    for _ in 0..MAX_ITERATIONS {
        let (w, _) = worst(&bounds);

        // Two candidate moves: hand the worst run's first sentence to
        // the left neighbor, or its last sentence to the right one.
        let mut candidates: Vec<Vec<usize>> = Vec::with_capacity(2);
        if w > 0 && bounds[w] + 1 < bounds[w + 1] {
            let mut moved = bounds.clone();
            moved[w] += 1;
            candidates.push(moved);
        }
        if w + 1 < k && bounds[w + 1] > bounds[w] + 1 {
            let mut moved = bounds.clone();
            moved[w + 1] -= 1;
            candidates.push(moved);
        }
        let Some(next) = candidates.into_iter().min_by_key(|b| worst(b).1) else {
            break;
        };

        bounds = next;
        let (_, current_max) = worst(&bounds);
        if current_max < best_max {
            best_max = current_max;
            best_bounds = bounds.clone();
            stale = 0;
        } else {
            stale += 1;
            if stale >= STALE_LIMIT {
                break;
            }
        }
    }

    (0..k)
        .map(|i| best_bounds[i]..best_bounds[i + 1])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partitions_cover_input() {
        let lens = vec![10, 20, 30, 40, 50, 60];
        let parts = balanced_partition(&lens, 3);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].start, 0);
        assert_eq!(parts.last().unwrap().end, lens.len());
        for pair in parts.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_balances_uneven_lengths() {
        // One heavy sentence at the front; even spacing would leave the
        // first run with almost everything.
        let lens = vec![500, 10, 10, 10, 10, 10, 10, 10, 10, 10];
        let parts = balanced_partition(&lens, 2);
        let sums: Vec<usize> = parts
            .iter()
            .map(|r| lens[r.clone()].iter().sum())
            .collect();
        assert_eq!(sums[0], 500);
        assert_eq!(sums[1], 90);
    }

    #[test]
    fn test_k_larger_than_input_clamps() {
        let lens = vec![5, 5];
        let parts = balanced_partition(&lens, 10);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(balanced_partition(&[], 3).is_empty());
    }
}
