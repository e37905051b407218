/// Lazy enumeration of (before-rank, after-rank) candidate pairs.
///
/// Pairs are visited by increasing rank sum, and by increasing before-rank
/// within one diagonal: (0,0), (0,1), (1,0), (0,2), (1,1), (2,0), ...
/// Given nearest-first candidate lists this tries the jointly closest
/// pairs first without sorting every pair up front.
#[derive(Debug, Clone)]
pub struct ZigzagPairs {
    before_count: usize,
    after_count: usize,
    diagonal: usize,
    before: usize,
}

impl ZigzagPairs {
    /// Every pair with `before <= max_before` and `after <= max_after`
    pub fn new(max_before: usize, max_after: usize) -> Self {
        Self::with_counts(max_before + 1, max_after + 1)
    }

    /// Every pair of ranks below the given list lengths; empty if either is zero
    pub fn with_counts(before_count: usize, after_count: usize) -> Self {
        let mut pairs = Self {
            before_count,
            after_count,
            diagonal: 0,
            before: 0,
        };
        pairs.before = pairs.first_on_diagonal();
        pairs
    }

    /// Number of pairs the sequence yields in total
    pub fn total(&self) -> usize {
        self.before_count * self.after_count
    }

    fn last_diagonal(&self) -> usize {
        (self.before_count + self.after_count).saturating_sub(2)
    }

    fn first_on_diagonal(&self) -> usize {
        self.diagonal.saturating_sub(self.after_count.saturating_sub(1))
    }

    fn last_on_diagonal(&self) -> usize {
        self.diagonal.min(self.before_count.saturating_sub(1))
    }
}

impl Iterator for ZigzagPairs {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.before_count == 0 || self.after_count == 0 {
            return None;
        }
        if self.diagonal > self.last_diagonal() {
            return None;
        }

        let pair = (self.before, self.diagonal - self.before);

        if self.before < self.last_on_diagonal() {
            self.before += 1;
        } else {
            self.diagonal += 1;
            self.before = self.first_on_diagonal();
        }

        Some(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_zigzag_order() {
        let pairs: Vec<_> = ZigzagPairs::new(2, 2).collect();
        assert_eq!(
            pairs,
            vec![
                (0, 0),
                (0, 1),
                (1, 0),
                (0, 2),
                (1, 1),
                (2, 0),
                (1, 2),
                (2, 1),
                (2, 2),
            ]
        );
    }

    #[test]
    fn test_zigzag_rectangular() {
        let pairs: Vec<_> = ZigzagPairs::new(0, 2).collect();
        assert_eq!(pairs, vec![(0, 0), (0, 1), (0, 2)]);

        let pairs: Vec<_> = ZigzagPairs::new(2, 0).collect();
        assert_eq!(pairs, vec![(0, 0), (1, 0), (2, 0)]);

        let pairs: Vec<_> = ZigzagPairs::new(1, 3).collect();
        assert_eq!(
            pairs,
            vec![(0, 0), (0, 1), (1, 0), (0, 2), (1, 1), (0, 3), (1, 2), (1, 3)]
        );
    }

    #[test]
    fn test_zigzag_complete_without_duplicates() {
        for before in 0..6 {
            for after in 0..6 {
                let pairs: Vec<_> = ZigzagPairs::with_counts(before, after).collect();
                let unique: HashSet<_> = pairs.iter().copied().collect();
                assert_eq!(pairs.len(), before * after);
                assert_eq!(unique.len(), pairs.len());
                assert!(pairs.iter().all(|&(b, a)| b < before && a < after));

                let sums: Vec<_> = pairs.iter().map(|&(b, a)| b + a).collect();
                assert!(sums.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }

    #[test]
    fn test_zigzag_empty_side_yields_nothing() {
        assert_eq!(ZigzagPairs::with_counts(0, 4).count(), 0);
        assert_eq!(ZigzagPairs::with_counts(3, 0).count(), 0);
    }

    #[test]
    fn test_zigzag_restartable() {
        let pairs = ZigzagPairs::new(3, 2);
        let first: Vec<_> = pairs.clone().collect();
        let second: Vec<_> = pairs.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), ZigzagPairs::new(3, 2).total());
    }
}
