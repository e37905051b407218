use crate::types::{Timestamp, MILLIS_PER_DAY};

/// Sorted set of acquisition timestamps held by a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeIndex {
    times: Vec<Timestamp>,
}

impl TimeIndex {
    pub fn new<I: IntoIterator<Item = Timestamp>>(times: I) -> Self {
        let mut times: Vec<Timestamp> = times.into_iter().collect();
        times.sort_unstable();
        times.dedup();
        Self { times }
    }

    /// Timestamps in ascending order
    pub fn sorted(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Index at which `target` would be inserted to keep the list sorted,
    /// to the right of any equal element.
    pub fn insertion_point(&self, target: Timestamp) -> usize {
        self.times.partition_point(|&t| t <= target)
    }

    /// Split around `target` into (strictly earlier, not earlier), both nearest-first.
    pub fn split_nearest_first(&self, target: Timestamp) -> (Vec<Timestamp>, Vec<Timestamp>) {
        let (before, after) = self.times.split_at(self.insertion_point(target));
        (before.iter().rev().copied().collect(), after.to_vec())
    }

    /// All timestamps ordered by distance from `target`; ties keep ascending order.
    pub fn by_distance(&self, target: Timestamp) -> Vec<Timestamp> {
        let mut ordered = self.times.clone();
        ordered.sort_by_key(|&t| (t - target).abs());
        ordered
    }
}

/// Whole days between two timestamps, truncated toward zero.
///
/// The count is symmetric: 29.5 days counts as 29 on either side of the
/// target. Flooring the signed difference before taking its magnitude
/// would instead count an observation 29.5 days before the target as 30.
pub fn days_apart(a: Timestamp, b: Timestamp) -> i64 {
    chrono::Duration::milliseconds((b - a).abs()).num_days()
}

/// Whether two timestamps fall inside an optional day window (strictly fewer days).
pub fn within_window(a: Timestamp, b: Timestamp, max_days_apart: Option<i64>) -> bool {
    match max_days_apart {
        Some(max_days) => days_apart(a, b) < max_days,
        None => true,
    }
}

/// Convert a day count to milliseconds
pub fn days(n: i64) -> Timestamp {
    n * MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_and_deduplicated() {
        let index = TimeIndex::new(vec![300, 100, 200, 100]);
        assert_eq!(index.sorted(), &[100, 200, 300]);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_insertion_point_resolves_right() {
        let index = TimeIndex::new(vec![100, 200, 300]);
        assert_eq!(index.insertion_point(50), 0);
        assert_eq!(index.insertion_point(100), 1);
        assert_eq!(index.insertion_point(150), 1);
        assert_eq!(index.insertion_point(300), 3);
        assert_eq!(index.insertion_point(400), 3);
    }

    #[test]
    fn test_split_nearest_first() {
        let index = TimeIndex::new(vec![100, 200, 300, 400]);
        let (before, after) = index.split_nearest_first(250);
        assert_eq!(before, vec![200, 100]);
        assert_eq!(after, vec![300, 400]);

        // An exact match lands in the earlier list because the split is to its right
        let (before, after) = index.split_nearest_first(300);
        assert_eq!(before, vec![300, 200, 100]);
        assert_eq!(after, vec![400]);
    }

    #[test]
    fn test_by_distance_is_stable() {
        let index = TimeIndex::new(vec![100, 200, 300, 400]);
        assert_eq!(index.by_distance(250), vec![200, 300, 100, 400]);
        assert_eq!(index.by_distance(0), vec![100, 200, 300, 400]);
    }

    #[test]
    fn test_day_window() {
        assert_eq!(days_apart(0, days(3)), 3);
        assert_eq!(days_apart(days(3), 0), 3);
        assert_eq!(days_apart(0, days(3) - 1), 2);

        assert!(within_window(0, days(29), Some(30)));
        assert!(!within_window(0, days(30), Some(30)));
        assert!(within_window(0, days(10_000), None));
    }

    #[test]
    fn test_fractional_days_truncate_on_both_sides() {
        let target = days(100);
        let half_day = MILLIS_PER_DAY / 2;
        let earlier = target - days(29) - half_day;
        let later = target + days(29) + half_day;

        assert_eq!(days_apart(earlier, target), 29);
        assert_eq!(days_apart(target, earlier), 29);
        assert_eq!(days_apart(later, target), 29);
        assert!(within_window(earlier, target, Some(30)));
        assert!(within_window(later, target, Some(30)));
    }
}
