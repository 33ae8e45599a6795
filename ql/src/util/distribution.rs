use std::fmt::Display;
use std::hash::Hash;

use itertools::Itertools;
use rustc_hash::FxHashMap;

/// `"Up 41.0%, Down 33.3%, Stay 25.7%"` - relative frequency of each distinct element, most frequent first
pub fn frequency_line<T>(elements: impl IntoIterator<Item = T>) -> String
where
    T: Display + Hash + Eq,
{
    let mut counts = FxHashMap::<T, usize>::default();
    let mut total = 0_usize;
    for e in elements {
        counts.entry(e).and_modify(|c| *c += 1).or_insert(1);
        total += 1;
    }
    counts
        .into_iter()
        .sorted_by(|(a_key, a), (b_key, b)| b.cmp(a).then_with(|| a_key.to_string().cmp(&b_key.to_string())))
        .map(|(e, count)| format!("{} {:.1}%", e, 100.0 * count as f32 / total as f32))
        .join(", ")
}

/// Groups episode rewards into buckets of `bucket_width` and prints `"3x(-21..-20), 5x(-19..-18)"`
/// in ascending bucket order.
pub fn reward_histogram_line(
    rewards: &[f32],
    bucket_width: f32,
) -> String {
    assert!(bucket_width > 0.0);
    let mut buckets = FxHashMap::<i64, usize>::default();
    for r in rewards.iter().filter(|r| r.is_finite()) {
        let bucket = (r / bucket_width).floor() as i64;
        *buckets.entry(bucket).or_default() += 1;
    }
    buckets
        .into_iter()
        .sorted_by_key(|&(bucket, _)| bucket)
        .map(|(bucket, count)| {
            let from = bucket as f32 * bucket_width;
            format!("{}x({:.1}..{:.1})", count, from, from + bucket_width)
        })
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_line() {
        let line = frequency_line(["a", "b", "a", "a"]);
        assert_eq!(line, "a 75.0%, b 25.0%");
    }

    #[test]
    fn test_frequency_line_empty() {
        assert_eq!(frequency_line(Vec::<u8>::new()), "");
    }

    #[test]
    fn test_reward_histogram_line() {
        let line = reward_histogram_line(&[-21.0, -20.5, -3.0, 2.0, 2.5], 1.0);
        assert_eq!(line, "2x(-21.0..-20.0), 1x(-3.0..-2.0), 2x(2.0..3.0)");
    }
}
