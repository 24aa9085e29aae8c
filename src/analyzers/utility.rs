use std::collections::HashMap;

/// Ratio of `sum` over `n` observations, 0.0 when there are none.
pub fn ratio(sum: f64, n: u64) -> f64 {
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Adds every count in `other` into `into`, key by key.
pub fn merge_counts(into: &mut HashMap<u32, u64>, other: &HashMap<u32, u64>) {
    for (&key, &count) in other {
        *into.entry(key).or_default() += count;
    }
}

/// The `k` keys with the largest counts, largest first. Equal counts are
/// ordered by ascending key so the ranking does not depend on hash order.
pub fn top_k(counts: &HashMap<u32, u64>, k: usize) -> Vec<(u32, u64)> {
    let mut ranked: Vec<(u32, u64)> = counts.iter().map(|(&key, &count)| (key, count)).collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
