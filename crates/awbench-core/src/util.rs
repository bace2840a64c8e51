//! Small data-hygiene helpers used by both loaders.

use std::collections::HashSet;
use std::hash::Hash;

/// Returns `true` if `asin` looks like a valid ASIN: exactly 10 ASCII
/// alphanumeric characters.
#[must_use]
pub fn validate_asin(asin: &str) -> bool {
    asin.len() == 10 && asin.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Removes duplicate items, keyed by the value returned from `key`.
///
/// First-seen order is preserved and later duplicates are dropped. Items for
/// which `key` returns `None` (no usable key) are dropped as well.
pub fn deduplicate_by<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut seen: HashSet<K> = HashSet::new();
    let mut unique = Vec::new();
    for item in items {
        if let Some(k) = key(&item) {
            if seen.insert(k) {
                unique.push(item);
            }
        }
    }
    unique
}

/// Deduplicates product records by ASIN, keeping the first occurrence.
///
/// Records with an empty ASIN are dropped.
#[must_use]
pub fn deduplicate_by_asin(records: Vec<crate::ProductRecord>) -> Vec<crate::ProductRecord> {
    deduplicate_by(records, |r| {
        let asin = r.asin.trim();
        if asin.is_empty() {
            None
        } else {
            Some(asin.to_string())
        }
    })
}

/// Splits `items` into consecutive chunks of at most `chunk_size` elements.
///
/// The final chunk may be shorter. An empty input yields no chunks.
#[must_use]
pub fn chunked<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    if chunk_size == 0 {
        return Vec::new();
    }
    items.chunks(chunk_size).map(<[T]>::to_vec).collect()
}
