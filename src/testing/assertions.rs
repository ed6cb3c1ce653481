//! Assertion functions for testing collected stream outputs.
//!
//! Parallel plans interleave partitions freely, so most comparisons here are multiset
//! comparisons; ordering has its own dedicated checks.

use crate::event::{Event, Timestamp};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

fn counts<T: Eq + Hash>(items: impl IntoIterator<Item = T>) -> HashMap<T, usize> {
    let mut m = HashMap::new();
    for i in items {
        *m.entry(i).or_insert(0) += 1;
    }
    m
}

/// Assert that two collections are equal in order and content.
///
/// # Panics
///
/// Panics if the collections differ in length or content.
///
/// # Example
///
/// ```
/// use ironstream::testing::assert_collections_equal;
///
/// assert_collections_equal(&[1, 2, 3], &[1, 2, 3]);
/// ```
pub fn assert_collections_equal<T: Debug + PartialEq>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(
            a, e,
            "Collection mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert that two collections hold the same elements with the same multiplicities,
/// ignoring order.
///
/// # Panics
///
/// Panics if any element occurs a different number of times.
///
/// # Example
///
/// ```
/// use ironstream::testing::assert_collections_unordered_equal;
///
/// assert_collections_unordered_equal(&[3, 1, 1, 2], &[1, 2, 1, 3]);
/// ```
pub fn assert_collections_unordered_equal<T: Debug + Eq + Hash>(actual: &[T], expected: &[T]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    let a = counts(actual.iter());
    let e = counts(expected.iter());
    if a != e {
        let missing: Vec<_> = e.iter().filter(|(k, n)| a.get(*k) != Some(n)).map(|(k, _)| *k).collect();
        let extra: Vec<_> = a.iter().filter(|(k, n)| e.get(*k) != Some(n)).map(|(k, _)| *k).collect();
        panic!(
            "Collection content mismatch:\n  Missing or miscounted: {missing:?}\n  Extra or miscounted: {extra:?}\n  Expected: {expected:?}\n  Actual: {actual:?}"
        );
    }
}

/// Assert that two collections of key-value pairs are equal after sorting.
///
/// # Panics
///
/// Panics if the collections differ after sorting.
///
/// # Example
///
/// ```
/// use ironstream::testing::assert_kv_collections_equal;
///
/// assert_kv_collections_equal(vec![("b", 2), ("a", 1)], vec![("a", 1), ("b", 2)]);
/// ```
pub fn assert_kv_collections_equal<K, V>(mut actual: Vec<(K, V)>, mut expected: Vec<(K, V)>)
where
    K: Debug + Ord,
    V: Debug + Ord,
{
    actual.sort();
    expected.sort();

    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected length: {}\n  Actual length: {}\n  Expected: {expected:?}\n  Actual: {actual:?}",
        expected.len(),
        actual.len()
    );

    for (i, ((ak, av), (ek, ev))) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            !(ak != ek || av != ev),
            "Collection mismatch at index {i} after sorting:\n  Expected: ({ek:?}, {ev:?})\n  Actual: ({ak:?}, {av:?})\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert that the payloads of `events` match `expected`, ignoring order.
///
/// # Panics
///
/// Panics if the payload multisets differ.
pub fn assert_payloads_unordered_equal<K, P>(events: &[Event<K, P>], expected: &[P])
where
    P: Debug + Eq + Hash + Clone,
{
    let payloads: Vec<P> = events.iter().map(|e| e.payload.clone()).collect();
    assert_collections_unordered_equal(&payloads, expected);
}

/// Assert that two event collections hold the same rows (interval, key and payload),
/// ignoring order.
///
/// # Panics
///
/// Panics if the row multisets differ.
pub fn assert_same_rows<K, P>(actual: &[Event<K, P>], expected: &[Event<K, P>])
where
    K: Debug + Eq + Hash,
    P: Debug + Eq + Hash,
{
    assert_collections_unordered_equal(actual, expected);
}

/// Assert that `events` are in non-decreasing `sync_time` order.
///
/// # Panics
///
/// Panics at the first out-of-order pair.
pub fn assert_sorted_by_sync<K: Debug, P: Debug>(events: &[Event<K, P>]) {
    for (i, w) in events.windows(2).enumerate() {
        assert!(
            w[0].sync_time <= w[1].sync_time,
            "Events out of sync order at index {i}:\n  {:?}\n  {:?}",
            w[0],
            w[1]
        );
    }
}

/// Assert that punctuations never go backwards.
///
/// # Panics
///
/// Panics at the first regression.
pub fn assert_punctuations_non_decreasing(punctuations: &[Timestamp]) {
    for (i, w) in punctuations.windows(2).enumerate() {
        assert!(
            w[0] <= w[1],
            "Punctuation regressed at index {i}: {} then {}\n  All: {punctuations:?}",
            w[0],
            w[1]
        );
    }
}

/// Assert that all elements in a collection satisfy a predicate.
///
/// # Panics
///
/// Panics if any element does not satisfy the predicate.
///
/// # Example
///
/// ```
/// use ironstream::testing::assert_all;
///
/// assert_all(&[2, 4, 6, 8], |x| x % 2 == 0);
/// ```
pub fn assert_all<T: Debug>(collection: &[T], predicate: impl Fn(&T) -> bool) {
    for (i, item) in collection.iter().enumerate() {
        assert!(
            predicate(item),
            "Predicate failed for element at index {i}:\n  Element: {item:?}\n  Collection: {collection:?}"
        );
    }
}

/// Assert that a collection has the expected size.
///
/// # Panics
///
/// Panics if the collection size doesn't match the expected size.
pub fn assert_collection_size<T>(collection: &[T], expected_size: usize) {
    assert_eq!(
        collection.len(),
        expected_size,
        "Collection size mismatch:\n  Expected: {expected_size}\n  Actual: {}",
        collection.len()
    );
}
