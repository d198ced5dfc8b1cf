//! Pre-built datasets for exercising sinks.

use crate::runner::hash_partition;

/// Sentences for word-count style jobs.
///
/// ```
/// use stagecommit::testing::word_count_data;
///
/// let sentences = word_count_data();
/// assert!(!sentences.is_empty());
/// ```
#[must_use]
pub fn word_count_data() -> Vec<String> {
    vec![
        "hello world".to_string(),
        "hello rust".to_string(),
        "world of data".to_string(),
        "rust programming".to_string(),
        "hello data world".to_string(),
    ]
}

/// Word counts of [`word_count_data`], sorted by word.
#[must_use]
pub fn word_counts() -> Vec<(String, u64)> {
    let mut counts = std::collections::BTreeMap::<String, u64>::new();
    for line in word_count_data() {
        for word in line.split_whitespace() {
            *counts.entry(word.to_string()).or_default() += 1;
        }
    }
    counts.into_iter().collect()
}

/// [`word_counts`] hash-partitioned into `n` task inputs.
///
/// ```
/// use stagecommit::testing::word_count_partitions;
///
/// let parts = word_count_partitions(3);
/// assert_eq!(parts.len(), 3);
/// assert_eq!(parts.iter().map(Vec::len).sum::<usize>(), 7);
/// ```
#[must_use]
pub fn word_count_partitions(n: usize) -> Vec<Vec<(String, u64)>> {
    hash_partition(word_counts(), n)
}

/// Key-value data where one key dominates.
///
/// ```
/// use stagecommit::testing::skewed_key_value_data;
///
/// let kvs = skewed_key_value_data();
/// let hot_key_count = kvs.iter().filter(|(k, _)| k == "hot_key").count();
/// assert!(hot_key_count > 10);
/// ```
#[must_use]
pub fn skewed_key_value_data() -> Vec<(String, i32)> {
    let mut data = Vec::new();

    for i in 0..50 {
        data.push(("hot_key".to_string(), i));
    }
    for i in 0..30 {
        data.push((format!("warm_key_{}", i % 3), i));
    }
    for i in 0..20 {
        data.push((format!("cold_key_{i}"), i));
    }

    data
}

/// `tasks` partitions of `per_task` records each; record `j` of task `i`
/// is `(i, j)`.
#[must_use]
pub fn numbered_partitions(tasks: usize, per_task: usize) -> Vec<Vec<(u64, u64)>> {
    (0..tasks as u64)
        .map(|t| (0..per_task as u64).map(|r| (t, r)).collect())
        .collect()
}
