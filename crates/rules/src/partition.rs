//! Grouping of store writes by partition key.
//!
//! The table store only commits a batch atomically when every row in it shares
//! one partition key, so everything headed for the store is bucketed here
//! first. Buckets are not size-limited: callers split any bucket larger than
//! the store's batch limit before writing.

use std::collections::BTreeMap;

use chaos_core::ScheduledActionRecord;

/// Bucket arbitrary items by a derived partition key. Order within a bucket
/// follows input order.
pub fn group_by_partition<T, I, F>(items: I, key: F) -> BTreeMap<String, Vec<T>>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> String,
{
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(&item)).or_default().push(item);
    }
    groups
}

/// Bucket scheduled actions by their schedule-table partition key.
///
/// Standalone targets land under their resource group, scale-set members
/// under the scale set id, availability-set members under the availability
/// set id (all transliterated).
pub fn assemble(records: Vec<ScheduledActionRecord>) -> BTreeMap<String, Vec<ScheduledActionRecord>> {
    group_by_partition(records, ScheduledActionRecord::partition_key)
}
