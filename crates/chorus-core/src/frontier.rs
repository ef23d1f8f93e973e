//! Thread-frontier diffing for the anonymous source.
//!
//! The anonymous source has no "since" cursor, so every poll fetches
//! the entire board catalog and only the ids not present in the
//! immediately preceding snapshot count as new. A thread that drops
//! off the catalog and reappears between polls is reported as new once
//! per reappearance; re-ingestion is idempotent so this is accepted.

use std::collections::HashSet;

/// Return the ids in `current` that are not in `previous`, preserving
/// the catalog order and dropping duplicates. Cold start (`None`)
/// treats every id as new.
pub fn diff(current: &[u64], previous: Option<&HashSet<u64>>) -> Vec<u64> {
    let mut seen = HashSet::with_capacity(current.len());
    current
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .filter(|id| previous.is_none_or(|prev| !prev.contains(id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u64]) -> HashSet<u64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn cold_start_reports_everything() {
        assert_eq!(diff(&[1, 2, 3], None), vec![1, 2, 3]);
    }

    #[test]
    fn identical_snapshots_report_nothing() {
        assert_eq!(diff(&[1, 2, 3], Some(&set(&[1, 2, 3]))), Vec::<u64>::new());
    }

    #[test]
    fn only_additions_are_reported() {
        // 2 disappeared, 4 appeared: removals must not show up.
        assert_eq!(diff(&[1, 3, 4], Some(&set(&[1, 2, 3]))), vec![4]);
    }

    #[test]
    fn duplicates_in_catalog_are_collapsed() {
        assert_eq!(diff(&[5, 5, 6], Some(&set(&[6]))), vec![5]);
    }

    #[test]
    fn empty_catalog_reports_nothing() {
        assert_eq!(diff(&[], None), Vec::<u64>::new());
        assert_eq!(diff(&[], Some(&set(&[1]))), Vec::<u64>::new());
    }
}
