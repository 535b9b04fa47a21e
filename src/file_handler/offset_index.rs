//! Sparse line-ordinal to byte-offset memo
//!
//! Scanners record the start offset of every line they walk past so later
//! requests can resume from the nearest known line instead of byte zero.
//! Non-negative ordinals count from the start of the file; negative ordinals
//! count back from EOF (`-1` is the last line).

use crate::config::CachePolicy;
use std::collections::BTreeMap;

/// Sparse line-ordinal to byte-offset memo
///
/// - `offsets[0] = 0` always
/// - `offsets[n]` (n > 0) = byte position after the n-th terminator
/// - `offsets[-k]` = start of the k-th line from EOF, measured against
///   `tail_anchor`
///
/// Entries are write-once: a second insert for the same ordinal is ignored.
#[derive(Debug)]
pub struct OffsetIndex {
    offsets: BTreeMap<i64, u64>,

    /// File size the negative entries were measured against
    ///
    /// Negative ordinals move whenever the file grows or shrinks, so they are
    /// only reused while the size matches.
    tail_anchor: Option<u64>,

    policy: CachePolicy,

    /// Current sampling interval; starts at `policy.sample_interval` and
    /// doubles each time the bounded policy thins the index
    sample_interval: u64,
}

impl OffsetIndex {
    /// Create an unbounded index holding only `0 -> 0`
    pub fn new() -> Self {
        Self::with_policy(CachePolicy::default())
    }

    /// Create an index with an explicit retention policy
    pub fn with_policy(policy: CachePolicy) -> Self {
        let mut offsets = BTreeMap::new();
        offsets.insert(0, 0);
        Self {
            offsets,
            tail_anchor: None,
            sample_interval: policy.sample_interval.max(1),
            policy,
        }
    }

    /// Nearest known line start at or before `ordinal`
    ///
    /// # Returns
    /// * `(ordinal, offset)` of the closest cached line not past the target
    /// * `(0, 0)` when nothing closer is known
    pub fn lookup_forward(&self, ordinal: u64) -> (u64, u64) {
        let target = i64::try_from(ordinal).unwrap_or(i64::MAX);
        self.offsets
            .range(0..=target)
            .next_back()
            .map(|(&line, &offset)| (line as u64, offset))
            .unwrap_or((0, 0))
    }

    /// Nearest known negative line start at or after `ordinal`
    ///
    /// Used by the reverse scanner, which walks toward byte zero and therefore
    /// wants the cached line closest to the target from the EOF side.
    ///
    /// # Returns
    /// * `Some((ordinal, offset))` of the closest cached negative line
    /// * `None` when the scan has to start from EOF
    pub fn lookup_reverse(&self, ordinal: i64) -> Option<(i64, u64)> {
        if ordinal >= 0 {
            return None;
        }
        self.offsets
            .range(ordinal..0)
            .next()
            .map(|(&line, &offset)| (line, offset))
    }

    /// Exact lookup
    pub fn get(&self, ordinal: i64) -> Option<u64> {
        self.offsets.get(&ordinal).copied()
    }

    /// Record the start offset of line `ordinal`
    ///
    /// # Returns
    /// * `true` if the entry was stored
    /// * `false` if the ordinal was already present or falls off the sampling
    ///   interval
    pub fn insert(&mut self, ordinal: i64, offset: u64) -> bool {
        if ordinal.unsigned_abs() % self.sample_interval != 0 {
            return false;
        }
        if self.offsets.contains_key(&ordinal) {
            return false;
        }
        self.offsets.insert(ordinal, offset);
        self.enforce_bound();
        self.offsets.contains_key(&ordinal)
    }

    /// Bind the negative entries to a file size
    ///
    /// Drops every negative entry when `size` differs from the size they were
    /// recorded against.
    pub fn anchor_tail(&mut self, size: u64) {
        if self.tail_anchor == Some(size) {
            return;
        }
        if self.tail_anchor.is_some() {
            log::debug!(
                "offset index: file size changed ({:?} -> {}), dropping tail entries",
                self.tail_anchor,
                size
            );
        }
        self.offsets.retain(|&line, _| line >= 0);
        self.tail_anchor = Some(size);
    }

    /// Anchor to `size`, then look up like [`lookup_reverse`](Self::lookup_reverse)
    ///
    /// Both steps happen under one borrow, so the entry returned was measured
    /// against `size`.
    pub fn lookup_tail(&mut self, size: u64, ordinal: i64) -> Option<(i64, u64)> {
        self.anchor_tail(size);
        self.lookup_reverse(ordinal)
    }

    /// Record a negative entry measured against a file of `size` bytes
    ///
    /// Skipped when the index has since been re-anchored to another size: a
    /// reverse walk that started before the file changed must not leave
    /// entries behind for the new size.
    pub fn insert_tail(&mut self, size: u64, ordinal: i64, offset: u64) -> bool {
        if self.tail_anchor != Some(size) {
            log::trace!(
                "offset index: skipping line {} measured at size {} (anchor {:?})",
                ordinal,
                size,
                self.tail_anchor
            );
            return false;
        }
        self.insert(ordinal, offset)
    }

    /// File size the negative entries belong to
    pub fn tail_anchor(&self) -> Option<u64> {
        self.tail_anchor
    }

    /// Forget everything except `0 -> 0`
    ///
    /// Callers use this to resynchronize after the file was truncated or
    /// rewritten.
    pub fn clear(&mut self) {
        self.offsets.clear();
        self.offsets.insert(0, 0);
        self.tail_anchor = None;
        self.sample_interval = self.policy.sample_interval.max(1);
    }

    /// Number of stored entries, including `0 -> 0`
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Always false; ordinal 0 is always present
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn sample_interval(&self) -> u64 {
        self.sample_interval
    }

    fn enforce_bound(&mut self) {
        let Some(max) = self.policy.max_entries else {
            return;
        };
        while self.offsets.len() > max && self.sample_interval < u64::MAX / 2 {
            self.sample_interval *= 2;
            let interval = self.sample_interval;
            self.offsets
                .retain(|&line, _| line == 0 || line.unsigned_abs() % interval == 0);
            log::trace!(
                "offset index: thinned to {} entries at interval {}",
                self.offsets.len(),
                interval
            );
        }
    }
}

impl Default for OffsetIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_offset_index() {
        let index = OffsetIndex::new();
        assert_eq!(index.get(0), Some(0));
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup_forward(10), (0, 0));
        assert_eq!(index.lookup_reverse(-3), None);
        assert_eq!(index.tail_anchor(), None);
    }

    #[test]
    fn test_lookup_forward_nearest_not_past() {
        let mut index = OffsetIndex::new();
        index.insert(2, 12);
        index.insert(5, 30);

        assert_eq!(index.lookup_forward(1), (0, 0));
        assert_eq!(index.lookup_forward(2), (2, 12));
        assert_eq!(index.lookup_forward(4), (2, 12));
        assert_eq!(index.lookup_forward(99), (5, 30));
    }

    #[test]
    fn test_lookup_forward_ignores_negative_entries() {
        let mut index = OffsetIndex::new();
        index.anchor_tail(100);
        index.insert(-1, 90);
        assert_eq!(index.lookup_forward(3), (0, 0));
    }

    #[test]
    fn test_lookup_reverse_nearest_from_eof_side() {
        let mut index = OffsetIndex::new();
        index.anchor_tail(100);
        index.insert(-2, 80);
        index.insert(-5, 40);

        assert_eq!(index.lookup_reverse(-1), None);
        assert_eq!(index.lookup_reverse(-2), Some((-2, 80)));
        assert_eq!(index.lookup_reverse(-4), Some((-2, 80)));
        assert_eq!(index.lookup_reverse(-5), Some((-5, 40)));
        assert_eq!(index.lookup_reverse(-9), Some((-5, 40)));
        assert_eq!(index.lookup_reverse(0), None);
    }

    #[test]
    fn test_insert_is_write_once() {
        let mut index = OffsetIndex::new();
        assert!(index.insert(3, 18));
        assert!(!index.insert(3, 999));
        assert_eq!(index.get(3), Some(18));

        // ordinal 0 can never move
        assert!(!index.insert(0, 7));
        assert_eq!(index.get(0), Some(0));
    }

    #[test]
    fn test_anchor_tail_drops_stale_negative_entries() {
        let mut index = OffsetIndex::new();
        index.insert(4, 20);
        index.anchor_tail(50);
        index.insert(-1, 45);

        index.anchor_tail(50);
        assert_eq!(index.get(-1), Some(45));

        index.anchor_tail(60);
        assert_eq!(index.get(-1), None);
        assert_eq!(index.get(4), Some(20));
        assert_eq!(index.tail_anchor(), Some(60));
    }

    #[test]
    fn test_insert_tail_rejects_entries_for_an_old_size() {
        let mut index = OffsetIndex::new();
        assert_eq!(index.lookup_tail(6, -1), None);
        assert!(index.insert_tail(6, -1, 4));

        // Another scan saw the file grow to 8 bytes
        assert_eq!(index.lookup_tail(8, -1), None);
        assert!(!index.insert_tail(6, -2, 2));
        assert_eq!(index.get(-2), None);

        assert!(index.insert_tail(8, -1, 6));
        assert_eq!(index.lookup_tail(8, -1), Some((-1, 6)));
    }

    #[test]
    fn test_clear_keeps_origin() {
        let mut index = OffsetIndex::new();
        index.insert(1, 6);
        index.anchor_tail(12);
        index.insert(-1, 6);

        index.clear();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(0), Some(0));
        assert_eq!(index.tail_anchor(), None);
    }

    #[test]
    fn test_sampling_interval_skips_off_interval_ordinals() {
        let mut index = OffsetIndex::with_policy(CachePolicy {
            sample_interval: 4,
            max_entries: None,
        });
        assert!(!index.insert(3, 10));
        assert!(index.insert(4, 14));
        assert_eq!(index.lookup_forward(7), (4, 14));
    }

    #[test]
    fn test_bounded_policy_thins_entries() {
        let mut index = OffsetIndex::with_policy(CachePolicy::bounded(8));
        for line in 1..=100i64 {
            index.insert(line, line as u64 * 10);
        }

        assert!(index.len() <= 8);
        assert!(index.sample_interval() > 1);
        assert_eq!(index.get(0), Some(0));

        // Whatever survived still points at the right place
        for line in 1..=100u64 {
            let (found, offset) = index.lookup_forward(line);
            assert!(found <= line);
            assert_eq!(offset, found * 10);
        }
    }

    #[test]
    fn test_debug_implementation() {
        let index = OffsetIndex::new();
        let debug_str = format!("{:?}", index);
        assert!(debug_str.contains("OffsetIndex"));
        assert!(debug_str.contains("offsets"));
    }
}
