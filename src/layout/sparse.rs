//! Sparse layout for 1-d vectors.
//!
//! The worker owns a disjoint union of intervals; the layout eliminates the
//! gaps between them and appends up to `external_count` slots for values
//! received from other workers:
//!
//! ```text
//! [ I0 ][ I1 ]...[ I_{m-1} ][ ext_0 ext_1 ... ext_{E-1} ]
//!   local_length = Σ |I_k|          external block = E
//! ```
//!
//! External slots are handed out by a cursor in the order the indexes are
//! first asked for, wrapping after `E` slots so a second identical pass
//! finds the same slots again. The cursor is per layout instance and is
//! fresh at the start of every transition; within one transition the unpack
//! order equals the later query order by the plan's determinism.

use std::sync::Arc;

use crate::error::RepartError;
use crate::partition::border::BorderArray;
use crate::space::Index;

/// One owned interval `[from, to)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Interval {
    pub from: i64,
    pub to: i64,
}

impl Interval {
    #[inline]
    pub fn len(&self) -> usize {
        (self.to - self.from) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }
}

/// Gap-eliminating layout over a union of 1-d intervals plus appended
/// external slots.
#[derive(Clone, Debug)]
pub struct SparseLayout {
    /// Owned intervals, strictly ordered and pairwise disjoint. Shared with
    /// the layout it was inherited from, if any.
    map: Arc<[Interval]>,
    local_length: usize,
    external_count: usize,
    external_cursor: usize,
    /// Upper bound on slots ever requested through this buffer lineage.
    allocated_slots: usize,
    lower_bound: i64,
    upper_bound: i64,
}

impl SparseLayout {
    /// Build the interval map from the frozen border slice of `my_id`,
    /// coalescing neighbouring ranges (`prev.to == cur.from`).
    pub fn from_borders(
        ba: &BorderArray,
        my_id: usize,
        external_slots: usize,
    ) -> Result<Self, RepartError> {
        if ba.space().dims() != 1 {
            return Err(RepartError::InvalidArgument(
                "sparse vector layout supports 1-d spaces only",
            ));
        }
        let mine = ba.for_task(my_id)?;
        let mut intervals: Vec<Interval> = Vec::new();
        for e in mine {
            let (f, t) = (e.range.from().get(0), e.range.to().get(0));
            match intervals.last_mut() {
                Some(open) if open.to == f => open.to = t,
                _ => intervals.push(Interval { from: f, to: t }),
            }
        }
        Ok(Self::from_intervals(intervals.into(), external_slots))
    }

    /// Build an external view over an inherited interval map. External
    /// partitionings never re-derive the map; they address local values
    /// through the view they were switched from.
    pub(crate) fn external_view(map: Arc<[Interval]>, external_slots: usize) -> Self {
        Self::from_intervals(map, external_slots)
    }

    fn from_intervals(map: Arc<[Interval]>, external_count: usize) -> Self {
        let local_length = map.iter().map(Interval::len).sum();
        let lower_bound = map.first().map_or(0, |iv| iv.from);
        let upper_bound = map.last().map_or(0, |iv| iv.to);
        SparseLayout {
            map,
            local_length,
            external_count,
            external_cursor: 0,
            allocated_slots: local_length + external_count,
            lower_bound,
            upper_bound,
        }
    }

    /// Total element slots reachable: owned plus external.
    #[inline]
    pub fn count(&self) -> usize {
        self.local_length + self.external_count
    }

    /// Number of owned slots.
    #[inline]
    pub fn local_length(&self) -> usize {
        self.local_length
    }

    /// Number of appended external slots.
    #[inline]
    pub fn external_count(&self) -> usize {
        self.external_count
    }

    /// Whether this layout serves an external partitioning.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.external_count > 0
    }

    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        &self.map
    }

    #[inline]
    pub(crate) fn map_handle(&self) -> Arc<[Interval]> {
        self.map.clone()
    }

    #[inline]
    pub fn lower_bound(&self) -> i64 {
        self.lower_bound
    }

    #[inline]
    pub fn upper_bound(&self) -> i64 {
        self.upper_bound
    }

    /// Mapping number containing `idx`: 0 while the index is inside the
    /// interval map's bounds. Gap indexes inside the bounds are still
    /// reported here; `offset` resolves them to external slots.
    pub fn section(&self, idx: &Index) -> Option<usize> {
        let g = idx.get(0);
        if g >= self.lower_bound && g < self.upper_bound {
            Some(0)
        } else {
            None
        }
    }

    /// Buffer slot for global index `g`: prefix-sum position inside the
    /// owned intervals, or the next external slot for an index this worker
    /// does not own.
    ///
    /// # Errors
    /// `OutOfRange` for a non-owned index when no external slots exist.
    pub fn offset(&mut self, idx: &Index) -> Result<usize, RepartError> {
        let g = idx.get(0);
        let mut prefix = 0usize;
        for iv in self.map.iter() {
            if g < iv.from {
                break;
            }
            if g < iv.to {
                let slot = prefix + (g - iv.from) as usize;
                debug_assert!(slot < self.local_length);
                return Ok(slot);
            }
            prefix += iv.len();
        }
        if self.external_count == 0 {
            return Err(RepartError::OutOfRange { index: g });
        }
        if self.external_cursor == self.external_count {
            self.external_cursor = 0;
        }
        let slot = self.local_length + self.external_cursor;
        self.external_cursor += 1;
        Ok(slot)
    }

    /// Inverse of `offset` for owned slots.
    ///
    /// # Errors
    /// `OutOfRange` for external slots; they carry no global identity.
    pub fn global_of(&self, slot: usize) -> Result<i64, RepartError> {
        let mut prefix = 0usize;
        for iv in self.map.iter() {
            if slot < prefix + iv.len() {
                return Ok(iv.from + (slot - prefix) as i64);
            }
            prefix += iv.len();
        }
        Err(RepartError::OutOfRange {
            index: slot as i64,
        })
    }

    /// Whether this layout can take over `old`'s buffer. On success the
    /// requested-slots upper bound carries over, and an external view
    /// inherits the old interval map outright.
    pub fn reuse(&mut self, old: &SparseLayout) -> bool {
        if self.allocated_slots > old.allocated_slots || self.local_length != old.local_length {
            return false;
        }
        if self.is_external() {
            self.adopt_map(old);
        }
        self.allocated_slots = old.allocated_slots;
        true
    }

    /// Take over `old`'s interval map (used by external views, and by the
    /// engine when reuse fails only on the external/non-external switch).
    pub(crate) fn adopt_map(&mut self, old: &SparseLayout) {
        self.map = old.map.clone();
        self.local_length = old.local_length;
        self.lower_bound = old.lower_bound;
        self.upper_bound = old.upper_bound;
    }

    /// Whether owned-slot addressing equals `other`'s (same interval map).
    pub(crate) fn same_addressing(&self, other: &SparseLayout) -> bool {
        Arc::ptr_eq(&self.map, &other.map) || *self.map == *other.map
    }

    pub fn describe(&self) -> String {
        format!(
            "sparse vector (1d, 1 map, {} local, {} external, {} count, {} intervals)",
            self.local_length,
            self.external_count,
            self.count(),
            self.map.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Group;
    use crate::space::{Range, Space};

    fn borders(spans: &[(i64, i64)]) -> BorderArray {
        let s = Space::new_1d(100).unwrap();
        let mut ba = BorderArray::new(Group::new(0, 1), s);
        for &(f, t) in spans {
            ba.append(0, Range::new_1d(s, f, t).unwrap()).unwrap();
        }
        ba.freeze().unwrap();
        ba
    }

    fn idx(i: i64) -> Index {
        Index::new_1d(i)
    }

    #[test]
    fn mapping_build_coalesces_neighbours() {
        let ba = borders(&[(0, 2), (2, 4), (5, 7)]);
        let l = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        assert_eq!(
            l.intervals(),
            &[Interval { from: 0, to: 4 }, Interval { from: 5, to: 7 }]
        );
        assert_eq!(l.local_length(), 6);
        assert_eq!(l.lower_bound(), 0);
        assert_eq!(l.upper_bound(), 7);
    }

    #[test]
    fn penultimate_neighbour_is_coalesced() {
        // the last two ranges touch; they must fold into one interval
        let ba = borders(&[(0, 2), (4, 6), (6, 9)]);
        let l = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        assert_eq!(
            l.intervals(),
            &[Interval { from: 0, to: 2 }, Interval { from: 4, to: 9 }]
        );
        assert_eq!(l.local_length(), 7);
    }

    #[test]
    fn offsets_skip_gaps() {
        let ba = borders(&[(0, 2), (2, 4), (5, 7)]);
        let mut l = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        assert_eq!(l.offset(&idx(3)).unwrap(), 3);
        assert_eq!(l.offset(&idx(6)).unwrap(), 5);
        assert_eq!(l.global_of(3).unwrap(), 3);
        assert_eq!(l.global_of(5).unwrap(), 6);
    }

    #[test]
    fn external_cursor_wraps() {
        let ba = borders(&[(0, 2), (2, 4), (5, 7)]);
        let mut l = SparseLayout::from_borders(&ba, 0, 2).unwrap();
        assert_eq!(l.count(), 8);
        // two fresh external slots, then wrap-around
        assert_eq!(l.offset(&idx(40)).unwrap(), 6);
        assert_eq!(l.offset(&idx(50)).unwrap(), 7);
        assert_eq!(l.offset(&idx(40)).unwrap(), 6);
    }

    #[test]
    fn no_external_slot_is_an_error() {
        let ba = borders(&[(0, 4)]);
        let mut l = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        assert_eq!(
            l.offset(&idx(9)).unwrap_err(),
            RepartError::OutOfRange { index: 9 }
        );
    }

    #[test]
    fn section_checks_map_bounds() {
        let ba = borders(&[(2, 4), (6, 8)]);
        let l = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        assert_eq!(l.section(&idx(2)), Some(0));
        assert_eq!(l.section(&idx(5)), Some(0)); // gap, still inside bounds
        assert_eq!(l.section(&idx(1)), None);
        assert_eq!(l.section(&idx(8)), None);
    }

    #[test]
    fn reuse_tracks_allocated_slots_and_local_length() {
        let ba = borders(&[(0, 6)]);
        let local = SparseLayout::from_borders(&ba, 0, 0).unwrap();

        // external view over the same locals needs more slots: no reuse,
        // but it inherits the interval map
        let ext = SparseLayout::external_view(local.map_handle(), 3);
        assert!(!ext.clone().reuse(&local));
        assert_eq!(ext.local_length(), 6);
        assert_eq!(ext.count(), 9);

        // switching back to the local view fits into the external buffer
        let mut local2 = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        assert!(local2.reuse(&ext));
        assert_eq!(local2.allocated_slots, 9);

        // and to the external view again: now it fits, map inherited
        let mut ext2 = SparseLayout::external_view(local2.map_handle(), 3);
        assert!(ext2.reuse(&local2));
        assert!(ext2.same_addressing(&local2));
    }

    #[test]
    fn reuse_rejects_different_local_length() {
        let a = SparseLayout::from_borders(&borders(&[(0, 6)]), 0, 0).unwrap();
        let mut b = SparseLayout::from_borders(&borders(&[(0, 4)]), 0, 0).unwrap();
        assert!(!b.reuse(&a));
    }
}
