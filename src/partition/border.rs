//! Border arrays: the sorted per-task range lists a partitioner produces.
//!
//! A border array is append-only while the partitioner runs and frozen
//! afterwards. Freezing sorts entries by `(task, map_no, from)` (stable on
//! ties), merges overlapping ranges of the same key, and builds the
//! per-task offset table that the layouts and the transfer planner index
//! into. Ranges that merely touch are deliberately left apart: neighbour
//! detection is the sparse layout's job.

use serde::{Deserialize, Serialize};

use crate::error::RepartError;
use crate::instance::Group;
use crate::space::{Range, Space};

/// One entry of a border array: `range` of `space` assigned to `task`,
/// addressed through mapping number `map_no` of the task's layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSlice {
    pub task: usize,
    pub map_no: usize,
    pub range: Range,
}

/// Sorted vector of [`TaskSlice`] entries for a `(group, space)` pair.
#[derive(Clone, Debug)]
pub struct BorderArray {
    group: Group,
    space: Space,
    entries: Vec<TaskSlice>,
    /// Per-task offsets into `entries`, built by `freeze` (len = size + 1).
    off: Option<Vec<usize>>,
}

impl BorderArray {
    pub(crate) fn new(group: Group, space: Space) -> Self {
        BorderArray {
            group,
            space,
            entries: Vec::new(),
            off: None,
        }
    }

    #[inline]
    pub fn group(&self) -> Group {
        self.group
    }

    #[inline]
    pub fn space(&self) -> Space {
        self.space
    }

    /// Append `range` for `task` under mapping number 0.
    ///
    /// # Errors
    /// `EmptyRange` for a zero-size range, `SliceOutsideSpace` when the
    /// range leaves the space, `InvalidArgument` for an unknown task, and
    /// `PreconditionFailed` once the array is frozen.
    pub fn append(&mut self, task: usize, range: Range) -> Result<(), RepartError> {
        self.append_to_map(task, range, 0)
    }

    /// Append `range` for `task` under mapping number `map_no`.
    pub fn append_to_map(
        &mut self,
        task: usize,
        range: Range,
        map_no: usize,
    ) -> Result<(), RepartError> {
        if self.off.is_some() {
            return Err(RepartError::PreconditionFailed(
                "border array is frozen; no further appends",
            ));
        }
        if task >= self.group.size() {
            return Err(RepartError::InvalidArgument("task id outside the group"));
        }
        if range.is_empty() {
            return Err(RepartError::EmptyRange);
        }
        if range.space() != self.space || !self.space.full_range().contains(&range) {
            return Err(RepartError::SliceOutsideSpace { task });
        }
        self.entries.push(TaskSlice {
            task,
            map_no,
            range,
        });
        Ok(())
    }

    /// Sort, merge overlapping same-key ranges (1-d), and build the
    /// per-task offset table. Idempotent.
    pub(crate) fn freeze(&mut self) -> Result<(), RepartError> {
        if self.off.is_some() {
            return Ok(());
        }
        self.entries.sort_by(|a, b| {
            (a.task, a.map_no, a.range.from().0).cmp(&(b.task, b.map_no, b.range.from().0))
        });

        // Duplicate and overlapping appends for the same (task, map_no) are
        // unioned; ranges that only touch stay separate.
        if self.space.dims() == 1 {
            let mut merged: Vec<TaskSlice> = Vec::with_capacity(self.entries.len());
            for e in self.entries.drain(..) {
                match merged.last_mut() {
                    Some(prev)
                        if prev.task == e.task
                            && prev.map_no == e.map_no
                            && e.range.from().get(0) < prev.range.to().get(0) =>
                    {
                        if e.range.to().get(0) > prev.range.to().get(0) {
                            prev.range = Range::new_1d(
                                self.space,
                                prev.range.from().get(0),
                                e.range.to().get(0),
                            )?;
                        }
                    }
                    _ => merged.push(e),
                }
            }
            self.entries = merged;
        }

        let mut off = vec![0usize; self.group.size() + 1];
        for e in &self.entries {
            off[e.task + 1] += 1;
        }
        for t in 0..self.group.size() {
            off[t + 1] += off[t];
        }
        self.off = Some(off);
        #[cfg(debug_assertions)]
        self.validate_invariants()?;
        Ok(())
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.off.is_some()
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry `i`.
    #[inline]
    pub fn get(&self, i: usize) -> Option<&TaskSlice> {
        self.entries.get(i)
    }

    /// Range of entry `i`; panics on out-of-bounds like slice indexing.
    #[inline]
    pub fn range_at(&self, i: usize) -> Range {
        self.entries[i].range
    }

    /// Task of entry `i`.
    #[inline]
    pub fn task_at(&self, i: usize) -> usize {
        self.entries[i].task
    }

    /// All entries in sorted order (insertion order before `freeze`).
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &TaskSlice> {
        self.entries.iter()
    }

    /// The contiguous run of entries for `task`.
    ///
    /// # Errors
    /// `BordersInvalid` before `freeze`.
    pub fn for_task(&self, task: usize) -> Result<&[TaskSlice], RepartError> {
        let off = self.off.as_ref().ok_or(RepartError::BordersInvalid)?;
        if task >= self.group.size() {
            return Err(RepartError::InvalidArgument("task id outside the group"));
        }
        Ok(&self.entries[off[task]..off[task + 1]])
    }

    /// Check the frozen-array invariants: every entry inside the space,
    /// entries sorted, same-`(task, map_no)` ranges disjoint (1-d).
    pub fn validate_invariants(&self) -> Result<(), RepartError> {
        let full = self.space.full_range();
        for e in &self.entries {
            if !full.contains(&e.range) {
                return Err(RepartError::SliceOutsideSpace { task: e.task });
            }
        }
        if self.off.is_some() {
            for w in self.entries.windows(2) {
                let (a, b) = (&w[0], &w[1]);
                if (a.task, a.map_no, a.range.from().0) > (b.task, b.map_no, b.range.from().0) {
                    return Err(RepartError::PreconditionFailed(
                        "border array entries out of order",
                    ));
                }
                if self.space.dims() == 1
                    && a.task == b.task
                    && a.map_no == b.map_no
                    && b.range.from().get(0) < a.range.to().get(0)
                {
                    return Err(RepartError::PreconditionFailed(
                        "overlapping ranges for one task and mapping",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(n: u64, tasks: usize) -> (Space, BorderArray) {
        let s = Space::new_1d(n).unwrap();
        let g = Group::new(0, tasks);
        (s, BorderArray::new(g, s))
    }

    #[test]
    fn append_validates() {
        let (s, mut ba) = setup(10, 2);
        assert_eq!(
            ba.append(0, Range::new_1d(s, 3, 3).unwrap()).unwrap_err(),
            RepartError::EmptyRange
        );
        assert!(matches!(
            ba.append(5, Range::new_1d(s, 0, 2).unwrap()).unwrap_err(),
            RepartError::InvalidArgument(_)
        ));
        ba.append(1, Range::new_1d(s, 0, 10).unwrap()).unwrap();
        assert_eq!(ba.len(), 1);
    }

    #[test]
    fn freeze_sorts_and_offsets() {
        let (s, mut ba) = setup(10, 3);
        ba.append(2, Range::new_1d(s, 8, 10).unwrap()).unwrap();
        ba.append(0, Range::new_1d(s, 4, 6).unwrap()).unwrap();
        ba.append(0, Range::new_1d(s, 0, 2).unwrap()).unwrap();
        ba.freeze().unwrap();

        let t0 = ba.for_task(0).unwrap();
        assert_eq!(t0.len(), 2);
        assert_eq!(t0[0].range.from().get(0), 0);
        assert_eq!(t0[1].range.from().get(0), 4);
        assert!(ba.for_task(1).unwrap().is_empty());
        assert_eq!(ba.for_task(2).unwrap().len(), 1);

        assert!(matches!(
            ba.append(0, Range::new_1d(s, 0, 1).unwrap()).unwrap_err(),
            RepartError::PreconditionFailed(_)
        ));
    }

    #[test]
    fn overlapping_appends_are_unioned() {
        let (s, mut ba) = setup(10, 2);
        ba.append(0, Range::new_1d(s, 2, 5).unwrap()).unwrap();
        ba.append(0, Range::new_1d(s, 2, 5).unwrap()).unwrap();
        ba.append(0, Range::new_1d(s, 4, 7).unwrap()).unwrap();
        // touching, not overlapping: must stay a separate entry
        ba.append(0, Range::new_1d(s, 7, 9).unwrap()).unwrap();
        ba.freeze().unwrap();

        let t0 = ba.for_task(0).unwrap();
        assert_eq!(t0.len(), 2);
        assert_eq!(
            (t0[0].range.from().get(0), t0[0].range.to().get(0)),
            (2, 7)
        );
        assert_eq!(
            (t0[1].range.from().get(0), t0[1].range.to().get(0)),
            (7, 9)
        );
        ba.validate_invariants().unwrap();
    }

    #[test]
    fn for_task_requires_freeze() {
        let (s, mut ba) = setup(4, 1);
        ba.append(0, Range::new_1d(s, 0, 4).unwrap()).unwrap();
        assert_eq!(ba.for_task(0).unwrap_err(), RepartError::BordersInvalid);
        ba.freeze().unwrap();
        assert_eq!(ba.for_task(0).unwrap().len(), 1);
    }
}
