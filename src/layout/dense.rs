//! Compact dense layout for 1-d vectors.
//!
//! Offsets are global indexes: the owning mapping's `start` absorbs the base
//! of the required range, so a buffer of `count` elements backs the window
//! `[start, start + count)`.

use crate::error::RepartError;
use crate::space::{Index, Range};

/// Dense 1-d layout: one contiguous run of `count` element slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseLayout {
    count: usize,
    /// Bounding range the layout was built for; reuse demands the new
    /// window to lie inside the adopted buffer's window.
    required: Range,
}

impl DenseLayout {
    pub(crate) fn new(required: Range) -> Result<Self, RepartError> {
        if required.dims() != 1 {
            return Err(RepartError::InvalidArgument(
                "dense vector layout supports 1-d spaces only",
            ));
        }
        Ok(DenseLayout {
            count: required.size() as usize,
            required,
        })
    }

    /// Total element slots reachable through this layout.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mapping number containing `idx`; the upper bound is the caller's to
    /// check against the mapping's required range.
    #[inline]
    pub fn section(&self, idx: &Index) -> Option<usize> {
        if idx.get(0) >= 0 {
            Some(0)
        } else {
            None
        }
    }

    /// Global offset of `idx`: the index itself.
    #[inline]
    pub fn offset(&self, idx: &Index) -> i64 {
        idx.get(0)
    }

    /// Whether this layout can take over `old`'s buffer: it must fit
    /// (`count ≤ old.count`) and address inside the adopted window.
    pub fn reuse(&self, old: &DenseLayout) -> bool {
        self.count <= old.count && old.required.contains(&self.required)
    }

    pub fn describe(&self) -> String {
        format!("dense vector (1d, 1 map, {} count)", self.count)
    }
}
