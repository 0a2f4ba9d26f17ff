//! `Space`: an immutable 1-to-3-D index space.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RepartError;
use crate::space::index::Index;
use crate::space::range::Range;

/// An immutable index space `∏ [0, size[d])` over `dims ∈ {1,2,3}`
/// dimensions. Spaces are small value types; partitionings and containers
/// keep copies rather than references.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Space {
    dims: usize,
    size: [u64; 3],
}

impl Space {
    /// 1-d space of `s0` indexes.
    ///
    /// # Errors
    /// `ZeroExtent` if `s0 == 0`.
    pub fn new_1d(s0: u64) -> Result<Self, RepartError> {
        Self::new(1, [s0, 0, 0])
    }

    /// 2-d space of `s0 × s1` indexes.
    pub fn new_2d(s0: u64, s1: u64) -> Result<Self, RepartError> {
        Self::new(2, [s0, s1, 0])
    }

    /// 3-d space of `s0 × s1 × s2` indexes.
    pub fn new_3d(s0: u64, s1: u64, s2: u64) -> Result<Self, RepartError> {
        Self::new(3, [s0, s1, s2])
    }

    fn new(dims: usize, size: [u64; 3]) -> Result<Self, RepartError> {
        for d in 0..dims {
            if size[d] == 0 {
                return Err(RepartError::ZeroExtent { dim: d });
            }
        }
        Ok(Space { dims, size })
    }

    /// Number of dimensions (1, 2 or 3).
    #[inline]
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Extent in dimension `d`; zero for dimensions beyond `dims`.
    #[inline]
    pub fn size(&self, d: usize) -> u64 {
        self.size[d]
    }

    /// Total number of indexes in the space.
    pub fn total(&self) -> u64 {
        (0..self.dims).map(|d| self.size[d]).product()
    }

    /// The range covering the whole space.
    pub fn full_range(&self) -> Range {
        let mut to = Index::default();
        for d in 0..self.dims {
            *to.get_mut(d) = self.size[d] as i64;
        }
        Range::new_unchecked(*self, Index::default(), to)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dims {
            1 => write!(f, "[0;{}[", self.size[0]),
            2 => write!(f, "[0;{}[ x [0;{}[", self.size[0], self.size[1]),
            _ => write!(
                f,
                "[0;{}[ x [0;{}[ x [0;{}[",
                self.size[0], self.size[1], self.size[2]
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_extent_rejected() {
        assert_eq!(
            Space::new_1d(0).unwrap_err(),
            RepartError::ZeroExtent { dim: 0 }
        );
        assert_eq!(
            Space::new_3d(4, 0, 2).unwrap_err(),
            RepartError::ZeroExtent { dim: 1 }
        );
    }

    #[test]
    fn full_range_covers_everything() {
        let s = Space::new_2d(3, 5).unwrap();
        let r = s.full_range();
        assert_eq!(r.size(), 15);
        assert_eq!(s.total(), 15);
    }

    #[test]
    fn serde_roundtrip() {
        let s = Space::new_3d(2, 3, 4).unwrap();
        let j = serde_json::to_string(&s).expect("serialize");
        let t: Space = serde_json::from_str(&j).expect("deserialize");
        assert_eq!(s, t);
    }
}
