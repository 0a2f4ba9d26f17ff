//! `Range`: a half-open axis-aligned sub-box of a space.
//!
//! Ranges are what partitioners hand out and what the transfer planner
//! reasons about. Besides containment and size this module provides the box
//! algebra (intersection, subtraction) and the lexicographic successor used
//! by the layouts' pack/unpack walks.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RepartError;
use crate::space::index::Index;
use crate::space::space::Space;

/// Half-open box `∏ [from[d], to[d])` inside a [`Space`].
///
/// Invariant: `0 ≤ from[d] ≤ to[d] ≤ space.size(d)` for every used
/// dimension; unused dimensions are pinned to zero. A range may be empty
/// (`from[d] == to[d]` somewhere); empty ranges have `size() == 0`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    space: Space,
    from: Index,
    to: Index,
}

impl Range {
    /// Construct a validated range.
    ///
    /// # Errors
    /// `InvalidArgument` when the bounds are out of order or outside the
    /// space.
    pub fn new(space: Space, from: Index, to: Index) -> Result<Self, RepartError> {
        for d in 0..space.dims() {
            if from.get(d) < 0 || from.get(d) > to.get(d) || to.get(d) > space.size(d) as i64 {
                return Err(RepartError::InvalidArgument(
                    "range bounds out of order or outside the space",
                ));
            }
        }
        Ok(Self::new_unchecked(space, from, to))
    }

    /// 1-d convenience constructor.
    pub fn new_1d(space: Space, from: i64, to: i64) -> Result<Self, RepartError> {
        Self::new(space, Index::new_1d(from), Index::new_1d(to))
    }

    pub(crate) fn new_unchecked(space: Space, mut from: Index, mut to: Index) -> Self {
        for d in space.dims()..3 {
            *from.get_mut(d) = 0;
            *to.get_mut(d) = 0;
        }
        Range { space, from, to }
    }

    #[inline]
    pub fn space(&self) -> Space {
        self.space
    }

    #[inline]
    pub fn from(&self) -> Index {
        self.from
    }

    #[inline]
    pub fn to(&self) -> Index {
        self.to
    }

    #[inline]
    pub fn dims(&self) -> usize {
        self.space.dims()
    }

    /// Number of indexes in the range.
    pub fn size(&self) -> u64 {
        let mut n = 1u64;
        for d in 0..self.dims() {
            let w = self.to.get(d) - self.from.get(d);
            if w <= 0 {
                return 0;
            }
            n *= w as u64;
        }
        n
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether `self` contains the whole of `other` (`self ⊇ other`).
    /// Empty `other` is contained everywhere within the same space.
    pub fn contains(&self, other: &Range) -> bool {
        if self.space != other.space {
            return false;
        }
        if other.is_empty() {
            return true;
        }
        (0..self.dims()).all(|d| {
            self.from.get(d) <= other.from.get(d) && other.to.get(d) <= self.to.get(d)
        })
    }

    /// Whether the index lies inside the range.
    pub fn contains_index(&self, idx: &Index) -> bool {
        (0..self.dims()).all(|d| self.from.get(d) <= idx.get(d) && idx.get(d) < self.to.get(d))
    }

    /// Box intersection; `None` when disjoint (or either side empty).
    pub fn intersect(&self, other: &Range) -> Option<Range> {
        if self.space != other.space {
            return None;
        }
        let mut from = Index::default();
        let mut to = Index::default();
        for d in 0..self.dims() {
            let f = self.from.get(d).max(other.from.get(d));
            let t = self.to.get(d).min(other.to.get(d));
            if f >= t {
                return None;
            }
            *from.get_mut(d) = f;
            *to.get_mut(d) = t;
        }
        Some(Range::new_unchecked(self.space, from, to))
    }

    /// Box subtraction `self \ other`: at most `2·dims` disjoint pieces, in
    /// a deterministic dimension-major order. `self` is returned whole when
    /// the boxes do not meet.
    pub fn subtract(&self, other: &Range) -> Vec<Range> {
        let isect = match self.intersect(other) {
            Some(i) => i,
            None => {
                return if self.is_empty() { vec![] } else { vec![*self] };
            }
        };
        let mut out = Vec::new();
        let mut rest = *self;
        for d in 0..self.dims() {
            if rest.from.get(d) < isect.from.get(d) {
                let mut piece = rest;
                *piece.to.get_mut(d) = isect.from.get(d);
                out.push(piece);
                *rest.from.get_mut(d) = isect.from.get(d);
            }
            if isect.to.get(d) < rest.to.get(d) {
                let mut piece = rest;
                *piece.from.get_mut(d) = isect.to.get(d);
                out.push(piece);
                *rest.to.get_mut(d) = isect.to.get(d);
            }
        }
        out
    }

    /// Advance `idx` to its lexicographic successor within the range, the
    /// first axis running fastest. Returns `false` (leaving `idx` at the
    /// last position's overflow state) when the walk is exhausted; callers
    /// that need the sentinel set `idx = range.to()` themselves.
    pub fn next_index(&self, idx: &mut Index) -> bool {
        for d in 0..self.dims() {
            *idx.get_mut(d) += 1;
            if idx.get(d) < self.to.get(d) {
                return true;
            }
            *idx.get_mut(d) = self.from.get(d);
        }
        false
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dims() {
            1 => write!(f, "[{};{}[", self.from.get(0), self.to.get(0)),
            2 => write!(
                f,
                "[{};{}[ x [{};{}[",
                self.from.get(0),
                self.to.get(0),
                self.from.get(1),
                self.to.get(1)
            ),
            _ => write!(
                f,
                "[{};{}[ x [{};{}[ x [{};{}[",
                self.from.get(0),
                self.to.get(0),
                self.from.get(1),
                self.to.get(1),
                self.from.get(2),
                self.to.get(2)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sp(n: u64) -> Space {
        Space::new_1d(n).unwrap()
    }

    #[test]
    fn size_and_contains() {
        let s = sp(10);
        let a = Range::new_1d(s, 2, 8).unwrap();
        let b = Range::new_1d(s, 3, 5).unwrap();
        assert_eq!(a.size(), 6);
        assert!(a.contains(&b));
        assert!(!b.contains(&a));
        assert!(a.contains_index(&Index::new_1d(2)));
        assert!(!a.contains_index(&Index::new_1d(8)));
    }

    #[test]
    fn bad_bounds_rejected() {
        let s = sp(10);
        assert!(Range::new_1d(s, 5, 3).is_err());
        assert!(Range::new_1d(s, 0, 11).is_err());
        assert!(Range::new_1d(s, -1, 3).is_err());
    }

    #[test]
    fn intersect_1d() {
        let s = sp(10);
        let a = Range::new_1d(s, 0, 6).unwrap();
        let b = Range::new_1d(s, 4, 9).unwrap();
        let i = a.intersect(&b).unwrap();
        assert_eq!((i.from().get(0), i.to().get(0)), (4, 6));
        let c = Range::new_1d(s, 6, 9).unwrap();
        assert!(a.intersect(&c).is_none());
    }

    #[test]
    fn subtract_1d_middle() {
        let s = sp(10);
        let a = Range::new_1d(s, 0, 10).unwrap();
        let b = Range::new_1d(s, 3, 7).unwrap();
        let pieces = a.subtract(&b);
        assert_eq!(pieces.len(), 2);
        assert_eq!(
            (pieces[0].from().get(0), pieces[0].to().get(0)),
            (0, 3)
        );
        assert_eq!(
            (pieces[1].from().get(0), pieces[1].to().get(0)),
            (7, 10)
        );
    }

    #[test]
    fn subtract_disjoint_returns_self() {
        let s = sp(10);
        let a = Range::new_1d(s, 0, 3).unwrap();
        let b = Range::new_1d(s, 5, 9).unwrap();
        assert_eq!(a.subtract(&b), vec![a]);
    }

    #[test]
    fn subtract_2d_cross() {
        let s = Space::new_2d(4, 4).unwrap();
        let a = s.full_range();
        let b = Range::new(s, Index::new_2d(1, 1), Index::new_2d(3, 3)).unwrap();
        let pieces = a.subtract(&b);
        let covered: u64 = pieces.iter().map(|p| p.size()).sum();
        assert_eq!(covered + b.size(), a.size());
        for (i, p) in pieces.iter().enumerate() {
            for q in &pieces[i + 1..] {
                assert!(p.intersect(q).is_none(), "pieces overlap: {p} and {q}");
            }
            assert!(p.intersect(&b).is_none());
        }
    }

    #[test]
    fn next_index_walks_lexicographically() {
        let s = Space::new_2d(4, 4).unwrap();
        let r = Range::new(s, Index::new_2d(1, 1), Index::new_2d(3, 3)).unwrap();
        let mut idx = r.from();
        let mut seen = vec![idx];
        while r.next_index(&mut idx) {
            seen.push(idx);
        }
        assert_eq!(
            seen,
            vec![
                Index::new_2d(1, 1),
                Index::new_2d(2, 1),
                Index::new_2d(1, 2),
                Index::new_2d(2, 2),
            ]
        );
    }
}
