//! `Index`: a point in a 1-to-3-D index space.
//!
//! Unused dimensions are held at zero so an `Index` can be compared and
//! serialized without knowing its space's dimensionality.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in an index space. Components beyond the space's dimensionality
/// are zero by convention.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index(pub [i64; 3]);

impl Index {
    /// 1-d index.
    #[inline]
    pub const fn new_1d(i0: i64) -> Self {
        Index([i0, 0, 0])
    }

    /// 2-d index.
    #[inline]
    pub const fn new_2d(i0: i64, i1: i64) -> Self {
        Index([i0, i1, 0])
    }

    /// 3-d index.
    #[inline]
    pub const fn new_3d(i0: i64, i1: i64, i2: i64) -> Self {
        Index([i0, i1, i2])
    }

    /// Component in dimension `d`.
    #[inline]
    pub fn get(&self, d: usize) -> i64 {
        self.0[d]
    }

    /// Mutable component in dimension `d`.
    #[inline]
    pub fn get_mut(&mut self, d: usize) -> &mut i64 {
        &mut self.0[d]
    }

    /// Component-wise equality restricted to the first `dims` dimensions.
    #[inline]
    pub fn equals(&self, dims: usize, other: &Index) -> bool {
        self.0[..dims] == other.0[..dims]
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0[0], self.0[1], self.0[2])
    }
}

impl From<i64> for Index {
    #[inline]
    fn from(i0: i64) -> Self {
        Index::new_1d(i0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equals_ignores_trailing_dims() {
        let a = Index::new_2d(3, 4);
        let b = Index::new_3d(3, 4, 9);
        assert!(a.equals(2, &b));
        assert!(!a.equals(3, &b));
    }

    #[test]
    fn serde_roundtrip() {
        let a = Index::new_3d(1, -2, 3);
        let s = serde_json::to_string(&a).expect("serialize");
        let b: Index = serde_json::from_str(&s).expect("deserialize");
        assert_eq!(a, b);
    }
}
