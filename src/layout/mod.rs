//! Memory layouts: mapping indexes to buffer offsets, plus pack/unpack/copy.
//!
//! Layouts are a closed set of variants dispatched by `match`; both shipped
//! variants are 1-d with a single mapping. A [`Mapping`] binds a layout to a
//! concrete, exclusively owned buffer inside a container.

pub mod dense;
pub mod sparse;

pub use dense::DenseLayout;
pub use sparse::{Interval, SparseLayout};

use bytemuck::Pod;

use crate::error::RepartError;
use crate::space::{Index, Range};

/// How a container materializes its share of the space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayoutPolicy {
    /// Contiguous buffer over the bounding range of the task's slices.
    Dense1d,
    /// Gap-eliminating interval layout; `external_slots` appended slots
    /// hold values received from other workers (an *external* view when
    /// non-zero).
    Sparse1d { external_slots: usize },
}

/// A concrete layout instance.
#[derive(Clone, Debug)]
pub enum VectorLayout {
    Dense(DenseLayout),
    Sparse(SparseLayout),
}

impl VectorLayout {
    /// Dimensionality of the layout (both variants are 1-d).
    #[inline]
    pub fn dims(&self) -> usize {
        1
    }

    /// Number of mappings (both variants expose a single one).
    #[inline]
    pub fn map_count(&self) -> usize {
        1
    }

    /// Validate a mapping number.
    pub fn map_no(&self, n: usize) -> Result<usize, RepartError> {
        if n == 0 {
            Ok(0)
        } else {
            Err(RepartError::NoSuchMapping {
                requested: n,
                map_count: self.map_count(),
            })
        }
    }

    /// Total element slots reachable through the layout.
    pub fn count(&self) -> usize {
        match self {
            VectorLayout::Dense(l) => l.count(),
            VectorLayout::Sparse(l) => l.count(),
        }
    }

    /// Mapping number whose slots contain `idx`, if any.
    pub fn section(&self, idx: &Index) -> Option<usize> {
        match self {
            VectorLayout::Dense(l) => l.section(idx),
            VectorLayout::Sparse(l) => l.section(idx),
        }
    }

    /// Layout offset of `idx` in mapping `n`. Dense offsets are global
    /// indexes (the mapping's `start` absorbs the base); sparse offsets are
    /// buffer slots and may claim an external slot.
    pub fn offset(&mut self, n: usize, idx: &Index) -> Result<i64, RepartError> {
        self.map_no(n)?;
        match self {
            VectorLayout::Dense(l) => Ok(l.offset(idx)),
            VectorLayout::Sparse(l) => Ok(l.offset(idx)? as i64),
        }
    }

    /// Whether this layout can adopt `old`'s buffer. Variants never reuse
    /// across each other.
    pub fn reuse(&mut self, old: &VectorLayout) -> bool {
        match (self, old) {
            (VectorLayout::Dense(new), VectorLayout::Dense(old)) => new.reuse(old),
            (VectorLayout::Sparse(new), VectorLayout::Sparse(old)) => new.reuse(old),
            _ => false,
        }
    }

    /// Human-readable description.
    pub fn describe(&self) -> String {
        match self {
            VectorLayout::Dense(l) => l.describe(),
            VectorLayout::Sparse(l) => l.describe(),
        }
    }

    fn same_variant(&self, other: &VectorLayout) -> bool {
        matches!(
            (self, other),
            (VectorLayout::Dense(_), VectorLayout::Dense(_))
                | (VectorLayout::Sparse(_), VectorLayout::Sparse(_))
        )
    }
}

/// A layout bound to an exclusively owned buffer.
///
/// `start` is the layout offset backed by `buf[0]`; the application-visible
/// window (`view`) begins at the slot of `required_range.from` and spans
/// `count` elements. An adopted buffer may be longer than the window.
#[derive(Clone, Debug)]
pub struct Mapping<V> {
    layout: VectorLayout,
    required_range: Range,
    start: i64,
    window: usize,
    buf: Vec<V>,
}

impl<V: Pod> Mapping<V> {
    pub(crate) fn new(
        layout: VectorLayout,
        required_range: Range,
        start: i64,
        buf: Vec<V>,
    ) -> Result<Self, RepartError> {
        let window = match &layout {
            // an empty mapping has no window to anchor
            VectorLayout::Dense(_) if layout.count() == 0 => 0,
            VectorLayout::Dense(_) => {
                let w = required_range.from().get(0) - start;
                if w < 0 {
                    return Err(RepartError::OutOfRange { index: w });
                }
                w as usize
            }
            VectorLayout::Sparse(_) => 0,
        };
        if window + layout.count() > buf.len() {
            return Err(RepartError::OutOfRange {
                index: (window + layout.count()) as i64,
            });
        }
        Ok(Mapping {
            layout,
            required_range,
            start,
            window,
            buf,
        })
    }

    #[inline]
    pub fn layout(&self) -> &VectorLayout {
        &self.layout
    }

    #[inline]
    pub fn required_range(&self) -> Range {
        self.required_range
    }

    #[inline]
    pub(crate) fn start(&self) -> i64 {
        self.start
    }

    /// Elements in the application-visible window.
    #[inline]
    pub fn count(&self) -> usize {
        self.layout.count()
    }

    #[inline]
    pub(crate) fn take_buf(self) -> Vec<V> {
        self.buf
    }

    /// Buffer slot of `idx`, bounds-checked against the owned buffer.
    pub(crate) fn slot(&mut self, idx: &Index) -> Result<usize, RepartError> {
        let off = self.layout.offset(0, idx)?;
        let s = off - self.start;
        if s < 0 || s as usize >= self.buf.len() {
            return Err(RepartError::OutOfRange { index: idx.get(0) });
        }
        Ok(s as usize)
    }

    /// View-relative slot of `idx`, as used by [`view`](Self::view) and the
    /// container's global/local translation.
    pub(crate) fn locate(&mut self, idx: &Index) -> Result<usize, RepartError> {
        let s = self.slot(idx)?;
        if s < self.window {
            return Err(RepartError::OutOfRange { index: idx.get(0) });
        }
        Ok(s - self.window)
    }

    /// The application-visible window.
    pub fn view(&self) -> &[V] {
        &self.buf[self.window..self.window + self.layout.count()]
    }

    /// Mutable application-visible window.
    pub fn view_mut(&mut self) -> &mut [V] {
        let n = self.layout.count();
        &mut self.buf[self.window..self.window + n]
    }

    pub(crate) fn fill(&mut self, v: V) {
        self.buf.fill(v);
    }

    /// Pack elements of `range` in lexicographic order into `out`,
    /// advancing `cursor` in place. Returns the number of elements packed;
    /// zero when the cursor already reached the range's end. Stops early
    /// when `out` is full, leaving `cursor` at the next index to pack.
    pub fn pack(
        &mut self,
        range: &Range,
        cursor: &mut Index,
        out: &mut [V],
    ) -> Result<usize, RepartError> {
        if cursor.equals(range.dims(), &range.to()) {
            return Ok(0);
        }
        let mut n = 0;
        while n < out.len() {
            let s = self.slot(cursor)?;
            out[n] = self.buf[s];
            n += 1;
            if !range.next_index(cursor) {
                *cursor = range.to();
                break;
            }
        }
        Ok(n)
    }

    /// Mirror of [`pack`](Self::pack): consume `input` into the mapping.
    pub fn unpack(
        &mut self,
        range: &Range,
        cursor: &mut Index,
        input: &[V],
    ) -> Result<usize, RepartError> {
        if cursor.equals(range.dims(), &range.to()) {
            return Ok(0);
        }
        let mut n = 0;
        while n < input.len() {
            let s = self.slot(cursor)?;
            self.buf[s] = input[n];
            n += 1;
            if !range.next_index(cursor) {
                *cursor = range.to();
                break;
            }
        }
        Ok(n)
    }
}

/// Copy every element of `range` from one mapping to another, element-wise
/// through both layouts' offsets.
///
/// # Errors
/// `LayoutMismatch` across different layout variants.
pub fn copy_range<V: Pod>(
    range: &Range,
    from: &mut Mapping<V>,
    to: &mut Mapping<V>,
) -> Result<(), RepartError> {
    if !from.layout.same_variant(&to.layout) {
        return Err(RepartError::LayoutMismatch);
    }
    if range.is_empty() {
        return Ok(());
    }
    let mut idx = range.from();
    loop {
        let fs = from.slot(&idx)?;
        let ts = to.slot(&idx)?;
        to.buf[ts] = from.buf[fs];
        if !range.next_index(&mut idx) {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Group;
    use crate::partition::border::BorderArray;
    use crate::space::Space;

    fn dense_mapping(from: i64, to: i64) -> Mapping<f64> {
        let s = Space::new_1d(1000).unwrap();
        let r = Range::new_1d(s, from, to).unwrap();
        let layout = VectorLayout::Dense(DenseLayout::new(r).unwrap());
        let n = layout.count();
        Mapping::new(layout, r, from, vec![0.0; n]).unwrap()
    }

    #[test]
    fn pack_unpack_round_trip_dense() {
        let s = Space::new_1d(1000).unwrap();
        let mut src = dense_mapping(10, 20);
        for (i, v) in src.view_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        let r = Range::new_1d(s, 12, 18).unwrap();

        let mut wire = vec![0.0f64; 6];
        let mut cur = r.from();
        assert_eq!(src.pack(&r, &mut cur, &mut wire).unwrap(), 6);
        assert_eq!(cur, r.to());

        let mut dst = dense_mapping(10, 20);
        let mut cur = r.from();
        assert_eq!(dst.unpack(&r, &mut cur, &wire).unwrap(), 6);
        assert_eq!(&dst.view()[2..8], &src.view()[2..8]);
        assert_eq!(dst.view()[0], 0.0);
    }

    #[test]
    fn pack_resumes_on_small_buffers() {
        let s = Space::new_1d(1000).unwrap();
        let mut src = dense_mapping(0, 8);
        for (i, v) in src.view_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        let r = Range::new_1d(s, 0, 8).unwrap();
        let mut cur = r.from();
        let mut chunk = vec![0.0f64; 3];
        let mut got = Vec::new();
        loop {
            let n = src.pack(&r, &mut cur, &mut chunk).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(got, (0..8).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn copy_range_moves_elements_across_mappings() {
        let s = Space::new_1d(1000).unwrap();
        let mut a = dense_mapping(0, 10);
        for (i, v) in a.view_mut().iter_mut().enumerate() {
            *v = (i * i) as f64;
        }
        let mut b = dense_mapping(5, 15);
        let r = Range::new_1d(s, 5, 10).unwrap();
        copy_range(&r, &mut a, &mut b).unwrap();
        assert_eq!(b.view()[0..5], a.view()[5..10]);
    }

    #[test]
    fn copy_across_variants_is_rejected() {
        let s = Space::new_1d(100).unwrap();
        let mut ba = BorderArray::new(Group::new(0, 1), s);
        ba.append(0, Range::new_1d(s, 0, 10).unwrap()).unwrap();
        ba.freeze().unwrap();
        let sl = SparseLayout::from_borders(&ba, 0, 0).unwrap();
        let r = Range::new_1d(s, 0, 10).unwrap();
        let mut sparse =
            Mapping::<f64>::new(VectorLayout::Sparse(sl), r, 0, vec![0.0; 10]).unwrap();
        let mut dense = dense_mapping(0, 10);
        assert_eq!(
            copy_range(&r, &mut dense, &mut sparse).unwrap_err(),
            RepartError::LayoutMismatch
        );
    }

    #[test]
    fn map_no_bounds() {
        let l = VectorLayout::Dense(DenseLayout::new(
            Range::new_1d(Space::new_1d(4).unwrap(), 0, 4).unwrap(),
        )
        .unwrap());
        assert_eq!(l.map_no(0).unwrap(), 0);
        assert!(matches!(
            l.map_no(1).unwrap_err(),
            RepartError::NoSuchMapping { .. }
        ));
    }
}
