//! Index spaces and range algebra.
//!
//! A [`Space`](space::Space) is an immutable 1-to-3-D box of indexes shared
//! by partitionings and containers; a [`Range`](range::Range) is a half-open
//! axis-aligned sub-box of one. The transfer planner is built entirely on
//! the range algebra defined here.

pub mod index;
pub mod range;
pub mod space;

pub use index::Index;
pub use range::Range;
pub use space::Space;
