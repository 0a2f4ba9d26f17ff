//! RepartError: unified error type for the repart public APIs.
//!
//! All fallible operations in this crate report through this enum so callers
//! can match on one type. Allocation failure is the one fatal condition: it
//! aborts through the global allocator rather than surfacing here.

use thiserror::Error;

/// Unified error type for repart operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepartError {
    /// Generic malformed argument (bad dimension, empty selection, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// A space was constructed with a zero extent.
    #[error("space extent must be non-zero in dimension {dim}")]
    ZeroExtent { dim: usize },
    /// A dimension index outside `[0, dims)` was passed.
    #[error("dimension {dim} out of range for a {dims}-d space")]
    DimensionOutOfRange { dim: usize, dims: usize },
    /// Two objects that must share a space do not.
    #[error("operands belong to different spaces")]
    SpaceMismatch,
    /// A slice appended to a border array lies outside the space.
    #[error("slice for task {task} lies outside the partitioned space")]
    SliceOutsideSpace { task: usize },
    /// A zero-size range where a non-empty one is required.
    #[error("range is empty")]
    EmptyRange,
    /// An operation was issued in a state that does not permit it.
    #[error("precondition failed: {0}")]
    PreconditionFailed(&'static str),
    /// Group of a base partitioning (or target) differs from the expected one.
    #[error("group mismatch: expected {expected} tasks, found {found}")]
    GroupMismatch { expected: usize, found: usize },
    /// The base partitioning of a derived one was dropped.
    #[error("base partitioning no longer exists")]
    BaseGone,
    /// Border array read while the partitioning is invalid.
    #[error("partitioning has no valid border array (validate() it first)")]
    BordersInvalid,
    /// An index is outside all owned intervals and no external slot remains.
    #[error("index {index} outside all owned slots of the layout")]
    OutOfRange { index: i64 },
    /// Reentrant `switch_to` on a container already in a transition.
    #[error("container is already in a transition")]
    Busy,
    /// Pack/unpack/copy across incompatible layout variants.
    #[error("incompatible layouts for pack/unpack/copy")]
    LayoutMismatch,
    /// A layout was asked for a mapping number it does not provide.
    #[error("layout provides {map_count} mapping(s), requested no. {requested}")]
    NoSuchMapping { requested: usize, map_count: usize },
    /// Container operation that needs an active mapping, without one.
    #[error("container `{0}` is not bound to a partitioning")]
    Unmapped(String),
    /// Transport-layer failure; the pre-transition binding is kept.
    #[error("backend transport failure with rank {peer}: {reason}")]
    Backend { peer: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = RepartError::GroupMismatch {
            expected: 4,
            found: 2,
        };
        assert_eq!(e.to_string(), "group mismatch: expected 4 tasks, found 2");
        let e = RepartError::OutOfRange { index: 17 };
        assert!(e.to_string().contains("17"));
    }
}
