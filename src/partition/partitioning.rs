//! Partitioning: a named binding of (group, space, partitioner, base?) to a
//! computed border array.
//!
//! A partitioning starts invalid; `validate()` runs the partitioner and
//! freezes the result, `invalidate()` drops it (called when the group or the
//! base changes). Containers share partitionings through `Arc`; the base
//! back-reference is `Weak` so chains of derived partitionings cannot leak.

use std::sync::{Arc, RwLock, Weak};

use crate::error::RepartError;
use crate::instance::Group;
use crate::partition::border::BorderArray;
use crate::partition::partitioner::Partitioner;
use crate::space::Space;

pub struct Partitioning {
    name: String,
    group: Group,
    space: Space,
    partitioner: Arc<Partitioner>,
    base: Option<Weak<Partitioning>>,
    borders: RwLock<Option<BorderArray>>,
}

impl std::fmt::Debug for Partitioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partitioning")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("space", &self.space)
            .field("partitioner", &self.partitioner.name())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl Partitioning {
    /// Create an (invalid) partitioning. `base` is kept as a weak
    /// back-reference and handed to the partitioner on `validate`.
    pub fn new(
        name: impl Into<String>,
        group: Group,
        space: Space,
        partitioner: Arc<Partitioner>,
        base: Option<&Arc<Partitioning>>,
    ) -> Arc<Self> {
        Arc::new(Partitioning {
            name: name.into(),
            group,
            space,
            partitioner,
            base: base.map(Arc::downgrade),
            borders: RwLock::new(None),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn group(&self) -> Group {
        self.group
    }

    #[inline]
    pub fn space(&self) -> Space {
        self.space
    }

    #[inline]
    pub fn partitioner(&self) -> &Arc<Partitioner> {
        &self.partitioner
    }

    pub fn is_valid(&self) -> bool {
        self.borders.read().expect("borders lock poisoned").is_some()
    }

    /// Run the partitioner and freeze the border array. Idempotent while
    /// the inputs are unchanged.
    ///
    /// # Errors
    /// `PreconditionFailed` when a required base is missing or itself
    /// invalid, `BaseGone` when the base was dropped, `GroupMismatch` when
    /// base and target disagree on the group, plus whatever the partitioner
    /// itself reports.
    pub fn validate(&self) -> Result<(), RepartError> {
        if self.is_valid() {
            return Ok(());
        }
        let mut ba = BorderArray::new(self.group, self.space);
        match &self.base {
            Some(weak) => {
                let base = weak.upgrade().ok_or(RepartError::BaseGone)?;
                if base.group != self.group {
                    return Err(RepartError::GroupMismatch {
                        expected: self.group.size(),
                        found: base.group.size(),
                    });
                }
                base.with_borders(|bb| self.partitioner.run(&mut ba, Some(bb)))??;
            }
            None => self.partitioner.run(&mut ba, None)?,
        }
        ba.freeze()?;
        *self.borders.write().expect("borders lock poisoned") = Some(ba);
        Ok(())
    }

    /// Drop the computed borders. The next `validate()` recomputes them.
    pub fn invalidate(&self) {
        *self.borders.write().expect("borders lock poisoned") = None;
    }

    /// Run `f` against the frozen border array.
    ///
    /// # Errors
    /// `BordersInvalid` while the partitioning is invalid. Callers must not
    /// retain data derived from the borrow across `invalidate()`.
    pub fn with_borders<R>(&self, f: impl FnOnce(&BorderArray) -> R) -> Result<R, RepartError> {
        let guard = self.borders.read().expect("borders lock poisoned");
        match guard.as_ref() {
            Some(ba) => Ok(f(ba)),
            None => Err(RepartError::BordersInvalid),
        }
    }

    /// Bounding `[from, to)` of the calling task's slices on dimension
    /// `dim`, coalesced across its slices; `(0, 0)` when the task owns
    /// nothing.
    pub fn my_slice_1d(&self, dim: usize) -> Result<(i64, i64), RepartError> {
        if dim >= self.space.dims() {
            return Err(RepartError::DimensionOutOfRange {
                dim,
                dims: self.space.dims(),
            });
        }
        self.with_borders(|ba| {
            let mine = ba.for_task(self.group.my_id())?;
            let mut bounds: Option<(i64, i64)> = None;
            for e in mine {
                let (f, t) = (e.range.from().get(dim), e.range.to().get(dim));
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(f), hi.max(t)),
                    None => (f, t),
                });
            }
            Ok(bounds.unwrap_or((0, 0)))
        })?
    }
}
