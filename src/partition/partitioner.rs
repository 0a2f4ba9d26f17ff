//! Partitioners: deterministic functions assigning ranges to tasks.
//!
//! A partitioner is a named, pure run function over a border array, plus
//! whatever state its constructor captured. Built-ins cover the common
//! cases (`all`, `master`, weighted 1-d `block`, `copy` across dimensions);
//! applications register their own with [`Partitioner::custom`].

use std::fmt;
use std::sync::Arc;

use crate::error::RepartError;
use crate::partition::border::BorderArray;
use crate::space::{Index, Range};

type RunFn = dyn Fn(&mut BorderArray, Option<&BorderArray>) -> Result<(), RepartError> + Send + Sync;

/// Per-index weight for the block partitioner.
pub type IndexWeightFn = dyn Fn(&Index) -> f64 + Send + Sync;
/// Per-task weight for the block partitioner.
pub type TaskWeightFn = dyn Fn(usize) -> f64 + Send + Sync;

/// A named partitioner. Running it appends `(task, range)` entries to a
/// border array; for a given `(group, space, base)` the result is
/// deterministic.
pub struct Partitioner {
    name: String,
    needs_base: bool,
    run: Box<RunFn>,
}

impl fmt::Debug for Partitioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Partitioner")
            .field("name", &self.name)
            .field("needs_base", &self.needs_base)
            .finish()
    }
}

impl Partitioner {
    /// User-defined partitioner without a base requirement.
    pub fn custom<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&mut BorderArray, Option<&BorderArray>) -> Result<(), RepartError>
            + Send
            + Sync
            + 'static,
    {
        Partitioner {
            name: name.into(),
            needs_base: false,
            run: Box::new(run),
        }
    }

    /// User-defined partitioner that derives its result from a base
    /// partitioning's border array.
    pub fn custom_with_base<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&mut BorderArray, Option<&BorderArray>) -> Result<(), RepartError>
            + Send
            + Sync
            + 'static,
    {
        Partitioner {
            needs_base: true,
            ..Partitioner::custom(name, run)
        }
    }

    /// `all`: every task owns the full space.
    pub fn all() -> Self {
        Partitioner::custom("all", |ba, _base| {
            let full = ba.space().full_range();
            for task in 0..ba.group().size() {
                ba.append(task, full)?;
            }
            Ok(())
        })
    }

    /// `master`: task 0 owns the full space, everyone else nothing.
    pub fn master() -> Self {
        Partitioner::custom("master", |ba, _base| {
            let full = ba.space().full_range();
            ba.append(0, full)
        })
    }

    /// `copy`: mirror the base partitioning's borders, mapping extent
    /// `from_dim` of every base slice onto dimension `to_dim` of the target
    /// space (the other dimensions span the whole space). Task ids are
    /// preserved.
    pub fn copy_of_dim(from_dim: usize, to_dim: usize) -> Self {
        Partitioner::custom_with_base("copy", move |ba, base| {
            let base = base.ok_or(RepartError::PreconditionFailed(
                "copy partitioner requires a base partitioning",
            ))?;
            if from_dim >= base.space().dims() {
                return Err(RepartError::DimensionOutOfRange {
                    dim: from_dim,
                    dims: base.space().dims(),
                });
            }
            let space = ba.space();
            if to_dim >= space.dims() {
                return Err(RepartError::DimensionOutOfRange {
                    dim: to_dim,
                    dims: space.dims(),
                });
            }
            let full = space.full_range();
            for e in base.iter() {
                let mut from = full.from();
                let mut to = full.to();
                *from.get_mut(to_dim) = e.range.from().get(from_dim);
                *to.get_mut(to_dim) = e.range.to().get(from_dim);
                ba.append(e.task, Range::new(space, from, to)?)?;
            }
            Ok(())
        })
    }

    /// Plain 1-d block partitioner: unit weights, one cycle, dimension 0.
    pub fn block_1d() -> Self {
        BlockBuilder::new().build()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn needs_base(&self) -> bool {
        self.needs_base
    }

    pub(crate) fn run(
        &self,
        ba: &mut BorderArray,
        base: Option<&BorderArray>,
    ) -> Result<(), RepartError> {
        if self.needs_base && base.is_none() {
            return Err(RepartError::PreconditionFailed(
                "partitioner requires a base partitioning",
            ));
        }
        (self.run)(ba, base)
    }
}

/// Builder for the weighted 1-d block partitioner.
///
/// Splits one dimension into contiguous segments whose weighted sums are
/// balanced over the group, optionally over several round-robin cycles.
#[derive(Clone)]
pub struct BlockBuilder {
    pdim: usize,
    cycles: u32,
    idx_weight: Option<Arc<IndexWeightFn>>,
    task_weight: Option<Arc<TaskWeightFn>>,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockBuilder {
    pub fn new() -> Self {
        BlockBuilder {
            pdim: 0,
            cycles: 1,
            idx_weight: None,
            task_weight: None,
        }
    }

    /// Dimension to split (default 0).
    pub fn pdim(mut self, d: usize) -> Self {
        self.pdim = d;
        self
    }

    /// Round-robin passes over the group; values outside `1..=10` fall back
    /// to 1.
    pub fn cycles(mut self, c: u32) -> Self {
        self.cycles = if (1..=10).contains(&c) { c } else { 1 };
        self
    }

    /// Per-index weight; tasks receive segments of similar weight sums.
    pub fn index_weights<F>(mut self, f: F) -> Self
    where
        F: Fn(&Index) -> f64 + Send + Sync + 'static,
    {
        self.idx_weight = Some(Arc::new(f));
        self
    }

    /// Per-task scaling factor, for static load balancing.
    pub fn task_weights<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> f64 + Send + Sync + 'static,
    {
        self.task_weight = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Partitioner {
        let BlockBuilder {
            pdim,
            cycles,
            idx_weight,
            task_weight,
        } = self;
        Partitioner::custom("block", move |ba, _base| {
            run_block(ba, pdim, cycles, idx_weight.as_deref(), task_weight.as_deref())
        })
    }
}

fn run_block(
    ba: &mut BorderArray,
    pdim: usize,
    cycles: u32,
    idx_weight: Option<&IndexWeightFn>,
    task_weight: Option<&TaskWeightFn>,
) -> Result<(), RepartError> {
    let space = ba.space();
    if pdim >= space.dims() {
        return Err(RepartError::DimensionOutOfRange {
            dim: pdim,
            dims: space.dims(),
        });
    }
    let count = ba.group().size();
    let size = space.size(pdim) as i64;
    let full = space.full_range();

    let weight_at = |i: i64| -> f64 {
        match idx_weight {
            Some(f) => {
                let mut idx = Index::default();
                *idx.get_mut(pdim) = i;
                f(&idx)
            }
            None => 1.0,
        }
    };

    let total_w: f64 = match idx_weight {
        Some(_) => (0..size).map(weight_at).sum(),
        None => size as f64,
    };
    let total_tw: f64 = match task_weight {
        Some(f) => (0..count).map(|t| f(t)).sum(),
        None => count as f64,
    };
    let factor = |task: usize| -> f64 {
        match task_weight {
            Some(f) => f(task) * count as f64 / total_tw,
            None => 1.0,
        }
    };

    let per_part = total_w / count as f64 / cycles as f64;
    let mut w = -0.5;
    let mut task = 0usize;
    let mut cycle = 0u32;
    let mut task_factor = factor(task);
    let mut slice_from = 0i64;

    let emit = |ba: &mut BorderArray, task: usize, from: i64, to: i64| -> Result<(), RepartError> {
        if from < to {
            let mut f = full.from();
            let mut t = full.to();
            *f.get_mut(pdim) = from;
            *t.get_mut(pdim) = to;
            ba.append(task, Range::new(space, f, t)?)?;
        }
        Ok(())
    };

    'indexes: for i in 0..size {
        w += weight_at(i);
        while w >= per_part * task_factor {
            w -= per_part * task_factor;
            if task + 1 == count && cycle + 1 == cycles {
                break;
            }
            emit(ba, task, slice_from, i)?;
            task += 1;
            if task == count {
                task = 0;
                cycle += 1;
            }
            task_factor = factor(task);
            slice_from = i;
        }
        if task + 1 == count && cycle + 1 == cycles {
            break 'indexes;
        }
    }
    emit(ba, task, slice_from, size)
}
