//! `Data`: a distributed container bound to a partitioning.
//!
//! Every worker of the group holds one `Data` per logical container and
//! drives it through collective `switch_to` calls: all workers must switch
//! the same container to the same partitioning with a compatible flow, and
//! every switch ends in a barrier. Between switches the worker reads and
//! writes its share through `map_default`.

use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

use crate::comm::Communicator;
use crate::data::transition::{execute_transfer, TransferPlan, TransferSource};
use crate::error::RepartError;
use crate::instance::Group;
use crate::layout::{DenseLayout, LayoutPolicy, Mapping, SparseLayout, VectorLayout};
use crate::partition::border::BorderArray;
use crate::partition::partitioning::Partitioning;
use crate::space::{Index, Range, Space};

/// The caller's data-flow intent for a transition.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DataFlow<V> {
    /// Current values must be visible in the new partitioning.
    CopyIn,
    /// The caller will overwrite; nothing is preserved.
    CopyOut,
    /// Both directions.
    CopyInOut,
    /// Initialize every slot with a constant; no transfer.
    Init(V),
}

impl<V> DataFlow<V> {
    fn wants_copy_in(&self) -> bool {
        matches!(self, DataFlow::CopyIn | DataFlow::CopyInOut)
    }
}

/// A distributed data container over a fixed element type.
#[derive(Debug)]
pub struct Data<V: Pod> {
    name: String,
    group: Group,
    space: Space,
    policy: LayoutPolicy,
    current: Option<Arc<Partitioning>>,
    mapping: Option<Mapping<V>>,
    in_transition: bool,
}

impl<V: Pod> Data<V> {
    /// Container with the default layout (dense 1-d).
    pub fn new(name: impl Into<String>, group: Group, space: Space) -> Self {
        Self::with_policy(name, group, space, LayoutPolicy::Dense1d)
    }

    /// Container with an explicit layout policy.
    pub fn with_policy(
        name: impl Into<String>,
        group: Group,
        space: Space,
        policy: LayoutPolicy,
    ) -> Self {
        Data {
            name: name.into(),
            group,
            space,
            policy,
            current: None,
            mapping: None,
            in_transition: false,
        }
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
    pub fn policy(&self) -> LayoutPolicy {
        self.policy
    }

    /// The partitioning the container is currently bound to.
    pub fn current_partitioning(&self) -> Option<&Arc<Partitioning>> {
        self.current.as_ref()
    }

    /// The active mapping, if bound.
    pub fn mapping(&self) -> Option<&Mapping<V>> {
        self.mapping.as_ref()
    }

    /// Switch the container to `target` with the given data-flow intent.
    ///
    /// Collective: every worker of the group must make the matching call;
    /// the transition ends in a barrier. On a backend error the
    /// pre-transition binding is restored and the error surfaces.
    ///
    /// # Errors
    /// `Busy` on reentry, `GroupMismatch`/`SpaceMismatch` for a foreign
    /// target, `PreconditionFailed` for `CopyIn` from the unbound state or
    /// an external sparse view without a bound local one.
    pub fn switch_to<C: Communicator>(
        &mut self,
        target: &Arc<Partitioning>,
        flow: DataFlow<V>,
        comm: &C,
    ) -> Result<(), RepartError> {
        self.switch_to_with(target, flow, self.policy, comm)
    }

    /// Like [`switch_to`](Self::switch_to), with a layout policy for this
    /// transition only. This is how a sparse container alternates between
    /// its local view and an external view with appended receive slots; the
    /// layout variant must stay the same across the container's life.
    pub fn switch_to_with<C: Communicator>(
        &mut self,
        target: &Arc<Partitioning>,
        flow: DataFlow<V>,
        policy: LayoutPolicy,
        comm: &C,
    ) -> Result<(), RepartError> {
        if self.in_transition {
            return Err(RepartError::Busy);
        }
        self.in_transition = true;
        let result = self.transition(target, flow, policy, comm);
        self.in_transition = false;
        result
    }

    fn transition<C: Communicator>(
        &mut self,
        target: &Arc<Partitioning>,
        flow: DataFlow<V>,
        policy: LayoutPolicy,
        comm: &C,
    ) -> Result<(), RepartError> {
        if target.group() != self.group {
            return Err(RepartError::GroupMismatch {
                expected: self.group.size(),
                found: target.group().size(),
            });
        }
        if target.space() != self.space {
            return Err(RepartError::SpaceMismatch);
        }
        target.validate()?;
        if flow.wants_copy_in() && self.current.is_none() {
            return Err(RepartError::PreconditionFailed(
                "CopyIn requires a previously bound partitioning",
            ));
        }

        let my_id = self.group.my_id();
        let (mut layout, required) =
            target.with_borders(|ba| self.build_layout(ba, my_id, policy))??;

        // Reuse check: adopt the old buffer when the candidate layout fits
        // it under identical addressing; local keeps then become identity.
        let mut start = match &layout {
            VectorLayout::Dense(_) => required.from().get(0),
            VectorLayout::Sparse(_) => 0,
        };
        let mut reused = false;
        if let Some(old) = &self.mapping {
            let mut trial = layout.clone();
            if trial.reuse(old.layout()) {
                let identical = match (&trial, old.layout()) {
                    (VectorLayout::Dense(_), VectorLayout::Dense(_)) => true,
                    (VectorLayout::Sparse(n), VectorLayout::Sparse(o)) => n.same_addressing(o),
                    _ => false,
                };
                if identical {
                    layout = trial;
                    reused = true;
                    if matches!(layout, VectorLayout::Dense(_)) {
                        start = old.start();
                    }
                }
            }
        }

        let old_mapping = self.mapping.take();
        let (buf, mut old_parts, mut old_distinct) = if reused {
            let om = old_mapping.expect("reuse implies a previous mapping");
            let parts = (om.layout().clone(), om.required_range(), om.start());
            (om.take_buf(), Some(parts), None)
        } else {
            (vec![V::zeroed(); layout.count()], None, old_mapping)
        };
        let mut new_mapping = match Mapping::new(layout, required, start, buf) {
            Ok(m) => m,
            Err(e) => {
                self.restore(&mut old_parts, &mut old_distinct, None);
                return Err(e);
            }
        };

        if let DataFlow::Init(v) = flow {
            new_mapping.fill(v);
        }

        if flow.wants_copy_in() {
            let cur = self
                .current
                .clone()
                .expect("checked: CopyIn has a current partitioning");
            let plan = if Arc::ptr_eq(&cur, target) {
                target.with_borders(|t| TransferPlan::compute(t, t, my_id))??
            } else {
                cur.with_borders(|s| {
                    target.with_borders(|t| TransferPlan::compute(s, t, my_id))
                })???
            };
            let source = match &mut old_distinct {
                Some(om) => TransferSource::Distinct(om),
                None => TransferSource::Adopted,
            };
            if let Err(e) = execute_transfer(&plan, source, &mut new_mapping, comm) {
                self.restore(&mut old_parts, &mut old_distinct, Some(new_mapping));
                return Err(e);
            }
        }

        self.mapping = Some(new_mapping);
        self.current = Some(target.clone());
        comm.barrier();
        Ok(())
    }

    /// Put the pre-transition mapping back after a failed transition
    /// (best-effort when the buffer was adopted by the candidate).
    fn restore(
        &mut self,
        old_parts: &mut Option<(VectorLayout, Range, i64)>,
        old_distinct: &mut Option<Mapping<V>>,
        adopted: Option<Mapping<V>>,
    ) {
        if let Some(om) = old_distinct.take() {
            self.mapping = Some(om);
        } else if let (Some((layout, range, start)), Some(candidate)) =
            (old_parts.take(), adopted)
        {
            // the window was valid before the transition started
            if let Ok(m) = Mapping::new(layout, range, start, candidate.take_buf()) {
                self.mapping = Some(m);
            }
        }
    }

    fn build_layout(
        &self,
        ba: &BorderArray,
        my_id: usize,
        policy: LayoutPolicy,
    ) -> Result<(VectorLayout, Range), RepartError> {
        let required = self.bounding_range(ba, my_id)?;
        match policy {
            LayoutPolicy::Dense1d => {
                Ok((VectorLayout::Dense(DenseLayout::new(required)?), required))
            }
            LayoutPolicy::Sparse1d { external_slots: 0 } => Ok((
                VectorLayout::Sparse(SparseLayout::from_borders(ba, my_id, 0)?),
                required,
            )),
            LayoutPolicy::Sparse1d { external_slots } => {
                // External views address local values through the interval
                // map of the view they were switched from.
                let old = self.mapping.as_ref().ok_or(RepartError::PreconditionFailed(
                    "an external sparse view requires a bound container",
                ))?;
                let VectorLayout::Sparse(old_sparse) = old.layout() else {
                    return Err(RepartError::PreconditionFailed(
                        "an external sparse view requires a sparse-bound container",
                    ));
                };
                let l = SparseLayout::external_view(old_sparse.map_handle(), external_slots);
                Ok((VectorLayout::Sparse(l), required))
            }
        }
    }

    /// 1-d bounding range of `my_id`'s border entries; empty at the origin
    /// when the task owns nothing.
    fn bounding_range(&self, ba: &BorderArray, my_id: usize) -> Result<Range, RepartError> {
        if self.space.dims() != 1 {
            return Err(RepartError::InvalidArgument(
                "shipped layouts support 1-d spaces only",
            ));
        }
        let mine = ba.for_task(my_id)?;
        let mut bounds: Option<(i64, i64)> = None;
        for e in mine {
            let (f, t) = (e.range.from().get(0), e.range.to().get(0));
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(f), hi.max(t)),
                None => (f, t),
            });
        }
        let (f, t) = bounds.unwrap_or((0, 0));
        Range::new_1d(self.space, f, t)
    }

    /// The canonical mapping's elements (the worker's share). Only valid
    /// after a successful `switch_to`.
    pub fn map_default(&mut self) -> Result<&mut [V], RepartError> {
        match self.mapping.as_mut() {
            Some(m) => Ok(m.view_mut()),
            None => Err(RepartError::Unmapped(self.name.clone())),
        }
    }

    /// Translate a global index to a local one; `None` when not local.
    ///
    /// Takes `&mut self` because a sparse external view hands out external
    /// slots in query order.
    pub fn global_to_local(&mut self, g: i64) -> Option<usize> {
        let m = self.mapping.as_mut()?;
        let idx = Index::new_1d(g);
        match m.layout() {
            VectorLayout::Dense(_) => {
                if !m.required_range().contains_index(&idx) {
                    return None;
                }
            }
            VectorLayout::Sparse(l) => {
                l.section(&idx)?;
            }
        }
        m.locate(&idx).ok()
    }

    /// Translate a local offset (as used by `map_default`) back to its
    /// global index.
    ///
    /// # Errors
    /// `OutOfRange` for offsets beyond the mapping or for external slots,
    /// which carry no global identity.
    pub fn local_to_global(&self, off: usize) -> Result<i64, RepartError> {
        let m = self
            .mapping
            .as_ref()
            .ok_or_else(|| RepartError::Unmapped(self.name.clone()))?;
        match m.layout() {
            VectorLayout::Dense(_) => {
                if off >= m.count() {
                    return Err(RepartError::OutOfRange { index: off as i64 });
                }
                Ok(m.required_range().from().get(0) + off as i64)
            }
            VectorLayout::Sparse(l) => l.global_of(off),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::instance::Instance;
    use crate::partition::partitioner::Partitioner;

    fn single() -> (Instance<NoComm>, Space) {
        (Instance::single(), Space::new_1d(8).unwrap())
    }

    fn block(inst: &Instance<NoComm>, s: Space) -> Arc<Partitioning> {
        Partitioning::new(
            "block",
            inst.world(),
            s,
            Arc::new(Partitioner::block_1d()),
            None,
        )
    }

    #[test]
    fn copy_in_from_unbound_fails() {
        let (inst, s) = single();
        let p = block(&inst, s);
        let mut d = Data::<f64>::new("v", inst.world(), s);
        assert!(matches!(
            d.switch_to(&p, DataFlow::CopyIn, inst.comm()).unwrap_err(),
            RepartError::PreconditionFailed(_)
        ));
        assert!(d.mapping().is_none());
    }

    #[test]
    fn bind_write_read_single_worker() {
        let (inst, s) = single();
        let p = block(&inst, s);
        let mut d = Data::<f64>::new("v", inst.world(), s);
        d.switch_to(&p, DataFlow::CopyOut, inst.comm()).unwrap();
        {
            let v = d.map_default().unwrap();
            assert_eq!(v.len(), 8);
            for (i, x) in v.iter_mut().enumerate() {
                *x = i as f64;
            }
        }
        assert_eq!(d.global_to_local(3), Some(3));
        assert_eq!(d.local_to_global(3).unwrap(), 3);

        // identity CopyIn: buffer must be reused and unchanged
        d.switch_to(&p, DataFlow::CopyIn, inst.comm()).unwrap();
        let v = d.map_default().unwrap();
        assert_eq!(v[5], 5.0);
    }

    #[test]
    fn init_flow_fills_the_mapping() {
        let (inst, s) = single();
        let p = block(&inst, s);
        let mut d = Data::<f64>::new("v", inst.world(), s);
        d.switch_to(&p, DataFlow::Init(2.5), inst.comm()).unwrap();
        assert!(d.map_default().unwrap().iter().all(|&x| x == 2.5));
    }

    #[test]
    fn group_mismatch_is_rejected() {
        let (inst, s) = single();
        let foreign = Partitioning::new(
            "foreign",
            Group::new(0, 2),
            s,
            Arc::new(Partitioner::block_1d()),
            None,
        );
        let mut d = Data::<f64>::new("v", inst.world(), s);
        assert!(matches!(
            d.switch_to(&foreign, DataFlow::CopyOut, inst.comm())
                .unwrap_err(),
            RepartError::GroupMismatch { .. }
        ));
    }

    #[test]
    fn external_sparse_view_requires_bound_container() {
        let (inst, s) = single();
        let p = block(&inst, s);
        let mut d = Data::<f64>::with_policy(
            "v",
            inst.world(),
            s,
            LayoutPolicy::Sparse1d { external_slots: 2 },
        );
        assert!(matches!(
            d.switch_to(&p, DataFlow::CopyOut, inst.comm()).unwrap_err(),
            RepartError::PreconditionFailed(_)
        ));
    }

    #[test]
    fn map_default_before_binding_fails() {
        let (inst, s) = single();
        let _ = inst;
        let mut d = Data::<f64>::new("v", Group::new(0, 1), s);
        assert!(matches!(
            d.map_default().unwrap_err(),
            RepartError::Unmapped(_)
        ));
    }
}
