//! Transfer planning and execution for container transitions.
//!
//! Diffing the source border array against the target one yields, for the
//! local worker, the local keeps, the receives and the sends that realize
//! the transition. Both sides of every ordered pair enumerate pieces with
//! the same deterministic state machine, so the k-th send from `u` to `w`
//! always matches the k-th receive `w` posted from `u`; together with the
//! backend's per-pair FIFO this anchors the sparse layout's external-slot
//! order.

use bytemuck::{Pod, Zeroable};

use crate::comm::{Communicator, Wait};
use crate::error::RepartError;
use crate::layout::{copy_range, Mapping};
use crate::partition::border::BorderArray;
use crate::space::Range;

/// Message tag for transition payloads. Transitions are separated by
/// barriers, so one tag suffices.
const TRANSITION_TAG: u16 = 0x52;

/// The movement a transition implies for the local worker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferPlan {
    /// Ranges present locally on both sides; copied old → new mapping.
    pub copies: Vec<Range>,
    /// Ranges to receive, with the source owner. Plan order is the unpack
    /// order.
    pub recvs: Vec<(usize, Range)>,
    /// Ranges to send, with the target owner.
    pub sends: Vec<(usize, Range)>,
}

/// Peel the pieces of `owner` out of `uncovered`, feeding every extracted
/// piece to `take` and returning what is still uncovered.
fn extract(uncovered: Vec<Range>, owner: &Range, mut take: impl FnMut(Range)) -> Vec<Range> {
    let mut rest = Vec::new();
    for u in uncovered {
        match u.intersect(owner) {
            Some(piece) => {
                take(piece);
                rest.extend(u.subtract(owner));
            }
            None => rest.push(u),
        }
    }
    rest
}

impl TransferPlan {
    /// Diff `src` against `tgt` for worker `my_id`.
    ///
    /// Receives iterate candidate source owners in ascending task id, so
    /// when a piece has several owners the lowest id wins and the others'
    /// sends are dropped; the send side mirrors the receiver's computation
    /// exactly.
    pub fn compute(
        src: &BorderArray,
        tgt: &BorderArray,
        my_id: usize,
    ) -> Result<Self, RepartError> {
        if src.space() != tgt.space() {
            return Err(RepartError::SpaceMismatch);
        }
        if src.group().size() != tgt.group().size() {
            return Err(RepartError::GroupMismatch {
                expected: src.group().size(),
                found: tgt.group().size(),
            });
        }
        let size = tgt.group().size();
        let mut plan = TransferPlan::default();

        // What I need: keep what I already have, receive the rest from its
        // owners. Pieces nobody owned stay uninitialized.
        for e in tgt.for_task(my_id)? {
            let mut uncovered = vec![e.range];
            for s in src.for_task(my_id)? {
                uncovered = extract(uncovered, &s.range, |p| plan.copies.push(p));
            }
            for u in 0..size {
                if u == my_id {
                    continue;
                }
                for s in src.for_task(u)? {
                    uncovered = extract(uncovered, &s.range, |p| plan.recvs.push((u, p)));
                }
            }
        }

        // What others need: replay each receiver's computation and keep the
        // pieces that fall to me.
        for t in 0..size {
            if t == my_id {
                continue;
            }
            for e in tgt.for_task(t)? {
                let mut uncovered = vec![e.range];
                for s in src.for_task(t)? {
                    uncovered = extract(uncovered, &s.range, |_| {});
                }
                for u in 0..size {
                    if u == t {
                        continue;
                    }
                    for s in src.for_task(u)? {
                        uncovered = extract(uncovered, &s.range, |p| {
                            if u == my_id {
                                plan.sends.push((t, p));
                            }
                        });
                    }
                }
            }
        }
        Ok(plan)
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.recvs.is_empty() && self.sends.is_empty()
    }
}

/// Where transition reads come from.
pub(crate) enum TransferSource<'a, V> {
    /// The old mapping still owns its buffer.
    Distinct(&'a mut Mapping<V>),
    /// The new mapping adopted the old buffer under identical addressing;
    /// local keeps are identity and are skipped.
    Adopted,
}

fn reading<'m, V>(
    src: &'m mut TransferSource<'_, V>,
    dest: &'m mut Mapping<V>,
) -> &'m mut Mapping<V> {
    match src {
        TransferSource::Distinct(m) => &mut **m,
        TransferSource::Adopted => dest,
    }
}

/// Execute a plan: local copies, post all receives, pack and send, unpack
/// receives in plan order, drain sends.
///
/// # Errors
/// `Backend` when a receive yields nothing or the wrong length; layout
/// errors surface unchanged. The caller owns rollback.
pub(crate) fn execute_transfer<V: Pod, C: Communicator>(
    plan: &TransferPlan,
    mut source: TransferSource<'_, V>,
    dest: &mut Mapping<V>,
    comm: &C,
) -> Result<(), RepartError> {
    let elem = std::mem::size_of::<V>();

    if let TransferSource::Distinct(src) = &mut source {
        for r in &plan.copies {
            copy_range(r, &mut **src, dest)?;
        }
    }

    let mut pending = Vec::with_capacity(plan.recvs.len());
    for &(peer, r) in &plan.recvs {
        let mut template = vec![0u8; r.size() as usize * elem];
        let h = comm.irecv(peer, TRANSITION_TAG, &mut template);
        pending.push((peer, r, h));
    }

    let mut send_handles = Vec::with_capacity(plan.sends.len());
    for &(peer, r) in &plan.sends {
        let n = r.size() as usize;
        let mut scratch = vec![V::zeroed(); n];
        {
            let m = reading(&mut source, dest);
            let mut cursor = r.from();
            let packed = m.pack(&r, &mut cursor, &mut scratch)?;
            debug_assert_eq!(packed, n, "pack must drain the send range");
        }
        send_handles.push(comm.isend(peer, TRANSITION_TAG, bytemuck::cast_slice(&scratch)));
    }

    for (peer, r, h) in pending {
        let raw = h.wait().ok_or_else(|| RepartError::Backend {
            peer,
            reason: "receive completed without data".into(),
        })?;
        let n = r.size() as usize;
        let mut vals = vec![V::zeroed(); n];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut vals);
        if raw.len() != bytes.len() {
            return Err(RepartError::Backend {
                peer,
                reason: format!("expected {} bytes, got {}", bytes.len(), raw.len()),
            });
        }
        bytes.copy_from_slice(&raw);
        let mut cursor = r.from();
        let got = dest.unpack(&r, &mut cursor, &vals)?;
        debug_assert_eq!(got, n, "unpack must drain the receive range");
    }

    for h in send_handles {
        let _ = h.wait();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Group;
    use crate::partition::partitioner::Partitioner;
    use crate::space::Space;

    fn borders(p: &Partitioner, n: u64, tasks: usize) -> BorderArray {
        let s = Space::new_1d(n).unwrap();
        let mut ba = BorderArray::new(Group::new(0, tasks), s);
        p.run(&mut ba, None).unwrap();
        ba.freeze().unwrap();
        ba
    }

    fn span(r: &Range) -> (i64, i64) {
        (r.from().get(0), r.to().get(0))
    }

    #[test]
    fn identity_transition_keeps_everything_local() {
        let ba = borders(&Partitioner::block_1d(), 8, 2);
        let plan = TransferPlan::compute(&ba, &ba, 0).unwrap();
        assert_eq!(plan.copies.len(), 1);
        assert_eq!(span(&plan.copies[0]), (0, 4));
        assert!(plan.recvs.is_empty());
        assert!(plan.sends.is_empty());
    }

    #[test]
    fn block_to_master_funnels_to_task0() {
        let src = borders(&Partitioner::block_1d(), 8, 4);
        let tgt = borders(&Partitioner::master(), 8, 4);

        let p0 = TransferPlan::compute(&src, &tgt, 0).unwrap();
        assert_eq!(p0.copies.len(), 1);
        assert_eq!(span(&p0.copies[0]), (0, 2));
        assert_eq!(
            p0.recvs
                .iter()
                .map(|(u, r)| (*u, span(r)))
                .collect::<Vec<_>>(),
            vec![(1, (2, 4)), (2, (4, 6)), (3, (6, 8))]
        );
        assert!(p0.sends.is_empty());

        let p2 = TransferPlan::compute(&src, &tgt, 2).unwrap();
        assert!(p2.copies.is_empty() && p2.recvs.is_empty());
        assert_eq!(
            p2.sends
                .iter()
                .map(|(t, r)| (*t, span(r)))
                .collect::<Vec<_>>(),
            vec![(0, (4, 6))]
        );
    }

    #[test]
    fn all_as_source_prefers_the_lowest_owner() {
        // everyone owns everything; the block target needs no transfer at
        // all because every piece is already local
        let src = borders(&Partitioner::all(), 8, 2);
        let tgt = borders(&Partitioner::block_1d(), 8, 2);
        for w in 0..2 {
            let p = TransferPlan::compute(&src, &tgt, w).unwrap();
            assert_eq!(p.copies.len(), 1);
            assert!(p.recvs.is_empty());
            assert!(p.sends.is_empty(), "owned pieces must not be sent twice");
        }
    }

    #[test]
    fn master_to_all_broadcasts_from_task0() {
        let src = borders(&Partitioner::master(), 6, 3);
        let tgt = borders(&Partitioner::all(), 6, 3);

        let p0 = TransferPlan::compute(&src, &tgt, 0).unwrap();
        assert_eq!(
            p0.sends
                .iter()
                .map(|(t, r)| (*t, span(r)))
                .collect::<Vec<_>>(),
            vec![(1, (0, 6)), (2, (0, 6))]
        );
        let p1 = TransferPlan::compute(&src, &tgt, 1).unwrap();
        assert_eq!(
            p1.recvs
                .iter()
                .map(|(u, r)| (*u, span(r)))
                .collect::<Vec<_>>(),
            vec![(0, (0, 6))]
        );
        assert!(p1.sends.is_empty());
    }

    #[test]
    fn send_and_recv_sides_mirror_each_other() {
        let g = 4;
        let src = borders(&Partitioner::block_1d(), 13, g);
        let tgt = borders(&Partitioner::master(), 13, g);
        let plans: Vec<_> = (0..g)
            .map(|w| TransferPlan::compute(&src, &tgt, w).unwrap())
            .collect();
        for (w, plan) in plans.iter().enumerate() {
            for &(peer, r) in &plan.sends {
                let matching: Vec<_> = plans[peer]
                    .recvs
                    .iter()
                    .filter(|(u, rr)| *u == w && *rr == r)
                    .collect();
                assert_eq!(matching.len(), 1, "send {w}->{peer} {r} unmatched");
            }
            for &(peer, r) in &plan.recvs {
                assert!(
                    plans[peer].sends.iter().any(|(t, rr)| *t == w && *rr == r),
                    "recv {w}<-{peer} {r} unmatched"
                );
            }
        }
    }

    #[test]
    fn space_mismatch_is_rejected() {
        let a = borders(&Partitioner::block_1d(), 8, 2);
        let b = borders(&Partitioner::block_1d(), 9, 2);
        assert_eq!(
            TransferPlan::compute(&a, &b, 0).unwrap_err(),
            RepartError::SpaceMismatch
        );
    }
}
