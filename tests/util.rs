#![allow(dead_code)]
use repart::prelude::*;
use std::sync::Arc;

/// Run `f` as an SPMD program over `n` thread workers, one instance per
/// rank, returning the per-rank results in rank order.
pub fn spawn_workers<F, R>(n: usize, f: F) -> Vec<R>
where
    F: Fn(Instance<ThreadComm>) -> R + Send + Sync + Clone + 'static,
    R: Send + 'static,
{
    let handles: Vec<_> = ThreadComm::universe(n)
        .into_iter()
        .map(|c| {
            let f = f.clone();
            std::thread::spawn(move || f(Instance::new(c)))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .collect()
}

/// Block partitioning over the world group.
pub fn block(inst: &Instance<ThreadComm>, space: Space) -> Arc<Partitioning> {
    Partitioning::new(
        "block",
        inst.world(),
        space,
        Arc::new(Partitioner::block_1d()),
        None,
    )
}

/// Master partitioning over the world group.
pub fn master(inst: &Instance<ThreadComm>, space: Space) -> Arc<Partitioning> {
    Partitioning::new("master", inst.world(), space, inst.master_partitioner(), None)
}
