//! Library instance and worker groups.
//!
//! An [`Instance`] owns the communicator for the lifetime of the program and
//! hands out the [`Group`] of all workers plus the built-in partitioner
//! singletons. The singletons live in a once-guarded cell on the instance
//! rather than in process globals so tests stay hermetic.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::comm::{Communicator, NoComm};
use crate::partition::partitioner::Partitioner;

/// Ordered set of workers; `my_id` is this worker's position.
///
/// Group identity is owned by the backend; the core only compares ids and
/// sizes. Two groups are the same iff both fields agree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Group {
    my_id: usize,
    size: usize,
}

impl Group {
    pub(crate) fn new(my_id: usize, size: usize) -> Self {
        Group { my_id, size }
    }

    /// This worker's id in `[0, size)`.
    #[inline]
    pub fn my_id(&self) -> usize {
        self.my_id
    }

    /// Number of workers in the group.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }
}

struct Builtins {
    all: Arc<Partitioner>,
    master: Arc<Partitioner>,
}

/// Entry point of the library: wraps the backend communicator and provides
/// the world group and the built-in partitioners.
pub struct Instance<C: Communicator> {
    comm: C,
    builtins: OnceCell<Builtins>,
}

impl Instance<NoComm> {
    /// Single-worker instance with the no-op transport.
    pub fn single() -> Self {
        Instance::new(NoComm)
    }
}

impl<C: Communicator> Instance<C> {
    /// Wrap an initialized backend communicator.
    pub fn new(comm: C) -> Self {
        Instance {
            comm,
            builtins: OnceCell::new(),
        }
    }

    /// The group of all workers of this instance.
    pub fn world(&self) -> Group {
        Group::new(self.comm.rank(), self.comm.size())
    }

    /// Backend access for collective operations (`switch_to` takes this).
    pub fn comm(&self) -> &C {
        &self.comm
    }

    fn builtins(&self) -> &Builtins {
        self.builtins.get_or_init(|| Builtins {
            all: Arc::new(Partitioner::all()),
            master: Arc::new(Partitioner::master()),
        })
    }

    /// The `all` partitioner: every task owns the full space.
    pub fn all_partitioner(&self) -> Arc<Partitioner> {
        self.builtins().all.clone()
    }

    /// The `master` partitioner: task 0 owns the full space.
    pub fn master_partitioner(&self) -> Arc<Partitioner> {
        self.builtins().master.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_instance_world() {
        let inst = Instance::single();
        let w = inst.world();
        assert_eq!(w.my_id(), 0);
        assert_eq!(w.size(), 1);
    }

    #[test]
    fn builtins_are_singletons() {
        let inst = Instance::single();
        let a = inst.all_partitioner();
        let b = inst.all_partitioner();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(inst.master_partitioner().name(), "master");
    }
}
