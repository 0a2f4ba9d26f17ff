//! # repart
//!
//! repart is a Rust library for distributed data containers with dynamic
//! re-partitioning, designed for SPMD scientific codes. A group of workers
//! (one per process, thread or a single one) shares a logical index space;
//! partitioners assign ranges of it to workers, containers materialize each
//! worker's share into a local buffer through a pluggable memory layout, and
//! switching a container to a different partitioning moves the data where it
//! now belongs.
//!
//! ## Features
//! - 1-to-3-d index spaces with a full half-open range algebra
//! - Built-in partitioners (`all`, `master`, weighted 1-d `block`, `copy`)
//!   plus user-defined ones over a base partitioning's borders
//! - Dense and gap-eliminating sparse 1-d layouts with buffer reuse across
//!   transitions
//! - A collective `switch_to` transition engine with declared data-flow
//!   intent (`CopyIn`, `CopyOut`, `CopyInOut`, `Init`)
//! - Pluggable communication backends: single-process, threads, and MPI
//!   behind the `mpi-support` feature
//!
//! ## Usage
//! ```rust
//! use repart::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), repart::error::RepartError> {
//! let inst = Instance::single();
//! let world = inst.world();
//! let space = Space::new_1d(8)?;
//!
//! let block = Partitioning::new("block", world, space,
//!     Arc::new(Partitioner::block_1d()), None);
//! let master = Partitioning::new("master", world, space,
//!     inst.master_partitioner(), None);
//!
//! let mut v = Data::<f64>::new("v", world, space);
//! v.switch_to(&block, DataFlow::Init(1.0), inst.comm())?;
//! v.switch_to(&master, DataFlow::CopyIn, inst.comm())?;
//! assert_eq!(v.map_default()?.iter().sum::<f64>(), 8.0);
//! # Ok(())
//! # }
//! ```

pub mod comm;
pub mod data;
pub mod error;
pub mod instance;
pub mod layout;
pub mod partition;
pub mod space;

/// A convenient prelude to import the most-used types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::comm::{Communicator, NoComm, ThreadComm, Wait};
    pub use crate::data::{Data, DataFlow};
    pub use crate::error::RepartError;
    pub use crate::instance::{Group, Instance};
    pub use crate::layout::{LayoutPolicy, Mapping, VectorLayout};
    pub use crate::partition::{BlockBuilder, BorderArray, Partitioner, Partitioning, TaskSlice};
    pub use crate::space::{Index, Range, Space};
}
