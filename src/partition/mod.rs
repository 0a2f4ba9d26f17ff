//! Partitioning of index spaces over worker groups.
//!
//! A [`Partitioner`](partitioner::Partitioner) fills a
//! [`BorderArray`](border::BorderArray) with `(task, range)` entries; a
//! [`Partitioning`](partitioning::Partitioning) binds one to a concrete
//! group and space and owns the computed borders.

pub mod border;
pub mod partitioner;
pub mod partitioning;


pub use border::{BorderArray, TaskSlice};
pub use partitioner::{BlockBuilder, Partitioner};
pub use partitioning::Partitioning;
