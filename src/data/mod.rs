//! Data containers and the transition engine.

pub mod container;
pub mod transition;

pub use container::{Data, DataFlow};
pub use transition::TransferPlan;
