pub mod blob_graph;
pub mod blob_node;
mod deadlock;
pub mod drainer;
mod latch;
pub mod mode;
#[cfg(test)]
pub mod integration_tests;

pub use blob_graph::BlobGraph;
pub use blob_node::{BlobNode, NodeDrainState};
pub use drainer::{DrainCallback, Drainer, DrainerBuilder};
pub use mode::{DrainKind, DrainMode, DrainerState};
