pub mod client;
pub mod error;
pub mod memory;
pub mod merge;
pub mod migrate;
pub mod plan;
pub mod store;
pub mod writer;

#[cfg(feature = "test-utils")]
pub mod testutil;

pub use client::GraphClient;
pub use error::GraphError;
pub use memory::{GraphSnapshot, MemoryGraph, PaperNode};
pub use merge::{BatchFailed, MergeEngine, MergeSummary};
pub use neo4rs::query;
pub use plan::{AttrValue, Attributes, EdgeKey, MergePlan, NodeKey, NodeWrite};
pub use store::GraphStore;
pub use writer::GraphWriter;
