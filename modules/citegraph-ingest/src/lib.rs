pub mod crawl_state;
pub mod crawler;
pub mod import;
pub mod normalize;
pub mod outcome;
pub mod pipeline;
pub mod prune;
pub mod reconcile;
pub mod staging;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use crawl_state::{ConceptState, CrawlState, CrawlStateStore, Direction, Window};
pub use crawler::{CrawlStats, Crawler};
pub use import::{ImportStats, Importer};
pub use normalize::{is_identity_only, normalize, NormalizeError};
pub use outcome::RunStatus;
pub use pipeline::Pipeline;
pub use prune::{PruneStats, Pruner};
pub use reconcile::{ReconcileStats, StubReconciler};
pub use staging::StagingLog;
pub use traits::WorksSource;
