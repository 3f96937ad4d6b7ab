//! Background ingestion of processed cells.
//!
//! Producers push items to a [`GroupedWorkQueue`] keyed by site model. An
//! [`IngestWorkerPool`] applies a processor, typically a
//! [`SubGridExistenceIngestor`], to one group at a time per key.

mod existence_ingestor;
mod work_queue;
mod worker_pool;

pub use self::existence_ingestor::SubGridExistenceIngestor;
pub use self::work_queue::GroupedWorkQueue;
pub use self::worker_pool::{IngestEvent, IngestWorkerPool};
