pub mod state;
pub mod sync_worker;

pub use state::OfflineStore;
pub use sync_worker::{SyncWorker, SyncWorkerHandle};
