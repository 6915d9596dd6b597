pub mod connectivity_monitor;

pub use connectivity_monitor::{BackendProbe, ConnectivityMonitor, ConnectivityProbe};
