//! Delivery of sampled points to the collector.

pub mod connectivity;
pub mod engine;
pub mod events;
pub mod transport;


pub use connectivity::{Connectivity, ConnectivityMonitor};
pub use engine::{RecoveryOutcome, SyncConfig, SyncEngine};
pub use events::{SyncEvent, SyncStatus};
pub use transport::{HttpTransport, Transport};
