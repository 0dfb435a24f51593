//! Background reconciliation between local state and the backend.

mod connectivity;
mod orchestrator;

pub use connectivity::{monitor, Probe, TcpProbe, PROBE_INTERVAL};
pub use orchestrator::{is_data_stale, DataSync, SyncStatus, MAX_SYNC_ERRORS, STALE_AFTER};
