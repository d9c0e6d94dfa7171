// src/lib.rs

//! Client library for the Palisade scanning platform.
//!
//! Scans run on the backend; this crate watches them and makes sense of
//! what they produce. It covers three concerns:
//!
//! - decoding the backend's schema-less key/value result tree into
//!   normalized records ([`core::decode`]),
//! - polling a job's status with cancellation and stale-result discard
//!   ([`core::poll`]),
//! - pure aggregation over decoded records for display
//!   ([`core::aggregate`]).
//!
//! [`client::ScanApiClient`] wires these to the HTTP API. All decoding is
//! total: malformed backend data degrades to per-field defaults instead of
//! failing a whole document.

pub mod client;
pub mod core;
pub mod logging;

pub use client::{ClientError, Debouncer, ScanApiClient};
pub use core::aggregate::{FlatTool, ScanSummary, SortedHost};
pub use core::decode::ResultSet;
pub use core::models::{
    JobState, PathEntry, PortEntry, ScanJob, ScanResultPayload, Severity, SeverityCounts,
    Subdomain, ToolCatalog, Vulnerability,
};
pub use core::poll::{FetchError, PollCallbacks, PollHandle, PollingController};
