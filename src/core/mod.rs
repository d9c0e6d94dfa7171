// src/core/mod.rs

// The `core` module holds everything that is independent of the transport:
// wire shapes, decoding, aggregation and the polling state machine. Nothing
// in here performs I/O on its own.

/// Data structures shared across the client, such as `ScanJob`, `JobState`,
/// the raw key/value wire shapes and the normalized finding records.
pub mod models;

/// Decoding of the backend's key/value result tree into normalized records,
/// driven by per-category field maps with explicit defaults.
pub mod decode;

/// Pure aggregation over decoded records: scan summaries, host ordering and
/// tool catalog flattening.
pub mod aggregate;

/// Periodic status polling with cancellation, stale-result discard and
/// automatic stop once a job leaves its active states.
pub mod poll;
