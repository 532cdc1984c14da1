//! vget core: catalog ingest, selection, batch dispatch, and progress
//! relay for a local media-download service.
//!
//! The service enumerates items and performs the transfers; this crate
//! owns the client-side orchestration: the item registry and its status
//! machine, the selection set, the ingest pipeline, the batch dispatcher,
//! the progress relay, and stop propagation.

pub mod client;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod selection;
pub mod session;
