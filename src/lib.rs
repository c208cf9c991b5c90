//! Ferry: Filesystem Command Bus
//!
//! Drives and monitors a long-lived, single-affinity-thread host application using only
//! the filesystem as a message bus: a request queue, a single-consumer dispatcher, a
//! lock-guarded compilation ledger, and an external polling client.

pub mod archive;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod host;
pub mod ledger;
pub mod logging;
pub mod queue;
pub mod request;
pub mod runtime;
pub mod types;
