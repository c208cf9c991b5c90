//! Integration tests for the Ferry command bus

mod batch_execution;
mod cli_binary;
mod client_protocol;
mod config_layering;
mod ledger_locking;
mod queue_ingest;
