//! CLI output: error mapping from domain errors to the stable CLI surface.

use crate::client::{ClientReport, Verdict};
use crate::error::FerryError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &FerryError) -> String {
    match e {
        FerryError::ConfigError(msg) => format!("configuration: {}", msg),
        other => other.to_string(),
    }
}

/// Any error that escapes a command is a usage/internal error.
pub fn error_exit_code(_e: &FerryError) -> i32 {
    Verdict::Error.exit_code()
}

/// Client-style block for an internal error, so stdout keeps its shape.
pub fn error_report(e: &FerryError) -> String {
    ClientReport::internal_error(map_error(e)).render()
}
