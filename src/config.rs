//! Environment-driven service configuration.

use std::env;
use std::path::PathBuf;

/// Minimum vote count for a match to be reported as found.
///
/// Tied to the landmark density of the current extraction parameters; if
/// window sizes, percentiles or the pairing fan-out change, this needs
/// recalibrating.
pub const DEFAULT_MATCH_THRESHOLD: u32 = 15;

pub struct Config {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub match_threshold: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let database_path = env::var("EARMARK_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("earmark.db"));
        let bind_addr =
            env::var("EARMARK_BIND").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let match_threshold = env::var("EARMARK_MATCH_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MATCH_THRESHOLD);

        Self { database_path, bind_addr, match_threshold }
    }
}
