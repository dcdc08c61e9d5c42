//! Persistent fingerprint index: songs and their landmark entries.

use thiserror::Error;

mod database;

pub use database::{Database, LandmarkRow};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("fingerprint index unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}
