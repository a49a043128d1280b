//! Common utilities and types shared across quizcache

pub mod config;
pub mod error;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
pub use utils::{init_tracing, retry_with_backoff, timestamp_now_millis, validate_participant_key};
