pub mod config;
pub mod error;
pub mod types;

pub use config::{Backend, Config, MAX_LOOKBACK_DAYS};
pub use error::RiskWatchError;
pub use types::*;
