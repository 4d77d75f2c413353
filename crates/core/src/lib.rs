pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{EnginePolicy, Settings};
pub use error::AppError;
