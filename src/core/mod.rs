pub mod config;
pub mod errors;

pub use config::{AppPaths, Settings};
pub use errors::ApiError;
