pub mod commands;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use commands::{ApiError, ApiResult, Caller, ErrorStatus};
pub use error::{StoreError, StoreResult};
pub use services::{DatabaseService, SeedData, SeedReport, StoreStats};
pub use utils::StoreConfig;
