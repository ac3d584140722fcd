// 服务模块
// 提供核心业务逻辑服务

pub mod answers;
pub mod curriculum;
pub mod database;
pub mod links;
pub mod questions;
pub mod seed;
pub mod signs;
pub mod users;

pub use answers::{ans_decode, ans_encode, is_correct};
pub use database::{DatabaseService, StoreStats};
pub use links::QuestionTables;
pub use seed::{SeedData, SeedReport};
