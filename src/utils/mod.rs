// 工具模块
// 路径解析、运行配置与日志初始化

use log::LevelFilter;
use std::env;
use std::path::PathBuf;

use crate::error::StoreResult;

pub const DB_PATH_ENV: &str = "SIGNABLE_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "SIGNABLE_LOG_LEVEL";
pub const LOG_FILE_ENV: &str = "SIGNABLE_LOG_FILE";
pub const SEED_FILE_ENV: &str = "SIGNABLE_SEED_FILE";

/// 数据目录：可执行文件所在目录下的 data/，取不到时退回当前目录
pub fn get_app_data_dir() -> PathBuf {
    let mut path = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("data");
    path
}

pub fn get_database_path() -> PathBuf {
    let mut path = get_app_data_dir();
    path.push("signable.db");
    path
}

/// 运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub seed_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: get_database_path(),
            log_level: LevelFilter::Info,
            log_file: None,
            seed_file: None,
        }
    }
}

impl StoreConfig {
    /// 读取环境变量，未设置的项保持默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(DB_PATH_ENV).filter(|v| !v.is_empty()) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            match level.parse() {
                Ok(level) => config.log_level = level,
                // 日志尚未初始化，只能直接输出
                Err(_) => eprintln!("ignoring invalid {}={}", LOG_LEVEL_ENV, level),
            }
        }
        if let Some(path) = lookup(LOG_FILE_ENV).filter(|v| !v.is_empty()) {
            config.log_file = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup(SEED_FILE_ENV).filter(|v| !v.is_empty()) {
            config.seed_file = Some(PathBuf::from(path));
        }

        config
    }
}

/// 初始化日志：带时间戳的行写到 stderr，可选同时写入文件
pub fn init_logging(config: &StoreConfig) -> StoreResult<()> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(config.log_level)
        .chain(std::io::stderr());

    if let Some(path) = &config.log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    // 重复初始化（如测试中）不视为错误
    if dispatch.apply().is_err() {
        log::debug!("logger already initialized");
    }
    Ok(())
}
