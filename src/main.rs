use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use signable_store::utils::{init_logging, StoreConfig};
use signable_store::{DatabaseService, SeedData};

#[derive(Parser)]
#[command(name = "signable-store", version, about = "Signable 课程数据存储管理工具")]
struct Cli {
    /// 数据库文件路径（覆盖 SIGNABLE_DB_PATH）
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// 日志级别：error / warn / info / debug / trace
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 日志文件（覆盖 SIGNABLE_LOG_FILE）
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 创建数据库与表结构
    Init,
    /// 从 JSON 文件导入初始数据
    Seed {
        /// 导入文件（覆盖 SIGNABLE_SEED_FILE）
        file: Option<PathBuf>,
    },
    /// 输出各表行数
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid log level: {}", level))?;
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file;
    }
    if let Command::Seed { file: Some(file) } = &cli.command {
        config.seed_file = Some(file.clone());
    }

    init_logging(&config).context("Failed to initialize logging")?;

    let db = DatabaseService::open(&config.db_path)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    match cli.command {
        Command::Init => {
            info!("database ready at {}", config.db_path.display());
        }
        Command::Seed { .. } => {
            let file = config
                .seed_file
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("No seed file given (argument or SIGNABLE_SEED_FILE)"))?;
            let data = SeedData::from_file(file)
                .with_context(|| format!("Failed to read seed file {}", file.display()))?;
            let report = db.seed(&data).context("Failed to import seed data")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Stats => {
            let stats = db.stats().context("Failed to read statistics")?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
