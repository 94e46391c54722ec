// 模块声明
pub mod error;
pub mod settings;
pub mod schedule;
pub mod state;
pub mod lock;
pub mod storage;
pub mod capture;
pub mod report;
pub mod mail;
pub mod scheduler;
pub mod commands;

// 导出错误类型供其他模块使用
pub use error::{AppError, AppResult};

pub use commands::{ApiResponse, Command, ImageEmailer};
pub use scheduler::{Collaborators, EmailerContext, StatusSnapshot};
pub use settings::{load_settings, EmailerSettings, SettingsManager};

/// 初始化日志（默认 info 级别，可用 RUST_LOG 覆盖）
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();
}
