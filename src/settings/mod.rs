/// 应用设置管理模块
///
/// 从 YAML（兼容 JSON）配置文件加载，校验后整体替换

use log::info;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{AppError, AppResult};
use crate::schedule::ScheduleConfig;

pub mod config;
pub use config::{CameraConfig, EmailerSettings, StackSettings, SummarySettings};

impl EmailerSettings {
    /// 校验设置，返回第一个发现的问题
    pub fn validate(&self) -> AppResult<()> {
        if self.email.trim().is_empty() {
            return Err(AppError::config(10, "缺少发件邮箱 email"));
        }
        if !self.email.contains('@') {
            return Err(AppError::config(11, format!("发件邮箱格式无效: {}", self.email)));
        }
        if self.password.expose_secret().is_empty() {
            return Err(AppError::config(12, "缺少邮箱密码 password"));
        }
        if self.smtp_host.trim().is_empty() {
            return Err(AppError::config(13, "SMTP 服务器不能为空"));
        }

        if self.recipients.is_empty() {
            return Err(AppError::config(14, "收件人列表不能为空"));
        }
        if let Some(bad) = self.recipients.iter().find(|r| !r.contains('@')) {
            return Err(AppError::config(15, format!("收件人格式无效: {}", bad)));
        }

        validate_camera("camera", &self.camera)?;
        if let Some(secondary) = &self.secondary_camera {
            validate_camera("secondary_camera", secondary)?;
        }

        if self.weekday_schedule.is_empty() {
            return Err(AppError::config(16, "工作日拍摄时间 weekday_schedule 不能为空"));
        }

        if self.summary.enabled {
            if self.summary.frame_duration_ms == 0 {
                return Err(AppError::config(17, "动图每帧时长必须大于 0"));
            }
            if self.summary.max_width == 0 {
                return Err(AppError::config(18, "动图最大宽度必须大于 0"));
            }
        }

        if self.stack.enabled && self.secondary_camera.is_none() {
            return Err(AppError::config(19, "启用拼接时必须配置副摄像头 secondary_camera"));
        }

        self.schedule().map(|_| ())
    }

    /// 由设置构造时间表
    pub fn schedule(&self) -> AppResult<ScheduleConfig> {
        let weekend = self
            .weekend_schedule
            .clone()
            .unwrap_or_else(|| self.weekday_schedule.clone());
        ScheduleConfig::new(self.weekday_schedule.clone(), weekend, self.send_time)
    }

    /// 报告使用的图片角色
    pub fn report_role(&self) -> crate::storage::ImageRole {
        if self.stack.enabled {
            crate::storage::ImageRole::Stacked
        } else {
            crate::storage::ImageRole::Primary
        }
    }
}

fn validate_camera(field: &str, camera: &CameraConfig) -> AppResult<()> {
    let target = match camera {
        CameraConfig::Http { url, .. } => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(AppError::config(
                    30,
                    format!("{}: 快照地址必须以 http:// 或 https:// 开头: {}", field, url),
                ));
            }
            url
        }
        CameraConfig::Ffmpeg { input, .. } => input,
    };

    if target.trim().is_empty() {
        return Err(AppError::config(31, format!("{}: 摄像头地址不能为空", field)));
    }
    if camera.timeout_secs() == 0 {
        return Err(AppError::config(32, format!("{}: 超时必须大于 0 秒", field)));
    }
    Ok(())
}

/// 从文件加载并校验设置
pub fn load_settings(path: &Path) -> AppResult<EmailerSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::config(1, format!("读取配置文件失败 {}: {}", path.display(), e)))?;
    let settings = parse_settings(&content)?;
    info!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// 从字符串解析并校验设置
pub fn parse_settings(content: &str) -> AppResult<EmailerSettings> {
    let settings: EmailerSettings = serde_yaml::from_str(content)?;
    settings.validate()?;
    Ok(settings)
}

/// 设置管理器
///
/// 持有配置文件路径和当前生效的设置；重新加载失败时保留原设置
pub struct SettingsManager {
    path: PathBuf,
    settings: Mutex<Arc<EmailerSettings>>,
}

impl SettingsManager {
    /// 加载配置文件创建设置管理器
    pub fn load(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let settings = load_settings(&path)?;
        Ok(Self {
            path,
            settings: Mutex::new(Arc::new(settings)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 获取当前设置
    pub fn get(&self) -> Arc<EmailerSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 重新读取配置文件
    pub fn reload(&self) -> AppResult<Arc<EmailerSettings>> {
        let settings = Arc::new(load_settings(&self.path)?);
        self.update(settings.clone());
        Ok(settings)
    }

    /// 替换为已校验的设置
    pub fn update(&self, settings: Arc<EmailerSettings>) {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;
    }
}
