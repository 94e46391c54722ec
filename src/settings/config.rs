/// 应用配置定义

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capture::{CropRect, StackOrientation};
use crate::schedule::{TimeOfDay, ZonePolicy, DEFAULT_SEND_TIME};

/// 默认 SMTP 服务器
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";

/// 默认 SMTP 端口（STARTTLS）
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// 摄像头请求默认超时（秒）
pub const DEFAULT_CAMERA_TIMEOUT_SECS: u64 = 10;

/// 摄像头来源配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CameraConfig {
    /// HTTP 快照地址
    Http {
        url: String,
        #[serde(default = "default_camera_timeout")]
        timeout_secs: u64,
    },
    /// 通过 ffmpeg 抓取单帧（RTSP、本地设备等）
    Ffmpeg {
        input: String,
        #[serde(default = "default_camera_timeout")]
        timeout_secs: u64,
    },
}

impl CameraConfig {
    pub fn timeout_secs(&self) -> u64 {
        match self {
            CameraConfig::Http { timeout_secs, .. } | CameraConfig::Ffmpeg { timeout_secs, .. } => {
                *timeout_secs
            }
        }
    }
}

/// 双画面拼接设置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSettings {
    pub enabled: bool,
    pub orientation: StackOrientation,
}

/// 动图摘要设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarySettings {
    pub enabled: bool,

    /// 每帧显示时长（毫秒）
    pub frame_duration_ms: u32,

    /// 最大宽度（像素），更宽的画面会被等比缩小
    pub max_width: u32,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            frame_duration_ms: 700,
            max_width: 640,
        }
    }
}

/// 应用设置
///
/// 每次重新配置时整体加载并校验，之后不可变
#[derive(Debug, Deserialize)]
pub struct EmailerSettings {
    /// 发件邮箱（同时作为 SMTP 用户名）
    pub email: String,

    /// 邮箱密码或应用专用密码
    #[serde(default = "empty_secret")]
    pub password: SecretString,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// 收件人列表
    #[serde(default)]
    pub recipients: Vec<String>,

    /// 主摄像头
    pub camera: CameraConfig,

    /// 副摄像头（可选）
    #[serde(default)]
    pub secondary_camera: Option<CameraConfig>,

    /// 存档根目录
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,

    /// 裁剪区域（主副画面共用）
    #[serde(default)]
    pub crop: CropRect,

    /// 工作日拍摄时间
    pub weekday_schedule: Vec<TimeOfDay>,

    /// 周末拍摄时间，未配置时与工作日相同
    #[serde(default)]
    pub weekend_schedule: Option<Vec<TimeOfDay>>,

    /// 每日发送时间
    #[serde(default = "default_send_time")]
    pub send_time: TimeOfDay,

    #[serde(default)]
    pub stack: StackSettings,

    #[serde(default)]
    pub summary: SummarySettings,

    /// 报告图片右下角叠加拍摄时间
    #[serde(default = "default_true")]
    pub timestamp_overlay: bool,

    /// 地点标签，出现在邮件标题中
    #[serde(default)]
    pub location: String,

    /// 拍摄/发送时间所在时区
    #[serde(default)]
    pub timezone: ZonePolicy,

    /// 启动时若从未拍摄过，先拍一张
    #[serde(default)]
    pub startup_capture: bool,
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_smtp_host() -> String {
    DEFAULT_SMTP_HOST.to_string()
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

fn default_camera_timeout() -> u64 {
    DEFAULT_CAMERA_TIMEOUT_SECS
}

fn default_save_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("image-emailer")
}

fn default_send_time() -> TimeOfDay {
    DEFAULT_SEND_TIME
}

fn default_true() -> bool {
    true
}
