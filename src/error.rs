/// 统一错误处理系统
///
/// 提供类型安全的错误定义和用户友好的错误消息

use thiserror::Error;

/// 应用错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 配置相关错误
    #[error("[ERR_CONFIG_{0:03}] {1}")]
    Config(u16, String),

    /// 摄像头相关错误
    #[error("[ERR_CAMERA_{0:03}] {1}")]
    Camera(u16, String),

    /// 图像处理错误
    #[error("[ERR_IMAGE_{0:03}] {1}")]
    Image(u16, String),

    /// 邮件相关错误
    #[error("[ERR_MAIL_{0:03}] {1}")]
    Mail(u16, String),

    /// 存储相关错误
    #[error("[ERR_STORAGE_{0:03}] {1}")]
    Storage(u16, String),

    /// 状态文件错误
    #[error("[ERR_STATE_{0:03}] {1}")]
    State(u16, String),

    /// 实例锁错误
    #[error("[ERR_LOCK_{0:03}] {1}")]
    Lock(u16, String),

    /// IO 相关错误
    #[error("[ERR_IO_{0:03}] {1}")]
    IO(u16, String),

    /// 序列化/反序列化错误
    #[error("[ERR_SERDE_{0:03}] {1}")]
    Serde(u16, String),

    /// 验证错误
    #[error("[ERR_VALIDATION_{0:03}] {1}")]
    Validation(u16, String),

    /// 未知错误
    #[error("[ERR_UNKNOWN] {0}")]
    Unknown(String),
}

impl AppError {
    /// 创建配置错误
    pub fn config(code: u16, msg: impl Into<String>) -> Self {
        Self::Config(code, msg.into())
    }

    /// 创建摄像头错误
    pub fn camera(code: u16, msg: impl Into<String>) -> Self {
        Self::Camera(code, msg.into())
    }

    /// 创建图像处理错误
    pub fn image(code: u16, msg: impl Into<String>) -> Self {
        Self::Image(code, msg.into())
    }

    /// 创建邮件错误
    pub fn mail(code: u16, msg: impl Into<String>) -> Self {
        Self::Mail(code, msg.into())
    }

    /// 创建存储错误
    pub fn storage(code: u16, msg: impl Into<String>) -> Self {
        Self::Storage(code, msg.into())
    }

    /// 创建状态文件错误
    pub fn state(code: u16, msg: impl Into<String>) -> Self {
        Self::State(code, msg.into())
    }

    /// 创建实例锁错误
    pub fn lock(code: u16, msg: impl Into<String>) -> Self {
        Self::Lock(code, msg.into())
    }

    /// 创建 IO 错误
    pub fn io(code: u16, msg: impl Into<String>) -> Self {
        Self::IO(code, msg.into())
    }

    /// 创建序列化错误
    pub fn serde(code: u16, msg: impl Into<String>) -> Self {
        Self::Serde(code, msg.into())
    }

    /// 创建验证错误
    pub fn validation(code: u16, msg: impl Into<String>) -> Self {
        Self::Validation(code, msg.into())
    }

    /// 是否为配置类错误（重新配置时需要同步上报给宿主）
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(..) | Self::Validation(..))
    }
}

/// 从标准 IO 错误转换
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::io(1, "文件或目录不存在"),
            std::io::ErrorKind::PermissionDenied => Self::io(3, "权限不足"),
            std::io::ErrorKind::AlreadyExists => Self::io(2, "文件或目录已存在"),
            _ => Self::io(999, format!("IO 错误: {}", err)),
        }
    }
}

/// 从 serde_json 错误转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::serde(1, format!("JSON 序列化错误: {}", err))
    }
}

/// 从 serde_yaml 错误转换
impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(2, format!("配置文件解析失败: {}", err))
    }
}

/// 从 image 错误转换
impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(e) => Self::image(1, format!("图像解码失败: {}", e)),
            image::ImageError::Encoding(e) => Self::image(2, format!("图像编码失败: {}", e)),
            image::ImageError::Unsupported(e) => Self::image(3, format!("不支持的图像格式: {}", e)),
            other => Self::image(999, format!("图像处理错误: {}", other)),
        }
    }
}

/// 从 reqwest 错误转换
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::camera(1, "请求摄像头超时")
        } else if err.is_connect() {
            Self::camera(2, "连接摄像头失败")
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 | 403 => Self::camera(401, "摄像头拒绝访问"),
                404 => Self::camera(404, "摄像头快照地址不存在"),
                500..=599 => Self::camera(500, "摄像头服务错误"),
                _ => Self::camera(999, format!("HTTP 错误: {}", status)),
            }
        } else {
            Self::camera(999, format!("网络错误: {}", err))
        }
    }
}

/// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unknown(format!("{:#}", err))
    }
}

/// 应用 Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
