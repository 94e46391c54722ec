/// 摄像头画面来源
///
/// - HTTP 快照地址（大多数网络摄像头都提供）
/// - FFmpeg 抓取单帧（RTSP 流、本地设备等）

use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use super::FrameSource;
use crate::error::{AppError, AppResult};
use crate::settings::CameraConfig;

/// HTTP 快照来源
pub struct HttpFrameSource {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpFrameSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::camera(20, format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_frame(&self) -> AppResult<Vec<u8>> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(AppError::camera(3, format!("{} 返回了空画面", self.name)));
        }
        debug!("[Capture] {} returned {} bytes", self.name, bytes.len());
        Ok(bytes.to_vec())
    }
}

/// FFmpeg 单帧来源
pub struct FfmpegFrameSource {
    name: String,
    input: String,
    timeout: Duration,
}

impl FfmpegFrameSource {
    pub fn new(name: impl Into<String>, input: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            timeout,
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_frame(&self) -> AppResult<Vec<u8>> {
        let child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel", "error",
                "-i", &self.input,
                "-frames:v", "1",       // 只取一帧
                "-f", "image2",
                "-c:v", "mjpeg",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::camera(21, format!("启动 FFmpeg 失败: {}", e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AppError::camera(1, format!("{} 抓帧超时 ({}s)", self.name, self.timeout.as_secs())))?
            .map_err(|e| AppError::camera(22, format!("等待 FFmpeg 结束失败: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::camera(
                23,
                format!("FFmpeg 抓帧失败 ({}): {}", output.status, stderr.trim()),
            ));
        }
        if output.stdout.is_empty() {
            return Err(AppError::camera(3, format!("{} 返回了空画面", self.name)));
        }

        Ok(output.stdout)
    }
}

/// 根据配置创建画面来源
pub fn build_source(name: &str, config: &CameraConfig) -> AppResult<Arc<dyn FrameSource>> {
    let source: Arc<dyn FrameSource> = match config {
        CameraConfig::Http { url, timeout_secs } => {
            Arc::new(HttpFrameSource::new(name, url.clone(), Duration::from_secs(*timeout_secs))?)
        }
        CameraConfig::Ffmpeg { input, timeout_secs } => {
            Arc::new(FfmpegFrameSource::new(name, input.clone(), Duration::from_secs(*timeout_secs)))
        }
    };
    Ok(source)
}
