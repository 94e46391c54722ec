/// 摄像头拍摄模块
///
/// 负责按计划获取画面（带有限次重试）、裁剪、双画面拼接并写入每日存档

use async_trait::async_trait;
use chrono::NaiveDateTime;
use image::DynamicImage;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::storage::{ArchiveStore, CapturedImage, ImageId, ImageRole};

pub mod processing;
pub mod sources;

pub use processing::{CropRect, StackOrientation};

/// 每个来源的最大尝试次数
pub const FETCH_ATTEMPTS: u32 = 3;

/// 两次尝试之间的间隔
pub const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// 画面来源（由宿主提供）
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// 来源名称，用于日志
    fn name(&self) -> &str;

    /// 获取当前画面的原始图像字节
    async fn fetch_frame(&self) -> AppResult<Vec<u8>>;
}

/// 主/副画面来源
#[derive(Clone)]
pub struct CaptureSources {
    pub primary: Arc<dyn FrameSource>,
    pub secondary: Option<Arc<dyn FrameSource>>,
}

/// 拍摄后处理选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    pub crop: CropRect,
    /// 启用拼接时的方向
    pub stack: Option<StackOrientation>,
}

/// 一次拍摄的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// 至少主画面已写入存档
    Captured(Vec<CapturedImage>),
    /// 主画面获取失败，本次拍摄被跳过，未写入任何文件
    Skipped { reason: String },
}

/// 拍摄流水线
pub struct CapturePipeline {
    sources: CaptureSources,
    options: CaptureOptions,
    archive: ArchiveStore,
    retry_delay: Duration,
}

impl CapturePipeline {
    pub fn new(sources: CaptureSources, options: CaptureOptions, archive: ArchiveStore) -> Self {
        Self {
            sources,
            options,
            archive,
            retry_delay: FETCH_RETRY_DELAY,
        }
    }

    /// 覆盖重试间隔
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// 获取一帧，最多尝试 FETCH_ATTEMPTS 次；全部失败返回最后一次的错误
    pub async fn fetch_with_retry(&self, source: &dyn FrameSource) -> AppResult<Vec<u8>> {
        let mut attempt = 1;
        loop {
            match source.fetch_frame().await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < FETCH_ATTEMPTS => {
                    warn!(
                        "[Capture] {} attempt {}/{} failed: {}",
                        source.name(),
                        attempt,
                        FETCH_ATTEMPTS,
                        e
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    warn!("[Capture] {} failed after {} attempts: {}", source.name(), FETCH_ATTEMPTS, e);
                    return Err(e);
                }
            }
        }
    }

    /// 执行一次拍摄
    ///
    /// 主画面失败时整个拍摄被跳过；副画面失败只影响副画面和拼接图
    pub async fn capture(&self, now: NaiveDateTime) -> AppResult<CaptureOutcome> {
        let primary = match self.fetch_with_retry(self.sources.primary.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(CaptureOutcome::Skipped {
                    reason: format!("主画面获取失败: {}", e),
                });
            }
        };

        let secondary = match &self.sources.secondary {
            Some(source) => self.fetch_with_retry(source.as_ref()).await.ok(),
            None => None,
        };

        let options = self.options;
        let archive = self.archive.clone();
        let images = tokio::task::spawn_blocking(move || {
            process_and_store(&archive, now, &options, &primary, secondary.as_deref())
        })
        .await
        .map_err(|e| AppError::image(20, format!("图像处理任务异常退出: {}", e)))??;

        if images.is_empty() {
            return Ok(CaptureOutcome::Skipped {
                reason: "主画面无法解码".to_string(),
            });
        }

        info!(
            "[Capture] Archived {} image(s) at {}",
            images.len(),
            now.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(CaptureOutcome::Captured(images))
    }

    /// 启动拍摄：只保存主画面到 startup 目录，不做裁剪拼接
    pub async fn capture_startup(&self, now: NaiveDateTime) -> AppResult<PathBuf> {
        let bytes = self.fetch_with_retry(self.sources.primary.as_ref()).await?;
        let archive = self.archive.clone();
        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&bytes)?;
            let jpeg = processing::encode_jpeg(&image)?;
            archive.write_startup_image(now, &jpeg)
        })
        .await
        .map_err(|e| AppError::image(20, format!("图像处理任务异常退出: {}", e)))?
    }
}

fn decode(role: ImageRole, bytes: &[u8], crop: &CropRect) -> Option<DynamicImage> {
    match image::load_from_memory(bytes) {
        Ok(image) => Some(processing::crop(&image, crop)),
        Err(e) => {
            warn!("[Capture] Could not decode {} frame: {}", role, e);
            None
        }
    }
}

/// 解码、裁剪、拼接并写入存档（阻塞）
fn process_and_store(
    archive: &ArchiveStore,
    now: NaiveDateTime,
    options: &CaptureOptions,
    primary: &[u8],
    secondary: Option<&[u8]>,
) -> AppResult<Vec<CapturedImage>> {
    let Some(primary) = decode(ImageRole::Primary, primary, &options.crop) else {
        return Ok(Vec::new());
    };
    let secondary = secondary.and_then(|bytes| decode(ImageRole::Secondary, bytes, &options.crop));

    let mut outputs = vec![(ImageRole::Primary, processing::encode_jpeg(&primary)?)];

    if let Some(secondary) = &secondary {
        outputs.push((ImageRole::Secondary, processing::encode_jpeg(secondary)?));

        if let Some(orientation) = options.stack {
            let stacked = processing::stack(&primary, secondary, orientation);
            outputs.push((
                ImageRole::Stacked,
                processing::encode_jpeg(&DynamicImage::ImageRgb8(stacked))?,
            ));
        }
    }

    // 主画面写入失败才算拍摄失败；其余角色写入失败只记录日志
    let mut images = Vec::with_capacity(outputs.len());
    for (role, bytes) in outputs {
        match archive.write_image(ImageId::new(now, role), &bytes) {
            Ok(image) => images.push(image),
            Err(e) if role == ImageRole::Primary => return Err(e),
            Err(e) => warn!("[Capture] Could not archive {} image: {}", role, e),
        }
    }
    Ok(images)
}
