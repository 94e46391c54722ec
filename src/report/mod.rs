/// 每日报告组装
///
/// 从某一天的存档中挑选图片，按时间排序，可选叠加时间标签并生成动图摘要，
/// 产出邮件正文与附件。报告只读取该日期的存档目录。

use chrono::NaiveDate;
use log::{info, warn};
use std::path::PathBuf;

use crate::error::AppResult;
use crate::mail::{InlineImage, MailAttachment};
use crate::storage::{write_atomic, ArchiveStore, CapturedImage, ImageRole};

pub mod overlay;
pub mod summary;

pub use summary::SummaryOptions;

/// 内嵌动图的 Content-ID
pub const SUMMARY_CONTENT_ID: &str = "daily-summary";

const JPEG_CONTENT_TYPE: &str = "image/jpeg";
const GIF_CONTENT_TYPE: &str = "image/gif";

/// 报告选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// 参与报告的图片角色
    pub role: ImageRole,
    pub timestamp_overlay: bool,
    /// 发送时是否生成动图
    pub summary_enabled: bool,
    pub summary: SummaryOptions,
    /// 地点标签
    pub location: String,
}

/// 组装好的报告
#[derive(Debug, Clone)]
pub struct ReportPayload {
    pub day: NaiveDate,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    /// 按时间排序的图片附件
    pub attachments: Vec<MailAttachment>,
    /// 内嵌动图
    pub summary: Option<InlineImage>,
}

/// 组装结果
#[derive(Debug, Clone)]
pub enum ReportOutcome {
    Ready(ReportPayload),
    /// 当天没有可用图片（不是发送失败）
    NoImages { day: NaiveDate },
}

/// 报告组装器
///
/// 所有方法都会读写磁盘，在异步上下文中应放进 spawn_blocking
#[derive(Debug, Clone)]
pub struct ReportAssembler {
    archive: ArchiveStore,
    options: ReportOptions,
}

impl ReportAssembler {
    pub fn new(archive: ArchiveStore, options: ReportOptions) -> Self {
        Self { archive, options }
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// 挑选某天参与报告的图片，按时间升序
    pub fn select_images(&self, day: NaiveDate) -> AppResult<Vec<CapturedImage>> {
        self.archive.list_day(day, Some(self.options.role))
    }

    /// 组装某天的报告
    pub fn build(&self, day: NaiveDate) -> AppResult<ReportOutcome> {
        let images = self.select_images(day)?;
        if images.is_empty() {
            info!("[Report] No {} images for {}", self.options.role, day);
            return Ok(ReportOutcome::NoImages { day });
        }

        let mut attachments = Vec::with_capacity(images.len());
        for image in &images {
            let original = std::fs::read(&image.path)?;
            let data = if self.options.timestamp_overlay {
                self.annotate(image, &original).unwrap_or(original)
            } else {
                original
            };

            attachments.push(MailAttachment {
                filename: image.file_name(),
                content_type: JPEG_CONTENT_TYPE.to_string(),
                data,
            });
        }

        let summary = if self.options.summary_enabled {
            self.summary_from(day, &attachments)
        } else {
            None
        };

        let text_body = body_text(attachments.len(), day);
        let html_body = summary.as_ref().map(|_| html_body(&text_body));

        info!(
            "[Report] Assembled report for {}: {} attachment(s), summary: {}",
            day,
            attachments.len(),
            summary.is_some()
        );

        Ok(ReportOutcome::Ready(ReportPayload {
            day,
            subject: subject(&self.options.location, day),
            text_body,
            html_body,
            attachments,
            summary,
        }))
    }

    /// 重新生成某天的动图摘要并保存，返回保存路径；当天没有图片时返回 None
    pub fn rebuild_summary(&self, day: NaiveDate) -> AppResult<Option<PathBuf>> {
        let images = self.select_images(day)?;
        if images.is_empty() {
            return Ok(None);
        }

        let mut frames = Vec::with_capacity(images.len());
        for image in &images {
            let original = std::fs::read(&image.path)?;
            let frame = if self.options.timestamp_overlay {
                self.annotate(image, &original).unwrap_or(original)
            } else {
                original
            };
            frames.push(frame);
        }

        let gif = summary::build_gif(&frames, &self.options.summary)?;
        let path = self.archive.summary_path(day);
        write_atomic(&path, &gif)?;
        info!("[Report] Rebuilt summary {}", path.display());
        Ok(Some(path))
    }

    /// 叠加时间标签，失败时记录日志并返回 None
    fn annotate(&self, image: &CapturedImage, original: &[u8]) -> Option<Vec<u8>> {
        let label = image.timestamp().format("%Y-%m-%d %H:%M:%S").to_string();
        match overlay::annotate_jpeg(original, &label) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("[Report] Overlay failed for {}, attaching original: {}", image.file_name(), e);
                None
            }
        }
    }

    /// 生成动图并保存到存档，失败时报告照常发送
    fn summary_from(&self, day: NaiveDate, attachments: &[MailAttachment]) -> Option<InlineImage> {
        let frames: Vec<Vec<u8>> = attachments.iter().map(|a| a.data.clone()).collect();
        let gif = match summary::build_gif(&frames, &self.options.summary) {
            Ok(gif) => gif,
            Err(e) => {
                warn!("[Report] Summary for {} failed, sending without it: {}", day, e);
                return None;
            }
        };

        let path = self.archive.summary_path(day);
        if let Err(e) = write_atomic(&path, &gif) {
            warn!("[Report] Could not save summary {}: {}", path.display(), e);
        }

        Some(InlineImage {
            content_id: SUMMARY_CONTENT_ID.to_string(),
            content_type: GIF_CONTENT_TYPE.to_string(),
            data: gif,
        })
    }
}

/// 邮件标题，地点为空时省略
pub fn subject(location: &str, day: NaiveDate) -> String {
    let location = location.trim();
    if location.is_empty() {
        format!("Daily Report - {}", day.format("%Y-%m-%d"))
    } else {
        format!("Daily Report - {} - {}", location, day.format("%Y-%m-%d"))
    }
}

fn body_text(count: usize, day: NaiveDate) -> String {
    format!("Attached are {} images captured on {}.", count, day.format("%Y-%m-%d"))
}

fn html_body(text: &str) -> String {
    format!(
        "<html><body><p>{}</p><img src=\"cid:{}\" alt=\"Daily summary\"></body></html>",
        text, SUMMARY_CONTENT_ID
    )
}
