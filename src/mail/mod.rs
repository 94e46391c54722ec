/// 邮件投递
///
/// 报告以一封邮件发给全部收件人；投递失败时有限次重试

use async_trait::async_trait;
use log::{info, warn};
use std::time::Duration;

use crate::error::AppResult;
use crate::report::ReportPayload;

pub mod smtp;

pub use smtp::SmtpMailer;

/// 最大投递次数
pub const SEND_ATTEMPTS: u32 = 3;

/// 两次投递之间的间隔
pub const SEND_RETRY_DELAY: Duration = Duration::from_secs(5);

/// 邮件附件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailAttachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// 正文内嵌图片，HTML 中以 `cid:<content_id>` 引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub content_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// 待发送的邮件
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub attachments: Vec<MailAttachment>,
    pub inline_images: Vec<InlineImage>,
}

impl MailMessage {
    /// 由报告构造邮件
    pub fn from_report(from: &str, to: &[String], report: ReportPayload) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_vec(),
            subject: report.subject,
            text_body: report.text_body,
            html_body: report.html_body,
            attachments: report.attachments,
            inline_images: report.summary.into_iter().collect(),
        }
    }
}

/// 邮件传输（由宿主提供）
///
/// 每次调用投递一封邮件给全部收件人
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> AppResult<()>;
}

/// 投递邮件，失败时最多重试到 SEND_ATTEMPTS 次
pub async fn deliver_with_retry(
    transport: &dyn MailTransport,
    message: &MailMessage,
    retry_delay: Duration,
) -> AppResult<()> {
    let mut attempt = 1;
    loop {
        match transport.send(message).await {
            Ok(()) => {
                info!(
                    "Delivered \"{}\" to {} recipient(s) with {} attachment(s)",
                    message.subject,
                    message.to.len(),
                    message.attachments.len()
                );
                return Ok(());
            }
            Err(e) if attempt < SEND_ATTEMPTS => {
                warn!("Delivery attempt {}/{} failed: {}", attempt, SEND_ATTEMPTS, e);
                attempt += 1;
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
