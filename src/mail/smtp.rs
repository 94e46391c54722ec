/// SMTP 邮件传输（STARTTLS + 用户名密码认证）

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use super::{MailMessage, MailTransport};
use crate::error::{AppError, AppResult};
use crate::settings::EmailerSettings;

/// SMTP 发送器
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, credentials: Credentials) -> AppResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| AppError::mail(10, format!("无效的 SMTP 服务器 {}: {}", host, e)))?
            .port(port)
            .credentials(credentials)
            .build();
        Ok(Self { transport })
    }

    /// 按设置创建，发件邮箱同时作为登录用户名
    pub fn from_settings(settings: &EmailerSettings) -> AppResult<Self> {
        let credentials = Credentials::new(
            settings.email.clone(),
            settings.password.expose_secret().clone(),
        );
        Self::new(&settings.smtp_host, settings.smtp_port, credentials)
    }
}

fn mailbox(address: &str) -> AppResult<Mailbox> {
    address
        .parse()
        .map_err(|e| AppError::mail(11, format!("无效的邮箱地址 {}: {}", address, e)))
}

fn content_type(value: &str) -> AppResult<ContentType> {
    ContentType::parse(value)
        .map_err(|e| AppError::mail(12, format!("无效的 Content-Type {}: {}", value, e)))
}

/// 组装 MIME 邮件
///
/// mixed
/// ├── alternative
/// │   ├── text/plain
/// │   └── related (HTML + 内嵌图片)，仅在有 HTML 正文时存在
/// └── 附件...
pub fn build_message(message: &MailMessage) -> AppResult<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&message.from)?)
        .subject(message.subject.clone());
    for recipient in &message.to {
        builder = builder.to(mailbox(recipient)?);
    }

    let mut body = MultiPart::alternative().singlepart(SinglePart::plain(message.text_body.clone()));
    if let Some(html) = &message.html_body {
        let mut related = MultiPart::related().singlepart(SinglePart::html(html.clone()));
        for inline in &message.inline_images {
            related = related.singlepart(
                Attachment::new_inline(inline.content_id.clone())
                    .body(inline.data.clone(), content_type(&inline.content_type)?),
            );
        }
        body = body.multipart(related);
    }

    let mut mixed = MultiPart::mixed().multipart(body);
    for attachment in &message.attachments {
        mixed = mixed.singlepart(
            Attachment::new(attachment.filename.clone())
                .body(attachment.data.clone(), content_type(&attachment.content_type)?),
        );
    }

    builder
        .multipart(mixed)
        .map_err(|e| AppError::mail(13, format!("组装邮件失败: {}", e)))
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, message: &MailMessage) -> AppResult<()> {
        let email = build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| AppError::mail(1, format!("SMTP 发送失败: {}", e)))?;
        Ok(())
    }
}
