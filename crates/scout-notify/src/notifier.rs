use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::config::SenderConfig;
use crate::sms::Phone;

/// 通知发送接口
#[async_trait]
pub trait Notifier: Send + Sync {
    /// HTML 邮件，embedded 以 `cid:<文件名>` 内联
    async fn send_email(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
        embedded: &[PathBuf],
    ) -> Result<()>;

    /// 短信（运营商邮件网关），attachments 走 MMS
    async fn send_text(
        &self,
        phones: &[Phone],
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<()>;
}

/// SMTP 通知器
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SenderConfig) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .build();
        let from: Mailbox = config
            .user
            .parse()
            .with_context(|| format!("invalid sender address {}", config.user))?;
        Ok(Self { transport, from })
    }

    async fn build_and_send(
        &self,
        to: &[String],
        subject: &str,
        body: MultiPart,
    ) -> Result<()> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for addr in to {
            match addr.parse::<Mailbox>() {
                Ok(mailbox) => builder = builder.to(mailbox),
                Err(e) => warn!(address = %addr, error = %e, "skipping invalid recipient"),
            }
        }
        let message = builder.multipart(body)?;
        self.transport.send(message).await?;
        Ok(())
    }
}

fn content_type_for(path: &Path) -> ContentType {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}

async fn inline_part(path: &Path) -> Result<SinglePart> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read embed {}", path.display()))?;
    let cid = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Attachment::new_inline(cid).body(bytes, content_type_for(path)))
}

async fn attachment_part(path: &Path) -> Result<SinglePart> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("read attachment {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(Attachment::new(name).body(bytes, content_type_for(path)))
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_email(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
        embedded: &[PathBuf],
    ) -> Result<()> {
        if to.is_empty() {
            return Ok(());
        }
        let mut related = MultiPart::related().singlepart(SinglePart::html(html_body.to_string()));
        for path in embedded {
            match inline_part(path).await {
                Ok(part) => related = related.singlepart(part),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping embed"),
            }
        }
        self.build_and_send(to, subject, related).await?;
        info!(recipients = to.len(), subject = %subject, "email sent");
        Ok(())
    }

    async fn send_text(
        &self,
        phones: &[Phone],
        subject: &str,
        body: &str,
        attachments: &[PathBuf],
    ) -> Result<()> {
        if phones.is_empty() {
            return Ok(());
        }
        let has_attachments = !attachments.is_empty();
        let to: Vec<String> = phones
            .iter()
            .map(|p| p.gateway_email(has_attachments))
            .collect();

        let mut mixed = MultiPart::mixed().singlepart(SinglePart::plain(body.to_string()));
        for path in attachments {
            match attachment_part(path).await {
                Ok(part) => mixed = mixed.singlepart(part),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping attachment"),
            }
        }
        self.build_and_send(&to, subject, mixed).await?;
        info!(recipients = to.len(), subject = %subject, "text sent");
        Ok(())
    }
}
