//! SMTP email channel

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::webhook::display_value;
use super::AlertChannel;
use crate::config::EmailConfig;
use crate::error::DeliveryError;
use crate::models::Alert;

/// Sends alerts over SMTP with STARTTLS
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    /// Build a channel from configuration
    ///
    /// No connection is made until the first send.
    pub fn new(config: &EmailConfig) -> Result<Self, DeliveryError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| DeliveryError::InvalidPayload(format!("invalid SMTP host: {}", e)))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = parse_mailbox(&config.from)?;
        let to = config
            .to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        if to.is_empty() {
            return Err(DeliveryError::InvalidPayload(
                "email channel has no recipients".to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    /// Build the MIME message for an alert
    pub fn build_message(&self, alert: &Alert) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject(alert));
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                render_text(alert),
                render_html(alert),
            ))
            .map_err(|e| DeliveryError::InvalidPayload(e.to_string()))
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, DeliveryError> {
    addr.parse::<Mailbox>()
        .map_err(|e| DeliveryError::InvalidPayload(format!("invalid address {}: {}", addr, e)))
}

/// Subject line, `[PRIORITY] title`
pub fn subject(alert: &Alert) -> String {
    format!("[{}] {}", alert.priority, alert.title)
}

/// Plain-text body
pub fn render_text(alert: &Alert) -> String {
    let mut body = format!(
        "{}\n\nPriority: {}\nTime: {}\n\n{}\n",
        alert.title,
        alert.priority,
        alert.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        alert.message
    );

    if !alert.data.is_empty() {
        body.push_str("\nDetails:\n");
        for (key, value) in &alert.data {
            body.push_str(&format!("  {}: {}\n", key, display_value(value)));
        }
    }

    body
}

/// HTML body with a priority-colored header and a data table
pub fn render_html(alert: &Alert) -> String {
    let mut rows = String::new();
    for (key, value) in &alert.data {
        rows.push_str(&format!(
            "<tr><td style=\"padding:4px 8px;font-weight:bold\">{}</td><td style=\"padding:4px 8px\">{}</td></tr>",
            escape_html(key),
            escape_html(&display_value(value))
        ));
    }

    let table = if rows.is_empty() {
        String::new()
    } else {
        format!("<table style=\"border-collapse:collapse\">{}</table>", rows)
    };

    format!(
        "<html><body style=\"font-family:sans-serif\">\
<div style=\"background:{color};color:#ffffff;padding:12px\"><h2 style=\"margin:0\">{title}</h2>\
<small>{priority} &middot; {time}</small></div>\
<p>{message}</p>{table}</body></html>",
        color = alert.priority.color(),
        title = escape_html(&alert.title),
        priority = alert.priority,
        time = alert.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        message = escape_html(&alert.message),
        table = table,
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// How an SMTP send failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SmtpFailure {
    /// The server answered with a reply code
    Reply(u16),
    /// No answer before the command timeout
    Timeout,
    /// Rejected on our side: TLS setup or a malformed request
    Local,
    /// The connection broke before a reply arrived
    Transport,
}

/// Map an SMTP failure to a delivery error
///
/// A server reply keeps its code so that 4xx is retried and 5xx is not.
/// Local failures will not change on a resend and are fatal.
pub(crate) fn reply_error(failure: SmtpFailure, message: String) -> DeliveryError {
    match failure {
        SmtpFailure::Reply(code) => DeliveryError::Smtp { code, message },
        SmtpFailure::Timeout => DeliveryError::Timeout(message),
        SmtpFailure::Local => DeliveryError::InvalidPayload(message),
        SmtpFailure::Transport => DeliveryError::Connection(message),
    }
}

fn map_smtp_error(err: lettre::transport::smtp::Error) -> DeliveryError {
    let code = err.status().and_then(|c| c.to_string().parse::<u16>().ok());
    let failure = match code {
        Some(code) => SmtpFailure::Reply(code),
        None if err.is_timeout() => SmtpFailure::Timeout,
        None if err.is_client() || err.is_tls() => SmtpFailure::Local,
        None => SmtpFailure::Transport,
    };
    reply_error(failure, err.to_string())
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send_once(&self, alert: &Alert) -> Result<(), DeliveryError> {
        let message = self.build_message(alert)?;

        let response = self.transport.send(message).await.map_err(map_smtp_error)?;

        debug!(
            alert_id = %alert.id,
            code = %response.code(),
            recipients = self.to.len(),
            "SMTP server accepted alert"
        );
        Ok(())
    }
}
