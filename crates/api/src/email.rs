//! Transactional email
//!
//! Sends mail through the Resend HTTP API. Delivery is fire-and-forget from
//! the caller's point of view: handlers spawn the send and never wait on it.

use crate::config::Config;

/// Email configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Resend API key; empty disables sending
    pub resend_api_key: String,
    pub email_from: String,
    /// Base URL of the mail API
    pub api_url: String,
}

impl EmailConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resend_api_key: config.resend_api_key.clone(),
            email_from: config.email_from.clone(),
            api_url: config.email_api_url.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.resend_api_key.is_empty()
    }
}

/// Outbound mail service
#[derive(Clone)]
pub struct Mailer {
    config: EmailConfig,
    client: reqwest::Client,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        if !self.config.is_enabled() {
            tracing::warn!(subject = %subject, "Email not configured, skipping");
            return Err(MailError::Disabled);
        }

        let body = serde_json::json!({
            "from": self.config.email_from,
            "to": [to],
            "subject": subject,
            "html": html
        });

        let response = self
            .client
            .post(format!("{}/emails", self.config.api_url.trim_end_matches('/')))
            .bearer_auth(&self.config.resend_api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(to = %to, subject = %subject, "Email sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Mail API rejected email");
        Err(MailError::Rejected(status.as_u16()))
    }

    /// Mail a signed password-reset link
    pub async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), MailError> {
        let html = format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Password Reset</h2>
    <p>You requested a password reset. The link below is valid for a limited time.</p>
    <p><a href="{link}" style="display: inline-block; padding: 12px 24px; background-color: #6366f1; color: white; text-decoration: none; border-radius: 6px;">Reset password</a></p>
    <p style="color: #666; font-size: 14px;">If you didn't request this, you can ignore this email.</p>
</body>
</html>"#
        );

        self.send_email(to, "Password Reset Request", &html).await
    }

    /// Let the account owner know their password changed
    pub async fn send_password_changed(&self, to: &str) -> Result<(), MailError> {
        let html = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Password Changed</h2>
    <p>The password on your storefront account was just changed.</p>
    <p style="color: #666; font-size: 14px;">If you didn't make this change, reset your password immediately.</p>
</body>
</html>"#;

        self.send_email(to, "Your password was changed", html).await
    }

    /// Send a reset link in the background
    pub fn spawn_password_reset(&self, to: String, link: String) {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_password_reset(&to, &link).await {
                tracing::warn!(error = %e, "Password reset email not delivered");
            }
        });
    }

    /// Send a password-changed notice in the background
    pub fn spawn_password_changed(&self, to: String) {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_password_changed(&to).await {
                tracing::warn!(error = %e, "Password changed email not delivered");
            }
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Email sending is disabled")]
    Disabled,
    #[error("Mail API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Mail API returned status {0}")]
    Rejected(u16),
}
