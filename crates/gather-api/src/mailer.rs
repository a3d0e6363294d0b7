use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// SMTP relay settings. When absent the mailer runs in dev mode and logs the
/// links instead of sending anything.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Transactional email for verification and password-reset links.
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    base_url: String,
}

impl Mailer {
    pub fn new(smtp: Option<SmtpConfig>, from: &str, base_url: String) -> Result<Self, MailError> {
        let from: Mailbox = from.parse()?;

        let transport = match smtp {
            Some(cfg) => Some(
                AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?
                    .credentials(Credentials::new(cfg.username, cfg.password))
                    .build(),
            ),
            None => None,
        };

        Ok(Self {
            transport,
            from,
            base_url,
        })
    }

    pub async fn send_verification(
        &self,
        to: &str,
        username: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let link = self.verification_link(token);
        let body = format!(
            "Hi {username},\n\n\
             Welcome to Gather! Confirm your email address by opening:\n\n\
             {link}\n\n\
             If you did not create this account you can ignore this email.\n"
        );
        self.send(to, "Confirm your Gather account", body, &link)
            .await
    }

    pub async fn send_password_reset(
        &self,
        to: &str,
        username: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let link = self.reset_link(token);
        let body = format!(
            "Hi {username},\n\n\
             Someone asked to reset the password for your Gather account.\n\
             Use this token to choose a new password:\n\n\
             {link}\n\n\
             If this wasn't you, your password is unchanged.\n"
        );
        self.send(to, "Reset your Gather password", body, &link).await
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: String,
        link: &str,
    ) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            // Dev mode: no relay configured, surface the link in the logs
            info!("SMTP not configured; would mail {}: {}", to, link);
            return Ok(());
        };

        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .body(body)?;

        transport.send(message).await?;
        Ok(())
    }

    fn verification_link(&self, token: &str) -> String {
        format!("{}/auth/verify?token={}", self.base_url, token)
    }

    fn reset_link(&self, token: &str) -> String {
        format!("{}/reset?token={}", self.base_url, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailer() -> Mailer {
        Mailer::new(None, "Gather <no-reply@example.com>", "https://gather.example.com".into())
            .unwrap()
    }

    #[test]
    fn links_embed_the_token() {
        let m = mailer();
        assert_eq!(
            m.verification_link("tok123"),
            "https://gather.example.com/auth/verify?token=tok123"
        );
        assert_eq!(
            m.reset_link("tok456"),
            "https://gather.example.com/reset?token=tok456"
        );
    }

    #[test]
    fn rejects_invalid_from_address() {
        assert!(Mailer::new(None, "not an address", "http://localhost".into()).is_err());
    }

    #[tokio::test]
    async fn dev_mode_send_is_a_no_op() {
        let m = mailer();
        m.send_verification("ada@example.com", "ada", "tok").await.unwrap();
        m.send_password_reset("ada@example.com", "ada", "tok").await.unwrap();
    }
}
