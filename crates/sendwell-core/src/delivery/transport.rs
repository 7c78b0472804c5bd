//! Outbound transport
//!
//! The delivery worker hands one rendered message per recipient to a
//! [`Transport`]. The SMTP implementation relays through the configured
//! smarthost and tags each message so provider webhooks can be matched
//! back to the recipient.

use async_trait::async_trait;
use chrono::Utc;
use lettre::{
    message::{
        header::{ContentType, Header, HeaderName, HeaderValue},
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use sendwell_common::config::SmtpConfig;
use sendwell_common::types::{CampaignId, RecipientId};
use sendwell_common::{Error, Result};
use sendwell_storage::models::{Campaign, CampaignRecipient};
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::debug;

/// Why a send did not go through
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The relay refused the message for good
    #[error("Permanent send failure: {0}")]
    Permanent(String),

    /// Worth retrying later
    #[error("Transient send failure: {0}")]
    Transient(String),
}

/// One rendered message for one recipient
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub campaign_id: CampaignId,
    pub recipient_id: RecipientId,
    pub to: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: Option<String>,
}

impl OutboundEmail {
    pub fn for_recipient(campaign: &Campaign, recipient: &CampaignRecipient, default_from: &str) -> Self {
        Self {
            campaign_id: campaign.id,
            recipient_id: recipient.id,
            to: recipient.email.clone(),
            from_address: campaign
                .from_address
                .clone()
                .unwrap_or_else(|| default_from.to_string()),
            from_name: campaign.from_name.clone(),
            subject: campaign.subject.clone(),
            html_body: campaign.html_body.clone(),
            text_body: campaign.text_body.clone(),
        }
    }
}

/// Hands messages to a mail provider
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message. Returns the provider message id.
    async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, SendError>;
}

/// Declares a raw header type for one provider's custom-argument channel.
macro_rules! tracking_header {
    ($(#[$doc:meta])* $ty:ident, $name:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        struct $ty(String);

        impl Header for $ty {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($name)
            }

            fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

tracking_header!(
    /// SendGrid unique args, echoed back on every event
    SmtpApiHeader,
    "X-SMTPAPI"
);

tracking_header!(
    /// SES message tags, surfaced as `mail.tags` in notifications
    SesTagsHeader,
    "X-SES-MESSAGE-TAGS"
);

tracking_header!(
    /// Mailgun user variables, surfaced as `user-variables` in events
    MailgunVariablesHeader,
    "X-Mailgun-Variables"
);

impl SmtpApiHeader {
    fn for_email(email: &OutboundEmail) -> Self {
        let args = serde_json::json!({
            "unique_args": {
                "campaign_id": email.campaign_id.to_string(),
                "recipient_id": email.recipient_id.to_string(),
            }
        });
        Self(args.to_string())
    }
}

impl SesTagsHeader {
    fn for_email(email: &OutboundEmail) -> Self {
        Self(format!(
            "campaign_id={},recipient_id={}",
            email.campaign_id, email.recipient_id
        ))
    }
}

impl MailgunVariablesHeader {
    fn for_email(email: &OutboundEmail) -> Self {
        let vars = serde_json::json!({
            "campaign_id": email.campaign_id.to_string(),
            "recipient_id": email.recipient_id.to_string(),
        });
        Self(vars.to_string())
    }
}

/// SMTP relay transport
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    hostname: String,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig, hostname: &str) -> Result<Self> {
        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?
        } else if config.use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| Error::Config(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let mut builder = builder.port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let mailer = builder
            .timeout(Some(StdDuration::from_secs(config.timeout_secs)))
            .build();

        Ok(Self {
            mailer,
            hostname: hostname.to_string(),
        })
    }

    fn build_message(&self, email: &OutboundEmail, message_id: &str) -> std::result::Result<Message, SendError> {
        let from_address = email
            .from_address
            .parse()
            .map_err(|e| SendError::Permanent(format!("Invalid from address: {}", e)))?;
        let from = Mailbox::new(email.from_name.clone(), from_address);

        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| SendError::Permanent(format!("Invalid to address: {}", e)))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(format!("<{}>", message_id)))
            .header(SmtpApiHeader::for_email(email))
            .header(SesTagsHeader::for_email(email))
            .header(MailgunVariablesHeader::for_email(email));

        let built = match (&email.html_body, &email.text_body) {
            (Some(html), Some(text)) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(text.clone()))
                    .singlepart(SinglePart::html(html.clone())),
            ),
            (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
            (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
            (None, None) => builder.body(String::new()),
        };

        built.map_err(|e| SendError::Permanent(format!("Failed to build email: {}", e)))
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, email: &OutboundEmail) -> std::result::Result<String, SendError> {
        let message_id = format!("{}.{}@{}", email.recipient_id, Utc::now().timestamp(), self.hostname);
        let message = self.build_message(email, &message_id)?;

        match self.mailer.send(message).await {
            Ok(response) => {
                debug!("Email to {} accepted: {:?}", email.to, response.code());
                Ok(message_id)
            }
            Err(e) if e.is_permanent() => Err(SendError::Permanent(e.to_string())),
            Err(e) => Err(SendError::Transient(e.to_string())),
        }
    }
}
