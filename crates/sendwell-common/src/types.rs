//! Common types for Sendwell

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
pub type UserId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for campaign recipients
pub type RecipientId = Uuid;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (local, domain) = s.rsplit_once('@')?;
        if local.is_empty()
            || domain.is_empty()
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || s.chars().any(char::is_whitespace)
        {
            return None;
        }
        Some(Self::new(local, domain))
    }

    /// Parse and lowercase, so the same mailbox always compares equal
    pub fn normalize(s: &str) -> Option<Self> {
        Self::parse(s).map(|e| Self::new(e.local.to_lowercase(), e.domain.to_lowercase()))
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation(format!("Invalid email address: {}", s)))
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Paused,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    /// `sent` and `cancelled` never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Sent | CampaignStatus::Cancelled)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            "paused" => Ok(CampaignStatus::Paused),
            "cancelled" => Ok(CampaignStatus::Cancelled),
            other => Err(crate::Error::Validation(format!(
                "Unknown campaign status: {}",
                other
            ))),
        }
    }
}

/// Recipient engagement status
///
/// `Pending < Sent < Delivered < Opened < Clicked` form the forward path;
/// `Bounced` and `Unsubscribed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Unsubscribed,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Delivered => "delivered",
            RecipientStatus::Opened => "opened",
            RecipientStatus::Clicked => "clicked",
            RecipientStatus::Bounced => "bounced",
            RecipientStatus::Unsubscribed => "unsubscribed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecipientStatus::Bounced | RecipientStatus::Unsubscribed)
    }

    /// Position on the forward path, `None` for terminal states
    pub fn rank(&self) -> Option<u8> {
        match self {
            RecipientStatus::Pending => Some(0),
            RecipientStatus::Sent => Some(1),
            RecipientStatus::Delivered => Some(2),
            RecipientStatus::Opened => Some(3),
            RecipientStatus::Clicked => Some(4),
            RecipientStatus::Bounced | RecipientStatus::Unsubscribed => None,
        }
    }
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecipientStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecipientStatus::Pending),
            "sent" => Ok(RecipientStatus::Sent),
            "delivered" => Ok(RecipientStatus::Delivered),
            "opened" => Ok(RecipientStatus::Opened),
            "clicked" => Ok(RecipientStatus::Clicked),
            "bounced" => Ok(RecipientStatus::Bounced),
            "unsubscribed" => Ok(RecipientStatus::Unsubscribed),
            other => Err(crate::Error::Validation(format!(
                "Unknown recipient status: {}",
                other
            ))),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("user@example.com").unwrap();
        assert_eq!(email.local, "user");
        assert_eq!(email.domain, "example.com");
        assert_eq!(email.to_string(), "user@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
        assert!(EmailAddress::parse("user@localhost").is_none());
        assert!(EmailAddress::parse("us er@example.com").is_none());
    }

    #[test]
    fn test_email_address_normalize() {
        let email = EmailAddress::normalize("  Alice@Example.COM ").unwrap();
        assert_eq!(email.to_string(), "alice@example.com");
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["draft", "scheduled", "sending", "sent", "paused", "cancelled"] {
            let status: CampaignStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s);
        }
        assert!("archived".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_recipient_rank() {
        assert!(RecipientStatus::Sent.rank() < RecipientStatus::Opened.rank());
        assert_eq!(RecipientStatus::Bounced.rank(), None);
        assert!(RecipientStatus::Unsubscribed.is_terminal());
        assert!(!RecipientStatus::Clicked.is_terminal());
    }
}
