//! Event Normalizer - Turns provider webhook payloads into canonical events
//!
//! Each provider has its own payload shape and vocabulary. Normalization
//! maps every supported provider event onto exactly one [`EventKind`] and
//! derives a dedup key from provider identifiers (message id, event type
//! and a timestamp bucket), so a retried webhook yields the same key.

use super::event::{DeliveryEvent, EventKind, RecipientRef};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Normalization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Unsupported event type: {0}")]
    UnsupportedEventType(String),
}

/// Supported webhook sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    SendGrid,
    Mailgun,
    Ses,
    /// Canonical JSON shape used by internal tooling
    Generic,
}

impl ProviderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEventKind::SendGrid => "sendgrid",
            ProviderEventKind::Mailgun => "mailgun",
            ProviderEventKind::Ses => "ses",
            ProviderEventKind::Generic => "generic",
        }
    }
}

impl std::str::FromStr for ProviderEventKind {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sendgrid" => Ok(ProviderEventKind::SendGrid),
            "mailgun" => Ok(ProviderEventKind::Mailgun),
            "ses" => Ok(ProviderEventKind::Ses),
            "generic" => Ok(ProviderEventKind::Generic),
            other => Err(NormalizeError::Malformed(format!("unknown provider '{}'", other))),
        }
    }
}

impl std::fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result for one item of a webhook batch
pub type NormalizedItem = Result<DeliveryEvent, NormalizeError>;

/// Provider payload normalizer
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    bucket_secs: i64,
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl EventNormalizer {
    /// Create a normalizer folding timestamps into buckets of the given width
    pub fn new(bucket: Duration) -> Self {
        Self {
            bucket_secs: (bucket.as_secs() as i64).max(1),
        }
    }

    /// Normalize a webhook body.
    ///
    /// Fails as a whole only when the body cannot be read at all; each item of
    /// a batch is returned with its own outcome.
    pub fn normalize(
        &self,
        provider: ProviderEventKind,
        body: &[u8],
    ) -> Result<Vec<NormalizedItem>, NormalizeError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| NormalizeError::Malformed(format!("invalid JSON: {}", e)))?;

        match provider {
            ProviderEventKind::SendGrid => {
                let items = value.as_array().ok_or_else(|| {
                    NormalizeError::Malformed("expected a JSON array of events".to_string())
                })?;
                Ok(items.iter().map(|item| self.sendgrid_event(item)).collect())
            }
            ProviderEventKind::Mailgun => Ok(vec![self.mailgun_event(value)?]),
            ProviderEventKind::Ses => Ok(vec![self.ses_event(value)?]),
            ProviderEventKind::Generic => match value {
                serde_json::Value::Array(items) => {
                    Ok(items.into_iter().map(|item| self.generic_event(item)).collect())
                }
                serde_json::Value::Object(_) => Ok(vec![self.generic_event(value)]),
                _ => Err(NormalizeError::Malformed(
                    "expected an event object or array".to_string(),
                )),
            },
        }
    }

    /// Deterministic dedup key for one real-world event
    pub fn dedup_key(
        &self,
        provider: ProviderEventKind,
        message_ref: &str,
        kind: EventKind,
        occurred_at: DateTime<Utc>,
    ) -> String {
        let bucket = occurred_at.timestamp().div_euclid(self.bucket_secs);
        let digest = Sha256::digest(format!("{}|{}|{}", message_ref, kind, bucket).as_bytes());
        format!("{}:{}", provider, hex::encode(digest))
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        provider: ProviderEventKind,
        kind: EventKind,
        campaign_id: Option<&str>,
        recipient_id: Option<&str>,
        message_id: Option<String>,
        occurred_at: DateTime<Utc>,
        bounce_reason: Option<String>,
        url: Option<String>,
    ) -> NormalizedItem {
        let campaign_id = campaign_id.map(parse_uuid).transpose()?;
        let recipient_id = recipient_id.map(parse_uuid).transpose()?;
        let message_id = message_id.map(|m| clean_message_id(&m)).filter(|m| !m.is_empty());

        let (recipient, message_ref) = match (recipient_id, message_id) {
            (Some(id), Some(mid)) => (RecipientRef::Id(id), mid),
            (Some(id), None) => (RecipientRef::Id(id), id.to_string()),
            (None, Some(mid)) => (RecipientRef::MessageId(mid.clone()), mid),
            (None, None) => {
                return Err(NormalizeError::Malformed(
                    "event carries neither a recipient id nor a message id".to_string(),
                ))
            }
        };

        Ok(DeliveryEvent {
            kind,
            campaign_id,
            recipient,
            dedup_key: self.dedup_key(provider, &message_ref, kind, occurred_at),
            occurred_at,
            bounce_reason,
            url,
        })
    }

    fn sendgrid_event(&self, item: &serde_json::Value) -> NormalizedItem {
        let event: SendGridEvent = serde_json::from_value(item.clone())
            .map_err(|e| NormalizeError::Malformed(format!("sendgrid event: {}", e)))?;

        let kind = match event.event.as_str() {
            "delivered" => EventKind::Delivered,
            "open" => EventKind::Opened,
            "click" => EventKind::Clicked,
            "bounce" | "dropped" => EventKind::Bounced,
            "unsubscribe" | "group_unsubscribe" | "spamreport" => EventKind::Unsubscribed,
            other => return Err(NormalizeError::UnsupportedEventType(other.to_string())),
        };

        let occurred_at = Utc
            .timestamp_opt(event.timestamp, 0)
            .single()
            .ok_or_else(|| NormalizeError::Malformed("sendgrid timestamp out of range".into()))?;

        // sg_message_id is the X-Message-Id plus a ".filter..." routing suffix
        let message_id = event
            .sg_message_id
            .map(|m| m.split('.').next().unwrap_or_default().to_string())
            .or(event.smtp_id);

        let bounce_reason = match kind {
            EventKind::Bounced => event.reason.or(Some(event.event.clone())),
            EventKind::Unsubscribed if event.event == "spamreport" => {
                Some("spam complaint".to_string())
            }
            _ => None,
        };

        self.build(
            ProviderEventKind::SendGrid,
            kind,
            event.campaign_id.as_deref(),
            event.recipient_id.as_deref(),
            message_id,
            occurred_at,
            bounce_reason,
            event.url,
        )
    }

    fn mailgun_event(&self, value: serde_json::Value) -> Result<NormalizedItem, NormalizeError> {
        let webhook: MailgunWebhook = serde_json::from_value(value)
            .map_err(|e| NormalizeError::Malformed(format!("mailgun webhook: {}", e)))?;
        let data = webhook.event_data;

        let kind = match data.event.as_str() {
            "delivered" => EventKind::Delivered,
            "opened" => EventKind::Opened,
            "clicked" => EventKind::Clicked,
            "failed" if data.severity.as_deref() == Some("permanent") => EventKind::Bounced,
            "unsubscribed" | "complained" => EventKind::Unsubscribed,
            "failed" => {
                return Ok(Err(NormalizeError::UnsupportedEventType(
                    "failed (temporary)".to_string(),
                )))
            }
            other => return Ok(Err(NormalizeError::UnsupportedEventType(other.to_string()))),
        };

        let occurred_at = Utc
            .timestamp_millis_opt((data.timestamp * 1000.0) as i64)
            .single()
            .ok_or_else(|| NormalizeError::Malformed("mailgun timestamp out of range".into()))?;

        let bounce_reason = match kind {
            EventKind::Bounced => data
                .delivery_status
                .and_then(|s| s.description.filter(|d| !d.is_empty()).or(s.message))
                .or(data.reason),
            _ => None,
        };

        let message_id = data.message.and_then(|m| m.headers.message_id);

        Ok(self.build(
            ProviderEventKind::Mailgun,
            kind,
            data.user_variables.get("campaign_id").map(String::as_str),
            data.user_variables.get("recipient_id").map(String::as_str),
            message_id,
            occurred_at,
            bounce_reason,
            data.url,
        ))
    }

    fn ses_event(&self, value: serde_json::Value) -> Result<NormalizedItem, NormalizeError> {
        let envelope: SnsEnvelope = serde_json::from_value(value)
            .map_err(|e| NormalizeError::Malformed(format!("SNS envelope: {}", e)))?;

        if envelope.kind != "Notification" {
            return Ok(Err(NormalizeError::UnsupportedEventType(envelope.kind)));
        }

        let message = envelope
            .message
            .ok_or_else(|| NormalizeError::Malformed("SNS notification without Message".into()))?;
        let notification: SesNotification = serde_json::from_str(&message)
            .map_err(|e| NormalizeError::Malformed(format!("SES notification: {}", e)))?;

        let event_type = notification
            .event_type
            .or(notification.notification_type)
            .ok_or_else(|| NormalizeError::Malformed("SES notification without type".into()))?;

        let (kind, timestamp, bounce_reason, url) = match event_type.as_str() {
            "Delivery" => (
                EventKind::Delivered,
                notification.delivery.and_then(|d| d.timestamp),
                None,
                None,
            ),
            "Open" => (
                EventKind::Opened,
                notification.open.and_then(|o| o.timestamp),
                None,
                None,
            ),
            "Click" => {
                let click = notification.click.unwrap_or_default();
                (EventKind::Clicked, click.timestamp, None, click.link)
            }
            "Bounce" => {
                let bounce = notification.bounce.unwrap_or_default();
                if bounce.bounce_type != "Permanent" {
                    return Ok(Err(NormalizeError::UnsupportedEventType(format!(
                        "Bounce ({})",
                        bounce.bounce_type
                    ))));
                }
                let reason = bounce
                    .bounced_recipients
                    .into_iter()
                    .find_map(|r| r.diagnostic_code)
                    .or(bounce.bounce_sub_type);
                (EventKind::Bounced, bounce.timestamp, reason, None)
            }
            "Complaint" => (
                EventKind::Unsubscribed,
                notification.complaint.and_then(|c| c.timestamp),
                Some("spam complaint".to_string()),
                None,
            ),
            other => return Ok(Err(NormalizeError::UnsupportedEventType(other.to_string()))),
        };

        let timestamp = timestamp
            .or(notification.mail.timestamp)
            .ok_or_else(|| NormalizeError::Malformed("SES event without timestamp".into()))?;
        let occurred_at = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| NormalizeError::Malformed(format!("SES timestamp: {}", e)))?
            .with_timezone(&Utc);

        let tag = |name: &str| {
            notification
                .mail
                .tags
                .get(name)
                .and_then(|values| values.first())
                .map(String::as_str)
        };

        Ok(self.build(
            ProviderEventKind::Ses,
            kind,
            tag("campaign_id"),
            tag("recipient_id"),
            Some(notification.mail.message_id.clone()),
            occurred_at,
            bounce_reason,
            url,
        ))
    }

    fn generic_event(&self, value: serde_json::Value) -> NormalizedItem {
        let event: GenericEvent = serde_json::from_value(value)
            .map_err(|e| NormalizeError::Malformed(format!("event: {}", e)))?;

        let kind = match event.event.as_str() {
            "delivered" => EventKind::Delivered,
            "opened" => EventKind::Opened,
            "clicked" => EventKind::Clicked,
            "bounced" => EventKind::Bounced,
            "unsubscribed" => EventKind::Unsubscribed,
            other => return Err(NormalizeError::UnsupportedEventType(other.to_string())),
        };

        self.build(
            ProviderEventKind::Generic,
            kind,
            event.campaign_id.as_deref(),
            event.recipient_id.as_deref(),
            event.message_id,
            event.timestamp,
            event.reason,
            event.url,
        )
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, NormalizeError> {
    Uuid::parse_str(s.trim()).map_err(|_| NormalizeError::Malformed(format!("invalid id '{}'", s)))
}

fn clean_message_id(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

#[derive(Debug, Deserialize)]
struct SendGridEvent {
    event: String,
    timestamp: i64,
    sg_message_id: Option<String>,
    #[serde(rename = "smtp-id")]
    smtp_id: Option<String>,
    campaign_id: Option<String>,
    recipient_id: Option<String>,
    reason: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MailgunWebhook {
    #[serde(rename = "event-data")]
    event_data: MailgunEventData,
}

#[derive(Debug, Deserialize)]
struct MailgunEventData {
    event: String,
    timestamp: f64,
    severity: Option<String>,
    reason: Option<String>,
    url: Option<String>,
    #[serde(rename = "user-variables", default)]
    user_variables: HashMap<String, String>,
    message: Option<MailgunMessage>,
    #[serde(rename = "delivery-status")]
    delivery_status: Option<MailgunDeliveryStatus>,
}

#[derive(Debug, Deserialize)]
struct MailgunMessage {
    #[serde(default)]
    headers: MailgunHeaders,
}

#[derive(Debug, Default, Deserialize)]
struct MailgunHeaders {
    #[serde(rename = "message-id")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MailgunDeliveryStatus {
    description: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(rename = "Message")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesNotification {
    event_type: Option<String>,
    notification_type: Option<String>,
    mail: SesMail,
    bounce: Option<SesBounce>,
    complaint: Option<SesTimestamped>,
    delivery: Option<SesTimestamped>,
    open: Option<SesTimestamped>,
    click: Option<SesClick>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesMail {
    message_id: String,
    timestamp: Option<String>,
    #[serde(default)]
    tags: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesBounce {
    #[serde(default)]
    bounce_type: String,
    bounce_sub_type: Option<String>,
    timestamp: Option<String>,
    #[serde(default)]
    bounced_recipients: Vec<SesBouncedRecipient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SesBouncedRecipient {
    diagnostic_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SesTimestamped {
    timestamp: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SesClick {
    timestamp: Option<String>,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenericEvent {
    event: String,
    campaign_id: Option<String>,
    recipient_id: Option<String>,
    message_id: Option<String>,
    timestamp: DateTime<Utc>,
    reason: Option<String>,
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn normalize(provider: ProviderEventKind, body: serde_json::Value) -> Vec<NormalizedItem> {
        EventNormalizer::default()
            .normalize(provider, body.to_string().as_bytes())
            .unwrap()
    }

    #[test]
    fn test_unknown_provider_is_malformed() {
        let err = "postmark".parse::<ProviderEventKind>().unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));
        assert_eq!("SES".parse::<ProviderEventKind>().unwrap(), ProviderEventKind::Ses);
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = EventNormalizer::default()
            .normalize(ProviderEventKind::SendGrid, b"not json")
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));

        let err = EventNormalizer::default()
            .normalize(ProviderEventKind::SendGrid, b"{\"event\":\"open\"}")
            .unwrap_err();
        assert!(matches!(err, NormalizeError::Malformed(_)));
    }

    #[test]
    fn test_sendgrid_batch() {
        let campaign_id = Uuid::new_v4();
        let recipient_id = Uuid::new_v4();
        let items = normalize(
            ProviderEventKind::SendGrid,
            json!([
                {
                    "event": "open",
                    "timestamp": 1_700_000_000,
                    "sg_message_id": "abc123.filter0001.16648.5515E0B88.0",
                    "campaign_id": campaign_id.to_string(),
                    "recipient_id": recipient_id.to_string()
                },
                {
                    "event": "click",
                    "timestamp": 1_700_000_005,
                    "sg_message_id": "abc123.filter0001",
                    "url": "https://example.com/offer"
                },
                { "event": "processed", "timestamp": 1_700_000_000, "sg_message_id": "abc123" },
                { "event": "bounce", "sg_message_id": "abc123" }
            ]),
        );

        assert_eq!(items.len(), 4);

        let open = items[0].as_ref().unwrap();
        assert_eq!(open.kind, EventKind::Opened);
        assert_eq!(open.campaign_id, Some(campaign_id));
        assert_eq!(open.recipient, RecipientRef::Id(recipient_id));

        let click = items[1].as_ref().unwrap();
        assert_eq!(click.kind, EventKind::Clicked);
        assert_eq!(click.recipient, RecipientRef::MessageId("abc123".to_string()));
        assert_eq!(click.url.as_deref(), Some("https://example.com/offer"));

        assert_eq!(
            items[2],
            Err(NormalizeError::UnsupportedEventType("processed".to_string()))
        );
        assert!(matches!(items[3], Err(NormalizeError::Malformed(_))));
    }

    #[test]
    fn test_sendgrid_spamreport_unsubscribes() {
        let items = normalize(
            ProviderEventKind::SendGrid,
            json!([{ "event": "spamreport", "timestamp": 1_700_000_000, "sg_message_id": "m1" }]),
        );
        assert_eq!(items[0].as_ref().unwrap().kind, EventKind::Unsubscribed);
    }

    #[test]
    fn test_dedup_key_is_stable_within_bucket() {
        let normalizer = EventNormalizer::new(Duration::from_secs(60));
        let t1 = Utc.timestamp_opt(1_700_000_040, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_059, 0).unwrap();
        let t3 = Utc.timestamp_opt(1_700_000_060, 0).unwrap();

        let k1 = normalizer.dedup_key(ProviderEventKind::SendGrid, "m1", EventKind::Opened, t1);
        let k2 = normalizer.dedup_key(ProviderEventKind::SendGrid, "m1", EventKind::Opened, t2);
        let k3 = normalizer.dedup_key(ProviderEventKind::SendGrid, "m1", EventKind::Opened, t3);
        let k4 = normalizer.dedup_key(ProviderEventKind::SendGrid, "m1", EventKind::Clicked, t1);

        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_ne!(k1, k4);
        assert!(k1.starts_with("sendgrid:"));
    }

    #[test]
    fn test_retried_webhook_gets_same_key() {
        let body = json!([{ "event": "delivered", "timestamp": 1_700_000_000, "sg_message_id": "m9.filter" }]);
        let first = normalize(ProviderEventKind::SendGrid, body.clone());
        let second = normalize(ProviderEventKind::SendGrid, body);
        assert_eq!(
            first[0].as_ref().unwrap().dedup_key,
            second[0].as_ref().unwrap().dedup_key
        );
    }

    #[test]
    fn test_mailgun_events() {
        let recipient_id = Uuid::new_v4();
        let failed = normalize(
            ProviderEventKind::Mailgun,
            json!({
                "signature": {},
                "event-data": {
                    "event": "failed",
                    "severity": "permanent",
                    "timestamp": 1_700_000_000.25,
                    "user-variables": { "recipient_id": recipient_id.to_string() },
                    "delivery-status": { "description": "No such mailbox", "message": "" },
                    "message": { "headers": { "message-id": "<20240101.abc@mg.example.com>" } }
                }
            }),
        );
        let event = failed[0].as_ref().unwrap();
        assert_eq!(event.kind, EventKind::Bounced);
        assert_eq!(event.recipient, RecipientRef::Id(recipient_id));
        assert_eq!(event.bounce_reason.as_deref(), Some("No such mailbox"));

        let temporary = normalize(
            ProviderEventKind::Mailgun,
            json!({ "event-data": { "event": "failed", "severity": "temporary", "timestamp": 1.0 } }),
        );
        assert!(matches!(temporary[0], Err(NormalizeError::UnsupportedEventType(_))));

        let complained = normalize(
            ProviderEventKind::Mailgun,
            json!({
                "event-data": {
                    "event": "complained",
                    "timestamp": 1_700_000_000.0,
                    "message": { "headers": { "message-id": "abc@mg.example.com" } }
                }
            }),
        );
        let event = complained[0].as_ref().unwrap();
        assert_eq!(event.kind, EventKind::Unsubscribed);
        assert_eq!(
            event.recipient,
            RecipientRef::MessageId("abc@mg.example.com".to_string())
        );
    }

    #[test]
    fn test_ses_events() {
        let recipient_id = Uuid::new_v4();
        let message = json!({
            "notificationType": "Bounce",
            "mail": {
                "messageId": "0100018b-ses",
                "timestamp": "2024-01-01T10:00:00.000Z",
                "tags": {
                    "campaign_id": [Uuid::nil().to_string()],
                    "recipient_id": [recipient_id.to_string()]
                }
            },
            "bounce": {
                "bounceType": "Permanent",
                "bounceSubType": "General",
                "timestamp": "2024-01-01T10:00:05.000Z",
                "bouncedRecipients": [{ "emailAddress": "x@example.com", "diagnosticCode": "550 5.1.1 unknown" }]
            }
        });
        let items = normalize(
            ProviderEventKind::Ses,
            json!({ "Type": "Notification", "Message": message.to_string() }),
        );
        let event = items[0].as_ref().unwrap();
        assert_eq!(event.kind, EventKind::Bounced);
        assert_eq!(event.campaign_id, Some(Uuid::nil()));
        assert_eq!(event.recipient, RecipientRef::Id(recipient_id));
        assert_eq!(event.bounce_reason.as_deref(), Some("550 5.1.1 unknown"));
        assert_eq!(
            event.occurred_at,
            DateTime::parse_from_rfc3339("2024-01-01T10:00:05Z")
                .unwrap()
                .with_timezone(&Utc)
        );

        let transient = json!({
            "eventType": "Bounce",
            "mail": { "messageId": "m", "timestamp": "2024-01-01T10:00:00Z" },
            "bounce": { "bounceType": "Transient" }
        });
        let items = normalize(
            ProviderEventKind::Ses,
            json!({ "Type": "Notification", "Message": transient.to_string() }),
        );
        assert!(matches!(items[0], Err(NormalizeError::UnsupportedEventType(_))));

        let confirmation = normalize(
            ProviderEventKind::Ses,
            json!({ "Type": "SubscriptionConfirmation", "SubscribeURL": "https://sns" }),
        );
        assert!(matches!(confirmation[0], Err(NormalizeError::UnsupportedEventType(_))));
    }

    #[test]
    fn test_generic_single_and_batch() {
        let recipient_id = Uuid::new_v4();
        let single = normalize(
            ProviderEventKind::Generic,
            json!({
                "event": "clicked",
                "recipient_id": recipient_id.to_string(),
                "timestamp": "2024-03-01T12:00:00Z",
                "url": "https://example.com"
            }),
        );
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].as_ref().unwrap().kind, EventKind::Clicked);

        let batch = normalize(
            ProviderEventKind::Generic,
            json!([
                { "event": "sent", "recipient_id": recipient_id.to_string(), "timestamp": "2024-03-01T12:00:00Z" },
                { "event": "opened", "timestamp": "2024-03-01T12:00:00Z" },
                { "event": "opened", "recipient_id": "nope", "timestamp": "2024-03-01T12:00:00Z" }
            ]),
        );
        assert_eq!(
            batch[0],
            Err(NormalizeError::UnsupportedEventType("sent".to_string()))
        );
        assert!(matches!(batch[1], Err(NormalizeError::Malformed(_))));
        assert!(matches!(batch[2], Err(NormalizeError::Malformed(_))));
    }
}
