//! Recipient State Machine - Applies one event to one recipient
//!
//! Forward path: `pending < sent < delivered < opened < clicked`. `bounced`
//! and `unsubscribed` are absorbing and reachable from any forward state;
//! the only move between them is recording `unsubscribed` over `bounced`.
//!
//! Reaching a forward milestone also records every earlier forward
//! milestone that is still missing, stamped with the event time. Milestone
//! timestamps are set once and never overwritten, so the counters derived
//! from them only ever grow.

use super::event::{DeliveryEvent, EventKind};
use chrono::{DateTime, Utc};
use sendwell_common::types::RecipientStatus;
use sendwell_common::{Error, Result};
use sendwell_storage::models::{CampaignRecipient, CounterDelta};

const FORWARD_PATH: [RecipientStatus; 4] = [
    RecipientStatus::Sent,
    RecipientStatus::Delivered,
    RecipientStatus::Opened,
    RecipientStatus::Clicked,
];

/// An accepted change to a recipient
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: RecipientStatus,
    pub to: RecipientStatus,
    /// The recipient as it should be persisted
    pub recipient: CampaignRecipient,
    /// Counter changes implied by newly reached milestones
    pub delta: CounterDelta,
}

impl Transition {
    pub fn status_changed(&self) -> bool {
        self.from != self.to
    }
}

/// Apply `event` to `current`. `Ok(None)` means the event changes nothing.
pub fn apply_event(current: &CampaignRecipient, event: &DeliveryEvent) -> Result<Option<Transition>> {
    let from = current.status_enum().ok_or_else(|| {
        Error::Internal(format!(
            "recipient {} has unknown status '{}'",
            current.id, current.status
        ))
    })?;
    let target = event.kind.milestone();
    let at = event.occurred_at;
    let mut next = current.clone();

    match (from.rank(), target.rank()) {
        // Terminal recipient: only unsubscribed-over-bounced is recorded
        (None, _) => {
            if !(from == RecipientStatus::Bounced
                && target == RecipientStatus::Unsubscribed
                && next.unsubscribed_at.is_none())
            {
                return Ok(None);
            }
            next.unsubscribed_at = Some(at);
            next.status = target.to_string();
        }

        // Forward recipient moving to a terminal state
        (Some(_), None) => {
            match target {
                RecipientStatus::Bounced => {
                    next.bounced_at.get_or_insert(at);
                    if event.bounce_reason.is_some() {
                        next.bounce_reason = event.bounce_reason.clone();
                    }
                }
                _ => {
                    next.unsubscribed_at.get_or_insert(at);
                }
            }
            next.status = target.to_string();
        }

        // Advancing along the forward path
        (Some(from_rank), Some(target_rank)) if target_rank > from_rank => {
            for milestone in FORWARD_PATH {
                if milestone.rank() <= Some(target_rank) {
                    set_milestone(&mut next, milestone, at);
                }
            }
            next.status = target.to_string();
            record_engagement(current, &mut next, event);
        }

        // Behind or equal: only repeat engagement on a reached milestone counts
        (Some(_), Some(_)) => {
            let engagement = matches!(event.kind, EventKind::Opened | EventKind::Clicked);
            if !engagement || current.milestone_at(target).is_none() {
                return Ok(None);
            }
            record_engagement(current, &mut next, event);
        }
    }

    let delta = next.milestone_delta() - current.milestone_delta();
    let to = next.status_enum().unwrap_or(from);

    Ok(Some(Transition {
        from,
        to,
        recipient: next,
        delta,
    }))
}

fn set_milestone(recipient: &mut CampaignRecipient, milestone: RecipientStatus, at: DateTime<Utc>) {
    let slot = match milestone {
        RecipientStatus::Sent => &mut recipient.sent_at,
        RecipientStatus::Delivered => &mut recipient.delivered_at,
        RecipientStatus::Opened => &mut recipient.opened_at,
        RecipientStatus::Clicked => &mut recipient.clicked_at,
        RecipientStatus::Bounced => &mut recipient.bounced_at,
        RecipientStatus::Unsubscribed => &mut recipient.unsubscribed_at,
        RecipientStatus::Pending => return,
    };
    slot.get_or_insert(at);
}

fn latest(existing: Option<DateTime<Utc>>, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(existing.map_or(at, |e| e.max(at)))
}

/// Opened through a click only: the open was implied, never observed.
fn has_synthesized_open(recipient: &CampaignRecipient) -> bool {
    recipient.opened_at.is_some() && recipient.open_count == 1 && recipient.last_opened_at.is_none()
}

fn record_engagement(current: &CampaignRecipient, next: &mut CampaignRecipient, event: &DeliveryEvent) {
    let at = event.occurred_at;
    match event.kind {
        EventKind::Opened => {
            // The first real open takes the place of one synthesized by a click
            if !has_synthesized_open(current) {
                next.open_count += 1;
            }
            next.last_opened_at = latest(next.last_opened_at, at);
        }
        EventKind::Clicked => {
            next.click_count += 1;
            next.last_clicked_at = latest(next.last_clicked_at, at);
            if event.url.is_some() {
                next.last_click_url = event.url.clone();
            }
            // A click on an unopened message implies one open; last_opened_at
            // stays unset until a real open arrives
            if current.opened_at.is_none() {
                next.open_count = next.open_count.max(1);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::event::RecipientRef;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn recipient(status: RecipientStatus) -> CampaignRecipient {
        let mut r = CampaignRecipient::pending(Uuid::new_v4(), "a@example.com");
        let t = Utc::now() - Duration::hours(1);
        for milestone in FORWARD_PATH {
            if milestone.rank().is_some() && milestone.rank() <= status.rank() {
                set_milestone(&mut r, milestone, t);
            }
        }
        if status.is_terminal() {
            set_milestone(&mut r, status, t);
        }
        r.status = status.to_string();
        r
    }

    fn event(kind: EventKind, at: DateTime<Utc>) -> DeliveryEvent {
        DeliveryEvent {
            kind,
            campaign_id: None,
            recipient: RecipientRef::Id(Uuid::new_v4()),
            dedup_key: format!("test:{}", Uuid::new_v4()),
            occurred_at: at,
            bounce_reason: None,
            url: None,
        }
    }

    fn apply(r: &CampaignRecipient, kind: EventKind, at: DateTime<Utc>) -> Option<Transition> {
        apply_event(r, &event(kind, at)).unwrap()
    }

    fn apply_all(r: CampaignRecipient, kinds: &[EventKind]) -> (CampaignRecipient, CounterDelta) {
        apply_all_at(r, kinds, Utc::now())
    }

    fn apply_all_at(
        mut r: CampaignRecipient,
        kinds: &[EventKind],
        at: DateTime<Utc>,
    ) -> (CampaignRecipient, CounterDelta) {
        let mut total = CounterDelta::default();
        for kind in kinds {
            if let Some(t) = apply(&r, *kind, at) {
                total = total + t.delta;
                r = t.recipient;
            }
        }
        (r, total)
    }

    #[test]
    fn test_sent_to_opened_yields_opened_delta() {
        let r = recipient(RecipientStatus::Sent);
        let t = apply(&r, EventKind::Opened, Utc::now()).unwrap();
        assert_eq!(t.to, RecipientStatus::Opened);
        assert_eq!(
            t.delta,
            CounterDelta {
                delivered: 1,
                opened: 1,
                ..Default::default()
            }
        );
        assert_eq!(t.recipient.open_count, 1);
    }

    #[test]
    fn test_click_on_sent_synthesizes_open() {
        let r = recipient(RecipientStatus::Sent);
        let at = Utc::now();
        let t = apply(&r, EventKind::Clicked, at).unwrap();
        assert_eq!(t.to, RecipientStatus::Clicked);
        assert_eq!(t.recipient.opened_at, Some(at));
        assert_eq!(t.recipient.clicked_at, Some(at));
        assert_eq!(t.recipient.open_count, 1);
        assert_eq!(t.recipient.last_opened_at, None);
        assert_eq!(t.recipient.click_count, 1);
        assert_eq!(t.delta.opened, 1);
        assert_eq!(t.delta.clicked, 1);
    }

    #[test]
    fn test_open_and_click_commute() {
        let base = recipient(RecipientStatus::Sent);
        let at = Utc::now();
        let (open_first, open_first_delta) =
            apply_all_at(base.clone(), &[EventKind::Opened, EventKind::Clicked], at);
        let (click_first, click_first_delta) =
            apply_all_at(base, &[EventKind::Clicked, EventKind::Opened], at);

        assert_eq!(open_first.open_count, 1);
        assert_eq!(open_first_delta, click_first_delta);
        assert_eq!(open_first, click_first);
    }

    #[test]
    fn test_real_open_after_click_counts_once_then_repeats() {
        let r = recipient(RecipientStatus::Sent);
        let click_at = Utc::now();
        let clicked = apply(&r, EventKind::Clicked, click_at).unwrap().recipient;

        let open_at = click_at + Duration::seconds(5);
        let opened = apply(&clicked, EventKind::Opened, open_at).unwrap();
        assert!(opened.delta.is_empty());
        assert_eq!(opened.recipient.open_count, 1);
        assert_eq!(opened.recipient.last_opened_at, Some(open_at));

        let again = apply(&opened.recipient, EventKind::Opened, open_at + Duration::seconds(5)).unwrap();
        assert_eq!(again.recipient.open_count, 2);
    }

    #[test]
    fn test_event_from_pending_synthesizes_sent() {
        let r = recipient(RecipientStatus::Pending);
        let at = Utc::now();
        let t = apply(&r, EventKind::Delivered, at).unwrap();
        assert_eq!(t.recipient.sent_at, Some(at));
        assert_eq!(t.delta.sent, 1);
        assert_eq!(t.delta.delivered, 1);
    }

    #[test]
    fn test_behind_event_is_noop() {
        let r = recipient(RecipientStatus::Opened);
        assert!(apply(&r, EventKind::Delivered, Utc::now()).is_none());
        assert!(apply(&r, EventKind::Sent, Utc::now()).is_none());
    }

    #[test]
    fn test_repeat_open_counts_engagement_only() {
        let r = recipient(RecipientStatus::Opened);
        let at = Utc::now();
        let t = apply(&r, EventKind::Opened, at).unwrap();
        assert!(!t.status_changed());
        assert!(t.delta.is_empty());
        assert_eq!(t.recipient.open_count, r.open_count + 1);
        assert_eq!(t.recipient.last_opened_at, Some(at));
        assert_eq!(t.recipient.opened_at, r.opened_at);
    }

    #[test]
    fn test_order_independence() {
        let a = apply_all(
            recipient(RecipientStatus::Sent),
            &[EventKind::Opened, EventKind::Delivered],
        );
        let b = apply_all(
            recipient(RecipientStatus::Sent),
            &[EventKind::Delivered, EventKind::Opened],
        );
        assert_eq!(a.0.status, b.0.status);
        assert_eq!(a.0.milestone_delta(), b.0.milestone_delta());
        assert_eq!(a.1, b.1);
    }

    #[test]
    fn test_terminal_states_absorb() {
        for terminal in [RecipientStatus::Bounced, RecipientStatus::Unsubscribed] {
            let r = recipient(terminal);
            for kind in [
                EventKind::Sent,
                EventKind::Delivered,
                EventKind::Opened,
                EventKind::Clicked,
                EventKind::Bounced,
            ] {
                assert!(apply(&r, kind, Utc::now()).is_none(), "{:?} after {:?}", kind, terminal);
            }
        }
    }

    #[test]
    fn test_unsubscribe_recorded_over_bounce() {
        let r = recipient(RecipientStatus::Bounced);
        let t = apply(&r, EventKind::Unsubscribed, Utc::now()).unwrap();
        assert_eq!(t.to, RecipientStatus::Unsubscribed);
        assert!(t.recipient.bounced_at.is_some());
        assert_eq!(
            t.delta,
            CounterDelta {
                unsubscribed: 1,
                ..Default::default()
            }
        );

        assert!(apply(&t.recipient, EventKind::Unsubscribed, Utc::now()).is_none());
    }

    #[test]
    fn test_bounce_keeps_reason() {
        let r = recipient(RecipientStatus::Pending);
        let e = DeliveryEvent {
            bounce_reason: Some("SendRejected".into()),
            ..event(EventKind::Bounced, Utc::now())
        };
        let t = apply_event(&r, &e).unwrap().unwrap();
        assert_eq!(t.to, RecipientStatus::Bounced);
        assert_eq!(t.recipient.bounce_reason.as_deref(), Some("SendRejected"));
        assert_eq!(
            t.delta,
            CounterDelta {
                bounced: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_unknown_status_is_error() {
        let mut r = recipient(RecipientStatus::Sent);
        r.status = "archived".into();
        assert!(apply_event(&r, &event(EventKind::Opened, Utc::now())).is_err());
    }
}
