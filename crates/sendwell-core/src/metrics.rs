//! Prometheus metrics

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Process-wide counters, registered on a private registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Webhook and internal events by outcome
    pub events_total: IntCounterVec,
    /// Send attempts by outcome
    pub sends_total: IntCounterVec,
    /// Limiter acquisitions that ran out of time, by class
    pub rate_limit_timeouts_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("sendwell".to_string()), None)?;

        let events_total = IntCounterVec::new(
            Opts::new("events_total", "Delivery events processed"),
            &["source", "outcome"],
        )?;
        let sends_total = IntCounterVec::new(
            Opts::new("sends_total", "Outbound send attempts"),
            &["outcome"],
        )?;
        let rate_limit_timeouts_total = IntCounterVec::new(
            Opts::new("rate_limit_timeouts_total", "Rate limiter acquire timeouts"),
            &["class"],
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(sends_total.clone()))?;
        registry.register(Box::new(rate_limit_timeouts_total.clone()))?;

        Ok(Self {
            registry,
            events_total,
            sends_total,
            rate_limit_timeouts_total,
        })
    }

    pub fn event(&self, source: &str, outcome: &str) {
        self.events_total.with_label_values(&[source, outcome]).inc();
    }

    pub fn send(&self, outcome: &str) {
        self.sends_total.with_label_values(&[outcome]).inc();
    }

    pub fn rate_limit_timeout(&self, class: &str) {
        self.rate_limit_timeouts_total.with_label_values(&[class]).inc();
    }

    /// Text exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_counters() {
        let metrics = Metrics::new().unwrap();
        metrics.event("sendgrid", "applied");
        metrics.send("sent");

        let text = metrics.render();
        assert!(text.contains("sendwell_events_total{"));
        assert!(text.contains("source=\"sendgrid\""));
        assert!(text.contains("sendwell_sends_total{outcome=\"sent\"} 1"));
    }
}
