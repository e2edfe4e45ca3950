//! Prometheus metrics for operational visibility.
//!
//! Only aggregate counts are exposed: no user identifiers, room identifiers,
//! endpoint URLs, or message content appear in any label.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// All metrics for the Herald server.
#[derive(Clone)]
pub struct Metrics {
    /// The Prometheus registry containing all metrics.
    pub registry: Registry,

    /// Total trigger requests received, by event kind.
    pub triggers_total: IntCounterVec,

    /// Total recipients notified (at least one endpoint delivered).
    pub recipients_notified_total: IntCounter,

    /// Total per-endpoint delivery attempts, by outcome.
    pub deliveries_total: IntCounterVec,

    /// Total notifications coalesced by the rate limiter.
    pub coalesced_total: IntCounter,

    /// Total endpoint records removed after a terminal delivery failure.
    pub endpoints_removed_total: IntCounter,
}

impl Metrics {
    /// Create a new metrics instance with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let triggers_total = IntCounterVec::new(
            Opts::new(
                "herald_triggers_total",
                "Total trigger requests received",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(triggers_total.clone()))?;

        let recipients_notified_total = IntCounter::with_opts(Opts::new(
            "herald_recipients_notified_total",
            "Total recipients with at least one successful delivery",
        ))?;
        registry.register(Box::new(recipients_notified_total.clone()))?;

        let deliveries_total = IntCounterVec::new(
            Opts::new(
                "herald_deliveries_total",
                "Total per-endpoint delivery attempts",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(deliveries_total.clone()))?;

        let coalesced_total = IntCounter::with_opts(Opts::new(
            "herald_coalesced_total",
            "Total notifications coalesced by the rate limiter",
        ))?;
        registry.register(Box::new(coalesced_total.clone()))?;

        let endpoints_removed_total = IntCounter::with_opts(Opts::new(
            "herald_endpoints_removed_total",
            "Total endpoint records removed after a terminal failure",
        ))?;
        registry.register(Box::new(endpoints_removed_total.clone()))?;

        Ok(Self {
            registry,
            triggers_total,
            recipients_notified_total,
            deliveries_total,
            coalesced_total,
            endpoints_removed_total,
        })
    }

    /// Record an incoming trigger request ("message" or "turn").
    pub fn record_trigger(&self, kind: &str) {
        self.triggers_total.with_label_values(&[kind]).inc();
    }

    /// Record a recipient who received at least one delivery.
    pub fn record_recipient_notified(&self) {
        self.recipients_notified_total.inc();
    }

    /// Record one delivery attempt ("success", "gone", or "transient").
    pub fn record_delivery(&self, outcome: &str) {
        self.deliveries_total.with_label_values(&[outcome]).inc();
    }

    /// Record a notification suppressed into the pending count.
    pub fn record_coalesced(&self) {
        self.coalesced_total.inc();
    }

    /// Record an endpoint record removed after a Gone failure.
    pub fn record_endpoint_removed(&self) {
        self.endpoints_removed_total.inc();
    }

    /// Gather all metric families for exposition.
    pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }
}
