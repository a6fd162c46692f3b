use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static ORPHANED_PAYMENTS_TOTAL: OnceLock<IntCounter> = OnceLock::new();
static WEBHOOKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Register the broker metrics. Safe to call more than once; only the first
/// call builds the registry.
pub fn init_metrics() {
    REGISTRY.get_or_init(|| {
        let registry = Registry::new();

        let payments = IntCounterVec::new(
            Opts::new(
                "broker_payments_total",
                "Payments brokered, by modality and outcome",
            ),
            &["modality", "outcome"],
        )
        .expect("Failed to create broker_payments_total metric");

        // A payment that exists at the provider but could not be recorded
        // locally needs manual reconciliation; this counter feeds that alert.
        let orphaned = IntCounter::new(
            "broker_orphaned_payments_total",
            "Provider-side payments whose local record write failed",
        )
        .expect("Failed to create broker_orphaned_payments_total metric");

        let webhooks = IntCounterVec::new(
            Opts::new(
                "broker_webhooks_total",
                "Webhook notifications processed, by outcome",
            ),
            &["outcome"],
        )
        .expect("Failed to create broker_webhooks_total metric");

        registry
            .register(Box::new(payments.clone()))
            .expect("Failed to register broker_payments_total");
        registry
            .register(Box::new(orphaned.clone()))
            .expect("Failed to register broker_orphaned_payments_total");
        registry
            .register(Box::new(webhooks.clone()))
            .expect("Failed to register broker_webhooks_total");

        PAYMENTS_TOTAL.set(payments).ok();
        ORPHANED_PAYMENTS_TOTAL.set(orphaned).ok();
        WEBHOOKS_TOTAL.set(webhooks).ok();

        registry
    });
}

pub fn get_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized\n".to_string();
    };

    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).ok();
    String::from_utf8(buffer).unwrap_or_else(|_| "# Metrics encoding failed\n".to_string())
}

pub fn record_payment(modality: &str, outcome: &str) {
    if let Some(counter) = PAYMENTS_TOTAL.get() {
        counter.with_label_values(&[modality, outcome]).inc();
    }
}

pub fn record_orphaned_payment() {
    if let Some(counter) = ORPHANED_PAYMENTS_TOTAL.get() {
        counter.inc();
    }
}

pub fn record_webhook(outcome: &str) {
    if let Some(counter) = WEBHOOKS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}
