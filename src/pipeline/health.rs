//! Health counters for a scan session

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::redeem::ScanOutcome;

/// Health metrics for a scan session
///
/// Tracks sampling and redemption counters. All fields use atomic
/// operations so the timer task and the session can update them freely.
#[derive(Debug, Default)]
pub struct ScanHealth {
    /// Sampling ticks that reached the decoder
    pub ticks: AtomicU64,

    /// Ticks skipped because the source was still buffering
    pub buffering_skips: AtomicU64,

    /// Ticks skipped because a detection was still being processed
    pub busy_skips: AtomicU64,

    /// Decoded frames without a code
    pub decode_misses: AtomicU64,

    /// Decoder panics contained by the capture loop
    pub decoder_panics: AtomicU64,

    /// Payloads handed up by the capture loop
    pub detections: AtomicU64,

    /// Detections discarded because the stream was re-acquired meanwhile
    pub stale_detections: AtomicU64,

    pub first_redemptions: AtomicU64,
    pub repeat_redemptions: AtomicU64,
    pub not_found: AtomicU64,
    pub external_payloads: AtomicU64,
    pub failures: AtomicU64,
}

impl ScanHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_buffering_skip(&self) {
        self.buffering_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_busy_skip(&self) {
        self.busy_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_miss(&self) {
        self.decode_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decoder_panic(&self) {
        self.decoder_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_detection(&self) {
        self.stale_detections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a classified redemption result
    pub fn record_outcome(&self, outcome: &ScanOutcome) {
        let counter = match outcome {
            ScanOutcome::FirstRedemption(_) => &self.first_redemptions,
            ScanOutcome::AlreadyRedeemed(_) => &self.repeat_redemptions,
            ScanOutcome::NotFound => &self.not_found,
            ScanOutcome::ExternalPayload(_) => &self.external_payloads,
            ScanOutcome::Failure(_) => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn decode_misses(&self) -> u64 {
        self.decode_misses.load(Ordering::Relaxed)
    }

    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }

    /// Fraction of decoded ticks that produced a payload, as a percentage
    pub fn hit_rate(&self) -> f64 {
        let ticks = self.ticks();
        if ticks == 0 {
            return 0.0;
        }
        (self.detections() as f64 / ticks as f64) * 100.0
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        HealthSummary {
            ticks: load(&self.ticks),
            buffering_skips: load(&self.buffering_skips),
            busy_skips: load(&self.busy_skips),
            decode_misses: load(&self.decode_misses),
            decoder_panics: load(&self.decoder_panics),
            detections: load(&self.detections),
            stale_detections: load(&self.stale_detections),
            first_redemptions: load(&self.first_redemptions),
            repeat_redemptions: load(&self.repeat_redemptions),
            not_found: load(&self.not_found),
            external_payloads: load(&self.external_payloads),
            failures: load(&self.failures),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSummary {
    pub ticks: u64,
    pub buffering_skips: u64,
    pub busy_skips: u64,
    pub decode_misses: u64,
    pub decoder_panics: u64,
    pub detections: u64,
    pub stale_detections: u64,
    pub first_redemptions: u64,
    pub repeat_redemptions: u64,
    pub not_found: u64,
    pub external_payloads: u64,
    pub failures: u64,
    pub hit_rate: f64,
}

impl fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Health: {} ticks ({} buffering, {} busy), {} misses, {} decoder panics, {} detections ({:.2}%, {} stale), \
             outcomes: {} first, {} repeat, {} not found, {} external, {} failed",
            self.ticks,
            self.buffering_skips,
            self.busy_skips,
            self.decode_misses,
            self.decoder_panics,
            self.detections,
            self.hit_rate,
            self.stale_detections,
            self.first_redemptions,
            self.repeat_redemptions,
            self.not_found,
            self.external_payloads,
            self.failures
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_counters_and_hit_rate() {
        let health = ScanHealth::new();
        assert_eq!(health.hit_rate(), 0.0);

        for _ in 0..4 {
            health.record_tick();
        }
        health.record_decode_miss();
        health.record_detection();

        assert_eq!(health.ticks(), 4);
        assert_eq!(health.decode_misses(), 1);
        assert_eq!(health.hit_rate(), 25.0);
    }

    #[test]
    fn test_outcomes_land_in_their_counter() {
        let health = ScanHealth::new();
        health.record_outcome(&ScanOutcome::FirstRedemption(Utc::now()));
        health.record_outcome(&ScanOutcome::AlreadyRedeemed(Utc::now()));
        health.record_outcome(&ScanOutcome::AlreadyRedeemed(Utc::now()));
        health.record_outcome(&ScanOutcome::NotFound);
        health.record_outcome(&ScanOutcome::ExternalPayload("x".into()));
        health.record_outcome(&ScanOutcome::Failure("down".into()));

        let summary = health.summary();
        assert_eq!(summary.first_redemptions, 1);
        assert_eq!(summary.repeat_redemptions, 2);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.external_payloads, 1);
        assert_eq!(summary.failures, 1);
        assert!(summary.to_string().contains("1 first, 2 repeat"));
    }
}
