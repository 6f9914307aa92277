// ── Progress ──────────────────────────────────────────────────────────────────

use crate::transfer::types::ItemOutcome;
use hostlink_core::ProgressSettings;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Turns a stream of cumulative byte counts into sparse percentage updates.
///
/// An update is surfaced only when the percentage reaches a new multiple of
/// `percent_step`, never at 100%, and the counter is inspected at most once
/// every `call_stride` callbacks. `min_interval_ms` additionally spaces
/// surfaced updates in time.
#[derive(Debug)]
pub struct ProgressThrottle {
    total: u64,
    step: u8,
    stride: u32,
    min_interval: Option<Duration>,
    calls: u32,
    last_step: u8,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(settings: &ProgressSettings, total: u64) -> Self {
        Self {
            total,
            step: settings.percent_step.clamp(1, 100),
            stride: settings.call_stride.max(1),
            min_interval: (settings.min_interval_ms > 0).then(|| Duration::from_millis(settings.min_interval_ms)),
            calls: 0,
            last_step: 0,
            last_emit: None,
        }
    }

    /// Feed the cumulative byte count; returns the percentage to surface, if any.
    pub fn observe(&mut self, bytes: u64) -> Option<u8> {
        self.calls = self.calls.wrapping_add(1);
        if self.calls % self.stride != 0 || self.total == 0 {
            return None;
        }

        let percent = (u128::from(bytes) * 100 / u128::from(self.total)).min(100) as u8;
        if percent >= 100 {
            return None;
        }
        let crossed = percent / self.step * self.step;
        if crossed == 0 || crossed <= self.last_step {
            return None;
        }

        if let (Some(min), Some(last)) = (self.min_interval, self.last_emit) {
            if last.elapsed() < min {
                return None;
            }
        }

        self.last_step = crossed;
        self.last_emit = Some(Instant::now());
        Some(crossed)
    }
}

/// A surfaced progress sample for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate<'a> {
    pub item: &'a str,
    pub percent: u8,
    pub bytes: u64,
    pub total: u64,
}

/// Receives progress and per-item results while a transfer runs.
pub trait TransferObserver {
    fn progress(&mut self, _update: &ProgressUpdate<'_>) {}

    /// The item's progress indicator should be removed (success or failure).
    fn clear(&mut self, _item: &str) {}

    fn item_finished(&mut self, _outcome: &ItemOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl TransferObserver for LogObserver {
    fn progress(&mut self, update: &ProgressUpdate<'_>) {
        debug!(
            "{}: {}% ({} / {} bytes)",
            update.item, update.percent, update.bytes, update.total
        );
    }

    fn item_finished(&mut self, outcome: &ItemOutcome) {
        match &outcome.result {
            Ok(bytes) => info!("{} -> {} ({} bytes)", outcome.source, outcome.destination, bytes),
            Err(e) => warn!("{} -> {} failed: {}", outcome.source, outcome.destination, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(step: u8, stride: u32) -> ProgressSettings {
        ProgressSettings {
            percent_step: step,
            call_stride: stride,
            min_interval_ms: 0,
        }
    }

    fn drive(throttle: &mut ProgressThrottle, total: u64, chunk: u64) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut bytes = 0;
        while bytes < total {
            bytes = (bytes + chunk).min(total);
            if let Some(p) = throttle.observe(bytes) {
                seen.push(p);
            }
        }
        seen
    }

    #[test]
    fn test_reports_each_step_once_and_never_100() {
        let mut t = ProgressThrottle::new(&settings(10, 1), 1000);
        let seen = drive(&mut t, 1000, 1);
        assert_eq!(seen, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_stride_limits_evaluations() {
        let mut t = ProgressThrottle::new(&settings(10, 10), 100);
        // Ten callbacks of 10 bytes each: only the 10th is evaluated, and it is 100%.
        assert!(drive(&mut t, 100, 10).is_empty());

        let mut t = ProgressThrottle::new(&settings(10, 10), 1000);
        let seen = drive(&mut t, 1000, 1);
        assert_eq!(seen, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_large_jumps_report_the_crossed_step() {
        let mut t = ProgressThrottle::new(&settings(10, 1), 100);
        assert_eq!(t.observe(35), Some(30));
        assert_eq!(t.observe(39), None);
        assert_eq!(t.observe(99), Some(90));
        assert_eq!(t.observe(100), None);
    }

    #[test]
    fn test_empty_file_reports_nothing() {
        let mut t = ProgressThrottle::new(&settings(10, 1), 0);
        assert_eq!(t.observe(0), None);
    }

    #[test]
    fn test_min_interval_suppresses_bursts() {
        let mut t = ProgressThrottle::new(
            &ProgressSettings {
                percent_step: 10,
                call_stride: 1,
                min_interval_ms: 60_000,
            },
            100,
        );
        assert_eq!(t.observe(10), Some(10));
        assert_eq!(t.observe(50), None);
    }

    #[test]
    fn test_zero_settings_are_clamped() {
        let mut t = ProgressThrottle::new(&settings(0, 0), 100);
        assert_eq!(t.observe(1), Some(1));
    }
}
