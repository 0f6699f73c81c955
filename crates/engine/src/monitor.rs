use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Rolling window of attempt samples; old samples fall off the back.
const SAMPLE_WINDOW: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Sample {
    duration: Duration,
    success: bool,
}

#[derive(Debug, Default)]
struct MonitorInner {
    samples: VecDeque<Sample>,
    attempts: u64,
    successes: u64,
    failures: u64,
}

/// Aggregated view over the recent attempt window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonitorSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub avg_duration_ms: u64,
    pub p95_duration_ms: u64,
}

/// Per-attempt instrumentation for remote evaluation calls. Every
/// completed attempt, success or failure, lands as one sample. A
/// disabled monitor drops samples and reports an empty snapshot.
#[derive(Debug)]
pub struct PerformanceMonitor {
    enabled: bool,
    inner: Mutex<MonitorInner>,
}

impl PerformanceMonitor {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Mutex::new(MonitorInner::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&self, duration: Duration, success: bool) {
        if !self.enabled {
            return;
        }
        let mut inner = self.lock();
        inner.attempts += 1;
        if success {
            inner.successes += 1;
        } else {
            inner.failures += 1;
        }
        inner.samples.push_back(Sample { duration, success });
        while inner.samples.len() > SAMPLE_WINDOW {
            inner.samples.pop_front();
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let inner = self.lock();
        if inner.samples.is_empty() {
            return MonitorSnapshot {
                attempts: inner.attempts,
                successes: inner.successes,
                failures: inner.failures,
                ..MonitorSnapshot::default()
            };
        }
        let mut durations: Vec<u64> = inner
            .samples
            .iter()
            .map(|s| u64::try_from(s.duration.as_millis()).unwrap_or(u64::MAX))
            .collect();
        durations.sort_unstable();
        let total: u64 = durations.iter().sum();
        let p95_index = (durations.len().saturating_sub(1)) * 95 / 100;
        MonitorSnapshot {
            attempts: inner.attempts,
            successes: inner.successes,
            failures: inner.failures,
            avg_duration_ms: total / durations.len() as u64,
            p95_duration_ms: durations[p95_index],
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MonitorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_disabled_monitor_drops_samples() {
        let monitor = PerformanceMonitor::new(false);
        monitor.record(Duration::from_millis(10), true);
        assert_eq!(monitor.snapshot(), MonitorSnapshot::default());
    }

    #[test]
    fn test_counts_and_average() {
        let monitor = PerformanceMonitor::new(true);
        monitor.record(Duration::from_millis(10), true);
        monitor.record(Duration::from_millis(30), false);
        let snap = monitor.snapshot();
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.avg_duration_ms, 20);
    }

    #[test]
    fn test_p95_reflects_slow_tail() {
        let monitor = PerformanceMonitor::new(true);
        for _ in 0..99 {
            monitor.record(Duration::from_millis(10), true);
        }
        monitor.record(Duration::from_millis(500), true);
        let snap = monitor.snapshot();
        assert_eq!(snap.p95_duration_ms, 10);
        assert!(snap.avg_duration_ms > 10);
    }

    #[test]
    fn test_window_bounds_samples() {
        let monitor = PerformanceMonitor::new(true);
        for i in 0..(SAMPLE_WINDOW + 50) {
            monitor.record(Duration::from_millis(i as u64), true);
        }
        // Counters keep the full history even though the window rolls.
        assert_eq!(monitor.snapshot().attempts, (SAMPLE_WINDOW + 50) as u64);
    }
}
