//! Bounded security logs and counters.
//!
//! The middleware writes every threat, incident and timing sample into a
//! [`SecurityLog`]. Each list is a ring buffer: once it holds its capacity,
//! pushing evicts the oldest entry. The log is injected into the middleware
//! so several pipelines can share one store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{InputType, SecurityLevel};

/// Thread-safe FIFO ring buffer
#[derive(Debug)]
pub struct BoundedLog<T> {
    entries: RwLock<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> BoundedLog<T> {
    /// Create a log holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append, evicting the oldest entries past capacity
    pub fn push(&self, entry: T) {
        if let Ok(mut entries) = self.entries.write() {
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of all entries, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the newest `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<T> {
        self.entries
            .read()
            .map(|e| e.iter().skip(e.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    /// Drop all entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}

/// One processed input with detected risk
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatLogEntry {
    /// When it was logged
    pub timestamp: DateTime<Utc>,
    /// Input type
    pub input_type: InputType,
    /// Threat score
    pub threat_score: u32,
    /// Final level
    pub security_level: SecurityLevel,
    /// Risk factor summary
    pub risk_factors: Vec<String>,
    /// First 100 characters of the input
    pub input_preview: String,
}

/// A threat that crossed the alert threshold
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityIncident {
    /// Incident id
    pub id: String,
    /// When it was raised
    pub timestamp: DateTime<Utc>,
    /// Threat score
    pub threat_score: u32,
    /// Final level
    pub security_level: SecurityLevel,
    /// Risk factors
    pub risk_factors: Vec<String>,
    /// Whether output was quarantined
    pub quarantined: bool,
}

/// Timing of one pipeline run
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    /// When it was recorded
    pub timestamp: DateTime<Utc>,
    /// Pipeline duration
    pub duration: Duration,
    /// Input length in characters
    pub input_length: usize,
}

/// Shared store for middleware logs
#[derive(Debug)]
pub struct SecurityLog {
    /// Inputs with a non-zero threat score
    pub threats: BoundedLog<ThreatLogEntry>,
    /// Alerts
    pub incidents: BoundedLog<SecurityIncident>,
    /// Timing samples
    pub performance: BoundedLog<PerformanceSample>,
    processed: AtomicU64,
    blocked: AtomicU64,
    quarantined: AtomicU64,
    errors: AtomicU64,
    incidents_raised: AtomicU64,
}

impl Default for SecurityLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl SecurityLog {
    /// Create a store whose lists each hold `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            threats: BoundedLog::new(max_entries),
            incidents: BoundedLog::new(max_entries),
            performance: BoundedLog::new(max_entries),
            processed: AtomicU64::new(0),
            blocked: AtomicU64::new(0),
            quarantined: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            incidents_raised: AtomicU64::new(0),
        }
    }

    /// Count a processed input
    pub fn record_processed(&self, secure: bool, quarantined: bool) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        if !secure {
            self.blocked.fetch_add(1, Ordering::Relaxed);
        }
        if quarantined {
            self.quarantined.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a pipeline failure
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Store an incident
    pub fn record_incident(&self, incident: SecurityIncident) {
        self.incidents_raised.fetch_add(1, Ordering::Relaxed);
        self.incidents.push(incident);
    }

    /// Average duration over the held samples
    pub fn average_processing_time(&self) -> Option<Duration> {
        let samples = self.performance.snapshot();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().map(|s| s.duration).sum();
        Some(total / samples.len() as u32)
    }

    /// Summary for reporting
    pub fn summary(&self) -> SecurityStats {
        SecurityStats {
            total_processed: self.processed.load(Ordering::Relaxed),
            total_blocked: self.blocked.load(Ordering::Relaxed),
            total_quarantined: self.quarantined.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            total_incidents: self.incidents_raised.load(Ordering::Relaxed),
            threat_log_size: self.threats.len(),
            average_processing_ms: self
                .average_processing_time()
                .map(|d| d.as_secs_f64() * 1000.0),
        }
    }

    /// Reset lists and counters
    pub fn clear(&self) {
        self.threats.clear();
        self.incidents.clear();
        self.performance.clear();
        for counter in [
            &self.processed,
            &self.blocked,
            &self.quarantined,
            &self.errors,
            &self.incidents_raised,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Statistics summary for serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStats {
    /// Inputs processed
    pub total_processed: u64,
    /// Inputs judged insecure
    pub total_blocked: u64,
    /// Inputs whose output was withheld
    pub total_quarantined: u64,
    /// Pipeline failures
    pub total_errors: u64,
    /// Incidents raised (including evicted ones)
    pub total_incidents: u64,
    /// Entries currently in the threat log
    pub threat_log_size: usize,
    /// Mean pipeline duration in milliseconds
    pub average_processing_ms: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction() {
        let log = BoundedLog::new(3);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.snapshot(), vec![2, 3, 4]);
    }

    #[test]
    fn test_recent() {
        let log = BoundedLog::new(10);
        for i in 0..5 {
            log.push(i);
        }
        assert_eq!(log.recent(2), vec![3, 4]);
        assert_eq!(log.recent(50).len(), 5);
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let log = BoundedLog::new(0);
        log.push("x");
        assert!(log.is_empty());
    }

    #[test]
    fn test_counters_and_clear() {
        let log = SecurityLog::new(10);
        log.record_processed(true, false);
        log.record_processed(false, true);
        log.record_error();
        log.performance.push(PerformanceSample {
            timestamp: Utc::now(),
            duration: Duration::from_millis(4),
            input_length: 3,
        });
        log.performance.push(PerformanceSample {
            timestamp: Utc::now(),
            duration: Duration::from_millis(2),
            input_length: 3,
        });

        let stats = log.summary();
        assert_eq!(stats.total_processed, 2);
        assert_eq!(stats.total_blocked, 1);
        assert_eq!(stats.total_quarantined, 1);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(log.average_processing_time(), Some(Duration::from_millis(3)));

        log.clear();
        assert_eq!(log.summary().total_processed, 0);
        assert!(log.performance.is_empty());
    }
}
