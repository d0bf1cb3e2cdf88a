//! Debounced validation for as-you-type feedback.
//!
//! Each call to [`RealtimeValidator::validate_realtime`] aborts the pending
//! task and schedules a new one after the debounce interval, so only the
//! last call within a burst runs its callback. Outside a tokio runtime
//! the input is validated on the spot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::runtime::Handle;
use tracing::{trace, warn};

use super::types::{InputType, ValidationResult};
use super::validator::InputValidator;

/// Debounced wrapper around an [`InputValidator`].
#[derive(Debug)]
pub struct RealtimeValidator {
    validator: Arc<InputValidator>,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeValidator {
    /// Wrap `validator`, debouncing by its configured interval
    pub fn new(validator: Arc<InputValidator>) -> Self {
        let debounce = validator.config().debounce();
        Self {
            validator,
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Override the debounce interval
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Debounce interval
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Schedule validation of `input`; `callback` receives the result unless
    /// a newer call arrives first.
    pub fn validate_realtime<F>(&self, input: impl Into<String>, input_type: InputType, callback: F)
    where
        F: FnOnce(ValidationResult) + Send + 'static,
    {
        let input = input.into();
        let Ok(handle) = Handle::try_current() else {
            warn!("no tokio runtime, validating without debounce");
            callback(self.validator.validate(Some(&input), input_type));
            return;
        };

        let validator = Arc::clone(&self.validator);
        let delay = self.debounce;

        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback(validator.validate(Some(&input), input_type));
        });

        if let Ok(mut pending) = self.pending.lock() {
            if let Some(previous) = pending.replace(task) {
                trace!("superseding pending realtime validation");
                previous.abort();
            }
        }
    }

    /// Drop the pending validation, if any
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(task) = pending.take() {
                task.abort();
            }
        }
    }
}

impl Drop for RealtimeValidator {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::types::IssueKind;
    use tokio::sync::mpsc;

    fn realtime() -> RealtimeValidator {
        RealtimeValidator::new(Arc::new(InputValidator::new()))
            .with_debounce(Duration::from_millis(20))
    }

    #[test]
    fn test_default_debounce() {
        let validator = RealtimeValidator::new(Arc::new(InputValidator::new()));
        assert_eq!(validator.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_without_runtime_validates_immediately() {
        let validator = realtime();
        let (tx, rx) = std::sync::mpsc::channel();

        validator.validate_realtime("<script>x</script>", InputType::General, move |r| {
            let _ = tx.send(r);
        });

        let result = rx.try_recv().unwrap();
        assert!(result.has(IssueKind::XssDetected));
    }

    #[tokio::test]
    async fn test_last_call_wins() {
        let validator = realtime();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for input in ["a", "ab", "<script>x</script>"] {
            let tx = tx.clone();
            validator.validate_realtime(input, InputType::General, move |result| {
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let result = rx.recv().await.unwrap();
        assert!(!result.is_valid);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_separate_calls_both_run() {
        let validator = realtime();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        validator.validate_realtime("one", InputType::General, move |r| {
            let _ = first.send(r.sanitized_input);
        });
        assert_eq!(rx.recv().await.unwrap(), "one");

        validator.validate_realtime("two", InputType::General, move |r| {
            let _ = tx.send(r.sanitized_input);
        });
        assert_eq!(rx.recv().await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_cancel() {
        let validator = realtime();
        let (tx, mut rx) = mpsc::unbounded_channel::<ValidationResult>();

        validator.validate_realtime("pending", InputType::General, move |r| {
            let _ = tx.send(r);
        });
        validator.cancel();

        assert!(rx.recv().await.is_none());
    }
}
