//! Test utilities for usbscale-node
//!
//! Provides report builders, a recording sink and async helpers for testing
//! across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::weigh_report;
//!
//! let bytes = weigh_report(0x03, 0x04, -2, 100);
//! assert_eq!(bytes, [0x03, 0x04, 0x00, 0xFE, 0x64, 0x00]);
//! ```

use crate::publish::{MeasurementSink, WeightMessage};
use protocol::{STATUS_WEIGHT_STABLE, WEIGH_REPORT_SIZE, WeightMeasurement};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build a raw weigh report
///
/// # Arguments
/// * `report_id` - Byte 0
/// * `status` - Byte 1
/// * `exponent` - Byte 3, signed
/// * `raw` - Bytes 4-5, little-endian
pub fn weigh_report(report_id: u8, status: u8, exponent: i8, raw: u16) -> [u8; WEIGH_REPORT_SIZE] {
    let [lo, hi] = raw.to_le_bytes();
    [report_id, status, 0x00, exponent as u8, lo, hi]
}

/// Build a report that decodes to `raw * 10^exponent`
pub fn stable_weight_report(exponent: i8, raw: u16) -> [u8; WEIGH_REPORT_SIZE] {
    weigh_report(0x03, STATUS_WEIGHT_STABLE, exponent, raw)
}

/// Sink that keeps every published message in memory
///
/// Clones share the same message list, so a test can keep one clone and
/// hand the other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<WeightMessage>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn messages(&self) -> Vec<WeightMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl MeasurementSink for RecordingSink {
    fn publish(&mut self, topic: &str, weight: WeightMeasurement) -> crate::Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(WeightMessage {
                topic: topic.to_string(),
                data: weight.value(),
            });
        }
        Ok(())
    }
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
///
/// # Example
/// ```ignore
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// #[tokio::test]
/// async fn test_with_timeout() {
///     let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
///     assert_eq!(result, 42);
/// }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
