//! Common utilities for usbscale-node
//!
//! This crate provides the pieces shared by the node binary and its tests:
//! error handling, logging setup, the measurement sink, and the async channel
//! bridge between the Tokio runtime and the blocking scale worker thread.

pub mod channel;
pub mod error;
pub mod logging;
pub mod publish;
pub mod test_utils;

pub use channel::{ScaleBridge, ScaleCommand, ScaleEvent, ScaleWorker, create_scale_bridge};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use publish::{JsonLinesSink, MeasurementSink, WeightMessage};
