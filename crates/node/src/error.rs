//! Scale node error types

use protocol::DeviceFingerprint;
use thiserror::Error;

/// Failures of the scale pipeline
///
/// Everything except `Transfer` happens before polling starts and stops the
/// process. A report that does not carry a weight is not an error at all;
/// see [`crate::usb::session::PollOutcome::Ignored`].
#[derive(Debug, Error)]
pub enum ScaleError {
    #[error("Failed to initialize USB subsystem: {0}")]
    Initialization(#[source] rusb::Error),

    #[error("Failed to enumerate USB devices: {0}")]
    Enumeration(#[source] rusb::Error),

    #[error("No USB scale found (wanted scale #{index} among {catalog_len} known models)")]
    DeviceNotFound { index: usize, catalog_len: usize },

    #[error("Failed to open USB scale at {location}: {source}")]
    Open {
        location: DeviceFingerprint,
        source: rusb::Error,
    },

    #[error("Failed to claim interface {interface}: {source}")]
    Claim { interface: u8, source: rusb::Error },

    #[error("Failed to resolve interrupt IN endpoint: {reason}")]
    EndpointResolution { reason: String },

    #[error("USB transfer failed: {0}")]
    Transfer(#[source] rusb::Error),

    #[error("Scale session is closed")]
    SessionClosed,
}

impl ScaleError {
    /// Startup step that produced the error, for fatal diagnostics
    pub fn step(&self) -> &'static str {
        match self {
            ScaleError::Initialization(_) => "usb init",
            ScaleError::Enumeration(_) => "enumerate",
            ScaleError::DeviceNotFound { .. } => "locate",
            ScaleError::Open { .. } => "open",
            ScaleError::Claim { .. } => "claim",
            ScaleError::EndpointResolution { .. } => "resolve endpoint",
            ScaleError::Transfer(_) | ScaleError::SessionClosed => "poll",
        }
    }
}
