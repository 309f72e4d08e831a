//! Protocol error types

use thiserror::Error;

/// Reasons a transfer's payload did not yield a weight
///
/// None of these are failures of the device or the bus. Scales emit
/// non-final reports (in motion, at zero, overload) all the time, and a
/// short read simply means nothing usable arrived this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReportError {
    /// Transfer returned a byte count other than the fixed report size
    #[error("Unexpected report length: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    /// First byte is not one of the weigh report IDs
    #[error("Unexpected report id {0:#04x}")]
    UnexpectedReportId(u8),

    /// Report carries a status other than a stable weight
    #[error("Report status {0:#04x} is not a stable weight")]
    NotWeighing(u8),
}

/// Errors parsing a scale identity (`0xVVVV:0xPPPP`)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Missing or extra `:` separator
    #[error("Invalid scale identity '{0}', expected VID:PID (e.g., '0x0922:0x8003')")]
    Format(String),

    /// VID or PID is not a `0x`-prefixed 1-4 digit hex number
    #[error("Invalid {field} '{value}', must be a 0x-prefixed hex number of 1-4 digits")]
    HexId { field: &'static str, value: String },
}
