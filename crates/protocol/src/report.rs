//! Weigh report decoding
//!
//! USB HID scales answer every interrupt-IN transfer with the same 6-byte
//! report:
//!
//! | byte | field                                  |
//! |------|----------------------------------------|
//! | 0    | report id (`0x03` or `0x04` for weight) |
//! | 1    | status (`0x04` = stable weight)         |
//! | 2    | unused                                 |
//! | 3    | exponent, signed                        |
//! | 4-5  | raw magnitude, little-endian `u16`      |
//!
//! The weight is `raw * 10^exponent`, in whatever unit the device reports.

use crate::error::ReportError;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Size of a weigh report in bytes
pub const WEIGH_REPORT_SIZE: usize = 6;

/// Report IDs that carry a weight
pub const WEIGH_REPORT_IDS: [u8; 2] = [0x03, 0x04];

/// Status byte of a final, stable weight
pub const STATUS_WEIGHT_STABLE: u8 = 0x04;

/// One raw weigh report as returned by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeighReport {
    pub report_id: u8,
    pub status: u8,
    pub exponent: i8,
    pub raw: u16,
}

impl WeighReport {
    /// Parse the fixed report layout
    ///
    /// Only the length is checked here; use [`WeighReport::measurement`] to
    /// apply the report id / status rules.
    pub fn parse(bytes: &[u8]) -> Result<Self, ReportError> {
        if bytes.len() != WEIGH_REPORT_SIZE {
            return Err(ReportError::Length {
                expected: WEIGH_REPORT_SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            report_id: bytes[0],
            status: bytes[1],
            exponent: bytes[3] as i8,
            raw: LittleEndian::read_u16(&bytes[4..6]),
        })
    }

    /// Whether the report id and status mark a final weight
    pub fn is_weighing(&self) -> bool {
        WEIGH_REPORT_IDS.contains(&self.report_id) && self.status == STATUS_WEIGHT_STABLE
    }

    /// Decode the report into a weight
    pub fn measurement(&self) -> Result<WeightMeasurement, ReportError> {
        if !WEIGH_REPORT_IDS.contains(&self.report_id) {
            return Err(ReportError::UnexpectedReportId(self.report_id));
        }
        if self.status != STATUS_WEIGHT_STABLE {
            return Err(ReportError::NotWeighing(self.status));
        }

        Ok(WeightMeasurement::from_raw(self.raw, self.exponent))
    }
}

/// A decoded weight
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightMeasurement(f64);

impl WeightMeasurement {
    /// `raw * 10^exponent`
    pub fn from_raw(raw: u16, exponent: i8) -> Self {
        Self(f64::from(raw) * 10f64.powf(f64::from(exponent)))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for WeightMeasurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Parse and validate a transfer payload in one step
pub fn decode_weight(bytes: &[u8]) -> Result<WeightMeasurement, ReportError> {
    WeighReport::parse(bytes)?.measurement()
}
