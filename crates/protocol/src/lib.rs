//! Protocol library for usbscale-node
//!
//! This crate defines the bit-exact weigh report emitted by USB HID scales,
//! the decoding of that report into a weight measurement, and the catalog of
//! known scale models used to pick devices out of a USB enumeration.
//!
//! # Example
//!
//! ```
//! use protocol::decode_weight;
//!
//! // reportId=0x04, status=0x04, exponent=-2, raw=100
//! let weight = decode_weight(&[0x04, 0x04, 0x00, 0xFE, 0x64, 0x00]).unwrap();
//! assert_eq!(weight.value(), 1.0);
//! ```
//!
//! # Catalog
//!
//! ```
//! use protocol::{ScaleCatalog, ScaleIdentity};
//!
//! let catalog = ScaleCatalog::new(vec![ScaleIdentity::new(0x0922, 0x8003)]);
//! assert!(catalog.contains(0x0922, 0x8003));
//! assert!(!catalog.contains(0x0922, 0x8004));
//! ```

pub mod catalog;
pub mod error;
pub mod report;

pub use catalog::{DeviceFingerprint, ScaleCatalog, ScaleIdentity};
pub use error::{CatalogError, ReportError};
pub use report::{
    STATUS_WEIGHT_STABLE, WEIGH_REPORT_IDS, WEIGH_REPORT_SIZE, WeighReport, WeightMeasurement,
    decode_weight,
};
