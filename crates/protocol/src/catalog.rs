//! Known-scale catalog and device fingerprints
//!
//! The catalog is an ordinary value handed to the device locator, so tests
//! and config files can supply their own list of (VID, PID) pairs.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vendor/product pair of a supported scale model
///
/// Serialized as `"0xVVVV:0xPPPP"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScaleIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl ScaleIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Parse a `0x`-prefixed VID or PID
    fn parse_hex_id(id: &str, field: &'static str) -> Result<u16, CatalogError> {
        let invalid = || CatalogError::HexId {
            field,
            value: id.to_string(),
        };

        let hex_part = id
            .strip_prefix("0x")
            .or_else(|| id.strip_prefix("0X"))
            .ok_or_else(invalid)?;

        if hex_part.is_empty() || hex_part.len() > 4 {
            return Err(invalid());
        }

        u16::from_str_radix(hex_part, 16).map_err(|_| invalid())
    }
}

impl FromStr for ScaleIdentity {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 2 {
            return Err(CatalogError::Format(s.to_string()));
        }

        Ok(Self {
            vendor_id: Self::parse_hex_id(parts[0], "VID")?,
            product_id: Self::parse_hex_id(parts[1], "PID")?,
        })
    }
}

impl TryFrom<String> for ScaleIdentity {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScaleIdentity> for String {
    fn from(identity: ScaleIdentity) -> Self {
        identity.to_string()
    }
}

impl fmt::Display for ScaleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}:{:#06x}", self.vendor_id, self.product_id)
    }
}

/// Scales shipped in the built-in catalog
const KNOWN_SCALES: &[ScaleIdentity] = &[
    // Stamps.com Model 510 5LB
    ScaleIdentity::new(0x1446, 0x6a73),
    // USPS (Elane) PS311
    ScaleIdentity::new(0x7b7c, 0x0100),
    // Stamps.com stainless steel 5 lb
    ScaleIdentity::new(0x2474, 0x0550),
    // Stamps.com stainless steel 35 lb
    ScaleIdentity::new(0x2474, 0x3550),
    // Mettler Toledo
    ScaleIdentity::new(0x0eb8, 0xf000),
    // Sanford Dymo 10 lb
    ScaleIdentity::new(0x6096, 0x0158),
    // Fairbanks SCB-R9000
    ScaleIdentity::new(0x0b67, 0x555e),
    // Dymo M25
    ScaleIdentity::new(0x0922, 0x8004),
    // Dymo M10 / 1772057
    ScaleIdentity::new(0x0922, 0x8003),
];

/// Read-only list of scale models the locator accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaleCatalog(Vec<ScaleIdentity>);

impl ScaleCatalog {
    pub fn new(scales: Vec<ScaleIdentity>) -> Self {
        Self(scales)
    }

    /// Whether a VID/PID pair names a known scale
    pub fn contains(&self, vendor_id: u16, product_id: u16) -> bool {
        self.0
            .iter()
            .any(|s| s.vendor_id == vendor_id && s.product_id == product_id)
    }

    pub fn scales(&self) -> &[ScaleIdentity] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ScaleCatalog {
    fn default() -> Self {
        Self(KNOWN_SCALES.to_vec())
    }
}

/// `(bus << 8) | address` of one enumerated device
///
/// Only meaningful within a single enumeration pass; the address changes
/// when the device is replugged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceFingerprint(pub u16);

impl DeviceFingerprint {
    pub fn new(bus_number: u8, device_address: u8) -> Self {
        Self((u16::from(bus_number) << 8) | u16::from(device_address))
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus {:03} device {:03}", self.0 >> 8, self.0 & 0xff)
    }
}
