//! Scale discovery
//!
//! Walks one enumeration snapshot and picks out the devices whose VID/PID is
//! in the catalog. libusb can list the same physical device more than once
//! in a row (one entry per configuration on some hosts); consecutive matches
//! with the same bus/address fingerprint count as one scale.

use crate::error::ScaleError;
use crate::usb::backend::{UsbBackend, UsbCandidate};
use protocol::{DeviceFingerprint, ScaleCatalog};
use tracing::{debug, info};

/// Stateful filter over one enumeration pass
struct DistinctScales<'a> {
    catalog: &'a ScaleCatalog,
    last_accepted: Option<DeviceFingerprint>,
}

impl<'a> DistinctScales<'a> {
    fn new(catalog: &'a ScaleCatalog) -> Self {
        Self {
            catalog,
            last_accepted: None,
        }
    }

    /// Whether `device` is a catalog match distinct from the previous one
    fn accept<D: UsbCandidate>(&mut self, device: &D) -> bool {
        let (vendor_id, product_id) = match device.device_ids() {
            Ok(ids) => ids,
            Err(e) => {
                debug!(
                    "Skipping {}: failed to read device descriptor: {}",
                    device.fingerprint(),
                    e
                );
                return false;
            }
        };

        if !self.catalog.contains(vendor_id, product_id) {
            return false;
        }

        let fingerprint = device.fingerprint();
        if self.last_accepted == Some(fingerprint) {
            debug!(
                "Skipping duplicate enumeration of {:04x}:{:04x} at {}",
                vendor_id, product_id, fingerprint
            );
            return false;
        }

        self.last_accepted = Some(fingerprint);
        true
    }
}

/// The `index`-th (1-based) distinct scale, if there are that many
pub fn find_nth_scale<D, I>(devices: I, catalog: &ScaleCatalog, index: usize) -> Option<D>
where
    D: UsbCandidate,
    I: IntoIterator<Item = D>,
{
    let position = index.checked_sub(1)?;
    let mut scales = DistinctScales::new(catalog);
    devices
        .into_iter()
        .filter(|device| scales.accept(device))
        .nth(position)
}

/// Every distinct scale in the snapshot
pub fn list_scales<D, I>(devices: I, catalog: &ScaleCatalog) -> Vec<D>
where
    D: UsbCandidate,
    I: IntoIterator<Item = D>,
{
    let mut scales = DistinctScales::new(catalog);
    devices
        .into_iter()
        .filter(|device| scales.accept(device))
        .collect()
}

/// Enumerate the bus and pick scale `index`
pub fn locate_scale<B: UsbBackend>(
    backend: &B,
    catalog: &ScaleCatalog,
    index: usize,
) -> Result<B::Device, ScaleError> {
    let devices = backend.devices().map_err(ScaleError::Enumeration)?;
    debug!("Enumerated {} USB devices", devices.len());

    let device = find_nth_scale(devices, catalog, index).ok_or(ScaleError::DeviceNotFound {
        index,
        catalog_len: catalog.len(),
    })?;

    info!("Found USB scale #{} at {}", index, device.fingerprint());
    Ok(device)
}
