//! Input endpoint resolution
//!
//! Scales expose their weigh reports on an interrupt IN endpoint of the first
//! interface. There is no fallback address: a device whose descriptors do
//! not list one cannot be polled.

use crate::error::ScaleError;
use crate::usb::backend::{EndpointInfo, UsbBackend, UsbCandidate};
use rusb::TransferType;
use tracing::debug;

/// First interrupt IN endpoint in descriptor order
pub fn select_interrupt_in(endpoints: &[EndpointInfo]) -> Option<u8> {
    endpoints
        .iter()
        .find(|ep| ep.is_in() && ep.transfer_type == TransferType::Interrupt)
        .map(|ep| ep.address)
}

/// Read configuration 0 and return the scale's report endpoint
pub fn first_input_endpoint<B: UsbBackend>(
    backend: &B,
    device: &B::Device,
) -> Result<u8, ScaleError> {
    let endpoints = backend
        .first_interface_endpoints(device)
        .map_err(|e| ScaleError::EndpointResolution {
            reason: format!("failed to read configuration descriptor: {}", e),
        })?
        .ok_or_else(|| ScaleError::EndpointResolution {
            reason: "configuration 0 has no interface 0 / alternate setting 0".to_string(),
        })?;

    let address =
        select_interrupt_in(&endpoints).ok_or_else(|| ScaleError::EndpointResolution {
            reason: format!(
                "interface 0 lists {} endpoint(s), none of them interrupt IN",
                endpoints.len()
            ),
        })?;

    debug!(
        "Using interrupt IN endpoint {:#04x} on {}",
        address,
        device.fingerprint()
    );
    Ok(address)
}
