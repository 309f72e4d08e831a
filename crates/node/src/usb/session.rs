//! Scale session
//!
//! Owns one open scale: the handle, the claimed interface and the cached
//! report endpoint. The session never sleeps or schedules; the caller drives
//! it by calling [`ScaleSession::poll_once`] at its own cadence.
//!
//! Teardown runs from [`ScaleSession::close`] or `Drop`, whichever comes
//! first, and only undoes the steps that actually succeeded.

use crate::error::ScaleError;
use crate::usb::backend::{ScaleHandle, UsbBackend, UsbCandidate};
use crate::usb::endpoint::first_input_endpoint;
use protocol::{DeviceFingerprint, ReportError, WEIGH_REPORT_SIZE, WeightMeasurement, decode_weight};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interface carrying the weigh reports
pub const SCALE_INTERFACE: u8 = 0;

/// Default bound on one interrupt transfer
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub transfer_timeout: Duration,
    /// Log ignored reports; never changes what gets decoded
    pub verbose: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    Claimed,
    Polling,
    Closed,
}

/// Result of one successful transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    Measurement(WeightMeasurement),
    /// Transfer worked but carried no final weight
    Ignored(ReportError),
}

pub struct ScaleSession<H: ScaleHandle> {
    handle: Option<H>,
    location: DeviceFingerprint,
    endpoint: u8,
    interface_claimed: bool,
    driver_detached: bool,
    state: SessionState,
    options: SessionOptions,
}

impl<H: ScaleHandle> ScaleSession<H> {
    /// Open, claim and resolve the endpoint of a located scale
    ///
    /// On error everything acquired so far is released before returning.
    pub fn open<B>(backend: &B, device: &B::Device, options: SessionOptions) -> Result<Self, ScaleError>
    where
        B: UsbBackend<Handle = H>,
    {
        let location = device.fingerprint();
        let handle = backend
            .open(device)
            .map_err(|source| ScaleError::Open { location, source })?;
        debug!("Opened USB scale at {}", location);

        let mut session = Self {
            handle: Some(handle),
            location,
            endpoint: 0,
            interface_claimed: false,
            driver_detached: false,
            state: SessionState::Opened,
            options,
        };

        session.claim(backend.supports_detach_kernel_driver())?;
        session.endpoint = first_input_endpoint(backend, device)?;
        session.state = SessionState::Polling;

        info!(
            "USB scale ready at {} (endpoint {:#04x})",
            location, session.endpoint
        );
        Ok(session)
    }

    fn claim(&mut self, detach_supported: bool) -> Result<(), ScaleError> {
        let handle = self.handle.as_mut().ok_or(ScaleError::SessionClosed)?;

        if detach_supported {
            match handle.kernel_driver_active(SCALE_INTERFACE) {
                Ok(true) => match handle.detach_driver(SCALE_INTERFACE) {
                    Ok(()) => {
                        debug!("Detached kernel driver from interface {}", SCALE_INTERFACE);
                        self.driver_detached = true;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to detach kernel driver from interface {}: {}",
                            SCALE_INTERFACE, e
                        );
                    }
                },
                Ok(false) => {
                    debug!("No kernel driver active on interface {}", SCALE_INTERFACE);
                }
                Err(e) => {
                    debug!(
                        "Could not check kernel driver status for interface {}: {}",
                        SCALE_INTERFACE, e
                    );
                }
            }
        }

        handle
            .claim(SCALE_INTERFACE)
            .map_err(|source| ScaleError::Claim {
                interface: SCALE_INTERFACE,
                source,
            })?;

        self.interface_claimed = true;
        self.state = SessionState::Claimed;
        debug!("Claimed interface {} on {}", SCALE_INTERFACE, self.location);
        Ok(())
    }

    /// One interrupt transfer plus decode
    ///
    /// `Err` only for a failed transfer; the session stays usable.
    pub fn poll_once(&mut self) -> Result<PollOutcome, ScaleError> {
        if self.state != SessionState::Polling {
            return Err(ScaleError::SessionClosed);
        }
        let handle = self.handle.as_ref().ok_or(ScaleError::SessionClosed)?;

        let mut buf = [0u8; WEIGH_REPORT_SIZE];
        let transferred = handle
            .read_interrupt_report(self.endpoint, &mut buf, self.options.transfer_timeout)
            .map_err(ScaleError::Transfer)?;

        match decode_weight(&buf[..transferred]) {
            Ok(weight) => {
                info!("Weight: {}", weight);
                if self.options.verbose {
                    debug!("Weight (raw): {:?} from {:02x?}", weight.value(), &buf);
                }
                Ok(PollOutcome::Measurement(weight))
            }
            Err(reason) => {
                if self.options.verbose {
                    match reason {
                        ReportError::Length { actual, .. } => {
                            debug!("Short transfer ({} bytes)", actual)
                        }
                        _ => debug!("Ignoring report {:02x?}: {}", &buf, reason),
                    }
                }
                Ok(PollOutcome::Ignored(reason))
            }
        }
    }

    /// Release the interface, give the driver back, close the handle
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) {
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        if self.interface_claimed {
            if let Err(e) = handle.release(SCALE_INTERFACE) {
                warn!("Failed to release interface {}: {}", SCALE_INTERFACE, e);
            }
            self.interface_claimed = false;
        }

        if self.driver_detached {
            match handle.attach_driver(SCALE_INTERFACE) {
                Ok(()) => debug!("Reattached kernel driver to interface {}", SCALE_INTERFACE),
                Err(e) => warn!(
                    "Failed to reattach kernel driver to interface {}: {}",
                    SCALE_INTERFACE, e
                ),
            }
            self.driver_detached = false;
        }

        drop(handle);
        self.state = SessionState::Closed;
        info!("Closed USB scale at {}", self.location);
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> u8 {
        self.endpoint
    }

    pub fn location(&self) -> DeviceFingerprint {
        self.location
    }
}

impl<H: ScaleHandle> Drop for ScaleSession<H> {
    fn drop(&mut self) {
        self.close();
    }
}
