//! In-memory USB bus for tests

use crate::usb::backend::{EndpointInfo, ScaleHandle, UsbBackend, UsbCandidate};
use protocol::DeviceFingerprint;
use rusb::TransferType;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the code under test did to the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbCall {
    Open(DeviceFingerprint),
    Detach(u8),
    Attach(u8),
    Claim(u8),
    Release(u8),
    Read(u8),
    Close,
}

type CallLog = Arc<Mutex<Vec<UsbCall>>>;
type ReadQueue = Arc<Mutex<VecDeque<Result<Vec<u8>, rusb::Error>>>>;

fn record(log: &CallLog, call: UsbCall) {
    log.lock().unwrap().push(call);
}

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub name: String,
    ids: Result<(u16, u16), rusb::Error>,
    bus: u8,
    address: u8,
}

impl FakeDevice {
    pub fn new(vendor_id: u16, product_id: u16, bus: u8, address: u8) -> Self {
        Self {
            name: format!("{:04x}:{:04x}@{}.{}", vendor_id, product_id, bus, address),
            ids: Ok((vendor_id, product_id)),
            bus,
            address,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_descriptor_error(mut self, error: rusb::Error) -> Self {
        self.ids = Err(error);
        self
    }
}

impl UsbCandidate for FakeDevice {
    fn device_ids(&self) -> Result<(u16, u16), rusb::Error> {
        self.ids
    }

    fn bus_number(&self) -> u8 {
        self.bus
    }

    fn address(&self) -> u8 {
        self.address
    }
}

pub struct FakeHandle {
    log: CallLog,
    reads: ReadQueue,
    driver_active: bool,
    claim_error: Option<rusb::Error>,
}

impl ScaleHandle for FakeHandle {
    fn kernel_driver_active(&self, _interface: u8) -> Result<bool, rusb::Error> {
        Ok(self.driver_active)
    }

    fn detach_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        record(&self.log, UsbCall::Detach(interface));
        self.driver_active = false;
        Ok(())
    }

    fn attach_driver(&mut self, interface: u8) -> Result<(), rusb::Error> {
        record(&self.log, UsbCall::Attach(interface));
        self.driver_active = true;
        Ok(())
    }

    fn claim(&mut self, interface: u8) -> Result<(), rusb::Error> {
        if let Some(error) = self.claim_error {
            return Err(error);
        }
        record(&self.log, UsbCall::Claim(interface));
        Ok(())
    }

    fn release(&mut self, interface: u8) -> Result<(), rusb::Error> {
        record(&self.log, UsbCall::Release(interface));
        Ok(())
    }

    fn read_interrupt_report(
        &self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        record(&self.log, UsbCall::Read(endpoint));
        let next = self.reads.lock().unwrap().pop_front();
        match next {
            Some(Ok(bytes)) => {
                let len = bytes.len().min(buf.len());
                buf[..len].copy_from_slice(&bytes[..len]);
                Ok(len)
            }
            Some(Err(error)) => Err(error),
            None => Err(rusb::Error::Timeout),
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        record(&self.log, UsbCall::Close);
    }
}

/// Scriptable backend
///
/// Reads not queued with [`FakeBackend::queue_read`] time out.
pub struct FakeBackend {
    devices: Arc<Mutex<Vec<FakeDevice>>>,
    enumeration_error: Option<rusb::Error>,
    open_error: Option<rusb::Error>,
    detach_supported: bool,
    driver_active: bool,
    claim_error: Option<rusb::Error>,
    endpoints: Result<Option<Vec<EndpointInfo>>, rusb::Error>,
    reads: ReadQueue,
    log: CallLog,
}

impl FakeBackend {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
            enumeration_error: None,
            open_error: None,
            detach_supported: true,
            driver_active: true,
            claim_error: None,
            endpoints: Ok(Some(vec![EndpointInfo {
                address: 0x81,
                transfer_type: TransferType::Interrupt,
            }])),
            reads: Arc::default(),
            log: Arc::default(),
        }
    }

    /// One scale at bus 1, address 5
    pub fn with_scale() -> Self {
        Self::new(vec![FakeDevice::new(0x0922, 0x8003, 1, 5)])
    }

    pub fn with_enumeration_error(mut self, error: rusb::Error) -> Self {
        self.enumeration_error = Some(error);
        self
    }

    pub fn with_open_error(mut self, error: rusb::Error) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn with_detach_support(mut self, supported: bool) -> Self {
        self.detach_supported = supported;
        self
    }

    pub fn with_active_driver(mut self, active: bool) -> Self {
        self.driver_active = active;
        self
    }

    pub fn with_claim_error(mut self, error: rusb::Error) -> Self {
        self.claim_error = Some(error);
        self
    }

    pub fn with_endpoints(mut self, endpoints: Result<Option<Vec<EndpointInfo>>, rusb::Error>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn queue_read(&self, read: Result<Vec<u8>, rusb::Error>) {
        self.reads.lock().unwrap().push_back(read);
    }

    /// Replace the attached devices, as if the bus was replugged
    pub fn set_devices(&self, devices: Vec<FakeDevice>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn calls(&self) -> Vec<UsbCall> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, call: UsbCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    /// Second handle onto the same bus, sharing devices, reads and call log
    pub fn share(&self) -> Self {
        Self {
            devices: Arc::clone(&self.devices),
            enumeration_error: self.enumeration_error,
            open_error: self.open_error,
            detach_supported: self.detach_supported,
            driver_active: self.driver_active,
            claim_error: self.claim_error,
            endpoints: self.endpoints.clone(),
            reads: Arc::clone(&self.reads),
            log: Arc::clone(&self.log),
        }
    }
}

impl UsbBackend for FakeBackend {
    type Device = FakeDevice;
    type Handle = FakeHandle;

    fn devices(&self) -> Result<Vec<FakeDevice>, rusb::Error> {
        match self.enumeration_error {
            Some(error) => Err(error),
            None => Ok(self.devices.lock().unwrap().clone()),
        }
    }

    fn open(&self, device: &FakeDevice) -> Result<FakeHandle, rusb::Error> {
        if let Some(error) = self.open_error {
            return Err(error);
        }
        record(&self.log, UsbCall::Open(device.fingerprint()));
        Ok(FakeHandle {
            log: Arc::clone(&self.log),
            reads: Arc::clone(&self.reads),
            driver_active: self.driver_active,
            claim_error: self.claim_error,
        })
    }

    fn first_interface_endpoints(
        &self,
        _device: &FakeDevice,
    ) -> Result<Option<Vec<EndpointInfo>>, rusb::Error> {
        self.endpoints.clone()
    }

    fn supports_detach_kernel_driver(&self) -> bool {
        self.detach_supported
    }
}
