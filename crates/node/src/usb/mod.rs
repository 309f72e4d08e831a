//! USB scale access
//!
//! Discovery, session lifecycle and the polling worker thread. All libusb
//! calls go through the [`backend`] traits.

pub mod backend;
pub mod endpoint;
#[cfg(test)]
pub mod fake;
pub mod locator;
pub mod session;
pub mod worker;

pub use backend::{RusbBackend, UsbBackend, UsbCandidate};
pub use locator::{list_scales, locate_scale};
pub use session::{ScaleSession, SessionOptions};
pub use worker::{RecoveryPolicy, WorkerSettings, spawn_scale_worker};
