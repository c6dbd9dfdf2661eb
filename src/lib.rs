//! A USB CDC-ACM device protocol engine
//!
//! `usbps-cdc` implements the USB 2.0 chapter 9 device framework and a CDC-ACM
//! virtual serial port on top of an EHCI-style device controller. The engine
//! parses setup packets, answers standard, class, and vendor requests, builds
//! descriptors, and echoes serial data back to the host.
//!
//! The engine doesn't own the controller. It drives it through a [`Transport`],
//! which you implement for your controller's endpoint queues and DMA buffers.
//! Tests drive the same engine through a recording transport.
//!
//! # Usage
//!
//! Wrap a [`Device`] in a [`Controller`], keep the controller in a `static`,
//! and feed it the controller's interrupt status and endpoint completions:
//!
//! ```no_run
//! use cortex_m::interrupt::CriticalSection;
//! use usb_device::endpoint::EndpointAddress;
//! use usbps_cdc::{Controller, EndpointEvent, Interrupts, Transport};
//!
//! fn usb_interrupt<T: Transport>(
//!     controller: &Controller<T>,
//!     cs: &CriticalSection,
//!     status: Interrupts,
//!     setup_pending: bool,
//! ) {
//!     controller.on_interrupt(cs, status);
//!     if setup_pending {
//!         let ep0 = EndpointAddress::from(0x00);
//!         // Failed requests were already reported to the host
//!         let _ = controller.on_endpoint_event(cs, ep0, EndpointEvent::Setup);
//!     }
//! }
//!
//! fn poll<T: Transport>(controller: &Controller<T>) {
//!     if controller.link().is_host_connected() {
//!         let _ = controller.with_device(|device| device.send_data(b"hello\r\n"));
//!     }
//! }
//! ```
//!
//! # Features
//!
//! Enable `defmt-03` to log through `defmt`.

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod chapter9;
mod config;
mod device;
mod dispatch;
mod error;
mod interrupt;
mod ral;
mod register;
mod setup;
mod transport;
mod vendor;

pub mod cdc;
pub mod descriptor;
pub mod endpoint;

#[cfg(test)]
mod mock;

pub use config::{Config, Identity, Timeouts};
pub use device::{Device, DeviceState, UsbState};
pub use error::{Error, ErrorKind, Result};
pub use interrupt::{Controller, EndpointEvent, Interrupts, LinkStatus};
pub use setup::{DataStage, SetupPacket};
pub use transport::{BufferLease, Directions, DmaBuffer, RetryBudget, Transport, CACHE_LINE_SIZE};
pub use vendor::{VENDOR_PAYLOAD_CAPACITY, VENDOR_REPLY};
