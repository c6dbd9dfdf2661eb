//! Vendor requests
//!
//! A template for device-specific control transfers. OUT requests carry a
//! payload that the device keeps; IN requests answer with a canned payload.

use crate::{
    device::Device,
    endpoint,
    error::{Error, Result},
    setup::SetupPacket,
    transport::Transport,
};
use usb_device::{UsbDirection, UsbError};

/// Answer to every vendor IN request
pub const VENDOR_REPLY: [u8; 8] = [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17];

/// Largest vendor OUT payload the device keeps
pub const VENDOR_PAYLOAD_CAPACITY: usize = 64;

/// The last vendor OUT payload
pub(crate) struct VendorPayload {
    buffer: [u8; VENDOR_PAYLOAD_CAPACITY],
    len: usize,
}

impl VendorPayload {
    pub(crate) const fn new() -> Self {
        VendorPayload {
            buffer: [0; VENDOR_PAYLOAD_CAPACITY],
            len: 0,
        }
    }

    fn store(&mut self, data: &[u8]) {
        let len = data.len().min(VENDOR_PAYLOAD_CAPACITY);
        self.buffer[..len].copy_from_slice(&data[..len]);
        self.len = len;
    }

    fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.len]
    }
}

impl<T: Transport> Device<T> {
    /// The payload of the last vendor OUT request, clipped to 64 bytes
    pub fn vendor_payload(&self) -> &[u8] {
        self.vendor.as_slice()
    }

    pub(crate) fn vendor_request(&mut self, setup: &SetupPacket) -> Result<()> {
        debug!("VENDOR {:?} LEN {}", setup.request(), setup.length());
        match setup.direction() {
            UsbDirection::Out if setup.length() == 0 => self.status_stage(),
            UsbDirection::Out => self.vendor_out(),
            UsbDirection::In => {
                if setup.length() as usize > VENDOR_REPLY.len() {
                    return Err(Error::InvalidLength);
                }
                self.reply[..VENDOR_REPLY.len()].copy_from_slice(&VENDOR_REPLY);
                self.reply_in(VENDOR_REPLY.len(), setup.length())
            }
        }
    }

    /// Receive the OUT data stage synchronously
    fn vendor_out(&mut self) -> Result<()> {
        let ep = endpoint::CONTROL_OUT.address();
        let timeouts = self.config.timeouts;

        self.transport.prime(ep)?;
        let transport = &mut self.transport;
        timeouts.prime.wait_while(|| transport.is_busy(ep))?;

        let lease = timeouts.data_stage.poll(|| match transport.receive(ep) {
            Err(UsbError::WouldBlock) => None,
            other => Some(other),
        })??;

        let data = self.transport.leased(&lease);
        self.transport.invalidate_dcache(data);
        self.vendor.store(data);
        self.transport.release(lease);

        self.status_stage()
    }
}
