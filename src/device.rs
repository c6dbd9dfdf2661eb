//! The device context
//!
//! A [`Device`] owns everything one USB device function needs: the endpoint
//! transport, the chapter 9 device state, and the CDC class state. Request
//! handlers are implemented on `Device` in their own modules.

use crate::{
    cdc::{CdcAcm, SerialState},
    config::Config,
    descriptor::MAX_DESCRIPTOR_LENGTH,
    endpoint,
    error::{Error, Result},
    setup::DataStage,
    transport::{Directions, DmaBuffer, Transport},
};

/// Visible device state, per USB 2.0 chapter 9
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum UsbState {
    /// Reset, no address yet
    Default,
    /// Addressed, not configured
    Addressed,
    /// Configured; class endpoints are live
    Configured,
}

/// Address, configuration, and alternate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub(crate) configuration: u8,
    pub(crate) address: u8,
    pub(crate) alternate_setting: u8,
}

impl DeviceState {
    const RESET: Self = DeviceState {
        configuration: 0,
        address: 0,
        alternate_setting: 0,
    };

    /// The selected configuration; 0 when unconfigured
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn alternate_setting(&self) -> u8 {
        self.alternate_setting
    }

    pub fn usb_state(&self) -> UsbState {
        if self.configuration != 0 {
            UsbState::Configured
        } else if self.address != 0 {
            UsbState::Addressed
        } else {
            UsbState::Default
        }
    }
}

/// Room for the largest control IN reply
pub(crate) const CONTROL_REPLY_CAPACITY: usize = MAX_DESCRIPTOR_LENGTH;

/// A CDC-ACM USB device
///
/// `Device` services endpoint 0 and the CDC endpoints through the transport
/// `T`. It keeps no global state, so tests (or a board with two
/// controllers) can create as many as they like.
///
/// Drive it from your USB interrupt, either directly or through a
/// [`Controller`](crate::Controller):
///
/// - call [`handle_setup()`](Device::handle_setup) when endpoint 0 reports a
///   setup packet;
/// - call [`handle_control_out()`](Device::handle_control_out) when endpoint 0
///   OUT completes a transfer;
/// - call [`receive_data()`](Device::receive_data) when the CDC bulk OUT
///   endpoint completes a transfer;
/// - call [`bus_reset()`](Device::bus_reset) on a USB reset.
pub struct Device<T> {
    pub(crate) transport: T,
    pub(crate) config: Config,
    pub(crate) state: DeviceState,
    pub(crate) cdc: CdcAcm,
    /// OUT data stage announced by the last setup packet
    pub(crate) pending: Option<DataStage>,
    pub(crate) reply: DmaBuffer<CONTROL_REPLY_CAPACITY>,
    pub(crate) vendor: crate::vendor::VendorPayload,
}

impl<T: Transport> Device<T> {
    /// Create a device in the default (unaddressed) state
    pub const fn new(transport: T, config: Config) -> Self {
        Device {
            transport,
            config,
            state: DeviceState::RESET,
            cdc: CdcAcm::new(),
            pending: None,
            reply: DmaBuffer::new(),
            vendor: crate::vendor::VendorPayload::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn cdc(&self) -> &CdcAcm {
        &self.cdc
    }

    pub fn is_configured(&self) -> bool {
        self.state.configuration != 0
    }

    /// Forget the address and configuration after a USB reset
    ///
    /// The controller disables its class endpoints on reset; this resets
    /// our view to match.
    pub fn bus_reset(&mut self) {
        debug!("BUS RESET");
        self.state = DeviceState::default();
        self.pending = None;
        self.cdc.reset();
    }

    /// Send data to the host on the CDC bulk IN endpoint
    ///
    /// See [`CdcAcm::send_data`].
    pub fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.cdc.send_data(&mut self.transport, data)
    }

    /// Take received CDC data and echo it to the host
    ///
    /// See [`CdcAcm::receive_data`].
    pub fn receive_data(&mut self) -> Result<usize> {
        self.cdc.receive_data(&mut self.transport)
    }

    /// Notify the host of a serial line state change
    pub fn send_serial_state(&mut self, state: SerialState) -> Result<()> {
        self.cdc.send_serial_state(&mut self.transport, state)
    }

    /// Send the first `len` reply bytes on endpoint 0 IN, clipped to the
    /// host's `wLength`
    pub(crate) fn reply_in(&mut self, len: usize, requested: u16) -> Result<()> {
        let len = len.min(requested as usize);
        let data = &self.reply[..len];
        self.transport.clean_dcache(data);
        self.transport
            .send(endpoint::CONTROL_IN.address(), data)
            .map_err(Error::from)
    }

    /// Acknowledge a request with a zero-length packet on endpoint 0 IN
    pub(crate) fn status_stage(&mut self) -> Result<()> {
        self.transport
            .send(endpoint::CONTROL_IN.address(), &[])
            .map_err(Error::from)
    }

    /// Stall both directions of endpoint 0
    ///
    /// The controller clears the stall when the next setup packet arrives.
    pub(crate) fn stall_control(&mut self) {
        self.transport.stall(0, Directions::IN | Directions::OUT);
    }
}
