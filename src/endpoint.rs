//! The endpoint configuration table, and endpoint activation
//!
//! [`ENDPOINTS`] is the only place that names endpoint numbers, directions,
//! and transfer types. The configuration descriptor is built from it, and
//! endpoint activation programs the controller from it, so the host and the
//! controller always agree.

use crate::{
    ral,
    register::{self, EndptCtrl},
    transport::Transport,
};
use usb_device::{endpoint::EndpointAddress, UsbDirection, UsbError};

/// Transfer type, encoded the way `ENDPTCTRL` and `bmAttributes` expect
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// What an endpoint is used for
///
/// The interrupt front-end routes endpoint events by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Role {
    /// Endpoint 0, both directions
    Control,
    /// CDC bulk data, both directions
    CdcData,
    /// CDC interrupt notifications
    CdcNotification,
}

/// One endpoint half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    /// `bEndpointAddress`: number in bits 0..4, IN in bit 7
    pub address: u8,
    pub kind: TransferType,
    pub max_packet_size: u16,
    /// Transfer buffers the transport should reserve
    pub buffers: u8,
    /// `bInterval`, meaningful for interrupt endpoints
    pub interval: u8,
    pub role: Role,
}

impl EndpointConfig {
    pub fn address(&self) -> EndpointAddress {
        EndpointAddress::from(self.address)
    }

    pub const fn number(&self) -> usize {
        (self.address & 0x0F) as usize
    }

    pub const fn direction(&self) -> UsbDirection {
        if self.address & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }
}

/// Maximum packet size of endpoint 0
pub const CONTROL_MAX_PACKET_SIZE: u16 = 64;

/// Largest transfer the bulk OUT endpoint delivers at once
pub const DATA_OUT_BUFFER_SIZE: usize = 512;

/// Endpoint 0 OUT: setup packets and control OUT data stages
pub const CONTROL_OUT: EndpointConfig = EndpointConfig {
    address: 0x00,
    kind: TransferType::Control,
    max_packet_size: CONTROL_MAX_PACKET_SIZE,
    buffers: 2,
    interval: 0,
    role: Role::Control,
};

/// Endpoint 0 IN: control replies and status stages
pub const CONTROL_IN: EndpointConfig = EndpointConfig {
    address: 0x80,
    ..CONTROL_OUT
};

/// CDC bulk OUT: data from the host
pub const DATA_OUT: EndpointConfig = EndpointConfig {
    address: 0x01,
    kind: TransferType::Bulk,
    max_packet_size: 64,
    buffers: 16,
    interval: 0,
    role: Role::CdcData,
};

/// CDC bulk IN: data to the host
pub const DATA_IN: EndpointConfig = EndpointConfig {
    address: 0x81,
    ..DATA_OUT
};

/// CDC interrupt IN: serial state notifications
pub const NOTIFY_IN: EndpointConfig = EndpointConfig {
    address: 0x82,
    kind: TransferType::Interrupt,
    max_packet_size: 16,
    buffers: 2,
    interval: 0xFF,
    role: Role::CdcNotification,
};

/// The endpoint table, for constant evaluation
pub(crate) const TABLE: [EndpointConfig; 5] = [CONTROL_OUT, CONTROL_IN, DATA_OUT, DATA_IN, NOTIFY_IN];

/// Every endpoint the device uses
pub static ENDPOINTS: [EndpointConfig; 5] = TABLE;

/// Look up an endpoint by its `bEndpointAddress`
///
/// Only the number and direction bits of `address` are considered.
pub fn find(address: u8) -> Option<&'static EndpointConfig> {
    let address = address & 0x8F;
    ENDPOINTS.iter().find(|ep| ep.address == address)
}

/// Stall or unstall one endpoint half
///
/// Unstalling also resets the data toggle, so the next transfer starts
/// with DATA0.
pub fn set_stalled<T: Transport + ?Sized>(transport: &mut T, ep: &EndpointConfig, stall: bool) {
    let reset = !stall as u32;
    ral::with_endpoint_control(transport, ep.number(), |endptctrl| {
        match ep.direction() {
            UsbDirection::In => {
                ral::modify_reg!(register, endptctrl, ENDPTCTRL, TXS: stall as u32, TXR: reset)
            }
            UsbDirection::Out => {
                ral::modify_reg!(register, endptctrl, ENDPTCTRL, RXS: stall as u32, RXR: reset)
            }
        }
    });
}

/// Indicates if the endpoint half is stalled
pub fn is_stalled<T: Transport + ?Sized>(transport: &T, ep: &EndpointConfig) -> bool {
    let endptctrl = ral::endpoint_control(transport, ep.number());
    match ep.direction() {
        UsbDirection::In => ral::read_reg!(register, &endptctrl, ENDPTCTRL, TXS == 1),
        UsbDirection::Out => ral::read_reg!(register, &endptctrl, ENDPTCTRL, RXS == 1),
    }
}

fn enable_one(endptctrl: &EndptCtrl, ep: &EndpointConfig) {
    let kind = ep.kind as u32;
    match ep.direction() {
        UsbDirection::In => {
            ral::modify_reg!(register, endptctrl, ENDPTCTRL, TXE: 1, TXR: 1, TXT: kind)
        }
        UsbDirection::Out => {
            ral::modify_reg!(register, endptctrl, ENDPTCTRL, RXE: 1, RXR: 1, RXT: kind)
        }
    }
}

/// Enable every class endpoint, and prime the OUT endpoints
///
/// Call once the host selects a non-zero configuration. Endpoint 0 is
/// always enabled, and it's left alone.
pub fn activate<T: Transport + ?Sized>(transport: &mut T) -> Result<(), UsbError> {
    for ep in ENDPOINTS.iter().filter(|ep| ep.number() != 0) {
        transport.enable(ep.address());
        let value = ral::with_endpoint_control(transport, ep.number(), |endptctrl| {
            enable_one(endptctrl, ep)
        });
        debug!("ENABLE EP{} ENDPTCTRL {:?}", ep.address, value);
    }
    for ep in ENDPOINTS
        .iter()
        .filter(|ep| ep.number() != 0 && ep.direction() == UsbDirection::Out)
    {
        transport.prime(ep.address())?;
    }
    Ok(())
}

/// Disable every class endpoint
///
/// Call when the host returns the device to the address state.
pub fn deactivate<T: Transport + ?Sized>(transport: &mut T) {
    for ep in ENDPOINTS.iter().filter(|ep| ep.number() != 0) {
        ral::with_endpoint_control(transport, ep.number(), |endptctrl| match ep.direction() {
            UsbDirection::In => ral::modify_reg!(register, endptctrl, ENDPTCTRL, TXE: 0),
            UsbDirection::Out => ral::modify_reg!(register, endptctrl, ENDPTCTRL, RXE: 0),
        });
    }
}
