//! Setup packets, and the request codes they carry

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use usb_device::{
    control::{Recipient, RequestType},
    UsbDirection,
};
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16};

/// The 8-byte header of a control transfer
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes, Unaligned)]
pub struct SetupPacket {
    request_type: u8,
    request: u8,
    value: U16<LittleEndian>,
    index: U16<LittleEndian>,
    length: U16<LittleEndian>,
}

const _: [(); 1] = [(); (core::mem::size_of::<SetupPacket>() == 8) as usize];

impl SetupPacket {
    pub fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        SetupPacket {
            request_type,
            request,
            value: U16::new(value),
            index: U16::new(index),
            length: U16::new(length),
        }
    }

    /// Interpret the wire bytes of a setup packet
    ///
    /// Returns `None` unless `bytes` is exactly 8 bytes long.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        LayoutVerified::<_, SetupPacket>::new(bytes).map(|setup| *setup)
    }

    /// `bmRequestType`
    pub fn request_type(&self) -> u8 {
        self.request_type
    }

    /// `bRequest`
    pub fn request(&self) -> u8 {
        self.request
    }

    /// `wValue`
    pub fn value(&self) -> u16 {
        self.value.get()
    }

    /// `wIndex`
    pub fn index(&self) -> u16 {
        self.index.get()
    }

    /// `wLength`
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// Data stage direction
    pub fn direction(&self) -> UsbDirection {
        if self.request_type & 0x80 != 0 {
            UsbDirection::In
        } else {
            UsbDirection::Out
        }
    }

    /// Standard, class, vendor, or reserved
    pub fn category(&self) -> RequestType {
        match (self.request_type >> 5) & 0b11 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match self.request_type & 0b1_1111 {
            0 => Recipient::Device,
            1 => Recipient::Interface,
            2 => Recipient::Endpoint,
            3 => Recipient::Other,
            _ => Recipient::Reserved,
        }
    }
}

impl core::fmt::Debug for SetupPacket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SetupPacket")
            .field("request_type", &self.request_type)
            .field("request", &self.request)
            .field("value", &self.value())
            .field("index", &self.index())
            .field("length", &self.length())
            .finish()
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for SetupPacket {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "SetupPacket {{ request_type: {=u8:#x}, request: {=u8:#x}, value: {=u16:#x}, index: {=u16:#x}, length: {=u16} }}",
            self.request_type,
            self.request,
            self.value(),
            self.index(),
            self.length()
        )
    }
}

/// A control OUT data stage that the host announced, but hasn't sent yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum DataStage {
    /// Seven bytes of CDC line coding
    LineCoding,
    /// Payload we accept and throw away
    Discard,
}

/// Chapter 9 standard request codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum StandardRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    SetAddress = 0x05,
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
    SetSel = 0x30,
    SetIsochDelay = 0x31,
}

/// Feature selectors for SET_FEATURE and CLEAR_FEATURE
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum Feature {
    EndpointHalt = 0,
    DeviceRemoteWakeup = 1,
    TestMode = 2,
}

/// Port test modes selectable by SET_FEATURE(TEST_MODE)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum TestSelector {
    J = 1,
    K = 2,
    Se0Nak = 3,
    Packet = 4,
    ForceEnable = 5,
}

/// CDC class request codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ClassRequest {
    SendEncapsulatedCommand = 0x00,
    GetEncapsulatedResponse = 0x01,
    SetCommFeature = 0x02,
    GetCommFeature = 0x03,
    ClearCommFeature = 0x04,
    SetLineCoding = 0x20,
    GetLineCoding = 0x21,
    SetControlLineState = 0x22,
    SendBreak = 0x23,
}

#[cfg(test)]
mod tests {
    use super::{SetupPacket, StandardRequest};
    use num_traits::FromPrimitive;
    use usb_device::{
        control::{Recipient, RequestType},
        UsbDirection,
    };
    use zerocopy::AsBytes;

    #[test]
    fn parse_get_descriptor() {
        let setup = SetupPacket::parse(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]).unwrap();
        assert_eq!(setup.request_type(), 0x80);
        assert_eq!(setup.value(), 0x0100);
        assert_eq!(setup.index(), 0);
        assert_eq!(setup.length(), 64);
        assert_eq!(setup.direction(), UsbDirection::In);
        assert_eq!(setup.category(), RequestType::Standard);
        assert_eq!(setup.recipient(), Recipient::Device);
        assert_eq!(
            StandardRequest::from_u8(setup.request()),
            Some(StandardRequest::GetDescriptor)
        );
    }

    #[test]
    fn parse_rejects_short_packets() {
        assert!(SetupPacket::parse(&[0x80, 0x06, 0x00, 0x01]).is_none());
    }

    #[test]
    fn wire_order() {
        let setup = SetupPacket::new(0x21, 0x20, 0x1234, 0x0002, 7);
        assert_eq!(
            setup.as_bytes(),
            &[0x21, 0x20, 0x34, 0x12, 0x02, 0x00, 0x07, 0x00]
        );
    }

    #[test]
    fn categories() {
        assert_eq!(SetupPacket::new(0x21, 0, 0, 0, 0).category(), RequestType::Class);
        assert_eq!(SetupPacket::new(0xC0, 0, 0, 0, 0).category(), RequestType::Vendor);
        assert_eq!(SetupPacket::new(0x60, 0, 0, 0, 0).category(), RequestType::Reserved);
        assert_eq!(SetupPacket::new(0x02, 0, 0, 0, 0).recipient(), Recipient::Endpoint);
        assert_eq!(SetupPacket::new(0x1F, 0, 0, 0, 0).recipient(), Recipient::Reserved);
    }

    #[test]
    fn unknown_requests() {
        assert_eq!(StandardRequest::from_u8(0x02), None);
        assert_eq!(StandardRequest::from_u8(0x31), Some(StandardRequest::SetIsochDelay));
    }
}
