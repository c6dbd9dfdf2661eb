//! CDC Abstract Control Model (virtual serial port) class engine
//!
//! [`CdcAcm`] owns the serial link state the host negotiates over endpoint 0:
//! line coding, and the DTR / RTS control lines. It also moves data on the
//! CDC endpoints. Received data is echoed back to the host, prefixed with
//! a running sequence number.

use crate::{
    descriptor::COMM_INTERFACE,
    endpoint::{self, DATA_OUT_BUFFER_SIZE},
    error::{Error, Result},
    setup::{ClassRequest, DataStage, SetupPacket},
    transport::{DmaBuffer, Transport},
};
use byteorder::LittleEndian;
use core::fmt::{self, Write as _};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use usb_device::UsbError;
use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16, U32};

/// Stop bits (`bCharFormat`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum StopBits {
    One = 0,
    OnePointFive = 1,
    Two = 2,
}

/// Parity (`bParityType`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

#[repr(C)]
#[derive(AsBytes, FromBytes, Unaligned)]
struct LineCodingWire {
    data_rate: U32<LittleEndian>,
    char_format: u8,
    parity_type: u8,
    data_bits: u8,
}

/// Size of a line coding on the wire
pub const LINE_CODING_LENGTH: usize = core::mem::size_of::<LineCodingWire>();

const _: [(); 1] = [(); (LINE_CODING_LENGTH == 7) as usize];

/// Serial link parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct LineCoding {
    pub data_rate: u32,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub data_bits: u8,
}

impl Default for LineCoding {
    /// 115200 8N1
    fn default() -> Self {
        LineCoding {
            data_rate: 115_200,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: 8,
        }
    }
}

impl LineCoding {
    /// Decode a SET_LINE_CODING payload
    ///
    /// The payload must be exactly 7 bytes, with known stop bit and parity
    /// codes, and 5, 6, 7, or 8 data bits.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let wire = LayoutVerified::<_, LineCodingWire>::new(bytes).ok_or(Error::InvalidLength)?;
        let stop_bits = StopBits::from_u8(wire.char_format).ok_or(Error::InvalidValue)?;
        let parity = Parity::from_u8(wire.parity_type).ok_or(Error::InvalidValue)?;
        if !matches!(wire.data_bits, 5..=8) {
            return Err(Error::InvalidValue);
        }
        Ok(LineCoding {
            data_rate: wire.data_rate.get(),
            stop_bits,
            parity,
            data_bits: wire.data_bits,
        })
    }

    /// The 7 byte wire form
    pub fn to_bytes(&self) -> [u8; LINE_CODING_LENGTH] {
        let wire = LineCodingWire {
            data_rate: U32::new(self.data_rate),
            char_format: self.stop_bits as u8,
            parity_type: self.parity as u8,
            data_bits: self.data_bits,
        };
        let mut bytes = [0; LINE_CODING_LENGTH];
        bytes.copy_from_slice(wire.as_bytes());
        bytes
    }
}

impl fmt::Display for LineCoding {
    /// Formats like `115200 8N1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        write!(f, "{} {}{}{}", self.data_rate, self.data_bits, parity, stop_bits)
    }
}

bitflags::bitflags! {
    /// SET_CONTROL_LINE_STATE bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlLines : u16 {
        /// Data terminal ready: the host has the port open
        const DTR = 1 << 0;
        /// Request to send
        const RTS = 1 << 1;
    }
}

bitflags::bitflags! {
    /// SERIAL_STATE notification bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SerialState : u16 {
        /// Data carrier detect
        const DCD = 1 << 0;
        /// Data set ready
        const DSR = 1 << 1;
        const BREAK = 1 << 2;
        const RING = 1 << 3;
        const FRAMING_ERROR = 1 << 4;
        const PARITY_ERROR = 1 << 5;
        const OVERRUN = 1 << 6;
    }
}

/// `bNotificationCode` of SERIAL_STATE
const SERIAL_STATE: u8 = 0x20;
/// Device to host, class, interface
const NOTIFICATION_REQUEST_TYPE: u8 = 0xA1;

#[repr(C)]
#[derive(AsBytes, Unaligned)]
struct SerialStateNotification {
    request_type: u8,
    notification: u8,
    value: U16<LittleEndian>,
    index: U16<LittleEndian>,
    length: U16<LittleEndian>,
    state: U16<LittleEndian>,
}

const NOTIFICATION_LENGTH: usize = core::mem::size_of::<SerialStateNotification>();

const _: [(); 1] = [(); (NOTIFICATION_LENGTH == 10) as usize];

/// Bytes available for one echo reply, prefix included
pub const ECHO_CAPACITY: usize = DATA_OUT_BUFFER_SIZE;

/// Formats into a byte slice, failing when the slice is full
struct Cursor<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl fmt::Write for Cursor<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.position + s.len();
        let dst = self.buffer.get_mut(self.position..end).ok_or(fmt::Error)?;
        dst.copy_from_slice(s.as_bytes());
        self.position = end;
        Ok(())
    }
}

/// The CDC-ACM class engine
pub struct CdcAcm {
    line_coding: LineCoding,
    control_lines: ControlLines,
    echoes: u32,
    reply: DmaBuffer<LINE_CODING_LENGTH>,
    notification: DmaBuffer<NOTIFICATION_LENGTH>,
    tx: DmaBuffer<ECHO_CAPACITY>,
}

impl Default for CdcAcm {
    fn default() -> Self {
        Self::new()
    }
}

impl CdcAcm {
    pub const fn new() -> Self {
        CdcAcm {
            line_coding: LineCoding {
                data_rate: 115_200,
                stop_bits: StopBits::One,
                parity: Parity::None,
                data_bits: 8,
            },
            control_lines: ControlLines::empty(),
            echoes: 0,
            reply: DmaBuffer::new(),
            notification: DmaBuffer::new(),
            tx: DmaBuffer::new(),
        }
    }

    /// Return to 115200 8N1, with the host disconnected
    ///
    /// The echo sequence number keeps counting.
    pub fn reset(&mut self) {
        self.line_coding = LineCoding::default();
        self.control_lines = ControlLines::empty();
    }

    pub fn line_coding(&self) -> &LineCoding {
        &self.line_coding
    }

    pub fn control_lines(&self) -> ControlLines {
        self.control_lines
    }

    /// `true` once the host raises DTR
    pub fn is_connected(&self) -> bool {
        self.control_lines.contains(ControlLines::DTR)
    }

    /// Number of echo replies sent so far
    pub fn echo_count(&self) -> u32 {
        self.echoes
    }

    /// Handle a class request addressed to the CDC interface
    ///
    /// Returns the OUT data stage the request announced, if any. On error,
    /// nothing has changed, and the caller should stall endpoint 0.
    pub fn request<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        setup: &SetupPacket,
    ) -> Result<Option<DataStage>> {
        if setup.index() != COMM_INTERFACE as u16 {
            debug!("CDC request for interface {}", setup.index());
        }
        let request = ClassRequest::from_u8(setup.request()).ok_or(Error::UnsupportedRequest)?;
        match request {
            ClassRequest::SetLineCoding => {
                if setup.length() as usize != LINE_CODING_LENGTH {
                    return Err(Error::InvalidLength);
                }
                transport.prime(endpoint::CONTROL_OUT.address())?;
                Ok(Some(DataStage::LineCoding))
            }
            ClassRequest::GetLineCoding => {
                if (setup.length() as usize) < LINE_CODING_LENGTH {
                    return Err(Error::InvalidLength);
                }
                self.reply.copy_from_slice(&self.line_coding.to_bytes());
                transport.clean_dcache(&self.reply);
                transport.send(endpoint::CONTROL_IN.address(), &self.reply)?;
                Ok(None)
            }
            ClassRequest::SetControlLineState => {
                self.control_lines = ControlLines::from_bits_truncate(setup.value());
                info!(
                    "DTR {} RTS {}",
                    self.control_lines.contains(ControlLines::DTR),
                    self.control_lines.contains(ControlLines::RTS)
                );
                transport.send(endpoint::CONTROL_IN.address(), &[])?;
                Ok(None)
            }
            ClassRequest::SendEncapsulatedCommand
            | ClassRequest::GetEncapsulatedResponse
            | ClassRequest::SetCommFeature
            | ClassRequest::GetCommFeature
            | ClassRequest::ClearCommFeature
            | ClassRequest::SendBreak => Err(Error::UnsupportedRequest),
        }
    }

    /// Apply a SET_LINE_CODING data stage
    pub fn set_line_coding(&mut self, payload: &[u8]) -> Result<()> {
        self.line_coding = LineCoding::parse(payload)?;
        info!(
            "LINE CODING {} {} {} {}",
            self.line_coding.data_rate,
            self.line_coding.data_bits,
            self.line_coding.parity as u8,
            self.line_coding.stop_bits as u8
        );
        Ok(())
    }

    /// Send `data` to the host on the bulk IN endpoint
    ///
    /// Fails with [`Error::NotConnected`] unless the host raised DTR. An
    /// empty `data` succeeds without a transfer.
    pub fn send_data<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        data: &[u8],
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        for chunk in data.chunks(ECHO_CAPACITY) {
            let tx = &mut self.tx[..chunk.len()];
            tx.copy_from_slice(chunk);
            transport.clean_dcache(tx);
            transport.send(endpoint::DATA_IN.address(), tx)?;
        }
        Ok(())
    }

    /// Prefix `data` with the next sequence number into the transmit buffer
    ///
    /// Returns the reply length. Data beyond the transmit buffer is dropped.
    fn compose_echo(&mut self, data: &[u8]) -> usize {
        self.echoes = self.echoes.wrapping_add(1);
        let mut cursor = Cursor {
            buffer: &mut self.tx[..],
            position: 0,
        };
        // The prefix is far shorter than the buffer.
        let _ = write!(cursor, "[Echo #{}] ", self.echoes);
        let prefix = cursor.position;
        let copied = data.len().min(ECHO_CAPACITY - prefix);
        self.tx[prefix..prefix + copied].copy_from_slice(&data[..copied]);
        prefix + copied
    }

    /// Take one buffer from the bulk OUT endpoint, and echo it to the host
    ///
    /// Once a buffer is taken it's released, and the OUT endpoint re-primed,
    /// whatever the outcome, so the host can keep writing. Data received while
    /// the host is disconnected is dropped without using a sequence number.
    /// Returns the number of bytes received.
    pub fn receive_data<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<usize> {
        let ep = endpoint::DATA_OUT.address();
        let lease = match transport.receive(ep) {
            Ok(lease) => lease,
            Err(err @ UsbError::WouldBlock) => return Err(err.into()),
            Err(err) => {
                transport.prime(ep)?;
                return Err(err.into());
            }
        };

        let data = transport.leased(&lease);
        transport.invalidate_dcache(data);
        let received = lease.len();
        let reply = if self.is_connected() {
            Some(self.compose_echo(data))
        } else {
            None
        };
        transport.release(lease);

        let echoed = match reply {
            Some(len) => {
                trace!("RX {} bytes, echo {}", received, len);
                let sent = self.send_echo(transport, len);
                if sent.is_err() {
                    // The host never sees this sequence number
                    self.echoes = self.echoes.wrapping_sub(1);
                }
                sent.map(|()| received)
            }
            None => {
                debug!("RX {} bytes, host not connected", received);
                Err(Error::NotConnected)
            }
        };
        transport.prime(ep)?;
        echoed
    }

    fn send_echo<T: Transport + ?Sized>(&mut self, transport: &mut T, len: usize) -> Result<()> {
        let tx = &self.tx[..len];
        transport.clean_dcache(tx);
        transport.send(endpoint::DATA_IN.address(), tx)?;
        Ok(())
    }

    /// Report line status to the host on the notification endpoint
    pub fn send_serial_state<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        state: SerialState,
    ) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let notification = SerialStateNotification {
            request_type: NOTIFICATION_REQUEST_TYPE,
            notification: SERIAL_STATE,
            value: U16::new(0),
            index: U16::new(COMM_INTERFACE as u16),
            length: U16::new(2),
            state: U16::new(state.bits()),
        };
        self.notification.copy_from_slice(notification.as_bytes());
        transport.clean_dcache(&self.notification);
        transport.send(endpoint::NOTIFY_IN.address(), &self.notification)?;
        Ok(())
    }
}
