//! The endpoint transport, and the memory it moves
//!
//! The protocol engine never touches DMA descriptors or controller
//! registers directly. It asks a [`Transport`] to do that work.

use crate::error::Error;
use usb_device::{endpoint::EndpointAddress, Result as UsbResult};

bitflags::bitflags! {
    /// Endpoint directions affected by a stall
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Directions : u8 {
        const OUT = 1 << 0;
        const IN = 1 << 1;
    }
}

/// A transport buffer lent to the protocol engine
///
/// A lease is produced by [`Transport::receive`], and must be handed back
/// with [`Transport::release`]. Dropping a lease leaks the transport's
/// buffer slot.
#[must_use = "leased buffers must be released back to the transport"]
#[derive(Debug, PartialEq, Eq)]
pub struct BufferLease {
    handle: u32,
    len: usize,
}

impl BufferLease {
    /// Describe a received buffer
    ///
    /// `handle` is the transport's token for the buffer slot. `len` is the number
    /// of bytes received.
    pub const fn new(handle: u32, len: usize) -> Self {
        BufferLease { handle, len }
    }

    /// The transport's token for this buffer
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// Number of bytes received
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length packet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Endpoint and DMA operations of a device controller
///
/// Endpoint numbers are indexes into the controller's endpoint array; a
/// number names both the OUT and IN halves. [`EndpointAddress`] names one
/// half.
///
/// The engine calls [`clean_dcache`](Transport::clean_dcache) before every send
/// and [`invalidate_dcache`](Transport::invalidate_dcache) before it reads a
/// received buffer. The default implementations do nothing, which is correct
/// for cores without a data cache.
pub trait Transport {
    /// Read the 8-byte setup packet that arrived on a control endpoint
    fn read_setup(&mut self, endpoint: usize) -> UsbResult<[u8; 8]>;

    /// Queue `data` for transmission on the IN endpoint `ep`
    ///
    /// An empty `data` sends a zero-length packet. The transport either copies
    /// `data`, or finishes the DMA, before it returns.
    fn send(&mut self, ep: EndpointAddress, data: &[u8]) -> UsbResult<()>;

    /// Take the next completed buffer from the OUT endpoint `ep`
    ///
    /// Returns `WouldBlock` when nothing has arrived.
    fn receive(&mut self, ep: EndpointAddress) -> UsbResult<BufferLease>;

    /// The bytes held by a leased buffer
    fn leased(&self, lease: &BufferLease) -> &[u8];

    /// Return a leased buffer to the transport
    fn release(&mut self, lease: BufferLease);

    /// Arm `ep` for its next transfer
    fn prime(&mut self, ep: EndpointAddress) -> UsbResult<()>;

    /// Returns `true` while a prime request or transfer on `ep` is outstanding
    fn is_busy(&self, ep: EndpointAddress) -> bool;

    /// Stall one or both directions of `endpoint`
    fn stall(&mut self, endpoint: usize, directions: Directions);

    /// Prepare `ep`'s queue for transfers
    fn enable(&mut self, ep: EndpointAddress);

    /// Program the device address
    ///
    /// The controller must defer the new address until the status stage of
    /// the current transfer completes.
    fn set_address(&mut self, address: u8);

    /// Read `ENDPTCTRL[endpoint]`
    fn endpoint_control(&self, endpoint: usize) -> u32;

    /// Write `ENDPTCTRL[endpoint]`
    fn set_endpoint_control(&mut self, endpoint: usize, value: u32);

    /// Read `PORTSC1`
    fn port_status(&self) -> u32;

    /// Write `PORTSC1`
    fn set_port_status(&mut self, value: u32);

    /// Write back any cached lines covering `data`
    fn clean_dcache(&self, _data: &[u8]) {}

    /// Discard any cached lines covering `data`
    fn invalidate_dcache(&self, _data: &[u8]) {}
}

/// Data cache line size assumed for DMA buffers
pub const CACHE_LINE_SIZE: usize = 32;

/// A byte buffer that starts on a cache line
///
/// Buffers that cross the DMA boundary must not share a cache line with
/// unrelated data.
#[repr(C, align(32))]
pub struct DmaBuffer<const N: usize>([u8; N]);

const _: [(); 1] = [(); (core::mem::align_of::<DmaBuffer<1>>() == CACHE_LINE_SIZE) as usize];

impl<const N: usize> DmaBuffer<N> {
    pub const fn new() -> Self {
        DmaBuffer([0; N])
    }
}

impl<const N: usize> core::ops::Deref for DmaBuffer<N> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> core::ops::DerefMut for DmaBuffer<N> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// A bounded number of polling attempts
///
/// Stands in for a deadline. Firmware sizes the budget against its core
/// clock; tests use small budgets with a transport that answers at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct RetryBudget(u32);

impl RetryBudget {
    pub const fn new(attempts: u32) -> Self {
        RetryBudget(attempts)
    }

    pub const fn attempts(self) -> u32 {
        self.0
    }

    /// Call `attempt` until it returns `Some`, or the budget runs out
    ///
    /// Returns [`Error::Timeout`] when every attempt returned `None`.
    pub fn poll<R>(self, mut attempt: impl FnMut() -> Option<R>) -> Result<R, Error> {
        for _ in 0..self.0 {
            if let Some(result) = attempt() {
                return Ok(result);
            }
            core::hint::spin_loop();
        }
        Err(Error::Timeout)
    }

    /// Wait until `busy` returns `false`
    pub fn wait_while(self, mut busy: impl FnMut() -> bool) -> Result<(), Error> {
        self.poll(|| (!busy()).then_some(()))
    }
}
