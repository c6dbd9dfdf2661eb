//! A transport that records what the engine asks of it

use crate::{
    setup::SetupPacket,
    transport::{BufferLease, Directions, Transport},
};
use std::{cell::Cell, collections::VecDeque, vec::Vec};
use usb_device::{endpoint::EndpointAddress, Result as UsbResult, UsbError};
use zerocopy::AsBytes;

pub struct MockTransport {
    pub setups: VecDeque<[u8; 8]>,
    /// Payloads waiting on OUT endpoints, by `bEndpointAddress`
    pub incoming: VecDeque<(u8, Vec<u8>)>,
    leased: Vec<(u32, Vec<u8>)>,
    next_handle: u32,
    pub released: Vec<u32>,
    /// Everything sent, by `bEndpointAddress`
    pub sent: Vec<(u8, Vec<u8>)>,
    pub send_error: Option<UsbError>,
    pub primes: Vec<u8>,
    pub enabled: Vec<u8>,
    pub stalls: Vec<(usize, Directions)>,
    pub address: Option<u8>,
    pub endptctrl: [u32; 16],
    pub portsc: u32,
    /// `is_busy` answers `true` this many times before answering `false`
    pub busy_polls: Cell<u32>,
    pub cleaned: Cell<usize>,
    pub invalidated: Cell<usize>,
}

impl MockTransport {
    pub const fn new() -> Self {
        MockTransport {
            setups: VecDeque::new(),
            incoming: VecDeque::new(),
            leased: Vec::new(),
            next_handle: 1,
            released: Vec::new(),
            sent: Vec::new(),
            send_error: None,
            primes: Vec::new(),
            enabled: Vec::new(),
            stalls: Vec::new(),
            address: None,
            endptctrl: [0; 16],
            portsc: 0,
            busy_polls: Cell::new(0),
            cleaned: Cell::new(0),
            invalidated: Cell::new(0),
        }
    }

    pub fn queue_setup(&mut self, setup: SetupPacket) {
        let mut raw = [0; 8];
        raw.copy_from_slice(setup.as_bytes());
        self.setups.push_back(raw);
    }

    pub fn queue_out(&mut self, address: u8, data: &[u8]) {
        self.incoming.push_back((address, data.to_vec()));
    }

    /// Buffers lent out and not yet released
    pub fn outstanding(&self) -> usize {
        self.leased.len()
    }

    /// Payloads sent on one IN endpoint, oldest first
    pub fn sent_on(&self, address: u8) -> Vec<&[u8]> {
        self.sent
            .iter()
            .filter(|(ep, _)| *ep == address)
            .map(|(_, data)| data.as_slice())
            .collect()
    }

    pub fn last_sent(&self) -> Option<(u8, &[u8])> {
        self.sent.last().map(|(ep, data)| (*ep, data.as_slice()))
    }

    pub fn ep0_stalled(&self) -> bool {
        self.stalls
            .iter()
            .any(|(ep, dirs)| *ep == 0 && *dirs == (Directions::IN | Directions::OUT))
    }
}

impl Transport for MockTransport {
    fn read_setup(&mut self, endpoint: usize) -> UsbResult<[u8; 8]> {
        if endpoint != 0 {
            return Err(UsbError::InvalidEndpoint);
        }
        self.setups.pop_front().ok_or(UsbError::WouldBlock)
    }

    fn send(&mut self, ep: EndpointAddress, data: &[u8]) -> UsbResult<()> {
        if let Some(err) = self.send_error {
            return Err(err);
        }
        self.sent.push((u8::from(ep), data.to_vec()));
        Ok(())
    }

    fn receive(&mut self, ep: EndpointAddress) -> UsbResult<BufferLease> {
        let address = u8::from(ep);
        let position = self
            .incoming
            .iter()
            .position(|(addr, _)| *addr == address)
            .ok_or(UsbError::WouldBlock)?;
        let (_, data) = self.incoming.remove(position).ok_or(UsbError::WouldBlock)?;
        let handle = self.next_handle;
        self.next_handle += 1;
        let lease = BufferLease::new(handle, data.len());
        self.leased.push((handle, data));
        Ok(lease)
    }

    fn leased(&self, lease: &BufferLease) -> &[u8] {
        self.leased
            .iter()
            .find(|(handle, _)| *handle == lease.handle())
            .map(|(_, data)| data.as_slice())
            .unwrap_or(&[])
    }

    fn release(&mut self, lease: BufferLease) {
        self.leased.retain(|(handle, _)| *handle != lease.handle());
        self.released.push(lease.handle());
    }

    fn prime(&mut self, ep: EndpointAddress) -> UsbResult<()> {
        self.primes.push(u8::from(ep));
        Ok(())
    }

    fn is_busy(&self, _: EndpointAddress) -> bool {
        let polls = self.busy_polls.get();
        if polls > 0 {
            self.busy_polls.set(polls - 1);
            true
        } else {
            false
        }
    }

    fn stall(&mut self, endpoint: usize, directions: Directions) {
        self.stalls.push((endpoint, directions));
    }

    fn enable(&mut self, ep: EndpointAddress) {
        self.enabled.push(u8::from(ep));
    }

    fn set_address(&mut self, address: u8) {
        self.address = Some(address);
    }

    fn endpoint_control(&self, endpoint: usize) -> u32 {
        self.endptctrl[endpoint]
    }

    fn set_endpoint_control(&mut self, endpoint: usize, value: u32) {
        self.endptctrl[endpoint] = value;
    }

    fn port_status(&self) -> u32 {
        self.portsc
    }

    fn set_port_status(&mut self, value: u32) {
        self.portsc = value;
    }

    fn clean_dcache(&self, _: &[u8]) {
        self.cleaned.set(self.cleaned.get() + 1);
    }

    fn invalidate_dcache(&self, _: &[u8]) {
        self.invalidated.set(self.invalidated.get() + 1);
    }
}
