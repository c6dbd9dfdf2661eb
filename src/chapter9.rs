//! USB 2.0 chapter 9 standard requests

use crate::{
    descriptor::{self, DescriptorType, COMM_INTERFACE, CONFIGURATION_VALUE, DATA_INTERFACE},
    device::Device,
    endpoint::{self, EndpointConfig},
    error::{Error, ErrorKind, Result},
    ral,
    register,
    setup::{DataStage, Feature, SetupPacket, StandardRequest, TestSelector},
    transport::Transport,
};
use num_traits::FromPrimitive;
use usb_device::control::Recipient;

/// GET_STATUS(device): self powered, no remote wakeup
const DEVICE_STATUS: u16 = 0x0001;

impl<T: Transport> Device<T> {
    /// Handle a standard request, stalling endpoint 0 on failure
    pub(crate) fn standard_request(&mut self, setup: &SetupPacket) {
        match self.try_standard_request(setup) {
            Ok(stage) => self.pending = stage,
            // The only timed path runs after the status stage was sent
            Err(err) if err.kind() == ErrorKind::Timing => {
                warn!("Timed out after request {:?}", setup.request())
            }
            Err(err) => self.reject(setup, err),
        }
    }

    fn try_standard_request(&mut self, setup: &SetupPacket) -> Result<Option<DataStage>> {
        let request = StandardRequest::from_u8(setup.request()).ok_or(Error::UnsupportedRequest)?;
        match request {
            StandardRequest::GetStatus => self.get_status(setup)?,
            StandardRequest::SetAddress => self.set_address(setup)?,
            StandardRequest::GetDescriptor => self.get_descriptor(setup)?,
            StandardRequest::GetConfiguration => {
                self.reply[0] = self.state.configuration;
                self.reply_in(1, setup.length())?;
            }
            StandardRequest::SetConfiguration => self.set_configuration(setup)?,
            StandardRequest::GetInterface => {
                self.interface(setup)?;
                self.reply[0] = self.state.alternate_setting;
                self.reply_in(1, setup.length())?;
            }
            StandardRequest::SetInterface => {
                self.interface(setup)?;
                if setup.value() != 0 {
                    return Err(Error::InvalidValue);
                }
                self.status_stage()?;
                self.state.alternate_setting = 0;
            }
            StandardRequest::ClearFeature => self.feature(setup, false)?,
            StandardRequest::SetFeature => self.feature(setup, true)?,
            StandardRequest::SetSel => {
                if setup.length() > 0 {
                    self.transport.prime(endpoint::CONTROL_OUT.address())?;
                    return Ok(Some(DataStage::Discard));
                }
                self.status_stage()?;
            }
            StandardRequest::SetIsochDelay => self.status_stage()?,
            StandardRequest::SetDescriptor | StandardRequest::SynchFrame => {
                return Err(Error::UnsupportedRequest)
            }
        }
        Ok(None)
    }

    /// Validate the interface named by an interface request
    fn interface(&self, setup: &SetupPacket) -> Result<()> {
        if self.state.configuration == 0 {
            return Err(Error::InvalidState);
        }
        match setup.index() {
            index if index == COMM_INTERFACE as u16 || index == DATA_INTERFACE as u16 => Ok(()),
            _ => Err(Error::InvalidValue),
        }
    }

    /// The endpoint named by `wIndex`
    fn endpoint(setup: &SetupPacket) -> Result<&'static EndpointConfig> {
        let index = setup.index();
        if index & !0x008F != 0 {
            return Err(Error::InvalidValue);
        }
        endpoint::find(index as u8).ok_or(Error::InvalidValue)
    }

    fn get_status(&mut self, setup: &SetupPacket) -> Result<()> {
        let status = match setup.recipient() {
            Recipient::Device => DEVICE_STATUS,
            Recipient::Interface => {
                self.interface(setup)?;
                0
            }
            Recipient::Endpoint => {
                let ep = Self::endpoint(setup)?;
                endpoint::is_stalled(&self.transport, ep) as u16
            }
            _ => return Err(Error::InvalidValue),
        };
        self.reply[..2].copy_from_slice(&status.to_le_bytes());
        self.reply_in(2, setup.length())
    }

    fn set_address(&mut self, setup: &SetupPacket) -> Result<()> {
        let address = setup.value();
        if address > 127 {
            return Err(Error::InvalidValue);
        }
        let address = address as u8;
        // The controller latches the address once the status stage completes,
        // so it's programmed first, and restored if the status stage fails.
        self.transport.set_address(address);
        if let Err(err) = self.status_stage() {
            self.transport.set_address(self.state.address);
            return Err(err);
        }
        debug!("ADDRESS {}", address);
        self.state.address = address;
        Ok(())
    }

    fn get_descriptor(&mut self, setup: &SetupPacket) -> Result<()> {
        let [index, kind] = setup.value().to_le_bytes();
        let identity = &self.config.identity;
        let reply = &mut self.reply[..];
        let len = match DescriptorType::from_u8(kind) {
            Some(DescriptorType::Device) => descriptor::device(identity, reply)?,
            Some(DescriptorType::DeviceQualifier) => descriptor::device_qualifier(reply)?,
            Some(DescriptorType::Configuration) => descriptor::configuration(reply)?,
            Some(DescriptorType::String) => descriptor::string(identity, index, reply)?,
            _ => return Err(Error::InvalidValue),
        };
        trace!(
            "DESCRIPTOR {} INDEX {} LEN {} REQUESTED {}",
            kind,
            index,
            len,
            setup.length()
        );
        self.reply_in(len, setup.length())
    }

    fn set_configuration(&mut self, setup: &SetupPacket) -> Result<()> {
        let value = setup.value();
        let configured = self.state.configuration != 0;
        match value {
            0 => {
                self.status_stage()?;
                if configured {
                    endpoint::deactivate(&mut self.transport);
                }
            }
            value if value == CONFIGURATION_VALUE as u16 => {
                // OUT endpoints must be primed before the host sees the status stage
                endpoint::activate(&mut self.transport)?;
                if let Err(err) = self.status_stage() {
                    if !configured {
                        endpoint::deactivate(&mut self.transport);
                    }
                    return Err(err);
                }
                self.state.alternate_setting = 0;
            }
            _ => return Err(Error::InvalidValue),
        }
        self.cdc.reset();
        self.state.configuration = value as u8;
        debug!("CONFIGURATION {}", value);
        Ok(())
    }

    fn feature(&mut self, setup: &SetupPacket, set: bool) -> Result<()> {
        let feature = u8::try_from(setup.value())
            .ok()
            .and_then(Feature::from_u8)
            .ok_or(Error::InvalidValue)?;
        match (setup.recipient(), feature) {
            (Recipient::Endpoint, Feature::EndpointHalt) => {
                let ep = Self::endpoint(setup)?;
                endpoint::set_stalled(&mut self.transport, ep, set);
                debug!("EP{} HALT {}", ep.address, set);
                self.status_stage()
            }
            (Recipient::Device, Feature::TestMode) if set => self.enter_test_mode(setup),
            _ => Err(Error::UnsupportedRequest),
        }
    }

    /// Acknowledge SET_FEATURE(TEST_MODE), then put the port into the test mode
    ///
    /// The port may only change after the status stage completes. Unknown
    /// test selectors are acknowledged and ignored.
    fn enter_test_mode(&mut self, setup: &SetupPacket) -> Result<()> {
        let [_, selector] = setup.index().to_le_bytes();
        self.status_stage()?;

        let budget = self.config.timeouts.status_stage;
        let transport = &self.transport;
        budget.wait_while(|| transport.is_busy(endpoint::CONTROL_IN.address()))?;

        match TestSelector::from_u8(selector) {
            Some(test) => {
                info!("TEST MODE {}", selector);
                ral::with_port_status(&mut self.transport, |portsc| {
                    ral::modify_reg!(register, portsc, PORTSC1, PTC: test as u32)
                });
            }
            None => debug!("Ignoring test selector {}", selector),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{Config, Timeouts},
        device::{Device, UsbState},
        mock::MockTransport,
        setup::SetupPacket,
        transport::RetryBudget,
    };
    use std::vec::Vec;

    fn device() -> Device<MockTransport> {
        Device::new(MockTransport::new(), Config::default())
    }

    fn configured() -> Device<MockTransport> {
        let mut device = device();
        device.dispatch(&SetupPacket::new(0x00, 0x05, 3, 0, 0));
        device.dispatch(&SetupPacket::new(0x00, 0x09, 1, 0, 0));
        assert!(device.is_configured());
        device.transport_mut().sent.clear();
        device
    }

    /// Run one request, returning what it sent on endpoint 0 IN
    fn request(device: &mut Device<MockTransport>, setup: SetupPacket) -> Option<Vec<u8>> {
        device.transport_mut().sent.clear();
        device.transport_mut().stalls.clear();
        device.dispatch(&setup);
        if device.transport().ep0_stalled() {
            None
        } else {
            device.transport().last_sent().map(|(ep, data)| {
                assert_eq!(ep, 0x80);
                data.to_vec()
            })
        }
    }

    #[test]
    fn device_descriptor_truncated() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0100, 0, 8)).unwrap();
        assert_eq!(reply, [18, 0x01, 0x00, 0x02, 0xEF, 0x02, 0x01, 64]);
    }

    #[test]
    fn device_descriptor_full() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0100, 0, 0x40)).unwrap();
        assert_eq!(reply.len(), 18);
        assert_eq!(device.transport().cleaned.get(), 1);
    }

    #[test]
    fn configuration_descriptor_negotiation() {
        let mut device = device();
        let header = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0200, 0, 9)).unwrap();
        assert_eq!(header.len(), 9);
        let total = u16::from_le_bytes([header[2], header[3]]);

        let full = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0200, 0, total)).unwrap();
        assert_eq!(full.len(), total as usize);
        assert_eq!(&full[..9], &header[..]);

        let more = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0200, 0, 0xFF)).unwrap();
        assert_eq!(more, full);
    }

    #[test]
    fn qualifier_descriptor() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0600, 0, 10)).unwrap();
        assert_eq!(reply, [10, 0x06, 0x00, 0x02, 0xEF, 0x02, 0x01, 64, 1, 0]);
    }

    #[test]
    fn string_descriptors() {
        let mut device = device();
        let langid = request(&mut device, SetupPacket::new(0x80, 0x06, 0x0300, 0, 0xFF)).unwrap();
        assert_eq!(langid, [4, 0x03, 0x09, 0x04]);

        let serial =
            request(&mut device, SetupPacket::new(0x80, 0x06, 0x0303, 0x0409, 0xFF)).unwrap();
        assert_eq!(serial.len(), 2 + 2 * "VCOM12345678".len());

        assert!(request(&mut device, SetupPacket::new(0x80, 0x06, 0x0308, 0x0409, 0xFF)).is_none());
    }

    #[test]
    fn unknown_descriptor_stalls() {
        let mut device = device();
        // HID report descriptor
        assert!(request(&mut device, SetupPacket::new(0x81, 0x06, 0x2200, 0, 0x40)).is_none());
        // Other speed configuration
        assert!(request(&mut device, SetupPacket::new(0x80, 0x06, 0x0700, 0, 0x40)).is_none());
    }

    #[test]
    fn set_address() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x00, 0x05, 42, 0, 0)).unwrap();
        assert!(reply.is_empty());
        assert_eq!(device.transport().address, Some(42));
        assert_eq!(device.state().address(), 42);
        assert_eq!(device.state().usb_state(), UsbState::Addressed);
    }

    #[test]
    fn set_address_out_of_range() {
        let mut device = device();
        assert!(request(&mut device, SetupPacket::new(0x00, 0x05, 128, 0, 0)).is_none());
        assert_eq!(device.transport().address, None);
    }

    #[test]
    fn configure() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x00, 0x09, 1, 0, 0)).unwrap();
        assert!(reply.is_empty());
        assert_eq!(device.state().usb_state(), UsbState::Configured);
        // Bulk OUT primed, class endpoints enabled
        assert_eq!(device.transport().primes, [0x01]);
        assert_eq!(device.transport().enabled, [0x01, 0x81, 0x82]);

        let reply = request(&mut device, SetupPacket::new(0x80, 0x08, 0, 0, 1)).unwrap();
        assert_eq!(reply, [1]);
    }

    #[test]
    fn configure_invalid_value() {
        let mut device = configured();
        assert!(request(&mut device, SetupPacket::new(0x00, 0x09, 2, 0, 0)).is_none());
        assert_eq!(device.state().configuration(), 1);
        let reply = request(&mut device, SetupPacket::new(0x80, 0x08, 0, 0, 1)).unwrap();
        assert_eq!(reply, [1]);
    }

    #[test]
    fn configuration_resets_cdc() {
        let mut device = configured();
        device.dispatch(&SetupPacket::new(0x21, 0x22, 1, 0, 0));
        assert!(device.cdc().is_connected());

        device.dispatch(&SetupPacket::new(0x00, 0x09, 1, 0, 0));
        assert!(!device.cdc().is_connected());
    }

    #[test]
    fn unconfigure() {
        let mut device = configured();
        device.dispatch(&SetupPacket::new(0x21, 0x22, 1, 0, 0));
        let reply = request(&mut device, SetupPacket::new(0x00, 0x09, 0, 0, 0)).unwrap();
        assert!(reply.is_empty());
        assert_eq!(device.state().usb_state(), UsbState::Addressed);
        assert!(!device.cdc().is_connected());
        assert_eq!(device.transport().endptctrl[1] & ((1 << 23) | (1 << 7)), 0);
    }

    #[test]
    fn failed_status_stage_keeps_configuration() {
        let mut device = device();
        device.transport_mut().send_error = Some(usb_device::UsbError::WouldBlock);
        device.dispatch(&SetupPacket::new(0x00, 0x09, 1, 0, 0));

        assert!(device.transport().ep0_stalled());
        assert_eq!(device.state().configuration(), 0);
        assert_eq!(device.transport().endptctrl[1] & ((1 << 23) | (1 << 7)), 0);
        assert_eq!(device.transport().endptctrl[2] & (1 << 23), 0);
    }

    #[test]
    fn failed_status_stage_keeps_address() {
        let mut device = device();
        device.dispatch(&SetupPacket::new(0x00, 0x05, 7, 0, 0));
        device.transport_mut().send_error = Some(usb_device::UsbError::WouldBlock);
        device.dispatch(&SetupPacket::new(0x00, 0x05, 42, 0, 0));

        assert!(device.transport().ep0_stalled());
        assert_eq!(device.state().address(), 7);
        assert_eq!(device.transport().address, Some(7));
    }

    #[test]
    fn failed_status_stage_keeps_configured_device() {
        let mut device = configured();
        device.dispatch(&SetupPacket::new(0x21, 0x22, 1, 0, 0));
        device.transport_mut().send_error = Some(usb_device::UsbError::WouldBlock);

        device.dispatch(&SetupPacket::new(0x00, 0x09, 0, 0, 0));
        assert!(device.transport().ep0_stalled());
        assert_eq!(device.state().usb_state(), UsbState::Configured);
        assert!(device.cdc().is_connected());
        assert_ne!(device.transport().endptctrl[1] & (1 << 23), 0);

        // A failed reconfiguration leaves the endpoints live
        device.dispatch(&SetupPacket::new(0x00, 0x09, 1, 0, 0));
        assert_eq!(device.state().configuration(), 1);
        assert!(device.cdc().is_connected());
        assert_ne!(device.transport().endptctrl[1] & (1 << 23), 0);
    }

    #[test]
    fn get_status_device() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x80, 0x00, 0, 0, 2)).unwrap();
        assert_eq!(reply, [0x01, 0x00]);
    }

    #[test]
    fn get_status_interface() {
        let mut device = configured();
        let reply = request(&mut device, SetupPacket::new(0x81, 0x00, 0, 1, 2)).unwrap();
        assert_eq!(reply, [0, 0]);
        assert!(request(&mut device, SetupPacket::new(0x81, 0x00, 0, 2, 2)).is_none());
    }

    #[test]
    fn get_status_unknown_recipient() {
        let mut device = device();
        assert!(request(&mut device, SetupPacket::new(0x83, 0x00, 0, 0, 2)).is_none());
    }

    #[test]
    fn endpoint_halt() {
        let mut device = configured();

        let reply = request(&mut device, SetupPacket::new(0x02, 0x03, 0, 0x81, 0)).unwrap();
        assert!(reply.is_empty());
        assert_eq!(device.transport().endptctrl[1] & (1 << 16), 1 << 16);

        let status = request(&mut device, SetupPacket::new(0x82, 0x00, 0, 0x81, 2)).unwrap();
        assert_eq!(status, [1, 0]);
        let status = request(&mut device, SetupPacket::new(0x82, 0x00, 0, 0x01, 2)).unwrap();
        assert_eq!(status, [0, 0]);

        let reply = request(&mut device, SetupPacket::new(0x02, 0x01, 0, 0x81, 0)).unwrap();
        assert!(reply.is_empty());
        let status = request(&mut device, SetupPacket::new(0x82, 0x00, 0, 0x81, 2)).unwrap();
        assert_eq!(status, [0, 0]);
    }

    #[test]
    fn halt_out_endpoint() {
        let mut device = configured();
        request(&mut device, SetupPacket::new(0x02, 0x03, 0, 0x01, 0)).unwrap();
        assert_eq!(device.transport().endptctrl[1] & 1, 1);
        assert_eq!(device.transport().endptctrl[1] & (1 << 16), 0);
    }

    #[test]
    fn halt_unknown_endpoint() {
        let mut device = configured();
        assert!(request(&mut device, SetupPacket::new(0x02, 0x03, 0, 0x83, 0)).is_none());
        assert!(request(&mut device, SetupPacket::new(0x82, 0x00, 0, 0x05, 2)).is_none());
    }

    #[test]
    fn remote_wakeup_unsupported() {
        let mut device = configured();
        assert!(request(&mut device, SetupPacket::new(0x00, 0x03, 1, 0, 0)).is_none());
        assert!(request(&mut device, SetupPacket::new(0x00, 0x01, 1, 0, 0)).is_none());
    }

    #[test]
    fn interfaces() {
        let mut device = device();
        // Not configured yet
        assert!(request(&mut device, SetupPacket::new(0x81, 0x0A, 0, 0, 1)).is_none());

        let mut device = configured();
        let alt = request(&mut device, SetupPacket::new(0x81, 0x0A, 0, 1, 1)).unwrap();
        assert_eq!(alt, [0]);
        let reply = request(&mut device, SetupPacket::new(0x01, 0x0B, 0, 1, 0)).unwrap();
        assert!(reply.is_empty());
        // No alternate settings
        assert!(request(&mut device, SetupPacket::new(0x01, 0x0B, 1, 1, 0)).is_none());
        assert!(request(&mut device, SetupPacket::new(0x01, 0x0B, 0, 5, 0)).is_none());
    }

    #[test]
    fn test_mode() {
        let mut device = device();
        device.transport_mut().portsc = 1 << 12;
        device.transport_mut().busy_polls.set(3);
        let reply = request(&mut device, SetupPacket::new(0x00, 0x03, 2, 0x0400, 0)).unwrap();
        assert!(reply.is_empty());
        assert_eq!(device.transport().portsc, (4 << 16) | (1 << 12));
    }

    #[test]
    fn test_mode_unknown_selector() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x00, 0x03, 2, 0x0600, 0)).unwrap();
        assert!(reply.is_empty());
        assert_eq!(device.transport().portsc, 0);
    }

    #[test]
    fn test_mode_status_stage_timeout() {
        let config = Config {
            timeouts: Timeouts {
                status_stage: RetryBudget::new(2),
                ..Timeouts::default()
            },
            ..Config::default()
        };
        let mut device = Device::new(MockTransport::new(), config);
        device.transport_mut().busy_polls.set(10);
        device.dispatch(&SetupPacket::new(0x00, 0x03, 2, 0x0100, 0));
        // Acknowledged, but the port never changed, and nothing stalled
        assert_eq!(device.transport().last_sent(), Some((0x80, &[][..])));
        assert_eq!(device.transport().portsc, 0);
        assert!(device.transport().stalls.is_empty());
    }

    #[test]
    fn clear_test_mode_unsupported() {
        let mut device = device();
        assert!(request(&mut device, SetupPacket::new(0x00, 0x01, 2, 0x0100, 0)).is_none());
    }

    #[test]
    fn set_sel_drains_data_stage() {
        let mut device = configured();
        device.transport_mut().primes.clear();
        device.dispatch(&SetupPacket::new(0x00, 0x30, 0, 0, 6));
        assert_eq!(device.transport().primes, [0x00]);
        assert!(device.transport().sent.is_empty());

        device.transport_mut().queue_out(0x00, &[1, 2, 3, 4, 5, 6]);
        device.handle_control_out().unwrap();
        assert_eq!(device.transport().last_sent(), Some((0x80, &[][..])));
        assert_eq!(device.transport().outstanding(), 0);
    }

    #[test]
    fn isoch_delay() {
        let mut device = device();
        let reply = request(&mut device, SetupPacket::new(0x00, 0x31, 40, 0, 0)).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn unknown_request_stalls() {
        let mut device = device();
        assert!(request(&mut device, SetupPacket::new(0x00, 0x02, 0, 0, 0)).is_none());
        assert!(request(&mut device, SetupPacket::new(0x00, 0x07, 0x0100, 0, 18)).is_none());
        assert!(request(&mut device, SetupPacket::new(0x82, 0x0C, 0, 0x81, 2)).is_none());
    }

    #[test]
    fn transport_send_failure_stalls() {
        let mut device = device();
        device.transport_mut().send_error = Some(usb_device::UsbError::WouldBlock);
        device.dispatch(&SetupPacket::new(0x80, 0x06, 0x0100, 0, 18));
        assert!(device.transport().ep0_stalled());
    }
}
