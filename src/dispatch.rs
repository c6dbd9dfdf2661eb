//! Setup packet dispatch, and control OUT data stages

use crate::{
    device::Device,
    endpoint,
    error::{Error, ErrorKind, Result},
    setup::{DataStage, SetupPacket},
    transport::Transport,
};
use usb_device::{control::RequestType, UsbError};

impl<T: Transport> Device<T> {
    /// Read the setup packet waiting on endpoint 0, and handle it
    ///
    /// Returns an error only when the transport can't produce a setup
    /// packet. Request failures are reported to the host with a STALL.
    pub fn handle_setup(&mut self) -> Result<()> {
        let raw = self.transport.read_setup(0)?;
        let setup = SetupPacket::parse(&raw).ok_or(Error::InvalidLength)?;
        self.dispatch(&setup);
        Ok(())
    }

    /// Route one setup packet to the standard, class, or vendor handler
    pub fn dispatch(&mut self, setup: &SetupPacket) {
        trace!("SETUP {:?}", setup);
        if let Some(stage) = self.pending.take() {
            debug!("Abandoned {:?} data stage", stage);
        }

        match setup.category() {
            RequestType::Standard => self.standard_request(setup),
            RequestType::Class => match self.cdc.request(&mut self.transport, setup) {
                Ok(stage) => self.pending = stage,
                Err(err) => self.reject(setup, err),
            },
            RequestType::Vendor => {
                if let Err(err) = self.vendor_request(setup) {
                    self.reject(setup, err);
                }
            }
            RequestType::Reserved => self.reject(setup, Error::UnsupportedRequest),
        }
    }

    /// Report a failed request to the host
    pub(crate) fn reject(&mut self, setup: &SetupPacket, err: Error) {
        if err.kind() == ErrorKind::Timing {
            warn!(
                "Timed out handling request {:?} type {:?}",
                setup.request(),
                setup.request_type()
            );
        } else {
            warn!(
                "STALL request {:?} type {:?}: {:?}",
                setup.request(),
                setup.request_type(),
                err
            );
        }
        self.stall_control();
    }

    /// Handle a completed transfer on endpoint 0 OUT
    ///
    /// Completes the data stage announced by the last setup packet, then
    /// sends the status stage. Anything else, like the status stage of an IN
    /// transfer, is drained. A payload that can't be applied stalls endpoint 0.
    pub fn handle_control_out(&mut self) -> Result<()> {
        let lease = match self.transport.receive(endpoint::CONTROL_OUT.address()) {
            Ok(lease) => lease,
            Err(UsbError::WouldBlock) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let data = self.transport.leased(&lease);
        self.transport.invalidate_dcache(data);
        let result = match self.pending.take() {
            Some(DataStage::LineCoding) => self.cdc.set_line_coding(data).map(Some),
            Some(DataStage::Discard) => Ok(Some(())),
            None => Ok(None),
        };
        trace!("EP0 OUT {} bytes", lease.len());
        self.transport.release(lease);

        match result {
            Ok(Some(())) => self.status_stage(),
            Ok(None) => Ok(()),
            Err(err) => {
                warn!("STALL data stage: {:?}", err);
                self.stall_control();
                Ok(())
            }
        }
    }
}
