//! Errors produced while servicing USB requests

use crate::descriptor::DescriptorError;
use usb_device::UsbError;

/// Coarse classification of an [`Error`]
///
/// The setup dispatcher uses the kind to pick a failure policy. Protocol and
/// resource errors end in an endpoint 0 STALL. Timing errors are logged; a
/// caller may still decide to stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum ErrorKind {
    /// The host sent something we can't, or won't, handle
    Protocol,
    /// A buffer was too small, or the transport couldn't provide one
    Resource,
    /// A bounded wait ran out of retries
    Timing,
}

/// An error produced by a request handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Error {
    /// The request code is unknown, or deliberately unsupported
    UnsupportedRequest,
    /// `wLength` doesn't fit the request
    InvalidLength,
    /// `wValue` or `wIndex` names something that doesn't exist
    InvalidValue,
    /// The request isn't valid in the current device state
    InvalidState,
    /// The host hasn't asserted DTR, so the serial link is closed
    NotConnected,
    /// Descriptor assembly failed
    Descriptor(DescriptorError),
    /// A bounded wait exhausted its retry budget
    Timeout,
    /// The endpoint transport reported an error
    Transport(UsbError),
}

impl Error {
    /// Returns the class of error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedRequest
            | Error::InvalidLength
            | Error::InvalidValue
            | Error::InvalidState
            | Error::NotConnected => ErrorKind::Protocol,
            Error::Descriptor(_) | Error::Transport(_) => ErrorKind::Resource,
            Error::Timeout => ErrorKind::Timing,
        }
    }
}

impl From<UsbError> for Error {
    fn from(err: UsbError) -> Self {
        Error::Transport(err)
    }
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        Error::Descriptor(err)
    }
}

/// Result type for request handlers
pub type Result<T> = core::result::Result<T, Error>;
