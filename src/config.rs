//! Device identity and timing budgets

use crate::transport::RetryBudget;

/// Values the host sees in the device and string descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `bcdDevice`
    pub device_release: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: &'static str,
    pub configuration: &'static str,
    /// Names the interface association
    pub function: &'static str,
    pub control_interface: &'static str,
    pub data_interface: &'static str,
}

impl Identity {
    /// The identity of the reference virtual COM port
    pub const fn new() -> Self {
        Identity {
            vendor_id: 0x04B4,
            product_id: 0x0008,
            device_release: 0x0100,
            manufacturer: "Xilinx",
            product: "ZYNQ7010 Virtual COM Port",
            serial_number: "VCOM12345678",
            configuration: "CDC Configuration",
            function: "CDC ACM Interface",
            control_interface: "CDC Control Interface",
            data_interface: "CDC Data Interface",
        }
    }

    /// String descriptor indexes handed out by the device and configuration descriptors
    pub const MANUFACTURER: u8 = 1;
    pub const PRODUCT: u8 = 2;
    pub const SERIAL_NUMBER: u8 = 3;
    pub const CONFIGURATION: u8 = 4;
    pub const FUNCTION: u8 = 5;
    pub const CONTROL_INTERFACE: u8 = 6;
    pub const DATA_INTERFACE: u8 = 7;

    /// The string behind a non-zero string descriptor index
    pub fn string(&self, index: u8) -> Option<&'static str> {
        match index {
            Self::MANUFACTURER => Some(self.manufacturer),
            Self::PRODUCT => Some(self.product),
            Self::SERIAL_NUMBER => Some(self.serial_number),
            Self::CONFIGURATION => Some(self.configuration),
            Self::FUNCTION => Some(self.function),
            Self::CONTROL_INTERFACE => Some(self.control_interface),
            Self::DATA_INTERFACE => Some(self.data_interface),
            _ => None,
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry budgets for the bounded busy-waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Wait for the controller to accept a prime request
    pub prime: RetryBudget,
    /// Wait for a synchronous control OUT data stage to arrive
    pub data_stage: RetryBudget,
    /// Wait for a status stage to finish before entering a test mode
    ///
    /// The host starts checking the port 3ms after the status stage.
    pub status_stage: RetryBudget,
}

impl Timeouts {
    pub const fn new() -> Self {
        Timeouts {
            prime: RetryBudget::new(1_000_000),
            data_stage: RetryBudget::new(1_000_000),
            status_stage: RetryBudget::new(100_000),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a [`Device`](crate::Device) needs beyond its transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub identity: Identity,
    pub timeouts: Timeouts,
}

impl Config {
    /// The default identity and timeouts, usable in a `static` initializer
    pub const fn new() -> Self {
        Config {
            identity: Identity::new(),
            timeouts: Timeouts::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
