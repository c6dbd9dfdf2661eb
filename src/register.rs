//! Endpoint control and port status register layouts
//!
//! The transport hands us raw `ENDPTCTRLn` and `PORTSC1` values. These
//! types hold a copy of a register so that the RAL macros can read and
//! modify named fields, before we give the value back to the transport.

#![allow(non_snake_case, non_upper_case_globals)]

use core::cell::Cell;

/// A register value that conforms to the RAL's register API
pub struct Image(Cell<u32>);

impl Image {
    pub const fn new(value: u32) -> Self {
        Image(Cell::new(value))
    }
    pub fn read(&self) -> u32 {
        self.0.get()
    }
    pub fn write(&self, value: u32) {
        self.0.set(value)
    }
}

/// A copy of one `ENDPTCTRLn` register
pub struct EndptCtrl {
    pub ENDPTCTRL: Image,
}

impl EndptCtrl {
    pub const fn new(value: u32) -> Self {
        EndptCtrl {
            ENDPTCTRL: Image::new(value),
        }
    }
    pub fn value(&self) -> u32 {
        self.ENDPTCTRL.read()
    }
}

/// A copy of the `PORTSC1` register
pub struct PortSc {
    pub PORTSC1: Image,
}

impl PortSc {
    pub const fn new(value: u32) -> Self {
        PortSc {
            PORTSC1: Image::new(value),
        }
    }
    pub fn value(&self) -> u32 {
        self.PORTSC1.read()
    }
}

pub mod ENDPTCTRL {
    /// RX endpoint stall
    pub mod RXS {
        pub const offset: u32 = 0;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// RX endpoint type
    pub mod RXT {
        pub const offset: u32 = 2;
        pub const mask: u32 = 0b11 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// RX data toggle reset
    pub mod RXR {
        pub const offset: u32 = 6;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// RX endpoint enable
    pub mod RXE {
        pub const offset: u32 = 7;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// TX endpoint stall
    pub mod TXS {
        pub const offset: u32 = 16;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// TX endpoint type
    pub mod TXT {
        pub const offset: u32 = 18;
        pub const mask: u32 = 0b11 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// TX data toggle reset
    pub mod TXR {
        pub const offset: u32 = 22;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
    /// TX endpoint enable
    pub mod TXE {
        pub const offset: u32 = 23;
        pub const mask: u32 = 1 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
}

pub mod PORTSC1 {
    /// Port test control
    pub mod PTC {
        pub const offset: u32 = 16;
        pub const mask: u32 = 0b1111 << offset;
        pub mod RW {}
        pub mod R {}
        pub mod W {}
    }
}
