//! Register access helpers
//!
//! Re-exports the RAL macros, and adds the read-modify-write plumbing
//! that routes register images through the endpoint transport.

pub use ral_registers::{modify_reg, read_reg};

use crate::register::{EndptCtrl, PortSc};
use crate::transport::Transport;

/// Apply `func` to a copy of `ENDPTCTRL[endpoint]`, then write it back
///
/// Returns the written value.
pub fn with_endpoint_control<T: Transport + ?Sized>(
    transport: &mut T,
    endpoint: usize,
    func: impl FnOnce(&EndptCtrl),
) -> u32 {
    let endptctrl = EndptCtrl::new(transport.endpoint_control(endpoint));
    func(&endptctrl);
    let value = endptctrl.value();
    transport.set_endpoint_control(endpoint, value);
    value
}

/// Read `ENDPTCTRL[endpoint]` into a register image
pub fn endpoint_control<T: Transport + ?Sized>(transport: &T, endpoint: usize) -> EndptCtrl {
    EndptCtrl::new(transport.endpoint_control(endpoint))
}

/// Apply `func` to a copy of `PORTSC1`, then write it back
pub fn with_port_status<T: Transport + ?Sized>(transport: &mut T, func: impl FnOnce(&PortSc)) {
    let portsc = PortSc::new(transport.port_status());
    func(&portsc);
    transport.set_port_status(portsc.value());
}
