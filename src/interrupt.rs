//! Interrupt front-end
//!
//! [`Controller`] owns a [`Device`] behind a critical section mutex, and
//! turns controller interrupts into calls on that device. The link flags
//! that a polling loop wants to see are published as atomics, so reading
//! them never needs a critical section.

use crate::{
    device::Device,
    endpoint::{self, EndpointConfig, Role},
    error::Result,
    transport::Transport,
};
use core::{
    cell::RefCell,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};
use cortex_m::interrupt::{self, CriticalSection, Mutex};
use usb_device::{endpoint::EndpointAddress, UsbDirection};

bitflags::bitflags! {
    /// Device controller interrupt status
    ///
    /// Bits use the `USBSTS` / `USBINTR` layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts : u32 {
        /// A transfer completed
        const USB = 1 << 0;
        const ERROR = 1 << 1;
        const PORT_CHANGE = 1 << 2;
        const RESET = 1 << 6;
        const SOF = 1 << 7;
        const SUSPEND = 1 << 8;
    }
}

/// A completion reported for one endpoint half
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum EndpointEvent {
    /// A setup packet is waiting
    Setup,
    /// An OUT transfer completed
    DataReceived,
    /// An IN transfer completed
    DataTransmitted,
}

/// Link flags shared with the polling loop
#[derive(Debug)]
pub struct LinkStatus {
    attached: AtomicBool,
    configured: AtomicBool,
    host_connected: AtomicBool,
    interrupts: AtomicU32,
}

impl LinkStatus {
    const fn new() -> Self {
        LinkStatus {
            attached: AtomicBool::new(false),
            configured: AtomicBool::new(false),
            host_connected: AtomicBool::new(false),
            interrupts: AtomicU32::new(0),
        }
    }

    /// `true` once the controller has completed a transfer since the last reset
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    /// `true` while the host holds DTR
    pub fn is_host_connected(&self) -> bool {
        self.host_connected.load(Ordering::SeqCst)
    }

    /// Interrupts handled so far
    pub fn interrupt_count(&self) -> u32 {
        self.interrupts.load(Ordering::SeqCst)
    }
}

/// Endpoint roles, indexed by endpoint number, then direction
type Routes = [[Option<Role>; 2]; 16];

const fn direction_index(direction: UsbDirection) -> usize {
    match direction {
        UsbDirection::Out => 0,
        UsbDirection::In => 1,
    }
}

const fn routes(table: &[EndpointConfig]) -> Routes {
    let mut routes: Routes = [[None; 2]; 16];
    let mut i = 0;
    while i < table.len() {
        let ep = &table[i];
        routes[ep.number()][direction_index(ep.direction())] = Some(ep.role);
        i += 1;
    }
    routes
}

const ROUTES: Routes = routes(&endpoint::TABLE);

/// Interrupt-driven access to a [`Device`]
///
/// Place the controller in a `static`, and call [`on_interrupt`](Controller::on_interrupt)
/// and [`on_endpoint_event`](Controller::on_endpoint_event) from the USB
/// interrupt handler. Use [`with_device`](Controller::with_device) from
/// thread mode.
pub struct Controller<T> {
    device: Mutex<RefCell<Device<T>>>,
    link: LinkStatus,
    routes: Routes,
}

impl<T: Transport> Controller<T> {
    /// Wrap `device`
    ///
    /// This is a `const fn`, so the controller can be built in a `static`
    /// initializer when the transport and its configuration can be.
    pub const fn new(device: Device<T>) -> Self {
        Controller {
            device: Mutex::new(RefCell::new(device)),
            link: LinkStatus::new(),
            routes: ROUTES,
        }
    }

    /// Link flags, readable from any context
    pub fn link(&self) -> &LinkStatus {
        &self.link
    }

    /// Handle controller status bits
    pub fn on_interrupt(&self, cs: &CriticalSection, status: Interrupts) {
        // Only updated inside a critical section
        let count = self.link.interrupts.load(Ordering::SeqCst);
        self.link
            .interrupts
            .store(count.wrapping_add(1), Ordering::SeqCst);

        let mut device = self.device.borrow(cs).borrow_mut();
        if status.contains(Interrupts::RESET) {
            self.link.attached.store(false, Ordering::SeqCst);
            device.bus_reset();
            info!("RESET");
        }
        if status.contains(Interrupts::USB) {
            self.link.attached.store(true, Ordering::SeqCst);
        }
        if status.contains(Interrupts::SUSPEND) {
            debug!("SUSPEND");
        }
        if status.contains(Interrupts::PORT_CHANGE) {
            debug!("PORT CHANGE");
        }
        if status.contains(Interrupts::ERROR) {
            warn!("USB ERROR INTERRUPT");
        }
        self.publish(&device);
    }

    /// Route an endpoint completion to the device
    ///
    /// Events on endpoints the device doesn't use are logged and ignored.
    pub fn on_endpoint_event(
        &self,
        cs: &CriticalSection,
        ep: EndpointAddress,
        event: EndpointEvent,
    ) -> Result<()> {
        let role = self
            .routes
            .get(ep.index())
            .and_then(|halves| halves[direction_index(ep.direction())]);

        let mut device = self.device.borrow(cs).borrow_mut();
        let result = match (role, event) {
            (Some(Role::Control), EndpointEvent::Setup) => device.handle_setup(),
            (Some(Role::Control), EndpointEvent::DataReceived) => device.handle_control_out(),
            (Some(Role::CdcData), EndpointEvent::DataReceived) => {
                device.receive_data().map(|_| ())
            }
            (Some(_), EndpointEvent::DataTransmitted) => {
                trace!("EP{} {:?} SENT", ep.index(), ep.direction());
                Ok(())
            }
            (Some(role), event) => {
                debug!(
                    "EP{} {:?} ignored {:?} {:?}",
                    ep.index(),
                    ep.direction(),
                    role,
                    event
                );
                Ok(())
            }
            (None, event) => {
                debug!(
                    "EP{} {:?} not in use, dropped {:?}",
                    ep.index(),
                    ep.direction(),
                    event
                );
                Ok(())
            }
        };
        self.publish(&device);
        result
    }

    /// Access the device inside an existing critical section
    pub fn borrow_device<R>(
        &self,
        cs: &CriticalSection,
        func: impl FnOnce(&mut Device<T>) -> R,
    ) -> R {
        let mut device = self.device.borrow(cs).borrow_mut();
        let result = func(&mut *device);
        self.publish(&device);
        result
    }

    /// Access the device from thread mode
    pub fn with_device<R>(&self, func: impl FnOnce(&mut Device<T>) -> R) -> R {
        interrupt::free(|cs| self.borrow_device(cs, func))
    }

    fn publish(&self, device: &Device<T>) {
        self.link
            .configured
            .store(device.is_configured(), Ordering::SeqCst);
        self.link
            .host_connected
            .store(device.cdc().is_connected(), Ordering::SeqCst);
    }
}
