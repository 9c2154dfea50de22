//! FG slave capability.
//!
//! This module hides where an FG lives behind one trait. It provides:
//! 1. **`FgSlave`:** Parameter writes, enable, disable, reset and the interrupt mask.
//! 2. **Backplane FGs:** Register window in a slot, interrupts through the slot's
//!    pending register.
//! 3. **Extension-bus FGs:** Register window behind an adapter card or on the
//!    controller's own port; polled, no interrupts.
//!
//! Both register windows share one layout, so the register sequences live in
//! [`FgWindow`] and the variants only differ in addressing and interrupt handling.

use crate::access::{BusOp, SharedTransport, Transport, TransportExt};
use crate::common::constants::{PEND_FG0_DONE, PEND_FG0_FIFO_LOW};
use crate::common::{Slot, Socket, SocketKind, TransportError, Width};
use crate::protocol::slave::{self, fg, mil};
use crate::protocol::{FgMacro, PolynomialParams};

/// Operations the dispatcher performs on one FG.
pub trait FgSlave: Send {
    /// Socket of the FG.
    fn socket(&self) -> Socket;

    /// FG index within the socket.
    fn device(&self) -> u8;

    /// Queues one parameter set in the FG fifo.
    fn write_param(&self, params: &PolynomialParams) -> Result<(), TransportError>;

    /// Resets the FG, loads the start tag and enables it for the next broadcast start.
    fn enable(&self, tag: u32) -> Result<(), TransportError>;

    /// Stops the FG and masks its interrupts.
    fn disable(&self) -> Result<(), TransportError>;

    /// Clears the FG fifo and counters.
    fn reset(&self) -> Result<(), TransportError>;

    /// Pending bits this FG raises in its slot; 0 for polled FGs.
    fn irq_mask(&self) -> u16;

    /// Parameter sets waiting in the FG fifo.
    fn fifo_level(&self) -> Result<u16, TransportError>;

    /// Returns `true` while a ramp runs.
    fn is_running(&self) -> Result<bool, TransportError>;

    /// Current output value.
    fn actual(&self) -> Result<i32, TransportError>;
}

/// Register sequences on one FG window.
#[derive(Clone)]
pub struct FgWindow {
    transport: SharedTransport,
    base: u64,
}

impl std::fmt::Debug for FgWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FgWindow").field("base", &format_args!("{:#x}", self.base)).finish_non_exhaustive()
    }
}

impl FgWindow {
    /// Window at absolute address `base`.
    pub const fn new(transport: SharedTransport, base: u64) -> Self {
        Self { transport, base }
    }

    /// Absolute window base.
    pub const fn base(&self) -> u64 {
        self.base
    }

    fn write_param(&self, params: &PolynomialParams) -> Result<(), TransportError> {
        let b = self.base;
        // START_L last: it commits the staged set to the fifo.
        self.transport.cycle(&mut [
            BusOp::write(b + fg::CNTRL, Width::U16, u64::from(params.control_bits() | fg::CNTRL_ENABLE)),
            BusOp::write(b + fg::COEFF_A, Width::U16, u64::from(params.coeff_a as u16)),
            BusOp::write(b + fg::COEFF_B, Width::U16, u64::from(params.coeff_b as u16)),
            BusOp::write(b + fg::SHIFT, Width::U16, u64::from(params.shift_reg())),
            BusOp::write(b + fg::START_H, Width::U16, u64::from((params.coeff_c >> 16) as u16)),
            BusOp::write(b + fg::START_L, Width::U16, u64::from(params.coeff_c as u16)),
        ])
    }

    fn enable(&self, tag: u32) -> Result<(), TransportError> {
        let b = self.base;
        self.transport.cycle(&mut [
            BusOp::write(b + fg::CNTRL, Width::U16, u64::from(fg::CNTRL_RESET)),
            BusOp::write(b + fg::TAG_LO, Width::U16, u64::from(tag & 0xFFFF)),
            BusOp::write(b + fg::TAG_HI, Width::U16, u64::from(tag >> 16)),
            BusOp::write(b + fg::CNTRL, Width::U16, u64::from(fg::CNTRL_ENABLE)),
        ])
    }

    fn disable(&self) -> Result<(), TransportError> {
        self.transport.write_u16(self.base + fg::CNTRL, 0)
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.transport.write_u16(self.base + fg::CNTRL, fg::CNTRL_RESET)
    }

    fn fifo_level(&self) -> Result<u16, TransportError> {
        self.transport.read_u16(self.base + fg::FIFO_LEVEL)
    }

    fn is_running(&self) -> Result<bool, TransportError> {
        Ok(self.transport.read_u16(self.base + fg::CNTRL)? & fg::CNTRL_RUNNING != 0)
    }

    fn actual(&self) -> Result<i32, TransportError> {
        let mut ops = [
            BusOp::read(self.base + fg::ACTUAL_HI, Width::U16),
            BusOp::read(self.base + fg::ACTUAL_LO, Width::U16),
        ];
        self.transport.cycle(&mut ops)?;
        Ok(((ops[0].value as u32) << 16 | ops[1].value as u32 & 0xFFFF) as i32)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Backplane FG
// ═══════════════════════════════════════════════════════════════════════════

/// FG on a backplane card.
#[derive(Debug, Clone)]
pub struct BackplaneFg {
    window: FgWindow,
    slot_base: u64,
    slot: Slot,
    device: u8,
}

impl BackplaneFg {
    /// FG `device` of the card in `slot`.
    pub fn new(transport: SharedTransport, bus_base: u64, slot: Slot, device: u8) -> Self {
        let slot_base = slot.base_address(bus_base);
        Self {
            window: FgWindow::new(transport, slot_base + fg::window(device)),
            slot_base,
            slot,
            device,
        }
    }
}

impl FgSlave for BackplaneFg {
    fn socket(&self) -> Socket {
        Socket::backplane(self.slot)
    }

    fn device(&self) -> u8 {
        self.device
    }

    fn write_param(&self, params: &PolynomialParams) -> Result<(), TransportError> {
        self.window.write_param(params)
    }

    fn enable(&self, tag: u32) -> Result<(), TransportError> {
        let mask = self.irq_mask();
        let t = &self.window.transport;
        // Stale notifications of an earlier run must not reach the new one.
        t.write_u16(self.slot_base + slave::INT_PENDING, mask)?;
        self.window.enable(tag)?;
        let _ = t.modify_u16(self.slot_base + slave::INT_ENABLE, 0, mask)?;
        Ok(())
    }

    fn disable(&self) -> Result<(), TransportError> {
        let t = &self.window.transport;
        let _ = t.modify_u16(self.slot_base + slave::INT_ENABLE, self.irq_mask(), 0)?;
        self.window.disable()
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.window.reset()
    }

    fn irq_mask(&self) -> u16 {
        (PEND_FG0_FIFO_LOW | PEND_FG0_DONE) << (2 * u16::from(self.device))
    }

    fn fifo_level(&self) -> Result<u16, TransportError> {
        self.window.fifo_level()
    }

    fn is_running(&self) -> Result<bool, TransportError> {
        self.window.is_running()
    }

    fn actual(&self) -> Result<i32, TransportError> {
        self.window.actual()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Extension-bus FG
// ═══════════════════════════════════════════════════════════════════════════

/// FG on an extension-bus interface card.
#[derive(Debug, Clone)]
pub struct MilFg {
    window: FgWindow,
    socket: Socket,
}

impl MilFg {
    /// FG behind the port at `port_base`.
    pub fn new(transport: SharedTransport, port_base: u64, socket: Socket, ifk: u8) -> Self {
        Self {
            window: FgWindow::new(transport, port_base + mil::window(ifk)),
            socket,
        }
    }
}

impl FgSlave for MilFg {
    fn socket(&self) -> Socket {
        self.socket
    }

    fn device(&self) -> u8 {
        0
    }

    fn write_param(&self, params: &PolynomialParams) -> Result<(), TransportError> {
        self.window.write_param(params)
    }

    fn enable(&self, tag: u32) -> Result<(), TransportError> {
        self.window.enable(tag)
    }

    fn disable(&self) -> Result<(), TransportError> {
        self.window.disable()
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.window.reset()
    }

    fn irq_mask(&self) -> u16 {
        0
    }

    fn fifo_level(&self) -> Result<u16, TransportError> {
        self.window.fifo_level()
    }

    fn is_running(&self) -> Result<bool, TransportError> {
        self.window.is_running()
    }

    fn actual(&self) -> Result<i32, TransportError> {
        self.window.actual()
    }
}

/// Creates the slave driver for a macro table entry.
///
/// # Returns
///
/// `None` for a malformed socket, or an extension-bus FG on the controller port
/// when the controller is absent.
pub fn for_macro(
    transport: &SharedTransport,
    entry: &FgMacro,
    bus_base: u64,
    mil_base: Option<u64>,
) -> Option<Box<dyn FgSlave>> {
    let t = SharedTransport::clone(transport);
    Some(match entry.socket.kind()? {
        SocketKind::Backplane(slot) => Box::new(BackplaneFg::new(t, bus_base, slot, entry.device)),
        SocketKind::MilOnBackplane { slot, ifk } => {
            Box::new(MilFg::new(t, slot.base_address(bus_base), entry.socket, ifk))
        }
        SocketKind::MilDirect { ifk } => Box::new(MilFg::new(t, mil_base?, entry.socket, ifk)),
    })
}
