//! Memory-mapped register access over a serial transport.
//!
//! This module implements typed bus access on top of a request/response transport. It provides:
//! 1. **Transport seam:** The `Transport` trait executing one cycle of read/write operations.
//! 2. **Typed access:** Multi-element reads and writes with width, byte order and address mode.
//! 3. **Chunking:** Splitting long accesses into cycles of at most `max_cycle_ops` operations.
//! 4. **DDR3 ordering:** 64-bit word access split into 32-bit halves in the order the
//!    off-chip RAM requires (write high then low, read low then high).

use std::sync::Arc;

use crate::common::constants::MAX_CYCLE_OPS;
use crate::common::{AddrMode, Format, TransportError, Width};

/// Direction of a single bus operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    /// Read; the result is stored in [`BusOp::value`].
    Read,
    /// Write of [`BusOp::value`].
    Write,
}

/// One operation of a transport cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusOp {
    /// Read or write.
    pub kind: OpKind,
    /// Bus address.
    pub addr: u64,
    /// Access width.
    pub width: Width,
    /// Written value, or the read result after the cycle.
    pub value: u64,
}

impl BusOp {
    /// Creates a read operation.
    #[inline]
    pub const fn read(addr: u64, width: Width) -> Self {
        Self {
            kind: OpKind::Read,
            addr,
            width,
            value: 0,
        }
    }

    /// Creates a write operation.
    #[inline]
    pub const fn write(addr: u64, width: Width, value: u64) -> Self {
        Self {
            kind: OpKind::Write,
            addr,
            width,
            value: value & width.mask(),
        }
    }
}

/// Request/response serial-bus transport.
///
/// One call to [`cycle`](Transport::cycle) is one bus cycle: the operations are
/// executed in order and either all are acknowledged or the call fails.
/// Implementations use interior mutability so a transport can be shared.
pub trait Transport {
    /// Executes the operations of one cycle in order.
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError>;

    /// Returns the maximum number of operations per cycle.
    fn max_cycle_ops(&self) -> usize {
        MAX_CYCLE_OPS
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        (**self).cycle(ops)
    }

    fn max_cycle_ops(&self) -> usize {
        (**self).max_cycle_ops()
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        (**self).cycle(ops)
    }

    fn max_cycle_ops(&self) -> usize {
        (**self).max_cycle_ops()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn cycle(&self, ops: &mut [BusOp]) -> Result<(), TransportError> {
        (**self).cycle(ops)
    }

    fn max_cycle_ops(&self) -> usize {
        (**self).max_cycle_ops()
    }
}

/// Thread-safe shared transport handle.
pub type SharedTransport = Arc<dyn Transport + Send + Sync>;

fn cycle_len<T: Transport + ?Sized>(transport: &T) -> usize {
    transport.max_cycle_ops().clamp(1, MAX_CYCLE_OPS)
}

/// Reads `out.len()` elements starting at `addr`.
///
/// # Arguments
///
/// * `transport` - The transport executing the cycles.
/// * `addr` - Address of the first element.
/// * `out` - Destination; each element is zero-extended into a `u64`.
/// * `format` - Element width and byte order.
/// * `mode` - Address stride between elements.
pub fn read<T: Transport + ?Sized>(
    transport: &T,
    addr: u64,
    out: &mut [u64],
    format: Format,
    mode: AddrMode,
) -> Result<(), TransportError> {
    let chunk = cycle_len(transport);
    let mut ops = Vec::with_capacity(chunk.min(out.len()));
    for (c, slice) in out.chunks_mut(chunk).enumerate() {
        ops.clear();
        let first = (c * chunk) as u64;
        ops.extend((0..slice.len() as u64).map(|i| {
            BusOp::read(mode.address(addr, first + i, format.width), format.width)
        }));
        transport.cycle(&mut ops)?;
        for (dst, op) in slice.iter_mut().zip(&ops) {
            *dst = format.from_bus(op.value);
        }
    }
    Ok(())
}

/// Writes `data` as elements starting at `addr`.
///
/// Values wider than the element width are truncated.
pub fn write<T: Transport + ?Sized>(
    transport: &T,
    addr: u64,
    data: &[u64],
    format: Format,
    mode: AddrMode,
) -> Result<(), TransportError> {
    let chunk = cycle_len(transport);
    let mut ops = Vec::with_capacity(chunk.min(data.len()));
    for (c, slice) in data.chunks(chunk).enumerate() {
        ops.clear();
        let first = (c * chunk) as u64;
        ops.extend(slice.iter().enumerate().map(|(i, v)| {
            let a = mode.address(addr, first + i as u64, format.width);
            BusOp::write(a, format.width, format.to_bus(*v))
        }));
        transport.cycle(&mut ops)?;
    }
    Ok(())
}

fn ddr3_word_addr(addr: u64, index: u64, mode: AddrMode) -> u64 {
    match mode {
        AddrMode::Linear => addr + index * 8,
        AddrMode::Frozen | AddrMode::Toggle64 => addr,
    }
}

/// Writes 64-bit words to the off-chip RAM window.
///
/// Each word is written as two 32-bit halves: the high half at `+0` first, then
/// the low half at `+4`, which commits the word. Both halves of one word are
/// always carried by the same cycle.
///
/// [`AddrMode::Frozen`] and [`AddrMode::Toggle64`] both keep every word at `addr`;
/// only [`AddrMode::Linear`] advances it.
pub fn ddr3_write<T: Transport + ?Sized>(
    transport: &T,
    addr: u64,
    data: &[u64],
    mode: AddrMode,
) -> Result<(), TransportError> {
    let words_per_cycle = (cycle_len(transport) / 2).max(1);
    let mut ops = Vec::with_capacity(2 * words_per_cycle.min(data.len()));
    for (c, slice) in data.chunks(words_per_cycle).enumerate() {
        ops.clear();
        for (i, word) in slice.iter().enumerate() {
            let a = ddr3_word_addr(addr, (c * words_per_cycle + i) as u64, mode);
            ops.push(BusOp::write(a, Width::U32, word >> 32));
            ops.push(BusOp::write(a + 4, Width::U32, word & 0xFFFF_FFFF));
        }
        transport.cycle(&mut ops)?;
    }
    Ok(())
}

/// Reads 64-bit words from the off-chip RAM window.
///
/// The low half at `+4` is read first (latching the word), the high half at `+0` second.
/// Address modes behave as in [`ddr3_write`].
pub fn ddr3_read<T: Transport + ?Sized>(
    transport: &T,
    addr: u64,
    out: &mut [u64],
    mode: AddrMode,
) -> Result<(), TransportError> {
    let words_per_cycle = (cycle_len(transport) / 2).max(1);
    let mut ops = Vec::with_capacity(2 * words_per_cycle.min(out.len()));
    for (c, slice) in out.chunks_mut(words_per_cycle).enumerate() {
        ops.clear();
        for i in 0..slice.len() {
            let a = ddr3_word_addr(addr, (c * words_per_cycle + i) as u64, mode);
            ops.push(BusOp::read(a + 4, Width::U32));
            ops.push(BusOp::read(a, Width::U32));
        }
        transport.cycle(&mut ops)?;
        for (dst, pair) in slice.iter_mut().zip(ops.chunks_exact(2)) {
            *dst = pair[1].value << 32 | pair[0].value;
        }
    }
    Ok(())
}

/// Single-register convenience accessors for any [`Transport`].
pub trait TransportExt: Transport {
    /// Reads one big-endian 16-bit register.
    fn read_u16(&self, addr: u64) -> Result<u16, TransportError> {
        let mut op = [BusOp::read(addr, Width::U16)];
        self.cycle(&mut op)?;
        Ok(op[0].value as u16)
    }

    /// Writes one 16-bit register.
    fn write_u16(&self, addr: u64, value: u16) -> Result<(), TransportError> {
        self.cycle(&mut [BusOp::write(addr, Width::U16, value as u64)])
    }

    /// Reads one 32-bit word.
    fn read_u32(&self, addr: u64) -> Result<u32, TransportError> {
        let mut op = [BusOp::read(addr, Width::U32)];
        self.cycle(&mut op)?;
        Ok(op[0].value as u32)
    }

    /// Writes one 32-bit word.
    fn write_u32(&self, addr: u64, value: u32) -> Result<(), TransportError> {
        self.cycle(&mut [BusOp::write(addr, Width::U32, value as u64)])
    }

    /// Reads one 64-bit word as a single bus operation.
    fn read_u64(&self, addr: u64) -> Result<u64, TransportError> {
        let mut op = [BusOp::read(addr, Width::U64)];
        self.cycle(&mut op)?;
        Ok(op[0].value)
    }

    /// Read-modify-write of a 16-bit register: clears `clear`, then sets `set`.
    fn modify_u16(&self, addr: u64, clear: u16, set: u16) -> Result<u16, TransportError> {
        let value = (self.read_u16(addr)? & !clear) | set;
        self.write_u16(addr, value)?;
        Ok(value)
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}
