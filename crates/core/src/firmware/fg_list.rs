//! FG macro table.
//!
//! The table lists every FG the firmware can drive, in discovery order: backplane
//! FG cards by ascending slot, then the interface cards behind each extension-bus
//! adapter, then those on the controller's own port. The host binds channels to
//! table indices, so the order is stable across rescans of unchanged hardware.

use tracing::warn;

use super::slaves::{self, SlaveInfo};
use crate::access::Transport;
use crate::common::{Socket, TransportError};
use crate::protocol::FgMacro;

/// Output resolution of every FG type the firmware drives.
pub const OUTPUT_BITS: u8 = 16;

/// Discovered FGs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MacroTable {
    macros: Vec<FgMacro>,
    max: usize,
}

impl MacroTable {
    /// Creates an empty table holding up to `max` entries.
    pub const fn new(max: usize) -> Self {
        Self {
            macros: Vec::new(),
            max,
        }
    }

    /// Builds the table from scanned slaves and extension-bus ports.
    ///
    /// # Arguments
    ///
    /// * `transport` - Transport used to list interface cards.
    /// * `slaves` - Backplane cards in slot order.
    /// * `bus_base` - Backplane window base.
    /// * `mil_base` - Extension-bus controller base, if present.
    /// * `max` - Table capacity; FGs beyond it are left out with a warning.
    pub fn build<T: Transport + ?Sized>(
        transport: &T,
        slaves: &[SlaveInfo],
        bus_base: u64,
        mil_base: Option<u64>,
        max: usize,
    ) -> Result<Self, TransportError> {
        let mut table = Self::new(max);
        for card in slaves {
            for device in 0..card.fg_count() {
                table.add(FgMacro {
                    socket: Socket::backplane(card.slot),
                    device,
                    version: card.version as u8,
                    output_bits: OUTPUT_BITS,
                });
            }
        }
        for card in slaves.iter().filter(|c| c.is_mil_adapter()) {
            for ifk in slaves::read_ifks(transport, card.slot.base_address(bus_base))? {
                table.add(FgMacro {
                    socket: Socket::mil_on_backplane(card.slot, ifk),
                    device: 0,
                    version: card.version as u8,
                    output_bits: OUTPUT_BITS,
                });
            }
        }
        if let Some(base) = mil_base {
            for ifk in slaves::read_ifks(transport, base)? {
                table.add(FgMacro {
                    socket: Socket::mil_direct(ifk),
                    device: 0,
                    version: 1,
                    output_bits: OUTPUT_BITS,
                });
            }
        }
        Ok(table)
    }

    fn add(&mut self, entry: FgMacro) {
        if self.macros.len() >= self.max {
            warn!(fg = %entry, max = self.max, "macro table full, fg left out");
            return;
        }
        self.macros.push(entry);
    }

    /// Entry `index`.
    pub fn get(&self, index: usize) -> Option<&FgMacro> {
        self.macros.get(index)
    }

    /// Index of the FG `device` in `socket`.
    pub fn find(&self, socket: Socket, device: u8) -> Option<usize> {
        self.macros.iter().position(|m| m.socket == socket && m.device == device)
    }

    /// All entries.
    pub fn entries(&self) -> &[FgMacro] {
        &self.macros
    }

    /// Number of entries.
    pub const fn len(&self) -> usize {
        self.macros.len()
    }

    /// Returns `true` if no FG was found.
    pub const fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.macros.clear();
    }
}
