//! Memory-backed bus devices: plain RAM regions, the echo alias over working
//! RAM, and the cartridge ROM window. Address constants for the standard map
//! live here too.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bus::BusDevice;

pub const ROM_START: u16 = 0x0000;
pub const ROM_END: u16 = 0x7FFF;
pub const VRAM_START: u16 = 0x8000;
pub const VRAM_END: u16 = 0x9FFF;
pub const WRAM_START: u16 = 0xC000;
pub const WRAM_END: u16 = 0xDFFF;
pub const ECHO_START: u16 = 0xE000;
pub const ECHO_END: u16 = 0xFDFF;
pub const HRAM_START: u16 = 0xFF80;
pub const HRAM_END: u16 = 0xFFFE;

/// A byte-addressable RAM region. Storage sits behind a shared handle so that
/// a second region can alias it: echo RAM is a [`RamRegion::mirror`] of
/// working RAM, two bus connections over one buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamRegion {
    start: u16,
    end: u16,
    bytes: Rc<RefCell<Box<[u8]>>>,
}

impl RamRegion {
    /// A zero-filled region spanning `start..=end`.
    pub fn new(start: u16, end: u16) -> Self {
        debug_assert!(start <= end);
        let len = usize::from(end - start) + 1;
        Self {
            start,
            end,
            bytes: Rc::new(RefCell::new(vec![0; len].into_boxed_slice())),
        }
    }

    /// A second window over this region's storage at a different address
    /// range. The mirror may be shorter than the storage (echo RAM exposes
    /// only the first 0x1E00 bytes of working RAM) but never longer.
    pub fn mirror(&self, start: u16, end: u16) -> Self {
        debug_assert!(start <= end);
        debug_assert!(usize::from(end - start) < self.bytes.borrow().len());
        Self {
            start,
            end,
            bytes: Rc::clone(&self.bytes),
        }
    }

    pub fn vram() -> Self {
        Self::new(VRAM_START, VRAM_END)
    }

    pub fn wram() -> Self {
        Self::new(WRAM_START, WRAM_END)
    }

    /// The echo alias of a working-RAM region.
    pub fn echo(wram: &Self) -> Self {
        wram.mirror(ECHO_START, ECHO_END)
    }

    pub fn hram() -> Self {
        Self::new(HRAM_START, HRAM_END)
    }
}

impl BusDevice for RamRegion {
    fn start_addr(&self) -> u16 {
        self.start
    }

    fn end_addr(&self) -> u16 {
        self.end
    }

    fn read(&mut self, addr: u16) -> u8 {
        self.bytes.borrow()[usize::from(addr - self.start)]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.bytes.borrow_mut()[usize::from(addr - self.start)] = value;
    }
}

/// The cartridge ROM window, 0x0000..=0x7FFF, over a caller-supplied image.
/// Loading and bank switching are the embedder's concern; this device serves
/// whatever bytes it was handed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    rom: Vec<u8>,
}

impl Cartridge {
    pub fn new(rom: Vec<u8>) -> Self {
        Self { rom }
    }
}

impl BusDevice for Cartridge {
    fn start_addr(&self) -> u16 {
        ROM_START
    }

    fn end_addr(&self) -> u16 {
        ROM_END
    }

    /// Reads past the end of a short image float high, like unconnected
    /// cartridge pins.
    fn read(&mut self, addr: u16) -> u8 {
        self.rom.get(usize::from(addr)).copied().unwrap_or(0xFF)
    }

    fn write(&mut self, addr: u16, value: u8) {
        warn!("Ignoring write of 0x{value:0>2X} to ROM @ 0x{addr:0>4X}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_aliases_working_ram_both_ways() {
        let mut wram = RamRegion::wram();
        let mut echo = RamRegion::echo(&wram);
        wram.write(0xC123, 0xAB);
        assert_eq!(echo.read(0xE123), 0xAB);
        echo.write(0xE456, 0xCD);
        assert_eq!(wram.read(0xC456), 0xCD);
    }

    #[test]
    fn regions_index_from_their_own_base() {
        let mut hram = RamRegion::hram();
        hram.write(HRAM_START, 0x11);
        hram.write(HRAM_END, 0x22);
        assert_eq!(hram.read(HRAM_START), 0x11);
        assert_eq!(hram.read(HRAM_END), 0x22);
    }

    #[test]
    fn cartridge_is_read_only_and_pads_short_images() {
        let mut cart = Cartridge::new(vec![0x00, 0xC3, 0x50, 0x01]);
        assert_eq!(cart.read(0x0001), 0xC3);
        cart.write(0x0001, 0x00);
        assert_eq!(cart.read(0x0001), 0xC3);
        assert_eq!(cart.read(0x4000), 0xFF);
    }
}
