//! The interrupt controller. Peripherals raise request flags through a shared
//! [`InterruptLine`]; the CPU polls the controller each step and services the
//! highest-priority enabled request. The two architectural registers, IF
//! (requests, 0xFF0F) and IE (enables, 0xFFFF), are exposed to the bus as
//! single-byte devices backed by the same state.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bus::BusDevice;

pub const IF_ADDRESS: u16 = 0xFF0F;
pub const IE_ADDRESS: u16 = 0xFFFF;

/// The five interrupt sources, in priority order (highest first).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize, Deserialize,
)]
pub enum Interrupt {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// The source's bit in IE and IF. `Stat` carries no bit: requests for it
    /// are dropped and the priority scan skips it.
    fn bitmask(self) -> Option<u8> {
        match self {
            Interrupt::VBlank => Some(0x01),
            Interrupt::Stat => None,
            Interrupt::Timer => Some(0x02),
            Interrupt::Serial => Some(0x04),
            Interrupt::Joypad => Some(0x08),
        }
    }

    /// The fixed handler address the CPU jumps to when servicing this source.
    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x0040,
            Interrupt::Stat => 0x0048,
            Interrupt::Timer => 0x0050,
            Interrupt::Serial => 0x0058,
            Interrupt::Joypad => 0x0060,
        }
    }
}

/// The controller's architectural state. `iff` holds the pending requests
/// (the IF register), `ie` the per-source enables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupts {
    pub ie: u8,
    pub iff: u8,
}

impl Interrupts {
    /// Marks `int` as requested. Sources without a bitmask are ignored.
    pub fn set_flag(&mut self, int: Interrupt) {
        if let Some(mask) = int.bitmask() {
            self.iff |= mask;
        }
    }

    /// Withdraws a request. The CPU calls this for the source it services;
    /// a peripheral may also withdraw its own request before service.
    pub fn clear_flag(&mut self, int: Interrupt) {
        if let Some(mask) = int.bitmask() {
            self.iff &= !mask;
        }
    }

    /// The highest-priority source that is both requested and enabled, or
    /// `None` when nothing is serviceable. The master enable gates the whole
    /// scan: with `ime` false nothing is ever reported here, though a raw
    /// pending request still wakes a halted CPU.
    pub fn get_top(&self, ime: bool) -> Option<Interrupt> {
        if !ime {
            return None;
        }
        let pending = self.ie & self.iff;
        [
            Interrupt::VBlank,
            Interrupt::Stat,
            Interrupt::Timer,
            Interrupt::Serial,
            Interrupt::Joypad,
        ]
        .into_iter()
        .find(|int| int.bitmask().is_some_and(|mask| pending & mask != 0))
    }

    /// True when any enabled source is requested, regardless of the master
    /// enable. This is the HALT wake-up condition.
    pub fn any_pending(&self) -> bool {
        self.ie & self.iff != 0
    }
}

/// A cloneable handle onto the shared controller state. The CPU holds one,
/// every interrupt-raising peripheral holds one, and the two register devices
/// on the bus are views over the same cell.
#[derive(Debug, Default, Clone)]
pub struct InterruptLine(Rc<RefCell<Interrupts>>);

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, int: Interrupt) {
        trace!("Interrupt requested: {int}");
        self.0.borrow_mut().set_flag(int);
    }

    pub fn clear(&self, int: Interrupt) {
        self.0.borrow_mut().clear_flag(int);
    }

    pub fn get_top(&self, ime: bool) -> Option<Interrupt> {
        self.0.borrow().get_top(ime)
    }

    pub fn any_pending(&self) -> bool {
        self.0.borrow().any_pending()
    }

    pub fn snapshot(&self) -> Interrupts {
        *self.0.borrow()
    }

    /// The IF register device, to be registered on the bus at 0xFF0F.
    pub fn flag_register(&self) -> FlagRegister {
        FlagRegister(Rc::clone(&self.0))
    }

    /// The IE register device, to be registered on the bus at 0xFFFF.
    pub fn enable_register(&self) -> EnableRegister {
        EnableRegister(Rc::clone(&self.0))
    }
}

/// Bus view of the IF register. Only the low five bits are meaningful, but
/// software-visible behavior is a plain byte cell.
#[derive(Debug)]
pub struct FlagRegister(Rc<RefCell<Interrupts>>);

impl BusDevice for FlagRegister {
    fn start_addr(&self) -> u16 {
        IF_ADDRESS
    }

    fn end_addr(&self) -> u16 {
        IF_ADDRESS
    }

    fn read(&mut self, addr: u16) -> u8 {
        debug_assert_eq!(addr, IF_ADDRESS);
        self.0.borrow().iff
    }

    fn write(&mut self, addr: u16, value: u8) {
        debug_assert_eq!(addr, IF_ADDRESS);
        self.0.borrow_mut().iff = value;
    }
}

/// Bus view of the IE register.
#[derive(Debug)]
pub struct EnableRegister(Rc<RefCell<Interrupts>>);

impl BusDevice for EnableRegister {
    fn start_addr(&self) -> u16 {
        IE_ADDRESS
    }

    fn end_addr(&self) -> u16 {
        IE_ADDRESS
    }

    fn read(&mut self, addr: u16) -> u8 {
        debug_assert_eq!(addr, IE_ADDRESS);
        self.0.borrow().ie
    }

    fn write(&mut self, addr: u16, value: u8) {
        debug_assert_eq!(addr, IE_ADDRESS);
        self.0.borrow_mut().ie = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_enable_gates_the_scan() {
        let mut ints = Interrupts::default();
        ints.ie = 0xFF;
        ints.set_flag(Interrupt::Timer);
        assert_eq!(ints.get_top(false), None);
        assert_eq!(ints.get_top(true), Some(Interrupt::Timer));
    }

    #[test]
    fn vblank_wins_over_serial() {
        let mut ints = Interrupts::default();
        ints.ie = 0b101;
        ints.iff = 0b101;
        assert_eq!(ints.get_top(true), Some(Interrupt::VBlank));
        ints.clear_flag(Interrupt::VBlank);
        assert_eq!(ints.get_top(true), Some(Interrupt::Serial));
    }

    #[test]
    fn disabled_requests_are_not_reported() {
        let mut ints = Interrupts::default();
        ints.set_flag(Interrupt::Joypad);
        assert_eq!(ints.get_top(true), None);
        assert!(!ints.any_pending());
        ints.ie = 0x08;
        assert_eq!(ints.get_top(true), Some(Interrupt::Joypad));
        assert!(ints.any_pending());
    }

    #[test]
    fn stat_requests_are_dropped() {
        let mut ints = Interrupts::default();
        ints.ie = 0xFF;
        ints.set_flag(Interrupt::Stat);
        assert_eq!(ints.iff, 0);
        assert_eq!(ints.get_top(true), None);
    }

    #[test]
    fn register_devices_share_the_line_state() {
        let line = InterruptLine::new();
        let mut iff = line.flag_register();
        let mut ie = line.enable_register();
        ie.write(IE_ADDRESS, 0x02);
        line.raise(Interrupt::Timer);
        assert_eq!(iff.read(IF_ADDRESS), 0x02);
        assert_eq!(line.get_top(true), Some(Interrupt::Timer));
        iff.write(IF_ADDRESS, 0x00);
        assert_eq!(line.get_top(true), None);
    }
}
