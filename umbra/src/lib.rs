//! The processing core of a Game Boy emulator: an SM83 CPU, the memory bus it
//! talks through, the interrupt controller, and an event scheduler for
//! device timing. Rendering, audio, input, and cartridge handling beyond the
//! ROM window are the embedder's concern; this crate provides the machine
//! those layers hang off of.
//!
//! All state is owned by a [`GameBoy`] session value, so multiple machines
//! can run side by side in one process.

pub mod bus;
pub mod cpu;
mod error;
pub mod interrupts;
pub mod mem;
pub mod pqueue;
pub mod sched;

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::Bus;
use crate::cpu::Cpu;
use crate::interrupts::InterruptLine;
use crate::mem::{Cartridge, RamRegion};
use crate::sched::{DeviceEvent, Scheduler};

pub use crate::error::{Error, Result};

/// One emulated machine: CPU, bus with the standard memory map wired up,
/// interrupt line, and event scheduler.
pub struct GameBoy {
    cpu: Cpu,
    bus: Bus,
    interrupts: InterruptLine,
    scheduler: Scheduler,
}

impl GameBoy {
    /// Builds a machine around a ROM image. The standard regions are
    /// registered in a fixed order: cartridge, VRAM, WRAM, its echo alias,
    /// HRAM, then the IF and IE interrupt registers.
    pub fn new(rom: Vec<u8>) -> Result<Self> {
        let interrupts = InterruptLine::new();
        let mut bus = Bus::new();
        let wram = RamRegion::wram();
        let echo = RamRegion::echo(&wram);
        bus.register(Rc::new(RefCell::new(Cartridge::new(rom))))?;
        bus.register(Rc::new(RefCell::new(RamRegion::vram())))?;
        bus.register(Rc::new(RefCell::new(wram)))?;
        bus.register(Rc::new(RefCell::new(echo)))?;
        bus.register(Rc::new(RefCell::new(RamRegion::hram())))?;
        bus.register(Rc::new(RefCell::new(interrupts.flag_register())))?;
        bus.register(Rc::new(RefCell::new(interrupts.enable_register())))?;
        Ok(Self {
            cpu: Cpu::new(),
            bus,
            interrupts,
            scheduler: Scheduler::new(),
        })
    }

    /// Advances the CPU by one instruction or interrupt service.
    pub fn step(&mut self) -> Result<()> {
        self.cpu.step(&mut self.bus, &self.interrupts)
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// A handle peripherals use to raise interrupt requests.
    pub fn interrupts(&self) -> InterruptLine {
        self.interrupts.clone()
    }

    /// Queues a device event for the driver loop to run later.
    pub fn schedule(&mut self, event: DeviceEvent) -> Result<()> {
        self.scheduler.schedule(event)
    }

    /// Runs the earliest pending device event.
    pub fn run_next_event(&mut self) -> Result<()> {
        self.scheduler.execute_next()
    }

    /// When the next device event is due, if any. Driver loops compare this
    /// against the CPU's cycle counter to interleave devices correctly.
    pub fn next_event_at(&self) -> Option<u64> {
        self.scheduler.next_timestamp()
    }
}
