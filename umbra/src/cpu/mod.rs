//! The SM83 CPU core: register file, flags, the step state machine, and the
//! interrupt-service sequence. Instruction decode and the per-opcode handlers
//! live in [`execute`].

mod execute;


use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bus::{Bus, BusMaster};
use crate::error::Result;
use crate::interrupts::{Interrupt, InterruptLine};

const ZERO_FLAG: u8 = 0x80;
const SUBTRACTION_FLAG: u8 = 0x40;
const HALF_CARRY_FLAG: u8 = 0x20;
const CARRY_FLAG: u8 = 0x10;

/// A 16-bit register pair. The half accessors and the wide accessor read and
/// write the same cell, so `set_high` is immediately visible through `full`
/// and vice versa.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    derive_more::Display,
    Serialize,
    Deserialize,
)]
#[display("0x{_0:0>4X}")]
pub struct RegPair(u16);

impl RegPair {
    pub fn full(self) -> u16 {
        self.0
    }

    pub fn high(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn low(self) -> u8 {
        self.0 as u8
    }

    pub fn set_full(&mut self, value: u16) {
        self.0 = value;
    }

    pub fn set_high(&mut self, value: u8) {
        self.0 = (self.0 & 0x00FF) | (u16::from(value) << 8);
    }

    pub fn set_low(&mut self, value: u8) {
        self.0 = (self.0 & 0xFF00) | u16::from(value);
    }
}

/// Whether the CPU is fetching instructions or parked by HALT/STOP.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, derive_more::Display, Serialize, Deserialize,
)]
pub enum CpuState {
    #[default]
    Running,
    Halted,
    Stopped,
}

/// The CPU register file and execution state. `cycles` counts M-cycles (four
/// clock ticks each) and only ever grows, modulo the driver rebasing it.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    derive_more::Display,
    Serialize,
    Deserialize,
)]
#[display(
    "CPU {{ AF: {af} BC: {bc} DE: {de} HL: {hl} SP: 0x{sp:0>4X} PC: 0x{pc:0>4X} {state} }}"
)]
pub struct Cpu {
    pub af: RegPair,
    pub bc: RegPair,
    pub de: RegPair,
    pub hl: RegPair,
    pub sp: u16,
    pub pc: u16,
    pub cycles: u64,
    pub ime: bool,
    ei_pending: bool,
    pub state: CpuState,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zero_flag(&self) -> bool {
        self.af.low() & ZERO_FLAG != 0
    }

    pub fn subtraction_flag(&self) -> bool {
        self.af.low() & SUBTRACTION_FLAG != 0
    }

    pub fn half_carry_flag(&self) -> bool {
        self.af.low() & HALF_CARRY_FLAG != 0
    }

    pub fn carry_flag(&self) -> bool {
        self.af.low() & CARRY_FLAG != 0
    }

    /// Writes all four flags at once. The low nibble of F is architecturally
    /// zero, so a full write is the only mutation path.
    pub(crate) fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        let mut f = 0;
        if z {
            f |= ZERO_FLAG;
        }
        if n {
            f |= SUBTRACTION_FLAG;
        }
        if h {
            f |= HALF_CARRY_FLAG;
        }
        if c {
            f |= CARRY_FLAG;
        }
        self.af.set_low(f);
    }

    /// Advances the machine by one unit of work: either the service sequence
    /// for the highest-priority pending interrupt, or one instruction.
    pub fn step(&mut self, bus: &mut Bus, ints: &InterruptLine) -> Result<()> {
        if let Some(int) = ints.get_top(self.ime) {
            return self.service_interrupt(bus, ints, int);
        }
        if self.state != CpuState::Running {
            // A pending enabled request wakes the core even with IME off.
            if ints.any_pending() {
                self.state = CpuState::Running;
            } else {
                self.cycles += 1;
                return Ok(());
            }
        }
        // EI raises IME only after the instruction that follows it.
        let apply_ei = self.ei_pending;
        let op = self.fetch(bus)?;
        self.execute(op, bus)?;
        if apply_ei && self.ei_pending {
            self.ei_pending = false;
            self.ime = true;
        }
        Ok(())
    }

    /// Transfers control to an interrupt vector. The bus is locked for the
    /// whole sequence so another master cannot slip between the stack pushes
    /// and the jump.
    fn service_interrupt(
        &mut self,
        bus: &mut Bus,
        ints: &InterruptLine,
        int: Interrupt,
    ) -> Result<()> {
        trace!("Servicing {int} @ PC 0x{:0>4X}", self.pc);
        let claimed = bus.lock(BusMaster::Cpu);
        debug_assert!(claimed, "interrupt service on a bus held by another master");
        self.ime = false;
        self.ei_pending = false;
        self.state = CpuState::Running;
        ints.clear(int);
        self.push_word(bus, self.pc)?;
        self.pc = int.vector();
        self.cycles += 5;
        bus.unlock(BusMaster::Cpu);
        Ok(())
    }

    /// Reads the byte at PC and advances PC past it.
    pub(crate) fn fetch(&mut self, bus: &Bus) -> Result<u8> {
        let byte = bus.read(self.pc)?;
        self.pc = self.pc.wrapping_add(1);
        Ok(byte)
    }

    /// Fetches a little-endian 16-bit immediate.
    pub(crate) fn fetch_word(&mut self, bus: &Bus) -> Result<u16> {
        let lo = self.fetch(bus)?;
        let hi = self.fetch(bus)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Pushes a word, high byte first, with SP decremented before each write.
    pub(crate) fn push_word(&mut self, bus: &Bus, word: u16) -> Result<()> {
        let [lo, hi] = word.to_le_bytes();
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, hi)?;
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, lo)?;
        Ok(())
    }

    /// Pops a word, low byte first, with SP incremented after each read.
    pub(crate) fn pop_word(&mut self, bus: &Bus) -> Result<u16> {
        let lo = bus.read(self.sp)?;
        self.sp = self.sp.wrapping_add(1);
        let hi = bus.read(self.sp)?;
        self.sp = self.sp.wrapping_add(1);
        Ok(u16::from_le_bytes([lo, hi]))
    }
}
