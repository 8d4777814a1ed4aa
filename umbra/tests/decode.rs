//! Every opcode in both tables must decode and execute without panicking or
//! touching an unmapped address. Each opcode runs on a fresh machine whose
//! whole address space is RAM, with the pointer registers parked somewhere
//! harmless.

use std::cell::RefCell;
use std::rc::Rc;

use test_log::test;
use umbra::bus::Bus;
use umbra::cpu::Cpu;
use umbra::interrupts::InterruptLine;
use umbra::mem::RamRegion;

fn flat_machine() -> (Cpu, Bus, InterruptLine) {
    let mut bus = Bus::new();
    bus.register(Rc::new(RefCell::new(RamRegion::new(0x0000, 0xFFFF))))
        .unwrap();
    let mut cpu = Cpu::new();
    cpu.pc = 0x0200;
    cpu.sp = 0x9000;
    cpu.hl.set_full(0x4000);
    cpu.bc.set_full(0x4100);
    cpu.de.set_full(0x4200);
    (cpu, bus, InterruptLine::new())
}

#[test]
fn every_primary_opcode_executes() {
    for op in 0x00..=0xFFu8 {
        let (mut cpu, mut bus, ints) = flat_machine();
        // Two operand bytes so immediates and addresses are well-defined.
        for (i, byte) in [op, 0x34, 0x12].into_iter().enumerate() {
            bus.write(0x0200 + i as u16, byte).unwrap();
        }
        let before = cpu.cycles;
        cpu.step(&mut bus, &ints)
            .unwrap_or_else(|err| panic!("opcode 0x{op:0>2X} failed: {err}"));
        assert!(cpu.cycles > before, "opcode 0x{op:0>2X} cost no cycles");
    }
}

#[test]
fn every_prefixed_opcode_executes() {
    for op in 0x00..=0xFFu8 {
        let (mut cpu, mut bus, ints) = flat_machine();
        bus.write(0x0200, 0xCB).unwrap();
        bus.write(0x0201, op).unwrap();
        let before = cpu.cycles;
        cpu.step(&mut bus, &ints)
            .unwrap_or_else(|err| panic!("prefixed opcode 0x{op:0>2X} failed: {err}"));
        assert!(cpu.cycles >= before + 2, "prefixed 0x{op:0>2X} undercounted");
        assert_eq!(cpu.pc, 0x0202);
    }
}
