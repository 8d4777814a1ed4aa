//! The memory bus. Every fetch, load, and store in the machine funnels
//! through here: the bus resolves a 16-bit address to exactly one registered
//! device and forwards the access. The bus itself holds no data.

use std::cell::RefCell;
use std::rc::Rc;

use heapless::Vec as InlineVec;
use tracing::trace;

use crate::error::{Error, Result};

/// The fixed size of the connection table. Boot wiring registers well under
/// this; hitting the limit is a configuration defect.
pub const MAX_BUS_DEVICES: usize = 20;

/// The capability contract a peripheral implements to participate on the bus.
///
/// A device claims one inclusive address range and serves byte reads and
/// writes within it. Reads take `&mut self` because real registers may mutate
/// on read (e.g. auto-clearing status bits). Addresses handed to a device are
/// absolute; the device subtracts its own base.
pub trait BusDevice {
    /// First address (inclusive) this device claims.
    fn start_addr(&self) -> u16;

    /// Last address (inclusive) this device claims. Must be >= `start_addr`.
    fn end_addr(&self) -> u16;

    fn read(&mut self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, value: u8);
}

/// Devices are shared handles so one owner can back several connections: the
/// echo RAM alias and the working RAM it mirrors are two connections over one
/// storage cell, and the interrupt controller sits behind both the IE and IF
/// register connections.
pub type SharedDevice = Rc<RefCell<dyn BusDevice>>;

/// Identifies a bus master for lock arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum BusMaster {
    Cpu,
    Dma,
}

/// The interconnect: an ordered table of device connections plus the current
/// lock holder. Built once at session boot, then only read/written through.
#[derive(Default)]
pub struct Bus {
    connections: InlineVec<SharedDevice, MAX_BUS_DEVICES>,
    holder: Option<BusMaster>,
}

impl Bus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device connection. Must only be called during boot wiring;
    /// registration order is the address-lookup order.
    ///
    /// Ranges may not overlap. Aliased regions (echo RAM) are expressed as
    /// distinct ranges over shared storage, so an overlap here is always a
    /// wiring defect.
    pub fn register(&mut self, device: SharedDevice) -> Result<()> {
        let (start, end) = {
            let dev = device.borrow();
            (dev.start_addr(), dev.end_addr())
        };
        debug_assert!(start <= end, "inverted device range");
        for conn in &self.connections {
            let conn = conn.borrow();
            if start <= conn.end_addr() && conn.start_addr() <= end {
                return Err(Error::OverlappingRange { start, end });
            }
        }
        self.connections
            .push(device)
            .map_err(|_| Error::CapacityExceeded)
    }

    /// Finds the device whose range contains `addr`. First registered match
    /// wins.
    fn find_device(&self, addr: u16) -> Result<&SharedDevice> {
        self.connections
            .iter()
            .find(|conn| {
                let conn = conn.borrow();
                conn.start_addr() <= addr && addr <= conn.end_addr()
            })
            .ok_or(Error::UnmappedAddress { addr })
    }

    pub fn read(&self, addr: u16) -> Result<u8> {
        let device = self.find_device(addr)?;
        Ok(device.borrow_mut().read(addr))
    }

    pub fn write(&self, addr: u16, value: u8) -> Result<()> {
        trace!("Bus write 0x{value:0>2X} @ 0x{addr:0>4X}");
        let device = self.find_device(addr)?;
        device.borrow_mut().write(addr, value);
        Ok(())
    }

    /// Claims the bus for a multi-step transaction. Returns false while
    /// another master holds it.
    ///
    /// This is a cooperative protocol marker, not an OS mutex: execution is a
    /// single logical thread, but a master running a sequence that must not
    /// be interleaved (the CPU's interrupt-service pushes, a DMA burst) locks
    /// around it so other masters know to back off.
    pub fn lock(&mut self, master: BusMaster) -> bool {
        match self.holder {
            Some(holder) if holder != master => false,
            _ => {
                self.holder = Some(master);
                true
            }
        }
    }

    /// Releases the bus. Unlocking a bus held by someone else is a protocol
    /// violation by the caller.
    pub fn unlock(&mut self, master: BusMaster) {
        debug_assert_eq!(self.holder, Some(master), "unlock by non-holder");
        self.holder = None;
    }

    /// True while a *different* master holds the bus. Timing-sensitive
    /// masters check this before issuing bus operations.
    pub fn locked_out(&self, master: BusMaster) -> bool {
        self.holder.is_some_and(|holder| holder != master)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::RamRegion;

    fn wired_bus() -> Bus {
        let mut bus = Bus::new();
        bus.register(Rc::new(RefCell::new(RamRegion::new(0x1000, 0x1FFF))))
            .unwrap();
        bus.register(Rc::new(RefCell::new(RamRegion::new(0x3000, 0x3FFF))))
            .unwrap();
        bus
    }

    #[test]
    fn unmapped_addresses_are_rejected() {
        let bus = wired_bus();
        assert_eq!(bus.read(0x2000), Err(Error::UnmappedAddress { addr: 0x2000 }));
        assert_eq!(
            bus.write(0x0000, 0xAA),
            Err(Error::UnmappedAddress { addr: 0x0000 })
        );
    }

    #[test]
    fn dispatch_reaches_only_the_owning_device() {
        let bus = wired_bus();
        bus.write(0x1004, 0x5A).unwrap();
        assert_eq!(bus.read(0x1004), Ok(0x5A));
        // The other device, at the same offset into its own range, is
        // untouched.
        assert_eq!(bus.read(0x3004), Ok(0x00));
    }

    #[test]
    fn overlapping_registration_is_a_wiring_error() {
        let mut bus = wired_bus();
        let overlap = Rc::new(RefCell::new(RamRegion::new(0x1800, 0x27FF)));
        assert_eq!(
            bus.register(overlap),
            Err(Error::OverlappingRange {
                start: 0x1800,
                end: 0x27FF
            })
        );
    }

    #[test]
    fn connection_table_has_fixed_capacity() {
        let mut bus = Bus::new();
        for i in 0..MAX_BUS_DEVICES as u16 {
            let region = RamRegion::new(i * 0x10, i * 0x10 + 0xF);
            bus.register(Rc::new(RefCell::new(region))).unwrap();
        }
        let one_too_many = Rc::new(RefCell::new(RamRegion::new(0xF000, 0xF00F)));
        assert_eq!(bus.register(one_too_many), Err(Error::CapacityExceeded));
    }

    #[test]
    fn lock_is_exclusive_between_masters() {
        let mut bus = wired_bus();
        assert!(bus.lock(BusMaster::Cpu));
        // Re-locking by the holder is fine; the sequence is still theirs.
        assert!(bus.lock(BusMaster::Cpu));
        assert!(!bus.lock(BusMaster::Dma));
        assert!(bus.locked_out(BusMaster::Dma));
        assert!(!bus.locked_out(BusMaster::Cpu));
        bus.unlock(BusMaster::Cpu);
        assert!(bus.lock(BusMaster::Dma));
        bus.unlock(BusMaster::Dma);
    }
}
