//! Session-level wiring checks: the standard memory map and the scheduler
//! surface, all through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use test_log::test;
use umbra::sched::DeviceEvent;
use umbra::{Error, GameBoy};

#[test]
fn sessions_are_independent() {
    let mut a = GameBoy::new(vec![0x00; 4]).unwrap();
    let b = GameBoy::new(vec![0x00; 4]).unwrap();
    a.bus().write(0xC000, 0x77).unwrap();
    a.step().unwrap();
    assert_eq!(a.bus().read(0xC000).unwrap(), 0x77);
    assert_eq!(b.bus().read(0xC000).unwrap(), 0x00);
    assert_eq!(b.cpu().cycles, 0);
}

#[test]
fn echo_ram_mirrors_working_ram_in_the_standard_map() {
    let gb = GameBoy::new(vec![0x00; 4]).unwrap();
    gb.bus().write(0xC777, 0x5A).unwrap();
    assert_eq!(gb.bus().read(0xE777).unwrap(), 0x5A);
    gb.bus().write(0xE000, 0xA5).unwrap();
    assert_eq!(gb.bus().read(0xC000).unwrap(), 0xA5);
}

#[test]
fn io_space_outside_the_map_is_unmapped() {
    let gb = GameBoy::new(vec![0x00; 4]).unwrap();
    assert_eq!(
        gb.bus().read(0xFF40),
        Err(Error::UnmappedAddress { addr: 0xFF40 })
    );
}

#[test]
fn scheduled_events_run_earliest_first() {
    let mut gb = GameBoy::new(vec![0x00; 4]).unwrap();
    let order = Rc::new(RefCell::new(Vec::new()));
    for ts in [20u64, 5, 12] {
        let order = Rc::clone(&order);
        gb.schedule(DeviceEvent::new(ts, move || order.borrow_mut().push(ts)))
            .unwrap();
    }
    assert_eq!(gb.next_event_at(), Some(5));
    while gb.next_event_at().is_some() {
        gb.run_next_event().unwrap();
    }
    assert_eq!(*order.borrow(), vec![5, 12, 20]);
    assert_eq!(gb.run_next_event(), Err(Error::EmptyContainer));
}
