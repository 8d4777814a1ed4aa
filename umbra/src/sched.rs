//! The event scheduler: a timestamp-ordered queue of device callbacks used to
//! coordinate multi-device timing beyond raw CPU stepping. The driver loop
//! that decides *when* to run the next event lives outside this core; the
//! scheduler only keeps the events ordered and executes them on demand.

use std::fmt;

use tracing::trace;

use crate::error::{Error, Result};
use crate::pqueue::Pqueue;

/// The most device events that may be pending at once.
pub const MAX_EVENT_QUEUE_LEN: usize = 64;

/// Timestamps past this threshold trigger a rebase of the whole queue so that
/// a long-running session never creeps toward `u64::MAX`.
const TIMESTAMP_LOOPBACK: u64 = 0x0FFF_FFFF_FFFF_FFFF;

/// A future-time notification requested by a device. The action is a
/// zero-argument callback; any state it needs must be closed over (devices
/// hand out `Rc` clones of themselves for this).
pub struct DeviceEvent {
    pub timestamp: u64,
    action: Box<dyn FnOnce()>,
}

impl DeviceEvent {
    pub fn new(timestamp: u64, action: impl FnOnce() + 'static) -> Self {
        Self {
            timestamp,
            action: Box::new(action),
        }
    }
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEvent")
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Needs to be a min-heap over timestamps.
fn earliest_first(e1: &DeviceEvent, e2: &DeviceEvent) -> bool {
    e1.timestamp > e2.timestamp
}

#[derive(Debug)]
pub struct Scheduler {
    events: Pqueue<DeviceEvent, MAX_EVENT_QUEUE_LEN>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            events: Pqueue::new(earliest_first),
        }
    }

    /// Queues an event for future execution.
    ///
    /// If the event's timestamp exceeds the loopback threshold, every queued
    /// timestamp (and the new one) is shifted down by the current minimum
    /// before insertion. Relative order is preserved, so the rebase is
    /// invisible to devices; it only keeps the clock values bounded.
    pub fn schedule(&mut self, mut event: DeviceEvent) -> Result<()> {
        if self.events.is_full() {
            return Err(Error::CapacityExceeded);
        }
        if event.timestamp > TIMESTAMP_LOOPBACK {
            // The queued minimum can exceed the new timestamp when an earlier
            // over-threshold event was rebased by a small offset, so shift by
            // whichever is smaller to keep both subtractions in range.
            let min_time = match self.events.front() {
                Ok(front) => front.timestamp.min(event.timestamp),
                // First event of the session: rebase it against itself.
                Err(_) => event.timestamp,
            };
            trace!("Rebasing event queue by {min_time}");
            event.timestamp -= min_time;
            for queued in self.events.as_mut_slice() {
                queued.timestamp -= min_time;
            }
        }
        self.events.push(event)
    }

    /// Pops the earliest pending event and runs its callback.
    pub fn execute_next(&mut self) -> Result<()> {
        let next = self.events.pop()?;
        trace!("Executing device event @ {}", next.timestamp);
        (next.action)();
        Ok(())
    }

    /// The timestamp of the earliest pending event, if any. Driver loops use
    /// this to decide how far the CPU may run before servicing devices.
    pub fn next_timestamp(&self) -> Option<u64> {
        self.events.front().ok().map(|e| e.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
