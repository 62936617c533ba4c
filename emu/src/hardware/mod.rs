//! Memory-mapped peripherals.
//!
//! Peripherals never fetch or execute. The [`Machine`](crate::machine::Machine)
//! steps each one at the start of a cycle and routes the memory accesses
//! they subscribed to through [`MemoryObserver::notify`](crate::memory::MemoryObserver).

pub mod mailbox;
pub mod timer;

use crate::error::Result;
use crate::memory::{EventMask, Memory};

/// A window of memory a peripheral wants to be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub address: u32,
    pub length: u32,
    pub events: EventMask,
}

pub trait Peripheral {
    /// Called once, before the first [`step`](Peripheral::step). After this
    /// the peripheral's addresses can no longer change.
    fn initialize(&mut self, memory: &mut Memory) -> Result<Vec<Watch>>;

    fn step(&mut self, memory: &mut Memory) -> Result<()>;
}
