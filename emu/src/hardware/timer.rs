//! Free-running system timer.
//!
//! Layout at the configured base, mirroring the BCM2835 system timer:
//!
//! ```text
//! +0x00  CS   control/status (untouched)
//! +0x04  CLO  counter, low word
//! +0x08  CHI  counter, high word
//! +0x0C  C0 .. +0x18 C3  compare registers (untouched)
//! ```
//!
//! The counter holds the microseconds elapsed since the first cycle.

use std::time::Instant;

use crate::error::{EmuError, Result};
use crate::hardware::{Peripheral, Watch};
use crate::memory::{Access, Event, EventMask, Memory, MemoryObserver};

pub const TIMER_CS: u32 = 0x00;
pub const TIMER_CLO: u32 = 0x04;
pub const TIMER_CHI: u32 = 0x08;
pub const TIMER_C0: u32 = 0x0C;

#[derive(Debug, Default)]
pub struct Timer {
    base: Option<u32>,
    started: Option<Instant>,
    initialized: bool,
}

impl Timer {
    #[must_use]
    pub const fn new(base: u32) -> Self {
        Self {
            base: Some(base),
            started: None,
            initialized: false,
        }
    }

    pub fn set_base(&mut self, address: u32) -> Result<()> {
        if self.initialized {
            return Err(EmuError::Logic(
                "cannot change the timer base after first use".to_owned(),
            ));
        }
        self.base = Some(address);
        Ok(())
    }

    #[must_use]
    pub const fn base(&self) -> Option<u32> {
        self.base
    }

    /// Microseconds since the timer started, zero before that.
    #[must_use]
    pub fn elapsed_micros(&self) -> u64 {
        self.started.map_or(0, |started| {
            u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
        })
    }

    fn refresh(&self, memory: &mut Memory) -> Result<()> {
        let base = self
            .base
            .ok_or_else(|| EmuError::Logic("timer base is not configured".to_owned()))?;
        memory.put_dword(base.wrapping_add(TIMER_CLO), self.elapsed_micros())
    }
}

impl Peripheral for Timer {
    fn initialize(&mut self, _memory: &mut Memory) -> Result<Vec<Watch>> {
        let base = self
            .base
            .ok_or_else(|| EmuError::Logic("timer base is not configured".to_owned()))?;

        self.initialized = true;
        self.started = Some(Instant::now());
        tracing::debug!(base = format_args!("0x{base:08x}"), "timer started");

        Ok(vec![Watch {
            address: base.wrapping_add(TIMER_CLO),
            length: 8,
            events: EventMask::PRE_READ,
        }])
    }

    fn step(&mut self, memory: &mut Memory) -> Result<()> {
        self.refresh(memory)
    }
}

impl MemoryObserver for Timer {
    fn notify(&mut self, memory: &mut Memory, access: &Access) {
        if access.event == Event::PreRead
            && let Err(error) = self.refresh(memory)
        {
            tracing::warn!(%error, "timer refresh failed");
        }
    }
}
