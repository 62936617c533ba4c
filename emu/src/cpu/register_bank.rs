//! # Saved Program Status Registers
//!
//! One SPSR slot per value of the 5-bit mode field of the CPSR. Only slot
//! selection is modeled; general registers are not banked by mode.

use serde::{Deserialize, Serialize};

use crate::cpu::psr::Psr;
use crate::error::{EmuError, Result};

pub const SPSR_SLOTS: usize = 32;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    spsr: [Psr; SPSR_SLOTS],
}

impl RegisterBank {
    pub fn spsr(&self, mode: u32) -> Result<Psr> {
        Self::slot(mode).map(|slot| self.spsr[slot])
    }

    pub fn spsr_mut(&mut self, mode: u32) -> Result<&mut Psr> {
        Self::slot(mode).map(|slot| &mut self.spsr[slot])
    }

    fn slot(mode: u32) -> Result<usize> {
        usize::try_from(mode)
            .ok()
            .filter(|&slot| slot < SPSR_SLOTS)
            .ok_or(EmuError::ModeOutOfRange(mode))
    }
}
