use serde::{Deserialize, Serialize};

use crate::cpu::psr::Psr;
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::Registers;
use crate::error::Result;

pub mod arm;
pub mod condition;

#[allow(clippy::cast_possible_truncation)]
pub mod flags;
pub mod psr;
pub mod register_bank;
pub mod registers;

/// Register file plus status registers. Memory is owned by the
/// [`Machine`](crate::machine::Machine) and lent to each execution.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    pub registers: Registers,
    pub cpsr: Psr,
    pub register_bank: RegisterBank,
}

impl Cpu {
    /// SPSR of the mode in the CPSR low bits.
    pub fn spsr(&self) -> Result<Psr> {
        self.register_bank.spsr(self.cpsr.cpu_mode())
    }

    pub fn spsr_mut(&mut self) -> Result<&mut Psr> {
        self.register_bank.spsr_mut(self.cpsr.cpu_mode())
    }
}
