//! # Register File
//!
//! The 16 general-purpose registers visible at any time.
//!
//! - **R0-R12**: General purpose
//! - **R13 (SP)**: Stack pointer (by convention)
//! - **R14 (LR)**: Link register (return address)
//! - **R15 (PC)**: Program counter, 8 bytes ahead of the executing instruction
//!   because of the prefetch pipeline (see [`machine`](crate::machine))

use serde::{Deserialize, Serialize};

/// Stack Pointer register index.
pub const REG_SP: usize = 0xD;

/// Link Register index (return address for subroutines).
pub const REG_LR: usize = 0xE;

/// Program Counter register index.
pub const REG_PROGRAM_COUNTER: usize = 0xF;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[REG_PROGRAM_COUNTER]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[REG_PROGRAM_COUNTER] = new_value;
    }

    pub const fn advance_program_counter(&mut self, bytes: u32) {
        self.0[REG_PROGRAM_COUNTER] = self.0[REG_PROGRAM_COUNTER].wrapping_add(bytes);
    }

    #[must_use]
    pub const fn stack_pointer(&self) -> u32 {
        self.0[REG_SP]
    }

    #[must_use]
    pub const fn link_register(&self) -> u32 {
        self.0[REG_LR]
    }

    pub fn set_register_at(&mut self, reg: usize, new_value: u32) {
        assert!(reg <= 15, "Invalid register index: {reg} (0x{reg:X})");
        self.0[reg] = new_value;
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.0[reg]
    }

    #[must_use]
    pub const fn as_array(&self) -> &[u32; 16] {
        &self.0
    }
}

/// Assembler names of a register, canonical name first.
#[must_use]
pub const fn register_names(reg: usize) -> &'static [&'static str] {
    const NAMES: [&[&str]; 16] = [
        &["r0"],
        &["r1"],
        &["r2"],
        &["r3"],
        &["r4"],
        &["r5"],
        &["r6"],
        &["r7"],
        &["r8"],
        &["r9"],
        &["r10"],
        &["r11"],
        &["r12"],
        &["r13", "sp"],
        &["r14", "lr"],
        &["r15", "pc"],
    ];
    NAMES[reg]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn named_accessors_alias_the_top_registers() {
        let mut registers = Registers::default();
        registers.set_register_at(REG_SP, 0x8000);
        registers.set_register_at(REG_LR, 0x44);
        registers.set_program_counter(0x100);
        registers.advance_program_counter(4);

        assert_eq!(registers.stack_pointer(), 0x8000);
        assert_eq!(registers.link_register(), 0x44);
        assert_eq!(registers.program_counter(), 0x104);
        assert_eq!(registers.register_at(15), 0x104);
    }

    #[test]
    #[should_panic(expected = "Invalid register index")]
    fn out_of_range_index() {
        Registers::default().set_register_at(16, 0);
    }

    #[test]
    fn names() {
        assert_eq!(register_names(0), &["r0"]);
        assert_eq!(register_names(REG_LR), &["r14", "lr"]);
    }
}
