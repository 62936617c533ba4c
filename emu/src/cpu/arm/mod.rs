//! # ARM Instruction Set (32-bit)
//!
//! Every instruction is conditional; the pipeline decodes a word into an
//! [`ArmModeOpcode`](mode::ArmModeOpcode) and hands it to
//! [`Cpu::execute_arm`](crate::cpu::Cpu::execute_arm).
//!
//! ## Format
//!
//! ```text
//! 31-28   27-25   24-0
//! [Cond] [Format] [Instruction-specific]
//! ```
//!
//! - **Condition (bits 28-31)**: See [`condition`](super::condition)
//! - **Format (bits 25-27)**: Determines instruction category
//!
//! ## Instruction Categories
//!
//! | Bits 27-25 | Category              | Examples                     |
//! |------------|-----------------------|------------------------------|
//! | 00x        | Data Processing / PSR | AND, ADD, CMP, MOV, MRS, MSR |
//! | 000        | Multiply/Swap/BX/LDRH | MUL, UMULL, SWP, BX, LDRD    |
//! | 011        | Media (byte reverse)  | REV, REV16, REVSH            |
//! | 01x        | Single Data Transfer  | LDR, STR                     |
//! | 100        | Block Data Transfer   | LDM, STM                     |
//! | 101        | Branch                | B, BL                        |
//! | 11x        | Coprocessor / SWI     | LDC, CDP, MRC, SWI           |
//!
//! ## Submodules
//!
//! - [`instructions`] - Decoding (`DECODE_TABLE`) and disassembly
//! - [`operations`] - Execution
//! - [`alu_instruction`] - ALU ops and barrel shifter
//! - [`mode`] - Decoded opcode wrapper

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
pub mod alu_instruction;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::similar_names)]
pub mod instructions;

#[allow(clippy::cast_possible_truncation)]
pub mod mode;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::similar_names)]
pub mod operations;
