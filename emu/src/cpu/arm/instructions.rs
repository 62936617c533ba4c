//! # ARM Instruction Decoding
//!
//! A 32-bit word is classified by walking [`DECODE_TABLE`] top to bottom and
//! taking the first rule whose bit pattern matches. Several encodings share
//! bit patterns with the broader families below them, so the order of the
//! table is part of the instruction set definition:
//!
//! ```text
//! ┌────┬────────────────────────────┬──────────────────────────────────────┐
//! │ #  │ Family                     │ Distinguishing bits                  │
//! ├────┼────────────────────────────┼──────────────────────────────────────┤
//! │  1 │ BX                         │ 27-4 = 0x12FFF1                      │
//! │  2 │ REV / REV16 / REVSH        │ 27-16 = 0x6BF/0x6FF, 11-4 = 0xF3/0xFB │
//! │  3 │ SWP / SWPB                 │ 27-23 = 00010, 21-20 = 00, 11-4 = 09 │
//! │  4 │ UMULL / UMLAL / SMULL ...  │ 27-23 = 00001, 7-4 = 1001            │
//! │  5 │ MUL / MLA                  │ 27-22 = 000000, 7-4 = 1001           │
//! │  6 │ LDRD / STRD                │ 27-25 = 000, 7 = 4 = 1, L = 0, SH>1  │
//! │  7 │ LDRH / STRH / LDRSB/LDRSH  │ 27-25 = 000, 7 = 4 = 1, SH != 00     │
//! │  8 │ MRS / MSR                  │ 27-23 = 00x10, S = 0                 │
//! │  9 │ Data processing            │ 27-26 = 00                           │
//! │ 10 │ LDR / STR                  │ 27-26 = 01                           │
//! │ 11 │ LDM / STM                  │ 27-25 = 100                          │
//! │ 12 │ B / BL                     │ 27-25 = 101                          │
//! │ 13 │ Coprocessor data transfer  │ 27-25 = 110                          │
//! │ 14 │ Coprocessor data operation │ 27-24 = 1110, 4 = 0                  │
//! │ 15 │ Coprocessor reg. transfer  │ 27-24 = 1110, 4 = 1                  │
//! │ 16 │ SWI                        │ 27-24 = 1111                         │
//! └────┴────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! A word matched by no rule is an [`EmuError::UnknownOpcode`]. A matched
//! word whose operands break the architectural restrictions (mostly r15 in
//! places it is unpredictable) is an [`EmuError::IllegalOpcode`].
//!
//! ## Encoding Example
//!
//! ```text
//! ADD R0, R1, R2, LSL #3
//!
//! 31-28  27-26  25  24-21  20  19-16  15-12  11-7   6-5  4  3-0
//! [1110] [ 00 ] [0] [0100] [0] [0001] [0000] [00011][00] [0][0010]
//!   ↑       ↑    ↑    ↑     ↑    ↑      ↑      ↑     ↑   ↑   ↑
//!   │       │    │    │     │    │      │      │     │   │   └─ Rm = R2
//!   │       │    │    │     │    │      │      │     │   └──── Shift by imm
//!   │       │    │    │     │    │      │      │     └──────── LSL
//!   │       │    │    │     │    │      │      └────────────── Shift = 3
//!   │       │    │    │     │    │      └───────────────────── Rd = R0
//!   │       │    │    │     │    └──────────────────────────── Rn = R1
//!   │       │    │    │     └───────────────────────────────── S = 0 (no flags)
//!   │       │    │    └─────────────────────────────────────── ADD opcode
//!   │       │    └──────────────────────────────────────────── Register operand
//!   │       └───────────────────────────────────────────────── Data processing
//!   └───────────────────────────────────────────────────────── Always execute
//! ```

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArmModeAluInstruction, MsrOperand, PsrKind, PsrOpKind, ShiftOperator,
};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{
    HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting, ReadWriteKind, ShiftKind,
};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};
use crate::error::{EmuError, Result};

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeMultiplyVariant {
    Mul,
    Mla,
}

impl From<bool> for ArmModeMultiplyVariant {
    fn from(accumulate: bool) -> Self {
        if accumulate { Self::Mla } else { Self::Mul }
    }
}

impl Display for ArmModeMultiplyVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mul => f.write_str("MUL"),
            Self::Mla => f.write_str("MLA"),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeMultiplyLongVariant {
    Umull,
    Umlal,
    Smull,
    Smlal,
}

impl ArmModeMultiplyLongVariant {
    /// From the U (bit 22) and A (bit 21) bits.
    #[must_use]
    pub const fn new(signed: bool, accumulate: bool) -> Self {
        match (signed, accumulate) {
            (false, false) => Self::Umull,
            (false, true) => Self::Umlal,
            (true, false) => Self::Smull,
            (true, true) => Self::Smlal,
        }
    }

    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Smull | Self::Smlal)
    }

    #[must_use]
    pub const fn accumulates(self) -> bool {
        matches!(self, Self::Umlal | Self::Smlal)
    }
}

impl Display for ArmModeMultiplyLongVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Umull => f.write_str("UMULL"),
            Self::Umlal => f.write_str("UMLAL"),
            Self::Smull => f.write_str("SMULL"),
            Self::Smlal => f.write_str("SMLAL"),
        }
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub enum ByteReverseVariant {
    /// Reverse the four bytes of a word.
    Rev,

    /// Reverse the bytes inside each halfword.
    Rev16,

    /// Reverse the low halfword and sign extend it.
    Revsh,
}

impl Display for ByteReverseVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rev => f.write_str("REV"),
            Self::Rev16 => f.write_str("REV16"),
            Self::Revsh => f.write_str("REVSH"),
        }
    }
}

/// Offset of halfword and doubleword transfers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum HalfwordOffset {
    /// 8 bits split in two nibbles (bits 8-11 and 0-3).
    Immediate { offset: u32 },
    Register { register: usize },
}

impl HalfwordOffset {
    fn from_op_code(op_code: u32) -> Self {
        if op_code.get_bit(22) {
            Self::Immediate {
                offset: (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3),
            }
        } else {
            Self::Register {
                register: op_code.get_bits(0..=3) as usize,
            }
        }
    }

    const fn register(self) -> Option<usize> {
        match self {
            Self::Immediate { .. } => None,
            Self::Register { register } => Some(register),
        }
    }
}

impl Display for HalfwordOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate { offset } => write!(f, "#{offset}"),
            Self::Register { register } => write!(f, "R{register}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SingleDataTransferOffsetInfo {
    Immediate {
        offset: u32,
    },
    RegisterImmediate {
        shift_amount: u32,
        shift_kind: ShiftKind,
        reg_offset: usize,
    },
}

impl Display for SingleDataTransferOffsetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Immediate { offset } => write!(f, "#{offset}"),
            Self::RegisterImmediate {
                shift_amount: 0,
                shift_kind: ShiftKind::Lsl,
                reg_offset,
            } => write!(f, "R{reg_offset}"),
            Self::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => write!(f, "R{reg_offset}, {shift_kind} #{shift_amount}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeInstruction {
    DataProcessing {
        alu_instruction: ArmModeAluInstruction,
        set_conditions: bool,
        rn: usize,
        destination: usize,
        op2: AluSecondOperandInfo,
    },
    PsrTransfer {
        psr_kind: PsrKind,
        kind: PsrOpKind,
    },
    Multiply {
        variant: ArmModeMultiplyVariant,
        set_conditions: bool,
        rd: usize,
        rn: usize,
        rs: usize,
        rm: usize,
    },
    MultiplyLong {
        variant: ArmModeMultiplyLongVariant,
        set_conditions: bool,
        rdhi: usize,
        rdlo: usize,
        rs: usize,
        rm: usize,
    },
    SingleDataSwap {
        quantity: ReadWriteKind,
        rn: usize,
        rd: usize,
        rm: usize,
    },
    BranchAndExchange {
        register: usize,
    },
    ByteReverse {
        variant: ByteReverseVariant,
        rd: usize,
        rm: usize,
    },
    HalfwordDataTransfer {
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store: LoadStoreKind,
        offset: HalfwordOffset,
        rn: usize,
        rd: usize,
        transfer_kind: HalfwordTransferKind,
    },
    DoublewordDataTransfer {
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store: LoadStoreKind,
        offset: HalfwordOffset,
        rn: usize,
        rd: usize,
    },
    SingleDataTransfer {
        load_store: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        offsetting: Offsetting,
        rd: usize,
        rn: usize,
        offset: SingleDataTransferOffsetInfo,
    },
    BlockDataTransfer {
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: usize,
        register_list: u16,
    },
    Branch {
        link: bool,
        offset: i32,
    },
    CoprocessorDataTransfer {
        load_store: LoadStoreKind,
        cp_number: u32,
        crd: u32,
        rn: usize,
        offset: u32,
    },
    CoprocessorDataOperation {
        cp_number: u32,
    },
    CoprocessorRegisterTransfer {
        load_store: LoadStoreKind,
        cp_number: u32,
    },
    SoftwareInterrupt {
        comment: u32,
    },
}

/// One entry of [`DECODE_TABLE`].
pub struct DecodeRule {
    pub name: &'static str,
    pub matches: fn(u32) -> bool,
    pub build: fn(u32) -> Result<ArmModeInstruction>,
}

/// Recognizers in priority order. The first rule that matches wins, so moving
/// an entry changes which instruction some words decode to.
pub const DECODE_TABLE: &[DecodeRule] = &[
    DecodeRule {
        name: "branch and exchange",
        matches: is_branch_and_exchange,
        build: branch_and_exchange,
    },
    DecodeRule {
        name: "byte reverse",
        matches: is_byte_reverse,
        build: byte_reverse,
    },
    DecodeRule {
        name: "single data swap",
        matches: is_single_data_swap,
        build: single_data_swap,
    },
    DecodeRule {
        name: "multiply long",
        matches: is_multiply_long,
        build: multiply_long,
    },
    DecodeRule {
        name: "multiply",
        matches: is_multiply,
        build: multiply,
    },
    DecodeRule {
        name: "doubleword data transfer",
        matches: is_doubleword_data_transfer,
        build: doubleword_data_transfer,
    },
    DecodeRule {
        name: "halfword data transfer",
        matches: is_halfword_data_transfer,
        build: halfword_data_transfer,
    },
    DecodeRule {
        name: "psr transfer",
        matches: is_psr_transfer,
        build: psr_transfer,
    },
    DecodeRule {
        name: "data processing",
        matches: is_data_processing,
        build: data_processing,
    },
    DecodeRule {
        name: "single data transfer",
        matches: is_single_data_transfer,
        build: single_data_transfer,
    },
    DecodeRule {
        name: "block data transfer",
        matches: |op_code| op_code.get_bits(25..=27) == 0b100,
        build: block_data_transfer,
    },
    DecodeRule {
        name: "branch",
        matches: |op_code| op_code.get_bits(25..=27) == 0b101,
        build: branch,
    },
    DecodeRule {
        name: "coprocessor data transfer",
        matches: |op_code| op_code.get_bits(25..=27) == 0b110,
        build: coprocessor_data_transfer,
    },
    DecodeRule {
        name: "coprocessor data operation",
        matches: |op_code| op_code.get_bits(24..=27) == 0b1110 && !op_code.get_bit(4),
        build: |op_code| {
            Ok(ArmModeInstruction::CoprocessorDataOperation {
                cp_number: op_code.get_bits(8..=11),
            })
        },
    },
    DecodeRule {
        name: "coprocessor register transfer",
        matches: |op_code| op_code.get_bits(24..=27) == 0b1110 && op_code.get_bit(4),
        build: |op_code| {
            Ok(ArmModeInstruction::CoprocessorRegisterTransfer {
                load_store: op_code.get_bit(20).into(),
                cp_number: op_code.get_bits(8..=11),
            })
        },
    },
    DecodeRule {
        name: "software interrupt",
        matches: |op_code| op_code.get_bits(24..=27) == 0b1111,
        build: |op_code| {
            Ok(ArmModeInstruction::SoftwareInterrupt {
                comment: op_code.get_bits(0..=23),
            })
        },
    },
];

fn reg(op_code: u32, low_bit: u8) -> usize {
    op_code.get_bits(low_bit..=low_bit + 3) as usize
}

fn is_branch_and_exchange(op_code: u32) -> bool {
    op_code.get_bits(4..=27) == 0x12_FFF1
}

fn branch_and_exchange(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::BranchAndExchange {
        register: reg(op_code, 0),
    })
}

fn is_byte_reverse(op_code: u32) -> bool {
    matches!(
        (op_code.get_bits(16..=27), op_code.get_bits(4..=11)),
        (0x6BF, 0xF3 | 0xFB) | (0x6FF, 0xFB)
    )
}

fn byte_reverse(op_code: u32) -> Result<ArmModeInstruction> {
    let variant = match (op_code.get_bit(22), op_code.get_bit(7)) {
        (false, false) => ByteReverseVariant::Rev,
        (false, true) => ByteReverseVariant::Rev16,
        (true, _) => ByteReverseVariant::Revsh,
    };

    Ok(ArmModeInstruction::ByteReverse {
        variant,
        rd: reg(op_code, 12),
        rm: reg(op_code, 0),
    })
}

fn is_single_data_swap(op_code: u32) -> bool {
    op_code.get_bits(23..=27) == 0b00010
        && op_code.get_bits(20..=21) == 0b00
        && op_code.get_bits(4..=11) == 0b0000_1001
}

fn single_data_swap(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::SingleDataSwap {
        quantity: op_code.get_bit(22).into(),
        rn: reg(op_code, 16),
        rd: reg(op_code, 12),
        rm: reg(op_code, 0),
    })
}

fn is_multiply_long(op_code: u32) -> bool {
    op_code.get_bits(23..=27) == 0b00001 && op_code.get_bits(4..=7) == 0b1001
}

fn multiply_long(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::MultiplyLong {
        variant: ArmModeMultiplyLongVariant::new(op_code.get_bit(22), op_code.get_bit(21)),
        set_conditions: op_code.get_bit(20),
        rdhi: reg(op_code, 16),
        rdlo: reg(op_code, 12),
        rs: reg(op_code, 8),
        rm: reg(op_code, 0),
    })
}

fn is_multiply(op_code: u32) -> bool {
    op_code.get_bits(22..=27) == 0 && op_code.get_bits(4..=7) == 0b1001
}

fn multiply(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::Multiply {
        variant: op_code.get_bit(21).into(),
        set_conditions: op_code.get_bit(20),
        rd: reg(op_code, 16),
        rn: reg(op_code, 12),
        rs: reg(op_code, 8),
        rm: reg(op_code, 0),
    })
}

fn is_extra_load_store(op_code: u32) -> bool {
    op_code.get_bits(25..=27) == 0 && op_code.get_bit(7) && op_code.get_bit(4)
}

fn is_doubleword_data_transfer(op_code: u32) -> bool {
    is_extra_load_store(op_code) && !op_code.get_bit(20) && op_code.get_bit(6)
}

fn doubleword_data_transfer(op_code: u32) -> Result<ArmModeInstruction> {
    // SH = 10 loads, SH = 11 stores.
    let load_store = if op_code.get_bit(5) {
        LoadStoreKind::Store
    } else {
        LoadStoreKind::Load
    };

    Ok(ArmModeInstruction::DoublewordDataTransfer {
        indexing: op_code.get_bit(24).into(),
        offsetting: op_code.get_bit(23).into(),
        write_back: op_code.get_bit(21),
        load_store,
        offset: HalfwordOffset::from_op_code(op_code),
        rn: reg(op_code, 16),
        rd: reg(op_code, 12),
    })
}

fn is_halfword_data_transfer(op_code: u32) -> bool {
    is_extra_load_store(op_code) && op_code.get_bits(5..=6) != 0
}

fn halfword_data_transfer(op_code: u32) -> Result<ArmModeInstruction> {
    let sh = op_code.get_bits(5..=6);
    let transfer_kind =
        HalfwordTransferKind::try_from(sh).map_err(|value| EmuError::UnhandledCase {
            context: "halfword transfer kind",
            value,
        })?;

    Ok(ArmModeInstruction::HalfwordDataTransfer {
        indexing: op_code.get_bit(24).into(),
        offsetting: op_code.get_bit(23).into(),
        write_back: op_code.get_bit(21),
        load_store: op_code.get_bit(20).into(),
        offset: HalfwordOffset::from_op_code(op_code),
        rn: reg(op_code, 16),
        rd: reg(op_code, 12),
        transfer_kind,
    })
}

fn is_mrs(op_code: u32) -> bool {
    op_code.get_bits(23..=27) == 0b00010
        && op_code.get_bits(20..=21) == 0b00
        && op_code.get_bits(16..=19) == 0xF
        && op_code.get_bits(0..=11) == 0
}

fn is_msr_register(op_code: u32) -> bool {
    op_code.get_bits(23..=27) == 0b00010
        && op_code.get_bits(20..=21) == 0b10
        && op_code.get_bits(12..=15) == 0xF
        && op_code.get_bits(4..=11) == 0
}

fn is_msr_immediate(op_code: u32) -> bool {
    op_code.get_bits(23..=27) == 0b00110
        && op_code.get_bits(20..=21) == 0b10
        && op_code.get_bits(12..=15) == 0xF
}

fn is_psr_transfer(op_code: u32) -> bool {
    is_mrs(op_code) || is_msr_register(op_code) || is_msr_immediate(op_code)
}

fn psr_transfer(op_code: u32) -> Result<ArmModeInstruction> {
    let kind = if is_mrs(op_code) {
        PsrOpKind::Mrs {
            destination_register: reg(op_code, 12),
        }
    } else {
        let operand = if op_code.get_bit(25) {
            MsrOperand::Immediate {
                base: op_code.get_bits(0..=7),
                rotate: op_code.get_bits(8..=11),
            }
        } else {
            MsrOperand::Register(reg(op_code, 0))
        };
        PsrOpKind::Msr {
            operand,
            field_mask: op_code.get_bits(16..=19),
        }
    };

    Ok(ArmModeInstruction::PsrTransfer {
        psr_kind: op_code.get_bit(22).into(),
        kind,
    })
}

fn is_data_processing(op_code: u32) -> bool {
    if op_code.get_bits(26..=27) != 0 {
        return false;
    }

    // register operand with bit 7 and bit 4 set is the multiply/extra load space
    let extension_space = !op_code.get_bit(25) && op_code.get_bit(7) && op_code.get_bit(4);
    // TST/TEQ/CMP/CMN without S are not data processing
    let test_without_flags = op_code.get_bits(23..=24) == 0b10 && !op_code.get_bit(20);

    !extension_space && !test_without_flags
}

fn data_processing(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::DataProcessing {
        alu_instruction: op_code.get_bits(21..=24).into(),
        set_conditions: op_code.get_bit(20),
        rn: reg(op_code, 16),
        destination: reg(op_code, 12),
        op2: AluSecondOperandInfo::from_op_code(op_code),
    })
}

fn is_single_data_transfer(op_code: u32) -> bool {
    op_code.get_bits(26..=27) == 0b01 && !(op_code.get_bit(25) && op_code.get_bit(4))
}

fn single_data_transfer(op_code: u32) -> Result<ArmModeInstruction> {
    // I = 0 is an immediate offset, I = 1 a shifted register.
    let offset = if op_code.get_bit(25) {
        SingleDataTransferOffsetInfo::RegisterImmediate {
            shift_amount: op_code.get_bits(7..=11),
            shift_kind: op_code.get_bits(5..=6).into(),
            reg_offset: reg(op_code, 0),
        }
    } else {
        SingleDataTransferOffsetInfo::Immediate {
            offset: op_code.get_bits(0..=11),
        }
    };

    Ok(ArmModeInstruction::SingleDataTransfer {
        load_store: op_code.get_bit(20).into(),
        quantity: op_code.get_bit(22).into(),
        write_back: op_code.get_bit(21),
        indexing: op_code.get_bit(24).into(),
        offsetting: op_code.get_bit(23).into(),
        rd: reg(op_code, 12),
        rn: reg(op_code, 16),
        offset,
    })
}

fn block_data_transfer(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::BlockDataTransfer {
        indexing: op_code.get_bit(24).into(),
        offsetting: op_code.get_bit(23).into(),
        load_psr: op_code.get_bit(22),
        write_back: op_code.get_bit(21),
        load_store: op_code.get_bit(20).into(),
        rn: reg(op_code, 16),
        register_list: op_code.get_bits(0..=15) as u16,
    })
}

fn branch(op_code: u32) -> Result<ArmModeInstruction> {
    let offset = (op_code.get_bits(0..=23) << 2).sign_extended(26);
    Ok(ArmModeInstruction::Branch {
        link: op_code.get_bit(24),
        offset: offset as i32,
    })
}

fn coprocessor_data_transfer(op_code: u32) -> Result<ArmModeInstruction> {
    Ok(ArmModeInstruction::CoprocessorDataTransfer {
        load_store: op_code.get_bit(20).into(),
        cp_number: op_code.get_bits(8..=11),
        crd: op_code.get_bits(12..=15),
        rn: reg(op_code, 16),
        offset: op_code.get_bits(0..=7),
    })
}

impl ArmModeInstruction {
    /// Classifies `op_code` and checks its operand restrictions.
    ///
    /// Errors carry address 0; the caller knows where the word was fetched
    /// from and fills it in with [`EmuError::at`].
    pub fn decode(op_code: u32) -> Result<Self> {
        let rule = DECODE_TABLE
            .iter()
            .find(|rule| (rule.matches)(op_code))
            .ok_or(EmuError::UnknownOpcode {
                op_code,
                address: 0,
            })?;

        let instruction = (rule.build)(op_code)?;
        instruction.validate(op_code)?;

        Ok(instruction)
    }

    /// Rejects operand combinations the architecture leaves unpredictable.
    fn validate(&self, op_code: u32) -> Result<()> {
        let illegal = |reason| Err(EmuError::illegal(op_code, reason));
        let pc = REG_PROGRAM_COUNTER;

        match *self {
            Self::DataProcessing {
                op2:
                    AluSecondOperandInfo::Register {
                        shift_op: ShiftOperator::Register(rs),
                        ..
                    },
                ..
            } if rs == pc => illegal("r15 cannot hold a shift amount"),
            Self::Multiply {
                variant,
                rd,
                rn,
                rs,
                rm,
                ..
            } => {
                if rd == pc || rm == pc || rs == pc {
                    illegal("multiply cannot use r15")
                } else if variant == ArmModeMultiplyVariant::Mla && rn == pc {
                    illegal("multiply accumulate cannot use r15")
                } else if rd == rm {
                    illegal("multiply destination and rm must differ")
                } else {
                    Ok(())
                }
            }
            Self::MultiplyLong {
                rdhi, rdlo, rs, rm, ..
            } => {
                if [rdhi, rdlo, rs, rm].contains(&pc) {
                    illegal("multiply long cannot use r15")
                } else if rdhi == rdlo {
                    illegal("multiply long destinations must differ")
                } else if rdhi == rm || rdlo == rm {
                    illegal("multiply long destinations and rm must differ")
                } else {
                    Ok(())
                }
            }
            Self::SingleDataSwap { rn, rd, rm, .. } if [rn, rd, rm].contains(&pc) => {
                illegal("swap cannot use r15")
            }
            Self::ByteReverse { rd, rm, .. } if rd == pc || rm == pc => {
                illegal("byte reverse cannot use r15")
            }
            Self::PsrTransfer {
                kind:
                    PsrOpKind::Mrs {
                        destination_register,
                    },
                ..
            } if destination_register == pc => illegal("MRS cannot target r15"),
            Self::PsrTransfer {
                kind:
                    PsrOpKind::Msr {
                        operand: MsrOperand::Register(rm),
                        ..
                    },
                ..
            } if rm == pc => illegal("MSR cannot read r15"),
            Self::HalfwordDataTransfer {
                indexing,
                write_back,
                offset,
                rn,
                ..
            } => validate_extra_load_store(op_code, indexing, write_back, offset, rn),
            Self::DoublewordDataTransfer {
                indexing,
                write_back,
                offset,
                rn,
                rd,
                ..
            } => {
                validate_extra_load_store(op_code, indexing, write_back, offset, rn)?;
                let pair = [rd, rd + 1];
                if rd % 2 != 0 {
                    illegal("doubleword transfers need an even register")
                } else if rd == REG_LR {
                    illegal("doubleword transfers cannot use r14")
                } else if pair.contains(&rn) {
                    illegal("doubleword transfer registers overlap the base")
                } else if offset.register().is_some_and(|rm| pair.contains(&rm)) {
                    illegal("doubleword transfer registers overlap the offset")
                } else {
                    Ok(())
                }
            }
            Self::SingleDataTransfer {
                write_back,
                indexing,
                rn,
                offset,
                ..
            } => {
                let writes_back = write_back || indexing == Indexing::Post;
                if writes_back && rn == pc {
                    illegal("write-back to r15")
                } else if matches!(
                    offset,
                    SingleDataTransferOffsetInfo::RegisterImmediate { reg_offset, .. } if reg_offset == pc
                ) {
                    illegal("r15 cannot be an offset register")
                } else {
                    Ok(())
                }
            }
            Self::BlockDataTransfer { write_back, rn, .. } if write_back && rn == pc => {
                illegal("write-back to r15")
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn disassembler(&self, condition: Condition) -> String {
        match *self {
            Self::DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
            } => {
                let set_string = if set_conditions { "S" } else { "" };
                if alu_instruction.is_test() {
                    format!("{alu_instruction}{condition} R{rn}, {op2}")
                } else if matches!(
                    alu_instruction,
                    ArmModeAluInstruction::Mov | ArmModeAluInstruction::Mvn
                ) {
                    format!("{alu_instruction}{condition}{set_string} R{destination}, {op2}")
                } else {
                    format!("{alu_instruction}{condition}{set_string} R{destination}, R{rn}, {op2}")
                }
            }
            Self::PsrTransfer { psr_kind, kind } => match kind {
                PsrOpKind::Mrs {
                    destination_register,
                } => format!("MRS{condition} R{destination_register}, {psr_kind}"),
                PsrOpKind::Msr {
                    operand,
                    field_mask,
                } => {
                    let fields: String = ['c', 'x', 's', 'f']
                        .into_iter()
                        .enumerate()
                        .filter(|(bit, _)| field_mask.get_bit(*bit as u8))
                        .map(|(_, field)| field)
                        .collect();
                    format!("MSR{condition} {psr_kind}_{fields}, {operand}")
                }
            },
            Self::Multiply {
                variant,
                set_conditions,
                rd,
                rn,
                rs,
                rm,
            } => {
                let set_string = if set_conditions { "S" } else { "" };
                match variant {
                    ArmModeMultiplyVariant::Mul => {
                        format!("MUL{condition}{set_string} R{rd}, R{rm}, R{rs}")
                    }
                    ArmModeMultiplyVariant::Mla => {
                        format!("MLA{condition}{set_string} R{rd}, R{rm}, R{rs}, R{rn}")
                    }
                }
            }
            Self::MultiplyLong {
                variant,
                set_conditions,
                rdhi,
                rdlo,
                rs,
                rm,
            } => {
                let set_string = if set_conditions { "S" } else { "" };
                format!("{variant}{condition}{set_string} R{rdlo}, R{rdhi}, R{rm}, R{rs}")
            }
            Self::SingleDataSwap {
                quantity,
                rn,
                rd,
                rm,
            } => {
                let b = if quantity == ReadWriteKind::Byte { "B" } else { "" };
                format!("SWP{condition}{b} R{rd}, R{rm}, [R{rn}]")
            }
            Self::BranchAndExchange { register } => format!("BX{condition} R{register}"),
            Self::ByteReverse { variant, rd, rm } => format!("{variant}{condition} R{rd}, R{rm}"),
            Self::HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store,
                offset,
                rn,
                rd,
                transfer_kind,
            } => {
                let address = format_address(rn, indexing, offsetting, write_back, offset);
                format!("{load_store}{condition}{transfer_kind} R{rd}, {address}")
            }
            Self::DoublewordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store,
                offset,
                rn,
                rd,
            } => {
                let address = format_address(rn, indexing, offsetting, write_back, offset);
                format!("{load_store}{condition}D R{rd}, {address}")
            }
            Self::SingleDataTransfer {
                load_store,
                quantity,
                write_back,
                indexing,
                offsetting,
                rd,
                rn,
                offset,
            } => {
                let b = if quantity == ReadWriteKind::Byte { "B" } else { "" };
                let address = format_address(rn, indexing, offsetting, write_back, offset);
                format!("{load_store}{condition}{b} R{rd}, {address}")
            }
            Self::BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            } => {
                let mnemonic = match load_store {
                    LoadStoreKind::Load => "LDM",
                    LoadStoreKind::Store => "STM",
                };
                let mode = match (offsetting, indexing) {
                    (Offsetting::Up, Indexing::Post) => "IA",
                    (Offsetting::Up, Indexing::Pre) => "IB",
                    (Offsetting::Down, Indexing::Post) => "DA",
                    (Offsetting::Down, Indexing::Pre) => "DB",
                };
                let w = if write_back { "!" } else { "" };
                let s = if load_psr { "^" } else { "" };
                let registers = (0..16_u8)
                    .filter(|&r| register_list.get_bit(r))
                    .map(|r| format!("R{r}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{mnemonic}{condition}{mode} R{rn}{w}, {{{registers}}}{s}")
            }
            Self::Branch { link, offset } => {
                let l = if link { "L" } else { "" };
                format!("B{l}{condition} #{offset}")
            }
            Self::CoprocessorDataTransfer {
                load_store,
                cp_number,
                crd,
                rn,
                offset,
            } => {
                let mnemonic = match load_store {
                    LoadStoreKind::Load => "LDC",
                    LoadStoreKind::Store => "STC",
                };
                format!("{mnemonic}{condition} p{cp_number}, c{crd}, [R{rn}], #{offset}")
            }
            Self::CoprocessorDataOperation { cp_number } => format!("CDP{condition} p{cp_number}"),
            Self::CoprocessorRegisterTransfer {
                load_store,
                cp_number,
            } => {
                let mnemonic = match load_store {
                    LoadStoreKind::Load => "MRC",
                    LoadStoreKind::Store => "MCR",
                };
                format!("{mnemonic}{condition} p{cp_number}")
            }
            Self::SoftwareInterrupt { comment } => format!("SWI{condition} #0x{comment:x}"),
        }
    }
}

fn validate_extra_load_store(
    op_code: u32,
    indexing: Indexing,
    write_back: bool,
    offset: HalfwordOffset,
    rn: usize,
) -> Result<()> {
    let writes_back = write_back || indexing == Indexing::Post;
    if writes_back && rn == REG_PROGRAM_COUNTER {
        Err(EmuError::illegal(op_code, "write-back to r15"))
    } else if offset.register() == Some(REG_PROGRAM_COUNTER) {
        Err(EmuError::illegal(op_code, "r15 cannot be an offset register"))
    } else {
        Ok(())
    }
}

fn format_address(
    rn: usize,
    indexing: Indexing,
    offsetting: Offsetting,
    write_back: bool,
    offset: impl Display,
) -> String {
    let sign = match offsetting {
        Offsetting::Up => "",
        Offsetting::Down => "-",
    };
    match indexing {
        Indexing::Pre => {
            let w = if write_back { "!" } else { "" };
            format!("[R{rn}, {sign}{offset}]{w}")
        }
        Indexing::Post => format!("[R{rn}], {sign}{offset}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rule_name(op_code: u32) -> Option<&'static str> {
        DECODE_TABLE
            .iter()
            .find(|rule| (rule.matches)(op_code))
            .map(|rule| rule.name)
    }

    #[test]
    fn decode_data_processing() {
        // ADD R0, R1, R2, LSL #3
        let instruction = ArmModeInstruction::decode(0xE081_0182).unwrap();
        assert_eq!(
            instruction,
            ArmModeInstruction::DataProcessing {
                alu_instruction: ArmModeAluInstruction::Add,
                set_conditions: false,
                rn: 1,
                destination: 0,
                op2: AluSecondOperandInfo::Register {
                    shift_op: ShiftOperator::Immediate(3),
                    shift_kind: ShiftKind::Lsl,
                    register: 2,
                },
            }
        );
        assert_eq!(
            instruction.disassembler(Condition::AL),
            "ADD R0, R1, R2, LSL #3"
        );

        // TEQ R12, #1
        let instruction = ArmModeInstruction::decode(0xE33C_0001).unwrap();
        assert_eq!(instruction.disassembler(Condition::AL), "TEQ R12, #1");

        // MOVS R0, R1
        let instruction = ArmModeInstruction::decode(0x01B0_0001).unwrap();
        assert_eq!(instruction.disassembler(Condition::EQ), "MOVEQS R0, R1");
    }

    #[test]
    fn decode_branch() {
        assert_eq!(
            ArmModeInstruction::decode(0xEAFF_FFFE).unwrap(),
            ArmModeInstruction::Branch {
                link: false,
                offset: -8
            }
        );
        assert_eq!(
            ArmModeInstruction::decode(0xEB00_0000).unwrap(),
            ArmModeInstruction::Branch {
                link: true,
                offset: 0
            }
        );
        assert_eq!(
            ArmModeInstruction::decode(0xEA7F_FFFF).unwrap(),
            ArmModeInstruction::Branch {
                link: false,
                offset: 0x01FF_FFFC
            }
        );
    }

    #[test]
    fn branch_and_exchange_wins_over_data_processing() {
        // BX LR also looks like a data processing word with bit 4 set
        assert_eq!(rule_name(0xE12F_FF1E), Some("branch and exchange"));
        assert_eq!(
            ArmModeInstruction::decode(0xE12F_FF1E).unwrap(),
            ArmModeInstruction::BranchAndExchange { register: 14 }
        );
    }

    #[test]
    fn decode_priority() {
        assert_eq!(rule_name(0xE6BF_0F31), Some("byte reverse"));
        assert_eq!(rule_name(0xE6BF_0FB1), Some("byte reverse"));
        assert_eq!(rule_name(0xE6FF_0FB1), Some("byte reverse"));
        assert_eq!(rule_name(0xE102_1093), Some("single data swap"));
        assert_eq!(rule_name(0xE081_0392), Some("multiply long"));
        assert_eq!(rule_name(0xE001_0392), Some("multiply"));
        assert_eq!(rule_name(0xE1C0_20D0), Some("doubleword data transfer"));
        assert_eq!(rule_name(0xE1D0_20B0), Some("halfword data transfer"));
        assert_eq!(rule_name(0xE10F_0000), Some("psr transfer"));
        assert_eq!(rule_name(0xE129_F001), Some("psr transfer"));
        assert_eq!(rule_name(0xE328_F20F), Some("psr transfer"));
        assert_eq!(rule_name(0xE591_0004), Some("single data transfer"));
        assert_eq!(rule_name(0xE8BD_8010), Some("block data transfer"));
        assert_eq!(rule_name(0xEE00_0A00), Some("coprocessor data operation"));
        assert_eq!(rule_name(0xEE10_0F10), Some("coprocessor register transfer"));
        assert_eq!(rule_name(0xED90_0A00), Some("coprocessor data transfer"));
        assert_eq!(rule_name(0xEF00_0011), Some("software interrupt"));
    }

    #[test]
    fn decode_byte_reverse() {
        let rev = |op_code| match ArmModeInstruction::decode(op_code).unwrap() {
            ArmModeInstruction::ByteReverse { variant, rd, rm } => (variant, rd, rm),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(rev(0xE6BF_0F31), (ByteReverseVariant::Rev, 0, 1));
        assert_eq!(rev(0xE6BF_2FB3), (ByteReverseVariant::Rev16, 2, 3));
        assert_eq!(rev(0xE6FF_4FB5), (ByteReverseVariant::Revsh, 4, 5));
    }

    #[test]
    fn decode_multiply() {
        assert_eq!(
            ArmModeInstruction::decode(0xE031_0392).unwrap(),
            ArmModeInstruction::Multiply {
                variant: ArmModeMultiplyVariant::Mla,
                set_conditions: true,
                rd: 1,
                rn: 0,
                rs: 3,
                rm: 2,
            }
        );

        let instruction = ArmModeInstruction::decode(0xE0C1_0392).unwrap();
        assert_eq!(
            instruction,
            ArmModeInstruction::MultiplyLong {
                variant: ArmModeMultiplyLongVariant::Smull,
                set_conditions: false,
                rdhi: 1,
                rdlo: 0,
                rs: 3,
                rm: 2,
            }
        );
        assert_eq!(
            instruction.disassembler(Condition::AL),
            "SMULL R0, R1, R2, R3"
        );
    }

    #[test]
    fn decode_transfers() {
        // LDR R0, [R1, #4]
        let instruction = ArmModeInstruction::decode(0xE591_0004).unwrap();
        assert_eq!(
            instruction,
            ArmModeInstruction::SingleDataTransfer {
                load_store: LoadStoreKind::Load,
                quantity: ReadWriteKind::Word,
                write_back: false,
                indexing: Indexing::Pre,
                offsetting: Offsetting::Up,
                rd: 0,
                rn: 1,
                offset: SingleDataTransferOffsetInfo::Immediate { offset: 4 },
            }
        );
        assert_eq!(instruction.disassembler(Condition::AL), "LDR R0, [R1, #4]");

        // LDRSH R1, [R2], -#6
        let instruction = ArmModeInstruction::decode(0xE052_10F6).unwrap();
        assert_eq!(
            instruction,
            ArmModeInstruction::HalfwordDataTransfer {
                indexing: Indexing::Post,
                offsetting: Offsetting::Down,
                write_back: false,
                load_store: LoadStoreKind::Load,
                offset: HalfwordOffset::Immediate { offset: 6 },
                rn: 2,
                rd: 1,
                transfer_kind: HalfwordTransferKind::SignedHalfwords,
            }
        );

        // LDRD R2, [R0] and STRD R2, [R0]
        assert!(matches!(
            ArmModeInstruction::decode(0xE1C0_20D0).unwrap(),
            ArmModeInstruction::DoublewordDataTransfer {
                load_store: LoadStoreKind::Load,
                rd: 2,
                rn: 0,
                ..
            }
        ));
        assert!(matches!(
            ArmModeInstruction::decode(0xE1C0_20F0).unwrap(),
            ArmModeInstruction::DoublewordDataTransfer {
                load_store: LoadStoreKind::Store,
                ..
            }
        ));

        // POP {R4, PC}
        let instruction = ArmModeInstruction::decode(0xE8BD_8010).unwrap();
        assert_eq!(
            instruction.disassembler(Condition::AL),
            "LDMIA R13!, {R4, R15}"
        );
    }

    #[test]
    fn decode_psr_transfer() {
        assert_eq!(
            ArmModeInstruction::decode(0xE14F_1000).unwrap(),
            ArmModeInstruction::PsrTransfer {
                psr_kind: PsrKind::Spsr,
                kind: PsrOpKind::Mrs {
                    destination_register: 1
                },
            }
        );

        let instruction = ArmModeInstruction::decode(0xE328_F20F).unwrap();
        assert_eq!(
            instruction,
            ArmModeInstruction::PsrTransfer {
                psr_kind: PsrKind::Cpsr,
                kind: PsrOpKind::Msr {
                    operand: MsrOperand::Immediate {
                        base: 0x0F,
                        rotate: 2
                    },
                    field_mask: 0b1000,
                },
            }
        );
        assert_eq!(
            instruction.disassembler(Condition::AL),
            format!("MSR CPSR_f, #{}", 0xF000_0000_u32)
        );
    }

    #[test]
    fn unknown_opcodes() {
        // CLZ R0, R0 is ARMv5 but not part of this set
        assert_eq!(
            ArmModeInstruction::decode(0xE16F_0F10),
            Err(EmuError::UnknownOpcode {
                op_code: 0xE16F_0F10,
                address: 0
            })
        );
        // undefined instruction space: 011 with bit 4 set
        assert!(matches!(
            ArmModeInstruction::decode(0xE7F0_00F0),
            Err(EmuError::UnknownOpcode { .. })
        ));
    }

    #[test]
    fn illegal_opcodes() {
        let reason = |op_code| match ArmModeInstruction::decode(op_code) {
            Err(EmuError::IllegalOpcode { reason, .. }) => reason,
            other => panic!("0x{op_code:08x} decoded to {other:?}"),
        };

        // MUL R0, R0, R1
        assert_eq!(
            reason(0xE000_0190),
            "multiply destination and rm must differ"
        );
        // MUL R15, R1, R2
        assert_eq!(reason(0xE00F_0291), "multiply cannot use r15");
        // UMULL R0, R0, R1, R2
        assert_eq!(reason(0xE080_0291), "multiply long destinations must differ");
        // ADD R0, R1, R2, LSL R15
        assert_eq!(reason(0xE081_0F12), "r15 cannot hold a shift amount");
        // LDR R0, [R15], #4
        assert_eq!(reason(0xE49F_0004), "write-back to r15");
        // LDRD R1, [R0]
        assert_eq!(
            reason(0xE1C0_10D0),
            "doubleword transfers need an even register"
        );
        // LDRD R0, [R0]
        assert_eq!(
            reason(0xE1C0_00D0),
            "doubleword transfer registers overlap the base"
        );
        // LDM R15!, {R0}
        assert_eq!(reason(0xE8BF_0001), "write-back to r15");
        // SWP R15, R0, [R1]
        assert_eq!(reason(0xE101_F090), "swap cannot use r15");
        // MRS R15, CPSR
        assert_eq!(reason(0xE10F_F000), "MRS cannot target r15");
    }
}
