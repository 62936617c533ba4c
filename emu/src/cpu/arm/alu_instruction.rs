//! # ALU and Barrel Shifter
//!
//! Data processing instructions combine a first operand (a register) with a
//! second operand that first goes through the barrel shifter:
//!
//! ```text
//!  Rn ───────────────────────────┐
//!                                ▼
//!  Rm / imm ──► barrel shifter ──► ALU ──► Rd
//!                   │                │
//!                   └─ carry out     └─ N Z C V
//! ```
//!
//! Logical operations take C from the shifter carry out. Arithmetic
//! operations compute C and V from the addition itself.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::flags::ShiftKind;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArmModeAluInstruction {
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl Display for ArmModeAluInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = match self {
            Self::And => "AND",
            Self::Eor => "EOR",
            Self::Sub => "SUB",
            Self::Rsb => "RSB",
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sbc => "SBC",
            Self::Rsc => "RSC",
            Self::Tst => "TST",
            Self::Teq => "TEQ",
            Self::Cmp => "CMP",
            Self::Cmn => "CMN",
            Self::Orr => "ORR",
            Self::Mov => "MOV",
            Self::Bic => "BIC",
            Self::Mvn => "MVN",
        };
        f.write_str(mnemonic)
    }
}

impl ArmModeAluInstruction {
    /// TST, TEQ, CMP and CMN only update the flags.
    #[must_use]
    pub const fn is_test(self) -> bool {
        matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }
}

impl From<u32> for ArmModeAluInstruction {
    /// Reads the low nibble.
    fn from(alu_op_code: u32) -> Self {
        match alu_op_code & 0xF {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Sub,
            0x3 => Self::Rsb,
            0x4 => Self::Add,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Rsc,
            0x8 => Self::Tst,
            0x9 => Self::Teq,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mov,
            0xE => Self::Bic,
            _ => Self::Mvn,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArithmeticOpResult {
    pub result: u32,
    pub carry: bool,
    pub overflow: bool,
    pub sign: bool,
    pub zero: bool,
}

impl ArithmeticOpResult {
    /// Result of a logical operation: C comes from the shifter, V is kept.
    #[must_use]
    pub fn logical(result: u32, carry: bool, overflow: bool) -> Self {
        Self {
            result,
            carry,
            overflow,
            sign: result.get_bit(31),
            zero: result == 0,
        }
    }
}

/// Output of the barrel shifter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftResult {
    pub value: u32,
    pub carry: bool,
}

/// `first_op + second_op + carry_in` with unsigned carry out and signed overflow.
#[must_use]
pub fn add_with_carry(first_op: u32, second_op: u32, carry_in: bool) -> ArithmeticOpResult {
    // we do the sum in 64bits so that the 32nd bit is the carry
    let wide = u64::from(first_op) + u64::from(second_op) + u64::from(carry_in);
    let result = wide as u32;

    // overflow only occurs when operands have the same sign and result has the opposite one
    let overflow = ((first_op ^ result) & (second_op ^ result)).get_bit(31);

    ArithmeticOpResult {
        result,
        carry: wide > u64::from(u32::MAX),
        overflow,
        sign: result.get_bit(31),
        zero: result == 0,
    }
}

/// `first_op - second_op - !carry_in`. Carry is set when no borrow happened.
#[must_use]
pub fn sub_with_carry(first_op: u32, second_op: u32, carry_in: bool) -> ArithmeticOpResult {
    add_with_carry(first_op, !second_op, carry_in)
}

#[must_use]
pub fn add_inner_op(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    add_with_carry(first_op, second_op, false)
}

#[must_use]
pub fn sub_inner_op(first_op: u32, second_op: u32) -> ArithmeticOpResult {
    sub_with_carry(first_op, second_op, true)
}

/// Operand 2 in immediate form: `imm ROR (rotate * 2)`.
#[must_use]
pub fn rotated_immediate(imm: u32, rotate: u32, carry: bool) -> ShiftResult {
    let value = imm.rotate_right(rotate * 2);
    ShiftResult {
        value,
        carry: if rotate == 0 { carry } else { value.get_bit(31) },
    }
}

/// Shift whose amount is encoded in the instruction (0-31).
///
/// An amount of 0 is special: `LSL #0` is a plain move, `LSR #0` and
/// `ASR #0` encode a shift by 32, `ROR #0` encodes `RRX`.
#[must_use]
pub fn shift_by_immediate(kind: ShiftKind, amount: u32, rm: u32, carry: bool) -> ShiftResult {
    let amount = amount & 0x1F;
    let (value, carry) = match (kind, amount) {
        (ShiftKind::Lsl, 0) => (rm, carry),
        (ShiftKind::Lsl, n) => (rm << n, rm.get_bit((32 - n) as u8)),
        (ShiftKind::Lsr, 0) => (0, rm.get_bit(31)),
        (ShiftKind::Lsr, n) => (rm >> n, rm.get_bit((n - 1) as u8)),
        (ShiftKind::Asr, 0) => (((rm as i32) >> 31) as u32, rm.get_bit(31)),
        (ShiftKind::Asr, n) => (((rm as i32) >> n) as u32, rm.get_bit((n - 1) as u8)),
        (ShiftKind::Ror, 0) => ((u32::from(carry) << 31) | (rm >> 1), rm.get_bit(0)),
        (ShiftKind::Ror, n) => (rm.rotate_right(n), rm.get_bit((n - 1) as u8)),
    };

    ShiftResult { value, carry }
}

/// Shift whose amount comes from the bottom byte of a register.
///
/// An amount of 0 leaves both the value and the carry untouched.
#[must_use]
pub fn shift_by_register(kind: ShiftKind, amount: u32, rm: u32, carry: bool) -> ShiftResult {
    let amount = amount & 0xFF;
    let (value, carry) = match (kind, amount) {
        (_, 0) => (rm, carry),
        (ShiftKind::Lsl | ShiftKind::Lsr | ShiftKind::Asr, 1..=31) => {
            return shift_by_immediate(kind, amount, rm, carry);
        }
        (ShiftKind::Lsl, 32) => (0, rm.get_bit(0)),
        (ShiftKind::Lsr, 32) => (0, rm.get_bit(31)),
        (ShiftKind::Lsl | ShiftKind::Lsr, _) => (0, false),
        (ShiftKind::Asr, _) => (((rm as i32) >> 31) as u32, rm.get_bit(31)),
        (ShiftKind::Ror, n) => match n % 32 {
            0 => (rm, rm.get_bit(31)),
            n => return shift_by_immediate(ShiftKind::Ror, n, rm, carry),
        },
    };

    ShiftResult { value, carry }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShiftOperator {
    Immediate(u32),
    Register(usize),
}

impl Display for ShiftOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate(value) => write!(f, "#{value}"),
            Self::Register(register) => write!(f, "R{register}"),
        }
    }
}

/// Operand 2 of a data processing instruction, before the barrel shifter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AluSecondOperandInfo {
    Register {
        shift_op: ShiftOperator,
        shift_kind: ShiftKind,
        register: usize,
    },
    Immediate {
        base: u32,
        rotate: u32,
    },
}

impl AluSecondOperandInfo {
    #[must_use]
    pub fn from_op_code(op_code: u32) -> Self {
        if op_code.get_bit(25) {
            Self::Immediate {
                base: op_code.get_bits(0..=7),
                rotate: op_code.get_bits(8..=11),
            }
        } else {
            let shift_op = if op_code.get_bit(4) {
                ShiftOperator::Register(op_code.get_bits(8..=11) as usize)
            } else {
                ShiftOperator::Immediate(op_code.get_bits(7..=11))
            };
            Self::Register {
                shift_op,
                shift_kind: ShiftKind::from(op_code.get_bits(5..=6)),
                register: op_code.get_bits(0..=3) as usize,
            }
        }
    }
}

impl Display for AluSecondOperandInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Register {
                shift_op: ShiftOperator::Immediate(0),
                shift_kind,
                register,
            } => match shift_kind {
                ShiftKind::Lsl => write!(f, "R{register}"),
                ShiftKind::Ror => write!(f, "R{register}, RRX"),
                ShiftKind::Lsr | ShiftKind::Asr => write!(f, "R{register}, {shift_kind} #32"),
            },
            Self::Register {
                shift_op,
                shift_kind,
                register,
            } => write!(f, "R{register}, {shift_kind} {shift_op}"),
            Self::Immediate { base, rotate } => write!(f, "#{}", base.rotate_right(rotate * 2)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrKind {
    Cpsr,
    Spsr,
}

impl From<bool> for PsrKind {
    fn from(value: bool) -> Self {
        if value { Self::Spsr } else { Self::Cpsr }
    }
}

impl Display for PsrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpsr => f.write_str("CPSR"),
            Self::Spsr => f.write_str("SPSR"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MsrOperand {
    Register(usize),
    Immediate { base: u32, rotate: u32 },
}

impl Display for MsrOperand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Register(register) => write!(f, "R{register}"),
            Self::Immediate { base, rotate } => write!(f, "#{}", base.rotate_right(rotate * 2)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PsrOpKind {
    /// Transfer PSR contents to a register.
    Mrs { destination_register: usize },

    /// Transfer a register or an immediate to the PSR bytes selected by
    /// `field_mask` (bit 0 = control byte, bit 3 = flags byte).
    Msr { operand: MsrOperand, field_mask: u32 },
}

/// Expands the 4-bit MSR field mask into a mask over the PSR bytes.
#[must_use]
pub fn psr_byte_mask(field_mask: u32) -> u32 {
    (0..4_u8)
        .filter(|&field| field_mask.get_bit(field))
        .fold(0, |mask, field| mask | (0xFF << (u32::from(field) * 8)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    #[test]
    fn test_instruction_is_test() {
        assert_eq!(ArmModeAluInstruction::from(9), ArmModeAluInstruction::Teq);
        assert!(ArmModeAluInstruction::from(9).is_test());
        assert!(ArmModeAluInstruction::Cmn.is_test());
        assert!(!ArmModeAluInstruction::Mov.is_test());
    }

    #[test]
    fn check_add_table() {
        // (a, b, result, carry, overflow)
        let cases = [
            (0x7FFF_FFFF, 0x8000_0001, 0x0, true, false),
            (0x7FFF_FFFF, 0x1, 0x8000_0000, false, true),
            (0xFFFF_FFFF, 0x1, 0x0, true, false),
            (0x8000_0000, 0x8000_0000, 0x0, true, true),
            (0xFFFF_FFFE, 0xFFFF_FFFF, 0xFFFF_FFFD, true, false),
            (0x1234, 0x1, 0x1235, false, false),
            (0x0, 0x0, 0x0, false, false),
        ];

        for (a, b, result, carry, overflow) in cases {
            let r = add_inner_op(a, b);
            assert_eq!(
                (r.result, r.carry, r.overflow),
                (result, carry, overflow),
                "0x{a:08x} + 0x{b:08x}"
            );
            assert_eq!(r.zero, result == 0);
            assert_eq!(r.sign, result.get_bit(31));
        }
    }

    #[test]
    fn check_sub_table() {
        // (a, b, result, carry, overflow)
        let cases = [
            (0x8000_0000, 0x8000_0000, 0x0, true, false),
            (0x0, 0x1, 0xFFFF_FFFF, false, false),
            (0x8000_0000, 0x1, 0x7FFF_FFFF, true, true),
            (0x7FFF_FFFF, 0xFFFF_FFFF, 0x8000_0000, false, true),
            (0x5, 0x3, 0x2, true, false),
            (0x3, 0x5, 0xFFFF_FFFE, false, false),
            (0x0, 0x0, 0x0, true, false),
        ];

        for (a, b, result, carry, overflow) in cases {
            let r = sub_inner_op(a, b);
            assert_eq!(
                (r.result, r.carry, r.overflow),
                (result, carry, overflow),
                "0x{a:08x} - 0x{b:08x}"
            );
        }
    }

    #[test]
    fn check_add_sub_flags_against_reference() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let a: u32 = rng.r#gen();
            let b: u32 = rng.r#gen();

            let add = add_inner_op(a, b);
            assert_eq!(add.result, a.wrapping_add(b));
            assert_eq!(add.carry, a > u32::MAX - b);
            assert_eq!(add.overflow, (a as i32).checked_add(b as i32).is_none());

            let sub = sub_inner_op(a, b);
            assert_eq!(sub.result, a.wrapping_sub(b));
            assert_eq!(sub.carry, a >= b);
            assert_eq!(sub.overflow, (a as i32).checked_sub(b as i32).is_none());
        }
    }

    #[test]
    fn check_carry_in() {
        let adc = add_with_carry(0xFFFF_FFFF, 0, true);
        assert_eq!((adc.result, adc.carry), (0, true));

        // SBC with C clear subtracts one more.
        let sbc = sub_with_carry(5, 3, false);
        assert_eq!((sbc.result, sbc.carry), (1, true));

        let sbc = sub_with_carry(0, 0, false);
        assert_eq!((sbc.result, sbc.carry), (0xFFFF_FFFF, false));
    }

    #[test]
    fn check_rotated_immediate() {
        assert_eq!(
            rotated_immediate(0xFF, 0, true),
            ShiftResult {
                value: 0xFF,
                carry: true
            }
        );
        assert_eq!(
            rotated_immediate(0x2, 1, false),
            ShiftResult {
                value: 0x8000_0000,
                carry: true
            }
        );
        assert_eq!(rotated_immediate(0xFF, 4, true).value, 0xFF00_0000);
        assert!(rotated_immediate(0x3F, 1, true).carry);
    }

    #[test]
    fn check_shift_by_immediate() {
        let rm = 0x8000_0003;
        let shift = |kind, amount, carry| {
            let r = shift_by_immediate(kind, amount, rm, carry);
            (r.value, r.carry)
        };

        assert_eq!(shift(ShiftKind::Lsl, 0, true), (rm, true));
        assert_eq!(shift(ShiftKind::Lsl, 0, false), (rm, false));
        assert_eq!(shift(ShiftKind::Lsl, 1, false), (0x6, true));
        assert_eq!(shift(ShiftKind::Lsr, 0, false), (0, true));
        assert_eq!(shift(ShiftKind::Lsr, 1, false), (0x4000_0001, true));
        assert_eq!(shift(ShiftKind::Asr, 0, false), (0xFFFF_FFFF, true));
        assert_eq!(shift(ShiftKind::Asr, 2, false), (0xE000_0000, true));
        assert_eq!(shift(ShiftKind::Ror, 0, false), (0x4000_0001, true));
        assert_eq!(shift(ShiftKind::Ror, 0, true), (0xC000_0001, true));
        assert_eq!(shift(ShiftKind::Ror, 4, false), (0x3800_0000, false));
    }

    #[test]
    fn check_shift_by_register() {
        let rm = 0x8000_0001;
        let shift = |kind, amount, carry| {
            let r = shift_by_register(kind, amount, rm, carry);
            (r.value, r.carry)
        };

        for kind in [ShiftKind::Lsl, ShiftKind::Lsr, ShiftKind::Asr, ShiftKind::Ror] {
            assert_eq!(shift(kind, 0, true), (rm, true));
            assert_eq!(shift(kind, 0x100, false), (rm, false));
        }

        assert_eq!(shift(ShiftKind::Lsl, 32, false), (0, true));
        assert_eq!(shift(ShiftKind::Lsl, 33, true), (0, false));
        assert_eq!(shift(ShiftKind::Lsr, 32, false), (0, true));
        assert_eq!(shift(ShiftKind::Lsr, 40, true), (0, false));
        assert_eq!(shift(ShiftKind::Asr, 32, false), (0xFFFF_FFFF, true));
        assert_eq!(shift(ShiftKind::Asr, 200, false), (0xFFFF_FFFF, true));
        assert_eq!(shift(ShiftKind::Ror, 32, false), (rm, true));
        assert_eq!(shift(ShiftKind::Ror, 33, false), (0xC000_0000, true));
        assert_eq!(shift(ShiftKind::Lsr, 1, false), (0x4000_0000, true));
    }

    #[test]
    fn check_psr_byte_mask() {
        assert_eq!(psr_byte_mask(0b1000), 0xFF00_0000);
        assert_eq!(psr_byte_mask(0b0001), 0x0000_00FF);
        assert_eq!(psr_byte_mask(0b1111), 0xFFFF_FFFF);
        assert_eq!(psr_byte_mask(0b0110), 0x00FF_FF00);
        assert_eq!(psr_byte_mask(0), 0);
    }

    #[test]
    fn check_operand_display() {
        // MOV R0, R1, LSR #32
        let op2 = AluSecondOperandInfo::from_op_code(0xE1A0_0021);
        assert_eq!(op2.to_string(), "R1, LSR #32");

        // ADD R0, R1, R2, LSL R3
        let op2 = AluSecondOperandInfo::from_op_code(0xE081_0312);
        assert_eq!(
            op2,
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(3),
                shift_kind: ShiftKind::Lsl,
                register: 2,
            }
        );
        assert_eq!(op2.to_string(), "R2, LSL R3");

        // MOV R0, #0xFF000000
        let op2 = AluSecondOperandInfo::from_op_code(0xE3A0_04FF);
        assert_eq!(op2.to_string(), format!("#{}", 0xFF00_0000_u32));
    }
}
