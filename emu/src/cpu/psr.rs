//! # Program Status Registers (CPSR and SPSR)
//!
//! Only the condition flags are interpreted; every other bit is kept as
//! written so that [`Psr::dump`] / [`Psr::store`] round-trip any value.
//!
//! ```text
//! 31 30 29 28 27                 5 4   0
//! ┌──┬──┬──┬──┬───────────────────┬─────┐
//! │N │Z │C │V │   preserved       │Mode │
//! └──┴──┴──┴──┴───────────────────┴─────┘
//! ```
//!
//! - **Flags (28-31)**: See [`condition`](super::condition) for how these are tested
//! - **Mode (0-4)**: Selects one of the 32 saved-status slots in
//!   [`register_bank`](super::register_bank)

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::ArithmeticOpResult;
use crate::cpu::condition::Condition;

pub const SIGN_FLAG: u8 = 31;
pub const ZERO_FLAG: u8 = 30;
pub const CARRY_FLAG: u8 = 29;
pub const OVERFLOW_FLAG: u8 = 28;

/// Program Status Register (CPSR or SPSR).
///
/// # Example
///
/// ```
/// use emu::cpu::psr::Psr;
///
/// let mut cpsr = Psr::default();
///
/// assert!(cpsr.set_zero_flag(true));
/// assert!(cpsr.zero_flag());
/// assert_eq!(cpsr.dump(), 0x4000_0000);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    /// Tests `cond` against the flags. `None` for the reserved `NV`.
    #[must_use]
    pub fn can_execute(self, cond: Condition) -> Option<bool> {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        Some(match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            NV => return None,
        })
    }

    #[must_use]
    pub const fn dump(self) -> u32 {
        self.0
    }

    pub const fn store(&mut self, value: u32) {
        self.0 = value;
    }

    #[must_use]
    pub fn test(self, bit: u8) -> bool {
        self.0.get_bit(bit)
    }

    /// Sets `bit` and hands the value back.
    pub fn set(&mut self, bit: u8, value: bool) -> bool {
        self.0.set_bit(bit, value);
        value
    }

    /// N => Bit 31, (0=Not Signed, 1=Signed)
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.test(SIGN_FLAG)
    }

    /// Z => Bit 30, (0=Not Zero, 1=Zero)
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.test(ZERO_FLAG)
    }

    /// C => Bit 29, (0=Borrow/No Carry, 1=Carry/No Borrow)
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.test(CARRY_FLAG)
    }

    /// V => Bit 28, (0=No Overflow, 1=Overflow)
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.test(OVERFLOW_FLAG)
    }

    pub fn set_sign_flag(&mut self, value: bool) -> bool {
        self.set(SIGN_FLAG, value)
    }

    pub fn set_zero_flag(&mut self, value: bool) -> bool {
        self.set(ZERO_FLAG, value)
    }

    pub fn set_carry_flag(&mut self, value: bool) -> bool {
        self.set(CARRY_FLAG, value)
    }

    pub fn set_overflow_flag(&mut self, value: bool) -> bool {
        self.set(OVERFLOW_FLAG, value)
    }

    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_carry_flag(op_result.carry);
        self.set_zero_flag(op_result.zero);
        self.set_sign_flag(op_result.sign);
        self.set_overflow_flag(op_result.overflow);
    }

    /// M4-M0 => Bits 4-0
    #[must_use]
    pub fn cpu_mode(self) -> u32 {
        self.0.get_bits(0..=4)
    }
}

impl From<u32> for Psr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    fn psr_with(n: bool, z: bool, c: bool, v: bool) -> Psr {
        let mut psr = Psr::default();
        psr.set_sign_flag(n);
        psr.set_zero_flag(z);
        psr.set_carry_flag(c);
        psr.set_overflow_flag(v);
        psr
    }

    #[test]
    fn check_flags() {
        let mut cpsr = Psr::default();
        assert!(cpsr.set_sign_flag(true));
        assert!(cpsr.sign_flag());
        assert!(!cpsr.set_zero_flag(false));
        assert!(!cpsr.zero_flag());
        cpsr.set_carry_flag(true);
        cpsr.set_overflow_flag(true);

        assert_eq!(cpsr.dump(), 0b1011 << 28);
        assert!(cpsr.test(OVERFLOW_FLAG));
    }

    #[test]
    fn check_dump_store_round_trip() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let value = rng.r#gen::<u32>();
            let mut psr = Psr::default();
            psr.store(value);
            let mut copy = Psr::default();
            copy.store(psr.dump());

            assert_eq!(copy.dump(), value);
        }
    }

    #[test]
    fn check_cpu_mode() {
        let psr = Psr::from(0xF000_00D3);
        assert_eq!(psr.cpu_mode(), 0x13);
    }

    #[test]
    fn check_condition_table() {
        for bits in 0..16_u8 {
            let (n, z, c, v) = (bits & 8 != 0, bits & 4 != 0, bits & 2 != 0, bits & 1 != 0);
            let psr = psr_with(n, z, c, v);

            let expected = [
                z,
                !z,
                c,
                !c,
                n,
                !n,
                v,
                !v,
                c && !z,
                !c || z,
                n == v,
                n != v,
                !z && n == v,
                z || n != v,
                true,
            ];

            for (code, expected) in expected.into_iter().enumerate() {
                let condition = Condition::from(code as u8);
                assert_eq!(
                    psr.can_execute(condition),
                    Some(expected),
                    "{condition:?} with flags {bits:04b}"
                );
            }

            assert_eq!(psr.can_execute(Condition::NV), None);
        }
    }
}
