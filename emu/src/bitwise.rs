use std::ops::RangeInclusive;

/// Helpers to read and manipulate bit fields of unsigned integers.
///
/// Bit indexes go from lsb to msb (right to left). Every operation widens the
/// value to `u64`, works there and narrows the result back, so the same
/// default methods serve every implementor.
pub trait Bits: Copy {
    /// Width of the type in bits.
    const WIDTH: u8;

    fn widen(self) -> u64;

    /// Truncates `value` to the width of `Self`.
    fn narrow(value: u64) -> Self;

    fn is_bit_on(self, bit_idx: u8) -> bool {
        debug_assert!(bit_idx < Self::WIDTH);
        self.widen() & (1 << bit_idx) != 0
    }

    fn set_bit_on(&mut self, bit_idx: u8) {
        debug_assert!(bit_idx < Self::WIDTH);
        *self = Self::narrow(self.widen() | (1 << bit_idx));
    }

    fn set_bit_off(&mut self, bit_idx: u8) {
        debug_assert!(bit_idx < Self::WIDTH);
        *self = Self::narrow(self.widen() & !(1 << bit_idx));
    }

    fn set_bit(&mut self, bit_idx: u8, value: bool) {
        if value {
            self.set_bit_on(bit_idx);
        } else {
            self.set_bit_off(bit_idx);
        }
    }

    fn get_bit(self, bit_idx: u8) -> bool {
        self.is_bit_on(bit_idx)
    }

    /// Extracts the bits in `bits_range` and moves them down to position 0.
    fn get_bits(self, bits_range: RangeInclusive<u8>) -> Self {
        let start = *bits_range.start();
        debug_assert!(*bits_range.end() < Self::WIDTH);

        Self::narrow((self.widen() >> start) & mask_of(bits_range.len()))
    }

    /// Returns a sign-extended copy of the value, reading its lowest
    /// `number_of_bits` bits as a two's complement number.
    fn sign_extended(self, number_of_bits: u8) -> Self {
        debug_assert!(number_of_bits > 0 && number_of_bits <= Self::WIDTH);
        let unused = 64 - u32::from(number_of_bits);
        // Move the sign bit to bit 63 and let the arithmetic shift spread it back.
        let extended = ((self.widen() << unused) as i64 >> unused) as u64;
        Self::narrow(extended)
    }
}

const fn mask_of(length: usize) -> u64 {
    if length >= 64 {
        u64::MAX
    } else {
        (1 << length) - 1
    }
}

macro_rules! impl_bits {
    ($($t:ty),*) => {
        $(
            impl Bits for $t {
                const WIDTH: u8 = <$t>::BITS as u8;

                fn widen(self) -> u64 {
                    u64::from(self)
                }

                fn narrow(value: u64) -> Self {
                    value as Self
                }
            }
        )*
    };
}

impl_bits!(u8, u16, u32, u64);
