use std::fmt::Display;

use crate::bitwise::Bits;

/// 8 bits per channel, as handed to a [`Canvas`](super::Canvas).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    #[must_use]
    pub const fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Decodes a 16-bit "high color" pixel stored as two bytes, first byte
    /// holding the high half.
    #[must_use]
    pub fn from_rgb565(bytes: [u8; 2]) -> Self {
        Self::from(u16::from_be_bytes(bytes))
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},{})", self.red, self.green, self.blue)
    }
}

fn scale(value: u16, max: u16) -> u8 {
    (u32::from(value) * 255 / u32::from(max)) as u8
}

impl From<u16> for Color {
    fn from(color: u16) -> Self {
        // Color     Values     Bits
        //-------------------------------
        // red ---> [0 - 31]    11-15
        // green -> [0 - 63]    5-10
        // blue --> [0 - 31]    0-4

        Self {
            red: scale(color.get_bits(11..=15), 31),
            green: scale(color.get_bits(5..=10), 63),
            blue: scale(color.get_bits(0..=4), 31),
        }
    }
}

pub mod colors {
    use crate::render::color::Color;

    pub const BLACK: Color = Color::from_rgb(0, 0, 0);
    pub const RED: Color = Color::from_rgb(255, 0, 0);
    pub const GREEN: Color = Color::from_rgb(0, 255, 0);
    pub const BLUE: Color = Color::from_rgb(0, 0, 255);
    pub const WHITE: Color = Color::from_rgb(255, 255, 255);
}
