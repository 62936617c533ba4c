//! Turning framebuffer bytes into pixels for whoever draws them.
pub mod color;

use color::Color;

/// Drawing surface provided by the front-end.
pub trait Canvas {
    fn set_pixel(&mut self, x: u32, y: u32, color: Color);
}

/// In-memory canvas, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Color>,
}

impl Image {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::default(); width as usize * height as usize],
        }
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        self.index(x, y).map(|index| self.pixels[index])
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }
}

impl Canvas for Image {
    /// Pixels outside the image are dropped.
    fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        if let Some(index) = self.index(x, y) {
            self.pixels[index] = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::color::colors;
    use pretty_assertions::assert_eq;

    #[test]
    fn image_clips() {
        let mut image = Image::new(2, 2);
        image.set_pixel(1, 1, colors::RED);
        image.set_pixel(2, 0, colors::RED);

        assert_eq!(image.pixel(1, 1), Some(colors::RED));
        assert_eq!(image.pixel(0, 0), Some(colors::BLACK));
        assert_eq!(image.pixel(2, 0), None);
    }
}
