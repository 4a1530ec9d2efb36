use std::fmt;

use image::RgbaImage;

use crate::error::{Error, Result};

/// Decoded RGBA8 pixels. Immutable once constructed.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageBuffer {
    /// Boundary check for already-decoded pixels handed in by the host.
    pub fn from_raw(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions(format!(
                "image must be non-empty, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(Error::InvalidDimensions(format!(
                "{width}x{height} RGBA image needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_pixel(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let count = width as usize * height as usize;
        Self::from_raw(rgba.repeat(count), width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels(&self) -> impl ExactSizeIterator<Item = [u8; 4]> + '_ {
        self.pixels
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Pixel at `(x, y)`; callers keep coordinates in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        [px[0], px[1], px[2], px[3]]
    }

    /// Returns a new buffer whose alpha is the minimum of the source alpha and `alpha`.
    ///
    /// `alpha` holds one value per pixel and must match [`Self::pixel_count`].
    pub fn with_alpha(&self, alpha: &[u8]) -> Result<Self> {
        if alpha.len() != self.pixel_count() {
            return Err(Error::InvalidDimensions(format!(
                "alpha has {} entries for a {}x{} image",
                alpha.len(),
                self.width,
                self.height
            )));
        }
        let mut pixels = self.pixels.clone();
        for (px, &a) in pixels.chunks_exact_mut(4).zip(alpha) {
            px[3] = px[3].min(a);
        }
        Ok(Self {
            width: self.width,
            height: self.height,
            pixels,
        })
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }
}

impl TryFrom<RgbaImage> for ImageBuffer {
    type Error = Error;

    fn try_from(img: RgbaImage) -> Result<Self> {
        let (width, height) = img.dimensions();
        Self::from_raw(img.into_raw(), width, height)
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
