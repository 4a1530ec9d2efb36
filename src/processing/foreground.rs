use image::{GrayImage, Luma};

use crate::processing::image_buffer::ImageBuffer;

/// Per-pixel opacity marking subject (255) versus background (0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    alpha: Vec<u8>,
}

impl AlphaMask {
    pub fn opaque(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![u8::MAX; width as usize * height as usize],
        }
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

    pub fn values(&self) -> &[u8] {
        &self.alpha
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.alpha[y as usize * self.width as usize + x as usize]
    }

    /// Fraction of pixels classified as background.
    pub fn background_ratio(&self) -> f32 {
        if self.alpha.is_empty() {
            return 0.0;
        }
        let bg = self.alpha.iter().filter(|&&a| a == 0).count();
        bg as f32 / self.alpha.len() as f32
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.get(x, y)]))
    }
}

/// Segments an image into subject and background.
///
/// Implementations must return a mask with the image's exact dimensions and
/// must not fail; when unsure, return [`AlphaMask::opaque`].
pub trait ForegroundEstimator: Send {
    fn name(&self) -> &'static str;
    fn estimate(&self, image: &ImageBuffer) -> AlphaMask;
}

/// Green-screen heuristic: background where green dominates red and blue.
#[derive(Debug, Clone, Copy)]
pub struct ChromaKey {
    pub green_ratio: f32,
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self { green_ratio: 1.2 }
    }
}

impl ChromaKey {
    fn is_background(&self, [r, g, b, _]: [u8; 4]) -> bool {
        let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
        g > r * self.green_ratio && g > b * self.green_ratio
    }
}

impl ForegroundEstimator for ChromaKey {
    fn name(&self) -> &'static str {
        "chroma-key"
    }

    fn estimate(&self, image: &ImageBuffer) -> AlphaMask {
        let alpha = image
            .pixels()
            .map(|px| if self.is_background(px) { 0 } else { u8::MAX })
            .collect();
        AlphaMask {
            width: image.width(),
            height: image.height(),
            alpha,
        }
    }
}

/// Trusts the image's own alpha channel, e.g. a pre-cut PNG or an external segmenter's output.
#[derive(Debug, Clone, Copy)]
pub struct AlphaChannel {
    pub threshold: u8,
}

impl Default for AlphaChannel {
    fn default() -> Self {
        Self { threshold: 128 }
    }
}

impl ForegroundEstimator for AlphaChannel {
    fn name(&self) -> &'static str {
        "alpha-channel"
    }

    fn estimate(&self, image: &ImageBuffer) -> AlphaMask {
        let alpha = image
            .pixels()
            .map(|[_, _, _, a]| if a < self.threshold { 0 } else { u8::MAX })
            .collect();
        AlphaMask {
            width: image.width(),
            height: image.height(),
            alpha,
        }
    }
}

/// Keeps every pixel; yields a flat cutout of the whole photo.
#[derive(Debug, Clone, Copy, Default)]
pub struct Opaque;

impl ForegroundEstimator for Opaque {
    fn name(&self) -> &'static str {
        "opaque"
    }

    fn estimate(&self, image: &ImageBuffer) -> AlphaMask {
        AlphaMask::opaque(image.width(), image.height())
    }
}
