use std::borrow::Cow;

use image::{GrayImage, Luma};
use tracing::warn;

use crate::error::{Error, Result};
use crate::processing::foreground::AlphaMask;
use crate::processing::image_buffer::ImageBuffer;

/// Depth multiplier, always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DepthScale(f32);

impl DepthScale {
    pub const MIN: Self = Self(0.0);
    pub const MAX: Self = Self(1.0);

    /// Clamps into range; NaN and infinities collapse to zero.
    pub fn new(value: f32) -> Self {
        if !value.is_finite() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for DepthScale {
    fn default() -> Self {
        Self(0.5)
    }
}

/// Normalized per-pixel depth: 0 is far (or absent), 1 is nearest.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthField {
    width: u32,
    height: u32,
    depth: Vec<f32>,
}

impl DepthField {
    /// Builds a field from raw samples, clamping each into `[0, 1]`.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 || values.len() != width as usize * height as usize {
            return Err(Error::InvalidDimensions(format!(
                "{width}x{height} depth field cannot hold {} samples",
                values.len()
            )));
        }
        let depth = values.into_iter().map(normalize).collect();
        Ok(Self {
            width,
            height,
            depth,
        })
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

    pub fn values(&self) -> &[f32] {
        &self.depth
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.depth[y as usize * self.width as usize + x as usize]
    }

    /// Bilinear sample at continuous pixel coordinates, clamped to the field's edges.
    pub fn sample_bilinear(&self, px: f32, py: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let px = px.clamp(0.0, max_x);
        let py = py.clamp(0.0, max_y);

        let x0 = px.floor() as u32;
        let y0 = py.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = px - x0 as f32;
        let ty = py - y0 as f32;

        let top = self.get(x0, y0) * (1.0 - tx) + self.get(x1, y0) * tx;
        let bottom = self.get(x0, y1) * (1.0 - tx) + self.get(x1, y1) * tx;
        normalize(top * (1.0 - ty) + bottom * ty)
    }

    pub fn max(&self) -> f32 {
        self.depth.iter().copied().fold(0.0, f32::max)
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([(self.get(x, y) * 255.0).round() as u8])
        })
    }
}

/// The mask to pair with `image`; a mask of another size is replaced by an opaque one.
fn matching_mask<'a>(image: &ImageBuffer, mask: &'a AlphaMask) -> Cow<'a, AlphaMask> {
    if mask.dimensions() == image.dimensions() {
        return Cow::Borrowed(mask);
    }
    let (mw, mh) = mask.dimensions();
    warn!(
        mask_width = mw,
        mask_height = mh,
        image_width = image.width(),
        image_height = image.height(),
        "mask does not match image, treating every pixel as foreground"
    );
    Cow::Owned(AlphaMask::opaque(image.width(), image.height()))
}

fn normalize(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Turns masked pixels into a depth field.
///
/// Implementations must keep the image's dimensions, report 0 wherever the mask
/// is fully transparent and stay deterministic, so the field can be recomputed
/// on every scale change without touching the mask.
pub trait DepthEstimator: Send {
    fn name(&self) -> &'static str;
    fn estimate(&self, image: &ImageBuffer, mask: &AlphaMask, scale: DepthScale) -> DepthField;
}

/// Brighter is closer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Luminance;

impl DepthEstimator for Luminance {
    fn name(&self) -> &'static str {
        "luminance"
    }

    fn estimate(&self, image: &ImageBuffer, mask: &AlphaMask, scale: DepthScale) -> DepthField {
        let mask = matching_mask(image, mask);
        let depth = image
            .pixels()
            .zip(mask.values())
            .map(|([r, g, b, _], &alpha)| {
                if alpha == 0 {
                    return 0.0;
                }
                let brightness = (u32::from(r) + u32::from(g) + u32::from(b)) as f32 / 3.0;
                normalize(brightness / 255.0 * scale.get())
            })
            .collect();
        DepthField {
            width: image.width(),
            height: image.height(),
            depth,
        }
    }
}

/// Lower rows are closer, a crude ground-plane prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerticalGradient;

impl DepthEstimator for VerticalGradient {
    fn name(&self) -> &'static str {
        "vertical-gradient"
    }

    fn estimate(&self, image: &ImageBuffer, mask: &AlphaMask, scale: DepthScale) -> DepthField {
        let width = image.width() as usize;
        let rows = image.height().saturating_sub(1).max(1) as f32;
        let mask = matching_mask(image, mask);
        let depth = mask
            .values()
            .iter()
            .enumerate()
            .map(|(idx, &alpha)| {
                if alpha == 0 {
                    return 0.0;
                }
                let y = (idx / width) as f32;
                normalize(y / rows * scale.get())
            })
            .collect();
        DepthField {
            width: image.width(),
            height: image.height(),
            depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::foreground::{ChromaKey, ForegroundEstimator};

    #[test]
    fn depth_scale_clamps_and_sanitizes() {
        assert_eq!(DepthScale::new(1.7).get(), 1.0);
        assert_eq!(DepthScale::new(-0.2).get(), 0.0);
        assert_eq!(DepthScale::new(f32::NAN).get(), 0.0);
        assert_eq!(DepthScale::new(f32::INFINITY).get(), 0.0);
        assert_eq!(DepthScale::new(0.25).get(), 0.25);
    }

    #[test]
    fn luminance_scales_brightness() {
        let img = ImageBuffer::from_pixel(2, 2, [255, 255, 255, 255]).unwrap();
        let mask = AlphaMask::opaque(2, 2);
        let field = Luminance.estimate(&img, &mask, DepthScale::new(0.5));
        assert!(field.values().iter().all(|&d| (d - 0.5).abs() < 1e-6));
    }

    #[test]
    fn masked_pixels_are_far() {
        let img = ImageBuffer::from_pixel(4, 4, [0, 255, 0, 255]).unwrap();
        let mask = ChromaKey::default().estimate(&img);
        let field = Luminance.estimate(&img, &mask, DepthScale::MAX);
        assert!(field.values().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn vertical_gradient_runs_top_to_bottom() {
        let img = ImageBuffer::from_pixel(1, 3, [10, 10, 10, 255]).unwrap();
        let mask = AlphaMask::opaque(1, 3);
        let field = VerticalGradient.estimate(&img, &mask, DepthScale::MAX);
        assert_eq!(field.values(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn single_row_gradient_stays_in_range() {
        let img = ImageBuffer::from_pixel(3, 1, [10, 10, 10, 255]).unwrap();
        let mask = AlphaMask::opaque(3, 1);
        let field = VerticalGradient.estimate(&img, &mask, DepthScale::MAX);
        assert!(field.values().iter().all(|&d| d == 0.0));
    }

    #[test]
    fn mismatched_mask_counts_as_opaque() {
        let img = ImageBuffer::from_pixel(4, 4, [255, 255, 255, 255]).unwrap();
        let mask = AlphaMask::opaque(2, 2);
        for estimator in [&Luminance as &dyn DepthEstimator, &VerticalGradient] {
            let field = estimator.estimate(&img, &mask, DepthScale::MAX);
            assert_eq!(field.dimensions(), (4, 4), "{}", estimator.name());
            assert_eq!(field.values().len(), 16, "{}", estimator.name());
        }
        let field = Luminance.estimate(&img, &mask, DepthScale::MAX);
        assert!(field.values().iter().all(|&d| d == 1.0));
    }

    #[test]
    fn bilinear_interpolates_between_samples() {
        let field = DepthField::from_values(2, 1, vec![0.0, 1.0]).unwrap();
        assert!((field.sample_bilinear(0.5, 0.0) - 0.5).abs() < 1e-6);
        assert_eq!(field.sample_bilinear(-3.0, 0.0), 0.0);
        assert_eq!(field.sample_bilinear(9.0, 4.0), 1.0);
    }

    #[test]
    fn from_values_clamps_input() {
        let field = DepthField::from_values(3, 1, vec![-1.0, 2.0, f32::NAN]).unwrap();
        assert_eq!(field.values(), &[0.0, 1.0, 0.0]);
    }
}
