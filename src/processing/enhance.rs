use serde::Deserialize;

use crate::processing::image_buffer::ImageBuffer;

/// Photo touch-up applied before segmentation, mirroring a CSS
/// `contrast() brightness() saturate()` filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EnhanceOptions {
    pub contrast: f32,
    pub brightness: f32,
    pub saturation: f32,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            contrast: 1.1,
            brightness: 1.05,
            saturation: 1.2,
        }
    }
}

impl EnhanceOptions {
    pub fn is_identity(&self) -> bool {
        (self.contrast - 1.0).abs() < f32::EPSILON
            && (self.brightness - 1.0).abs() < f32::EPSILON
            && (self.saturation - 1.0).abs() < f32::EPSILON
    }
}

/// Returns an enhanced copy; alpha is left untouched.
pub fn enhance(image: &ImageBuffer, options: &EnhanceOptions) -> ImageBuffer {
    if options.is_identity() {
        return image.clone();
    }
    let contrast = options.contrast.max(0.0);
    let brightness = options.brightness.max(0.0);
    let saturation = options.saturation.max(0.0);

    let mut pixels = Vec::with_capacity(image.as_raw().len());
    for [r, g, b, a] in image.pixels() {
        let mut rgb = [r, g, b].map(|c| f32::from(c) / 255.0);
        for c in &mut rgb {
            *c = ((*c - 0.5) * contrast + 0.5) * brightness;
        }
        let luma = 0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2];
        for c in &mut rgb {
            *c = luma + (*c - luma) * saturation;
        }
        let [r, g, b] = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        pixels.extend_from_slice(&[r, g, b, a]);
    }

    ImageBuffer::from_raw(pixels, image.width(), image.height())
        .unwrap_or_else(|_| image.clone())
}
