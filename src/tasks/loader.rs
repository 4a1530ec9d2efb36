use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use tracing::debug;

use crate::processing::image_buffer::ImageBuffer;

/// Decodes a photo to RGBA8, applies its EXIF orientation and, when
/// `max_dimension` is set, shrinks it so the longer edge fits.
pub fn load_image(path: &Path, max_dimension: Option<u32>) -> Result<ImageBuffer> {
    let mut img = decode_rgba8_apply_exif(path)
        .with_context(|| format!("failed to decode {}", path.display()))?;

    if let Some(max) = max_dimension {
        let (w, h) = img.dimensions();
        let (nw, nh) = fit_within(w, h, max);
        if (nw, nh) != (w, h) {
            debug!(from_w = w, from_h = h, to_w = nw, to_h = nh, "downscaling photo");
            img = imageops::resize(&img, nw, nh, FilterType::Triangle);
        }
    }

    ImageBuffer::try_from(img).with_context(|| format!("decoded {} has no pixels", path.display()))
}

/// Largest size with the same aspect whose longer edge is at most `max`.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let longest = width.max(height);
    if max == 0 || longest <= max {
        return (width, height);
    }
    let scale = max as f64 / longest as f64;
    let shrink = |n: u32| ((n as f64 * scale).round() as u32).max(1);
    (shrink(width), shrink(height))
}

fn decode_rgba8_apply_exif(path: &Path) -> Result<image::RgbaImage> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?
        .to_rgba8();

    let orientation = read_orientation(path).unwrap_or(1);
    Ok(apply_orientation(img, orientation))
}

/// Maps the eight EXIF orientations onto flips and quarter turns.
pub fn apply_orientation(img: image::RgbaImage, orientation: u16) -> image::RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let o = field.value.get_uint(0)? as u16;
    debug!(orientation = o, path = %path.display(), "exif orientation");
    Some(o)
}
