//! Depth-displaced grid meshes.
//!
//! A photo becomes a plane centered on the origin (+y up, +z toward the
//! viewer) whose vertices are pushed forward by the sampled depth. Triangles
//! wind counter-clockwise when seen from +z.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::processing::depth::DepthField;
use crate::processing::image_buffer::ImageBuffer;

/// Number of grid cells along each axis; both are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridResolution {
    columns: u32,
    rows: u32,
}

impl GridResolution {
    pub const MAX_CELLS_PER_AXIS: u32 = 1024;

    pub fn new(columns: u32, rows: u32) -> Result<Self> {
        if columns == 0 || rows == 0 {
            return Err(Error::InvalidDimensions(format!(
                "grid resolution must be non-zero, got {columns}x{rows}"
            )));
        }
        if columns > Self::MAX_CELLS_PER_AXIS || rows > Self::MAX_CELLS_PER_AXIS {
            return Err(Error::InvalidDimensions(format!(
                "grid resolution {columns}x{rows} exceeds {max} cells per axis",
                max = Self::MAX_CELLS_PER_AXIS
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(self) -> u32 {
        self.columns
    }

    pub fn rows(self) -> u32 {
        self.rows
    }

    pub fn vertex_count(self) -> usize {
        (self.columns as usize + 1) * (self.rows as usize + 1)
    }

    pub fn triangle_count(self) -> usize {
        2 * self.columns as usize * self.rows as usize
    }

    /// Scales both axes, keeping each within `1..=MAX_CELLS_PER_AXIS`.
    pub fn scaled(self, factor: f32) -> Self {
        let scale = |n: u32| {
            let scaled = (n as f32 * factor).round();
            if scaled.is_finite() {
                (scaled as u32).clamp(1, Self::MAX_CELLS_PER_AXIS)
            } else {
                n
            }
        };
        Self {
            columns: scale(self.columns),
            rows: scale(self.rows),
        }
    }
}

impl Default for GridResolution {
    fn default() -> Self {
        Self {
            columns: 32,
            rows: 32,
        }
    }
}

/// World-space placement of the synthesized plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    /// Plane width in world units; height follows the photo's aspect ratio.
    pub plane_width: f32,
    /// World-space z offset of a depth sample equal to 1.
    pub depth_extent: f32,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            plane_width: 3.0,
            depth_extent: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    vertices: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
    texture: Arc<ImageBuffer>,
}

impl Mesh {
    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn uvs(&self) -> &[[f32; 2]] {
        &self.uvs
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    pub fn texture(&self) -> &Arc<ImageBuffer> {
        &self.texture
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Axis-aligned bounds as `(min, max)`.
    pub fn bounds(&self) -> ([f32; 3], [f32; 3]) {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for v in &self.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        (min, max)
    }
}

impl PartialEq for Mesh {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices
            && self.uvs == other.uvs
            && self.indices == other.indices
            && Arc::ptr_eq(&self.texture, &other.texture)
    }
}

/// Builds a displaced grid mesh textured with `image`.
pub fn synthesize(
    image: Arc<ImageBuffer>,
    depth: &DepthField,
    grid: GridResolution,
    options: &MeshOptions,
) -> Result<Mesh> {
    if depth.dimensions() != image.dimensions() {
        let (dw, dh) = depth.dimensions();
        let (iw, ih) = image.dimensions();
        return Err(Error::InvalidDimensions(format!(
            "depth field is {dw}x{dh} but image is {iw}x{ih}"
        )));
    }
    if depth.values().len() != image.pixel_count() {
        return Err(Error::InvalidDimensions(format!(
            "depth field holds {} samples for {} pixels",
            depth.values().len(),
            image.pixel_count()
        )));
    }

    let cols = grid.columns();
    let rows = grid.rows();
    let plane_w = options.plane_width;
    let plane_h = plane_w * image.height() as f32 / image.width() as f32;
    let max_px = (image.width() - 1) as f32;
    let max_py = (image.height() - 1) as f32;

    let mut vertices = Vec::with_capacity(grid.vertex_count());
    let mut uvs = Vec::with_capacity(grid.vertex_count());
    for j in 0..=rows {
        let v = j as f32 / rows as f32;
        for i in 0..=cols {
            let u = i as f32 / cols as f32;
            let d = depth.sample_bilinear(u * max_px, v * max_py);
            vertices.push([
                (u - 0.5) * plane_w,
                (0.5 - v) * plane_h,
                d * options.depth_extent,
            ]);
            uvs.push([u, v]);
        }
    }

    let stride = cols + 1;
    let mut indices = Vec::with_capacity(grid.triangle_count() * 3);
    for j in 0..rows {
        for i in 0..cols {
            let top_left = j * stride + i;
            let top_right = top_left + 1;
            let bottom_left = top_left + stride;
            let bottom_right = bottom_left + 1;

            indices.extend_from_slice(&[top_left, bottom_left, top_right]);
            indices.extend_from_slice(&[top_right, bottom_left, bottom_right]);
        }
    }

    Ok(Mesh {
        vertices,
        uvs,
        indices,
        texture: image,
    })
}

/// Twice the signed area of a triangle's projection on the xy plane.
pub fn signed_area_xy(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

/// Twice the signed area of a triangle in UV space.
pub fn signed_area_uv(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: u32, height: u32) -> (Arc<ImageBuffer>, DepthField) {
        let image = Arc::new(ImageBuffer::from_pixel(width, height, [90, 90, 90, 255]).unwrap());
        let depth = DepthField::from_values(
            width,
            height,
            vec![0.0; width as usize * height as usize],
        )
        .unwrap();
        (image, depth)
    }

    #[test]
    fn zero_grid_is_rejected() {
        assert!(GridResolution::new(0, 4).is_err());
        assert!(GridResolution::new(4, 0).is_err());
    }

    #[test]
    fn oversized_grid_is_rejected() {
        let max = GridResolution::MAX_CELLS_PER_AXIS;
        assert!(GridResolution::new(max, max).is_ok());
        for (columns, rows) in [(max + 1, 1), (1, max + 1), (u32::MAX, 1), (65536, 65535)] {
            let err = GridResolution::new(columns, rows).unwrap_err();
            assert!(matches!(err, Error::InvalidDimensions(_)), "{columns}x{rows}");
        }
        let largest = GridResolution::new(max, max).unwrap();
        assert!(largest.vertex_count() <= u32::MAX as usize);
    }

    #[test]
    fn counts_follow_grid() {
        let (image, depth) = flat(10, 20);
        let grid = GridResolution::new(3, 5).unwrap();
        let mesh = synthesize(image, &depth, grid, &MeshOptions::default()).unwrap();
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 30);
        assert_eq!(mesh.uvs().len(), mesh.vertex_count());
        assert!(mesh.indices().iter().all(|&i| (i as usize) < mesh.vertex_count()));
    }

    #[test]
    fn front_faces_point_at_viewer() {
        let (image, depth) = flat(4, 4);
        let grid = GridResolution::new(4, 4).unwrap();
        let mesh = synthesize(image, &depth, grid, &MeshOptions::default()).unwrap();
        for [a, b, c] in mesh.triangles() {
            let v = mesh.vertices();
            let area = signed_area_xy(v[a as usize], v[b as usize], v[c as usize]);
            assert!(area > 0.0, "triangle {a},{b},{c} winds clockwise");
        }
    }

    #[test]
    fn plane_keeps_photo_aspect() {
        let (image, depth) = flat(100, 200);
        let options = MeshOptions {
            plane_width: 2.0,
            depth_extent: 1.0,
        };
        let mesh = synthesize(image, &depth, GridResolution::new(2, 2).unwrap(), &options).unwrap();
        let (min, max) = mesh.bounds();
        assert!((max[0] - min[0] - 2.0).abs() < 1e-5);
        assert!((max[1] - min[1] - 4.0).abs() < 1e-5);
        assert!((min[0] + max[0]).abs() < 1e-5);
    }

    #[test]
    fn depth_displaces_along_z() {
        let image = Arc::new(ImageBuffer::from_pixel(2, 1, [0, 0, 0, 255]).unwrap());
        let depth = DepthField::from_values(2, 1, vec![0.0, 1.0]).unwrap();
        let options = MeshOptions {
            plane_width: 1.0,
            depth_extent: 0.5,
        };
        let mesh = synthesize(image, &depth, GridResolution::new(2, 1).unwrap(), &options).unwrap();
        let z: Vec<f32> = mesh.vertices()[..3].iter().map(|v| v[2]).collect();
        assert_eq!(z, vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn texture_is_shared_not_copied() {
        let (image, depth) = flat(3, 3);
        let mesh = synthesize(
            image.clone(),
            &depth,
            GridResolution::default(),
            &MeshOptions::default(),
        )
        .unwrap();
        assert!(Arc::ptr_eq(mesh.texture(), &image));
    }

    #[test]
    fn mismatched_depth_is_rejected() {
        let (image, _) = flat(3, 3);
        let (_, depth) = flat(4, 3);
        let err = synthesize(image, &depth, GridResolution::default(), &MeshOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions(_)));
    }

    #[test]
    fn scaled_grid_stays_in_bounds() {
        let grid = GridResolution::new(2, 700).unwrap();
        assert_eq!(grid.scaled(0.1), GridResolution::new(1, 70).unwrap());
        assert_eq!(grid.scaled(2.0).rows(), GridResolution::MAX_CELLS_PER_AXIS);
    }
}
