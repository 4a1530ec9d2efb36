//! Image → mask → depth → mesh, with the mask cached across depth changes.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::Result;
use crate::processing::depth::{DepthEstimator, DepthField, DepthScale};
use crate::processing::enhance::{EnhanceOptions, enhance};
use crate::processing::foreground::{AlphaMask, ForegroundEstimator};
use crate::processing::image_buffer::ImageBuffer;
use crate::processing::mesh::{GridResolution, Mesh, MeshOptions, synthesize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOptions {
    pub depth_scale: DepthScale,
    pub grid: GridResolution,
    pub mesh: MeshOptions,
    pub enhance: Option<EnhanceOptions>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            depth_scale: DepthScale::default(),
            grid: GridResolution::default(),
            mesh: MeshOptions::default(),
            enhance: None,
        }
    }
}

/// Segmentation output for the current image, reused while only depth or grid change.
struct Segmented {
    mask: AlphaMask,
    masked: Arc<ImageBuffer>,
}

pub struct SynthesisPipeline {
    foreground: Box<dyn ForegroundEstimator>,
    depth: Box<dyn DepthEstimator>,
    options: PipelineOptions,
    current: Option<Segmented>,
    last_depth: Option<DepthField>,
}

impl SynthesisPipeline {
    pub fn new(
        foreground: Box<dyn ForegroundEstimator>,
        depth: Box<dyn DepthEstimator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            foreground,
            depth,
            options,
            current: None,
            last_depth: None,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn mask(&self) -> Option<&AlphaMask> {
        self.current.as_ref().map(|seg| &seg.mask)
    }

    pub fn depth_field(&self) -> Option<&DepthField> {
        self.last_depth.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.current.is_some()
    }

    /// Segments a freshly submitted image and synthesizes its mesh.
    pub fn submit_image(&mut self, image: ImageBuffer) -> Result<Arc<Mesh>> {
        let started = Instant::now();
        let image = match &self.options.enhance {
            Some(opts) => enhance(&image, opts),
            None => image,
        };

        let mask = self.foreground.estimate(&image);
        let masked = Arc::new(image.with_alpha(mask.values())?);
        debug!(
            estimator = self.foreground.name(),
            width = mask.width(),
            height = mask.height(),
            background = mask.background_ratio(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "foreground estimated"
        );

        let segmented = Segmented { mask, masked };
        let (mesh, depth) = self.build_mesh(&segmented)?;
        self.current = Some(segmented);
        self.last_depth = Some(depth);
        Ok(mesh)
    }

    /// Re-runs depth and mesh synthesis. `None` when no image was submitted yet.
    pub fn set_depth_scale(&mut self, scale: f32) -> Result<Option<Arc<Mesh>>> {
        self.options.depth_scale = DepthScale::new(scale);
        self.rebuild_if_loaded()
    }

    pub fn set_grid_resolution(&mut self, columns: u32, rows: u32) -> Result<Option<Arc<Mesh>>> {
        self.options.grid = GridResolution::new(columns, rows)?;
        self.rebuild_if_loaded()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.last_depth = None;
    }

    fn rebuild_if_loaded(&mut self) -> Result<Option<Arc<Mesh>>> {
        let Some(segmented) = self.current.as_ref() else {
            return Ok(None);
        };
        let (mesh, depth) = self.build_mesh(segmented)?;
        self.last_depth = Some(depth);
        Ok(Some(mesh))
    }

    fn build_mesh(&self, seg: &Segmented) -> Result<(Arc<Mesh>, DepthField)> {
        let started = Instant::now();
        let depth = self
            .depth
            .estimate(&seg.masked, &seg.mask, self.options.depth_scale);
        debug!(
            estimator = self.depth.name(),
            scale = self.options.depth_scale.get(),
            max_depth = depth.max(),
            "depth estimated"
        );

        let mesh = synthesize(
            seg.masked.clone(),
            &depth,
            self.options.grid,
            &self.options.mesh,
        )?;
        info!(
            vertex_count = mesh.vertex_count(),
            triangle_count = mesh.triangle_count(),
            columns = self.options.grid.columns(),
            rows = self.options.grid.rows(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "mesh synthesized"
        );
        Ok((Arc::new(mesh), depth))
    }
}
