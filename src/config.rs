use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::processing::depth::{DepthEstimator, DepthScale, Luminance, VerticalGradient};
use crate::processing::enhance::EnhanceOptions;
use crate::processing::foreground::{AlphaChannel, ChromaKey, ForegroundEstimator, Opaque};
use crate::processing::mesh::{GridResolution, MeshOptions};
use crate::processing::pipeline::PipelineOptions;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Segmentation, depth and mesh synthesis settings.
    pub pipeline: PipelineConfig,
    /// Camera, motion and background settings for the viewer.
    pub viewer: ViewerConfig,
    /// Declared device capabilities and simulated session behaviour.
    pub immersive: ImmersiveConfig,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        self.pipeline.validate().context("invalid pipeline section")?;
        self.viewer.validate().context("invalid viewer section")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ForegroundConfig {
    ChromaKey {
        #[serde(default = "ForegroundConfig::default_green_ratio", rename = "green-ratio")]
        green_ratio: f32,
    },
    AlphaChannel {
        #[serde(default = "ForegroundConfig::default_threshold")]
        threshold: u8,
    },
    Opaque,
}

impl Default for ForegroundConfig {
    fn default() -> Self {
        Self::ChromaKey {
            green_ratio: Self::default_green_ratio(),
        }
    }
}

impl ForegroundConfig {
    const fn default_green_ratio() -> f32 {
        1.2
    }

    const fn default_threshold() -> u8 {
        128
    }

    pub fn build(&self) -> Box<dyn ForegroundEstimator> {
        match *self {
            Self::ChromaKey { green_ratio } => Box::new(ChromaKey { green_ratio }),
            Self::AlphaChannel { threshold } => Box::new(AlphaChannel { threshold }),
            Self::Opaque => Box::new(Opaque),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DepthConfig {
    #[default]
    Luminance,
    VerticalGradient,
}

impl DepthConfig {
    pub fn build(&self) -> Box<dyn DepthEstimator> {
        match self {
            Self::Luminance => Box::new(Luminance),
            Self::VerticalGradient => Box::new(VerticalGradient),
        }
    }
}

/// Texture edge every wgpu adapter supports under default limits.
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineConfig {
    pub foreground: ForegroundConfig,
    pub depth: DepthConfig,
    /// Multiplier applied to estimated depth, in `[0, 1]`.
    pub depth_scale: f32,
    /// Grid cells as `[columns, rows]`.
    pub grid_resolution: [u32; 2],
    /// Width of the synthesized plane in world units.
    pub plane_width: f32,
    /// World-space displacement of the nearest depth sample.
    pub depth_extent: f32,
    /// Longest image edge fed to the pipeline; larger photos are downscaled on load.
    pub max_input_dimension: Option<u32>,
    /// Optional colour touch-up before segmentation.
    pub enhance: Option<EnhanceOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            foreground: ForegroundConfig::default(),
            depth: DepthConfig::default(),
            depth_scale: 0.5,
            grid_resolution: [32, 32],
            plane_width: 3.0,
            depth_extent: 0.5,
            max_input_dimension: Some(2048),
            enhance: None,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.depth_scale),
            "depth-scale must lie within [0, 1]"
        );
        ensure!(
            self.grid_resolution[0] > 0 && self.grid_resolution[1] > 0,
            "grid-resolution must be non-zero in both dimensions"
        );
        ensure!(
            self.grid_resolution
                .iter()
                .all(|&n| n <= GridResolution::MAX_CELLS_PER_AXIS),
            "grid-resolution must not exceed {} cells per axis",
            GridResolution::MAX_CELLS_PER_AXIS
        );
        ensure!(
            self.plane_width.is_finite() && self.plane_width > 0.0,
            "plane-width must be positive"
        );
        ensure!(
            self.depth_extent.is_finite() && self.depth_extent >= 0.0,
            "depth-extent must not be negative"
        );
        if let Some(max) = self.max_input_dimension {
            ensure!(
                (1..=MAX_TEXTURE_DIMENSION).contains(&max),
                "max-input-dimension must lie within 1..={MAX_TEXTURE_DIMENSION}"
            );
        }
        if let ForegroundConfig::ChromaKey { green_ratio } = self.foreground {
            ensure!(
                green_ratio.is_finite() && green_ratio >= 1.0,
                "foreground.green-ratio must be at least 1.0"
            );
        }
        Ok(())
    }

    pub fn options(&self) -> Result<PipelineOptions> {
        let [columns, rows] = self.grid_resolution;
        Ok(PipelineOptions {
            depth_scale: DepthScale::new(self.depth_scale),
            grid: GridResolution::new(columns, rows)?,
            mesh: MeshOptions {
                plane_width: self.plane_width,
                depth_extent: self.depth_extent,
            },
            enhance: self.enhance,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelMotion {
    #[default]
    #[serde(alias = "none")]
    Still,
    /// Slow, shallow sway.
    Gentle,
    Bounce,
    Float,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ViewerConfig {
    /// Vertical field of view.
    pub fov_degrees: f32,
    /// Near render plane; also the closest the camera may zoom.
    pub near: f32,
    /// Far render plane; also the farthest the camera may zoom.
    pub far: f32,
    pub initial_distance: f32,
    /// Camera distance change per zoom step.
    pub zoom_step: f32,
    /// Orbit change per rotate step.
    pub rotate_step_degrees: f32,
    pub auto_rotate: bool,
    /// Orbit speed while auto-rotating, in radians per second.
    pub auto_rotate_speed: f32,
    pub model_scale: f32,
    pub motion: ModelMotion,
    /// Clear colour when the background is opaque.
    pub background_color: [u8; 3],
    pub start_in_passthrough: bool,
    /// Render back faces too (the photo reads mirrored from behind).
    pub double_sided: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            initial_distance: 5.0,
            zoom_step: 0.5,
            rotate_step_degrees: 22.5,
            auto_rotate: true,
            auto_rotate_speed: 0.3,
            model_scale: 1.0,
            motion: ModelMotion::default(),
            background_color: [0x1a, 0x1a, 0x2e],
            start_in_passthrough: false,
            double_sided: true,
        }
    }
}

impl ViewerConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.fov_degrees > 0.0 && self.fov_degrees < 180.0,
            "fov-degrees must lie within (0, 180)"
        );
        ensure!(self.near > 0.0, "near must be positive");
        ensure!(self.far > self.near, "far must exceed near");
        ensure!(
            (self.near..=self.far).contains(&self.initial_distance),
            "initial-distance must lie within [near, far]"
        );
        ensure!(self.zoom_step > 0.0, "zoom-step must be positive");
        ensure!(
            self.rotate_step_degrees.is_finite(),
            "rotate-step-degrees must be finite"
        );
        ensure!(
            self.auto_rotate_speed.is_finite() && self.auto_rotate_speed >= 0.0,
            "auto-rotate-speed must not be negative"
        );
        ensure!(
            (0.5..=2.0).contains(&self.model_scale),
            "model-scale must lie within [0.5, 2.0]"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ImmersiveConfig {
    pub vr_supported: bool,
    pub ar_supported: bool,
    /// How long the device takes to answer a session request.
    #[serde(with = "humantime_serde")]
    pub grant_delay: Duration,
    /// Refuse every session request, as a device without permission would.
    pub deny_requests: bool,
    /// End granted sessions from the device side after this long.
    #[serde(with = "humantime_serde")]
    pub device_session_limit: Option<Duration>,
}

impl Default for ImmersiveConfig {
    fn default() -> Self {
        Self {
            vr_supported: true,
            ar_supported: false,
            grant_delay: Duration::from_millis(300),
            deny_requests: false,
            device_session_limit: None,
        }
    }
}
