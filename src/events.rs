use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::processing::image_buffer::ImageBuffer;
use crate::processing::mesh::Mesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmersiveMode {
    Vr,
    PassthroughAr,
}

impl ImmersiveMode {
    pub fn viewer_mode(self) -> ViewerMode {
        match self {
            Self::Vr => ViewerMode::ImmersiveVr,
            Self::PassthroughAr => ViewerMode::ImmersivePassthroughAr,
        }
    }
}

impl fmt::Display for ImmersiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vr => "VR",
            Self::PassthroughAr => "passthrough AR",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerMode {
    Preview,
    ImmersiveVr,
    ImmersivePassthroughAr,
}

impl ViewerMode {
    pub fn immersive(self) -> Option<ImmersiveMode> {
        match self {
            Self::Preview => None,
            Self::ImmersiveVr => Some(ImmersiveMode::Vr),
            Self::ImmersivePassthroughAr => Some(ImmersiveMode::PassthroughAr),
        }
    }
}

impl fmt::Display for ViewerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preview => "preview",
            Self::ImmersiveVr => "immersive VR",
            Self::ImmersivePassthroughAr => "immersive passthrough AR",
        })
    }
}

/// Identifies one immersive-session request so late completions can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionTicket(pub u64);

impl fmt::Display for SessionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Native session handle handed out by the immersive backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub u64);

/// Counts viewer resets. Meshes built under an older epoch are discarded on arrival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelEpoch(pub u64);

impl ModelEpoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Negative,
    Positive,
}

impl Direction {
    pub fn sign(self) -> f32 {
        match self {
            Self::Negative => -1.0,
            Self::Positive => 1.0,
        }
    }
}

/// Everything that may mutate the viewer, serialized through one queue.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    Rotate(Direction),
    Zoom(Direction),
    TogglePassthrough,
    SetAutoRotate(bool),
    ToggleAutoRotate,
    Enter(ImmersiveMode),
    Exit,
    Reset,
    SessionGranted {
        ticket: SessionTicket,
        handle: SessionHandle,
    },
    SessionDenied {
        ticket: SessionTicket,
        reason: String,
    },
    SessionEndedByDevice(SessionHandle),
    InstallModel {
        mesh: Arc<Mesh>,
        epoch: ModelEpoch,
    },
}

/// Notifications for the host layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    SessionStarted {
        mode: ImmersiveMode,
    },
    SessionEnded,
    CapabilityUnsupported {
        mode: ImmersiveMode,
    },
    SessionRequestFailed {
        mode: ImmersiveMode,
        reason: String,
    },
    ModelReady {
        vertex_count: usize,
        triangle_count: usize,
    },
    /// The model was dropped; meshes from before `epoch` will be ignored.
    ModelCleared {
        epoch: ModelEpoch,
    },
    Rejected(Error),
}

/// Work items for the background synthesis task.
#[derive(Debug)]
pub enum PipelineRequest {
    SubmitImage(ImageBuffer),
    SetDepthScale(f32),
    SetGridResolution(u32, u32),
    /// Step the current depth scale by the given delta.
    NudgeDepthScale(f32),
    /// Multiply both grid dimensions by the given factor.
    ScaleGrid(f32),
    /// Forget the current image and tag later meshes with the given epoch.
    Reset(ModelEpoch),
}
