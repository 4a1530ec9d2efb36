//! Turns a photo into a depth-displaced, textured mesh and shows it in a
//! viewer that can hand off to immersive VR or passthrough AR sessions.

pub mod capability;
pub mod config;
pub mod error;
pub mod events;
pub mod processing;
pub mod tasks {
    pub mod loader;
    pub mod pipeline;
    pub mod viewer;
}
