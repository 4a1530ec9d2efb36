pub mod depth;
pub mod enhance;
pub mod foreground;
pub mod image_buffer;
pub mod mesh;
pub mod pipeline;
