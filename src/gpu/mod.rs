//! GPU-side rendering: glyph atlases, pipelines, and the frame renderer.

pub mod atlas;
pub mod pipeline;
pub mod renderer;

pub use atlas::{GlyphSprite, TextureAtlas};
pub use renderer::{Gpu, Renderer};
