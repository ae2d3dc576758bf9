//! Error types for denoising passes.
//!
//! Every variant is a caller contract violation detected before any pixel is
//! touched. The per-pixel kernels themselves never fail.

use thiserror::Error;

use crate::rect::Rect;

/// Errors returned by the whole-rect drivers and configuration validation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Empty rect {rect:?}: width and height must be positive")]
    EmptyRect { rect: Rect },

    #[error("Sample count {0} is too small, variance estimates need at least 2 samples")]
    TooFewSamples(u32),

    #[error("Combine radius {radius} exceeds the supported maximum of {max}")]
    CombineRadiusTooLarge { radius: u32, max: u32 },

    #[error("Buffer '{name}' holds {len} values but {required} are required")]
    BufferTooSmall {
        name: &'static str,
        len: usize,
        required: usize,
    },

    #[error("Tile {index} overlaps rect {rect:?} but has no buffer")]
    MissingTile { index: usize, rect: Rect },

    #[error("Tile {index} buffer holds {len} values but rect {rect:?} reads index {required}")]
    TileTooSmall {
        index: usize,
        rect: Rect,
        len: usize,
        required: i64,
    },

    #[error("Tile boundaries must be non-decreasing, got x {tile_x:?} y {tile_y:?}")]
    InvalidTileBounds { tile_x: [i32; 4], tile_y: [i32; 4] },

    #[error("Invalid dispatch group {width}x{height} with {lanes} lanes")]
    InvalidGroupSize { width: u32, height: u32, lanes: u32 },

    #[error("Invalid parameter {name} = {value}")]
    InvalidParameter { name: &'static str, value: f32 },

    #[error("Failed to parse denoise config: {0}")]
    Config(#[from] serde_yml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
