//! Umbra - non-local-means denoising core for path-traced render buffers.
//!
//! The renderer accumulates its passes in per-tile sample buffers. This crate
//! turns those raw sums into dense feature images, estimates their variance, and
//! filters them with variance-normalized non-local means:
//!
//! - [`prefilter`]: per-pixel statistics (shadow halves, single features) and
//!   the merge of two filtered halves
//! - [`nlm`]: single- and three-channel NLM with SIMD patch distances
//! - [`work_pool`]: work-stealing distribution of (pixel, sample) items over
//!   dispatch groups, driven by [`dispatch::Dispatcher`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use umbra::{DenoiseConfig, Rect, TileBuffer, TileNeighborhood};
//!
//! let config = DenoiseConfig::from_yaml("samples: 64\n")?;
//! let tiles = TileNeighborhood::single(TileBuffer::for_tile(&buffer, 0, 0, width), bounds);
//! let feature = umbra::denoise_shadow(&config, &tiles, bounds)?;
//! ```

mod config;
pub mod dispatch;
mod error;
pub mod nlm;
pub mod prefilter;
mod rect;
pub mod tiles;
pub mod work_pool;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "bench")]
pub mod bench {
    pub use crate::nlm::bench as nlm;
}

pub use config::{
    DenoiseConfig, DispatchConfig, HalfPasses, MAX_NLM_RADIUS, NlmParams, PackedLayout,
    PassLayout, RESET_CHANNELS, ShadowPasses,
};
pub use error::{Error, Result};
pub use prefilter::shadow::{ShadowFeature, ShadowPrefilter};
pub use prefilter::{FeatureBuffers, RecordReset, ShadowBuffers};
pub use rect::{DENSE_ALIGN, Rect, align_up};
pub use tiles::{CENTER_TILE, TileBuffer, TileNeighborhood};

/// Run the shadow prefilter over `rect` with the settings of `config`.
pub fn denoise_shadow(
    config: &DenoiseConfig,
    tiles: &TileNeighborhood<'_>,
    rect: Rect,
) -> Result<ShadowFeature> {
    config.validate()?;
    tracing::info!(
        ?rect,
        samples = config.samples,
        collaborative = config.collaborative,
        "Denoising shadow feature"
    );
    config.prefilter.run(
        config.samples,
        tiles,
        &config.layout,
        &rect,
        config.collaborative,
        &config.dispatch,
    )
}
