//! Shadow feature prefilter.
//!
//! Turns the two noisy shadow halves of a tile into a smooth feature image and
//! its variance, ready to guide the main denoiser:
//!
//! 1. divide the raw passes into per-half ratios and variance estimates,
//! 2. smooth the buffer variance, guided by the sample variance,
//! 3. filter each half with the other half as guide,
//! 4. combine the filtered halves,
//! 5. filter the combined mean against itself.

use serde::{Deserialize, Serialize};

use super::{FeatureBuffers, MAX_COMBINE_RADIUS, RecordReset, divide_shadow_rect};
use crate::config::{DispatchConfig, NlmParams, PassLayout};
use crate::error::{Error, Result};
use crate::nlm;
use crate::rect::Rect;
use crate::tiles::TileNeighborhood;

/// Parameters of the shadow prefilter stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowPrefilter {
    /// Stage 2: buffer variance smoothing.
    pub variance_params: NlmParams,
    /// Stage 3: cross filtering of the halves.
    pub half_params: NlmParams,
    /// Stage 5: final pass over the combined mean.
    pub final_params: NlmParams,
    /// Neighborhood radius of the robust variance in stage 4.
    pub combine_radius: u32,
}

impl Default for ShadowPrefilter {
    fn default() -> Self {
        Self {
            variance_params: NlmParams::variance_smoothing(),
            half_params: NlmParams::half_filter(),
            final_params: NlmParams::final_pass(),
            combine_radius: MAX_COMBINE_RADIUS,
        }
    }
}

/// Filtered shadow feature of a rect.
#[derive(Debug, Clone)]
pub struct ShadowFeature {
    pub rect: Rect,
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
    /// Collaborative record resets still to be applied to the center tile.
    pub resets: Vec<RecordReset>,
}

impl ShadowPrefilter {
    pub fn validate(&self) -> Result<()> {
        self.variance_params.validate()?;
        self.half_params.validate()?;
        self.final_params.validate()?;
        if self.combine_radius > MAX_COMBINE_RADIUS {
            return Err(Error::CombineRadiusTooLarge {
                radius: self.combine_radius,
                max: MAX_COMBINE_RADIUS,
            });
        }
        Ok(())
    }

    pub fn run(
        &self,
        sample: u32,
        tiles: &TileNeighborhood<'_>,
        layout: &PassLayout,
        rect: &Rect,
        collaborative: bool,
        dispatch: &DispatchConfig,
    ) -> Result<ShadowFeature> {
        self.validate()?;

        tracing::info!(
            ?rect,
            sample,
            collaborative,
            combine_radius = self.combine_radius,
            "Shadow prefilter"
        );

        let shadow = divide_shadow_rect(sample, tiles, layout, rect, collaborative, dispatch)?;
        let len = rect.dense_len();

        let mut smoothed_variance = vec![0.0f32; len];
        nlm::filter(
            &shadow.buffer_variance,
            &shadow.sample_variance,
            &shadow.sample_variance_v,
            &mut smoothed_variance,
            rect,
            &self.variance_params,
            dispatch,
        )?;

        let (half_a, half_b) = (shadow.unfiltered_a(), shadow.unfiltered_b());
        let mut filtered_a = vec![0.0f32; len];
        let mut filtered_b = vec![0.0f32; len];
        nlm::filter(
            half_a,
            half_b,
            &smoothed_variance,
            &mut filtered_a,
            rect,
            &self.half_params,
            dispatch,
        )?;
        nlm::filter(
            half_b,
            half_a,
            &smoothed_variance,
            &mut filtered_b,
            rect,
            &self.half_params,
            dispatch,
        )?;

        let combined =
            FeatureBuffers::combine(&filtered_a, &filtered_b, rect, self.combine_radius)?;

        let mut mean = vec![0.0f32; len];
        nlm::filter(
            &combined.mean,
            &combined.mean,
            &combined.variance,
            &mut mean,
            rect,
            &self.final_params,
            dispatch,
        )?;

        tracing::debug!(?rect, resets = shadow.resets.len(), "Shadow prefilter done");

        Ok(ShadowFeature {
            rect: *rect,
            mean,
            variance: combined.variance,
            resets: shadow.resets,
        })
    }
}
