//! Denoising configuration.
//!
//! Plain structs with public fields, presets and explicit validation. Everything
//! derives serde so a renderer can keep its denoise settings next to the rest of
//! its scene settings; [`DenoiseConfig::from_yaml`] parses a partial document and
//! fills the rest from defaults.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::prefilter::shadow::ShadowPrefilter;

/// Largest accepted search or patch radius.
pub const MAX_NLM_RADIUS: u32 = 64;

/// Parameters of one non-local-means pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NlmParams {
    /// Half-width `r` of the square search window around each pixel.
    pub search_radius: u32,
    /// Half-size `f` of the compared patches.
    pub patch_radius: u32,
    /// Noise compensation factor `a`; generally 1.
    pub a: f32,
    /// Squared strength `k^2`; larger values give smoother results.
    pub k_2: f32,
}

impl Default for NlmParams {
    fn default() -> Self {
        Self::half_filter()
    }
}

impl NlmParams {
    pub fn new(search_radius: u32, patch_radius: u32, a: f32, k_2: f32) -> Self {
        Self {
            search_radius,
            patch_radius,
            a,
            k_2,
        }
    }

    /// Preset: smoothing the buffer variance with sample-variance weights.
    pub fn variance_smoothing() -> Self {
        Self::new(6, 3, 4.0, 1.0)
    }

    /// Preset: filtering one half image with weights from the other half.
    pub fn half_filter() -> Self {
        Self::new(5, 3, 1.0, 0.25)
    }

    /// Preset: last pass over the combined feature.
    pub fn final_pass() -> Self {
        Self::new(5, 3, 4.0, 1.0)
    }

    /// Radii are capped at [`MAX_NLM_RADIUS`]. `a` must be a non-negative finite
    /// value so the self-comparison of every pixel keeps weight 1, `k_2` must be
    /// non-negative and finite.
    pub fn validate(&self) -> Result<()> {
        for (name, radius) in [
            ("search_radius", self.search_radius),
            ("patch_radius", self.patch_radius),
        ] {
            if radius > MAX_NLM_RADIUS {
                return Err(Error::InvalidParameter {
                    name,
                    value: radius as f32,
                });
            }
        }
        if !self.a.is_finite() || self.a < 0.0 {
            return Err(Error::InvalidParameter {
                name: "a",
                value: self.a,
            });
        }
        if !self.k_2.is_finite() || self.k_2 < 0.0 {
            return Err(Error::InvalidParameter {
                name: "k_2",
                value: self.k_2,
            });
        }
        Ok(())
    }
}

/// Channel offsets of one shadow half, relative to the denoising pass block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfPasses {
    pub denominator: usize,
    pub numerator: usize,
    pub variance: usize,
}

impl HalfPasses {
    fn max_offset(&self) -> usize {
        self.denominator.max(self.numerator).max(self.variance)
    }
}

/// Shadow feature channels of both sample halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowPasses {
    pub a: HalfPasses,
    pub b: HalfPasses,
}

impl Default for ShadowPasses {
    fn default() -> Self {
        Self {
            a: HalfPasses {
                denominator: 14,
                numerator: 15,
                variance: 16,
            },
            b: HalfPasses {
                denominator: 17,
                numerator: 18,
                variance: 19,
            },
        }
    }
}

impl ShadowPasses {
    pub fn max_offset(&self) -> usize {
        self.a.max_offset().max(self.b.max_offset())
    }
}

/// Layout of one pixel record in the renderer's sample buffers.
///
/// Pixel `(x, y)` of a tile starts at float `(offset + y * stride + x) * pass_stride`;
/// the denoising channels begin `denoising_offset` floats into the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassLayout {
    /// Floats per pixel record.
    pub pass_stride: usize,
    /// Start of the denoising channel block within a record.
    pub denoising_offset: usize,
    /// Frames stored per half in the unfiltered shadow buffer.
    pub num_frames: usize,
    pub shadow: ShadowPasses,
}

impl Default for PassLayout {
    fn default() -> Self {
        Self {
            pass_stride: 24,
            denoising_offset: 4,
            num_frames: 1,
            shadow: ShadowPasses::default(),
        }
    }
}

/// Floats at the start of each record zeroed by a collaborative reset.
pub const RESET_CHANNELS: usize = 4;

impl PassLayout {
    /// Highest record-relative channel any shadow read touches.
    pub fn max_shadow_channel(&self) -> usize {
        self.denoising_offset + self.shadow.max_offset()
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_frames == 0 {
            return Err(Error::InvalidParameter {
                name: "num_frames",
                value: 0.0,
            });
        }
        if self.pass_stride < RESET_CHANNELS || self.max_shadow_channel() >= self.pass_stride {
            return Err(Error::InvalidParameter {
                name: "pass_stride",
                value: self.pass_stride as f32,
            });
        }
        Ok(())
    }
}

/// Planar layout of a packed denoise buffer read by `nlm_weight`.
///
/// Each pass is a dense plane of `pass_stride` floats indexed like the working
/// rect; three consecutive color planes start at `color_offset`, their variances
/// at `variance_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedLayout {
    pub pass_stride: usize,
    pub color_offset: usize,
    pub variance_offset: usize,
}

impl PackedLayout {
    /// Color in planes 0..3, variance in planes 3..6.
    pub fn new(pass_stride: usize) -> Self {
        Self {
            pass_stride,
            color_offset: 0,
            variance_offset: 3,
        }
    }

    #[inline]
    pub fn color(&self, channel: usize, idx: usize) -> usize {
        (self.color_offset + channel) * self.pass_stride + idx
    }

    #[inline]
    pub fn variance(&self, channel: usize, idx: usize) -> usize {
        (self.variance_offset + channel) * self.pass_stride + idx
    }

    /// Floats a buffer must hold.
    pub fn required_len(&self) -> usize {
        (self.color_offset.max(self.variance_offset) + 3) * self.pass_stride
    }
}

/// Shape of the work-stealing dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pixel width of one dispatch group.
    pub group_width: u32,
    /// Pixel height of one dispatch group.
    pub group_height: u32,
    /// Parallel lanes claiming work from each group's counter.
    pub lanes_per_group: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            group_width: 8,
            group_height: 8,
            lanes_per_group: 4,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.group_width == 0 || self.group_height == 0 || self.lanes_per_group == 0 {
            return Err(Error::InvalidGroupSize {
                width: self.group_width,
                height: self.group_height,
                lanes: self.lanes_per_group,
            });
        }
        Ok(())
    }
}

/// Everything one shadow denoising pass over a tile needs.
///
/// # Examples
///
/// ```ignore
/// let config = DenoiseConfig::from_yaml("samples: 64\ncollaborative: true\n")?;
/// let feature = umbra::denoise_shadow(&config, &tiles, rect)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseConfig {
    /// Samples accumulated in the render buffers.
    pub samples: u32,
    /// Emit a record reset for every center-tile pixel.
    pub collaborative: bool,
    pub layout: PassLayout,
    pub prefilter: ShadowPrefilter,
    pub dispatch: DispatchConfig,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            samples: 16,
            collaborative: false,
            layout: PassLayout::default(),
            prefilter: ShadowPrefilter::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl DenoiseConfig {
    /// Parse a (possibly partial) YAML document; missing fields take defaults.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: DenoiseConfig = serde_yml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples < 2 {
            return Err(Error::TooFewSamples(self.samples));
        }
        self.layout.validate()?;
        self.prefilter.validate()?;
        self.dispatch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_nlm_params() {
        let params = NlmParams::default();
        assert_eq!(params.search_radius, 5);
        assert_eq!(params.patch_radius, 3);
        assert!((params.a - 1.0).abs() < f32::EPSILON);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_nlm_params_reject_negative_a() {
        let params = NlmParams {
            a: -0.5,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter { name: "a", .. })
        ));
    }

    #[test]
    fn test_nlm_params_reject_nan_k2() {
        let params = NlmParams {
            k_2: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter { name: "k_2", .. })
        ));
    }

    #[test]
    fn test_nlm_params_reject_oversized_radius() {
        let params = NlmParams::new(u32::MAX, 1, 1.0, 1.0);
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter {
                name: "search_radius",
                ..
            })
        ));

        let params = NlmParams::new(5, MAX_NLM_RADIUS + 1, 1.0, 1.0);
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter {
                name: "patch_radius",
                ..
            })
        ));
        assert!(NlmParams::new(MAX_NLM_RADIUS, MAX_NLM_RADIUS, 1.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_denoise_config_rejects_oversized_radius() {
        let err = DenoiseConfig::from_yaml(
            "prefilter:\n  half_params:\n    search_radius: 4294967295\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidParameter {
                name: "search_radius",
                ..
            }
        ));
    }

    #[test]
    fn test_default_layout_is_valid() {
        let layout = PassLayout::default();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.max_shadow_channel(), 23);
    }

    #[test]
    fn test_layout_rejects_short_records() {
        let layout = PassLayout {
            pass_stride: 20,
            ..Default::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_layout_rejects_zero_frames() {
        let layout = PassLayout {
            num_frames: 0,
            ..Default::default()
        };
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_packed_layout_indices() {
        let layout = PackedLayout::new(100);
        assert_eq!(layout.color(0, 7), 7);
        assert_eq!(layout.color(2, 7), 207);
        assert_eq!(layout.variance(1, 7), 407);
        assert_eq!(layout.required_len(), 600);
    }

    #[test]
    fn test_dispatch_rejects_zero_group() {
        let config = DispatchConfig {
            group_width: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidGroupSize { width: 0, .. })
        ));
    }

    #[test]
    fn test_denoise_config_from_partial_yaml() {
        let config = DenoiseConfig::from_yaml(
            "samples: 64\ncollaborative: true\ndispatch:\n  group_width: 16\n",
        )
        .unwrap();
        assert_eq!(config.samples, 64);
        assert!(config.collaborative);
        assert_eq!(config.dispatch.group_width, 16);
        assert_eq!(config.dispatch.group_height, 8);
        assert_eq!(config.layout, PassLayout::default());
    }

    #[test]
    fn test_denoise_config_rejects_single_sample() {
        let err = DenoiseConfig::from_yaml("samples: 1\n").unwrap_err();
        assert!(matches!(err, Error::TooFewSamples(1)));
    }

    #[test]
    fn test_denoise_config_reports_parse_errors() {
        let err = DenoiseConfig::from_yaml("samples: many\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
