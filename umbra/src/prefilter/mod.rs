//! Statistics preparation for the shadow feature.
//!
//! The renderer accumulates the shadow pass in two independent sample halves A
//! and B. [`divide_shadow`] turns the raw sums of one pixel into per-half ratios
//! and three variance estimates, [`get_feature`] does the same for a single
//! feature pass, and [`combine_mean`]/[`combine_variance`] merge two filtered
//! halves back into one estimate.
//!
//! The per-pixel functions never fail; the `*_rect` drivers validate buffers and
//! fan the pixels out over the work pool.

pub mod shadow;


use rayon::prelude::*;

use crate::config::{DispatchConfig, PassLayout, RESET_CHANNELS};
use crate::dispatch::{DisjointOutput, Dispatcher};
use crate::error::{Error, Result};
use crate::rect::Rect;
use crate::tiles::{CENTER_TILE, ResolvedPixel, TileNeighborhood};

/// Floor applied to ratio denominators.
pub const RATIO_EPSILON: f32 = 1e-7;

/// Largest neighborhood radius [`combine_variance`] supports (5x5 window).
pub const MAX_COMBINE_RADIUS: u32 = 2;

const MAX_COMBINE_WIDTH: usize = 2 * MAX_COMBINE_RADIUS as usize + 1;
const MAX_COMBINE_VALUES: usize = MAX_COMBINE_WIDTH * MAX_COMBINE_WIDTH;

const ROWS_PER_CHUNK: usize = 8;

/// Request to zero the first [`RESET_CHANNELS`] floats of one pixel record.
///
/// Emitted in collaborative mode for pixels of the center tile; the caller
/// applies it once the tile buffers are no longer shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordReset {
    pub tile: usize,
    /// Float index of the record start within the tile buffer.
    pub record: usize,
}

impl RecordReset {
    pub fn apply(&self, buffer: &mut [f32]) {
        buffer[self.record..self.record + RESET_CHANNELS].fill(0.0);
    }
}

/// Shadow statistics of one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowPixel {
    /// Ratio numerator / denominator of half A.
    pub unfiltered_a: f32,
    /// Ratio numerator / denominator of half B.
    pub unfiltered_b: f32,
    /// Sample variance of the mean, from both halves.
    pub sample_variance: f32,
    /// Variance of the sample variance estimate.
    pub sample_variance_v: f32,
    /// Variance estimated from the disagreement of the halves.
    pub buffer_variance: f32,
    pub reset: Option<RecordReset>,
}

/// Mean and variance of the mean of one feature pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSample {
    pub mean: f32,
    pub variance: f32,
}

/// `1 / (s (s - 1))`, the factor turning a sum of squared deviations into the
/// variance of the mean.
#[inline]
fn variance_factor(sample: u32) -> f32 {
    debug_assert!(sample >= 2, "variance needs at least 2 samples");
    let s = sample as f32;
    1.0 / (s * (s - 1.0))
}

#[inline]
fn reset_for(pixel: ResolvedPixel, collaborative: bool) -> Option<RecordReset> {
    (collaborative && pixel.tile == CENTER_TILE).then_some(RecordReset {
        tile: pixel.tile,
        record: pixel.record,
    })
}

/// Shadow statistics of pixel `(x, y)`.
pub fn divide_shadow(
    sample: u32,
    tiles: &TileNeighborhood<'_>,
    layout: &PassLayout,
    collaborative: bool,
    x: i32,
    y: i32,
) -> ShadowPixel {
    let pixel = tiles.resolve(x, y, layout.pass_stride);
    let read = |channel: usize| tiles.read(pixel, layout.denoising_offset + channel);
    let passes = &layout.shadow;

    let unfiltered_a = read(passes.a.numerator) / read(passes.a.denominator).max(RATIO_EPSILON);
    let unfiltered_b = read(passes.b.numerator) / read(passes.b.denominator).max(RATIO_EPSILON);

    let var_a = read(passes.a.variance);
    let var_b = read(passes.b.variance);
    let factor = variance_factor(sample);
    let half_diff = var_a - var_b;
    let ratio_diff = unfiltered_a - unfiltered_b;

    ShadowPixel {
        unfiltered_a,
        unfiltered_b,
        sample_variance: (var_a + var_b) * factor,
        sample_variance_v: 0.5 * half_diff * half_diff * factor * factor,
        buffer_variance: 0.5 * ratio_diff * ratio_diff,
        reset: reset_for(pixel, collaborative),
    }
}

/// Mean and variance of a single feature pass at pixel `(x, y)`.
///
/// Offsets are relative to the denoising block of the record.
pub fn get_feature(
    sample: u32,
    tiles: &TileNeighborhood<'_>,
    layout: &PassLayout,
    mean_offset: usize,
    variance_offset: usize,
    x: i32,
    y: i32,
) -> FeatureSample {
    let pixel = tiles.resolve(x, y, layout.pass_stride);
    let base = layout.denoising_offset;
    FeatureSample {
        mean: tiles.read(pixel, base + mean_offset) / sample as f32,
        variance: tiles.read(pixel, base + variance_offset) * variance_factor(sample),
    }
}

/// Mean of the two halves at dense index `idx`.
#[inline]
pub fn combine_mean(a: &[f32], b: &[f32], idx: usize) -> f32 {
    0.5 * (a[idx] + b[idx])
}

#[inline]
fn half_difference(a: &[f32], b: &[f32], idx: usize) -> f32 {
    let d = a[idx] - b[idx];
    0.5 * d * d
}

/// Robust variance at pixel `(x, y)`.
///
/// With `radius == 0` this is `0.5 (a - b)^2` of the pixel itself. Otherwise the
/// same quantity is collected over the `(2 radius + 1)^2` neighborhood clipped to
/// `rect` and the value of rank `floor(7N/8)` in ascending order is returned,
/// which discards isolated outliers.
pub fn combine_variance(a: &[f32], b: &[f32], rect: &Rect, radius: u32, x: i32, y: i32) -> f32 {
    if radius == 0 {
        return half_difference(a, b, rect.index(x, y));
    }
    debug_assert!(radius <= MAX_COMBINE_RADIUS);

    let r = radius as i32;
    let mut values = [0.0f32; MAX_COMBINE_VALUES];
    let mut count = 0;
    for py in (y - r).max(rect.y0)..(y + r + 1).min(rect.y1) {
        for px in (x - r).max(rect.x0)..(x + r + 1).min(rect.x1) {
            values[count] = half_difference(a, b, rect.index(px, py));
            count += 1;
        }
    }

    let values = &mut values[..count];
    insertion_sort(values);
    values[(7 * count) / 8]
}

#[inline]
fn insertion_sort(values: &mut [f32]) {
    for i in 1..values.len() {
        let v = values[i];
        let mut j = i;
        while j > 0 && values[j - 1] > v {
            values[j] = values[j - 1];
            j -= 1;
        }
        values[j] = v;
    }
}

/// Dense shadow statistics over a rect.
#[derive(Debug, Clone)]
pub struct ShadowBuffers {
    rect: Rect,
    b_offset: usize,
    /// Half A ratios at `[0, b_offset)`, half B at `[b_offset, 2 b_offset)`.
    pub unfiltered: Vec<f32>,
    pub sample_variance: Vec<f32>,
    pub sample_variance_v: Vec<f32>,
    pub buffer_variance: Vec<f32>,
    /// Record resets of the center tile; empty unless collaborative.
    pub resets: Vec<RecordReset>,
}

impl ShadowBuffers {
    pub fn new(rect: Rect, num_frames: usize) -> Self {
        let len = rect.dense_len();
        let b_offset = len * num_frames;
        Self {
            rect,
            b_offset,
            unfiltered: vec![0.0; 2 * b_offset],
            sample_variance: vec![0.0; len],
            sample_variance_v: vec![0.0; len],
            buffer_variance: vec![0.0; len],
            resets: Vec::new(),
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Offset of half B in [`unfiltered`](Self::unfiltered).
    pub fn b_offset(&self) -> usize {
        self.b_offset
    }

    pub fn unfiltered_a(&self) -> &[f32] {
        &self.unfiltered[..self.rect.dense_len()]
    }

    pub fn unfiltered_b(&self) -> &[f32] {
        &self.unfiltered[self.b_offset..self.b_offset + self.rect.dense_len()]
    }

    /// Zero the records listed in [`resets`](Self::resets) in the center tile buffer.
    pub fn apply_resets(&self, center: &mut [f32]) {
        for reset in &self.resets {
            reset.apply(center);
        }
    }
}

/// Run [`divide_shadow`] over every pixel of `rect`.
pub fn divide_shadow_rect(
    sample: u32,
    tiles: &TileNeighborhood<'_>,
    layout: &PassLayout,
    rect: &Rect,
    collaborative: bool,
    dispatch: &DispatchConfig,
) -> Result<ShadowBuffers> {
    if sample < 2 {
        return Err(Error::TooFewSamples(sample));
    }
    tiles.validate_shadow(rect, layout)?;

    let mut buffers = ShadowBuffers::new(*rect, layout.num_frames);
    let b_offset = buffers.b_offset;
    {
        let unfiltered = DisjointOutput::new(&mut buffers.unfiltered);
        let sample_variance = DisjointOutput::new(&mut buffers.sample_variance);
        let sample_variance_v = DisjointOutput::new(&mut buffers.sample_variance_v);
        let buffer_variance = DisjointOutput::new(&mut buffers.buffer_variance);

        Dispatcher::per_pixel(*rect, dispatch)?.for_each(|item| {
            let (x, y) = (item.pixel.x, item.pixel.y);
            let stats = divide_shadow(sample, tiles, layout, false, x, y);
            let idx = rect.index(x, y);
            // SAFETY: one work item per pixel, each dense index written once.
            unsafe {
                unfiltered.write(idx, stats.unfiltered_a);
                unfiltered.write(b_offset + idx, stats.unfiltered_b);
                sample_variance.write(idx, stats.sample_variance);
                sample_variance_v.write(idx, stats.sample_variance_v);
                buffer_variance.write(idx, stats.buffer_variance);
            }
        });
    }

    if collaborative {
        buffers.resets = collect_resets(tiles, layout, rect);
    }

    tracing::debug!(
        ?rect,
        sample,
        resets = buffers.resets.len(),
        "Divided shadow passes"
    );
    Ok(buffers)
}

/// Resets for every center-tile pixel of `rect`, in row-major order.
fn collect_resets(
    tiles: &TileNeighborhood<'_>,
    layout: &PassLayout,
    rect: &Rect,
) -> Vec<RecordReset> {
    let Some(center) = rect.intersect(&tiles.tile_rect(CENTER_TILE)) else {
        return Vec::new();
    };
    (center.y0..center.y1)
        .flat_map(|y| (center.x0..center.x1).map(move |x| (x, y)))
        .filter_map(|(x, y)| reset_for(tiles.resolve(x, y, layout.pass_stride), true))
        .collect()
}

/// Dense mean and variance buffers over a rect.
#[derive(Debug, Clone)]
pub struct FeatureBuffers {
    rect: Rect,
    pub mean: Vec<f32>,
    pub variance: Vec<f32>,
}

impl FeatureBuffers {
    pub fn new(rect: Rect) -> Self {
        let len = rect.dense_len();
        Self {
            rect,
            mean: vec![0.0; len],
            variance: vec![0.0; len],
        }
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    /// Combine two filtered halves into fresh buffers.
    pub fn combine(a: &[f32], b: &[f32], rect: &Rect, radius: u32) -> Result<Self> {
        rect.validate()?;
        let mut out = Self::new(*rect);
        combine_halves(a, b, rect, radius, Some(&mut out.mean), Some(&mut out.variance))?;
        Ok(out)
    }
}

/// Run [`get_feature`] over every pixel of `rect`.
pub fn get_feature_rect(
    sample: u32,
    tiles: &TileNeighborhood<'_>,
    layout: &PassLayout,
    mean_offset: usize,
    variance_offset: usize,
    rect: &Rect,
    dispatch: &DispatchConfig,
) -> Result<FeatureBuffers> {
    if sample < 2 {
        return Err(Error::TooFewSamples(sample));
    }
    layout.validate()?;
    let max_channel = layout.denoising_offset + mean_offset.max(variance_offset);
    if max_channel >= layout.pass_stride {
        return Err(Error::InvalidParameter {
            name: "feature_offset",
            value: max_channel as f32,
        });
    }
    tiles.validate_covers(rect, layout.pass_stride, max_channel)?;

    let mut buffers = FeatureBuffers::new(*rect);
    {
        let mean = DisjointOutput::new(&mut buffers.mean);
        let variance = DisjointOutput::new(&mut buffers.variance);
        Dispatcher::per_pixel(*rect, dispatch)?.for_each(|item| {
            let (x, y) = (item.pixel.x, item.pixel.y);
            let feature = get_feature(sample, tiles, layout, mean_offset, variance_offset, x, y);
            let idx = rect.index(x, y);
            // SAFETY: one work item per pixel, each dense index written once.
            unsafe {
                mean.write(idx, feature.mean);
                variance.write(idx, feature.variance);
            }
        });
    }

    tracing::debug!(?rect, sample, mean_offset, variance_offset, "Extracted feature");
    Ok(buffers)
}

/// Merge two filtered halves over `rect`.
///
/// Writes the per-pixel mean into `mean` and the robust variance into
/// `variance`; either output may be skipped.
pub fn combine_halves(
    a: &[f32],
    b: &[f32],
    rect: &Rect,
    radius: u32,
    mean: Option<&mut [f32]>,
    variance: Option<&mut [f32]>,
) -> Result<()> {
    rect.validate()?;
    if radius > MAX_COMBINE_RADIUS {
        return Err(Error::CombineRadiusTooLarge {
            radius,
            max: MAX_COMBINE_RADIUS,
        });
    }
    rect.check_buffer("a", a.len())?;
    rect.check_buffer("b", b.len())?;

    let width = rect.padded_width();
    let len = rect.dense_len();

    if let Some(mean) = mean {
        rect.check_buffer("mean", mean.len())?;
        for_each_row(&mut mean[..len], rect, width, |x, y| {
            combine_mean(a, b, rect.index(x, y))
        });
    }
    if let Some(variance) = variance {
        rect.check_buffer("variance", variance.len())?;
        for_each_row(&mut variance[..len], rect, width, |x, y| {
            combine_variance(a, b, rect, radius, x, y)
        });
    }
    Ok(())
}

/// Fill `output` row-parallel with `f(x, y)`, leaving padding untouched.
fn for_each_row<F>(output: &mut [f32], rect: &Rect, width: usize, f: F)
where
    F: Fn(i32, i32) -> f32 + Sync + Send,
{
    output
        .par_chunks_mut(width * ROWS_PER_CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, chunk)| {
            let first_row = chunk_idx * ROWS_PER_CHUNK;
            for (local_row, row) in chunk.chunks_mut(width).enumerate() {
                let y = rect.y0 + (first_row + local_row) as i32;
                for (out, x) in row.iter_mut().zip(rect.x0..rect.x1) {
                    *out = f(x, y);
                }
            }
        });
}
