//! Non-local-means filtering.
//!
//! Every output pixel is a weighted average over its `(2r+1)^2` search window.
//! The weight of a candidate `q` comes from the mean variance-normalized squared
//! difference between the patches around `p` and `q`, taken in a guide ("weight")
//! image that may differ from the filtered ("noisy") one:
//!
//! ```text
//! d(p, q) = mean over patch [(w_p - w_q)^2 - a (v_p + min(v_p, v_q))] / (1e-7 + k_2 (v_p + v_q))
//! weight  = exp(-max(0, d))
//! ```
//!
//! Patches are clipped so both of them stay inside the rect; the mean divides by
//! the clipped pixel count. Comparing a pixel with itself yields `d <= 0` for
//! `a >= 0`, so every window's weight sum is at least 1.

pub mod simd;

#[cfg(feature = "bench")]
pub mod bench;


use glam::IVec2;

use crate::config::{DispatchConfig, NlmParams, PackedLayout};
use crate::dispatch::{DisjointOutput, Dispatcher};
use crate::error::{Error, Result};
use crate::rect::Rect;

/// Per-pair patch offsets, `lo` inclusive and `hi` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchBounds {
    pub lo: IVec2,
    pub hi: IVec2,
}

impl PatchBounds {
    #[inline]
    pub fn width(&self) -> i32 {
        self.hi.x - self.lo.x
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.hi.y - self.lo.y
    }

    /// Pixels per patch after clipping.
    #[inline]
    pub fn area(&self) -> i32 {
        self.width() * self.height()
    }
}

/// Offsets `d` in `[-f, f]^2` for which both `p + d` and `q + d` lie in `rect`.
#[inline]
pub fn patch_bounds(p: IVec2, q: IVec2, rect: &Rect, patch_radius: i32) -> PatchBounds {
    let lo = (rect.min() - q)
        .max(rect.min() - p)
        .max(IVec2::splat(-patch_radius));
    let hi = (rect.max() - q)
        .min(rect.max() - p)
        .min(IVec2::splat(patch_radius + 1));
    PatchBounds { lo, hi }
}

/// Search window of `p` clipped to `rect`, as `(lo, hi)` pixel bounds.
#[inline]
pub fn search_window(p: IVec2, rect: &Rect, search_radius: i32) -> (IVec2, IVec2) {
    (
        rect.min().max(p - search_radius),
        rect.max().min(p + search_radius + 1),
    )
}

/// Maps a distance to a weight in `(0, 1]`.
#[inline]
pub fn patch_weight(distance: f32) -> f32 {
    (-distance.max(0.0)).exp()
}

/// Sum of the distance term over the patch pair, not yet normalized.
#[inline]
#[allow(clippy::too_many_arguments)]
fn patch_distance_sum(
    weight: &[f32],
    variance: &[f32],
    rect: &Rect,
    p_idx: usize,
    q_idx: usize,
    bounds: &PatchBounds,
    a: f32,
    k_2: f32,
) -> f32 {
    let stride = rect.padded_width() as isize;
    let n = bounds.width() as usize;
    let mut sum = 0.0;
    for dy in bounds.lo.y..bounds.hi.y {
        let offset = dy as isize * stride + bounds.lo.x as isize;
        let ps = (p_idx as isize + offset) as usize;
        let qs = (q_idx as isize + offset) as usize;
        sum += simd::row_distance(
            &weight[ps..ps + n],
            &weight[qs..qs + n],
            &variance[ps..ps + n],
            &variance[qs..qs + n],
            a,
            k_2,
        );
    }
    sum
}

/// Mean patch distance between pixels `p` and `q` of a single-channel guide.
pub fn patch_distance(
    weight: &[f32],
    variance: &[f32],
    rect: &Rect,
    p: IVec2,
    q: IVec2,
    params: &NlmParams,
) -> f32 {
    let bounds = patch_bounds(p, q, rect, params.patch_radius as i32);
    let sum = patch_distance_sum(
        weight,
        variance,
        rect,
        rect.index(p.x, p.y),
        rect.index(q.x, q.y),
        &bounds,
        params.a,
        params.k_2,
    );
    sum / bounds.area() as f32
}

/// Filtered value of pixel `(x, y)`.
///
/// `noisy`, `weight` and `variance` are dense buffers over `rect`; `(x, y)` must
/// lie in `rect`.
pub fn nlm_pixel(
    x: i32,
    y: i32,
    noisy: &[f32],
    weight: &[f32],
    variance: &[f32],
    rect: &Rect,
    params: &NlmParams,
) -> f32 {
    let p = IVec2::new(x, y);
    let p_idx = rect.index(x, y);
    let (lo, hi) = search_window(p, rect, params.search_radius as i32);
    let f = params.patch_radius as i32;

    let mut sum_image = 0.0f32;
    let mut sum_weight = 0.0f32;
    for qy in lo.y..hi.y {
        for qx in lo.x..hi.x {
            let q = IVec2::new(qx, qy);
            let q_idx = rect.index(qx, qy);
            let bounds = patch_bounds(p, q, rect, f);
            let distance = patch_distance_sum(
                weight, variance, rect, p_idx, q_idx, &bounds, params.a, params.k_2,
            ) / bounds.area() as f32;
            let w = patch_weight(distance);
            sum_image += w * noisy[q_idx];
            sum_weight += w;
        }
    }

    debug_assert!(sum_weight >= 1.0, "weight sum {sum_weight} at ({x}, {y})");
    sum_image / sum_weight
}

/// Three-channel variant of [`nlm_pixel`].
///
/// One weight per candidate, computed from the distance summed over all three
/// channels and normalized by three times the patch area, is shared by every
/// output channel.
pub fn nlm_pixel3(
    x: i32,
    y: i32,
    noisy: [&[f32]; 3],
    weight: [&[f32]; 3],
    variance: [&[f32]; 3],
    rect: &Rect,
    params: &NlmParams,
) -> [f32; 3] {
    let p = IVec2::new(x, y);
    let p_idx = rect.index(x, y);
    let (lo, hi) = search_window(p, rect, params.search_radius as i32);
    let f = params.patch_radius as i32;

    let mut sum_image = [0.0f32; 3];
    let mut sum_weight = 0.0f32;
    for qy in lo.y..hi.y {
        for qx in lo.x..hi.x {
            let q = IVec2::new(qx, qy);
            let q_idx = rect.index(qx, qy);
            let bounds = patch_bounds(p, q, rect, f);
            let sum: f32 = (0..3)
                .map(|c| {
                    patch_distance_sum(
                        weight[c],
                        variance[c],
                        rect,
                        p_idx,
                        q_idx,
                        &bounds,
                        params.a,
                        params.k_2,
                    )
                })
                .sum();
            let w = patch_weight(sum / (3 * bounds.area()) as f32);
            for c in 0..3 {
                sum_image[c] += w * noisy[c][q_idx];
            }
            sum_weight += w;
        }
    }

    debug_assert!(sum_weight >= 1.0, "weight sum {sum_weight} at ({x}, {y})");
    sum_image.map(|s| s / sum_weight)
}

/// Weight between pixels `p` and `q` of two packed three-channel buffers.
///
/// `p_buffer` and `q_buffer` are laid out per `layout`, each plane a dense
/// buffer over `rect`. Uses the same clipped-patch distance as [`nlm_pixel3`].
pub fn nlm_weight(
    p: IVec2,
    q: IVec2,
    p_buffer: &[f32],
    q_buffer: &[f32],
    layout: &PackedLayout,
    params: &NlmParams,
    rect: &Rect,
) -> f32 {
    let bounds = patch_bounds(p, q, rect, params.patch_radius as i32);
    let stride = rect.padded_width() as isize;
    let n = bounds.width() as usize;
    let p_idx = rect.index(p.x, p.y) as isize;
    let q_idx = rect.index(q.x, q.y) as isize;

    let mut sum = 0.0f32;
    for c in 0..3 {
        for dy in bounds.lo.y..bounds.hi.y {
            let offset = dy as isize * stride + bounds.lo.x as isize;
            let ps = (p_idx + offset) as usize;
            let qs = (q_idx + offset) as usize;
            let (wp, wq) = (layout.color(c, ps), layout.color(c, qs));
            let (vp, vq) = (layout.variance(c, ps), layout.variance(c, qs));
            sum += simd::row_distance(
                &p_buffer[wp..wp + n],
                &q_buffer[wq..wq + n],
                &p_buffer[vp..vp + n],
                &q_buffer[vq..vq + n],
                params.a,
                params.k_2,
            );
        }
    }
    patch_weight(sum / (3 * bounds.area()) as f32)
}

fn check_inputs(rect: &Rect, params: &NlmParams, buffers: &[(&'static str, usize)]) -> Result<()> {
    rect.validate()?;
    params.validate()?;
    for &(name, len) in buffers {
        rect.check_buffer(name, len)?;
    }
    Ok(())
}

/// Filter every pixel of `rect` into `output`.
///
/// Padding columns of `output` are left untouched.
pub fn filter(
    noisy: &[f32],
    weight: &[f32],
    variance: &[f32],
    output: &mut [f32],
    rect: &Rect,
    params: &NlmParams,
    dispatch: &DispatchConfig,
) -> Result<()> {
    check_inputs(
        rect,
        params,
        &[
            ("noisy", noisy.len()),
            ("weight", weight.len()),
            ("variance", variance.len()),
            ("output", output.len()),
        ],
    )?;

    tracing::debug!(
        ?rect,
        search_radius = params.search_radius,
        patch_radius = params.patch_radius,
        a = params.a,
        k_2 = params.k_2,
        "NLM filter"
    );

    let dispatcher = Dispatcher::per_pixel(*rect, dispatch)?;
    let out = DisjointOutput::new(output);
    dispatcher.for_each(|item| {
        let (x, y) = (item.pixel.x, item.pixel.y);
        let value = nlm_pixel(x, y, noisy, weight, variance, rect, params);
        // SAFETY: one work item per pixel, each dense index written once.
        unsafe { out.write(rect.index(x, y), value) };
    });
    Ok(())
}

/// Three-channel variant of [`filter`].
pub fn filter3(
    noisy: [&[f32]; 3],
    weight: [&[f32]; 3],
    variance: [&[f32]; 3],
    output: [&mut [f32]; 3],
    rect: &Rect,
    params: &NlmParams,
    dispatch: &DispatchConfig,
) -> Result<()> {
    const NAMES: [[&str; 4]; 3] = [
        ["noisy[0]", "weight[0]", "variance[0]", "output[0]"],
        ["noisy[1]", "weight[1]", "variance[1]", "output[1]"],
        ["noisy[2]", "weight[2]", "variance[2]", "output[2]"],
    ];
    let mut lengths = Vec::with_capacity(12);
    for c in 0..3 {
        lengths.push((NAMES[c][0], noisy[c].len()));
        lengths.push((NAMES[c][1], weight[c].len()));
        lengths.push((NAMES[c][2], variance[c].len()));
        lengths.push((NAMES[c][3], output[c].len()));
    }
    check_inputs(rect, params, &lengths)?;

    tracing::debug!(
        ?rect,
        search_radius = params.search_radius,
        patch_radius = params.patch_radius,
        "NLM filter, 3 channels"
    );

    let dispatcher = Dispatcher::per_pixel(*rect, dispatch)?;
    let out = output.map(DisjointOutput::new);
    dispatcher.for_each(|item| {
        let (x, y) = (item.pixel.x, item.pixel.y);
        let value = nlm_pixel3(x, y, noisy, weight, variance, rect, params);
        let idx = rect.index(x, y);
        for c in 0..3 {
            // SAFETY: one work item per pixel, each dense index written once.
            unsafe { out[c].write(idx, value[c]) };
        }
    });
    Ok(())
}

/// Checks that both packed buffers hold every plane `layout` addresses over `rect`.
pub fn check_packed(rect: &Rect, layout: &PackedLayout, p_len: usize, q_len: usize) -> Result<()> {
    rect.validate()?;
    if layout.pass_stride < rect.dense_len() {
        return Err(Error::InvalidParameter {
            name: "pass_stride",
            value: layout.pass_stride as f32,
        });
    }
    let required = layout.required_len();
    for (name, len) in [("p_buffer", p_len), ("q_buffer", q_len)] {
        if len < required {
            return Err(Error::BufferTooSmall {
                name,
                len,
                required,
            });
        }
    }
    Ok(())
}
