//! Testing utilities for umbra.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::PassLayout;
use crate::rect::Rect;
use crate::tiles::{TileBuffer, TileNeighborhood};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Dense single-channel image over a rect. Padding columns hold 0.
#[derive(Debug, Clone)]
pub struct DenseImage {
    pub rect: Rect,
    pub data: Vec<f32>,
}

impl DenseImage {
    pub fn from_fn(rect: Rect, mut f: impl FnMut(i32, i32) -> f32) -> Self {
        let mut data = vec![0.0f32; rect.dense_len()];
        for y in rect.y0..rect.y1 {
            for x in rect.x0..rect.x1 {
                data[rect.index(x, y)] = f(x, y);
            }
        }
        Self { rect, data }
    }

    pub fn constant(rect: Rect, value: f32) -> Self {
        Self::from_fn(rect, |_, _| value)
    }

    /// Uniform noise in `[mean - amplitude, mean + amplitude)`.
    pub fn noisy(rect: Rect, mean: f32, amplitude: f32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_fn(rect, |_, _| mean + amplitude * rng.random_range(-1.0f32..1.0))
    }

    /// 0/1 checkerboard, 1 where `x + y` is odd unless `invert`.
    pub fn checkerboard(rect: Rect, invert: bool) -> Self {
        Self::from_fn(rect, |x, y| {
            let odd = (x + y).rem_euclid(2) == 1;
            if odd != invert { 1.0 } else { 0.0 }
        })
    }

    /// Min and max over the rect pixels.
    pub fn range(&self) -> (f32, f32) {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for y in self.rect.y0..self.rect.y1 {
            for x in self.rect.x0..self.rect.x1 {
                let v = self.data[self.rect.index(x, y)];
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        (lo, hi)
    }
}

/// Owned 3x3 grid of render tiles with uniform tile size.
///
/// Tile `(tx, ty)` covers `[origin + t * size, origin + (t + 1) * size)` on each
/// axis, rows are `size.0` pixels wide.
pub struct TileGrid {
    pub bounds_x: [i32; 4],
    pub bounds_y: [i32; 4],
    pub pass_stride: usize,
    pub buffers: [Vec<f32>; 9],
}

impl TileGrid {
    /// Fill every pixel record with `fill(x, y, record)`.
    pub fn new(
        origin: (i32, i32),
        size: (i32, i32),
        pass_stride: usize,
        mut fill: impl FnMut(i32, i32, &mut [f32]),
    ) -> Self {
        let bounds = |o: i32, s: i32| [o, o + s, o + 2 * s, o + 3 * s];
        let bounds_x = bounds(origin.0, size.0);
        let bounds_y = bounds(origin.1, size.1);
        let buffers = std::array::from_fn(|i| {
            let (tx, ty) = (i % 3, i / 3);
            let mut buffer = vec![0.0f32; (size.0 * size.1) as usize * pass_stride];
            for ly in 0..size.1 {
                for lx in 0..size.0 {
                    let start = (ly * size.0 + lx) as usize * pass_stride;
                    fill(
                        bounds_x[tx] + lx,
                        bounds_y[ty] + ly,
                        &mut buffer[start..start + pass_stride],
                    );
                }
            }
            buffer
        });
        Self {
            bounds_x,
            bounds_y,
            pass_stride,
            buffers,
        }
    }

    pub fn neighborhood(&self) -> TileNeighborhood<'_> {
        let width = self.bounds_x[1] - self.bounds_x[0];
        let tiles: [TileBuffer<'_>; 9] = std::array::from_fn(|i| {
            let (tx, ty) = (i % 3, i / 3);
            TileBuffer::for_tile(&self.buffers[i], self.bounds_x[tx], self.bounds_y[ty], width)
        });
        TileNeighborhood::new(tiles, self.bounds_x, self.bounds_y)
            .expect("tile grid bounds are monotonic")
    }

    /// Whole image covered by the grid.
    pub fn full_rect(&self) -> Rect {
        Rect::new(self.bounds_x[0], self.bounds_y[0], self.bounds_x[3], self.bounds_y[3])
    }
}

/// Raw shadow channels of one half: denominator, numerator, squared-deviation sum.
#[derive(Debug, Clone, Copy)]
pub struct ShadowHalf {
    pub denominator: f32,
    pub numerator: f32,
    pub variance: f32,
}

/// Write both shadow halves into a record laid out per `layout`.
pub fn write_shadow(record: &mut [f32], layout: &PassLayout, a: ShadowHalf, b: ShadowHalf) {
    let base = layout.denoising_offset;
    let passes = &layout.shadow;
    record[base + passes.a.denominator] = a.denominator;
    record[base + passes.a.numerator] = a.numerator;
    record[base + passes.a.variance] = a.variance;
    record[base + passes.b.denominator] = b.denominator;
    record[base + passes.b.numerator] = b.numerator;
    record[base + passes.b.variance] = b.variance;
}
