//! 3x3 render-tile neighborhood around the tile being denoised.
//!
//! The renderer keeps samples in per-tile buffers, each with its own offset and
//! row stride. Denoising windows cross tile borders, so pixels are looked up
//! through the eight neighbors as well as the center tile (index 4).

use crate::config::PassLayout;
use crate::error::{Error, Result};
use crate::rect::Rect;

/// Index of the center tile in the 3x3 neighborhood.
pub const CENTER_TILE: usize = 4;

/// One tile's render buffer.
#[derive(Debug, Clone, Copy)]
pub struct TileBuffer<'a> {
    pub data: &'a [f32],
    /// Pixel offset added to `y * stride + x`; usually negative.
    pub offset: i64,
    /// Pixels per buffer row.
    pub stride: i64,
}

impl<'a> TileBuffer<'a> {
    /// Placeholder for a neighbor that does not exist (image border).
    pub const EMPTY: TileBuffer<'static> = TileBuffer {
        data: &[],
        offset: 0,
        stride: 0,
    };

    pub fn new(data: &'a [f32], offset: i64, stride: i64) -> Self {
        Self {
            data,
            offset,
            stride,
        }
    }

    /// Buffer for a tile whose first pixel is `(x, y)` and whose rows hold `width` pixels.
    pub fn for_tile(data: &'a [f32], x: i32, y: i32, width: i32) -> Self {
        let stride = width as i64;
        Self::new(data, -(x as i64 + y as i64 * stride), stride)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Float index where the record of pixel `(x, y)` starts.
    #[inline]
    fn record_start(&self, x: i32, y: i32, pass_stride: usize) -> i64 {
        (self.offset + y as i64 * self.stride + x as i64) * pass_stride as i64
    }
}

/// A pixel located in the neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPixel {
    /// Tile index, row-major in the 3x3 grid.
    pub tile: usize,
    /// Float index of the pixel record start within that tile's buffer.
    pub record: usize,
}

/// Nine tile buffers plus their image-space boundaries.
///
/// `tile_x` holds the start of the left, center and right tile columns followed
/// by the end of the right column; `tile_y` likewise for rows.
#[derive(Debug, Clone, Copy)]
pub struct TileNeighborhood<'a> {
    tiles: [TileBuffer<'a>; 9],
    tile_x: [i32; 4],
    tile_y: [i32; 4],
}

impl<'a> TileNeighborhood<'a> {
    pub fn new(tiles: [TileBuffer<'a>; 9], tile_x: [i32; 4], tile_y: [i32; 4]) -> Result<Self> {
        let monotonic = |b: &[i32; 4]| b.windows(2).all(|w| w[0] <= w[1]);
        if !monotonic(&tile_x) || !monotonic(&tile_y) {
            return Err(Error::InvalidTileBounds { tile_x, tile_y });
        }
        Ok(Self {
            tiles,
            tile_x,
            tile_y,
        })
    }

    /// Neighborhood made of one buffer covering everything, placed in the center slot.
    pub fn single(tile: TileBuffer<'a>, bounds: Rect) -> Self {
        let mut tiles: [TileBuffer<'a>; 9] = [TileBuffer::EMPTY; 9];
        tiles[CENTER_TILE] = tile;
        Self {
            tiles,
            tile_x: [bounds.x0, bounds.x0, bounds.x1, bounds.x1],
            tile_y: [bounds.y0, bounds.y0, bounds.y1, bounds.y1],
        }
    }

    pub fn tile(&self, index: usize) -> &TileBuffer<'a> {
        &self.tiles[index]
    }

    /// Image-space region of tile `index`.
    pub fn tile_rect(&self, index: usize) -> Rect {
        let (tx, ty) = (index % 3, index / 3);
        Rect::new(
            self.tile_x[tx],
            self.tile_y[ty],
            self.tile_x[tx + 1],
            self.tile_y[ty + 1],
        )
    }

    /// Tile index containing `(x, y)`.
    #[inline]
    pub fn tile_index(&self, x: i32, y: i32) -> usize {
        let column = |v: i32, b: &[i32; 4]| {
            if v < b[1] {
                0
            } else if v < b[2] {
                1
            } else {
                2
            }
        };
        column(y, &self.tile_y) * 3 + column(x, &self.tile_x)
    }

    /// Locate the record of pixel `(x, y)`.
    ///
    /// Call [`validate_covers`](Self::validate_covers) for the rect first; pixels
    /// outside a validated rect may resolve to an index past the buffer.
    #[inline]
    pub fn resolve(&self, x: i32, y: i32, pass_stride: usize) -> ResolvedPixel {
        let tile = self.tile_index(x, y);
        let start = self.tiles[tile].record_start(x, y, pass_stride);
        debug_assert!(start >= 0, "pixel ({x}, {y}) maps before tile {tile} buffer");
        ResolvedPixel {
            tile,
            record: start as usize,
        }
    }

    /// Channel `channel` of the record at `pixel`.
    #[inline]
    pub fn read(&self, pixel: ResolvedPixel, channel: usize) -> f32 {
        self.tiles[pixel.tile].data[pixel.record + channel]
    }

    /// Checks that every pixel of `rect` resolves to a present tile whose buffer
    /// holds the record up to channel `max_channel`.
    pub fn validate_covers(
        &self,
        rect: &Rect,
        pass_stride: usize,
        max_channel: usize,
    ) -> Result<()> {
        rect.validate()?;
        for index in 0..9 {
            let Some(region) = self.tile_region(index, rect) else {
                continue;
            };
            let tile = &self.tiles[index];
            if tile.is_empty() {
                return Err(Error::MissingTile { index, rect: *rect });
            }
            // Record starts are affine in x and y, so the extremes sit at corners.
            let corners = [
                (region.x0, region.y0),
                (region.x1 - 1, region.y0),
                (region.x0, region.y1 - 1),
                (region.x1 - 1, region.y1 - 1),
            ];
            for (x, y) in corners {
                let start = tile.record_start(x, y, pass_stride);
                let end = start + max_channel as i64;
                if start < 0 || end >= tile.data.len() as i64 {
                    return Err(Error::TileTooSmall {
                        index,
                        rect: *rect,
                        len: tile.data.len(),
                        required: if start < 0 { start } else { end },
                    });
                }
            }
        }
        Ok(())
    }

    /// Part of `rect` that resolves to tile `index`.
    ///
    /// Resolution clamps to the outer columns, so the outer tiles also own
    /// everything beyond the outer boundaries.
    fn tile_region(&self, index: usize, rect: &Rect) -> Option<Rect> {
        let (tx, ty) = (index % 3, index / 3);
        let span = |t: usize, b: &[i32; 4]| match t {
            0 => (i32::MIN, b[1]),
            1 => (b[1], b[2]),
            _ => (b[2], i32::MAX),
        };
        let (x0, x1) = span(tx, &self.tile_x);
        let (y0, y1) = span(ty, &self.tile_y);
        rect.intersect(&Rect::new(x0, y0, x1, y1))
    }

    /// Checks the layout and coverage needed to read shadow passes over `rect`.
    pub fn validate_shadow(&self, rect: &Rect, layout: &PassLayout) -> Result<()> {
        layout.validate()?;
        self.validate_covers(rect, layout.pass_stride, layout.max_shadow_channel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_neighborhood(buffers: &[Vec<f32>; 9]) -> TileNeighborhood<'_> {
        // Tiles are 4x4 pixels, the center tile spans [4, 8) x [4, 8).
        let bounds = [0, 4, 8, 12];
        let tiles: [TileBuffer<'_>; 9] = std::array::from_fn(|i| {
            let (tx, ty) = (i % 3, i / 3);
            TileBuffer::for_tile(&buffers[i], bounds[tx], bounds[ty], 4)
        });
        TileNeighborhood::new(tiles, bounds, bounds).unwrap()
    }

    fn make_buffers(pass_stride: usize) -> [Vec<f32>; 9] {
        std::array::from_fn(|i| vec![i as f32; 16 * pass_stride])
    }

    #[test]
    fn test_tile_index_at_boundaries() {
        let buffers = make_buffers(2);
        let n = grid_neighborhood(&buffers);
        assert_eq!(n.tile_index(0, 0), 0);
        assert_eq!(n.tile_index(3, 3), 0);
        assert_eq!(n.tile_index(4, 3), 1);
        assert_eq!(n.tile_index(8, 3), 2);
        assert_eq!(n.tile_index(4, 4), CENTER_TILE);
        assert_eq!(n.tile_index(7, 7), CENTER_TILE);
        assert_eq!(n.tile_index(11, 11), 8);
        assert_eq!(n.tile_index(0, 8), 6);
    }

    #[test]
    fn test_resolve_uses_tile_offset_and_stride() {
        let buffers = make_buffers(3);
        let n = grid_neighborhood(&buffers);
        let p = n.resolve(5, 6, 3);
        assert_eq!(p.tile, CENTER_TILE);
        // Local pixel (1, 2) of a 4-wide tile.
        assert_eq!(p.record, (2 * 4 + 1) * 3);
        assert!((n.read(p, 0) - 4.0).abs() < f32::EPSILON);

        let corner = n.resolve(11, 0, 3);
        assert_eq!(corner.tile, 2);
        assert_eq!(corner.record, 3 * 3);
    }

    #[test]
    fn test_tile_rect() {
        let buffers = make_buffers(1);
        let n = grid_neighborhood(&buffers);
        assert_eq!(n.tile_rect(CENTER_TILE), Rect::new(4, 4, 8, 8));
        assert_eq!(n.tile_rect(2), Rect::new(8, 0, 12, 4));
    }

    #[test]
    fn test_rejects_non_monotonic_bounds() {
        let tiles = [TileBuffer::EMPTY; 9];
        let result = TileNeighborhood::new(tiles, [0, 5, 4, 8], [0, 1, 2, 3]);
        assert!(matches!(result, Err(Error::InvalidTileBounds { .. })));
    }

    #[test]
    fn test_validate_covers_full_grid() {
        let buffers = make_buffers(2);
        let n = grid_neighborhood(&buffers);
        assert!(n.validate_covers(&Rect::new(0, 0, 12, 12), 2, 1).is_ok());
    }

    #[test]
    fn test_validate_covers_reports_missing_tile() {
        let data = vec![0.0f32; 16 * 2];
        let mut tiles: [TileBuffer<'_>; 9] = [TileBuffer::EMPTY; 9];
        tiles[CENTER_TILE] = TileBuffer::for_tile(&data, 4, 4, 4);
        let n = TileNeighborhood::new(tiles, [0, 4, 8, 12], [0, 4, 8, 12]).unwrap();

        assert!(n.validate_covers(&Rect::new(4, 4, 8, 8), 2, 1).is_ok());
        let err = n.validate_covers(&Rect::new(2, 4, 8, 8), 2, 1).unwrap_err();
        assert!(matches!(err, Error::MissingTile { index: 3, .. }));
    }

    #[test]
    fn test_validate_covers_reports_short_buffer() {
        // Room for 15 of 16 pixels.
        let data = vec![0.0f32; 15 * 2];
        let tile = TileBuffer::for_tile(&data, 0, 0, 4);
        let n = TileNeighborhood::single(tile, Rect::from_size(4, 4));
        assert!(n.validate_covers(&Rect::from_size(4, 3), 2, 1).is_ok());
        assert!(matches!(
            n.validate_covers(&Rect::from_size(4, 4), 2, 1),
            Err(Error::TileTooSmall { index: CENTER_TILE, .. })
        ));
    }

    #[test]
    fn test_single_resolves_everything_to_center() {
        let data = vec![0.0f32; 6 * 5];
        let tile = TileBuffer::for_tile(&data, 0, 0, 6);
        let n = TileNeighborhood::single(tile, Rect::from_size(6, 5));
        for y in 0..5 {
            for x in 0..6 {
                assert_eq!(n.tile_index(x, y), CENTER_TILE);
            }
        }
    }
}
