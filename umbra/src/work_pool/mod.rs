//! Work-stealing distribution of per-pixel work.
//!
//! A tile is split into rectangular dispatch groups. Every group owns one atomic
//! counter; lanes of the group claim work by post-incrementing it and stop once
//! the returned index reaches the group's total. A work index encodes both the
//! sample number and the pixel inside the group:
//!
//! ```text
//! sample = index / pixels_in_group
//! pixel  = index % pixels_in_group   (row-major inside the covered extent)
//! ```
//!
//! Groups on the right and bottom edge of a tile may only partially overlap it;
//! they cover `tile % group` pixels along that axis (the full group extent when
//! the tile divides evenly).

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{IVec2, UVec2};

/// Position of a dispatch group in the group grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId {
    pub x: u32,
    pub y: u32,
}

impl GroupId {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Partition of a tile into dispatch groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupGrid {
    pub tile_width: u32,
    pub tile_height: u32,
    pub group_width: u32,
    pub group_height: u32,
}

impl GroupGrid {
    pub fn new(tile_width: u32, tile_height: u32, group_width: u32, group_height: u32) -> Self {
        debug_assert!(group_width > 0 && group_height > 0);
        Self {
            tile_width,
            tile_height,
            group_width,
            group_height,
        }
    }

    #[inline]
    pub fn groups_x(&self) -> u32 {
        self.tile_width.div_ceil(self.group_width)
    }

    #[inline]
    pub fn groups_y(&self) -> u32 {
        self.tile_height.div_ceil(self.group_height)
    }

    pub fn group_count(&self) -> usize {
        self.groups_x() as usize * self.groups_y() as usize
    }

    #[inline]
    pub fn flat_index(&self, group: GroupId) -> usize {
        debug_assert!(group.x < self.groups_x() && group.y < self.groups_y());
        group.y as usize * self.groups_x() as usize + group.x as usize
    }

    pub fn group(&self, flat_index: usize) -> GroupId {
        let groups_x = self.groups_x() as usize;
        GroupId::new((flat_index % groups_x) as u32, (flat_index / groups_x) as u32)
    }

    /// Upper-left tile pixel of `group`.
    pub fn group_origin(&self, group: GroupId) -> UVec2 {
        UVec2::new(group.x * self.group_width, group.y * self.group_height)
    }

    /// Pixels of the tile actually covered by `group` along each axis.
    pub fn covered_extent(&self, group: GroupId) -> UVec2 {
        UVec2::new(
            covered_along(group.x, self.groups_x(), self.tile_width, self.group_width),
            covered_along(group.y, self.groups_y(), self.tile_height, self.group_height),
        )
    }

    pub fn pixels_in_group(&self, group: GroupId) -> u64 {
        let extent = self.covered_extent(group);
        extent.x as u64 * extent.y as u64
    }

    /// Work items of `group` when every covered pixel is processed `samples` times.
    pub fn total_work(&self, group: GroupId, samples: u32) -> u64 {
        self.pixels_in_group(group) * samples as u64
    }
}

fn covered_along(index: u32, count: u32, extent: u32, group: u32) -> u32 {
    if index + 1 == count {
        match extent % group {
            0 => group,
            remainder => remainder,
        }
    } else {
        group
    }
}

/// One claimed unit of work, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub sample: u32,
    /// Pixel relative to the tile origin.
    pub tile_pixel: UVec2,
    /// Pixel in image space.
    pub pixel: IVec2,
}

impl WorkItem {
    /// Decode `work_index` claimed from `group` of a tile starting at `tile_origin`.
    pub fn decode(grid: &GroupGrid, group: GroupId, work_index: u64, tile_origin: IVec2) -> Self {
        let extent = grid.covered_extent(group);
        let pixels = extent.x as u64 * extent.y as u64;
        debug_assert!(pixels > 0);

        let sample = (work_index / pixels) as u32;
        let local_index = (work_index % pixels) as u32;
        let local = UVec2::new(local_index % extent.x, local_index / extent.x);
        let tile_pixel = grid.group_origin(group) + local;

        Self {
            sample,
            tile_pixel,
            pixel: tile_origin + tile_pixel.as_ivec2(),
        }
    }
}

/// Shared per-group counters of one dispatch.
///
/// Counters are 64-bit, so lanes that keep asking after exhaustion cannot wrap
/// them within a dispatch.
#[derive(Debug)]
pub struct WorkPool {
    grid: GroupGrid,
    samples: u32,
    counters: Box<[AtomicU64]>,
}

impl WorkPool {
    pub fn new(grid: GroupGrid, samples: u32) -> Self {
        let counters = (0..grid.group_count()).map(|_| AtomicU64::new(0)).collect();
        Self {
            grid,
            samples,
            counters,
        }
    }

    pub fn grid(&self) -> &GroupGrid {
        &self.grid
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Claim the next work index of `group`, `None` once the group is exhausted.
    #[inline]
    pub fn get_next_work(&self, group: GroupId) -> Option<u64> {
        let counter = &self.counters[self.grid.flat_index(group)];
        let index = counter.fetch_add(1, Ordering::Relaxed);
        (index < self.grid.total_work(group, self.samples)).then_some(index)
    }

    /// Claim and decode the next work item of `group`.
    #[inline]
    pub fn next_item(&self, group: GroupId, tile_origin: IVec2) -> Option<WorkItem> {
        self.get_next_work(group)
            .map(|index| WorkItem::decode(&self.grid, group, index, tile_origin))
    }

    /// Rewind every counter so the pool can feed another dispatch.
    pub fn reset(&mut self) {
        for counter in self.counters.iter_mut() {
            *counter.get_mut() = 0;
        }
    }
}
