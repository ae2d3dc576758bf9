//! Fan per-pixel work out over rayon lanes fed by a [`WorkPool`].
//!
//! The working rect is treated as one tile split into dispatch groups. Each group
//! gets `lanes_per_group` rayon tasks; a task keeps claiming work from its
//! group's counter until the group is exhausted, so lanes of cheap groups finish
//! early and free their threads for the rest.

use std::marker::PhantomData;

use rayon::prelude::*;

use crate::config::DispatchConfig;
use crate::error::Result;
use crate::rect::Rect;
use crate::work_pool::{GroupGrid, WorkItem, WorkPool};

/// Runs a closure once per (pixel, sample) of a rect.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    rect: Rect,
    samples: u32,
    lanes_per_group: u32,
    grid: GroupGrid,
}

impl Dispatcher {
    pub fn new(rect: Rect, samples: u32, config: &DispatchConfig) -> Result<Self> {
        rect.validate()?;
        config.validate()?;
        let grid = GroupGrid::new(
            rect.width() as u32,
            rect.height() as u32,
            config.group_width,
            config.group_height,
        );
        Ok(Self {
            rect,
            samples,
            lanes_per_group: config.lanes_per_group,
            grid,
        })
    }

    /// One work item per pixel.
    pub fn per_pixel(rect: Rect, config: &DispatchConfig) -> Result<Self> {
        Self::new(rect, 1, config)
    }

    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn grid(&self) -> &GroupGrid {
        &self.grid
    }

    /// Call `f` for every work item. Items of different groups run concurrently,
    /// items are claimed in no particular order.
    pub fn for_each<F>(&self, f: F)
    where
        F: Fn(WorkItem) + Sync + Send,
    {
        let pool = WorkPool::new(self.grid, self.samples);
        let lanes_per_group = self.lanes_per_group as usize;
        let lanes = self.grid.group_count() * lanes_per_group;
        let origin = self.rect.min();

        tracing::debug!(
            rect = ?self.rect,
            samples = self.samples,
            groups = self.grid.group_count(),
            lanes,
            "Dispatching work pool"
        );

        (0..lanes).into_par_iter().for_each(|lane| {
            let group = self.grid.group(lane / lanes_per_group);
            while let Some(item) = pool.next_item(group, origin) {
                f(item);
            }
        });
    }
}

/// Mutable f32 buffer shared by lanes that write disjoint indices.
///
/// SAFETY: relies on the dispatch partition, each index is written by at most one
/// work item at a time. Per-pixel dispatches with one sample satisfy this.
pub struct DisjointOutput<'a> {
    ptr: *mut f32,
    len: usize,
    _marker: PhantomData<&'a mut [f32]>,
}

unsafe impl Send for DisjointOutput<'_> {}
unsafe impl Sync for DisjointOutput<'_> {}

impl<'a> DisjointOutput<'a> {
    pub fn new(buffer: &'a mut [f32]) -> Self {
        Self {
            ptr: buffer.as_mut_ptr(),
            len: buffer.len(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `value` at `index`.
    ///
    /// # Safety
    /// No other thread may access `index` concurrently.
    #[inline]
    pub unsafe fn write(&self, index: usize, value: f32) {
        assert!(index < self.len, "index {index} out of bounds ({})", self.len);
        unsafe {
            *self.ptr.add(index) = value;
        }
    }
}
