//! Tests for work-stealing distribution.

use std::collections::HashSet;
use std::sync::Mutex;

use super::*;

// ---------------------------------------------------------------------------
// Group sizing
// ---------------------------------------------------------------------------

#[test]
fn test_border_group_covers_remainder() {
    let grid = GroupGrid::new(10, 4, 4, 4);
    assert_eq!(grid.groups_x(), 3);
    assert_eq!(grid.covered_extent(GroupId::new(0, 0)).x, 4);
    assert_eq!(grid.covered_extent(GroupId::new(1, 0)).x, 4);
    assert_eq!(grid.covered_extent(GroupId::new(2, 0)).x, 2);
}

#[test]
fn test_evenly_divided_tile_keeps_full_border_group() {
    let grid = GroupGrid::new(8, 12, 4, 4);
    assert_eq!(grid.covered_extent(GroupId::new(1, 2)), UVec2::new(4, 4));
}

#[test]
fn test_corner_group_uses_both_remainders() {
    let grid = GroupGrid::new(10, 7, 4, 4);
    assert_eq!(grid.covered_extent(GroupId::new(2, 1)), UVec2::new(2, 3));
    assert_eq!(grid.pixels_in_group(GroupId::new(2, 1)), 6);
}

#[test]
fn test_total_work_scales_with_samples() {
    let grid = GroupGrid::new(10, 7, 4, 4);
    assert_eq!(grid.total_work(GroupId::new(0, 0), 3), 48);
    assert_eq!(grid.total_work(GroupId::new(2, 1), 3), 18);
}

#[test]
fn test_group_covers_tile_exactly() {
    let grid = GroupGrid::new(13, 9, 4, 3);
    let covered: u64 = (0..grid.group_count())
        .map(|i| grid.pixels_in_group(grid.group(i)))
        .sum();
    assert_eq!(covered, 13 * 9);
}

#[test]
fn test_flat_index_round_trip() {
    let grid = GroupGrid::new(10, 8, 4, 4);
    for i in 0..grid.group_count() {
        assert_eq!(grid.flat_index(grid.group(i)), i);
    }
}

// ---------------------------------------------------------------------------
// Claiming
// ---------------------------------------------------------------------------

#[test]
fn test_exhaustion_sequential() {
    let grid = GroupGrid::new(10, 4, 4, 4);
    let group = GroupId::new(2, 0);
    let pool = WorkPool::new(grid, 2);
    let total = grid.total_work(group, 2);
    assert_eq!(total, 16);

    for expected in 0..total {
        assert_eq!(pool.get_next_work(group), Some(expected));
    }
    for _ in 0..5 {
        assert_eq!(pool.get_next_work(group), None);
    }
}

#[test]
fn test_groups_have_independent_counters() {
    let grid = GroupGrid::new(8, 4, 4, 4);
    let pool = WorkPool::new(grid, 1);
    assert_eq!(pool.get_next_work(GroupId::new(0, 0)), Some(0));
    assert_eq!(pool.get_next_work(GroupId::new(0, 0)), Some(1));
    assert_eq!(pool.get_next_work(GroupId::new(1, 0)), Some(0));
}

#[test]
fn test_exhaustion_concurrent_lanes() {
    let grid = GroupGrid::new(37, 5, 16, 8);
    let group = GroupId::new(2, 0);
    let samples = 7;
    let total = grid.total_work(group, samples);
    let pool = WorkPool::new(grid, samples);
    let claimed = Mutex::new(Vec::new());
    let refused = Mutex::new(0u32);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let mut mine = Vec::new();
                while let Some(index) = pool.get_next_work(group) {
                    mine.push(index);
                }
                claimed.lock().unwrap().extend(mine);
                *refused.lock().unwrap() += 1;
            });
        }
    });

    let mut claimed = claimed.into_inner().unwrap();
    claimed.sort_unstable();
    assert_eq!(claimed, (0..total).collect::<Vec<_>>());
    assert_eq!(refused.into_inner().unwrap(), 8);
    assert_eq!(pool.get_next_work(group), None);
}

#[test]
fn test_reset_rewinds_counters() {
    let grid = GroupGrid::new(4, 4, 4, 4);
    let group = GroupId::new(0, 0);
    let mut pool = WorkPool::new(grid, 1);
    while pool.get_next_work(group).is_some() {}
    pool.reset();
    assert_eq!(pool.get_next_work(group), Some(0));
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[test]
fn test_decode_sample_and_pixel() {
    let grid = GroupGrid::new(10, 8, 4, 4);
    let group = GroupId::new(2, 1);
    // Covered extent is 2x4, 8 pixels per sample.
    let item = WorkItem::decode(&grid, group, 8 * 3 + 5, IVec2::new(100, 200));
    assert_eq!(item.sample, 3);
    assert_eq!(item.tile_pixel, UVec2::new(8 + 1, 4 + 2));
    assert_eq!(item.pixel, IVec2::new(109, 206));
}

#[test]
fn test_decode_visits_every_pixel_sample_once() {
    let grid = GroupGrid::new(10, 7, 4, 4);
    let samples = 3;
    let origin = IVec2::new(-5, 11);
    let mut seen = HashSet::new();

    for i in 0..grid.group_count() {
        let group = grid.group(i);
        for work in 0..grid.total_work(group, samples) {
            let item = WorkItem::decode(&grid, group, work, origin);
            assert!(item.tile_pixel.x < 10 && item.tile_pixel.y < 7);
            assert_eq!(item.pixel, origin + item.tile_pixel.as_ivec2());
            assert!(seen.insert((item.sample, item.tile_pixel)), "duplicate {item:?}");
        }
    }
    assert_eq!(seen.len(), 10 * 7 * 3);
}

#[test]
fn test_next_item_decodes_claims() {
    let grid = GroupGrid::new(4, 4, 4, 4);
    let pool = WorkPool::new(grid, 1);
    let group = GroupId::new(0, 0);
    let first = pool.next_item(group, IVec2::ZERO).unwrap();
    let second = pool.next_item(group, IVec2::ZERO).unwrap();
    assert_eq!(first.pixel, IVec2::new(0, 0));
    assert_eq!(second.pixel, IVec2::new(1, 0));
}
