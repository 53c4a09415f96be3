// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Surface bookkeeping tests

use crate::core::cache::surface::{DirtyRect, Surface, SurfaceKind};
use crate::core::memory::{Psm, Rect};

fn source_64x32() -> Surface {
    // Ct32 blocks are 8x8, so this surface is 8x4 blocks.
    Surface::new(SurfaceKind::Source, 0, 1, Psm::Ct32, 64, 32)
}

#[test]
fn test_block_validity_bitmap() {
    let mut s = source_64x32();
    assert!(!s.is_block_valid(3, 2));
    s.set_block_valid(3, 2);
    assert!(s.is_block_valid(3, 2));
    assert!(!s.is_block_valid(2, 3));
    s.clear_block_valid(3, 2);
    assert!(!s.is_block_valid(3, 2));
}

/// A fresh surface is entirely stale and coalesces into one rectangle.
#[test]
fn test_fresh_surface_is_one_stale_rect() {
    let s = source_64x32();
    assert_eq!(s.stale_rects(8), vec![Rect::new(0, 0, 64, 32)]);

    let mut s = source_64x32();
    s.set_all_valid();
    assert!(s.stale_rects(8).is_empty());
}

/// A single stale block produces its own pixel rectangle.
#[test]
fn test_single_stale_block() {
    let mut s = source_64x32();
    s.set_all_valid();
    s.clear_block_valid(2, 1);
    assert_eq!(s.stale_rects(8), vec![Rect::new(16, 8, 24, 16)]);
}

/// Horizontally adjacent stale blocks merge into one run.
#[test]
fn test_horizontal_run_coalescing() {
    let mut s = source_64x32();
    s.set_all_valid();
    for bx in 1..4 {
        s.clear_block_valid(bx, 2);
    }
    assert_eq!(s.stale_rects(8), vec![Rect::new(8, 16, 32, 24)]);
}

/// Runs with the same horizontal span merge across rows.
#[test]
fn test_vertical_run_coalescing() {
    let mut s = source_64x32();
    s.set_all_valid();
    for by in 1..3 {
        for bx in 2..5 {
            s.clear_block_valid(bx, by);
        }
    }
    assert_eq!(s.stale_rects(8), vec![Rect::new(16, 8, 40, 24)]);
}

/// Too many disjoint ranges collapse into a full refetch.
#[test]
fn test_range_overflow_collapses_to_full() {
    let mut s = source_64x32();
    s.set_all_valid();
    // A checkerboard defeats both merges: every other block of every row.
    for by in 0..4 {
        for bx in (0..8).step_by(2) {
            s.clear_block_valid(bx + (by & 1) as u32, by);
        }
    }
    assert_eq!(s.stale_rects(8), vec![Rect::new(0, 0, 64, 32)]);
}

/// The dirty list collapses to its minimal cover, clipped to the surface.
#[test]
fn test_dirty_coalescing() {
    let mut s = Surface::new(SurfaceKind::RenderTarget, 0, 1, Psm::Ct32, 64, 32);
    assert_eq!(s.coalesced_dirty(), None);
    s.dirty.push(DirtyRect {
        rect: Rect::new(4, 4, 10, 10),
        psm: Psm::Ct32,
    });
    s.dirty.push(DirtyRect {
        rect: Rect::new(40, 2, 80, 8),
        psm: Psm::Ct32,
    });
    assert_eq!(s.coalesced_dirty(), Some(Rect::new(4, 2, 64, 10)));
}

/// Every block of a surface maps to a distinct VRAM block, and the page
/// list covers exactly those blocks.
#[test]
fn test_block_mapping_is_injective() {
    let s = Surface::new(SurfaceKind::Source, 0x40, 2, Psm::Ct32, 128, 64);
    let (nbx, nby) = s.block_dims();
    let mut seen = Vec::new();
    for by in 0..nby {
        for bx in 0..nbx {
            let bn = s.block_at(bx, by);
            assert!(!seen.contains(&bn), "duplicate block {bn}");
            assert!(s.pages.binary_search(&(bn >> 5)).is_ok());
            seen.push(bn);
        }
    }
}

/// `clear_overlapping_blocks` only touches blocks named in the write set.
#[test]
fn test_clear_overlapping_blocks() {
    let mut s = source_64x32();
    s.set_all_valid();
    let hit = vec![s.block_at(0, 0), s.block_at(5, 3)];
    let mut sorted = hit.clone();
    sorted.sort_unstable();
    s.clear_overlapping_blocks(&sorted);
    assert!(!s.is_block_valid(0, 0));
    assert!(!s.is_block_valid(5, 3));
    assert!(s.is_block_valid(1, 0));
    assert!(s.overlaps_blocks(&sorted));
}
