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

//! Cached surface entries
//!
//! A surface is a linearized RGBA view of a VRAM region under one format:
//! either a texture source or a render/depth target. Sources track validity
//! per VRAM block so a small VRAM write only refetches the blocks it hit;
//! targets track dirty rectangles and resynchronize lazily when read.

use std::sync::Arc;

use crate::core::memory::{Psm, Rect};

/// What a cache entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceKind {
    Source,
    RenderTarget,
    DepthStencil,
}

/// A VRAM region invalidated by a write, in the writer's format
#[derive(Debug, Clone, Copy)]
pub struct DirtyRect {
    pub rect: Rect,
    pub psm: Psm,
}

/// One cached surface
pub struct Surface {
    pub kind: SurfaceKind,
    pub bp: u32,
    pub bw: u32,
    pub psm: Psm,
    pub w: u32,
    pub h: u32,
    /// For indexed sources, the palette generation baked into `data`
    pub clut_gen: u32,
    /// Linear RGBA texels, `w * h`; shared with in-flight texture views
    pub data: Arc<Vec<u32>>,
    /// Per-block validity bitmap, row-major over the surface's blocks
    /// (sources only)
    pub valid: Vec<u64>,
    /// Pending VRAM changes not yet reflected in `data` (targets only)
    pub dirty: Vec<DirtyRect>,
    /// Draw cycles since last touch
    pub age: u32,
    /// VRAM pages this surface spans, sorted
    pub pages: Vec<u32>,
}

impl Surface {
    /// Blocks per row / number of block rows for this surface
    pub fn block_dims(&self) -> (u32, u32) {
        let (bsw, bsh) = self.psm.descriptor().bs;
        (self.w.div_ceil(bsw), self.h.div_ceil(bsh))
    }

    pub fn new(kind: SurfaceKind, bp: u32, bw: u32, psm: Psm, w: u32, h: u32) -> Surface {
        let mut s = Surface {
            kind,
            bp,
            bw,
            psm,
            w,
            h,
            clut_gen: 0,
            data: Arc::new(vec![0; (w * h) as usize]),
            valid: Vec::new(),
            dirty: Vec::new(),
            age: 0,
            pages: Vec::new(),
        };
        let (nbx, nby) = s.block_dims();
        s.valid = vec![0u64; ((nbx * nby) as usize).div_ceil(64)];
        s.pages = s.compute_pages();
        s
    }

    /// VRAM block number of the surface-local block (bx, by)
    #[inline]
    pub fn block_at(&self, bx: u32, by: u32) -> u32 {
        let (bsw, bsh) = self.psm.descriptor().bs;
        (self.psm.descriptor().bn)(bx * bsw, by * bsh, self.bp, self.bw) & 0x3fff
    }

    fn compute_pages(&self) -> Vec<u32> {
        let (nbx, nby) = self.block_dims();
        let mut pages: Vec<u32> = (0..nby)
            .flat_map(|by| (0..nbx).map(move |bx| (bx, by)))
            .map(|(bx, by)| self.block_at(bx, by) >> 5)
            .collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    #[inline]
    pub fn is_block_valid(&self, bx: u32, by: u32) -> bool {
        let (nbx, _) = self.block_dims();
        let bit = (by * nbx + bx) as usize;
        self.valid[bit / 64] & (1 << (bit % 64)) != 0
    }

    #[inline]
    pub fn set_block_valid(&mut self, bx: u32, by: u32) {
        let (nbx, _) = self.block_dims();
        let bit = (by * nbx + bx) as usize;
        self.valid[bit / 64] |= 1 << (bit % 64);
    }

    #[inline]
    pub fn clear_block_valid(&mut self, bx: u32, by: u32) {
        let (nbx, _) = self.block_dims();
        let bit = (by * nbx + bx) as usize;
        self.valid[bit / 64] &= !(1 << (bit % 64));
    }

    /// Drop validity for every local block whose VRAM block is in `blocks`
    ///
    /// `blocks` is a sorted slice of block numbers hit by a write.
    pub fn clear_overlapping_blocks(&mut self, blocks: &[u32]) {
        let (nbx, nby) = self.block_dims();
        for by in 0..nby {
            for bx in 0..nbx {
                if blocks.binary_search(&self.block_at(bx, by)).is_ok() {
                    self.clear_block_valid(bx, by);
                }
            }
        }
    }

    /// Whether any VRAM block of this surface is in `blocks`
    pub fn overlaps_blocks(&self, blocks: &[u32]) -> bool {
        let (nbx, nby) = self.block_dims();
        for by in 0..nby {
            for bx in 0..nbx {
                if blocks.binary_search(&self.block_at(bx, by)).is_ok() {
                    return true;
                }
            }
        }
        false
    }

    /// Pixel rectangle of the surface-local block (bx, by), clipped to the
    /// surface
    pub fn block_rect(&self, bx: u32, by: u32) -> Rect {
        let (bsw, bsh) = self.psm.descriptor().bs;
        Rect::new(
            (bx * bsw) as i32,
            (by * bsh) as i32,
            ((bx + 1) * bsw).min(self.w) as i32,
            ((by + 1) * bsh).min(self.h) as i32,
        )
    }

    /// The rectangles of stale blocks, coalesced
    ///
    /// Horizontally adjacent stale blocks merge into runs and vertically
    /// aligned runs merge into taller rectangles. More than `max_ranges`
    /// disjoint rectangles collapses into one full-surface refetch.
    pub fn stale_rects(&self, max_ranges: usize) -> Vec<Rect> {
        let (nbx, nby) = self.block_dims();
        let mut rects: Vec<Rect> = Vec::new();
        for by in 0..nby {
            let mut bx = 0;
            while bx < nbx {
                if self.is_block_valid(bx, by) {
                    bx += 1;
                    continue;
                }
                let start = bx;
                while bx < nbx && !self.is_block_valid(bx, by) {
                    bx += 1;
                }
                let run = self.block_rect(start, by).union(&self.block_rect(bx - 1, by));
                // Merge with a rect from the previous row sharing the x span.
                if let Some(prev) = rects
                    .iter_mut()
                    .find(|r| r.x0 == run.x0 && r.x1 == run.x1 && r.y1 == run.y0)
                {
                    prev.y1 = run.y1;
                } else {
                    rects.push(run);
                }
            }
        }
        if rects.len() > max_ranges {
            return vec![Rect::new(0, 0, self.w as i32, self.h as i32)];
        }
        rects
    }

    /// Mark every block valid
    pub fn set_all_valid(&mut self) {
        for w in &mut self.valid {
            *w = u64::MAX;
        }
    }

    /// Minimal rectangle covering the pending dirty list, if any
    pub fn coalesced_dirty(&self) -> Option<Rect> {
        let mut it = self.dirty.iter();
        let first = it.next()?;
        let mut acc = first.rect;
        for d in it {
            acc = acc.union(&d.rect);
        }
        Some(acc.intersect(&Rect::new(0, 0, self.w as i32, self.h as i32)))
    }
}
