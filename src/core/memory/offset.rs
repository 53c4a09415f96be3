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

//! Cached offset tables for hot addressing loops
//!
//! Calling the swizzle functions per pixel costs two table walks and a handful
//! of shifts each time. For a fixed `(bp, bw, psm)` triple the address
//! decomposes into a per-row base plus a column delta that only depends on
//! `x` and the row's position inside a block, so a draw can precompute both
//! tables once and turn per-pixel addressing into two array lookups and an
//! add. Offsets are cached per triple because frame, depth and texture
//! descriptors repeat heavily across draws.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::psm::Psm;

/// Maximum addressable surface height in pixels
pub const MAX_ROWS: usize = 2048;

/// Maximum addressable surface width in pixels
pub const MAX_COLS: usize = 2048;

/// Precomputed addressing for one `(bp, bw, psm)` triple
///
/// `pixel_address(x, y)` equals the format's swizzle function exactly; the
/// column deltas are signed because the depth block tables put later blocks
/// before earlier ones inside a page.
pub struct GsOffset {
    psm: Psm,
    bp: u32,
    bw: u32,
    /// `row[y]` is the address of pixel (0, y)
    row: Box<[u32]>,
    /// `col[(y & col_mask) * MAX_COLS + x]` is the delta from (0, y) to (x, y)
    col: Box<[i32]>,
    col_mask: u32,
}

impl GsOffset {
    fn build(bp: u32, bw: u32, psm: Psm) -> GsOffset {
        let desc = psm.descriptor();
        let pa = desc.pa;

        // The column delta repeats with the block-row period in y.
        let col_rows = desc.bs.1 as usize;

        let mut row = vec![0u32; MAX_ROWS].into_boxed_slice();
        for (y, r) in row.iter_mut().enumerate() {
            *r = pa(0, y as u32, bp, bw);
        }

        let mut col = vec![0i32; col_rows * MAX_COLS].into_boxed_slice();
        for cy in 0..col_rows {
            let base = pa(0, cy as u32, bp, bw);
            for x in 0..MAX_COLS {
                col[cy * MAX_COLS + x] = pa(x as u32, cy as u32, bp, bw) as i32 - base as i32;
            }
        }

        GsOffset {
            psm,
            bp,
            bw,
            row,
            col,
            col_mask: col_rows as u32 - 1,
        }
    }

    #[inline]
    pub fn psm(&self) -> Psm {
        self.psm
    }

    #[inline]
    pub fn bp(&self) -> u32 {
        self.bp
    }

    #[inline]
    pub fn bw(&self) -> u32 {
        self.bw
    }

    /// Swizzled address of (x, y) in pixel units of the format
    #[inline]
    pub fn pixel_address(&self, x: u32, y: u32) -> u32 {
        let base = self.row[y as usize];
        let delta = self.col[((y & self.col_mask) as usize) * MAX_COLS + x as usize];
        (base as i32 + delta) as u32
    }

    /// Row base and the column slice for `y`, for per-scanline loops
    #[inline]
    pub fn row_cols(&self, y: u32) -> (u32, &[i32]) {
        let start = ((y & self.col_mask) as usize) * MAX_COLS;
        (self.row[y as usize], &self.col[start..start + MAX_COLS])
    }

    /// Block number of the block containing (x, y)
    #[inline]
    pub fn block_number(&self, x: u32, y: u32) -> u32 {
        (self.psm.descriptor().bn)(x, y, self.bp, self.bw)
    }
}

/// Offset-table cache keyed by `(bp, bw, psm)`
///
/// Entries are shared via `Arc` so rasterizer workers can hold them across a
/// draw without touching the map.
#[derive(Default)]
pub struct OffsetCache {
    map: Mutex<HashMap<(u32, u32, u8), Arc<GsOffset>>>,
}

impl OffsetCache {
    pub fn new() -> OffsetCache {
        OffsetCache::default()
    }

    /// Fetch or build the offset tables for a triple
    pub fn get(&self, bp: u32, bw: u32, psm: Psm) -> Arc<GsOffset> {
        let key = (bp, bw, psm.raw());
        let mut map = self.map.lock().expect("offset cache lock poisoned");
        map.entry(key)
            .or_insert_with(|| {
                log::trace!("building offset tables bp={bp:#x} bw={bw} psm={psm:?}");
                Arc::new(GsOffset::build(bp, bw, psm))
            })
            .clone()
    }
}
