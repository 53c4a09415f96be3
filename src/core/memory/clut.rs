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

//! Palette (CLUT) decode and caching
//!
//! Indexed textures resolve through a color lookup table that itself lives in
//! VRAM under one of the color formats. Decoding it per texel would be
//! ruinous, so the decoded table is cached and only rebuilt when the palette
//! descriptor changes or the cache is explicitly invalidated after a VRAM
//! write over the palette region.
//!
//! The resident storage mode (CSM1) does not lay entries out linearly: a
//! 16-entry palette occupies an 8x2 pixel region, and a 256-entry palette a
//! 16x16 region with bits 3 and 4 of the entry index swapped. CSA shifts
//! the palette within the resident region in steps of 16 entries, so
//! several small palettes can share one base pointer. CSM2 reads entries
//! sequentially from an arbitrary row.

use crate::core::error::{GsError, Result};

use super::{swizzle, LocalMemory, Psm, Rect, Texa};

/// Palette storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Csm {
    /// Resident layout (swizzled region at the palette base)
    Csm1,
    /// Sequential layout at an arbitrary position; `cbw` is the buffer width
    /// in 64-pixel units, `(cou, cov)` the start in 16-pixel/1-pixel units
    Csm2 { cbw: u32, cou: u32, cov: u32 },
}

/// Palette descriptor, the cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClutDesc {
    /// Palette base block pointer
    pub cbp: u32,
    /// Palette storage format (Ct32, Ct16 or Ct16s)
    pub cpsm: Psm,
    /// Entry offset in 16-entry steps
    pub csa: u8,
    /// Storage mode
    pub csm: Csm,
    /// Entry count, 16 or 256, from the texture format
    pub count: u16,
}

impl ClutDesc {
    /// The VRAM rectangle the palette occupies, plus the buffer width its
    /// pixel positions are computed with
    ///
    /// The rectangle bounds every entry position, so a write overlapping it
    /// may have changed the decoded table.
    pub fn extent(&self) -> (Rect, u32) {
        match self.csm {
            Csm::Csm2 { cbw, cou, cov } => (
                Rect::new(
                    (cou * 16) as i32,
                    cov as i32,
                    (cou * 16 + self.count as u32) as i32,
                    cov as i32 + 1,
                ),
                cbw.max(1),
            ),
            Csm::Csm1 => {
                let mut r = Rect::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN);
                for i in 0..self.count as u32 {
                    let (x, y) = entry_position(self, i);
                    r.x0 = r.x0.min(x as i32);
                    r.y0 = r.y0.min(y as i32);
                    r.x1 = r.x1.max(x as i32 + 1);
                    r.y1 = r.y1.max(y as i32 + 1);
                }
                (r, 1)
            }
        }
    }
}

/// Cached decoded palette
///
/// `lut()` is always 256 entries; a 16-entry palette fills the first 16 and
/// leaves the rest untouched, which is harmless because a 4-bit texture can
/// only produce indices 0..16.
pub struct ClutCache {
    lut: [u32; 256],
    key: Option<(ClutDesc, Texa)>,
}

impl Default for ClutCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClutCache {
    pub fn new() -> ClutCache {
        ClutCache {
            lut: [0; 256],
            key: None,
        }
    }

    /// The decoded lookup table
    #[inline]
    pub fn lut(&self) -> &[u32; 256] {
        &self.lut
    }

    /// Force a reload on the next [`update`](Self::update)
    ///
    /// Called when a VRAM write lands on the cached palette's pages.
    pub fn invalidate(&mut self) {
        self.key = None;
    }

    /// Descriptor of the currently decoded palette, if any
    pub fn cached_desc(&self) -> Option<ClutDesc> {
        self.key.map(|(d, _)| d)
    }

    /// Decoded palette bytes for save-state serialization
    pub fn palette(&self) -> Vec<u8> {
        self.lut.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    /// Restore the decoded palette from save-state bytes
    pub fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != 1024 {
            return Err(GsError::SaveState(format!(
                "palette snapshot is {} bytes, expected 1024",
                bytes.len()
            )));
        }
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            self.lut[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        self.key = None;
        Ok(())
    }

    /// Reload the lookup table if `desc` or `texa` differ from the cached key
    ///
    /// Returns true when a reload happened.
    pub fn update(&mut self, desc: ClutDesc, texa: Texa, mem: &LocalMemory) -> bool {
        if self.key == Some((desc, texa)) {
            return false;
        }
        log::debug!(
            "clut reload cbp={:#x} cpsm={:?} csa={} count={}",
            desc.cbp,
            desc.cpsm,
            desc.csa,
            desc.count
        );
        // CSM1 regions are at most 16 pixels wide, so a unit buffer width is
        // enough; CSM2 uses the width its descriptor names.
        let bw = match desc.csm {
            Csm::Csm1 => 1,
            Csm::Csm2 { cbw, .. } => cbw.max(1),
        };
        for i in 0..desc.count as u32 {
            let (x, y) = entry_position(&desc, i);
            self.lut[i as usize] = match desc.cpsm {
                Psm::Ct32 => mem.read_word(swizzle::pixel_address_32(x, y, desc.cbp, bw)),
                Psm::Ct16 => {
                    texa.expand16(mem.read_hword(swizzle::pixel_address_16(x, y, desc.cbp, bw)))
                }
                _ => texa.expand16(mem.read_hword(swizzle::pixel_address_16s(x, y, desc.cbp, bw))),
            };
        }
        self.key = Some((desc, texa));
        true
    }
}

/// Source pixel position of entry `i` under the descriptor's storage mode
fn entry_position(desc: &ClutDesc, i: u32) -> (u32, u32) {
    match desc.csm {
        Csm::Csm1 => {
            // Resident storage holds 32 groups of 16 entries; CSA picks the
            // group the palette starts at.
            let j = (i + desc.csa as u32 * 16) & 0x1ff;
            if desc.count <= 16 {
                (j & 7, j >> 3)
            } else {
                // Entry index bits 3 and 4 swap positions in storage.
                let j = (j & !0x18) | ((j & 8) << 1) | ((j & 16) >> 1);
                (j & 15, j >> 4)
            }
        }
        Csm::Csm2 { cou, cov, .. } => (cou * 16 + i, cov),
    }
}
