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

//! Texture and target cache
//!
//! Linearizing a swizzled texture on every draw would dwarf the draw itself,
//! so decoded views are cached in an arena and invalidated at block
//! granularity when VRAM changes underneath them. Entries are addressed by
//! stable ids (arena index plus generation) rather than pointers, and a
//! page-granularity reverse index bounds every invalidation walk to the
//! surfaces that can possibly care.
//!
//! [`invalidate_video_mem`](TextureCache::invalidate_video_mem) is the only
//! path that makes a cached view stale; whoever writes VRAM must route the
//! written region through it.

use std::sync::Arc;

pub mod surface;

#[cfg(test)]
mod tests;

pub use surface::{DirtyRect, Surface, SurfaceKind};

use crate::core::memory::{psm, LocalMemory, Psm, Rect, Texa, PAGE_COUNT};
use crate::core::gpu::raster::{BufferDesc, TexDesc};

/// Stale ranges tolerated per source update before refetching everything
pub const MAX_STALE_RANGES: usize = 8;

/// Draw cycles an untouched entry survives
pub const AGE_MAX: u32 = 30;

/// Survival limit once the arena exceeds its soft capacity
pub const AGE_MAX_PRESSURE: u32 = 4;

const SOFT_CAP: usize = 64;
const HARD_CAP: usize = 512;

/// Stable handle to a cache entry
///
/// The generation makes a stale handle detectable after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId {
    index: u32,
    gen: u32,
}

struct Slot {
    gen: u32,
    surface: Option<Surface>,
}

/// Arena of cached surfaces with a page-level reverse index
pub struct TextureCache {
    slots: Vec<Slot>,
    free: Vec<u32>,
    page_index: Vec<Vec<SurfaceId>>,
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureCache {
    pub fn new() -> TextureCache {
        TextureCache {
            slots: Vec::new(),
            free: Vec::new(),
            page_index: vec![Vec::new(); PAGE_COUNT],
        }
    }

    /// Entries currently alive
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow an entry; `None` if the id is stale
    pub fn get(&self, id: SurfaceId) -> Option<&Surface> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.surface.as_ref()
    }

    fn get_mut(&mut self, id: SurfaceId) -> Option<&mut Surface> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.gen != id.gen {
            return None;
        }
        slot.surface.as_mut()
    }

    /// Find or build a source view for a texture descriptor
    ///
    /// Returns `None` when the arena is saturated even after pressure
    /// eviction; the caller skips the draw.
    pub fn lookup_source(
        &mut self,
        mem: &LocalMemory,
        clut: &[u32; 256],
        clut_gen: u32,
        texa: Texa,
        desc: &TexDesc,
    ) -> Option<SurfaceId> {
        let needs_pal = desc.psm.descriptor().pal > 0;
        let found = self.find(|s| {
            s.kind == SurfaceKind::Source
                && s.bp == desc.tbp0
                && s.bw == desc.tbw
                && s.psm == desc.psm
                && s.w == desc.tw
                && s.h == desc.th
        });

        let id = match found {
            Some(id) => id,
            None => {
                let s = Surface::new(
                    SurfaceKind::Source,
                    desc.tbp0,
                    desc.tbw,
                    desc.psm,
                    desc.tw,
                    desc.th,
                );
                log::debug!(
                    "source create bp={:#x} psm={:?} {}x{}",
                    desc.tbp0,
                    desc.psm,
                    desc.tw,
                    desc.th
                );
                self.insert(s)?
            }
        };

        {
            let s = self.get_mut(id)?;
            s.age = 0;
            // A palette change invalidates every decoded texel of an
            // indexed source.
            if needs_pal && s.clut_gen != clut_gen {
                for w in &mut s.valid {
                    *w = 0;
                }
                s.clut_gen = clut_gen;
            }
        }
        self.update_source(mem, clut, texa, id);
        Some(id)
    }

    /// Refetch the stale ranges of a source from VRAM
    fn update_source(&mut self, mem: &LocalMemory, clut: &[u32; 256], texa: Texa, id: SurfaceId) {
        let Some(s) = self.get_mut(id) else { return };
        let rects = s.stale_rects(MAX_STALE_RANGES);
        if rects.is_empty() {
            return;
        }
        let (bp, bw, psm, w) = (s.bp, s.bw, s.psm, s.w);
        let off = mem.offset(bp, bw, psm);
        let Some(s) = self.get_mut(id) else { return };
        log::trace!("source resync bp={bp:#x} ranges={}", rects.len());
        {
            let dst = Arc::make_mut(&mut s.data);
            for r in &rects {
                for y in r.y0..r.y1 {
                    let row = y as u32 * w;
                    for x in r.x0..r.x1 {
                        dst[(row + x as u32) as usize] =
                            mem.read_texel(&off, x as u32, y as u32, clut, texa);
                    }
                }
            }
        }
        let (bsw, bsh) = psm.descriptor().bs;
        for r in &rects {
            for by in (r.y0 as u32 / bsh)..(r.y1 as u32).div_ceil(bsh) {
                for bx in (r.x0 as u32 / bsw)..(r.x1 as u32).div_ceil(bsw) {
                    s.set_block_valid(bx, by);
                }
            }
        }
    }

    /// Find or build a target view for a frame or depth descriptor
    ///
    /// Exact match first, then a containment fallback: a compatible-format
    /// target whose page span already covers the base block is reused as-is.
    pub fn lookup_target(
        &mut self,
        mem: &LocalMemory,
        desc: &BufferDesc,
        w: u32,
        h: u32,
        kind: SurfaceKind,
    ) -> Option<SurfaceId> {
        debug_assert!(kind != SurfaceKind::Source);
        if let Some(id) = self.find(|s| {
            s.kind == kind && s.bp == desc.bp && s.bw == desc.bw && s.psm == desc.psm
                && s.w >= w && s.h >= h
        }) {
            if let Some(s) = self.get_mut(id) {
                s.age = 0;
            }
            return Some(id);
        }
        let base_page = desc.bp >> 5;
        if let Some(id) = self.find(|s| {
            s.kind == kind
                && psm::compatible(s.psm, desc.psm)
                && s.pages.binary_search(&base_page).is_ok()
        }) {
            if let Some(s) = self.get_mut(id) {
                s.age = 0;
            }
            return Some(id);
        }

        let mut s = Surface::new(kind, desc.bp, desc.bw, desc.psm, w, h);
        log::debug!("target create bp={:#x} psm={:?} {w}x{h} {kind:?}", desc.bp, desc.psm);
        s.dirty.push(DirtyRect {
            rect: Rect::new(0, 0, w as i32, h as i32),
            psm: desc.psm,
        });
        let id = self.insert(s)?;
        self.resync_target(mem, id);
        Some(id)
    }

    /// Flush a target's pending dirty list and borrow its pixels
    ///
    /// The dirty list coalesces into its minimal covering rectangle and is
    /// refetched from VRAM in one pass.
    pub fn target_pixels(&mut self, mem: &LocalMemory, id: SurfaceId) -> Option<&Surface> {
        self.resync_target(mem, id);
        self.get(id)
    }

    fn resync_target(&mut self, mem: &LocalMemory, id: SurfaceId) {
        let Some(s) = self.get_mut(id) else { return };
        let Some(rect) = s.coalesced_dirty() else { return };
        let (bp, bw, psm, w) = (s.bp, s.bw, s.psm, s.w);
        let off = mem.offset(bp, bw, psm);
        // Expand stored alpha so presentation sees a meaningful channel.
        let texa = Texa { ta0: 0, ta1: 0x80, aem: false };
        let clut = [0u32; 256];
        let Some(s) = self.get_mut(id) else { return };
        log::trace!("target resync bp={bp:#x} rect={rect:?}");
        let dst = Arc::make_mut(&mut s.data);
        for y in rect.y0..rect.y1 {
            let row = y as u32 * w;
            for x in rect.x0..rect.x1 {
                dst[(row + x as u32) as usize] =
                    mem.read_texel(&off, x as u32, y as u32, &clut, texa);
            }
        }
        s.dirty.clear();
    }

    /// Record a VRAM write; the sole trigger for future misses
    ///
    /// Every surface sharing a block with the written region under format
    /// compatibility loses those blocks (sources) or gains a dirty rect
    /// (targets). Invalidating the same region twice is a no-op the second
    /// time.
    pub fn invalidate_video_mem(&mut self, desc: &BufferDesc, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        let (blocks, pages) = blocks_of_rect(desc, rect);
        let mut candidates: Vec<SurfaceId> = pages
            .iter()
            .flat_map(|&p| self.page_index[p as usize].iter().copied())
            .collect();
        candidates.sort_unstable_by_key(|id| (id.index, id.gen));
        candidates.dedup();

        for id in candidates {
            let same_frame = self
                .get(id)
                .map(|s| s.bp == desc.bp && s.bw == desc.bw)
                .unwrap_or(false);
            let Some(s) = self.get_mut(id) else { continue };
            if !psm::compatible(s.psm, desc.psm) {
                continue;
            }
            match s.kind {
                SurfaceKind::Source => s.clear_overlapping_blocks(&blocks),
                SurfaceKind::RenderTarget | SurfaceKind::DepthStencil => {
                    if !s.overlaps_blocks(&blocks) {
                        continue;
                    }
                    let r = if same_frame {
                        rect
                    } else {
                        Rect::new(0, 0, s.w as i32, s.h as i32)
                    };
                    let dup = s
                        .dirty
                        .iter()
                        .any(|d| d.rect == r && d.psm == desc.psm);
                    if !dup {
                        s.dirty.push(DirtyRect { rect: r, psm: desc.psm });
                    }
                }
            }
        }
    }

    /// Advance one draw cycle: age entries and evict the untouched
    pub fn tick(&mut self) {
        let limit = if self.len() > SOFT_CAP { AGE_MAX_PRESSURE } else { AGE_MAX };
        let mut evict = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(s) = &mut slot.surface {
                s.age += 1;
                if s.age > limit {
                    evict.push(SurfaceId { index: i as u32, gen: slot.gen });
                }
            }
        }
        for id in evict {
            log::debug!("evicting surface {:?}", id);
            self.remove(id);
        }
    }

    fn find(&self, pred: impl Fn(&Surface) -> bool) -> Option<SurfaceId> {
        self.slots.iter().enumerate().find_map(|(i, slot)| {
            slot.surface
                .as_ref()
                .filter(|s| pred(s))
                .map(|_| SurfaceId { index: i as u32, gen: slot.gen })
        })
    }

    fn insert(&mut self, s: Surface) -> Option<SurfaceId> {
        if self.len() >= HARD_CAP {
            // Pressure eviction, then give up if still saturated.
            self.tick();
            if self.len() >= HARD_CAP {
                log::warn!("surface arena saturated, allocation failed");
                return None;
            }
        }
        let index = match self.free.pop() {
            Some(i) => i,
            None => {
                self.slots.push(Slot { gen: 0, surface: None });
                (self.slots.len() - 1) as u32
            }
        };
        let id = SurfaceId { index, gen: self.slots[index as usize].gen };
        for &p in &s.pages {
            self.page_index[p as usize].push(id);
        }
        self.slots[index as usize].surface = Some(s);
        Some(id)
    }

    fn remove(&mut self, id: SurfaceId) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else { return };
        if slot.gen != id.gen {
            return;
        }
        if let Some(s) = slot.surface.take() {
            for &p in &s.pages {
                self.page_index[p as usize].retain(|x| *x != id);
            }
        }
        slot.gen = slot.gen.wrapping_add(1);
        self.free.push(id.index);
    }
}

/// Block numbers and pages touched by a write rectangle, both sorted
pub(crate) fn blocks_of_rect(desc: &BufferDesc, rect: Rect) -> (Vec<u32>, Vec<u32>) {
    let d = desc.psm.descriptor();
    let (bsw, bsh) = d.bs;
    let y0 = (rect.y0.max(0) as u32) & !(bsh - 1);
    let x0 = (rect.x0.max(0) as u32) & !(bsw - 1);
    let mut blocks = Vec::new();
    let mut by = y0;
    while (by as i32) < rect.y1 {
        let mut bx = x0;
        while (bx as i32) < rect.x1 {
            blocks.push((d.bn)(bx, by, desc.bp, desc.bw) & 0x3fff);
            bx += bsw;
        }
        by += bsh;
    }
    blocks.sort_unstable();
    blocks.dedup();
    let mut pages: Vec<u32> = blocks.iter().map(|b| b >> 5).collect();
    pages.dedup();
    (blocks, pages)
}
