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

//! Graphics synthesizer core
//!
//! The [`Gpu`] ties the pieces together: it compiles each draw's register
//! state into a selector, resolves the texture through the palette and
//! surface caches, fans the rasterization out over the worker pool, and
//! invalidates cached views of whatever VRAM the draw touched. Host-side
//! image transfers go through the same choke point so the caches never see
//! stale memory.

pub mod raster;
pub mod scanline;
pub mod selector;
pub mod vertex;
pub mod workers;

#[cfg(test)]
mod tests;

pub use raster::{BufferDesc, DrawCommand, TexDesc};
pub use selector::{Afail, Atst, DrawFlags, DrawState, ScanlineSelector, Tfx, Wrap, Ztst};
pub use vertex::{GsVertex, PrimClass};

use std::sync::Arc;

use crate::core::cache::{self, SurfaceKind, TextureCache};
use crate::core::error::{GsError, Result};
use crate::core::memory::{ClutCache, LocalMemory, Rect, Texa};
use crate::core::gpu::scanline::{ScanlineGlobal, TextureView};
use crate::core::gpu::workers::WorkerPool;

/// The synthesizer: local memory, caches and the rasterizer pool
pub struct Gpu {
    mem: LocalMemory,
    clut: ClutCache,
    /// Bumped on every palette reload; bakes palette identity into cached
    /// indexed sources
    clut_gen: u32,
    cache: TextureCache,
    pool: WorkerPool,
}

impl Gpu {
    /// Create a synthesizer with `workers` rasterizer threads (zero runs
    /// draws inline)
    pub fn new(workers: u32) -> Gpu {
        Gpu {
            mem: LocalMemory::new(),
            clut: ClutCache::new(),
            clut_gen: 0,
            cache: TextureCache::new(),
            pool: WorkerPool::new(workers),
        }
    }

    pub fn worker_count(&self) -> u32 {
        self.pool.count()
    }

    pub fn mem(&self) -> &LocalMemory {
        &self.mem
    }

    /// Direct mutable VRAM access for save-state restore
    ///
    /// Bypasses cache invalidation; callers that change pixels must follow
    /// up with [`invalidate_video_mem`](Self::invalidate_video_mem) or use
    /// [`write_image`](Self::write_image).
    pub fn mem_mut(&mut self) -> &mut LocalMemory {
        &mut self.mem
    }

    pub fn clut(&self) -> &ClutCache {
        &self.clut
    }

    pub fn clut_mut(&mut self) -> &mut ClutCache {
        &mut self.clut
    }

    /// Execute one draw
    ///
    /// An invalid frame, depth or texture binding is an error; a draw whose
    /// mask leaves nothing writable, or whose texture cannot be cached, is
    /// skipped without error.
    pub fn queue(&mut self, cmd: DrawCommand) -> Result<()> {
        cmd.fb.validate()?;
        cmd.zb.validate()?;
        if let Some(tex) = &cmd.tex {
            tex.validate()?;
        }
        let per_prim = cmd.prim.vertices_per_prim();
        if cmd.vertices.len() % per_prim != 0 {
            return Err(GsError::InvalidDraw(format!(
                "{} vertices do not form whole {:?} primitives",
                cmd.vertices.len(),
                cmd.prim
            )));
        }
        let sel = ScanlineSelector::compile(&cmd.state)?;
        if !sel.writes_anything() {
            return Ok(());
        }
        let bounds = cmd.bounds();
        if bounds.is_empty() {
            return Ok(());
        }

        let tex_view = if sel.tme {
            match self.resolve_texture(&cmd) {
                Some(v) => Some(v),
                None => {
                    log::warn!("texture unavailable, draw skipped");
                    return Ok(());
                }
            }
        } else {
            None
        };

        let fbmsk = match sel.fpsm {
            2 => scanline::to_1555(cmd.state.fbmsk),
            1 => cmd.state.fbmsk & 0x00ff_ffff,
            _ => cmd.state.fbmsk,
        };
        let global = ScanlineGlobal {
            sel,
            fb: self.mem.offset(cmd.fb.bp, cmd.fb.bw, cmd.fb.psm),
            zb: self.mem.offset(cmd.zb.bp, cmd.zb.bw, cmd.zb.psm),
            fbmsk,
            afix: cmd.state.afix,
            fog_rgb: cmd.fog_rgb,
            tex: tex_view,
            dimx: cmd.dimx,
            zmax: cmd.zb.psm.descriptor().z_mask(),
        };
        let kind = scanline::select_kind(&sel);
        log::trace!(
            "draw {:?} x{} key={:#x} kind={kind:?}",
            cmd.prim,
            cmd.vertices.len() / cmd.prim.vertices_per_prim(),
            sel.key()
        );

        let fb = cmd.fb;
        let zb = cmd.zb;
        self.pool.dispatch(cmd, kind, global, &mut self.mem);

        if sel.fwrite {
            self.invalidate_video_mem(&fb, bounds);
        }
        if sel.zwrite {
            self.invalidate_video_mem(&zb, bounds);
        }
        self.cache.tick();
        Ok(())
    }

    /// Bring the palette up to date and produce a texture view for a draw
    fn resolve_texture(&mut self, cmd: &DrawCommand) -> Option<TextureView> {
        let tex = cmd.tex.as_ref()?;
        if let Some(clut_desc) = tex.clut {
            if self.clut.update(clut_desc, cmd.texa, &self.mem) {
                self.clut_gen = self.clut_gen.wrapping_add(1);
            }
        }
        let id = self.cache.lookup_source(
            &self.mem,
            self.clut.lut(),
            self.clut_gen,
            cmd.texa,
            tex,
        )?;
        let s = self.cache.get(id)?;
        Some(TextureView {
            data: Arc::clone(&s.data),
            stride: s.w,
            w: tex.tw,
            h: tex.th,
            minu: tex.minu,
            maxu: tex.maxu,
            minv: tex.minv,
            maxv: tex.maxv,
        })
    }

    /// Host-to-local image transfer
    ///
    /// `data` holds `rect` as linear rows of `pitch` bytes in the format's
    /// transfer width.
    pub fn write_image(
        &mut self,
        desc: &BufferDesc,
        rect: Rect,
        data: &[u8],
        pitch: usize,
    ) {
        self.mem.write_image(desc.bp, desc.bw, desc.psm, rect, data, pitch);
        self.invalidate_video_mem(desc, rect);
    }

    /// Local-to-host image transfer, the inverse of
    /// [`write_image`](Self::write_image)
    pub fn read_image(&self, desc: &BufferDesc, rect: Rect, data: &mut [u8], pitch: usize) {
        self.mem.read_image(desc.bp, desc.bw, desc.psm, rect, data, pitch);
    }

    /// Record that VRAM changed under `rect` in `desc`'s layout
    ///
    /// Cached views overlapping the write go stale; the palette cache drops
    /// its key if the write landed on the decoded palette's blocks.
    pub fn invalidate_video_mem(&mut self, desc: &BufferDesc, rect: Rect) {
        self.cache.invalidate_video_mem(desc, rect);
        if let Some(clut_desc) = self.clut.cached_desc() {
            let (blocks, _) = cache::blocks_of_rect(desc, rect);
            let (prect, pbw) = clut_desc.extent();
            let pal = BufferDesc { bp: clut_desc.cbp, bw: pbw, psm: clut_desc.cpsm };
            let (pal_blocks, _) = cache::blocks_of_rect(&pal, prect);
            if pal_blocks.iter().any(|b| blocks.binary_search(b).is_ok()) {
                self.clut.invalidate();
            }
        }
    }

    /// Read back a rectangle of a render or depth target as RGBA 8888
    ///
    /// Resolves through the target cache so pending dirty regions are
    /// synchronized first; rows are returned top to bottom, `rect.width()`
    /// pixels each.
    pub fn read_frame(&mut self, desc: &BufferDesc, rect: Rect) -> Vec<u32> {
        let mut out = vec![0u32; (rect.width().max(0) * rect.height().max(0)) as usize];
        if out.is_empty() {
            return out;
        }
        let kind = if desc.psm.is_depth() {
            SurfaceKind::DepthStencil
        } else {
            SurfaceKind::RenderTarget
        };
        let resolved = match self
            .cache
            .lookup_target(&self.mem, desc, rect.x1 as u32, rect.y1 as u32, kind)
        {
            Some(id) => self.cache.target_pixels(&self.mem, id),
            None => None,
        };
        match resolved {
            // The containment fallback can hand back a target that does not
            // cover the request; those read straight from VRAM below.
            Some(s) if s.bp == desc.bp && s.w >= rect.x1 as u32 && s.h >= rect.y1 as u32 => {
                let w = rect.width() as usize;
                for (row, y) in (rect.y0..rect.y1).enumerate() {
                    let src = (y as u32 * s.w + rect.x0 as u32) as usize;
                    out[row * w..(row + 1) * w].copy_from_slice(&s.data[src..src + w]);
                }
            }
            _ => {
                let off = self.mem.offset(desc.bp, desc.bw, desc.psm);
                let texa = Texa { ta0: 0, ta1: 0x80, aem: false };
                let clut = [0u32; 256];
                let w = rect.width() as usize;
                for (row, y) in (rect.y0..rect.y1).enumerate() {
                    for (i, x) in (rect.x0..rect.x1).enumerate() {
                        out[row * w + i] =
                            self.mem.read_texel(&off, x as u32, y as u32, &clut, texa);
                    }
                }
            }
        }
        out
    }
}
