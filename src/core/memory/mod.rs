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

//! Local memory (VRAM)
//!
//! 4 MiB of embedded video memory shared by frame buffers, depth buffers,
//! textures and palettes. Nothing in the address space distinguishes them: a
//! buffer is just a base block pointer, a width and a pixel format, and any
//! region can be reinterpreted under any format at any time. All addressing
//! goes through the swizzle tables in [`swizzle`]; addresses wrap modulo the
//! 4 MiB, mirroring the hardware.
//!
//! # Example
//!
//! ```
//! use gsrx::core::memory::{LocalMemory, Psm};
//!
//! let mut mem = LocalMemory::new();
//! mem.write_pixel(Psm::Ct32, 13, 27, 0, 10, 0x8040_2010);
//! assert_eq!(mem.read_pixel(Psm::Ct32, 13, 27, 0, 10), 0x8040_2010);
//! ```

pub mod clut;
pub mod offset;
pub mod psm;
pub mod swizzle;

#[cfg(test)]
mod tests;

pub use clut::{ClutCache, ClutDesc, Csm};
pub use offset::{GsOffset, OffsetCache};
pub use psm::{Psm, PsmDescriptor};

/// Size of local memory in bytes
pub const VRAM_SIZE: usize = 4 * 1024 * 1024;

/// Number of 8 KiB pages in local memory
pub const PAGE_COUNT: usize = VRAM_SIZE / 8192;

/// Number of 256-byte blocks in local memory
pub const BLOCK_COUNT: usize = VRAM_SIZE / 256;

const WORD_MASK: u32 = (VRAM_SIZE as u32 / 4) - 1;
const HWORD_MASK: u32 = (VRAM_SIZE as u32 / 2) - 1;
const BYTE_MASK: u32 = VRAM_SIZE as u32 - 1;
const NIBBLE_MASK: u32 = (VRAM_SIZE as u32 * 2) - 1;

/// Integer rectangle, half-open on the right and bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Rect {
        Rect { x0, y0, x1, y1 }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    #[inline]
    pub fn intersect(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    #[inline]
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    #[inline]
    pub fn contains(&self, other: &Rect) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }
}

/// Texture alpha expansion parameters
///
/// Controls how 16- and 24-bit texels grow an alpha channel when sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Texa {
    pub ta0: u8,
    pub ta1: u8,
    pub aem: bool,
}

impl Texa {
    /// Expand an RGBA 5551 texel to 8888
    ///
    /// The stored alpha bit picks `ta1` or `ta0`; with `aem` set, an all-zero
    /// color with a clear alpha bit becomes fully transparent black.
    #[inline]
    pub fn expand16(&self, c: u16) -> u32 {
        let c = c as u32;
        let rgb = ((c & 0x001f) << 3) | ((c & 0x03e0) << 6) | ((c & 0x7c00) << 9);
        let a = if c & 0x8000 != 0 {
            self.ta1 as u32
        } else if self.aem && (c & 0x7fff) == 0 {
            0
        } else {
            self.ta0 as u32
        };
        rgb | (a << 24)
    }

    /// Expand a 24-bit texel to 8888
    #[inline]
    pub fn expand24(&self, c: u32) -> u32 {
        let rgb = c & 0x00ff_ffff;
        let a = if self.aem && rgb == 0 { 0 } else { self.ta0 as u32 };
        rgb | (a << 24)
    }
}

/// The 4 MiB local memory plus its addressing caches
pub struct LocalMemory {
    vram: Box<[u8]>,
    offsets: OffsetCache,
}

impl Default for LocalMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMemory {
    pub fn new() -> LocalMemory {
        LocalMemory {
            vram: vec![0u8; VRAM_SIZE].into_boxed_slice(),
            offsets: OffsetCache::new(),
        }
    }

    /// Raw VRAM bytes, for save-state serialization
    pub fn vram(&self) -> &[u8] {
        &self.vram
    }

    /// Mutable raw VRAM bytes, for save-state restore
    pub fn vram_mut(&mut self) -> &mut [u8] {
        &mut self.vram
    }

    /// Raw window over VRAM for rasterization
    ///
    /// The view is lifetime-erased; callers must keep `self` alive and must
    /// not use its accessors while the view is in use.
    pub fn view(&mut self) -> VramView {
        VramView { base: self.vram.as_mut_ptr() }
    }

    /// Offset tables for a `(bp, bw, psm)` triple
    pub fn offset(&self, bp: u32, bw: u32, psm: Psm) -> std::sync::Arc<GsOffset> {
        self.offsets.get(bp, bw, psm)
    }

    // Unit accessors. Addresses are in the unit of the access width and wrap
    // modulo the 4 MiB mirror.

    #[inline]
    pub fn read_word(&self, addr: u32) -> u32 {
        let i = ((addr & WORD_MASK) as usize) << 2;
        u32::from_le_bytes([self.vram[i], self.vram[i + 1], self.vram[i + 2], self.vram[i + 3]])
    }

    #[inline]
    pub fn write_word(&mut self, addr: u32, val: u32) {
        let i = ((addr & WORD_MASK) as usize) << 2;
        self.vram[i..i + 4].copy_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn read_hword(&self, addr: u32) -> u16 {
        let i = ((addr & HWORD_MASK) as usize) << 1;
        u16::from_le_bytes([self.vram[i], self.vram[i + 1]])
    }

    #[inline]
    pub fn write_hword(&mut self, addr: u32, val: u16) {
        let i = ((addr & HWORD_MASK) as usize) << 1;
        self.vram[i..i + 2].copy_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn read_byte(&self, addr: u32) -> u8 {
        self.vram[(addr & BYTE_MASK) as usize]
    }

    #[inline]
    pub fn write_byte(&mut self, addr: u32, val: u8) {
        self.vram[(addr & BYTE_MASK) as usize] = val;
    }

    /// Read a 4-bit unit; even addresses are the low nibble
    #[inline]
    pub fn read_nibble(&self, addr: u32) -> u8 {
        let addr = addr & NIBBLE_MASK;
        let b = self.vram[(addr >> 1) as usize];
        if addr & 1 == 0 { b & 0x0f } else { b >> 4 }
    }

    #[inline]
    pub fn write_nibble(&mut self, addr: u32, val: u8) {
        let addr = addr & NIBBLE_MASK;
        let b = &mut self.vram[(addr >> 1) as usize];
        if addr & 1 == 0 {
            *b = (*b & 0xf0) | (val & 0x0f);
        } else {
            *b = (*b & 0x0f) | (val << 4);
        }
    }

    /// Read the pixel at (x, y) in a buffer's storage format
    ///
    /// The returned value holds only the bits the format owns: 24-bit formats
    /// return the low 24 bits, the "H" variants return the high byte/nibble
    /// shifted down.
    pub fn read_pixel(&self, psm: Psm, x: u32, y: u32, bp: u32, bw: u32) -> u32 {
        let addr = (psm.descriptor().pa)(x, y, bp, bw);
        self.load(psm, addr)
    }

    /// Write the pixel at (x, y), preserving any slot bits the format does
    /// not own (the top byte for 24-bit formats, everything but the high
    /// byte/nibble for the "H" variants)
    pub fn write_pixel(&mut self, psm: Psm, x: u32, y: u32, bp: u32, bw: u32, val: u32) {
        let addr = (psm.descriptor().pa)(x, y, bp, bw);
        self.store(psm, addr, val);
    }

    /// Format-aware load at a precomputed unit address
    #[inline]
    pub fn load(&self, psm: Psm, addr: u32) -> u32 {
        match psm {
            Psm::Ct32 | Psm::Z32 => self.read_word(addr),
            Psm::Ct24 | Psm::Z24 => self.read_word(addr) & 0x00ff_ffff,
            Psm::Ct16 | Psm::Ct16s | Psm::Z16 | Psm::Z16s => self.read_hword(addr) as u32,
            Psm::T8 => self.read_byte(addr) as u32,
            Psm::T4 => self.read_nibble(addr) as u32,
            Psm::T8h => self.read_word(addr) >> 24,
            Psm::T4hl => (self.read_word(addr) >> 24) & 0x0f,
            Psm::T4hh => self.read_word(addr) >> 28,
        }
    }

    /// Format-aware store at a precomputed unit address
    #[inline]
    pub fn store(&mut self, psm: Psm, addr: u32, val: u32) {
        match psm {
            Psm::Ct32 | Psm::Z32 => self.write_word(addr, val),
            Psm::Ct24 | Psm::Z24 => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0xff00_0000) | (val & 0x00ff_ffff));
            }
            Psm::Ct16 | Psm::Ct16s | Psm::Z16 | Psm::Z16s => self.write_hword(addr, val as u16),
            Psm::T8 => self.write_byte(addr, val as u8),
            Psm::T4 => self.write_nibble(addr, val as u8),
            Psm::T8h => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0x00ff_ffff) | (val << 24));
            }
            Psm::T4hl => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0xf0ff_ffff) | ((val & 0x0f) << 24));
            }
            Psm::T4hh => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0x0fff_ffff) | ((val & 0x0f) << 28));
            }
        }
    }

    /// Sample a texel as RGBA 8888
    ///
    /// Indexed formats resolve through `clut`; 16- and 24-bit colors expand
    /// their alpha through `texa`. Depth formats return raw bits.
    #[inline]
    pub fn read_texel(&self, off: &GsOffset, x: u32, y: u32, clut: &[u32; 256], texa: Texa) -> u32 {
        let addr = off.pixel_address(x, y);
        match off.psm() {
            Psm::Ct32 | Psm::Z32 => self.read_word(addr),
            Psm::Ct24 | Psm::Z24 => texa.expand24(self.read_word(addr)),
            Psm::Ct16 | Psm::Ct16s | Psm::Z16 | Psm::Z16s => texa.expand16(self.read_hword(addr)),
            Psm::T8 => clut[self.read_byte(addr) as usize],
            Psm::T4 => clut[self.read_nibble(addr) as usize],
            Psm::T8h => clut[(self.read_word(addr) >> 24) as usize],
            Psm::T4hl => clut[((self.read_word(addr) >> 24) & 0x0f) as usize],
            Psm::T4hh => clut[(self.read_word(addr) >> 28) as usize],
        }
    }

    /// Copy linear host pixels into swizzled VRAM
    ///
    /// `data` holds `rect` as rows of `pitch` bytes in the format's transfer
    /// width (24-bit colors move as 3 bytes, 4-bit indices as packed
    /// nibbles). The destination rectangle is split into a block-aligned
    /// interior written whole blocks at a time and edge strips written pixel
    /// by pixel; the two paths produce identical bytes.
    pub fn write_image(
        &mut self,
        bp: u32,
        bw: u32,
        psm: Psm,
        rect: Rect,
        data: &[u8],
        pitch: usize,
    ) {
        if rect.is_empty() {
            return;
        }
        let desc = psm.descriptor();
        let (x0, y0, x1, y1) = (rect.x0 as u32, rect.y0 as u32, rect.x1 as u32, rect.y1 as u32);

        // The block path only applies when the transfer width equals the
        // storage width; 24-bit and high-byte formats go pixel by pixel.
        let natural = desc.bpp == desc.trbpp;
        let (bsw, bsh) = desc.bs;
        let ix0 = (x0 + bsw - 1) & !(bsw - 1);
        let iy0 = (y0 + bsh - 1) & !(bsh - 1);
        let ix1 = x1 & !(bsw - 1);
        let iy1 = y1 & !(bsh - 1);

        if natural && ix0 < ix1 && iy0 < iy1 {
            for by in (iy0..iy1).step_by(bsh as usize) {
                for bx in (ix0..ix1).step_by(bsw as usize) {
                    self.write_block(psm, bp, bw, bx, by, x0, y0, data, pitch);
                }
            }
            self.write_span(bp, bw, psm, (x0, x1, y0, iy0), (x0, y0), data, pitch);
            self.write_span(bp, bw, psm, (x0, x1, iy1, y1), (x0, y0), data, pitch);
            self.write_span(bp, bw, psm, (x0, ix0, iy0, iy1), (x0, y0), data, pitch);
            self.write_span(bp, bw, psm, (ix1, x1, iy0, iy1), (x0, y0), data, pitch);
        } else {
            self.write_span(bp, bw, psm, (x0, x1, y0, y1), (x0, y0), data, pitch);
        }
    }

    /// One whole block from the linear source
    #[allow(clippy::too_many_arguments)]
    fn write_block(
        &mut self,
        psm: Psm,
        bp: u32,
        bw: u32,
        bx: u32,
        by: u32,
        ox: u32,
        oy: u32,
        data: &[u8],
        pitch: usize,
    ) {
        let desc = psm.descriptor();
        let bn = (desc.bn)(bx, by, bp, bw);
        match desc.bpp {
            32 => {
                let base = bn << 6;
                for v in 0..8u32 {
                    let row = ((by + v - oy) as usize) * pitch + ((bx - ox) as usize) * 4;
                    for u in 0..8u32 {
                        let i = row + u as usize * 4;
                        let c = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
                        self.write_word(base + swizzle::COLUMN_TABLE_32[v as usize][u as usize], c);
                    }
                }
            }
            16 => {
                let base = bn << 7;
                for v in 0..8u32 {
                    let row = ((by + v - oy) as usize) * pitch + ((bx - ox) as usize) * 2;
                    for u in 0..16u32 {
                        let i = row + u as usize * 2;
                        let c = u16::from_le_bytes([data[i], data[i + 1]]);
                        self.write_hword(base + swizzle::COLUMN_TABLE_16[v as usize][u as usize], c);
                    }
                }
            }
            8 => {
                let base = bn << 8;
                for v in 0..16u32 {
                    let row = ((by + v - oy) as usize) * pitch + (bx - ox) as usize;
                    for u in 0..16u32 {
                        self.write_byte(
                            base + swizzle::COLUMN_TABLE_8[v as usize][u as usize],
                            data[row + u as usize],
                        );
                    }
                }
            }
            _ => {
                let base = bn << 9;
                for v in 0..16u32 {
                    let row = ((by + v - oy) as usize) * pitch;
                    for u in 0..32u32 {
                        let sx = bx - ox + u;
                        let b = data[row + (sx >> 1) as usize];
                        let val = if sx & 1 == 0 { b & 0x0f } else { b >> 4 };
                        self.write_nibble(base + swizzle::COLUMN_TABLE_4[v as usize][u as usize], val);
                    }
                }
            }
        }
    }

    /// Pixel-by-pixel transfer of a sub-rectangle `(x0, x1, y0, y1)`;
    /// `(ox, oy)` is the origin of the linear source buffer
    fn write_span(
        &mut self,
        bp: u32,
        bw: u32,
        psm: Psm,
        span: (u32, u32, u32, u32),
        origin: (u32, u32),
        data: &[u8],
        pitch: usize,
    ) {
        let (x0, x1, y0, y1) = span;
        let (ox, oy) = origin;
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let desc = psm.descriptor();
        let pa = desc.pa;
        for y in y0..y1 {
            let row = ((y - oy) as usize) * pitch;
            for x in x0..x1 {
                let sx = (x - ox) as usize;
                let val = match desc.trbpp {
                    32 => {
                        let i = row + sx * 4;
                        u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
                    }
                    24 => {
                        let i = row + sx * 3;
                        (data[i] as u32) | ((data[i + 1] as u32) << 8) | ((data[i + 2] as u32) << 16)
                    }
                    16 => {
                        let i = row + sx * 2;
                        u16::from_le_bytes([data[i], data[i + 1]]) as u32
                    }
                    8 => data[row + sx] as u32,
                    _ => {
                        let b = data[row + (sx >> 1)];
                        (if sx & 1 == 0 { b & 0x0f } else { b >> 4 }) as u32
                    }
                };
                self.store(psm, pa(x, y, bp, bw), val);
            }
        }
    }

    /// Copy swizzled VRAM out to linear host pixels, the inverse of
    /// [`write_image`](Self::write_image)
    pub fn read_image(
        &self,
        bp: u32,
        bw: u32,
        psm: Psm,
        rect: Rect,
        data: &mut [u8],
        pitch: usize,
    ) {
        if rect.is_empty() {
            return;
        }
        let desc = psm.descriptor();
        let pa = desc.pa;
        let (x0, y0) = (rect.x0 as u32, rect.y0 as u32);
        for y in y0..rect.y1 as u32 {
            let row = ((y - y0) as usize) * pitch;
            for x in x0..rect.x1 as u32 {
                let sx = (x - x0) as usize;
                let val = self.load(psm, pa(x, y, bp, bw));
                match desc.trbpp {
                    32 => data[row + sx * 4..row + sx * 4 + 4].copy_from_slice(&val.to_le_bytes()),
                    24 => {
                        let i = row + sx * 3;
                        data[i] = val as u8;
                        data[i + 1] = (val >> 8) as u8;
                        data[i + 2] = (val >> 16) as u8;
                    }
                    16 => data[row + sx * 2..row + sx * 2 + 2]
                        .copy_from_slice(&(val as u16).to_le_bytes()),
                    8 => data[row + sx] = val as u8,
                    _ => {
                        let b = &mut data[row + (sx >> 1)];
                        if sx & 1 == 0 {
                            *b = (*b & 0xf0) | (val as u8 & 0x0f);
                        } else {
                            *b = (*b & 0x0f) | ((val as u8) << 4);
                        }
                    }
                }
            }
        }
    }
}

/// Lifetime-erased raw window over the VRAM bytes
///
/// Rasterizer workers write interleaved rows of the same draw at the same
/// time. Every access goes through the raw base pointer and never
/// materializes a reference to VRAM, so concurrent accesses to disjoint
/// bytes stay within the memory model. Users must keep the owning
/// [`LocalMemory`] alive and unborrowed while the view is in use, and must
/// not touch the same bytes from two threads at once.
pub struct VramView {
    base: *mut u8,
}

unsafe impl Send for VramView {}
unsafe impl Sync for VramView {}

impl VramView {
    #[inline]
    pub fn read_word(&self, addr: u32) -> u32 {
        let i = ((addr & WORD_MASK) as usize) << 2;
        u32::from_le(unsafe { std::ptr::read_unaligned(self.base.add(i).cast::<u32>()) })
    }

    #[inline]
    pub fn write_word(&self, addr: u32, val: u32) {
        let i = ((addr & WORD_MASK) as usize) << 2;
        unsafe { std::ptr::write_unaligned(self.base.add(i).cast::<u32>(), val.to_le()) }
    }

    #[inline]
    pub fn read_hword(&self, addr: u32) -> u16 {
        let i = ((addr & HWORD_MASK) as usize) << 1;
        u16::from_le(unsafe { std::ptr::read_unaligned(self.base.add(i).cast::<u16>()) })
    }

    #[inline]
    pub fn write_hword(&self, addr: u32, val: u16) {
        let i = ((addr & HWORD_MASK) as usize) << 1;
        unsafe { std::ptr::write_unaligned(self.base.add(i).cast::<u16>(), val.to_le()) }
    }

    #[inline]
    pub fn read_byte(&self, addr: u32) -> u8 {
        unsafe { *self.base.add((addr & BYTE_MASK) as usize) }
    }

    #[inline]
    pub fn write_byte(&self, addr: u32, val: u8) {
        unsafe { *self.base.add((addr & BYTE_MASK) as usize) = val }
    }

    #[inline]
    pub fn read_nibble(&self, addr: u32) -> u8 {
        let addr = addr & NIBBLE_MASK;
        let b = self.read_byte(addr >> 1);
        if addr & 1 == 0 { b & 0x0f } else { b >> 4 }
    }

    #[inline]
    pub fn write_nibble(&self, addr: u32, val: u8) {
        let addr = addr & NIBBLE_MASK;
        let b = self.read_byte(addr >> 1);
        let b = if addr & 1 == 0 {
            (b & 0xf0) | (val & 0x0f)
        } else {
            (b & 0x0f) | (val << 4)
        };
        self.write_byte(addr >> 1, b);
    }

    /// Format-aware load at a precomputed unit address
    #[inline]
    pub fn load(&self, psm: Psm, addr: u32) -> u32 {
        match psm {
            Psm::Ct32 | Psm::Z32 => self.read_word(addr),
            Psm::Ct24 | Psm::Z24 => self.read_word(addr) & 0x00ff_ffff,
            Psm::Ct16 | Psm::Ct16s | Psm::Z16 | Psm::Z16s => self.read_hword(addr) as u32,
            Psm::T8 => self.read_byte(addr) as u32,
            Psm::T4 => self.read_nibble(addr) as u32,
            Psm::T8h => self.read_word(addr) >> 24,
            Psm::T4hl => (self.read_word(addr) >> 24) & 0x0f,
            Psm::T4hh => self.read_word(addr) >> 28,
        }
    }

    /// Format-aware store at a precomputed unit address
    #[inline]
    pub fn store(&self, psm: Psm, addr: u32, val: u32) {
        match psm {
            Psm::Ct32 | Psm::Z32 => self.write_word(addr, val),
            Psm::Ct24 | Psm::Z24 => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0xff00_0000) | (val & 0x00ff_ffff));
            }
            Psm::Ct16 | Psm::Ct16s | Psm::Z16 | Psm::Z16s => self.write_hword(addr, val as u16),
            Psm::T8 => self.write_byte(addr, val as u8),
            Psm::T4 => self.write_nibble(addr, val as u8),
            Psm::T8h => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0x00ff_ffff) | (val << 24));
            }
            Psm::T4hl => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0xf0ff_ffff) | ((val & 0x0f) << 24));
            }
            Psm::T4hh => {
                let old = self.read_word(addr);
                self.write_word(addr, (old & 0x0fff_ffff) | ((val & 0x0f) << 28));
            }
        }
    }
}
