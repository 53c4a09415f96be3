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

//! Per-draw pipeline selector
//!
//! The register state relevant to the pixel pipeline is compiled once per
//! draw into an immutable [`ScanlineSelector`]. Compilation derives the
//! write/read enables, applies the comparison rewrites the hardware quirks
//! require, and packs into a `u64` key used to pick a scanline
//! specialization.

use bitflags::bitflags;

use crate::core::error::{GsError, Result};
use crate::core::memory::Psm;
use crate::core::gpu::vertex::PrimClass;

bitflags! {
    /// Boolean draw state handed over by the decoder
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DrawFlags: u32 {
        /// Texturing enabled
        const TME = 1 << 0;
        /// Alpha blending enabled
        const ABE = 1 << 1;
        /// Per-pixel alpha blend gate (source alpha bit 7)
        const PABE = 1 << 2;
        /// Fog enabled
        const FGE = 1 << 3;
        /// Dithering enabled
        const DTHE = 1 << 4;
        /// Saturate colors instead of wrapping
        const COLCLAMP = 1 << 5;
        /// Force the frame alpha bit on write
        const FBA = 1 << 6;
        /// Destination alpha test enabled
        const DATE = 1 << 7;
        /// Destination alpha test polarity
        const DATM = 1 << 8;
        /// Texture alpha participates in the combine
        const TCC = 1 << 9;
        /// Bilinear texture filter
        const LTF = 1 << 10;
        /// UV texel addressing instead of perspective STQ
        const FST = 1 << 11;
        /// Gouraud shading
        const IIP = 1 << 12;
        /// Depth writes masked
        const ZMSK = 1 << 13;
    }
}

/// Depth test function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ztst {
    Never = 0,
    Always = 1,
    GEqual = 2,
    Greater = 3,
}

/// Alpha test function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Atst {
    Never = 0,
    Always = 1,
    Less = 2,
    LEqual = 3,
    Equal = 4,
    GEqual = 5,
    Greater = 6,
    NotEqual = 7,
}

/// What still gets written when the alpha test fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Afail {
    Keep = 0,
    FbOnly = 1,
    ZbOnly = 2,
    RgbOnly = 3,
}

/// Texture function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tfx {
    Modulate = 0,
    Decal = 1,
    Highlight = 2,
    Highlight2 = 3,
}

/// Texture coordinate wrap mode
///
/// Region bounds live in the draw's texture descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Wrap {
    Repeat = 0,
    Clamp = 1,
    RegionClamp = 2,
    RegionRepeat = 3,
}

/// Raw pipeline state for one draw, before compilation
#[derive(Debug, Clone, Copy)]
pub struct DrawState {
    pub flags: DrawFlags,
    pub prim: PrimClass,
    pub fpsm: Psm,
    pub zpsm: Psm,
    pub ztst: Ztst,
    pub atst: Atst,
    pub aref: u8,
    pub afail: Afail,
    pub tfx: Tfx,
    pub wms: Wrap,
    pub wmt: Wrap,
    /// Blend selectors: a/b/d pick source(0)/dest(1)/zero(2),
    /// c picks source alpha(0)/dest alpha(1)/fixed(2)
    pub aba: u8,
    pub abb: u8,
    pub abc: u8,
    pub abd: u8,
    pub afix: u8,
    /// Frame write mask in 8888 space; a set bit masks the write
    pub fbmsk: u32,
}

impl Default for DrawState {
    fn default() -> Self {
        DrawState {
            flags: DrawFlags::COLCLAMP,
            prim: PrimClass::Triangle,
            fpsm: Psm::Ct32,
            zpsm: Psm::Z32,
            ztst: Ztst::Always,
            atst: Atst::Always,
            aref: 0,
            afail: Afail::Keep,
            tfx: Tfx::Modulate,
            wms: Wrap::Clamp,
            wmt: Wrap::Clamp,
            aba: 0,
            abb: 1,
            abc: 0,
            abd: 1,
            afix: 0x80,
            fbmsk: 0,
        }
    }
}

/// Compiled, immutable pipeline selector for one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanlineSelector {
    /// Frame writes enabled (some unmasked bit exists)
    pub fwrite: bool,
    /// Depth writes enabled
    pub zwrite: bool,
    /// Destination color is read (partial mask, blend with dest, date)
    pub rfb: bool,
    /// Depth is read for testing
    pub ztest: bool,
    /// Frame storage class: 0 = 32, 1 = 24, 2 = 16
    pub fpsm: u8,
    /// Depth storage class: 0 = 32, 1 = 24, 2 = 16
    pub zpsm: u8,
    /// Compiled depth test; never `Greater`
    pub ztst: Ztst,
    pub tme: bool,
    pub tfx: Tfx,
    pub tcc: bool,
    pub ltf: bool,
    pub fst: bool,
    pub wms: Wrap,
    pub wmt: Wrap,
    /// Compiled alpha test; never `Less` or `Greater`
    pub atst: Atst,
    /// Compiled reference, adjusted alongside the test rewrite
    pub aref: i32,
    pub afail: Afail,
    pub abe: bool,
    pub aba: u8,
    pub abb: u8,
    pub abc: u8,
    pub abd: u8,
    pub pabe: bool,
    pub fge: bool,
    pub dthe: bool,
    pub colclamp: bool,
    pub fba: bool,
    pub date: bool,
    pub datm: bool,
    pub iip: bool,
    pub prim: PrimClass,
    /// No per-pixel test can reject anything
    pub notest: bool,
}

/// Frame mask bits that can actually reach storage for a class
fn frame_mask(class: u8) -> u32 {
    match class {
        0 => 0xffff_ffff,
        1 => 0x00ff_ffff,
        // Bits that survive the 8888 -> 1555 conversion.
        _ => 0x80f8_f8f8,
    }
}

impl ScanlineSelector {
    /// Compile raw draw state into a selector
    ///
    /// Rewrites applied here, kept from hardware behavior titles depend on:
    /// - `ztst == Greater` becomes `GEqual` (the strict test is the broken
    ///   path on real silicon).
    /// - `atst == Less` becomes `LEqual` with `aref - 1`; `Greater` becomes
    ///   `GEqual` with `aref + 1`.
    /// - `afail == RgbOnly` on a 24-bit frame degenerates to `FbOnly` since
    ///   the alpha byte is not stored anyway.
    pub fn compile(state: &DrawState) -> Result<ScanlineSelector> {
        let fpsm = state.fpsm.descriptor().fmt;
        let zpsm = state.zpsm.descriptor().fmt;
        if fpsm > 2 || !matches!(state.fpsm, Psm::Ct32 | Psm::Ct24 | Psm::Ct16 | Psm::Ct16s) {
            return Err(GsError::InvalidPixelFormat(state.fpsm.raw()));
        }
        if !state.zpsm.is_depth() {
            return Err(GsError::InvalidPixelFormat(state.zpsm.raw()));
        }

        let ztst = match state.ztst {
            Ztst::Greater => Ztst::GEqual,
            z => z,
        };
        let (atst, aref) = match state.atst {
            Atst::Less => (Atst::LEqual, state.aref as i32 - 1),
            Atst::Greater => (Atst::GEqual, state.aref as i32 + 1),
            a => (a, state.aref as i32),
        };
        let mut afail = state.afail;
        if afail == Afail::RgbOnly && fpsm == 1 {
            afail = Afail::FbOnly;
        }

        let fm = frame_mask(fpsm);
        let fwrite = (state.fbmsk & fm) != fm;
        let zwrite = !state.flags.contains(DrawFlags::ZMSK);
        let abe = state.flags.contains(DrawFlags::ABE);
        let date = state.flags.contains(DrawFlags::DATE) && fpsm != 1;
        let blend_reads_dest = abe && (state.aba == 1 || state.abb == 1 || state.abd == 1 || state.abc == 1);
        let rfb = fwrite && ((state.fbmsk & fm) != 0 || date || blend_reads_dest);
        let ztest = ztst != Ztst::Always;
        let notest = atst == Atst::Always && !date && !ztest;

        Ok(ScanlineSelector {
            fwrite,
            zwrite,
            rfb,
            ztest,
            fpsm,
            zpsm,
            ztst,
            tme: state.flags.contains(DrawFlags::TME),
            tfx: state.tfx,
            tcc: state.flags.contains(DrawFlags::TCC),
            ltf: state.flags.contains(DrawFlags::LTF),
            fst: state.flags.contains(DrawFlags::FST),
            wms: state.wms,
            wmt: state.wmt,
            atst,
            aref,
            afail,
            abe,
            aba: state.aba,
            abb: state.abb,
            abc: state.abc,
            abd: state.abd,
            pabe: state.flags.contains(DrawFlags::PABE),
            fge: state.flags.contains(DrawFlags::FGE),
            dthe: state.flags.contains(DrawFlags::DTHE) && fpsm == 2,
            colclamp: state.flags.contains(DrawFlags::COLCLAMP),
            fba: state.flags.contains(DrawFlags::FBA) && fpsm != 1,
            date,
            datm: state.flags.contains(DrawFlags::DATM),
            iip: state.flags.contains(DrawFlags::IIP),
            prim: state.prim,
            notest,
        })
    }

    /// Whether the draw touches anything at all
    #[inline]
    pub fn writes_anything(&self) -> bool {
        self.fwrite || self.zwrite
    }

    /// Pack the selector into a stable `u64` key
    pub fn key(&self) -> u64 {
        let mut k = 0u64;
        let mut push = |v: u64, bits: u32| {
            k = (k << bits) | (v & ((1 << bits) - 1));
        };
        push(self.fwrite as u64, 1);
        push(self.zwrite as u64, 1);
        push(self.rfb as u64, 1);
        push(self.ztest as u64, 1);
        push(self.fpsm as u64, 2);
        push(self.zpsm as u64, 2);
        push(self.ztst as u64, 2);
        push(self.tme as u64, 1);
        push(self.tfx as u64, 2);
        push(self.tcc as u64, 1);
        push(self.ltf as u64, 1);
        push(self.fst as u64, 1);
        push(self.wms as u64, 2);
        push(self.wmt as u64, 2);
        push(self.atst as u64, 3);
        // 10 bits: the compiled reference spans -1..=256 after the rewrite.
        push(self.aref as u64, 10);
        push(self.afail as u64, 2);
        push(self.abe as u64, 1);
        push(self.aba as u64, 2);
        push(self.abb as u64, 2);
        push(self.abc as u64, 2);
        push(self.abd as u64, 2);
        push(self.pabe as u64, 1);
        push(self.fge as u64, 1);
        push(self.dthe as u64, 1);
        push(self.colclamp as u64, 1);
        push(self.fba as u64, 1);
        push(self.date as u64, 1);
        push(self.datm as u64, 1);
        push(self.iip as u64, 1);
        push(self.prim as u64, 2);
        k
    }
}
