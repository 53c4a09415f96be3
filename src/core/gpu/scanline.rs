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

//! Scalar scanline engine
//!
//! One span at a time, one pixel at a time, the full fixed-function pixel
//! pipeline: depth test, texture sample, color combine, alpha test with its
//! fail policies, destination alpha test, fog, the 3x3x3x3 blend matrix,
//! dither, clamp/wrap, masking, and the frame/depth writes. The general
//! implementation handles every selector; a few specialized variants cover
//! empirically hot selectors and must stay behaviorally identical to it.
//!
//! All channel math is integer, 0..255 with `>> 7` products, matching the
//! hardware's fixed-point paths bit for bit.

use std::sync::Arc;

use crate::core::memory::{GsOffset, Rect, VramView};
use crate::core::gpu::selector::{Afail, Atst, ScanlineSelector, Tfx, Wrap, Ztst};

/// A linearized texture plus its wrap parameters
#[derive(Clone)]
pub struct TextureView {
    /// RGBA 8888 texels, `stride` wide
    pub data: Arc<Vec<u32>>,
    pub stride: u32,
    pub w: u32,
    pub h: u32,
    /// Region parameters: min/max for the clamp modes, msk/fix for
    /// region-repeat
    pub minu: i32,
    pub maxu: i32,
    pub minv: i32,
    pub maxv: i32,
}

impl TextureView {
    #[inline]
    fn texel(&self, u: i32, v: i32) -> u32 {
        self.data[(v as u32 * self.stride + u as u32) as usize]
    }
}

/// Per-draw constants shared by every span of a draw
pub struct ScanlineGlobal {
    pub sel: ScanlineSelector,
    pub fb: Arc<GsOffset>,
    pub zb: Arc<GsOffset>,
    /// Frame write mask in the frame's native storage format
    pub fbmsk: u32,
    pub afix: u8,
    /// Fog color, 0x00RRGGBB
    pub fog_rgb: u32,
    pub tex: Option<TextureView>,
    /// Signed 4x4 dither matrix
    pub dimx: [[i32; 4]; 4],
    /// Maximum representable depth for the z format
    pub zmax: u32,
}

/// One horizontal span with start attributes and per-pixel deltas
///
/// `x0` is inclusive, `x1` exclusive; attributes are sampled at the center
/// of `x0`.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub y: i32,
    pub x0: i32,
    pub x1: i32,
    pub z: f64,
    pub dz: f64,
    pub f: f32,
    pub df: f32,
    /// RGBA
    pub c: [f32; 4],
    pub dc: [f32; 4],
    /// (s, t, q) or (u, v, _) under UV addressing
    pub t: [f32; 3],
    pub dt: [f32; 3],
}

/// Resolved scanline implementation for a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanlineKind {
    /// Full pipeline, handles every selector
    Generic,
    /// Flat untextured opaque fill on a 32-bit frame
    FlatOpaque32,
    /// Point-sampled modulated opaque texturing on a 32-bit frame
    ModulateTexOpaque32,
}

/// Pick the implementation for a compiled selector
///
/// The generic path is the fallback for everything; the variants only cover
/// selectors where every skipped stage is provably inert.
pub fn select_kind(sel: &ScanlineSelector) -> ScanlineKind {
    let inert = sel.notest && !sel.abe && !sel.fge && !sel.dthe && !sel.rfb && sel.fwrite
        && sel.fpsm == 0 && !sel.date;
    if inert && !sel.tme && !sel.iip {
        ScanlineKind::FlatOpaque32
    } else if inert
        && sel.tme
        && sel.tfx == Tfx::Modulate
        && sel.fst
        && !sel.ltf
        && !sel.iip
        && matches!(sel.wms, Wrap::Repeat | Wrap::Clamp)
        && matches!(sel.wmt, Wrap::Repeat | Wrap::Clamp)
    {
        ScanlineKind::ModulateTexOpaque32
    } else {
        ScanlineKind::Generic
    }
}

/// Draw one span with the resolved implementation
#[inline]
pub fn draw_span(kind: ScanlineKind, g: &ScanlineGlobal, mem: &VramView, sp: &Span) {
    match kind {
        ScanlineKind::Generic => draw_span_generic(g, mem, sp),
        ScanlineKind::FlatOpaque32 => draw_span_flat32(g, mem, sp),
        ScanlineKind::ModulateTexOpaque32 => draw_span_modtex32(g, mem, sp),
    }
}

#[inline]
fn lerp8(a: i32, b: i32, f: i32) -> i32 {
    a + (((b - a) * f) >> 8)
}

#[inline]
fn wrap_coord(u: i32, mode: Wrap, size: i32, min: i32, max: i32) -> i32 {
    let u = match mode {
        Wrap::Repeat => u & (size - 1),
        Wrap::Clamp => u.clamp(0, size - 1),
        Wrap::RegionClamp => u.clamp(min, max),
        Wrap::RegionRepeat => (u & min) | max,
    };
    u.clamp(0, size - 1)
}

/// Sample the texture at fractional texel coordinates
fn sample(sel: &ScanlineSelector, tex: &TextureView, u: f32, v: f32) -> [i32; 4] {
    let (w, h) = (tex.w as i32, tex.h as i32);

    if !sel.ltf {
        let ui = wrap_coord(u.floor() as i32, sel.wms, w, tex.minu, tex.maxu);
        let vi = wrap_coord(v.floor() as i32, sel.wmt, h, tex.minv, tex.maxv);
        return unpack(tex.texel(ui, vi));
    }

    // Bilinear: shift by half a texel, take 8-bit fractions from the 16.16
    // fixed-point coordinate.
    let uf = ((u - 0.5) * 65536.0).floor() as i64;
    let vf = ((v - 0.5) * 65536.0).floor() as i64;
    let u0 = (uf >> 16) as i32;
    let v0 = (vf >> 16) as i32;
    let fu = ((uf >> 8) & 0xff) as i32;
    let fv = ((vf >> 8) & 0xff) as i32;

    let u0w = wrap_coord(u0, sel.wms, w, tex.minu, tex.maxu);
    let u1w = wrap_coord(u0 + 1, sel.wms, w, tex.minu, tex.maxu);
    let v0w = wrap_coord(v0, sel.wmt, h, tex.minv, tex.maxv);
    let v1w = wrap_coord(v0 + 1, sel.wmt, h, tex.minv, tex.maxv);

    let c00 = unpack(tex.texel(u0w, v0w));
    let c10 = unpack(tex.texel(u1w, v0w));
    let c01 = unpack(tex.texel(u0w, v1w));
    let c11 = unpack(tex.texel(u1w, v1w));

    let mut out = [0i32; 4];
    for i in 0..4 {
        let top = lerp8(c00[i], c10[i], fu);
        let bot = lerp8(c01[i], c11[i], fu);
        out[i] = lerp8(top, bot, fv);
    }
    out
}

#[inline]
fn unpack(c: u32) -> [i32; 4] {
    [
        (c & 0xff) as i32,
        ((c >> 8) & 0xff) as i32,
        ((c >> 16) & 0xff) as i32,
        (c >> 24) as i32,
    ]
}

#[inline]
fn pack(c: [i32; 4]) -> u32 {
    (c[0] as u32 & 0xff)
        | ((c[1] as u32 & 0xff) << 8)
        | ((c[2] as u32 & 0xff) << 16)
        | ((c[3] as u32 & 0xff) << 24)
}

/// Combine texture and vertex color per the texture function
fn color_tfx(sel: &ScanlineSelector, cs: [i32; 4], ct: [i32; 4]) -> [i32; 4] {
    let mut out = [0i32; 4];
    match sel.tfx {
        Tfx::Modulate => {
            for i in 0..3 {
                out[i] = ((ct[i] * cs[i]) >> 7).min(255);
            }
            out[3] = if sel.tcc { ((ct[3] * cs[3]) >> 7).min(255) } else { cs[3] };
        }
        Tfx::Decal => {
            out[..3].copy_from_slice(&ct[..3]);
            out[3] = if sel.tcc { ct[3] } else { cs[3] };
        }
        Tfx::Highlight | Tfx::Highlight2 => {
            for i in 0..3 {
                out[i] = (((ct[i] * cs[i]) >> 7) + cs[3]).min(255);
            }
            out[3] = match (sel.tfx, sel.tcc) {
                (Tfx::Highlight, true) => (ct[3] + cs[3]).min(255),
                (Tfx::Highlight2, true) => ct[3],
                _ => cs[3],
            };
        }
    }
    out
}

#[inline]
fn test_alpha(sel: &ScanlineSelector, a: i32) -> bool {
    match sel.atst {
        Atst::Never => false,
        Atst::Always => true,
        Atst::LEqual => a <= sel.aref,
        Atst::Equal => a == sel.aref,
        Atst::GEqual => a >= sel.aref,
        Atst::NotEqual => a != sel.aref,
        // Rewritten away at compile time.
        Atst::Less | Atst::Greater => unreachable!("uncompiled alpha test"),
    }
}

/// Expand a stored frame pixel to 8888 for blending; 16-bit alpha reads the
/// stored bit as 0x80, 24-bit reads as 0x80 (opaque)
#[inline]
fn expand_dest(fpsm: u8, v: u32) -> [i32; 4] {
    match fpsm {
        2 => [
            ((v & 0x001f) << 3) as i32,
            ((v & 0x03e0) >> 2) as i32,
            ((v & 0x7c00) >> 7) as i32,
            if v & 0x8000 != 0 { 0x80 } else { 0 },
        ],
        1 => [
            (v & 0xff) as i32,
            ((v >> 8) & 0xff) as i32,
            ((v >> 16) & 0xff) as i32,
            0x80,
        ],
        _ => unpack(v),
    }
}

/// 8888 to 1555
#[inline]
pub fn to_1555(c: u32) -> u32 {
    ((c >> 16) & 0x8000) | ((c >> 9) & 0x7c00) | ((c >> 6) & 0x03e0) | ((c >> 3) & 0x001f)
}

/// The general pipeline, complete for every selector
fn draw_span_generic(g: &ScanlineGlobal, mem: &VramView, sp: &Span) {
    let sel = g.sel;
    if sp.x0 >= sp.x1 {
        return;
    }
    let y = sp.y as u32;
    let (frow, fcols) = g.fb.row_cols(y);
    let (zrow, zcols) = g.zb.row_cols(y);
    let fpsm_e = g.fb.psm();
    let zpsm_e = g.zb.psm();

    let mut z = sp.z;
    let mut f = sp.f;
    let mut c = sp.c;
    let mut t = sp.t;

    for x in sp.x0..sp.x1 {
        let zs = if z <= 0.0 {
            0
        } else if z >= g.zmax as f64 {
            g.zmax
        } else {
            z as u32
        };
        let zaddr = (zrow as i32 + zcols[x as usize]) as u32;

        let pass_z = if sel.ztest {
            let zd = mem.load(zpsm_e, zaddr);
            match sel.ztst {
                Ztst::Never => false,
                Ztst::GEqual => zs >= zd,
                _ => true,
            }
        } else {
            true
        };
        if !pass_z {
            step(&mut z, &mut f, &mut c, &mut t, sp);
            continue;
        }

        // Vertex color at this pixel.
        let cs = [
            (c[0] as i32).clamp(0, 255),
            (c[1] as i32).clamp(0, 255),
            (c[2] as i32).clamp(0, 255),
            (c[3] as i32).clamp(0, 255),
        ];

        let mut col = match (sel.tme, g.tex.as_ref()) {
            (true, Some(tex)) => {
                let (u, v) = if sel.fst {
                    (t[0], t[1])
                } else {
                    let q = if t[2] != 0.0 { t[2] } else { 1.0 };
                    (t[0] / q * tex.w as f32, t[1] / q * tex.h as f32)
                };
                color_tfx(&sel, cs, sample(&sel, tex, u, v))
            }
            _ => cs,
        };

        // Alpha test decides what still gets written on failure.
        let (fwrite_px, zwrite_px, rgb_only) = if test_alpha(&sel, col[3]) {
            (true, true, false)
        } else {
            match sel.afail {
                Afail::Keep => {
                    step(&mut z, &mut f, &mut c, &mut t, sp);
                    continue;
                }
                Afail::FbOnly => (true, false, false),
                Afail::ZbOnly => (false, true, false),
                Afail::RgbOnly => (true, false, true),
            }
        };

        let faddr = (frow as i32 + fcols[x as usize]) as u32;
        let mut dval: Option<u32> = None;

        if sel.date {
            let d = mem.load(fpsm_e, faddr);
            dval = Some(d);
            let bit = if sel.fpsm == 2 { d & 0x8000 != 0 } else { d & 0x8000_0000 != 0 };
            if bit != sel.datm {
                step(&mut z, &mut f, &mut c, &mut t, sp);
                continue;
            }
        }

        if sel.fge {
            let fc = unpack(g.fog_rgb);
            let fi = (f as i32).clamp(0, 255);
            for i in 0..3 {
                col[i] = (fi * col[i] + (255 - fi) * fc[i]) >> 8;
            }
        }

        if sel.abe && sel.fwrite && fwrite_px && (!sel.pabe || col[3] & 0x80 != 0) {
            let d = match dval {
                Some(d) => d,
                None => {
                    let d = mem.load(fpsm_e, faddr);
                    dval = Some(d);
                    d
                }
            };
            let cd = expand_dest(sel.fpsm, d);
            let pick = |s: u8| -> [i32; 3] {
                match s {
                    0 => [col[0], col[1], col[2]],
                    1 => [cd[0], cd[1], cd[2]],
                    _ => [0, 0, 0],
                }
            };
            let a = pick(sel.aba);
            let b = pick(sel.abb);
            let d3 = pick(sel.abd);
            let cf = match sel.abc {
                0 => col[3],
                1 => cd[3],
                _ => g.afix as i32,
            };
            for i in 0..3 {
                col[i] = (((a[i] - b[i]) * cf) >> 7) + d3[i];
            }
        }

        if sel.dthe {
            let dm = g.dimx[(y & 3) as usize][(x & 3) as usize];
            for v in col.iter_mut().take(3) {
                *v += dm;
            }
        }

        for v in col.iter_mut().take(3) {
            *v = if sel.colclamp { (*v).clamp(0, 255) } else { *v & 0xff };
        }
        col[3] = col[3].clamp(0, 255);

        if sel.fba {
            col[3] |= 0x80;
        }

        if sel.fwrite && fwrite_px {
            let src = pack(col);
            let mut msk = g.fbmsk;
            if rgb_only {
                msk |= if sel.fpsm == 2 { 0x8000 } else { 0xff00_0000 };
            }
            let new = if sel.fpsm == 2 { to_1555(src) } else { src };
            let out = if msk != 0 {
                // 16-bit destinations were loaded in native format already.
                let old = dval.unwrap_or_else(|| mem.load(fpsm_e, faddr));
                (old & msk) | (new & !msk)
            } else {
                new
            };
            mem.store(fpsm_e, faddr, out);
        }

        if sel.zwrite && zwrite_px {
            mem.store(zpsm_e, zaddr, zs);
        }

        step(&mut z, &mut f, &mut c, &mut t, sp);
    }
}

#[inline]
fn step(z: &mut f64, f: &mut f32, c: &mut [f32; 4], t: &mut [f32; 3], sp: &Span) {
    *z += sp.dz;
    *f += sp.df;
    for i in 0..4 {
        c[i] += sp.dc[i];
    }
    for i in 0..3 {
        t[i] += sp.dt[i];
    }
}

/// Flat untextured opaque fill, 32-bit frame, no tests
///
/// Must match the generic path bit for bit on its selectors.
fn draw_span_flat32(g: &ScanlineGlobal, mem: &VramView, sp: &Span) {
    if sp.x0 >= sp.x1 {
        return;
    }
    let sel = g.sel;
    let (frow, fcols) = g.fb.row_cols(sp.y as u32);
    let mut c = [
        (sp.c[0] as i32).clamp(0, 255),
        (sp.c[1] as i32).clamp(0, 255),
        (sp.c[2] as i32).clamp(0, 255),
        (sp.c[3] as i32).clamp(0, 255),
    ];
    if sel.fba {
        c[3] |= 0x80;
    }
    let src = pack(c);

    if sel.zwrite {
        let (zrow, zcols) = g.zb.row_cols(sp.y as u32);
        let zpsm_e = g.zb.psm();
        let mut z = sp.z;
        for x in sp.x0..sp.x1 {
            let zs = if z <= 0.0 {
                0
            } else if z >= g.zmax as f64 {
                g.zmax
            } else {
                z as u32
            };
            mem.write_word((frow as i32 + fcols[x as usize]) as u32, src);
            mem.store(zpsm_e, (zrow as i32 + zcols[x as usize]) as u32, zs);
            z += sp.dz;
        }
    } else {
        for x in sp.x0..sp.x1 {
            mem.write_word((frow as i32 + fcols[x as usize]) as u32, src);
        }
    }
}

/// Point-sampled modulate texturing, opaque, 32-bit frame, UV addressing
fn draw_span_modtex32(g: &ScanlineGlobal, mem: &VramView, sp: &Span) {
    if sp.x0 >= sp.x1 {
        return;
    }
    let sel = g.sel;
    let Some(tex) = g.tex.as_ref() else {
        return;
    };
    let (w, h) = (tex.w as i32, tex.h as i32);
    let (frow, fcols) = g.fb.row_cols(sp.y as u32);
    let (zrow, zcols) = g.zb.row_cols(sp.y as u32);
    let zpsm_e = g.zb.psm();

    let cs = [
        (sp.c[0] as i32).clamp(0, 255),
        (sp.c[1] as i32).clamp(0, 255),
        (sp.c[2] as i32).clamp(0, 255),
        (sp.c[3] as i32).clamp(0, 255),
    ];

    let mut z = sp.z;
    let mut u = sp.t[0];
    let mut v = sp.t[1];
    for x in sp.x0..sp.x1 {
        let ui = wrap_coord(u.floor() as i32, sel.wms, w, tex.minu, tex.maxu);
        let vi = wrap_coord(v.floor() as i32, sel.wmt, h, tex.minv, tex.maxv);
        let ct = unpack(tex.texel(ui, vi));
        let mut col = color_tfx(&sel, cs, ct);
        if sel.fba {
            col[3] |= 0x80;
        }
        mem.write_word((frow as i32 + fcols[x as usize]) as u32, pack(col));
        if sel.zwrite {
            let zs = if z <= 0.0 {
                0
            } else if z >= g.zmax as f64 {
                g.zmax
            } else {
                z as u32
            };
            mem.store(zpsm_e, (zrow as i32 + zcols[x as usize]) as u32, zs);
        }
        z += sp.dz;
        u += sp.dt[0];
        v += sp.dt[1];
    }
}

/// Direct fill of an axis-aligned rectangle with a constant color and depth
///
/// The rasterizer routes eligible sprites here: untextured, unblended,
/// untested, fully unmasked. `rows` restricts the fill to the worker's
/// interleave (`row % count == id`).
pub fn fill_rect(
    g: &ScanlineGlobal,
    mem: &VramView,
    rect: Rect,
    color: [u8; 4],
    z: u32,
    rows: (u32, u32),
) {
    let sel = g.sel;
    let (id, count) = rows;
    let mut c = [color[0] as i32, color[1] as i32, color[2] as i32, color[3] as i32];
    if sel.fba {
        c[3] |= 0x80;
    }
    let src32 = pack(c);
    let native = match sel.fpsm {
        2 => to_1555(src32),
        _ => src32,
    };
    let fpsm_e = g.fb.psm();
    let zpsm_e = g.zb.psm();
    let zs = z.min(g.zmax);

    for y in rect.y0..rect.y1 {
        if (y as u32) % count != id {
            continue;
        }
        let (frow, fcols) = g.fb.row_cols(y as u32);
        if sel.fwrite {
            match sel.fpsm {
                0 => {
                    for x in rect.x0..rect.x1 {
                        mem.write_word((frow as i32 + fcols[x as usize]) as u32, native);
                    }
                }
                2 => {
                    for x in rect.x0..rect.x1 {
                        mem.write_hword((frow as i32 + fcols[x as usize]) as u32, native as u16);
                    }
                }
                _ => {
                    for x in rect.x0..rect.x1 {
                        mem.store(fpsm_e, (frow as i32 + fcols[x as usize]) as u32, native);
                    }
                }
            }
        }
        if sel.zwrite {
            let (zrow, zcols) = g.zb.row_cols(y as u32);
            for x in rect.x0..rect.x1 {
                mem.store(zpsm_e, (zrow as i32 + zcols[x as usize]) as u32, zs);
            }
        }
    }
}
