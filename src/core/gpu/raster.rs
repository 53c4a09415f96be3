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

//! Primitive rasterization
//!
//! Converts points, lines, triangles and sprites into scanline spans and
//! hands them to the scanline engine. Sampling happens at pixel centers
//! (`y + 0.5`), spans cover `[ceil(xl - 0.5), ceil(xr - 0.5))`, so shared
//! triangle edges neither double-draw nor gap. Attributes are carried as a
//! start value at the first pixel center plus a per-pixel delta from the
//! triangle's plane gradients.
//!
//! Parallel execution partitions by row: a rasterizer invocation only
//! touches rows where `row % count == id`, which keeps workers from ever
//! writing the same pixel.

use crate::core::error::{GsError, Result};
use crate::core::memory::{ClutDesc, Psm, Rect, Texa, VramView, BLOCK_COUNT};
use crate::core::gpu::scanline::{self, ScanlineGlobal, ScanlineKind, Span};
use crate::core::gpu::selector::DrawState;
use crate::core::gpu::vertex::{GsVertex, PrimClass};

/// A VRAM buffer binding: base block, width, format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub bp: u32,
    pub bw: u32,
    pub psm: Psm,
}

impl BufferDesc {
    /// Reject configurations the addressing tables cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.bw == 0 || self.bw > 32 {
            return Err(GsError::InvalidBufferWidth { bw: self.bw });
        }
        if self.bp as usize >= BLOCK_COUNT {
            return Err(GsError::InvalidBasePointer { bp: self.bp });
        }
        Ok(())
    }
}

/// Texture binding for one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexDesc {
    pub tbp0: u32,
    pub tbw: u32,
    pub psm: Psm,
    /// Texture size in pixels (powers of two on real hardware, but nothing
    /// here requires it except the repeat wrap)
    pub tw: u32,
    pub th: u32,
    /// Palette descriptor for indexed formats
    pub clut: Option<ClutDesc>,
    /// Region wrap parameters (min/max, or msk/fix for region-repeat)
    pub minu: i32,
    pub maxu: i32,
    pub minv: i32,
    pub maxv: i32,
}

impl TexDesc {
    /// Reject configurations the addressing tables cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.tbw == 0 || self.tbw > 32 {
            return Err(GsError::InvalidBufferWidth { bw: self.tbw });
        }
        if self.tbp0 as usize >= BLOCK_COUNT {
            return Err(GsError::InvalidBasePointer { bp: self.tbp0 });
        }
        if let Some(clut) = &self.clut {
            if !matches!(clut.cpsm, Psm::Ct32 | Psm::Ct16 | Psm::Ct16s) {
                return Err(GsError::InvalidPaletteFormat(clut.cpsm.raw()));
            }
            if clut.cbp as usize >= BLOCK_COUNT {
                return Err(GsError::InvalidBasePointer { bp: clut.cbp });
            }
        }
        Ok(())
    }
}

/// Everything the decoder hands over for one draw
#[derive(Debug, Clone)]
pub struct DrawCommand {
    pub prim: PrimClass,
    pub vertices: Vec<GsVertex>,
    pub scissor: Rect,
    pub state: DrawState,
    pub fb: BufferDesc,
    pub zb: BufferDesc,
    pub tex: Option<TexDesc>,
    pub texa: Texa,
    /// Fog color, 0x00RRGGBB
    pub fog_rgb: u32,
    /// Signed dither matrix
    pub dimx: [[i32; 4]; 4],
}

impl DrawCommand {
    /// Conservative bounding rectangle of the draw, clipped to the scissor
    pub fn bounds(&self) -> Rect {
        let mut bb = Rect::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for v in &self.vertices {
            bb.x0 = bb.x0.min(v.x.floor() as i32);
            bb.y0 = bb.y0.min(v.y.floor() as i32);
            bb.x1 = bb.x1.max(v.x.ceil() as i32);
            bb.y1 = bb.y1.max(v.y.ceil() as i32);
        }
        bb.intersect(&self.scissor)
    }
}

/// The row interleave owned by one rasterizer invocation
#[derive(Debug, Clone, Copy)]
pub struct RowSlice {
    pub id: u32,
    pub count: u32,
}

impl RowSlice {
    /// The whole surface, for inline execution
    pub fn full() -> RowSlice {
        RowSlice { id: 0, count: 1 }
    }

    #[inline]
    fn owns(&self, y: i32) -> bool {
        (y as u32) % self.count == self.id
    }
}

/// Interpolated attributes: f, r, g, b, a, s, t, q
type Attrs = [f32; 8];

fn attrs_of(v: &GsVertex) -> Attrs {
    [
        v.f as f32,
        v.c[0] as f32,
        v.c[1] as f32,
        v.c[2] as f32,
        v.c[3] as f32,
        v.s,
        v.t,
        v.q,
    ]
}

fn span_from(y: i32, x0: i32, x1: i32, z: f64, dz: f64, a: Attrs, dx: Attrs) -> Span {
    Span {
        y,
        x0,
        x1,
        z,
        dz,
        f: a[0],
        df: dx[0],
        c: [a[1], a[2], a[3], a[4]],
        dc: [dx[1], dx[2], dx[3], dx[4]],
        t: [a[5], a[6], a[7]],
        dt: [dx[5], dx[6], dx[7]],
    }
}

/// Rasterize the rows of `cmd` owned by `slice`
///
/// Degenerate primitives (zero area, empty after scissor) are dropped
/// silently; the caller has already compiled the selector and resolved the
/// texture.
pub fn rasterize(
    cmd: &DrawCommand,
    kind: ScanlineKind,
    g: &ScanlineGlobal,
    mem: &VramView,
    slice: RowSlice,
) {
    let n = cmd.prim.vertices_per_prim();
    for prim in cmd.vertices.chunks_exact(n) {
        match cmd.prim {
            PrimClass::Triangle => draw_triangle(prim, kind, g, mem, &cmd.scissor, slice),
            PrimClass::Sprite => draw_sprite(prim, kind, g, mem, &cmd.scissor, slice),
            PrimClass::Line => draw_line(prim, kind, g, mem, &cmd.scissor, slice),
            PrimClass::Point => draw_point(&prim[0], kind, g, mem, &cmd.scissor, slice),
        }
    }
}

/// Whether a sprite under this selector is a pure constant fill
pub fn sprite_is_solid(g: &ScanlineGlobal) -> bool {
    let sel = &g.sel;
    sel.notest && !sel.tme && !sel.abe && !sel.fge && !sel.dthe && !sel.rfb && sel.fwrite
}

fn draw_triangle(
    v: &[GsVertex],
    kind: ScanlineKind,
    g: &ScanlineGlobal,
    mem: &VramView,
    scissor: &Rect,
    slice: RowSlice,
) {
    // Sort by ascending y, then x, so the fill convention is stable for any
    // vertex order.
    let mut v = [v[0], v[1], v[2]];
    v.sort_by(|a, b| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal).then(
        a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal),
    ));
    let [v0, v1, v2] = v;

    let area = (v1.x - v0.x) * (v2.y - v0.y) - (v2.x - v0.x) * (v1.y - v0.y);
    if area == 0.0 {
        return;
    }
    let inv = 1.0 / area;

    // Plane gradients over the triangle, one pair per attribute.
    let a0 = attrs_of(&v0);
    let a1 = attrs_of(&v1);
    let a2 = attrs_of(&v2);
    let mut dx = [0f32; 8];
    let mut dy = [0f32; 8];
    for i in 0..8 {
        dx[i] = ((a1[i] - a0[i]) * (v2.y - v0.y) - (a2[i] - a0[i]) * (v1.y - v0.y)) * inv;
        dy[i] = ((a2[i] - a0[i]) * (v1.x - v0.x) - (a1[i] - a0[i]) * (v2.x - v0.x)) * inv;
    }
    let inv64 = inv as f64;
    let dzdx = ((v1.z as f64 - v0.z as f64) * (v2.y - v0.y) as f64
        - (v2.z as f64 - v0.z as f64) * (v1.y - v0.y) as f64)
        * inv64;
    let dzdy = ((v2.z as f64 - v0.z as f64) * (v1.x - v0.x) as f64
        - (v1.z as f64 - v0.z as f64) * (v2.x - v0.x) as f64)
        * inv64;

    let y_start = ((v0.y - 0.5).ceil() as i32).max(scissor.y0);
    let y_end = (((v2.y - 0.5).ceil()) as i32).min(scissor.y1);

    for y in y_start..y_end {
        if !slice.owns(y) {
            continue;
        }
        let cy = y as f32 + 0.5;
        if cy < v0.y || cy >= v2.y {
            continue;
        }
        // Long edge v0-v2 on one side, the active short edge on the other.
        let x_long = v0.x + (cy - v0.y) * (v2.x - v0.x) / (v2.y - v0.y);
        let x_short = if cy < v1.y {
            v0.x + (cy - v0.y) * (v1.x - v0.x) / (v1.y - v0.y)
        } else {
            v1.x + (cy - v1.y) * (v2.x - v1.x) / (v2.y - v1.y)
        };
        let (xl, xr) = if x_long <= x_short { (x_long, x_short) } else { (x_short, x_long) };

        let x0 = ((xl - 0.5).ceil() as i32).max(scissor.x0);
        let x1 = ((xr - 0.5).ceil() as i32).min(scissor.x1);
        if x0 >= x1 {
            continue;
        }

        let px = x0 as f32 + 0.5;
        let mut a = [0f32; 8];
        for i in 0..8 {
            a[i] = a0[i] + dx[i] * (px - v0.x) + dy[i] * (cy - v0.y);
        }
        let z = v0.z as f64 + dzdx * (px - v0.x) as f64 + dzdy * (cy - v0.y) as f64;
        scanline::draw_span(kind, g, mem, &span_from(y, x0, x1, z, dzdx, a, dx));
    }
}

fn draw_sprite(
    v: &[GsVertex],
    kind: ScanlineKind,
    g: &ScanlineGlobal,
    mem: &VramView,
    scissor: &Rect,
    slice: RowSlice,
) {
    let (p0, p1) = (&v[0], &v[1]);
    let (xl, xr) = if p0.x <= p1.x { (p0.x, p1.x) } else { (p1.x, p0.x) };
    let (yt, yb) = if p0.y <= p1.y { (p0.y, p1.y) } else { (p1.y, p0.y) };

    let x0 = ((xl - 0.5).ceil() as i32).max(scissor.x0);
    let x1 = ((xr - 0.5).ceil() as i32).min(scissor.x1);
    let y0 = ((yt - 0.5).ceil() as i32).max(scissor.y0);
    let y1 = ((yb - 0.5).ceil() as i32).min(scissor.y1);
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    // Color, depth and fog come flat from the second vertex.
    if sprite_is_solid(g) {
        scanline::fill_rect(
            g,
            mem,
            Rect::new(x0, y0, x1, y1),
            p1.c,
            p1.z,
            (slice.id, slice.count),
        );
        return;
    }

    // Texture coordinates vary linearly across the rectangle.
    let w = xr - xl;
    let h = yb - yt;
    let (s_left, s_right) = if p0.x <= p1.x { (p0.s, p1.s) } else { (p1.s, p0.s) };
    let (t_top, t_bot) = if p0.y <= p1.y { (p0.t, p1.t) } else { (p1.t, p0.t) };
    let dsdx = if w != 0.0 { (s_right - s_left) / w } else { 0.0 };
    let dtdy = if h != 0.0 { (t_bot - t_top) / h } else { 0.0 };

    let mut a = attrs_of(p1);
    a[7] = 1.0;
    let mut dx = [0f32; 8];
    dx[5] = dsdx;
    for y in y0..y1 {
        if !slice.owns(y) {
            continue;
        }
        let cy = y as f32 + 0.5;
        a[5] = s_left + dsdx * (x0 as f32 + 0.5 - xl);
        a[6] = t_top + dtdy * (cy - yt);
        scanline::draw_span(
            kind,
            g,
            mem,
            &span_from(y, x0, x1, p1.z as f64, 0.0, a, dx),
        );
    }
}

fn draw_line(
    v: &[GsVertex],
    kind: ScanlineKind,
    g: &ScanlineGlobal,
    mem: &VramView,
    scissor: &Rect,
    slice: RowSlice,
) {
    let (p0, p1) = (&v[0], &v[1]);
    let dx = p1.x - p0.x;
    let dy = p1.y - p0.y;
    let steps = dx.abs().max(dy.abs()).ceil() as i32;
    if steps == 0 {
        return;
    }
    let a0 = attrs_of(p0);
    let a1 = attrs_of(p1);
    let zero = [0f32; 8];

    for i in 0..=steps {
        let s = i as f32 / steps as f32;
        let px = ((p0.x + dx * s - 0.5).ceil()) as i32;
        let py = ((p0.y + dy * s - 0.5).ceil()) as i32;
        if px < scissor.x0 || px >= scissor.x1 || py < scissor.y0 || py >= scissor.y1 {
            continue;
        }
        if !slice.owns(py) {
            continue;
        }
        let mut a = [0f32; 8];
        for j in 0..8 {
            a[j] = a0[j] + (a1[j] - a0[j]) * s;
        }
        let z = p0.z as f64 + (p1.z as f64 - p0.z as f64) * s as f64;
        scanline::draw_span(kind, g, mem, &span_from(py, px, px + 1, z, 0.0, a, zero));
    }
}

fn draw_point(
    p: &GsVertex,
    kind: ScanlineKind,
    g: &ScanlineGlobal,
    mem: &VramView,
    scissor: &Rect,
    slice: RowSlice,
) {
    let px = ((p.x - 0.5).ceil()) as i32;
    let py = ((p.y - 0.5).ceil()) as i32;
    if px < scissor.x0 || px >= scissor.x1 || py < scissor.y0 || py >= scissor.y1 {
        return;
    }
    if !slice.owns(py) {
        return;
    }
    let zero = [0f32; 8];
    scanline::draw_span(
        kind,
        g,
        mem,
        &span_from(py, px, px + 1, p.z as f64, 0.0, attrs_of(p), zero),
    );
}
