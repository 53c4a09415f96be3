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

//! Rasterizer tests
//!
//! Coverage and fill-convention checks against the pixel-center sampling
//! rule, plus the row-interleave partition the worker pool relies on.

use crate::core::gpu::raster::{self, BufferDesc, DrawCommand, RowSlice};
use crate::core::gpu::scanline::{self, ScanlineGlobal};
use crate::core::gpu::selector::{DrawFlags, DrawState, ScanlineSelector};
use crate::core::gpu::vertex::{GsVertex, PrimClass};
use crate::core::memory::{LocalMemory, Psm, Rect, Texa};

const BW: u32 = 1;
const FB_BP: u32 = 0;
const ZB_BP: u32 = 0x100;

fn command(prim: PrimClass, vertices: Vec<GsVertex>, state: DrawState) -> DrawCommand {
    DrawCommand {
        prim,
        vertices,
        scissor: Rect::new(0, 0, 64, 64),
        state,
        fb: BufferDesc { bp: FB_BP, bw: BW, psm: state.fpsm },
        zb: BufferDesc { bp: ZB_BP, bw: BW, psm: state.zpsm },
        tex: None,
        texa: Texa::default(),
        fog_rgb: 0,
        dimx: [[0; 4]; 4],
    }
}

fn run(cmd: &DrawCommand, mem: &mut LocalMemory, slice: RowSlice) {
    let sel = ScanlineSelector::compile(&cmd.state).unwrap();
    let g = ScanlineGlobal {
        sel,
        fb: mem.offset(cmd.fb.bp, cmd.fb.bw, cmd.fb.psm),
        zb: mem.offset(cmd.zb.bp, cmd.zb.bw, cmd.zb.psm),
        fbmsk: cmd.state.fbmsk,
        afix: cmd.state.afix,
        fog_rgb: cmd.fog_rgb,
        tex: None,
        dimx: cmd.dimx,
        zmax: cmd.zb.psm.descriptor().z_mask(),
    };
    let kind = scanline::select_kind(&sel);
    raster::rasterize(cmd, kind, &g, &mem.view(), slice);
}

/// Two triangles sharing the diagonal of a rectangle cover each pixel in
/// the rectangle exactly once: additive blending would expose any overlap
/// and a zero pixel any gap.
#[test]
fn test_shared_edge_no_overlap_no_gap() {
    let state = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::ABE,
        aba: 0,
        abb: 2,
        abc: 2,
        abd: 1,
        afix: 0x80,
        ..DrawState::default()
    };
    let c = [100u8, 100, 100, 100];
    let t1 = vec![
        GsVertex::xy(10.0, 10.0).with_color(c),
        GsVertex::xy(30.0, 10.0).with_color(c),
        GsVertex::xy(10.0, 20.0).with_color(c),
    ];
    let t2 = vec![
        GsVertex::xy(30.0, 10.0).with_color(c),
        GsVertex::xy(30.0, 20.0).with_color(c),
        GsVertex::xy(10.0, 20.0).with_color(c),
    ];
    let mut mem = LocalMemory::new();
    run(&command(PrimClass::Triangle, t1, state), &mut mem, RowSlice::full());
    run(&command(PrimClass::Triangle, t2, state), &mut mem, RowSlice::full());

    for y in 10..20 {
        for x in 10..30 {
            let r = mem.read_pixel(Psm::Ct32, x, y, FB_BP, BW) & 0xff;
            assert_eq!(r, 100, "pixel ({x}, {y})");
        }
    }
    // Nothing outside the rectangle.
    for x in 9..31 {
        assert_eq!(mem.read_pixel(Psm::Ct32, x, 9, FB_BP, BW), 0);
        assert_eq!(mem.read_pixel(Psm::Ct32, x, 20, FB_BP, BW), 0);
    }
}

/// Zero-area triangles draw nothing.
#[test]
fn test_degenerate_triangle_dropped() {
    let c = [1u8, 1, 1, 1];
    let tri = vec![
        GsVertex::xy(5.0, 5.0).with_color(c),
        GsVertex::xy(15.0, 15.0).with_color(c),
        GsVertex::xy(25.0, 25.0).with_color(c),
    ];
    let mut mem = LocalMemory::new();
    run(&command(PrimClass::Triangle, tri, DrawState::default()), &mut mem, RowSlice::full());
    for y in 0..30 {
        for x in 0..30 {
            assert_eq!(mem.read_pixel(Psm::Ct32, x, y, FB_BP, BW), 0);
        }
    }
}

/// The scissor clips spans on both axes.
#[test]
fn test_scissor_clips_triangle() {
    let c = [7u8, 7, 7, 7];
    let tri = vec![
        GsVertex::xy(0.0, 0.0).with_color(c),
        GsVertex::xy(40.0, 0.0).with_color(c),
        GsVertex::xy(0.0, 40.0).with_color(c),
    ];
    let mut cmd = command(PrimClass::Triangle, tri, DrawState::default());
    cmd.scissor = Rect::new(12, 12, 14, 14);
    let mut mem = LocalMemory::new();
    run(&cmd, &mut mem, RowSlice::full());
    for y in 0..30 {
        for x in 0..30 {
            let inside = (12..14).contains(&x) && (12..14).contains(&y);
            let v = mem.read_pixel(Psm::Ct32, x as u32, y as u32, FB_BP, BW);
            assert_eq!(v != 0, inside, "pixel ({x}, {y})");
        }
    }
}

/// Sprites fill the half-open pixel rectangle of their two corners.
#[test]
fn test_sprite_extent() {
    let c = [9u8, 8, 7, 6];
    let sprite = vec![
        GsVertex::xy(5.0, 3.0).with_color(c),
        GsVertex::xy(9.0, 7.0).with_color(c).with_z(42),
    ];
    let mut mem = LocalMemory::new();
    run(&command(PrimClass::Sprite, sprite, DrawState::default()), &mut mem, RowSlice::full());
    for y in 0..10 {
        for x in 0..12 {
            let inside = (5..9).contains(&x) && (3..7).contains(&y);
            let v = mem.read_pixel(Psm::Ct32, x as u32, y as u32, FB_BP, BW);
            assert_eq!(v != 0, inside, "pixel ({x}, {y})");
            if inside {
                assert_eq!(v, 0x0607_0809);
                assert_eq!(mem.read_pixel(Psm::Z32, x as u32, y as u32, ZB_BP, BW), 42);
            }
        }
    }
}

/// Gouraud interpolation is monotonic along a color gradient.
#[test]
fn test_gouraud_gradient_monotonic() {
    let tri = vec![
        GsVertex::xy(0.0, 0.0).with_color([0, 0, 0, 255]),
        GsVertex::xy(32.0, 0.0).with_color([255, 0, 0, 255]),
        GsVertex::xy(0.0, 32.0).with_color([0, 0, 0, 255]),
    ];
    let state = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::IIP,
        ..DrawState::default()
    };
    let mut mem = LocalMemory::new();
    run(&command(PrimClass::Triangle, tri, state), &mut mem, RowSlice::full());
    let mut prev = 0;
    for x in 0..28 {
        let r = mem.read_pixel(Psm::Ct32, x, 2, FB_BP, BW) & 0xff;
        assert!(r >= prev, "red decreased at x={x}");
        prev = r;
    }
    assert!(prev > 150);
}

/// A horizontal line touches every pixel between its endpoints inclusive.
#[test]
fn test_line_covers_endpoints() {
    let c = [3u8, 3, 3, 3];
    let line = vec![
        GsVertex::xy(5.5, 5.5).with_color(c),
        GsVertex::xy(10.5, 5.5).with_color(c),
    ];
    let mut mem = LocalMemory::new();
    run(&command(PrimClass::Line, line, DrawState::default()), &mut mem, RowSlice::full());
    for x in 5..=10 {
        assert_eq!(mem.read_pixel(Psm::Ct32, x, 5, FB_BP, BW), 0x0303_0303);
    }
    assert_eq!(mem.read_pixel(Psm::Ct32, 4, 5, FB_BP, BW), 0);
    assert_eq!(mem.read_pixel(Psm::Ct32, 11, 5, FB_BP, BW), 0);
}

/// A point lands on exactly one pixel.
#[test]
fn test_point_single_pixel() {
    let p = vec![GsVertex::xy(7.5, 9.5).with_color([1, 1, 1, 1])];
    let mut mem = LocalMemory::new();
    run(&command(PrimClass::Point, p, DrawState::default()), &mut mem, RowSlice::full());
    let mut count = 0;
    for y in 0..16 {
        for x in 0..16 {
            if mem.read_pixel(Psm::Ct32, x, y, FB_BP, BW) != 0 {
                count += 1;
                assert_eq!((x, y), (7, 9));
            }
        }
    }
    assert_eq!(count, 1);
}

/// Running the interleaved slices sequentially reproduces the full
/// rasterization, so parallel workers compose to the same image.
#[test]
fn test_row_interleave_partition() {
    let tri = vec![
        GsVertex::xy(2.0, 1.0).with_color([10, 200, 30, 255]),
        GsVertex::xy(40.0, 5.0).with_color([200, 10, 90, 128]),
        GsVertex::xy(8.0, 38.0).with_color([50, 60, 70, 80]),
    ];
    let state = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::IIP,
        ..DrawState::default()
    };

    let mut whole = LocalMemory::new();
    run(&command(PrimClass::Triangle, tri.clone(), state), &mut whole, RowSlice::full());

    let mut parts = LocalMemory::new();
    for id in 0..3 {
        run(
            &command(PrimClass::Triangle, tri.clone(), state),
            &mut parts,
            RowSlice { id, count: 3 },
        );
    }
    assert_eq!(whole.vram(), parts.vram());
}
