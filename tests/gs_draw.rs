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

//! End-to-end draw tests through the `Gpu` front door

use gsrx::core::gpu::{
    BufferDesc, DrawCommand, DrawFlags, DrawState, Gpu, GsVertex, PrimClass, TexDesc, Tfx,
};
use gsrx::core::memory::{ClutDesc, Csm, Psm, Rect, Texa};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const FB: BufferDesc = BufferDesc { bp: 0, bw: 1, psm: Psm::Ct32 };
const ZB: BufferDesc = BufferDesc { bp: 0x300, bw: 1, psm: Psm::Z32 };
const TEX_BP: u32 = 0x100;

fn base_command(prim: PrimClass, vertices: Vec<GsVertex>, state: DrawState) -> DrawCommand {
    DrawCommand {
        prim,
        vertices,
        scissor: Rect::new(0, 0, 64, 64),
        state,
        fb: FB,
        zb: ZB,
        tex: None,
        texa: Texa::default(),
        fog_rgb: 0,
        dimx: [[0; 4]; 4],
    }
}

fn checker_texture() -> Vec<u8> {
    let mut data = Vec::with_capacity(8 * 8 * 4);
    for y in 0..8u32 {
        for x in 0..8u32 {
            let texel = 0xff00_0000 | (y << 16) | (x << 8) | ((x ^ y) & 1) * 0xcc;
            data.extend_from_slice(&texel.to_le_bytes());
        }
    }
    data
}

fn upload_texture(gpu: &mut Gpu, data: &[u8]) {
    gpu.write_image(
        &BufferDesc { bp: TEX_BP, bw: 1, psm: Psm::Ct32 },
        Rect::new(0, 0, 8, 8),
        data,
        8 * 4,
    );
}

fn textured_sprite(x0: f32, y0: f32) -> DrawCommand {
    let state = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::TME | DrawFlags::FST | DrawFlags::TCC,
        tfx: Tfx::Decal,
        ..DrawState::default()
    };
    let mut cmd = base_command(
        PrimClass::Sprite,
        vec![
            GsVertex::xy(x0, y0).with_uv(0.0, 0.0),
            GsVertex::xy(x0 + 8.0, y0 + 8.0).with_uv(8.0, 8.0),
        ],
        state,
    );
    cmd.tex = Some(TexDesc {
        tbp0: TEX_BP,
        tbw: 1,
        psm: Psm::Ct32,
        tw: 8,
        th: 8,
        clut: None,
        minu: 0,
        maxu: 7,
        minv: 0,
        maxv: 7,
    });
    cmd
}

/// Upload, draw, read back: the frame holds the texture verbatim under a
/// decal sprite.
#[test]
fn test_textured_sprite_roundtrip() {
    init();
    let mut gpu = Gpu::new(0);
    let data = checker_texture();
    upload_texture(&mut gpu, &data);
    gpu.queue(textured_sprite(0.0, 0.0)).unwrap();

    let frame = gpu.read_frame(&FB, Rect::new(0, 0, 8, 8));
    for y in 0..8 {
        for x in 0..8 {
            let i = (y * 8 + x) * 4;
            let texel = u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
            assert_eq!(frame[y * 8 + x], texel, "pixel ({x}, {y})");
        }
    }
}

/// Overwriting the texture between draws must be visible in the second
/// draw: the transfer invalidates the cached source.
#[test]
fn test_texture_overwrite_coherence() {
    init();
    let mut gpu = Gpu::new(0);
    upload_texture(&mut gpu, &checker_texture());
    gpu.queue(textured_sprite(0.0, 0.0)).unwrap();

    let flat: Vec<u8> = std::iter::repeat(0x7755_3311u32.to_le_bytes())
        .take(64)
        .flatten()
        .collect();
    upload_texture(&mut gpu, &flat);
    gpu.queue(textured_sprite(16.0, 0.0)).unwrap();

    let frame = gpu.read_frame(&FB, Rect::new(16, 0, 24, 8));
    for px in &frame {
        assert_eq!(*px, 0x7755_3311);
    }
    // The first draw's output is untouched.
    let old = gpu.read_frame(&FB, Rect::new(0, 0, 8, 8));
    assert_eq!(old[0], 0xff00_0000);
}

/// A 4-bit indexed texture resolves through an uploaded resident palette,
/// and a palette rewrite reaches the next draw.
#[test]
fn test_indexed_texture_through_palette() {
    init();
    const PAL_BP: u32 = 0x200;
    let mut gpu = Gpu::new(0);

    // 8x8 indices packed two per byte: index 0 on the top row, index 5
    // everywhere else.
    let mut idx = vec![0x55u8; 8 * 8 / 2];
    for b in idx.iter_mut().take(4) {
        *b = 0;
    }
    gpu.write_image(
        &BufferDesc { bp: TEX_BP, bw: 1, psm: Psm::T4 },
        Rect::new(0, 0, 8, 8),
        &idx,
        4,
    );

    // 16-entry palette in its 8x2 resident layout.
    let mut pal = vec![0u8; 16 * 4];
    pal[0..4].copy_from_slice(&0xff00_ff00u32.to_le_bytes());
    pal[5 * 4..6 * 4].copy_from_slice(&0xff00_00ffu32.to_le_bytes());
    let pal_buf = BufferDesc { bp: PAL_BP, bw: 1, psm: Psm::Ct32 };
    gpu.write_image(&pal_buf, Rect::new(0, 0, 8, 2), &pal, 8 * 4);

    let clut = ClutDesc {
        cbp: PAL_BP,
        cpsm: Psm::Ct32,
        csa: 0,
        csm: Csm::Csm1,
        count: 16,
    };
    let mut cmd = textured_sprite(0.0, 0.0);
    if let Some(tex) = cmd.tex.as_mut() {
        tex.psm = Psm::T4;
        tex.clut = Some(clut);
    }
    gpu.queue(cmd).unwrap();

    let frame = gpu.read_frame(&FB, Rect::new(0, 0, 8, 8));
    for y in 0..8 {
        for x in 0..8 {
            let expect = if y == 0 { 0xff00_ff00 } else { 0xff00_00ff };
            assert_eq!(frame[y * 8 + x], expect, "pixel ({x}, {y})");
        }
    }

    // Rewriting entry 5 must flow through palette invalidation and the
    // cached source's generation check into the second draw.
    pal[5 * 4..6 * 4].copy_from_slice(&0xffff_0000u32.to_le_bytes());
    gpu.write_image(&pal_buf, Rect::new(0, 0, 8, 2), &pal, 8 * 4);
    let mut cmd = textured_sprite(16.0, 0.0);
    if let Some(tex) = cmd.tex.as_mut() {
        tex.psm = Psm::T4;
        tex.clut = Some(clut);
    }
    gpu.queue(cmd).unwrap();

    let frame = gpu.read_frame(&FB, Rect::new(16, 1, 24, 8));
    assert!(frame.iter().all(|&p| p == 0xffff_0000));
}

/// The same command stream is byte-identical with and without workers.
#[test]
fn test_worker_determinism() {
    init();
    let run = |workers: u32| -> Vec<u8> {
        let mut gpu = Gpu::new(workers);
        upload_texture(&mut gpu, &checker_texture());
        gpu.queue(textured_sprite(3.0, 5.0)).unwrap();

        let state = DrawState {
            flags: DrawFlags::COLCLAMP | DrawFlags::ABE | DrawFlags::IIP,
            aba: 0,
            abb: 1,
            abc: 0,
            abd: 1,
            ..DrawState::default()
        };
        let tri = base_command(
            PrimClass::Triangle,
            vec![
                GsVertex::xy(1.0, 1.0).with_color([255, 0, 0, 200]).with_z(10),
                GsVertex::xy(40.0, 4.0).with_color([0, 255, 0, 100]).with_z(20),
                GsVertex::xy(10.0, 44.0).with_color([0, 0, 255, 50]).with_z(30),
            ],
            state,
        );
        gpu.queue(tri).unwrap();
        gpu.mem().vram().to_vec()
    };

    let reference = run(0);
    assert_eq!(reference, run(1));
    assert_eq!(reference, run(3));
    assert_eq!(reference, run(8));
}

/// All 81 blend selector combinations agree with the blend formula.
#[test]
fn test_blend_combination_grid() {
    init();
    let dest = 0x9030_5070u32;
    let src = [200u8, 120, 40, 0x60];
    let afix = 0x30u8;

    for aba in 0..3u8 {
        for abb in 0..3u8 {
            for abc in 0..3u8 {
                for abd in 0..3u8 {
                    let mut gpu = Gpu::new(0);
                    gpu.write_image(
                        &FB,
                        Rect::new(10, 10, 11, 11),
                        &dest.to_le_bytes(),
                        4,
                    );
                    let state = DrawState {
                        flags: DrawFlags::COLCLAMP | DrawFlags::ABE,
                        aba,
                        abb,
                        abc,
                        abd,
                        afix,
                        ..DrawState::default()
                    };
                    let cmd = base_command(
                        PrimClass::Sprite,
                        vec![
                            GsVertex::xy(10.0, 10.0).with_color(src),
                            GsVertex::xy(11.0, 11.0).with_color(src),
                        ],
                        state,
                    );
                    gpu.queue(cmd).unwrap();

                    let got = gpu.read_frame(&FB, Rect::new(10, 10, 11, 11))[0];
                    let cs = [src[0] as i32, src[1] as i32, src[2] as i32, src[3] as i32];
                    let cd = [
                        (dest & 0xff) as i32,
                        ((dest >> 8) & 0xff) as i32,
                        ((dest >> 16) & 0xff) as i32,
                        (dest >> 24) as i32,
                    ];
                    let pick = |s: u8, i: usize| match s {
                        0 => cs[i],
                        1 => cd[i],
                        _ => 0,
                    };
                    let cf = match abc {
                        0 => cs[3],
                        1 => cd[3],
                        _ => afix as i32,
                    };
                    for i in 0..3 {
                        let expect =
                            ((((pick(aba, i) - pick(abb, i)) * cf) >> 7) + pick(abd, i))
                                .clamp(0, 255) as u32;
                        assert_eq!(
                            (got >> (i * 8)) & 0xff,
                            expect,
                            "abe {aba}{abb}{abc}{abd} channel {i}"
                        );
                    }
                    assert_eq!(got >> 24, cs[3] as u32, "abe {aba}{abb}{abc}{abd} alpha");
                }
            }
        }
    }
}

/// Depth-tested draws through the full stack: nearer fragments lose under
/// greater-or-equal, and depth readback reflects the winner.
#[test]
fn test_depth_ordering_between_draws() {
    init();
    let state = DrawState {
        ztst: gsrx::core::gpu::Ztst::GEqual,
        ..DrawState::default()
    };
    let quad = |z: u32, c: [u8; 4]| {
        base_command(
            PrimClass::Sprite,
            vec![
                GsVertex::xy(0.0, 0.0).with_color(c).with_z(z),
                GsVertex::xy(16.0, 16.0).with_color(c).with_z(z),
            ],
            state,
        )
    };

    let mut gpu = Gpu::new(0);
    gpu.queue(quad(100, [10, 10, 10, 10])).unwrap();
    gpu.queue(quad(50, [99, 99, 99, 99])).unwrap();
    let frame = gpu.read_frame(&FB, Rect::new(0, 0, 16, 16));
    assert!(frame.iter().all(|&p| p == 0x0a0a_0a0a));

    gpu.queue(quad(150, [7, 7, 7, 7])).unwrap();
    let frame = gpu.read_frame(&FB, Rect::new(0, 0, 16, 16));
    assert!(frame.iter().all(|&p| p == 0x0707_0707));
    let depth = gpu.read_frame(&ZB, Rect::new(0, 0, 16, 16));
    assert!(depth.iter().all(|&z| z == 150));
}
