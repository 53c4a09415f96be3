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

//! CLUT decode and caching tests

use crate::core::memory::{ClutCache, ClutDesc, Csm, LocalMemory, Psm, Rect, Texa};

fn desc16(cbp: u32) -> ClutDesc {
    ClutDesc {
        cbp,
        cpsm: Psm::Ct32,
        csa: 0,
        csm: Csm::Csm1,
        count: 16,
    }
}

fn desc256(cbp: u32) -> ClutDesc {
    ClutDesc {
        cbp,
        cpsm: Psm::Ct32,
        csa: 0,
        csm: Csm::Csm1,
        count: 256,
    }
}

/// A 16-entry resident palette occupies an 8x2 pixel region.
#[test]
fn test_csm1_16_entry_layout() {
    let mut mem = LocalMemory::new();
    for i in 0..16u32 {
        mem.write_pixel(Psm::Ct32, i & 7, i >> 3, 0x200, 1, 0xff00_0000 | i);
    }
    let mut clut = ClutCache::new();
    assert!(clut.update(desc16(0x200), Texa::default(), &mem));
    for i in 0..16 {
        assert_eq!(clut.lut()[i], 0xff00_0000 | i as u32);
    }
}

/// CSA shifts a 16-entry palette within the resident region in steps of
/// 16 entries, so two palettes can share one base pointer.
#[test]
fn test_csm1_csa_offsets_palette() {
    let mut mem = LocalMemory::new();
    // Group 0 lives in rows 0..2, group 1 in rows 2..4.
    for i in 0..16u32 {
        mem.write_pixel(Psm::Ct32, i & 7, i >> 3, 0x200, 1, 0x1000 | i);
        mem.write_pixel(Psm::Ct32, i & 7, 2 + (i >> 3), 0x200, 1, 0x2000 | i);
    }
    let mut clut = ClutCache::new();
    clut.update(desc16(0x200), Texa::default(), &mem);
    assert_eq!(clut.lut()[0], 0x1000);

    let shifted = ClutDesc { csa: 1, ..desc16(0x200) };
    assert!(clut.update(shifted, Texa::default(), &mem));
    for i in 0..16 {
        assert_eq!(clut.lut()[i], 0x2000 | i as u32);
    }
}

/// The palette extent bounds every entry position in both storage modes.
#[test]
fn test_palette_extent() {
    assert_eq!(desc16(0).extent(), (Rect::new(0, 0, 8, 2), 1));
    assert_eq!(
        ClutDesc { csa: 1, ..desc16(0) }.extent(),
        (Rect::new(0, 2, 8, 4), 1)
    );
    assert_eq!(desc256(0).extent(), (Rect::new(0, 0, 16, 16), 1));

    let seq = ClutDesc {
        csm: Csm::Csm2 { cbw: 4, cou: 0, cov: 5 },
        ..desc256(0)
    };
    assert_eq!(seq.extent(), (Rect::new(0, 5, 256, 6), 4));
}

/// Entry index bits 3 and 4 swap positions in 256-entry resident storage.
#[test]
fn test_csm1_256_entry_permutation() {
    let mut mem = LocalMemory::new();
    // Tag every pixel of the 16x16 region with its position.
    for y in 0..16u32 {
        for x in 0..16u32 {
            mem.write_pixel(Psm::Ct32, x, y, 0, 1, 0xc0de_0000 | (y << 8) | x);
        }
    }
    let mut clut = ClutCache::new();
    clut.update(desc256(0), Texa::default(), &mem);

    let pos = |x: u32, y: u32| 0xc0de_0000 | (y << 8) | x;
    // Indices with neither bit 3 nor bit 4 set stay in place.
    assert_eq!(clut.lut()[0], pos(0, 0));
    assert_eq!(clut.lut()[7], pos(7, 0));
    assert_eq!(clut.lut()[0x27], pos(7, 2));
    // Bits 3 and 4 swap: entry 8 reads position 16 and vice versa.
    assert_eq!(clut.lut()[8], pos(0, 1));
    assert_eq!(clut.lut()[16], pos(8, 0));
    // Both bits set stays in place.
    assert_eq!(clut.lut()[0x1f], pos(15, 1));
    // The swap is an involution over the whole table.
    let perm = |i: u32| (i & !0x18) | ((i & 8) << 1) | ((i & 16) >> 1);
    for i in 0..256u32 {
        assert_eq!(perm(perm(i)), i);
        assert_eq!(clut.lut()[i as usize], pos(perm(i) & 15, perm(i) >> 4));
    }
}

/// 16-bit palette entries expand through TEXA at table build time.
#[test]
fn test_16bit_palette_expands_alpha() {
    let mut mem = LocalMemory::new();
    mem.write_pixel(Psm::Ct16, 0, 0, 0, 1, 0x8000); // alpha bit set
    mem.write_pixel(Psm::Ct16, 1, 0, 0, 1, 0x001f); // pure red, bit clear
    let desc = ClutDesc {
        cbp: 0,
        cpsm: Psm::Ct16,
        csa: 0,
        csm: Csm::Csm1,
        count: 16,
    };
    let texa = Texa { ta0: 0x11, ta1: 0xee, aem: false };
    let mut clut = ClutCache::new();
    clut.update(desc, texa, &mem);
    assert_eq!(clut.lut()[0] >> 24, 0xee);
    assert_eq!(clut.lut()[1], 0x1100_00f8);
}

#[test]
fn test_update_is_keyed() {
    let mut mem = LocalMemory::new();
    mem.write_pixel(Psm::Ct32, 0, 0, 0, 1, 1);
    let mut clut = ClutCache::new();

    assert!(clut.update(desc16(0), Texa::default(), &mem));
    // Same key, no reload even though VRAM changed underneath.
    mem.write_pixel(Psm::Ct32, 0, 0, 0, 1, 2);
    assert!(!clut.update(desc16(0), Texa::default(), &mem));
    assert_eq!(clut.lut()[0], 1);

    // Invalidation forces the reload.
    clut.invalidate();
    assert!(clut.update(desc16(0), Texa::default(), &mem));
    assert_eq!(clut.lut()[0], 2);

    // A different key reloads too.
    assert!(clut.update(desc256(0), Texa::default(), &mem));
    // And so does a TEXA change when entries are 16-bit.
    let d16 = ClutDesc { cpsm: Psm::Ct16, ..desc16(0) };
    clut.update(d16, Texa::default(), &mem);
    assert!(clut.update(d16, Texa { ta0: 9, ta1: 0, aem: false }, &mem));
}

#[test]
fn test_csm2_sequential_layout() {
    let mut mem = LocalMemory::new();
    // Entries in a straight row at (16..32, 3) with a 2-unit buffer width.
    for i in 0..16u32 {
        mem.write_pixel(Psm::Ct32, 16 + i, 3, 0, 2, 0xbb00 | i);
    }
    let desc = ClutDesc {
        cbp: 0,
        cpsm: Psm::Ct32,
        csa: 0,
        csm: Csm::Csm2 { cbw: 2, cou: 1, cov: 3 },
        count: 16,
    };
    let mut clut = ClutCache::new();
    clut.update(desc, Texa::default(), &mem);
    for i in 0..16 {
        assert_eq!(clut.lut()[i], 0xbb00 | i as u32);
    }
}

#[test]
fn test_palette_save_state_round_trip() {
    let mut mem = LocalMemory::new();
    for i in 0..16u32 {
        mem.write_pixel(Psm::Ct32, i & 7, i >> 3, 0, 1, i * 3 + 7);
    }
    let mut clut = ClutCache::new();
    clut.update(desc16(0), Texa::default(), &mem);
    let bytes = clut.palette();

    let mut restored = ClutCache::new();
    restored.restore(&bytes).unwrap();
    assert_eq!(restored.lut(), clut.lut());
    // Restore leaves the cache keyless so the next update reloads.
    assert!(restored.cached_desc().is_none());

    // A truncated snapshot is rejected without touching the table.
    assert!(restored.restore(&bytes[..100]).is_err());
    assert_eq!(restored.lut(), clut.lut());
}
