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

//! Selector compilation tests

use crate::core::gpu::selector::{
    Afail, Atst, DrawFlags, DrawState, ScanlineSelector, Ztst,
};
use crate::core::memory::Psm;

fn compile(state: &DrawState) -> ScanlineSelector {
    ScanlineSelector::compile(state).unwrap()
}

/// The strict depth test compiles to greater-or-equal.
#[test]
fn test_ztst_greater_rewrites_to_gequal() {
    let state = DrawState {
        ztst: Ztst::Greater,
        ..DrawState::default()
    };
    let sel = compile(&state);
    assert_eq!(sel.ztst, Ztst::GEqual);
    assert!(sel.ztest);
}

/// Strict alpha comparisons fold into their inclusive forms with an
/// adjusted reference.
#[test]
fn test_atst_strict_rewrites() {
    let less = compile(&DrawState {
        atst: Atst::Less,
        aref: 10,
        ..DrawState::default()
    });
    assert_eq!(less.atst, Atst::LEqual);
    assert_eq!(less.aref, 9);

    let greater = compile(&DrawState {
        atst: Atst::Greater,
        aref: 255,
        ..DrawState::default()
    });
    assert_eq!(greater.atst, Atst::GEqual);
    assert_eq!(greater.aref, 256);

    // aref 0 underflows into an always-false LEqual, which is correct:
    // no alpha is strictly below zero.
    let zero = compile(&DrawState {
        atst: Atst::Less,
        aref: 0,
        ..DrawState::default()
    });
    assert_eq!(zero.aref, -1);
}

/// On a 24-bit frame the alpha byte is not stored, so the rgb-only fail
/// policy degenerates to a plain frame write.
#[test]
fn test_afail_rgb_only_on_24bit_frame() {
    let state = DrawState {
        fpsm: Psm::Ct24,
        atst: Atst::Never,
        afail: Afail::RgbOnly,
        ..DrawState::default()
    };
    assert_eq!(compile(&state).afail, Afail::FbOnly);

    let state32 = DrawState {
        atst: Atst::Never,
        afail: Afail::RgbOnly,
        ..DrawState::default()
    };
    assert_eq!(compile(&state32).afail, Afail::RgbOnly);
}

/// A fully masked frame disables frame writes; masking depth as well makes
/// the draw a no-op.
#[test]
fn test_full_mask_disables_writes() {
    let state = DrawState {
        fbmsk: 0xffff_ffff,
        ..DrawState::default()
    };
    let sel = compile(&state);
    assert!(!sel.fwrite);
    assert!(sel.zwrite);
    assert!(sel.writes_anything());

    let state = DrawState {
        fbmsk: 0xffff_ffff,
        flags: DrawFlags::COLCLAMP | DrawFlags::ZMSK,
        ..DrawState::default()
    };
    assert!(!compile(&state).writes_anything());
}

/// On a 16-bit frame only bits that survive the 1555 conversion count, so a
/// mask covering just the dropped low bits still writes everything.
#[test]
fn test_16bit_mask_ignores_dropped_bits() {
    let state = DrawState {
        fpsm: Psm::Ct16,
        fbmsk: 0x7f07_0707,
        ..DrawState::default()
    };
    let sel = compile(&state);
    assert!(sel.fwrite);
    assert!(!sel.rfb);
}

/// Destination reads are derived, not stated: a partial mask, a blend that
/// references the destination, or the destination alpha test each force
/// them on.
#[test]
fn test_rfb_derivation() {
    assert!(!compile(&DrawState::default()).rfb);

    let masked = DrawState {
        fbmsk: 0x00ff_0000,
        ..DrawState::default()
    };
    assert!(compile(&masked).rfb);

    let blended = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::ABE,
        aba: 0,
        abb: 1,
        abc: 0,
        abd: 1,
        ..DrawState::default()
    };
    assert!(compile(&blended).rfb);

    // Blending against zero and fixed alpha never reads the destination.
    let zero_blend = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::ABE,
        aba: 0,
        abb: 2,
        abc: 2,
        abd: 0,
        ..DrawState::default()
    };
    assert!(!compile(&zero_blend).rfb);

    let date = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::DATE,
        ..DrawState::default()
    };
    assert!(compile(&date).rfb);
}

/// Stages that cannot exist on a 24-bit frame are compiled out.
#[test]
fn test_24bit_frame_disables_alpha_stages() {
    let state = DrawState {
        fpsm: Psm::Ct24,
        flags: DrawFlags::COLCLAMP | DrawFlags::DATE | DrawFlags::FBA | DrawFlags::DTHE,
        ..DrawState::default()
    };
    let sel = compile(&state);
    assert!(!sel.date);
    assert!(!sel.fba);
    assert!(!sel.dthe);
}

/// Dithering only applies where precision is actually lost.
#[test]
fn test_dither_requires_16bit_frame() {
    let on32 = DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::DTHE,
        ..DrawState::default()
    };
    assert!(!compile(&on32).dthe);

    let on16 = DrawState {
        fpsm: Psm::Ct16,
        flags: DrawFlags::COLCLAMP | DrawFlags::DTHE,
        ..DrawState::default()
    };
    assert!(compile(&on16).dthe);
}

/// Depth formats cannot serve as frame buffers and color formats cannot
/// serve as depth buffers.
#[test]
fn test_invalid_buffer_formats_rejected() {
    let zframe = DrawState {
        fpsm: Psm::Z32,
        ..DrawState::default()
    };
    assert!(ScanlineSelector::compile(&zframe).is_err());

    let idxframe = DrawState {
        fpsm: Psm::T8,
        ..DrawState::default()
    };
    assert!(ScanlineSelector::compile(&idxframe).is_err());

    let colorz = DrawState {
        zpsm: Psm::Ct32,
        ..DrawState::default()
    };
    assert!(ScanlineSelector::compile(&colorz).is_err());
}

/// `notest` only holds when no per-pixel test can reject anything.
#[test]
fn test_notest_derivation() {
    assert!(compile(&DrawState::default()).notest);

    let ztested = DrawState {
        ztst: Ztst::GEqual,
        ..DrawState::default()
    };
    assert!(!compile(&ztested).notest);

    let atested = DrawState {
        atst: Atst::Never,
        ..DrawState::default()
    };
    assert!(!compile(&atested).notest);
}

/// Selector keys agree exactly when the compiled state agrees.
#[test]
fn test_key_identity() {
    let a = compile(&DrawState::default());
    let b = compile(&DrawState::default());
    assert_eq!(a.key(), b.key());

    let c = compile(&DrawState {
        flags: DrawFlags::COLCLAMP | DrawFlags::ABE,
        ..DrawState::default()
    });
    assert_ne!(a.key(), c.key());

    // The strict-test rewrite makes distinct raw states compile to the
    // same key.
    let d = compile(&DrawState {
        ztst: Ztst::Greater,
        ..DrawState::default()
    });
    let e = compile(&DrawState {
        ztst: Ztst::GEqual,
        ..DrawState::default()
    });
    assert_eq!(d.key(), e.key());

    // Two draws that differ only in the alpha-test reference must not
    // share a key.
    let f = compile(&DrawState {
        atst: Atst::GEqual,
        aref: 10,
        ..DrawState::default()
    });
    let g = compile(&DrawState {
        atst: Atst::GEqual,
        aref: 11,
        ..DrawState::default()
    });
    assert_ne!(f.key(), g.key());

    // The rewritten reference can go negative; that key is still distinct
    // from every in-range reference.
    let h = compile(&DrawState {
        atst: Atst::Less,
        aref: 0,
        ..DrawState::default()
    });
    let i = compile(&DrawState {
        atst: Atst::LEqual,
        aref: 255,
        ..DrawState::default()
    });
    assert_ne!(h.key(), i.key());
}
