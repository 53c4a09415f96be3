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

//! Pixel storage formats
//!
//! The GS supports a fixed, closed set of pixel storage formats (PSM): the
//! full-color family (32/24/16-bit), the indexed family (8/4-bit plus the
//! variants packed into the high bits of a 32-bit slot), and depth-buffer
//! counterparts of the color layouts. Each format binds its own addressing,
//! read/write and bulk-transfer behavior; dispatch goes through a fixed
//! descriptor table indexed by format id rather than any open-ended
//! polymorphism, since the set can never grow.

use super::swizzle;

/// Pixel storage format identifier
///
/// Discriminants are the raw hardware ids, so a register-derived `u8` maps
/// straight onto the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Psm {
    /// 32-bit RGBA
    Ct32 = 0,
    /// 24-bit RGB stored in a 32-bit slot, top byte preserved
    Ct24 = 1,
    /// 16-bit RGBA 5551
    Ct16 = 2,
    /// 16-bit RGBA 5551, alternate block order
    Ct16s = 10,
    /// 8-bit indexed
    T8 = 19,
    /// 4-bit indexed
    T4 = 20,
    /// 8-bit indexed in the high byte of a 32-bit slot
    T8h = 27,
    /// 4-bit indexed in bits 24-27 of a 32-bit slot
    T4hl = 36,
    /// 4-bit indexed in bits 28-31 of a 32-bit slot
    T4hh = 44,
    /// 32-bit depth
    Z32 = 48,
    /// 24-bit depth in a 32-bit slot
    Z24 = 49,
    /// 16-bit depth
    Z16 = 50,
    /// 16-bit depth, alternate block order
    Z16s = 58,
}

impl Psm {
    /// All formats, in descriptor-table order
    pub const ALL: [Psm; 13] = [
        Psm::Ct32,
        Psm::Ct24,
        Psm::Ct16,
        Psm::Ct16s,
        Psm::T8,
        Psm::T4,
        Psm::T8h,
        Psm::T4hl,
        Psm::T4hh,
        Psm::Z32,
        Psm::Z24,
        Psm::Z16,
        Psm::Z16s,
    ];

    /// Map a raw register value onto a format id
    pub fn from_raw(raw: u8) -> Option<Psm> {
        Some(match raw {
            0 => Psm::Ct32,
            1 => Psm::Ct24,
            2 => Psm::Ct16,
            10 => Psm::Ct16s,
            19 => Psm::T8,
            20 => Psm::T4,
            27 => Psm::T8h,
            36 => Psm::T4hl,
            44 => Psm::T4hh,
            48 => Psm::Z32,
            49 => Psm::Z24,
            50 => Psm::Z16,
            58 => Psm::Z16s,
            _ => return None,
        })
    }

    /// Raw hardware id
    #[inline]
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Depth-buffer formats (Z32/Z24/Z16/Z16s)
    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(self, Psm::Z32 | Psm::Z24 | Psm::Z16 | Psm::Z16s)
    }

    /// Per-format descriptor
    #[inline]
    pub fn descriptor(self) -> &'static PsmDescriptor {
        &DESCRIPTORS[self.table_index()]
    }

    #[inline]
    fn table_index(self) -> usize {
        match self {
            Psm::Ct32 => 0,
            Psm::Ct24 => 1,
            Psm::Ct16 => 2,
            Psm::Ct16s => 3,
            Psm::T8 => 4,
            Psm::T4 => 5,
            Psm::T8h => 6,
            Psm::T4hl => 7,
            Psm::T4hh => 8,
            Psm::Z32 => 9,
            Psm::Z24 => 10,
            Psm::Z16 => 11,
            Psm::Z16s => 12,
        }
    }
}

/// Storage class shared by several formats
///
/// Used by the scanline engine to pick read/write width without caring about
/// block order: 0 = 32-bit, 1 = 24-in-32, 2 = 16-bit, 3 = indexed.
pub type PsmFmt = u8;

/// Addressing function signature: `(x, y, bp, bw) -> pixel-unit address`
pub type AddressFn = fn(u32, u32, u32, u32) -> u32;

/// Per-format descriptor
///
/// One struct of bound operations per pixel format; the full set lives in a
/// fixed array, so format dispatch is an index plus a function pointer call.
pub struct PsmDescriptor {
    /// Format id this descriptor belongs to
    pub psm: Psm,
    /// Bits per pixel as stored
    pub bpp: u8,
    /// Bits per pixel on the host-transfer path (24-bit colors move as 24)
    pub trbpp: u8,
    /// Palette entries required by the format (0, 16 or 256)
    pub pal: u16,
    /// Storage class: 0 = 32-bit, 1 = 24-in-32, 2 = 16-bit, 3 = indexed
    pub fmt: PsmFmt,
    /// Block size in pixels
    pub bs: (u32, u32),
    /// Page size in pixels
    pub pgs: (u32, u32),
    /// Swizzled pixel address
    pub pa: AddressFn,
    /// Block number
    pub bn: AddressFn,
}

impl PsmDescriptor {
    /// Pixels per page horizontally/vertically for this format
    #[inline]
    pub fn page_width(&self) -> u32 {
        self.pgs.0
    }

    #[inline]
    pub fn page_height(&self) -> u32 {
        self.pgs.1
    }

    /// Blocks per page row / column
    #[inline]
    pub fn blocks_per_page(&self) -> (u32, u32) {
        (self.pgs.0 / self.bs.0, self.pgs.1 / self.bs.1)
    }

    /// Depth of the z comparison for this format when used as a z buffer
    /// (0xffff_ffff, 0xff_ffff or 0xffff)
    #[inline]
    pub fn z_mask(&self) -> u32 {
        match self.fmt {
            0 => 0xffff_ffff,
            1 => 0x00ff_ffff,
            _ => 0x0000_ffff,
        }
    }
}

/// The closed descriptor table
///
/// Order matches `Psm::table_index`.
pub static DESCRIPTORS: [PsmDescriptor; 13] = [
    PsmDescriptor {
        psm: Psm::Ct32,
        bpp: 32,
        trbpp: 32,
        pal: 0,
        fmt: 0,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32,
        bn: swizzle::block_number_32,
    },
    PsmDescriptor {
        psm: Psm::Ct24,
        bpp: 32,
        trbpp: 24,
        pal: 0,
        fmt: 1,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32,
        bn: swizzle::block_number_32,
    },
    PsmDescriptor {
        psm: Psm::Ct16,
        bpp: 16,
        trbpp: 16,
        pal: 0,
        fmt: 2,
        bs: (16, 8),
        pgs: (64, 64),
        pa: swizzle::pixel_address_16,
        bn: swizzle::block_number_16,
    },
    PsmDescriptor {
        psm: Psm::Ct16s,
        bpp: 16,
        trbpp: 16,
        pal: 0,
        fmt: 2,
        bs: (16, 8),
        pgs: (64, 64),
        pa: swizzle::pixel_address_16s,
        bn: swizzle::block_number_16s,
    },
    PsmDescriptor {
        psm: Psm::T8,
        bpp: 8,
        trbpp: 8,
        pal: 256,
        fmt: 3,
        bs: (16, 16),
        pgs: (128, 64),
        pa: swizzle::pixel_address_8,
        bn: swizzle::block_number_8,
    },
    PsmDescriptor {
        psm: Psm::T4,
        bpp: 4,
        trbpp: 4,
        pal: 16,
        fmt: 3,
        bs: (32, 16),
        pgs: (128, 128),
        pa: swizzle::pixel_address_4,
        bn: swizzle::block_number_4,
    },
    PsmDescriptor {
        psm: Psm::T8h,
        bpp: 32,
        trbpp: 8,
        pal: 256,
        fmt: 3,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32,
        bn: swizzle::block_number_32,
    },
    PsmDescriptor {
        psm: Psm::T4hl,
        bpp: 32,
        trbpp: 4,
        pal: 16,
        fmt: 3,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32,
        bn: swizzle::block_number_32,
    },
    PsmDescriptor {
        psm: Psm::T4hh,
        bpp: 32,
        trbpp: 4,
        pal: 16,
        fmt: 3,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32,
        bn: swizzle::block_number_32,
    },
    PsmDescriptor {
        psm: Psm::Z32,
        bpp: 32,
        trbpp: 32,
        pal: 0,
        fmt: 0,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32z,
        bn: swizzle::block_number_32z,
    },
    PsmDescriptor {
        psm: Psm::Z24,
        bpp: 32,
        trbpp: 24,
        pal: 0,
        fmt: 1,
        bs: (8, 8),
        pgs: (64, 32),
        pa: swizzle::pixel_address_32z,
        bn: swizzle::block_number_32z,
    },
    PsmDescriptor {
        psm: Psm::Z16,
        bpp: 16,
        trbpp: 16,
        pal: 0,
        fmt: 2,
        bs: (16, 8),
        pgs: (64, 64),
        pa: swizzle::pixel_address_16z,
        bn: swizzle::block_number_16z,
    },
    PsmDescriptor {
        psm: Psm::Z16s,
        bpp: 16,
        trbpp: 16,
        pal: 0,
        fmt: 2,
        bs: (16, 8),
        pgs: (64, 64),
        pa: swizzle::pixel_address_16sz,
        bn: swizzle::block_number_16sz,
    },
];

/// Format compatibility for cache invalidation
///
/// Two formats are compatible when views in either can alias the same bytes at
/// block granularity: the whole 32-bit family (color, 24-bit, the H-packed
/// indexed variants and 32/24-bit depth) shares block geometry, and each
/// 16-bit swizzle family aliases itself. A write in one member must invalidate
/// cached views in every member.
pub fn compatible(a: Psm, b: Psm) -> bool {
    family(a) == family(b)
}

fn family(p: Psm) -> u8 {
    match p {
        Psm::Ct32 | Psm::Ct24 | Psm::T8h | Psm::T4hl | Psm::T4hh => 0,
        Psm::Z32 | Psm::Z24 => 1,
        Psm::Ct16 => 2,
        Psm::Ct16s => 3,
        Psm::Z16 => 4,
        Psm::Z16s => 5,
        Psm::T8 => 6,
        Psm::T4 => 7,
    }
}
