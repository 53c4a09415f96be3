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

//! Draw vertices and primitive classes

/// Primitive class after the decoder has expanded strips and fans
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PrimClass {
    Point = 0,
    Line = 1,
    Triangle = 2,
    Sprite = 3,
}

impl PrimClass {
    /// Vertices consumed per primitive
    #[inline]
    pub fn vertices_per_prim(self) -> usize {
        match self {
            PrimClass::Point => 1,
            PrimClass::Line => 2,
            PrimClass::Triangle => 3,
            PrimClass::Sprite => 2,
        }
    }
}

/// A fully transformed vertex in window space
///
/// `x`/`y` are window coordinates in pixels (fractional positions allowed),
/// `z` the raw depth value of the depth-buffer format, `f` the fog
/// coefficient (255 = no fog). Texture coordinates carry either normalized
/// `(s, t, q)` for perspective-correct sampling or direct texel coordinates
/// in `s`/`t` with `q` unused when the draw uses UV addressing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GsVertex {
    pub x: f32,
    pub y: f32,
    pub z: u32,
    pub f: u8,
    /// RGBA, 0..255 per channel
    pub c: [u8; 4],
    pub s: f32,
    pub t: f32,
    pub q: f32,
}

impl GsVertex {
    pub fn xy(x: f32, y: f32) -> GsVertex {
        GsVertex {
            x,
            y,
            q: 1.0,
            f: 255,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, c: [u8; 4]) -> GsVertex {
        self.c = c;
        self
    }

    pub fn with_z(mut self, z: u32) -> GsVertex {
        self.z = z;
        self
    }

    pub fn with_uv(mut self, u: f32, v: f32) -> GsVertex {
        self.s = u;
        self.t = v;
        self
    }

    pub fn with_stq(mut self, s: f32, t: f32, q: f32) -> GsVertex {
        self.s = s;
        self.t = t;
        self.q = q;
        self
    }

    pub fn with_fog(mut self, f: u8) -> GsVertex {
        self.f = f;
        self
    }
}
