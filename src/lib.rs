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

//! Software rasterizing graphics synthesizer core
//!
//! A bit-accurate software model of a console-style graphics synthesizer:
//! 4 MiB of swizzled local memory under thirteen pixel storage formats, a
//! cached palette decoder, a scalar scanline pipeline covering the full
//! fixed-function pixel path, a row-interleaved parallel rasterizer, and a
//! block-granular texture and target cache on top.
//!
//! [`Gpu`] is the front door; the submodules under [`core`] are usable on
//! their own for tooling that only needs addressing or image transfer.
//!
//! ```
//! use gsrx::core::memory::{LocalMemory, Psm};
//!
//! let mut mem = LocalMemory::new();
//! mem.write_pixel(Psm::Ct32, 12, 34, 0, 10, 0x80ff_8040);
//! assert_eq!(mem.read_pixel(Psm::Ct32, 12, 34, 0, 10), 0x80ff_8040);
//! ```

pub mod core;

pub use crate::core::error::{GsError, Result};
pub use crate::core::gpu::Gpu;
