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

/// Core error types
use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, GsError>;

/// Main error type for the graphics core
///
/// Configuration mistakes are caught when a draw is queued or a snapshot
/// is restored; the hot paths (addressing, pixel read/write,
/// rasterization) never return errors. Cache allocation failure under
/// memory pressure is not an error either, it surfaces as an empty lookup
/// and the draw is skipped.
#[derive(Error, Debug)]
pub enum GsError {
    #[error("Invalid pixel storage format: {0:#04x}")]
    InvalidPixelFormat(u8),

    #[error("Invalid buffer width: {bw} (valid range: 1-32)")]
    InvalidBufferWidth { bw: u32 },

    #[error("Invalid base pointer: {bp:#x} (valid range: 0-0x3fff)")]
    InvalidBasePointer { bp: u32 },

    #[error("Palette format must be Ct32, Ct16 or Ct16s, got {0:#04x}")]
    InvalidPaletteFormat(u8),

    #[error("Draw rejected: {0}")]
    InvalidDraw(String),

    #[error("Save state error: {0}")]
    SaveState(String),
}
