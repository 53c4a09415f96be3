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

//! Pixel pipeline tests
//!
//! Tests are organized into the following modules:
//! - `selector`: draw state compilation and its rewrites
//! - `pipeline`: per-pixel scanline semantics, stage by stage
//! - `raster`: span generation, fill convention, partitioning
//! - `queue`: draw validation and palette coherence at the queue boundary

mod raster;
mod selector;
