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

//! Fixed worker pool for parallel rasterization
//!
//! Geometry setup runs once on the submitting thread; each worker then
//! rasterizes the rows where `row % worker_count == worker_id`, so no two
//! workers ever touch the same pixel. Completion is a shared atomic bit mask
//! the submitter spins on: draws are microseconds long, so a bounded spin
//! beats parking the thread, with a yield fallback to avoid burning a core
//! when a worker gets descheduled.
//!
//! A pool of size zero runs every draw inline on the submitter, which is the
//! reference execution order for determinism tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Sender};

use crate::core::memory::{LocalMemory, VramView};
use crate::core::gpu::raster::{self, DrawCommand, RowSlice};
use crate::core::gpu::scanline::{ScanlineGlobal, ScanlineKind};

/// Iterations of pure spinning before yielding to the scheduler
const SPIN_LIMIT: u32 = 10_000;

/// One queued draw, shared across the pool
///
/// `vram` is a raw window into the local memory the job draws into. The row
/// interleave makes every worker's writes disjoint, the submitter does not
/// touch VRAM until the completion mask fills, and the window never
/// outlives the draw because `dispatch` blocks.
struct DrawJob {
    cmd: DrawCommand,
    kind: ScanlineKind,
    global: ScanlineGlobal,
    vram: VramView,
}

/// Fixed pool of rasterizer workers
pub struct WorkerPool {
    senders: Vec<Sender<Arc<DrawJob>>>,
    done: Arc<AtomicU32>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers; zero means inline execution
    pub fn new(count: u32) -> WorkerPool {
        assert!(count <= 32, "completion mask holds at most 32 workers");
        let done = Arc::new(AtomicU32::new(0));
        let mut senders = Vec::with_capacity(count as usize);
        let mut handles = Vec::with_capacity(count as usize);
        for id in 0..count {
            let (tx, rx) = bounded::<Arc<DrawJob>>(1);
            let done = Arc::clone(&done);
            let handle = thread::Builder::new()
                .name(format!("gs-worker-{id}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        let slice = RowSlice { id, count };
                        raster::rasterize(&job.cmd, job.kind, &job.global, &job.vram, slice);
                        done.fetch_or(1 << id, Ordering::Release);
                    }
                })
                .expect("failed to spawn rasterizer worker");
            senders.push(tx);
            handles.push(handle);
        }
        WorkerPool {
            senders,
            done,
            handles,
        }
    }

    /// Number of workers
    pub fn count(&self) -> u32 {
        self.senders.len() as u32
    }

    /// Rasterize a draw across the pool and wait for completion
    ///
    /// With an empty pool the draw runs inline on the calling thread.
    pub fn dispatch(
        &self,
        cmd: DrawCommand,
        kind: ScanlineKind,
        global: ScanlineGlobal,
        mem: &mut LocalMemory,
    ) {
        if self.senders.is_empty() {
            raster::rasterize(&cmd, kind, &global, &mem.view(), RowSlice::full());
            return;
        }

        let job = Arc::new(DrawJob {
            cmd,
            kind,
            global,
            vram: mem.view(),
        });
        self.done.store(0, Ordering::Release);
        for tx in &self.senders {
            // Workers only disappear when the pool drops, so send cannot fail
            // while `self` is alive.
            let _ = tx.send(Arc::clone(&job));
        }

        let full = if self.senders.len() == 32 {
            u32::MAX
        } else {
            (1u32 << self.senders.len()) - 1
        };
        let mut spins = 0u32;
        while self.done.load(Ordering::Acquire) != full {
            spins += 1;
            if spins > SPIN_LIMIT {
                thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channels ends the worker loops.
        self.senders.clear();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
