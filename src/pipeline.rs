//! Per-frame orchestration of the seed, working and result buffers.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::{
    error::Error,
    kernel::{ComputeBackend, KernelConfig},
    pixel::{self, Pixel},
    screen,
    view::ViewState,
};

/// Where the frame buffers are in the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Allocated, no frame computed yet.
    Idle,
    /// `seed` is being rewritten and copied into `working`.
    Seeding,
    /// Kernel passes are running over `working`.
    Computing,
    /// `result` holds a complete frame.
    Ready,
}

impl Stage {
    fn can_enter(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Idle, Stage::Seeding)
                | (Stage::Ready, Stage::Seeding)
                | (Stage::Seeding, Stage::Computing)
                | (Stage::Computing, Stage::Ready)
        )
    }
}

/**
Three same-sized pixel buffers.

`seed` is rewritten from scratch every frame, `working` is mutated in place by
the kernel, and `result` is only written by a full copy from `working` so the
draw stage never observes a partially updated frame.
*/
pub struct FrameBuffers<B> {
    seed: B,
    working: B,
    result: B,
    stage: Stage,
}

impl<B> FrameBuffers<B> {
    pub fn new<C: ComputeBackend<Buffer = B>>(backend: &mut C, len: usize) -> Self {
        Self {
            seed: backend.create_buffer("seed-buffer", len),
            working: backend.create_buffer("working-buffer", len),
            result: backend.create_buffer("result-buffer", len),
            stage: Stage::Idle,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The last complete frame, if there is one.
    pub fn result(&self) -> Option<&B> {
        (self.stage == Stage::Ready).then_some(&self.result)
    }

    fn enter(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_enter(next),
            "invalid frame transition {:?} -> {:?}",
            self.stage,
            next
        );
        trace!("frame buffers {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }
}

pub struct Pipeline<B: ComputeBackend> {
    backend: B,
    size: screen::Size,
    passes: u32,
    seed: Vec<Pixel>,
    buffers: FrameBuffers<B::Buffer>,
}

impl<B: ComputeBackend> Pipeline<B> {
    pub fn new(mut backend: B, size: screen::Size, passes: u32) -> Self {
        let buffers = FrameBuffers::new(&mut backend, size.pixel_count());
        Self {
            backend,
            size,
            passes,
            seed: Vec::with_capacity(size.pixel_count()),
            buffers,
        }
    }

    /// Bytes needed for one frame buffer of `size`.
    pub fn buffer_size(size: screen::Size) -> u64 {
        (size.pixel_count() * std::mem::size_of::<Pixel>()) as u64
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn size(&self) -> screen::Size {
        self.size
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn stage(&self) -> Stage {
        self.buffers.stage()
    }

    pub fn result(&self) -> Option<&B::Buffer> {
        self.buffers.result()
    }

    /// Reallocate the frame buffers for a new canvas size. The previous result
    /// is discarded.
    pub fn resize(&mut self, size: screen::Size) {
        debug!("resizing frame buffers to {:?}", size);
        self.size = size;
        self.buffers = FrameBuffers::new(&mut self.backend, size.pixel_count());
    }

    /**
    Compute one complete frame for `view` into the result buffer.

    Every frame restarts from fresh seeds; nothing carries over from the
    previous frame except the allocations. Returns the wall-clock time spent
    issuing the frame.
    */
    pub fn run_frame(&mut self, view: &ViewState) -> Duration {
        let start = Instant::now();
        let Self {
            backend,
            size,
            passes,
            seed,
            buffers,
        } = self;

        buffers.enter(Stage::Seeding);
        pixel::seed_into(seed, *size);
        backend.upload(&mut buffers.seed, seed);
        backend.copy(&buffers.seed, &mut buffers.working);

        buffers.enter(Stage::Computing);
        backend.configure(KernelConfig::new(view, *size));
        backend.run_passes(&mut buffers.working, *passes);

        backend.copy(&buffers.working, &mut buffers.result);
        backend.submit();
        buffers.enter(Stage::Ready);

        start.elapsed()
    }

    /// Copy the last complete frame back to the host.
    pub fn read_result(&mut self) -> Result<Option<Vec<Pixel>>, Error> {
        if self.buffers.stage() != Stage::Ready {
            return Ok(None);
        }
        self.backend.read(&self.buffers.result).map(Some)
    }
}
