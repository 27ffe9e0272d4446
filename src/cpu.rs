//! [`ComputeBackend`] on a `rayon` thread pool.

use log::debug;
use rayon::prelude::{IntoParallelRefMutIterator, ParallelIterator};

use crate::{
    error::Error,
    kernel::{self, ComputeBackend, KernelConfig, Precision},
    pixel::Pixel,
};

pub struct CpuBackend {
    pool: rayon::ThreadPool,
    precision: Precision,
    config: KernelConfig,
}

impl CpuBackend {
    pub fn new(precision: Precision, threads: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("mandelbrot-{}", index))
            .build()?;
        debug!("cpu backend with {} threads", pool.current_num_threads());

        Ok(Self {
            pool,
            precision,
            config: KernelConfig::default(),
        })
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = Vec<Pixel>;

    fn create_buffer(&mut self, _label: &str, len: usize) -> Self::Buffer {
        vec![Pixel::default(); len]
    }

    fn upload(&mut self, buffer: &mut Self::Buffer, pixels: &[Pixel]) {
        buffer.copy_from_slice(pixels);
    }

    fn copy(&mut self, source: &Self::Buffer, destination: &mut Self::Buffer) {
        destination.copy_from_slice(source);
    }

    fn configure(&mut self, config: KernelConfig) {
        self.config = config;
    }

    fn run_passes(&mut self, buffer: &mut Self::Buffer, passes: u32) {
        let (config, precision) = (&self.config, self.precision);
        self.pool.install(|| {
            for _ in 0..passes {
                buffer
                    .par_iter_mut()
                    .for_each(|pixel| *pixel = kernel::step(*pixel, config, precision));
            }
        });
    }

    // Everything above runs to completion before returning.
    fn submit(&mut self) {}

    fn read(&mut self, buffer: &Self::Buffer) -> Result<Vec<Pixel>, Error> {
        Ok(buffer.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pixel, screen, view::ViewState};

    #[test]
    fn passes_match_sequential_steps() {
        let size = screen::Size::new(32, 24);
        let config = KernelConfig::new(&ViewState::default(), size);
        let seeds = pixel::seed(size);

        let mut backend = CpuBackend::new(Precision::Double, 4).unwrap();
        let mut buffer = backend.create_buffer("working", seeds.len());
        backend.upload(&mut buffer, &seeds);
        backend.configure(config);
        backend.run_passes(&mut buffer, 64);

        let expected: Vec<Pixel> = seeds
            .iter()
            .map(|seed| (0..64).fold(*seed, |pixel, _| kernel::step(pixel, &config, Precision::Double)))
            .collect();
        assert_eq!(backend.read(&buffer).unwrap(), expected);
    }

    #[test]
    fn copy_overwrites_the_destination() {
        let mut backend = CpuBackend::new(Precision::Single, 1).unwrap();
        let seeds = pixel::seed(screen::Size::new(4, 4));
        let mut source = backend.create_buffer("seed", seeds.len());
        let mut destination = backend.create_buffer("working", seeds.len());
        destination[5].iteration = 7;

        backend.upload(&mut source, &seeds);
        backend.copy(&source, &mut destination);

        assert_eq!(destination, seeds);
    }
}
