//! An endlessly zooming Mandelbrot renderer: seeded pixel buffers, a parallel
//! iteration kernel on the GPU or a CPU thread pool, and a point-list draw of
//! the escape counts.

pub mod command_encoder;
pub mod compute;
pub mod config;
pub mod cpu;
pub mod draw;
pub mod error;
pub mod gpu;
pub mod kernel;
pub mod pipeline;
pub mod pixel;
pub mod precision;
pub mod screen;
pub mod typed_buffer;
pub mod var;
pub mod view;

pub use error::Error;
