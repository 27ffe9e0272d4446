//! The per-pixel Mandelbrot update rule and the backends that run it.

use std::str::FromStr;

use bytemuck::{Pod, Zeroable};
use serde::Deserialize;

use crate::{
    error::Error,
    pixel::{ComplexDs, Pixel},
    precision::{split, Ds},
    screen,
    view::ViewState,
};

/// Squared escape radius.
pub const ESCAPE_RADIUS_SQUARED: f32 = 4.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// Plain `f32`; only the `hi` words are read.
    Single,
    /// Compensated `hi + lo` pairs.
    Double,
}

impl Precision {
    /// Entry point in `compute.wgsl`.
    pub fn entry_point(self) -> &'static str {
        match self {
            Precision::Single => "iterate_single",
            Precision::Double => "iterate_double",
        }
    }
}

impl FromStr for Precision {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "single" => Ok(Precision::Single),
            "double" => Ok(Precision::Double),
            _ => Err(()),
        }
    }
}

/// View parameters as the kernel sees them. Mirrors `compute.wgsl#Config`.
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug, Default, PartialEq)]
pub struct KernelConfig {
    pub center: ComplexDs,
    pub scale: Ds,
    pub aspect_ratio: f32,
    pub pixel_count: u32,
}

impl KernelConfig {
    pub fn new(view: &ViewState, size: screen::Size) -> Self {
        KernelConfig {
            center: ComplexDs {
                real: split(view.center.0),
                imaginary: split(view.center.1),
            },
            scale: split(view.scale),
            aspect_ratio: size.aspect_ratio(),
            pixel_count: size.pixel_count() as u32,
        }
    }

    /// Map a normalised screen coordinate into the complex plane:
    /// `(c * aspect_ratio) * scale + center` on the real axis, `c * scale + center`
    /// on the imaginary one.
    pub fn map(&self, c: ComplexDs, precision: Precision) -> ComplexDs {
        match precision {
            Precision::Single => ComplexDs::single(
                (c.real.hi * self.aspect_ratio) * self.scale.hi + self.center.real.hi,
                c.imaginary.hi * self.scale.hi + self.center.imaginary.hi,
            ),
            Precision::Double => ComplexDs {
                real: c.real * Ds::from(self.aspect_ratio) * self.scale + self.center.real,
                imaginary: c.imaginary * self.scale + self.center.imaginary,
            },
        }
    }
}

/**
One Mandelbrot iteration, `z = z^2 + c`.

Escaped pixels are frozen entirely: neither `z` nor `iteration` changes, so
`iteration` records the pass on which the pixel escaped. On the escaping pass
`z` keeps the value that failed the test.

NaN or infinite iterates are not special-cased; such a pixel simply never
passes, or spuriously passes, the escape test.
*/
pub fn step(pixel: Pixel, config: &KernelConfig, precision: Precision) -> Pixel {
    if pixel.is_escaped() {
        return pixel;
    }

    let c = config.map(pixel.c, precision);
    let z = match precision {
        Precision::Single => {
            let (zr, zi) = (pixel.z.real.hi, pixel.z.imaginary.hi);
            ComplexDs::single(
                zr * zr - zi * zi + c.real.hi,
                2.0 * zr * zi + c.imaginary.hi,
            )
        }
        Precision::Double => {
            let (zr, zi) = (pixel.z.real, pixel.z.imaginary);
            ComplexDs {
                real: zr * zr - zi * zi + c.real,
                imaginary: (zr * zi).twice() + c.imaginary,
            }
        }
    };

    let (re, im) = (z.real.hi, z.imaginary.hi);
    Pixel {
        z,
        c: pixel.c,
        iteration: pixel.iteration + 1,
        escaped: (re * re + im * im > ESCAPE_RADIUS_SQUARED) as u32,
    }
}

/**
A data-parallel executor for [`step`].

Buffers are exclusively borrowed by whichever stage is using them, so a backend
never sees reads interleaved with in-flight writes. Work may be queued until
[`ComputeBackend::submit`]; everything queued before a submit completes before
anything queued after it.
*/
pub trait ComputeBackend {
    type Buffer;

    fn create_buffer(&mut self, label: &str, len: usize) -> Self::Buffer;

    fn upload(&mut self, buffer: &mut Self::Buffer, pixels: &[Pixel]);

    /// Full overwrite of `destination` with `source`.
    fn copy(&mut self, source: &Self::Buffer, destination: &mut Self::Buffer);

    fn configure(&mut self, config: KernelConfig);

    /// Apply [`step`] to every pixel `passes` times. Passes are strictly ordered;
    /// pixels within a pass are not.
    fn run_passes(&mut self, buffer: &mut Self::Buffer, passes: u32);

    fn submit(&mut self);

    /// Wait for queued work and copy `buffer` back to the host.
    fn read(&mut self, buffer: &Self::Buffer) -> Result<Vec<Pixel>, Error>;
}

#[cfg(test)]
mod tests {
    use rayon::prelude::*;

    use super::*;
    use crate::pixel;

    fn unmapped() -> KernelConfig {
        KernelConfig {
            center: ComplexDs::ZERO,
            scale: Ds::single(1.0),
            aspect_ratio: 1.0,
            pixel_count: 1,
        }
    }

    fn iterate(mut pixel: Pixel, config: &KernelConfig, precision: Precision, passes: u32) -> Pixel {
        for _ in 0..passes {
            pixel = step(pixel, config, precision);
        }
        pixel
    }

    fn default_view(scale: f64) -> ViewState {
        ViewState {
            scale,
            ..ViewState::default()
        }
    }

    #[test]
    fn corner_pixel_escapes_on_the_third_pass() {
        for precision in [Precision::Single, Precision::Double] {
            let pixel = iterate(Pixel::seed(-1.0, -1.0), &unmapped(), precision, 1000);

            assert!(pixel.is_escaped());
            assert_eq!(pixel.iteration, 3);
            assert_eq!(pixel.z, ComplexDs::single(-1.0, -3.0));
        }
    }

    #[test]
    fn origin_never_escapes() {
        for precision in [Precision::Single, Precision::Double] {
            let pixel = iterate(Pixel::seed(0.0, 0.0), &unmapped(), precision, 1000);

            assert!(!pixel.is_escaped());
            assert_eq!(pixel.iteration, 1000);
            assert_eq!(pixel.z, ComplexDs::ZERO);
        }
    }

    #[test]
    fn frame_centre_escape_counts_are_pinned() {
        let config = KernelConfig::new(&default_view(2.0), screen::Size::new(1200, 800));
        let centre = Pixel::seed(0.0, 0.0);

        let single = iterate(centre, &config, Precision::Single, 1000);
        assert!(single.is_escaped());
        assert_eq!(single.iteration, 545);

        let double = iterate(centre, &config, Precision::Double, 1000);
        assert!(double.is_escaped());
        assert_eq!(double.iteration, 548);
    }

    #[test]
    fn escaped_pixels_are_frozen() {
        let config = unmapped();
        let escaped = iterate(Pixel::seed(-1.0, -1.0), &config, Precision::Single, 3);
        assert!(escaped.is_escaped());

        assert_eq!(step(escaped, &config, Precision::Single), escaped);
        assert_eq!(step(escaped, &config, Precision::Double), escaped);
    }

    #[test]
    fn escape_is_monotonic_across_passes() {
        let config = KernelConfig::new(&default_view(2.0), screen::Size::new(48, 32));
        for precision in [Precision::Single, Precision::Double] {
            let mut pixels = pixel::seed(screen::Size::new(48, 32));
            let mut ever_escaped = vec![false; pixels.len()];

            for _ in 0..200 {
                for (pixel, ever) in pixels.iter_mut().zip(&mut ever_escaped) {
                    *pixel = step(*pixel, &config, precision);
                    assert!(!*ever || pixel.is_escaped());
                    *ever |= pixel.is_escaped();
                }
            }
            assert!(ever_escaped.iter().any(|escaped| *escaped));
        }
    }

    #[test]
    fn pixel_order_does_not_matter() {
        let size = screen::Size::new(40, 30);
        let config = KernelConfig::new(&default_view(0.5), size);
        let seeds = pixel::seed(size);

        for precision in [Precision::Single, Precision::Double] {
            let mut in_order = seeds.clone();
            let mut reversed = seeds.clone();
            let mut parallel = seeds.clone();

            for _ in 0..100 {
                in_order
                    .iter_mut()
                    .for_each(|pixel| *pixel = step(*pixel, &config, precision));
                reversed
                    .iter_mut()
                    .rev()
                    .for_each(|pixel| *pixel = step(*pixel, &config, precision));
                parallel
                    .par_iter_mut()
                    .for_each(|pixel| *pixel = step(*pixel, &config, precision));
            }

            let bytes: &[u8] = bytemuck::cast_slice(&in_order);
            assert_eq!(bytes, bytemuck::cast_slice::<Pixel, u8>(&reversed));
            assert_eq!(bytes, bytemuck::cast_slice::<Pixel, u8>(&parallel));
        }
    }

    #[test]
    fn double_precision_separates_neighbours_at_deep_zoom() {
        let size = screen::Size::new(1200, 800);
        let config = KernelConfig::new(&default_view(1e-7), size);
        let pixels = pixel::seed(size);
        let (left, right) = (pixels[400 * 1200 + 600].c, pixels[400 * 1200 + 601].c);

        assert_eq!(
            config.map(left, Precision::Single),
            config.map(right, Precision::Single)
        );
        assert_ne!(
            config.map(left, Precision::Double),
            config.map(right, Precision::Double)
        );
    }

    #[test]
    fn config_splits_the_view() {
        let config = KernelConfig::new(&default_view(2.0), screen::Size::new(1200, 800));

        assert_eq!(config.center.real, split(-0.746));
        assert_eq!(config.center.imaginary, split(-0.11));
        assert_eq!(config.scale, Ds::single(2.0));
        assert_eq!(config.aspect_ratio, 1.5);
        assert_eq!(config.pixel_count, 960_000);
    }

    #[test]
    fn precision_parses_from_names() {
        assert_eq!("single".parse(), Ok(Precision::Single));
        assert_eq!("double".parse(), Ok(Precision::Double));
        assert!("quad".parse::<Precision>().is_err());
    }
}
