//! The per-pixel state record shared by the compute and draw stages.

use bytemuck::{Pod, Zeroable};

use crate::{precision::Ds, screen};

#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug, Default, PartialEq)]
pub struct ComplexDs {
    pub real: Ds,
    pub imaginary: Ds,
}

impl ComplexDs {
    pub const ZERO: Self = ComplexDs {
        real: Ds::ZERO,
        imaginary: Ds::ZERO,
    };

    pub const fn single(real: f32, imaginary: f32) -> Self {
        ComplexDs {
            real: Ds::single(real),
            imaginary: Ds::single(imaginary),
        }
    }
}

/**
One record per screen pixel, laid out identically in `compute.wgsl` and read
as a vertex by `draw.wgsl` (see [`crate::draw::ATTRIBUTES`]).

`c` holds the pixel's normalised screen coordinate. It is written once when
seeding and never touched by the kernel; the view transform is applied on the
fly every pass, so `c` doubles as the point's screen position.
*/
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug, Default, PartialEq)]
pub struct Pixel {
    pub z: ComplexDs,
    pub c: ComplexDs,
    pub iteration: u32,
    pub escaped: u32,
}

impl Pixel {
    pub fn seed(x: f32, y: f32) -> Self {
        Pixel {
            z: ComplexDs::ZERO,
            c: ComplexDs::single(x, y),
            iteration: 0,
            escaped: 0,
        }
    }

    pub fn is_escaped(&self) -> bool {
        self.escaped != 0
    }

    pub fn screen_position(&self) -> [f32; 2] {
        [self.c.real.hi, self.c.imaginary.hi]
    }
}

/// Refill `pixels` with fresh seeds for `size`, row-major, top row first.
///
/// Reuses the existing allocation when the size hasn't changed.
pub fn seed_into(pixels: &mut Vec<Pixel>, size: screen::Size) {
    let half_width = size.width as f64 / 2.0;
    let half_height = size.height as f64 / 2.0;

    pixels.clear();
    pixels.reserve(size.pixel_count());
    pixels.extend((0..size.height).flat_map(|y_index| {
        let y = (1.0 - y_index as f64 / half_height) as f32;
        (0..size.width).map(move |x_index| {
            let x = (-1.0 + x_index as f64 / half_width) as f32;
            Pixel::seed(x, y)
        })
    }));
}

pub fn seed(size: screen::Size) -> Vec<Pixel> {
    let mut pixels = Vec::new();
    seed_into(&mut pixels, size);
    pixels
}
