/*!
Compensated ("double-single") arithmetic.

The compute stage only has `f32`. A scalar is carried as the unevaluated sum
`hi + lo` of two `f32`s, which roughly doubles the usable mantissa and lets the
zoom go several orders of magnitude deeper before the fractal boundary turns
into noise.

Every operation on split values has to go through the error-free
transformations below ([`two_sum`], [`two_prod`]); component-wise arithmetic
throws the `lo` word away. `compute.wgsl` mirrors these functions line for line,
so keep the two in sync.

Reference: T. J. Dekker, "A floating-point technique for extending the
available precision" (1971).
*/

use std::ops::{Add, Mul, Neg, Sub};

use bytemuck::{Pod, Zeroable};

/// `2^12 + 1`, splits a 24-bit `f32` mantissa into two 12-bit halves.
const SPLITTER: f32 = 4097.0;

/// A value represented as `hi + lo`, with `|lo|` at most half an ulp of `hi`.
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug, Default, PartialEq)]
pub struct Ds {
    pub hi: f32,
    pub lo: f32,
}

impl Ds {
    pub const ZERO: Self = Ds { hi: 0.0, lo: 0.0 };

    /// The low-precision degenerate case, `lo = 0`.
    pub const fn single(value: f32) -> Self {
        Ds { hi: value, lo: 0.0 }
    }

    /// Reconstruct the represented value.
    pub fn value(self) -> f64 {
        self.hi as f64 + self.lo as f64
    }

    /// Exact doubling; multiplying by two never rounds.
    pub fn twice(self) -> Self {
        Ds {
            hi: self.hi * 2.0,
            lo: self.lo * 2.0,
        }
    }
}

impl From<f32> for Ds {
    fn from(value: f32) -> Self {
        Ds::single(value)
    }
}

/// Split a high-precision scalar into `(hi, lo)`.
///
/// `hi` is `value` rounded to the nearest `f32` and `lo` is the rounded
/// residual, so `hi` on its own is always a valid low-precision fallback.
pub fn split(value: f64) -> Ds {
    let hi = value as f32;
    let lo = (value - hi as f64) as f32;
    Ds { hi, lo }
}

/// `a + b` as a rounded sum and its exact rounding error (Knuth).
pub fn two_sum(a: f32, b: f32) -> Ds {
    let s = a + b;
    let bb = s - a;
    let err = (a - (s - bb)) + (b - bb);
    Ds { hi: s, lo: err }
}

/// `a * b` as a rounded product and its rounding error (Dekker).
///
/// Deliberately avoids `mul_add` so the result matches the shader, where a
/// fused multiply-add is not guaranteed to be exact.
pub fn two_prod(a: f32, b: f32) -> Ds {
    let p = a * b;
    let (a_hi, a_lo) = halves(a);
    let (b_hi, b_lo) = halves(b);
    let err = ((a_hi * b_hi - p) + a_hi * b_lo + a_lo * b_hi) + a_lo * b_lo;
    Ds { hi: p, lo: err }
}

fn halves(a: f32) -> (f32, f32) {
    let big = a * SPLITTER;
    let hi = big - (big - a);
    (hi, a - hi)
}

impl Add for Ds {
    type Output = Ds;

    fn add(self, other: Ds) -> Ds {
        let s = two_sum(self.hi, other.hi);
        let lo = self.lo + other.lo + s.lo;
        two_sum(s.hi, lo)
    }
}

impl Neg for Ds {
    type Output = Ds;

    fn neg(self) -> Ds {
        Ds {
            hi: -self.hi,
            lo: -self.lo,
        }
    }
}

impl Sub for Ds {
    type Output = Ds;

    fn sub(self, other: Ds) -> Ds {
        self + -other
    }
}

impl Mul for Ds {
    type Output = Ds;

    fn mul(self, other: Ds) -> Ds {
        let p = two_prod(self.hi, other.hi);
        let err = p.lo + self.hi * other.lo + self.lo * other.hi;
        two_sum(p.hi, err)
    }
}
