/// Workgroup `y` size of the `compute.wgsl` entry points.
pub const WORKGROUP_SIZE_Y: u32 = 64;

/// Workgroups per dispatch along `y`.
pub const DISPATCH_SIZE_Y: u32 = 1024;

/// Invocations per dispatch `x` step. Corresponds to the `65536u` row stride
/// in `compute.wgsl#pixel_index`.
pub const INVOCATIONS_PER_ROW: u32 = DISPATCH_SIZE_Y * WORKGROUP_SIZE_Y;

/**
Dispatch size covering `pixel_count` invocations, one per pixel.

A single dimension tops out at `maxComputeWorkgroupsPerDimension` (65535)
workgroups, well short of one invocation per pixel on a large canvas. The grid
is laid out as rows of `1024 * 64 = 65536` invocations with as many rows in `x`
as needed; the kernel recovers its pixel as `id.x * 65536 + id.y`.

Up to one row of invocations lands past the end of the buffer. The kernel
returns early for those.

[WGSL compute shader workgroups](https://www.w3.org/TR/WGSL/#compute-shader-workgroups)
*/
pub fn dispatch_size(pixel_count: usize) -> (u32, u32, u32) {
    let rows = pixel_count / INVOCATIONS_PER_ROW as usize + 1;
    (u32::try_from(rows).unwrap_or(u32::MAX), DISPATCH_SIZE_Y, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocations((x, y, z): (u32, u32, u32)) -> u64 {
        x as u64 * y as u64 * z as u64 * WORKGROUP_SIZE_Y as u64
    }

    #[test]
    fn dispatch_covers_every_pixel() {
        for pixel_count in [1, 65_535, 65_536, 65_537, 960_000, 3840 * 2160] {
            let size = dispatch_size(pixel_count);
            assert!(invocations(size) >= pixel_count as u64, "{pixel_count}");
            assert!(invocations(size) - (pixel_count as u64) <= INVOCATIONS_PER_ROW as u64);
            assert!(size.0 <= 65_535);
        }
    }

    #[test]
    fn small_canvases_need_one_row() {
        assert_eq!(dispatch_size(1200), (1, DISPATCH_SIZE_Y, 1));
    }
}
