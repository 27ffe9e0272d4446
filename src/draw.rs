/*!
Draws the result buffer as a point list.

There is no separate geometry: the compute stage's `Pixel` records are bound
directly as the vertex buffer, and [`ATTRIBUTES`] picks the screen position,
iteration count and escape flag out of each record.
*/

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::{
    command_encoder::{self, CommandEncoderExt},
    gpu::GpuContext,
    pixel::Pixel,
    typed_buffer::Buffer,
    var::Var,
};

/// Vertex attributes over [`Pixel`]: `c.real.hi`, `c.imaginary.hi`,
/// `iteration`, `escaped`.
pub const ATTRIBUTES: [wgpu::VertexAttribute; 4] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32,
        offset: 16,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32,
        offset: 24,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Uint32,
        offset: 32,
        shader_location: 2,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Uint32,
        offset: 36,
        shader_location: 3,
    },
];

/// Source-over compositing, so overlapping points accumulate.
pub const OVER: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Mirrors `draw.wgsl#DrawConfig`.
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug)]
struct DrawConfig {
    passes: u32,
    padding: [u32; 3],
}

/// What `draw.wgsl#vertex_main` computes for one pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub position: [f32; 2],
    /// `iteration / passes` for escaped pixels, `0` for pixels still inside.
    pub value: f32,
}

impl Point {
    pub fn from_pixel(pixel: &Pixel, passes: u32) -> Self {
        let value = if pixel.is_escaped() {
            pixel.iteration as f32 / passes as f32
        } else {
            0.0
        };
        Point {
            position: pixel.screen_position(),
            value,
        }
    }
}

/// Smallest and largest colour value over the escaped pixels of a frame, or
/// `None` if nothing escaped.
pub fn value_range(pixels: &[Pixel], passes: u32) -> Option<(f32, f32)> {
    pixels
        .iter()
        .filter(|pixel| pixel.is_escaped())
        .map(|pixel| Point::from_pixel(pixel, passes).value)
        .fold(None, |range, value| match range {
            None => Some((value, value)),
            Some((low, high)) => Some((low.min(value), high.max(value))),
        })
}

pub struct DrawStage {
    render_pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

impl DrawStage {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, passes: u32) -> Self {
        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("draw-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("draw.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw-bind-group-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("draw-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("draw-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader_module,
                entry_point: "vertex_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: size_of::<Pixel>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &ATTRIBUTES,
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::PointList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader_module,
                entry_point: "fragment_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(OVER),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        // Written once; the bind group keeps the buffer alive.
        let config = Var::uniform(
            device,
            "draw-config",
            DrawConfig {
                passes,
                padding: [0; 3],
            },
        );

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: config.binding_resource(),
            }],
        });

        Self {
            render_pipeline,
            bind_group,
        }
    }

    /// Clear `target` to transparent and draw one point per pixel of `result`.
    pub fn render(&self, context: &GpuContext, target: &wgpu::TextureView, result: &Buffer<Pixel>) {
        let vertex_count = result.len() as u32;
        let command_buffer = command_encoder::record(&context.device, "draw-encoder", |command_encoder| {
            command_encoder.with_render_pass(
                &wgpu::RenderPassDescriptor {
                    label: Some("draw-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: true,
                        },
                    })],
                    depth_stencil_attachment: None,
                },
                |render_pass| {
                    render_pass.set_pipeline(&self.render_pipeline);
                    render_pass.set_bind_group(0, &self.bind_group, &[]);
                    render_pass.set_vertex_buffer(0, result.buffer().slice(..));
                    render_pass.draw(0..vertex_count, 0..1);
                },
            )
        });
        context.queue.submit([command_buffer]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kernel::{self, KernelConfig, Precision},
        pixel::{self, ComplexDs},
        screen,
        view::ViewState,
    };

    #[test]
    fn attributes_point_at_the_pixel_fields() {
        let pixel = Pixel {
            z: ComplexDs::single(9.0, 9.0),
            c: ComplexDs::single(0.25, -0.75),
            iteration: 17,
            escaped: 1,
        };
        let bytes: &[u8] = bytemuck::bytes_of(&pixel);
        let word = |offset: u64| {
            let offset = offset as usize;
            [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]
        };

        assert_eq!(f32::from_ne_bytes(word(ATTRIBUTES[0].offset)), 0.25);
        assert_eq!(f32::from_ne_bytes(word(ATTRIBUTES[1].offset)), -0.75);
        assert_eq!(u32::from_ne_bytes(word(ATTRIBUTES[2].offset)), 17);
        assert_eq!(u32::from_ne_bytes(word(ATTRIBUTES[3].offset)), 1);
    }

    #[test]
    fn escaped_points_are_coloured_by_iteration() {
        let mut pixel = Pixel::seed(0.5, -0.5);
        pixel.iteration = 125;
        pixel.escaped = 1;

        assert_eq!(
            Point::from_pixel(&pixel, 500),
            Point {
                position: [0.5, -0.5],
                value: 0.25
            }
        );
    }

    #[test]
    fn points_inside_the_set_get_the_sentinel() {
        let mut pixel = Pixel::seed(-1.0, 1.0);
        pixel.iteration = 500;

        assert_eq!(Point::from_pixel(&pixel, 500).value, 0.0);
    }

    #[test]
    fn value_range_covers_escaped_pixels_only() {
        let mut pixels = pixel::seed(screen::Size::new(4, 1));
        pixels[0].iteration = 3;
        pixels[0].escaped = 1;
        pixels[1].iteration = 100;
        pixels[2].iteration = 50;
        pixels[2].escaped = 1;

        assert_eq!(value_range(&pixels, 100), Some((0.03, 0.5)));
        assert_eq!(value_range(&pixels[1..2], 100), None);
    }

    #[test]
    fn value_range_of_a_computed_frame() {
        let size = screen::Size::new(30, 20);
        let config = KernelConfig::new(&ViewState::default(), size);
        let pixels: Vec<Pixel> = pixel::seed(size)
            .into_iter()
            .map(|seed| (0..50).fold(seed, |pixel, _| kernel::step(pixel, &config, Precision::Single)))
            .collect();

        let (low, high) = value_range(&pixels, 50).unwrap();
        assert!(0.0 < low && low <= high && high <= 1.0);
        // The left edge escapes on the first pass.
        assert_eq!(low, 1.0 / 50.0);
    }

    #[test]
    fn draw_config_is_uniform_sized() {
        assert_eq!(size_of::<DrawConfig>(), 16);
    }
}
