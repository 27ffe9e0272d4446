//! [`ComputeBackend`] on a `wgpu` compute pipeline.

use std::sync::mpsc;

use log::{debug, info};

use crate::{
    command_encoder::{self, CommandEncoderExt},
    compute,
    error::Error,
    kernel::{ComputeBackend, KernelConfig, Precision},
    pixel::Pixel,
    typed_buffer::{self, Buffer},
    var::Var,
};

pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /**
    Acquire an adapter and device able to bind `buffer_size` bytes as a single
    storage buffer.

    Failure here is final: without a compute-capable adapter there is nothing
    to fall back to.
    */
    pub async fn new(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface>,
        buffer_size: u64,
    ) -> Result<Self, Error> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface,
            })
            .await
            .ok_or(Error::NoAdapter)?;
        info!("adapter: {:?}", adapter.get_info());

        let limits = required_limits(&adapter.limits(), buffer_size)?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("device"),
                    features: wgpu::Features::empty(),
                    limits,
                },
                None,
            )
            .await?;

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Whether the device can bind `buffer_size` bytes as one storage buffer.
    pub fn supports_buffer_size(&self, buffer_size: u64) -> bool {
        let limits = self.device.limits();
        buffer_size <= limits.max_storage_buffer_binding_size as u64
            && buffer_size <= limits.max_buffer_size
    }
}

fn required_limits(adapter: &wgpu::Limits, buffer_size: u64) -> Result<wgpu::Limits, Error> {
    let limit = (adapter.max_storage_buffer_binding_size as u64).min(adapter.max_buffer_size);
    if buffer_size > limit {
        return Err(Error::BufferTooLarge {
            required: buffer_size,
            limit,
        });
    }

    // Everything the adapter offers; storage buffers are the only limit that
    // depends on the canvas.
    Ok(adapter.clone())
}

pub struct GpuBackend {
    context: GpuContext,
    bind_group_layout: wgpu::BindGroupLayout,
    compute_pipeline: wgpu::ComputePipeline,
    config: Var<KernelConfig>,
    config_len: usize,
    command_encoder: Option<wgpu::CommandEncoder>,
}

impl GpuBackend {
    pub fn new(context: GpuContext, precision: Precision) -> Self {
        let device = &context.device;

        let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("compute-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("compute.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compute-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("compute-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        debug!("compute entry point {}", precision.entry_point());
        let compute_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("compute-pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader_module,
            entry_point: precision.entry_point(),
        });

        let config = Var::uniform(device, "compute-config", KernelConfig::default());

        Self {
            context,
            bind_group_layout,
            compute_pipeline,
            config,
            config_len: 0,
            command_encoder: None,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}

/// The encoder collecting the current frame's commands, until [`GpuBackend::submit`].
fn pending<'a>(
    command_encoder: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    command_encoder.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        })
    })
}

impl ComputeBackend for GpuBackend {
    type Buffer = Buffer<Pixel>;

    fn create_buffer(&mut self, label: &str, len: usize) -> Self::Buffer {
        typed_buffer::Builder::new(len as u64)
            .with_label(label)
            .with_usage(
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::VERTEX,
            )
            .create(&self.context.device)
    }

    fn upload(&mut self, buffer: &mut Self::Buffer, pixels: &[Pixel]) {
        buffer.write(&self.context.queue, pixels);
    }

    fn copy(&mut self, source: &Self::Buffer, destination: &mut Self::Buffer) {
        let command_encoder = pending(&mut self.command_encoder, &self.context.device);
        typed_buffer::copy_buffer_to_buffer(command_encoder, source, destination);
    }

    fn configure(&mut self, config: KernelConfig) {
        self.config_len = config.pixel_count as usize;
        self.config.write(&self.context.queue, config);
    }

    fn run_passes(&mut self, buffer: &mut Self::Buffer, passes: u32) {
        debug_assert_eq!(buffer.len() as usize, self.config_len);
        let (x, y, z) = compute::dispatch_size(buffer.len() as usize);

        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("compute-bind-group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.binding_resource(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.config.binding_resource(),
                    },
                ],
            });

        let compute_pipeline = &self.compute_pipeline;
        let command_encoder = pending(&mut self.command_encoder, &self.context.device);

        // Dispatches within one pass are ordered, and each sees the previous
        // one's writes to the storage buffer.
        command_encoder.with_compute_pass("iteration-pass", |compute_pass| {
            compute_pass.set_pipeline(compute_pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            for _ in 0..passes {
                compute_pass.dispatch_workgroups(x, y, z);
            }
        });
    }

    fn submit(&mut self) {
        if let Some(command_encoder) = self.command_encoder.take() {
            self.context.queue.submit([command_encoder.finish()]);
        }
    }

    fn read(&mut self, buffer: &Self::Buffer) -> Result<Vec<Pixel>, Error> {
        self.submit();

        let device = &self.context.device;
        let staging: Buffer<Pixel> = typed_buffer::Builder::new(buffer.len())
            .with_label("readback-buffer")
            .with_usage(wgpu::BufferUsages::MAP_READ)
            .create(device);
        let command_buffer = command_encoder::record(device, "readback-encoder", |command_encoder| {
            typed_buffer::copy_buffer_to_buffer(command_encoder, buffer, &staging)
        });
        self.context.queue.submit([command_buffer]);

        let slice = staging.slice();
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        receiver.recv().map_err(|_| Error::MapAbandoned)??;

        let pixels = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pipeline::Pipeline, screen, view::ViewState};

    fn context(buffer_size: u64) -> Option<GpuContext> {
        let instance = wgpu::Instance::new(wgpu::Backends::all());
        match pollster::block_on(GpuContext::new(&instance, None, buffer_size)) {
            Ok(context) => Some(context),
            Err(error) => {
                println!("skipping: {}", error);
                None
            }
        }
    }

    #[test]
    fn limits_reject_oversized_buffers() {
        let adapter = wgpu::Limits::default();
        let too_big = adapter.max_storage_buffer_binding_size as u64 + 1;

        assert!(matches!(
            required_limits(&adapter, too_big),
            Err(Error::BufferTooLarge { .. })
        ));
        assert_eq!(
            required_limits(&adapter, 1024).unwrap().max_storage_buffer_binding_size,
            adapter.max_storage_buffer_binding_size
        );
    }

    #[test]
    fn gpu_frames_are_repeatable() {
        let size = screen::Size::new(64, 48);
        let Some(context) = context(Pipeline::<GpuBackend>::buffer_size(size)) else {
            return;
        };

        let mut pipeline = Pipeline::new(GpuBackend::new(context, Precision::Single), size, 100);
        let view = ViewState::default();

        pipeline.run_frame(&view);
        let first = pipeline.read_result().unwrap().unwrap();
        pipeline.run_frame(&view);
        let second = pipeline.read_result().unwrap().unwrap();

        assert_eq!(first.len(), size.pixel_count());
        assert_eq!(
            bytemuck::cast_slice::<Pixel, u8>(&first),
            bytemuck::cast_slice::<Pixel, u8>(&second)
        );
        assert!(first.iter().any(|pixel| pixel.is_escaped()));
        assert!(first
            .iter()
            .all(|pixel| pixel.is_escaped() || pixel.iteration == 100));
    }

    #[test]
    fn left_edge_escapes_on_the_first_pass() {
        let size = screen::Size::new(40, 20);
        let Some(context) = context(Pipeline::<GpuBackend>::buffer_size(size)) else {
            return;
        };

        let mut pipeline = Pipeline::new(GpuBackend::new(context, Precision::Double), size, 4);
        pipeline.run_frame(&ViewState::default());
        let pixels = pipeline.read_result().unwrap().unwrap();

        let corner = pixels[0];
        assert!(corner.is_escaped());
        assert_eq!(corner.iteration, 1);
        assert_eq!(corner.c, Pixel::seed(-1.0, 1.0).c);
    }
}
