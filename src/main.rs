use std::process;

use log::{debug, error, info, warn};
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::{Window, WindowBuilder},
};

use wgpu_mandelbrot_zoom::{
    config::{BackendKind, Config},
    cpu::CpuBackend,
    draw::{self, DrawStage},
    gpu::{GpuBackend, GpuContext},
    kernel::ComputeBackend,
    pipeline::Pipeline,
    screen,
    view::{FrameObserver, FrameStats, LogObserver, ViewController, ViewEvent, ViewState},
    Error,
};

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        error!("{}", err);
        if err.is_unsupported() {
            eprintln!("unsupported: {}", err);
        } else {
            eprintln!("error: {}", err);
        }
        process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let config = Config::from_args(std::env::args().skip(1))?;
    debug!("{:?}", config);

    match config.headless_frames {
        Some(frames) => headless(&config, frames),
        None => windowed(config),
    }
}

fn headless(config: &Config, frames: u32) -> Result<(), Error> {
    match config.backend {
        BackendKind::Cpu => {
            let backend = CpuBackend::new(config.precision, config.threads())?;
            run_headless(backend, config, frames)
        }
        BackendKind::Gpu => {
            let instance = wgpu::Instance::new(wgpu::Backends::all());
            let buffer_size = Pipeline::<GpuBackend>::buffer_size(config.size());
            let context = pollster::block_on(GpuContext::new(&instance, None, buffer_size))?;
            run_headless(GpuBackend::new(context, config.precision), config, frames)
        }
    }
}

fn run_headless<B: ComputeBackend>(backend: B, config: &Config, frames: u32) -> Result<(), Error> {
    let mut pipeline = Pipeline::new(backend, config.size(), config.passes);
    let mut controller = ViewController::new(
        ViewState {
            paused: false,
            ..config.view_state()
        },
        config.scale_floor,
        config.report_interval,
    );
    let mut observer = LogObserver {
        passes: config.passes,
    };

    for _ in 0..frames {
        controller.tick();
        let elapsed = pipeline.run_frame(controller.state());
        controller.record_frame(elapsed, &mut observer);
    }

    if let Some(pixels) = pipeline.read_result()? {
        let escaped = pixels.iter().filter(|pixel| pixel.is_escaped()).count();
        info!(
            "{} frames, final scale {:e}: {} of {} pixels escaped",
            frames,
            controller.state().scale,
            escaped,
            pixels.len()
        );
        if let Some((low, high)) = draw::value_range(&pixels, config.passes) {
            info!("colour values {:.4}..={:.4}", low, high);
        }
    }
    Ok(())
}

/// Logs the statistics and mirrors them into the window title.
struct TitleObserver<'a> {
    window: &'a Window,
    log: LogObserver,
}

impl FrameObserver for TitleObserver<'_> {
    fn report(&mut self, stats: &FrameStats) {
        self.log.report(stats);
        self.window.set_title(&format!(
            "mandelbrot | scale {:.3e} | {:.2}ms | {:.0} fps",
            stats.scale,
            stats.average.as_secs_f64() * 1000.0,
            stats.fps()
        ));
    }
}

fn view_event(key: VirtualKeyCode) -> Option<ViewEvent> {
    match key {
        VirtualKeyCode::Space => Some(ViewEvent::TogglePause),
        VirtualKeyCode::R => Some(ViewEvent::ResetScale),
        VirtualKeyCode::Escape => Some(ViewEvent::ResetAll),
        _ => None,
    }
}

/// Premultiplied alpha when the surface offers it, matching the "over" blend of
/// the draw stage.
fn alpha_mode(supported: &[wgpu::CompositeAlphaMode]) -> wgpu::CompositeAlphaMode {
    if supported.contains(&wgpu::CompositeAlphaMode::PreMultiplied) {
        wgpu::CompositeAlphaMode::PreMultiplied
    } else {
        wgpu::CompositeAlphaMode::Auto
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resize {
    Ignore,
    /// Resize the surface but keep the frame buffers, which the device can't
    /// hold at the new size.
    SurfaceOnly,
    Full,
}

/// `current` is the surface size, which can differ from the frame buffers'
/// after a [`Resize::SurfaceOnly`].
fn plan_resize(current: screen::Size, requested: screen::Size, buffers_fit: bool) -> Resize {
    if requested.is_empty() || requested == current {
        Resize::Ignore
    } else if buffers_fit {
        Resize::Full
    } else {
        Resize::SurfaceOnly
    }
}

fn windowed(config: Config) -> Result<(), Error> {
    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("mandelbrot")
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .build(&event_loop)?;

    let instance = wgpu::Instance::new(wgpu::Backends::all());
    let size = screen::Size::from(window.inner_size());
    let surface = unsafe { instance.create_surface(&window) };

    let context = pollster::block_on(GpuContext::new(
        &instance,
        Some(&surface),
        Pipeline::<GpuBackend>::buffer_size(size),
    ))?;

    let mut surface_configuration = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface
            .get_supported_formats(&context.adapter)
            .first()
            .copied()
            .ok_or(Error::IncompatibleSurface)?,
        width: size.width,
        height: size.height,
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: alpha_mode(&surface.get_supported_alpha_modes(&context.adapter)),
    };
    surface.configure(&context.device, &surface_configuration);

    let draw = DrawStage::new(&context.device, surface_configuration.format, config.passes);
    let mut pipeline = Pipeline::new(
        GpuBackend::new(context, config.precision),
        size,
        config.passes,
    );
    let mut controller =
        ViewController::new(config.view_state(), config.scale_floor, config.report_interval);
    let passes = config.passes;

    event_loop.run(move |event, _, control_flow| match event {
        Event::MainEventsCleared => {
            window.request_redraw();
        }
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested => {
                *control_flow = ControlFlow::Exit;
            }
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(key),
                        ..
                    },
                ..
            } => {
                if let Some(event) = view_event(key) {
                    controller.push(event);
                }
            }
            WindowEvent::Resized(physical_size) => {
                let size = screen::Size::from(physical_size);
                let context = pipeline.backend().context();
                let buffer_size = Pipeline::<GpuBackend>::buffer_size(size);
                let surface_size =
                    screen::Size::new(surface_configuration.width, surface_configuration.height);
                let plan = plan_resize(
                    surface_size,
                    size,
                    context.supports_buffer_size(buffer_size),
                );
                if plan == Resize::Ignore {
                    return;
                }

                debug!("resizing to {:?}", size);
                surface_configuration.width = size.width;
                surface_configuration.height = size.height;
                surface.configure(&context.device, &surface_configuration);

                if plan == Resize::Full {
                    pipeline.resize(size);
                } else {
                    warn!(
                        "keeping {:?} frame buffers: {} bytes exceed the device limits",
                        pipeline.size(),
                        buffer_size
                    );
                }
                window.request_redraw();
            }
            _ => {}
        },
        Event::RedrawRequested(window_id) if window_id == window.id() => {
            // A resize leaves the pipeline without a result, which forces a
            // frame even while paused.
            if controller.tick() || pipeline.result().is_none() {
                let elapsed = pipeline.run_frame(controller.state());
                let mut observer = TitleObserver {
                    window: &window,
                    log: LogObserver { passes },
                };
                controller.record_frame(elapsed, &mut observer);
            }
            let Some(result) = pipeline.result() else {
                return;
            };

            let surface_texture = match surface.get_current_texture() {
                Ok(surface_texture) => surface_texture,
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    warn!("surface lost, reconfiguring and skipping the frame");
                    surface.configure(&pipeline.backend().context().device, &surface_configuration);
                    return;
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    warn!("surface timed out, skipping the frame");
                    return;
                }
                Err(err) => {
                    error!("{}", Error::from(err));
                    *control_flow = ControlFlow::ExitWithCode(1);
                    return;
                }
            };

            let surface_texture_view = surface_texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            draw.render(pipeline.backend().context(), &surface_texture_view, result);
            surface_texture.present();
        }
        _ => {}
    })
}
