//! Window, input and the per-frame schedule
//!
//! Frame order: Emit + Update, scene pass, capture, particle draw (main
//! view, then the optional mirror inset), present. The capture is taken
//! before particles are drawn so they never collide with themselves.

use std::sync::Arc;
use std::time::Instant;

use glam::{Vec2, Vec3};
use ricochet_core::{Camera, CaptureRegistry, EmissionTrigger, ParticleConfig, SurfaceExtent};
use ricochet_gpu::{GpuContext, ParticleSystem, TargetFormats, ViewBinding, DEPTH_FORMAT};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, MouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowId};

use crate::scene::Scene;
use crate::scene_pass::{ScenePass, SceneTargets};

/// Direction the scene light travels in
const LIGHT_DIR: Vec3 = Vec3::new(-0.4, -1.0, -0.3);

/// Longest simulated step, so a stalled frame does not tunnel particles
const MAX_FRAME_TIME: f32 = 0.1;

/// Startup options from the command line
#[derive(Clone, Debug)]
pub struct AppOptions {
    pub config: ParticleConfig,
    pub mirror: bool,
}

/// Winit handler; GPU state is created on the first resume
pub struct RicochetApp {
    options: AppOptions,
    state: Option<AppState>,
}

impl RicochetApp {
    pub fn new(options: AppOptions) -> Self {
        Self {
            options,
            state: None,
        }
    }
}

struct AppState {
    window: Arc<Window>,
    context: GpuContext,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    scene: Scene,
    scene_pass: ScenePass,
    targets: SceneTargets,
    system: ParticleSystem,
    camera: Camera,
    main_binding: ViewBinding,
    mirror_binding: Option<ViewBinding>,
    cursor: Vec2,
    emitting: bool,
    last_frame: Instant,
}

impl AppState {
    fn new(event_loop: &ActiveEventLoop, options: &AppOptions) -> anyhow::Result<Self> {
        let attributes = Window::default_attributes()
            .with_title("Ricochet")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let (context, surface) = pollster::block_on(GpuContext::with_surface(Arc::clone(&window)))?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&context.adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("surface reports no texture formats"))?;
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&context.device, &surface_config);

        let scene = Scene::demo();
        let scene_pass = ScenePass::new(&context.device, format, &scene);
        let targets = SceneTargets::new(
            &context.device,
            SurfaceExtent::new(surface_config.width, surface_config.height),
        );

        let registry = Arc::new(CaptureRegistry::new());
        let system = ParticleSystem::new(
            &context,
            options.config.clone(),
            registry,
            TargetFormats {
                color: format,
                depth: Some(DEPTH_FORMAT),
            },
        )?;
        let main_binding = system.create_view_binding("Main View Uniforms");
        let mirror_binding = options
            .mirror
            .then(|| system.create_view_binding("Mirror View Uniforms"));

        tracing::info!(
            "Ricochet initialized: {}x{}, {} particle slots",
            surface_config.width,
            surface_config.height,
            options.config.capacity
        );

        Ok(Self {
            window,
            context,
            surface,
            surface_config,
            scene,
            scene_pass,
            targets,
            system,
            camera: Camera::default(),
            main_binding,
            mirror_binding,
            cursor: Vec2::ZERO,
            emitting: false,
            last_frame: Instant::now(),
        })
    }

    fn extent(&self) -> SurfaceExtent {
        SurfaceExtent::new(self.surface_config.width, self.surface_config.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface
            .configure(&self.context.device, &self.surface_config);
        self.targets = SceneTargets::new(&self.context.device, self.extent());
        tracing::debug!("resized to {}x{}", width, height);
    }

    /// Queue an emission at the scene point under the cursor
    fn pick_emission(&mut self) {
        let (origin, dir) = self.camera.ray(self.extent(), self.cursor);
        if let Some(hit) = self.scene.pick(origin, dir) {
            self.system.trigger(EmissionTrigger {
                position: hit.position,
                normal: hit.normal,
                burst: self.system.config().max_burst(),
            });
        }
    }

    /// Returns false when the app should exit
    fn render(&mut self) -> bool {
        let now = Instant::now();
        let delta_time = (now - self.last_frame).as_secs_f32().min(MAX_FRAME_TIME);
        self.last_frame = now;

        if self.emitting {
            self.pick_emission();
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface
                    .configure(&self.context.device, &self.surface_config);
                return true;
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface frame timed out");
                return true;
            }
            Err(e) => {
                tracing::error!("surface error: {}", e);
                return false;
            }
        };
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let extent = self.extent();
        let view = self.camera.camera_view(extent);
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.system.begin_frame(&mut encoder, delta_time, &view);
        self.scene_pass.draw(
            &self.context.queue,
            &mut encoder,
            &frame_view,
            &self.targets,
            &view,
            LIGHT_DIR,
        );
        self.system.capture(&mut encoder, &self.targets.source());

        self.system.update_view(&self.main_binding, &view, LIGHT_DIR);
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.system.draw(&mut pass, &self.main_binding);
        }

        if let Some(mirror_binding) = &self.mirror_binding {
            // Ground reflection in the lower-right quarter
            let inset = SurfaceExtent::new((extent.width / 4).max(1), (extent.height / 4).max(1));
            let mirror_view = self
                .camera
                .mirrored(Vec3::ZERO, Vec3::Y)
                .camera_view(inset);
            self.system
                .update_view(mirror_binding, &mirror_view, LIGHT_DIR);

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mirror Particle Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.mirror_depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let x = (extent.width - inset.width) as f32;
            let y = (extent.height - inset.height) as f32;
            pass.set_viewport(x, y, inset.width as f32, inset.height as f32, 0.0, 1.0);
            self.system.draw(&mut pass, mirror_binding);
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        true
    }
}

impl ApplicationHandler for RicochetApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match AppState::new(event_loop, &self.options) {
            Ok(state) => self.state = Some(state),
            Err(e) => {
                tracing::error!("Failed to initialize Ricochet: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                state.system.shutdown();
                event_loop.exit();
            }

            WindowEvent::Resized(size) => state.resize(size.width, size.height),

            WindowEvent::CursorMoved { position, .. } => {
                state.cursor = Vec2::new(position.x as f32, position.y as f32);
            }

            WindowEvent::MouseInput {
                state: button_state,
                button: MouseButton::Left,
                ..
            } => {
                state.emitting = button_state == ElementState::Pressed;
            }

            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.logical_key == Key::Named(NamedKey::Escape) =>
            {
                state.system.shutdown();
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                if !state.render() {
                    state.system.shutdown();
                    event_loop.exit();
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}
