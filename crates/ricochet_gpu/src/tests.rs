//! Device tests for ricochet_gpu
//!
//! Each test creates its own headless device. They need a GPU adapter, so
//! they are ignored by default; run them with
//! `cargo test -p ricochet_gpu -- --ignored`.

use std::sync::Arc;

use glam::Vec3;
use ricochet_core::camera::project;
use ricochet_core::{
    decode_normal, Camera, CameraView, CaptureRegistry, EmissionController, EmissionTrigger,
    MeshData, ParticleConfig, ParticleDevice, SurfaceExtent, ATTRIBUTE_COUNT, NORMAL_ATTRIBUTE,
};

use crate::context::GpuContext;
use crate::gbuffer::{CaptureSource, SceneCollisionBuffers, ATTRIBUTE_FORMAT, DEPTH_FORMAT};
use crate::pool::GpuParticlePool;
use crate::renderer::PseudoInstancedRenderer;
use crate::simulator::GpuParticleSimulator;
use crate::system::{ParticleSystem, TargetFormats};

fn create_test_context() -> GpuContext {
    pollster::block_on(GpuContext::headless()).expect("Failed to create headless GPU context")
}

fn still_config(capacity: u32, lifetime: f32) -> ParticleConfig {
    ParticleConfig {
        capacity,
        group_size: 4,
        lifetime,
        gravity: 0.0,
        range: [0.0; 3],
        velocity_spread: [0.0; 3],
        ..Default::default()
    }
}

fn front_camera(extent: SurfaceExtent) -> CameraView {
    Camera {
        eye: Vec3::new(0.0, 0.0, 10.0),
        target: Vec3::ZERO,
        ..Default::default()
    }
    .camera_view(extent)
}

fn run_update(
    context: &GpuContext,
    simulator: &GpuParticleSimulator,
    pool: &GpuParticlePool,
    delta_time: f32,
    view: &CameraView,
) {
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Update Encoder"),
        });
    simulator.update(&mut encoder, pool, delta_time, view, None);
    context.queue.submit(std::iter::once(encoder.finish()));
}

/// Scene-side targets a capture reads from
struct SourceTargets {
    depth: wgpu::TextureView,
    attributes: Vec<wgpu::TextureView>,
    extent: SurfaceExtent,
}

impl SourceTargets {
    fn new(device: &wgpu::Device, extent: SurfaceExtent) -> Self {
        let create = |format: wgpu::TextureFormat, label: &str| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: extent.width,
                        height: extent.height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: crate::gbuffer::SOURCE_USAGE,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        Self {
            depth: create(DEPTH_FORMAT, "Test Scene Depth"),
            attributes: (0..4)
                .map(|_| create(ATTRIBUTE_FORMAT, "Test Scene Attribute"))
                .collect(),
            extent,
        }
    }

    /// Fill the whole scene with one flat surface
    fn clear(&self, encoder: &mut wgpu::CommandEncoder, depth: f32, normal: wgpu::Color) {
        let color_attachments: Vec<_> = self
            .attributes
            .iter()
            .enumerate()
            .map(|(i, view)| {
                let color = if i == NORMAL_ATTRIBUTE {
                    normal
                } else {
                    wgpu::Color::BLACK
                };
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Test Scene Clear"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(depth),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn source(&self) -> CaptureSource<'_> {
        CaptureSource {
            depth: &self.depth,
            attributes: [
                &self.attributes[0],
                &self.attributes[1],
                &self.attributes[2],
                &self.attributes[3],
            ],
            extent: self.extent,
        }
    }
}

/// Normal +Z as written by the scene pass
const FACING_Z: wgpu::Color = wgpu::Color {
    r: 0.5,
    g: 0.5,
    b: 1.0,
    a: 1.0,
};

#[test]
#[ignore] // Requires GPU
fn test_init_fills_free_list() {
    let context = create_test_context();
    let mut pool = GpuParticlePool::new(&context, 4);
    pool.init(16);

    assert_eq!(pool.query_available_count(), 16);
    let mut free = pool.read_free_list().unwrap();
    free.sort_unstable();
    assert_eq!(free, (0..16).collect::<Vec<u32>>());
    assert!(pool.read_particles().unwrap().iter().all(|p| !p.is_active()));
}

#[test]
#[ignore] // Requires GPU
fn test_burst_then_expire_scenario() {
    let context = create_test_context();
    let config = still_config(8, 1.0);
    let mut pool = GpuParticlePool::from_config(&context, &config);
    let simulator = GpuParticleSimulator::new(&context, &pool, &config);
    let mut controller = EmissionController::new(config.clone());
    let view = front_camera(SurfaceExtent::new(16, 16));

    let trigger = EmissionTrigger {
        position: Vec3::ZERO,
        normal: Vec3::Y,
        burst: 3,
    };
    assert_eq!(controller.emit(&mut pool, &trigger), 3);
    assert_eq!(pool.query_available_count(), 5);

    let active = pool.read_particles().unwrap();
    assert_eq!(active.iter().filter(|p| p.is_active()).count(), 3);
    for particle in active.iter().filter(|p| p.is_active()) {
        assert_eq!(particle.lifetime, 1.0);
        assert!((particle.velocity() - Vec3::new(2.0, 5.0, 2.0)).length() < 1e-4);
    }

    for _ in 0..4 {
        run_update(&context, &simulator, &pool, 0.25, &view);
    }
    assert_eq!(pool.query_available_count(), 8);
    assert!(pool.read_particles().unwrap().iter().all(|p| !p.is_active()));

    let mut free = pool.read_free_list().unwrap();
    free.sort_unstable();
    assert_eq!(free, (0..8).collect::<Vec<u32>>());
}

#[test]
#[ignore] // Requires GPU
fn test_burst_larger_than_pool() {
    let context = create_test_context();
    let config = still_config(8, 5.0);
    let mut pool = GpuParticlePool::from_config(&context, &config);
    let mut controller = EmissionController::new(config);

    let trigger = EmissionTrigger {
        position: Vec3::ZERO,
        normal: Vec3::Y,
        burst: 20,
    };
    assert_eq!(controller.emit(&mut pool, &trigger), 8);
    assert_eq!(pool.query_available_count(), 0);
    assert_eq!(controller.emit(&mut pool, &trigger), 0);

    let particles = pool.read_particles().unwrap();
    assert_eq!(particles.iter().filter(|p| p.is_active()).count(), 8);
    assert!(pool.read_free_list().unwrap().is_empty());
}

#[test]
#[ignore] // Requires GPU
fn test_reinit_after_teardown() {
    let context = create_test_context();
    let config = still_config(8, 5.0);
    let mut pool = GpuParticlePool::from_config(&context, &config);
    let mut controller = EmissionController::new(config);
    let generation = pool.generation();

    let trigger = EmissionTrigger {
        position: Vec3::ZERO,
        normal: Vec3::Y,
        burst: 5,
    };
    controller.emit(&mut pool, &trigger);

    pool.teardown();
    pool.teardown();
    assert!(!pool.is_initialized());
    assert_eq!(pool.query_available_count(), 0);
    assert!(pool.read_particles().is_err());

    pool.init(8);
    assert!(pool.generation() > generation);
    assert_eq!(pool.query_available_count(), 8);
    assert!(pool.read_particles().unwrap().iter().all(|p| !p.is_active()));
}

#[test]
#[ignore] // Requires GPU
fn test_capture_copies_scene() {
    let context = create_test_context();
    let registry = Arc::new(CaptureRegistry::new());
    let mut buffers = SceneCollisionBuffers::new(&context, registry);
    let extent = SurfaceExtent::new(8, 4);
    buffers.activate(extent);
    assert!(buffers.snapshot(extent).is_none());

    let source = SourceTargets::new(&context.device, extent);
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    source.clear(&mut encoder, 0.75, FACING_Z);
    buffers.capture(&mut encoder, &source.source());
    context.queue.submit(std::iter::once(encoder.finish()));

    assert!(buffers.snapshot(extent).is_some());
    let surface = buffers.read_snapshot().unwrap();
    assert_eq!(surface.extent(), extent);
    assert!(surface.depth().iter().all(|&d| d == 0.75));
    for texel in surface.attribute(NORMAL_ATTRIBUTE) {
        assert!((decode_normal(*texel) - Vec3::Z).length() < 0.02);
    }

    // A different extent reallocates and invalidates the old snapshot
    let resized = SurfaceExtent::new(16, 8);
    let source = SourceTargets::new(&context.device, resized);
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    source.clear(&mut encoder, 0.5, FACING_Z);
    buffers.capture(&mut encoder, &source.source());
    context.queue.submit(std::iter::once(encoder.finish()));

    assert_eq!(buffers.extent(), Some(resized));
    assert!(buffers.snapshot(extent).is_none());
    assert!(buffers.snapshot(resized).is_some());
    assert!(buffers.read_snapshot().unwrap().depth().iter().all(|&d| d == 0.5));
}

#[test]
#[ignore] // Requires GPU
fn test_accessors_are_the_captured_views() {
    let context = create_test_context();
    let registry = Arc::new(CaptureRegistry::new());
    let mut buffers = SceneCollisionBuffers::new(&context, registry);
    let extent = SurfaceExtent::new(8, 4);
    buffers.activate(extent);

    let source = SourceTargets::new(&context.device, extent);
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    source.clear(&mut encoder, 0.25, FACING_Z);
    buffers.capture(&mut encoder, &source.source());
    context.queue.submit(std::iter::once(encoder.finish()));

    let snapshot = buffers.snapshot(extent).unwrap();
    assert!(std::ptr::eq(buffers.depth(), snapshot.depth));
    assert!(std::ptr::eq(buffers.attribute(NORMAL_ATTRIBUTE), snapshot.normal));
    for i in 0..ATTRIBUTE_COUNT {
        if i != NORMAL_ATTRIBUTE {
            assert!(!std::ptr::eq(buffers.attribute(i), snapshot.normal));
        }
    }
}

#[test]
#[ignore] // Requires GPU
#[should_panic(expected = "before activation")]
fn test_depth_before_activation_panics() {
    let context = create_test_context();
    let buffers = SceneCollisionBuffers::new(&context, Arc::new(CaptureRegistry::new()));
    let _ = buffers.depth();
}

#[test]
#[ignore] // Requires GPU
#[should_panic(expected = "out of range")]
fn test_attribute_index_out_of_range_panics() {
    let context = create_test_context();
    let mut buffers = SceneCollisionBuffers::new(&context, Arc::new(CaptureRegistry::new()));
    buffers.activate(SurfaceExtent::new(4, 4));
    let _ = buffers.attribute(ATTRIBUTE_COUNT);
}

#[test]
#[ignore] // Requires GPU
#[should_panic(expected = "inactive collision buffers")]
fn test_capture_while_inactive_panics() {
    let context = create_test_context();
    let mut buffers = SceneCollisionBuffers::new(&context, Arc::new(CaptureRegistry::new()));
    let source = SourceTargets::new(&context.device, SurfaceExtent::new(4, 4));
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    buffers.capture(&mut encoder, &source.source());
}

#[test]
#[ignore] // Requires GPU
fn test_empty_capture_keeps_previous_targets() {
    let context = create_test_context();
    let registry = Arc::new(CaptureRegistry::new());
    let mut buffers = SceneCollisionBuffers::new(&context, registry);
    let extent = SurfaceExtent::new(8, 4);
    buffers.activate(extent);

    let source = SourceTargets::new(&context.device, extent);
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    source.clear(&mut encoder, 0.75, FACING_Z);
    buffers.capture(&mut encoder, &source.source());
    context.queue.submit(std::iter::once(encoder.finish()));
    let depth: *const wgpu::TextureView = buffers.depth();

    // Minimized window: nothing to copy, nothing to reallocate
    let minimized = CaptureSource {
        extent: SurfaceExtent::new(0, 0),
        ..source.source()
    };
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    buffers.capture(&mut encoder, &minimized);
    buffers.capture(&mut encoder, &minimized);
    context.queue.submit(std::iter::once(encoder.finish()));

    assert_eq!(buffers.extent(), Some(extent));
    assert!(std::ptr::eq(buffers.depth(), depth));
    assert!(buffers.snapshot(extent).is_some());
    assert!(buffers.read_snapshot().unwrap().depth().iter().all(|&d| d == 0.75));
}

#[test]
#[ignore] // Requires GPU
fn test_collision_against_captured_wall() {
    let context = create_test_context();
    let config = ParticleConfig {
        velocity: [0.0, 4.0, 0.0],
        angular_velocity: [0.0; 3],
        spawn_offset: 0.0,
        damping: 0.5,
        ..still_config(4, 10.0)
    };
    let extent = SurfaceExtent::new(32, 32);
    let view = front_camera(extent);
    let wall_depth = project(&view.view_proj, Vec3::new(0.0, 0.0, 4.0)).unwrap().z;

    let registry = Arc::new(CaptureRegistry::new());
    let mut buffers = SceneCollisionBuffers::new(&context, registry);
    buffers.activate(extent);
    let source = SourceTargets::new(&context.device, extent);
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    source.clear(&mut encoder, wall_depth, FACING_Z);
    buffers.capture(&mut encoder, &source.source());
    context.queue.submit(std::iter::once(encoder.finish()));

    let mut pool = GpuParticlePool::from_config(&context, &config);
    let simulator = GpuParticleSimulator::new(&context, &pool, &config);
    let mut controller = EmissionController::new(config.clone());

    // Normal -Z turns the +Y base velocity into (0, 0, -4)
    let trigger = EmissionTrigger {
        position: Vec3::new(0.0, 0.0, 5.0),
        normal: Vec3::NEG_Z,
        burst: 1,
    };
    assert_eq!(controller.emit(&mut pool, &trigger), 1);

    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Update Encoder"),
        });
    simulator.update(&mut encoder, &pool, 0.5, &view, buffers.snapshot(extent));
    context.queue.submit(std::iter::once(encoder.finish()));

    let particles = pool.read_particles().unwrap();
    let particle = particles.iter().find(|p| p.is_active()).unwrap();
    assert!((particle.position().z - 3.0).abs() < 1e-4);
    // Rgba8Unorm stores 0.5 as 128/255, so the decoded normal is slightly off +Z
    let velocity = particle.velocity();
    assert!((velocity.z - 2.0).abs() < 0.01);
    assert!(velocity.x.abs() < 0.05 && velocity.y.abs() < 0.05);
}

#[test]
#[ignore] // Requires GPU
fn test_collision_skipped_without_matching_capture() {
    let context = create_test_context();
    let config = ParticleConfig {
        velocity: [0.0, 4.0, 0.0],
        angular_velocity: [0.0; 3],
        spawn_offset: 0.0,
        ..still_config(4, 10.0)
    };
    let captured = SurfaceExtent::new(16, 16);
    let view = front_camera(SurfaceExtent::new(32, 32));
    let wall_depth = project(&view.view_proj, Vec3::new(0.0, 0.0, 4.0)).unwrap().z;

    let registry = Arc::new(CaptureRegistry::new());
    let mut buffers = SceneCollisionBuffers::new(&context, registry);
    buffers.activate(captured);
    let source = SourceTargets::new(&context.device, captured);
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Capture Encoder"),
        });
    source.clear(&mut encoder, wall_depth, FACING_Z);
    buffers.capture(&mut encoder, &source.source());
    context.queue.submit(std::iter::once(encoder.finish()));

    let mut pool = GpuParticlePool::from_config(&context, &config);
    let simulator = GpuParticleSimulator::new(&context, &pool, &config);
    let mut controller = EmissionController::new(config.clone());
    let trigger = EmissionTrigger {
        position: Vec3::new(0.0, 0.0, 5.0),
        normal: Vec3::NEG_Z,
        burst: 1,
    };
    controller.emit(&mut pool, &trigger);

    // The simulator only sees captures at the view's own extent
    assert!(buffers.snapshot(view.extent).is_none());
    let mut encoder = context
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Update Encoder"),
        });
    simulator.update(&mut encoder, &pool, 0.5, &view, buffers.snapshot(captured));
    context.queue.submit(std::iter::once(encoder.finish()));

    let particles = pool.read_particles().unwrap();
    let particle = particles.iter().find(|p| p.is_active()).unwrap();
    assert!((particle.velocity() - Vec3::new(0.0, 0.0, -4.0)).length() < 1e-4);
}

#[test]
#[ignore] // Requires GPU
fn test_registry_released_on_drop() {
    let context = create_test_context();
    let registry = Arc::new(CaptureRegistry::new());
    let extent = SurfaceExtent::new(4, 4);

    let mut first = SceneCollisionBuffers::new(&context, Arc::clone(&registry));
    first.activate(extent);
    assert_eq!(registry.active(), Some(first.id()));

    let mut second = SceneCollisionBuffers::new(&context, Arc::clone(&registry));
    let rejected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        second.activate(extent);
    }));
    assert!(rejected.is_err());

    drop(first);
    assert_eq!(registry.active(), None);

    second.activate(extent);
    assert!(second.is_active());
    second.deactivate();
    assert_eq!(registry.active(), None);
}

#[test]
#[ignore] // Requires GPU
fn test_renderer_batches_cover_pool() {
    let context = create_test_context();
    let cube = MeshData::cube(1.0);
    let renderer = PseudoInstancedRenderer::new(
        &context,
        wgpu::TextureFormat::Rgba8Unorm,
        Some(DEPTH_FORMAT),
        &cube,
        8192,
    )
    .unwrap();
    let layout = renderer.layout();
    assert_eq!(layout.particles_per_mesh, 65534 / 24);
    assert_eq!(layout.batch_count, 4);
}

#[test]
#[ignore] // Requires GPU
fn test_system_frame_draws_main_and_mirror_views() {
    let context = create_test_context();
    let extent = SurfaceExtent::new(32, 32);
    let formats = TargetFormats {
        color: wgpu::TextureFormat::Rgba8Unorm,
        depth: Some(DEPTH_FORMAT),
    };
    let registry = Arc::new(CaptureRegistry::new());
    let mut system =
        ParticleSystem::new(&context, still_config(64, 1.0), registry, formats).unwrap();

    let camera = Camera::default();
    let main_view = camera.camera_view(extent);
    let mirror_view = camera.mirrored(Vec3::ZERO, Vec3::X).camera_view(extent);
    let main_binding = system.create_view_binding("Test Main View");
    let mirror_binding = system.create_view_binding("Test Mirror View");
    system.update_view(&main_binding, &main_view, Vec3::NEG_Y);
    system.update_view(&mirror_binding, &mirror_view, Vec3::NEG_Y);

    let source = SourceTargets::new(&context.device, extent);
    let color = context
        .device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Color"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: formats.color,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default());

    system.trigger(EmissionTrigger {
        position: Vec3::ZERO,
        normal: Vec3::Y,
        burst: 10,
    });

    for frame in 0..3 {
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Test Frame Encoder"),
            });
        let emitted = system.begin_frame(&mut encoder, 1.0 / 60.0, &main_view);
        assert_eq!(emitted, if frame == 0 { 10 } else { 0 });

        source.clear(&mut encoder, 1.0, FACING_Z);
        system.capture(&mut encoder, &source.source());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Test Particle Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &source.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            system.draw(&mut pass, &main_binding);
            system.draw(&mut pass, &mirror_binding);
        }
        context.queue.submit(std::iter::once(encoder.finish()));
    }

    assert!(system.collision().is_active());
    assert_eq!(system.pool_mut().query_available_count(), 54);

    system.shutdown();
    assert!(!system.collision().is_active());
    assert!(!system.pool().is_initialized());
}
