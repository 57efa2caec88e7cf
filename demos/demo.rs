//! Headless demo: builds the deferred pipeline, drives a handful of frames
//! over the headless device and logs the per-frame statistics.
//!
//! Run with `RUST_LOG=info cargo run --example demo`.

use glam::{Mat4, Vec3};
use prism_engine::backend::types::{BufferDescriptor, BufferUsage};
use prism_engine::backend::HeadlessDevice;
use prism_engine::jobs::WorkerPool;
use prism_engine::pipeline::{build_deferred_pipeline, DeferredConfig};
use prism_engine::render_graph::{BoundingSphere, DebugLine, MaterialParams, StaticSubmission};
use prism_engine::renderer::Renderer;
use prism_engine::scene::{Camera, DirectionalLight, PointLight};
use prism_engine::{RenderDevice, RendererConfig};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAMES: u32 = 10;

fn main() {
    env_logger::init();

    let mut device = HeadlessDevice::new();
    let mut renderer = Renderer::new(&RendererConfig::default());
    let handles = build_deferred_pipeline(&mut renderer, &DeferredConfig::default());
    log::info!(
        "deferred pipeline built (geometry={:?}, overlay={:?})",
        handles.geometry,
        handles.debug_overlay
    );

    let front_buffer = device
        .create_front_buffer()
        .expect("front buffer creation cannot fail headless");

    if let Err(err) = renderer.init(&mut device, WIDTH, HEIGHT) {
        log::error!("renderer bring-up failed: {err}");
        std::process::exit(1);
    }

    // Something for the background pool to chew on while frames render.
    let pool = WorkerPool::new(2);
    for index in 0..4 {
        pool.push(move || log::debug!("background job {index} done"));
    }

    let cube = upload_cube(&mut device);
    let mut camera = Camera::new(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO);

    for frame in 0..FRAMES {
        let angle = frame as f32 * 0.1;
        camera.position = Vec3::new(8.0 * angle.sin(), 3.0, 8.0 * angle.cos());

        renderer.begin(&mut device, WIDTH, HEIGHT, &camera);

        for x in -2..=2 {
            renderer.submit_static(StaticSubmission {
                transform: Mat4::from_translation(Vec3::new(x as f32 * 2.5, 0.0, 0.0)),
                bounds: BoundingSphere {
                    center: Vec3::new(x as f32 * 2.5, 0.0, 0.0),
                    radius: 0.9,
                },
                ..cube.clone()
            });
        }
        renderer.submit_directional_light(DirectionalLight {
            cast_shadows: true,
            ..Default::default()
        });
        renderer.submit_point_light(PointLight {
            position: Vec3::new(0.0, 4.0, 0.0),
            intensity: 3.0,
            ..Default::default()
        });
        for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
            renderer.submit_debug_line(DebugLine {
                start: Vec3::ZERO,
                end: axis * 2.0,
                color: axis,
            });
        }

        renderer.render(&mut device);
        renderer.end(&mut device, front_buffer);

        let stats = renderer.stats();
        log::info!(
            "frame {frame}: {} draw calls, {} triangles, {} culled",
            stats.draw_calls,
            stats.triangles,
            stats.culled_instances
        );
    }

    renderer.shutdown(&mut device);
    log::info!(
        "shutdown complete ({} textures, {} buffers still owned by the app)",
        device.live_textures(),
        device.live_buffers()
    );
}

fn upload_cube(device: &mut HeadlessDevice) -> StaticSubmission {
    let vertex_buffer = device
        .create_buffer(&BufferDescriptor {
            label: Some("cube_vertices".into()),
            size: 24 * 48,
            usage: BufferUsage::VERTEX,
        })
        .expect("headless buffer creation cannot fail");
    let index_buffer = device
        .create_buffer(&BufferDescriptor {
            label: Some("cube_indices".into()),
            size: 36 * 4,
            usage: BufferUsage::INDEX,
        })
        .expect("headless buffer creation cannot fail");

    StaticSubmission {
        vertex_buffer,
        index_buffer,
        index_count: 36,
        transform: Mat4::IDENTITY,
        bounds: BoundingSphere {
            center: Vec3::ZERO,
            radius: 0.9,
        },
        material: MaterialParams::default(),
        entity_id: 0,
    }
}
