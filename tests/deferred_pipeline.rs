//! End-to-end tests driving the deferred pipeline over the headless device.

use glam::{Mat4, Vec3};
use prism_engine::backend::types::{BufferDescriptor, BufferUsage};
use prism_engine::backend::HeadlessDevice;
use prism_engine::pipeline::{
    build_deferred_pipeline, DeferredConfig, GeometryPass, LightingPass,
};
use prism_engine::render_graph::{BoundingSphere, DebugLine, MaterialParams, StaticSubmission};
use prism_engine::renderer::Renderer;
use prism_engine::scene::{Camera, DirectionalLight, PointLight};
use prism_engine::{RenderDevice, RenderPass, RendererConfig};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn make_renderer() -> Renderer {
    let mut renderer = Renderer::new(&RendererConfig::default());
    build_deferred_pipeline(&mut renderer, &DeferredConfig::default());
    renderer
}

fn cube_submission(device: &mut HeadlessDevice, center: Vec3) -> StaticSubmission {
    let vertex_buffer = device
        .create_buffer(&BufferDescriptor {
            label: Some("cube_vertices".into()),
            size: 24 * 48,
            usage: BufferUsage::VERTEX,
        })
        .unwrap();
    let index_buffer = device
        .create_buffer(&BufferDescriptor {
            label: Some("cube_indices".into()),
            size: 36 * 4,
            usage: BufferUsage::INDEX,
        })
        .unwrap();
    StaticSubmission {
        vertex_buffer,
        index_buffer,
        index_count: 36,
        transform: Mat4::from_translation(center),
        bounds: BoundingSphere {
            center,
            radius: 1.0,
        },
        material: MaterialParams::default(),
        entity_id: 1,
    }
}

fn camera() -> Camera {
    Camera::new(Vec3::new(0.0, 2.0, 10.0), Vec3::ZERO)
}

#[test]
fn full_frame_lifecycle() {
    init_logging();
    let mut device = HeadlessDevice::new();
    let mut renderer = make_renderer();
    let front = device.create_front_buffer().unwrap();

    renderer.init(&mut device, 1280, 720).unwrap();

    let cube = cube_submission(&mut device, Vec3::ZERO);
    for _ in 0..3 {
        renderer.begin(&mut device, 1280, 720, &camera());
        renderer.submit_static(cube.clone());
        renderer.submit_directional_light(DirectionalLight::default());
        renderer.submit_point_light(PointLight {
            position: Vec3::new(2.0, 1.0, 0.0),
            ..Default::default()
        });
        renderer.submit_debug_line(DebugLine {
            start: Vec3::ZERO,
            end: Vec3::Y,
            color: Vec3::X,
        });
        renderer.render(&mut device);
        renderer.end(&mut device, front);

        let stats = renderer.stats();
        // Geometry draw + lighting fullscreen + 2 bloom stages + tonemap
        // composite + overlay.
        assert_eq!(stats.draw_calls, 6);
        assert_eq!(stats.triangles, 12);
        assert_eq!(stats.directional_lights, 1);
        assert_eq!(stats.point_lights, 1);
        assert_eq!(stats.culled_instances, 0);
    }

    renderer.shutdown(&mut device);

    // Only the front buffer and the caller's mesh buffers survive shutdown.
    assert_eq!(device.live_textures(), 1);
    assert_eq!(device.live_framebuffers(), 1);
    assert_eq!(device.live_buffers(), 2);
    assert_eq!(device.live_shader_programs(), 0);
}

#[test]
fn culled_scene_still_composites() {
    init_logging();
    let mut device = HeadlessDevice::new();
    let mut renderer = make_renderer();
    let front = device.create_front_buffer().unwrap();
    renderer.init(&mut device, 640, 480).unwrap();

    // Everything submitted sits far behind the camera.
    let hidden = cube_submission(&mut device, Vec3::new(0.0, 0.0, 500.0));
    renderer.begin(&mut device, 640, 480, &camera());
    renderer.submit_static(hidden);
    renderer.render(&mut device);
    renderer.end(&mut device, front);

    let stats = renderer.stats();
    assert_eq!(stats.culled_instances, 1);
    assert_eq!(stats.triangles, 0);
    // The screen passes still ran: lighting + bloom x2 + tonemap.
    assert_eq!(stats.draw_calls, 4);

    renderer.shutdown(&mut device);
}

#[test]
fn empty_frames_are_noops_not_errors() {
    init_logging();
    let mut device = HeadlessDevice::new();
    let mut renderer = make_renderer();
    let front = device.create_front_buffer().unwrap();
    renderer.init(&mut device, 640, 480).unwrap();

    for _ in 0..5 {
        renderer.begin(&mut device, 640, 480, &camera());
        renderer.render(&mut device);
        renderer.end(&mut device, front);
    }

    assert_eq!(renderer.stats().triangles, 0);
    renderer.shutdown(&mut device);
}

#[test]
fn resize_between_frames_rebuilds_targets() {
    init_logging();
    let mut device = HeadlessDevice::new();
    let mut renderer = make_renderer();
    let front = device.create_front_buffer().unwrap();
    renderer.init(&mut device, 640, 480).unwrap();

    renderer.begin(&mut device, 640, 480, &camera());
    renderer.render(&mut device);
    renderer.end(&mut device, front);
    let textures_small = device.live_textures();

    // Larger output; targets are rebuilt, not leaked.
    renderer.begin(&mut device, 1920, 1080, &camera());
    renderer.render(&mut device);
    renderer.end(&mut device, front);
    assert_eq!(device.live_textures(), textures_small);

    renderer.shutdown(&mut device);
}

#[test]
fn typed_lookup_and_renderer_data_roundtrip() {
    init_logging();
    let mut device = HeadlessDevice::new();
    let mut renderer = Renderer::new(&RendererConfig::default());

    assert!(renderer.pass::<GeometryPass>().is_none());
    let handles = build_deferred_pipeline(&mut renderer, &DeferredConfig::default());
    assert_eq!(renderer.pass_handle::<GeometryPass>(), Some(handles.geometry));
    assert_eq!(renderer.pass_handle::<LightingPass>(), Some(handles.lighting));

    renderer.init(&mut device, 320, 240).unwrap();

    let geometry = renderer.pass_mut::<GeometryPass>().unwrap();
    let data_handle = geometry.request_renderer_data();
    assert!(data_handle.is_valid());
    geometry.delete_renderer_data(data_handle);
    // Double delete stays harmless.
    geometry.delete_renderer_data(data_handle);

    renderer.shutdown(&mut device);
}

#[test]
fn two_renderer_instances_are_independent() {
    init_logging();
    let mut device = HeadlessDevice::new();

    let mut main_renderer = make_renderer();
    let mut overlay_renderer = Renderer::new(&RendererConfig { max_lights: 4 });
    build_deferred_pipeline(
        &mut overlay_renderer,
        &DeferredConfig {
            enable_bloom: false,
            enable_debug_overlay: false,
            ..Default::default()
        },
    );

    let front = device.create_front_buffer().unwrap();
    main_renderer.init(&mut device, 640, 480).unwrap();
    overlay_renderer.init(&mut device, 640, 480).unwrap();

    main_renderer.begin(&mut device, 640, 480, &camera());
    main_renderer.submit_point_light(PointLight::default());
    main_renderer.render(&mut device);
    main_renderer.end(&mut device, front);

    overlay_renderer.begin(&mut device, 640, 480, &camera());
    overlay_renderer.render(&mut device);
    overlay_renderer.end(&mut device, front);

    // The overlay renderer never saw the main renderer's lights.
    assert_eq!(overlay_renderer.stats().point_lights, 0);
    assert_eq!(main_renderer.stats().point_lights, 1);

    main_renderer.shutdown(&mut device);
    overlay_renderer.shutdown(&mut device);
    assert_eq!(device.live_shader_programs(), 0);
}
