//! Terrain tile behavior against in-memory fakes.

use terrastream_core::{PixelFormat, TILE_VERTICES};
use terrastream_gpu::{
    Command, DescriptorHeapKind, GpuDevice, RecordingCommandList, ShaderResourceViewDesc,
};
use terrastream_render::{InitStage, RenderMode, TerrainTile, TileConfig};
use terrastream_streaming::ResourceState::{Available, Loading, Unavailable};
use terrastream_test::{
    init_test_logging, sample_handle, ScriptedStreamingService, StubConstantBuffers, TestServices,
};

fn textured_services() -> TestServices {
    TestServices::new(ScriptedStreamingService::available(sample_handle(
        PixelFormat::Rgba8UnormSrgb,
    )))
}

fn allocate(services: &TestServices) -> TerrainTile {
    TerrainTile::allocate_resources(TileConfig::default(), services.tile_services())
        .expect("tile allocation")
}

fn record(tile: &TerrainTile) -> RecordingCommandList {
    let mut list = RecordingCommandList::new();
    tile.render(&mut list);
    list
}

#[test]
fn flag_follows_streaming_state_sequence() {
    init_test_logging();
    let services = TestServices::new(ScriptedStreamingService::new(
        [Unavailable, Unavailable, Loading, Available],
        Some(sample_handle(PixelFormat::Rgba8Unorm)),
    ));
    let mut tile = allocate(&services);

    let flags: Vec<bool> = (0..4).map(|_| tile.update().is_textured()).collect();

    assert_eq!(flags, [false, false, false, true]);
    assert_eq!(services.renderer.device.srv_write_count(), 1);
}

#[test]
fn update_stops_polling_once_textured() {
    init_test_logging();
    let services = textured_services();
    let mut tile = allocate(&services);

    for _ in 0..10 {
        assert_eq!(tile.update(), RenderMode::Textured);
    }

    assert_eq!(services.streaming.query_count(), 1);
    assert_eq!(services.streaming.use_count(), 9);
    assert_eq!(services.renderer.device.srv_write_count(), 1);
}

#[test]
fn update_queries_the_configured_resource() {
    init_test_logging();
    let services = TestServices::new(ScriptedStreamingService::new([Loading], None));
    let mut tile = allocate(&services);

    tile.update();

    assert_eq!(tile.resource_name(), "sample_terrain/LOD1/image_x0_y1.bmp");
    assert_eq!(
        services.streaming.queried_names(),
        ["sample_terrain/LOD1/image_x0_y1.bmp"]
    );
}

#[test]
fn textureless_render_binds_only_constants() {
    init_test_logging();
    let services = TestServices::new(ScriptedStreamingService::new([Unavailable], None));
    let mut tile = allocate(&services);
    tile.update();

    let list = record(&tile);

    assert_eq!(list.bound_root_slots(), [0]);
    assert_eq!(list.commands().len(), 6);
    assert_eq!(
        list.commands()[1],
        Command::SetDescriptorHeaps(vec![StubConstantBuffers::HEAP_ID])
    );
}

#[test]
fn textured_render_binds_texture_then_constants() {
    init_test_logging();
    let services = textured_services();
    let mut tile = allocate(&services);
    tile.update();

    let list = record(&tile);

    assert_eq!(list.bound_root_slots(), [1, 0]);
    insta::assert_snapshot!(list.to_text(), @r"
    set_pipeline root_signature=160 pipeline=176
    set_descriptor_heaps [1]
    set_root_table slot=1 table=53249
    set_descriptor_heaps [192]
    set_root_table slot=0 table=49152
    set_topology TriangleList
    set_vertex_buffers start=0 [buffer=1 stride=28 size=84]
    draw vertices=3 instances=1 first_vertex=0 first_instance=0
    ");
}

#[test]
fn repeated_renders_are_identical() {
    init_test_logging();
    for textured in [false, true] {
        let services = textured_services();
        let mut tile = allocate(&services);
        if textured {
            tile.update();
        }

        let first = record(&tile);
        for _ in 0..1000 {
            assert_eq!(record(&tile), first);
        }
    }
}

#[test]
fn view_format_matches_every_resource_format() {
    init_test_logging();
    for format in PixelFormat::ALL {
        let services = TestServices::new(ScriptedStreamingService::available(sample_handle(format)));
        let mut tile = allocate(&services);
        tile.update();

        let view = services
            .renderer
            .device
            .read_shader_resource_view(tile.texture_heap(), 0)
            .expect("texture slot written");
        assert_eq!(view, ShaderResourceViewDesc::texture_2d(format));
        assert_eq!(view.format, format);
        assert_eq!(view.mip_levels(), 1);
    }
}

#[test]
fn vertex_buffer_holds_the_tile_triangle() {
    init_test_logging();
    let services = textured_services();
    let mut tile = allocate(&services);
    let before = *tile.vertex_buffer_view();

    assert_eq!(before.size_in_bytes, 3 * 28);
    assert_eq!(before.stride, 28);
    assert_eq!(before.vertex_count(), 3);

    let contents = services
        .renderer
        .allocator
        .contents(before.buffer)
        .expect("vertex buffer alive");
    assert_eq!(contents.as_slice(), bytemuck::cast_slice::<_, u8>(&TILE_VERTICES));

    tile.update();
    assert_eq!(*tile.vertex_buffer_view(), before);
}

#[test]
fn heaps_are_single_slot_and_shader_visible() {
    init_test_logging();
    let services = textured_services();
    let tile = allocate(&services);

    assert_eq!(tile.texture_heap().desc.kind, DescriptorHeapKind::ShaderResource);
    assert_eq!(tile.constants_heap().desc.kind, DescriptorHeapKind::Constant);
    for heap in [tile.texture_heap(), tile.constants_heap()] {
        assert_eq!(heap.capacity(), 1);
        assert!(heap.desc.shader_visible);
    }
    assert_eq!(services.renderer.device.live_heap_count(), 2);
    assert_eq!(services.renderer.wait_count(), 1);
}

fn assert_nothing_alive(services: &TestServices) {
    assert_eq!(services.renderer.device.live_heap_count(), 0);
    assert_eq!(services.renderer.allocator.live_buffer_count(), 0);
}

fn expect_stage(services: &TestServices) -> InitStage {
    match TerrainTile::allocate_resources(TileConfig::default(), services.tile_services()) {
        Ok(_) => panic!("allocation should fail"),
        Err(err) => err.stage(),
    }
}

#[test]
fn allocator_failure_is_fatal_and_leaves_nothing_alive() {
    init_test_logging();
    let services = textured_services();
    services.renderer.allocator.fail_create(true);

    assert_eq!(expect_stage(&services), InitStage::GeometryUpload);
    assert_nothing_alive(&services);
    assert_eq!(services.streaming.query_count(), 0);
}

#[test]
fn vertex_write_failure_frees_the_buffer() {
    init_test_logging();
    let services = textured_services();
    services.renderer.allocator.fail_write(true);

    assert_eq!(expect_stage(&services), InitStage::GeometryUpload);
    assert_eq!(services.renderer.allocator.created_count(), 1);
    assert_nothing_alive(&services);
}

#[test]
fn shader_pass_failure_aborts_before_any_allocation() {
    init_test_logging();
    let services = textured_services();
    services.shader_pass.fail_create(true);

    assert_eq!(expect_stage(&services), InitStage::ShaderPass);
    assert_eq!(services.renderer.allocator.created_count(), 0);
    assert_nothing_alive(&services);
}

#[test]
fn frame_wait_failure_frees_the_buffer() {
    init_test_logging();
    let services = textured_services();
    services.renderer.fail_wait(true);

    assert_eq!(expect_stage(&services), InitStage::FrameSync);
    assert_nothing_alive(&services);
}

#[test]
fn heap_failures_release_earlier_resources() {
    init_test_logging();
    for (kind, stage) in [
        (DescriptorHeapKind::ShaderResource, InitStage::TextureHeap),
        (DescriptorHeapKind::Constant, InitStage::ConstantsHeap),
    ] {
        let services = textured_services();
        services.renderer.device.fail_heap(Some(kind));

        assert_eq!(expect_stage(&services), stage);
        assert_nothing_alive(&services);
    }
}

#[test]
fn failed_view_write_is_retried_next_update() {
    init_test_logging();
    let services = textured_services();
    services.renderer.device.fail_next_views(1);
    let mut tile = allocate(&services);

    assert_eq!(tile.update(), RenderMode::Untextured);
    assert_eq!(record(&tile).bound_root_slots(), [0]);

    assert_eq!(tile.update(), RenderMode::Textured);
    assert_eq!(services.streaming.query_count(), 2);
    assert_eq!(services.renderer.device.srv_write_count(), 1);
}

#[test]
fn missing_handle_keeps_tile_untextured() {
    init_test_logging();
    let services = TestServices::new(ScriptedStreamingService::new([Available], None));
    let mut tile = allocate(&services);

    assert_eq!(tile.update(), RenderMode::Untextured);

    services
        .streaming
        .set_handle(Some(sample_handle(PixelFormat::Bgra8Unorm)));
    assert_eq!(tile.update(), RenderMode::Textured);
}

#[test]
fn eviction_untextures_and_rebinds_after_frame_wait() {
    init_test_logging();
    let services = textured_services();
    let mut tile = allocate(&services);
    tile.update();
    let waits_after_bind = services.renderer.wait_count();

    assert!(!tile.on_resource_evicted("sample_terrain/LOD0/image_x0_y1.bmp"));
    assert!(tile.is_textured());

    assert!(tile.on_resource_evicted("sample_terrain/LOD1/image_x0_y1.bmp"));
    assert_eq!(tile.mode(), RenderMode::Untextured);
    assert_eq!(record(&tile).bound_root_slots(), [0]);
    assert!(!tile.on_resource_evicted("sample_terrain/LOD1/image_x0_y1.bmp"));

    services.streaming.push([Loading, Available]);
    assert_eq!(tile.update(), RenderMode::Untextured);
    assert_eq!(tile.update(), RenderMode::Textured);

    assert_eq!(services.renderer.wait_count(), waits_after_bind + 1);
    assert_eq!(services.renderer.device.srv_write_count(), 2);
}

#[test]
fn drop_releases_heaps_and_vertex_buffer() {
    init_test_logging();
    let services = textured_services();
    let mut tile = allocate(&services);
    tile.update();
    assert_eq!(services.renderer.device.live_heap_count(), 2);

    drop(tile);

    assert_nothing_alive(&services);
}
