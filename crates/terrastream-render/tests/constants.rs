use std::sync::Arc;

use approx::assert_relative_eq;
use glam::{Mat4, Vec3, Vec4};
use terrastream_gpu::{DescriptorHeapKind, GpuError};
use terrastream_render::{ConstantBufferManager, FrameConstants, SharedConstantBuffers};
use terrastream_test::{init_test_logging, FakeRenderer};

fn stored(renderer: &FakeRenderer) -> FrameConstants {
    let buffers = renderer.allocator.created_count();
    let bytes = renderer
        .allocator
        .contents(terrastream_gpu::BufferId(buffers as u64))
        .expect("constant buffer alive");
    bytemuck::pod_read_unaligned(&bytes)
}

#[test]
fn creates_single_slot_constant_heap_with_view() {
    init_test_logging();
    let renderer = Arc::new(FakeRenderer::new());
    let constants = SharedConstantBuffers::new(renderer.clone(), &FrameConstants::default()).unwrap();

    let heap = constants.heap();
    assert_eq!(heap.desc.kind, DescriptorHeapKind::Constant);
    assert_eq!(heap.capacity(), 1);
    assert_eq!(renderer.device.cbv_write_count(), 1);
    assert_eq!(stored(&renderer), FrameConstants::default());
}

#[test]
fn update_rewrites_buffer_contents() {
    init_test_logging();
    let renderer = Arc::new(FakeRenderer::new());
    let constants = SharedConstantBuffers::new(renderer.clone(), &FrameConstants::default()).unwrap();

    let view_projection = Mat4::perspective_rh(1.0, 16.0 / 9.0, 0.1, 100.0)
        * Mat4::look_at_rh(Vec3::new(0.0, 5.0, 5.0), Vec3::ZERO, Vec3::Y);
    let frame = FrameConstants::new(view_projection, Vec4::new(2.0, 1.0, 0.5, 0.0));
    constants.update(&frame).unwrap();

    let read = stored(&renderer);
    for (got, want) in read
        .view_projection()
        .to_cols_array()
        .iter()
        .zip(view_projection.to_cols_array())
    {
        assert_relative_eq!(*got, want);
    }
    assert_relative_eq!(read.tile_offset[2], 0.5);
}

#[test]
fn heap_failure_frees_the_buffer() {
    init_test_logging();
    let renderer = Arc::new(FakeRenderer::new());
    renderer
        .device
        .fail_heap(Some(DescriptorHeapKind::Constant));

    assert!(SharedConstantBuffers::new(renderer.clone(), &FrameConstants::default()).is_err());
    assert_eq!(renderer.allocator.live_buffer_count(), 0);
    assert_eq!(renderer.device.live_heap_count(), 0);
}

#[test]
fn drop_waits_then_releases() {
    init_test_logging();
    let renderer = Arc::new(FakeRenderer::new());
    let constants = SharedConstantBuffers::new(renderer.clone(), &FrameConstants::default()).unwrap();

    drop(constants);

    assert_eq!(renderer.wait_count(), 1);
    assert_eq!(renderer.allocator.live_buffer_count(), 0);
    assert_eq!(renderer.device.live_heap_count(), 0);
}

#[test]
fn failed_free_keeps_the_creation_error() {
    init_test_logging();
    let renderer = Arc::new(FakeRenderer::new());
    renderer.device.fail_heap(Some(DescriptorHeapKind::Constant));
    renderer.allocator.fail_free(true);

    let result = SharedConstantBuffers::new(renderer.clone(), &FrameConstants::default());

    assert!(matches!(result, Err(GpuError::HeapCreation(_))));
    assert_eq!(renderer.allocator.live_buffer_count(), 1);
}

#[test]
fn failed_free_on_drop_still_destroys_the_heap() {
    init_test_logging();
    let renderer = Arc::new(FakeRenderer::new());
    let constants = SharedConstantBuffers::new(renderer.clone(), &FrameConstants::default()).unwrap();
    renderer.allocator.fail_free(true);

    drop(constants);

    assert_eq!(renderer.device.live_heap_count(), 0);
    assert_eq!(renderer.allocator.live_buffer_count(), 1);
}
