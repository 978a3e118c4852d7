//! A tile driven by the real texture streamer.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use terrastream_core::PixelFormat;
use terrastream_gpu::GpuDevice;
use terrastream_render::{RenderMode, TerrainTile, TileConfig, TileServices};
use terrastream_streaming::{
    HostTextureUploader, MemorySource, ResourceState, StreamingConfig, StreamingService,
    TextureStreamer,
};
use terrastream_test::{init_test_logging, FakeRenderer, StubConstantBuffers, StubShaderPass};

const TILE_TEXTURE: &str = "sample_terrain/LOD1/image_x0_y1.bmp";

fn encode_bmp(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 160, 60, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Bmp)
        .unwrap();
    bytes
}

struct Scene {
    renderer: Arc<FakeRenderer>,
    source: Arc<MemorySource>,
    uploader: Arc<HostTextureUploader>,
    streamer: Arc<TextureStreamer>,
    tile: TerrainTile,
}

impl Scene {
    fn new(config: StreamingConfig) -> Self {
        let renderer = Arc::new(FakeRenderer::new());
        let source = Arc::new(MemorySource::new());
        let uploader = Arc::new(HostTextureUploader::new());
        let streamer =
            Arc::new(TextureStreamer::new(config, source.clone(), uploader.clone()).unwrap());

        let services = TileServices {
            renderer: renderer.clone(),
            streaming: streamer.clone(),
            constants: Arc::new(StubConstantBuffers::new()),
            shader_pass: Arc::new(StubShaderPass::default()),
        };
        let tile = TerrainTile::allocate_resources(TileConfig::default(), services).unwrap();

        Self {
            renderer,
            source,
            uploader,
            streamer,
            tile,
        }
    }

    /// Run frames until the tile is textured or `budget` elapses.
    fn run_until_textured(&mut self, budget: Duration) -> RenderMode {
        let deadline = Instant::now() + budget;
        loop {
            self.streamer.advance_frame();
            let mode = self.tile.update();
            if mode.is_textured() || Instant::now() > deadline {
                return mode;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Run frames in which the tile draws.
    fn run_frames(&mut self, count: usize) {
        for _ in 0..count {
            self.streamer.advance_frame();
            self.tile.update();
        }
    }

    /// Query `name` without advancing frames until it is no longer loading.
    fn stream(&self, name: &str) -> ResourceState {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let state = self.streamer.query(name);
            if state != ResourceState::Loading || Instant::now() > deadline {
                return state;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Forward streamer evictions to the tile.
    fn deliver_evictions(&mut self) -> usize {
        self.streamer
            .evictions()
            .try_iter()
            .filter(|name| self.tile.on_resource_evicted(name))
            .count()
    }
}

#[test]
fn tile_becomes_textured_once_streamed() {
    init_test_logging();
    let mut scene = Scene::new(StreamingConfig::default());
    scene.source.insert(TILE_TEXTURE, encode_bmp(8, 8));

    assert_eq!(scene.tile.update(), RenderMode::Untextured);
    assert_eq!(
        scene.run_until_textured(Duration::from_secs(10)),
        RenderMode::Textured
    );

    let view = scene
        .renderer
        .device
        .read_shader_resource_view(scene.tile.texture_heap(), 0)
        .unwrap();
    assert_eq!(view.format, PixelFormat::Rgba8UnormSrgb);
    assert_eq!(scene.uploader.resident_count(), 1);
}

#[test]
fn linear_streaming_binds_unorm_view() {
    init_test_logging();
    let mut scene = Scene::new(StreamingConfig::default().with_srgb(false));
    scene.source.insert(TILE_TEXTURE, encode_bmp(4, 4));

    assert!(scene.run_until_textured(Duration::from_secs(10)).is_textured());

    let view = scene
        .renderer
        .device
        .read_shader_resource_view(scene.tile.texture_heap(), 0)
        .unwrap();
    assert_eq!(view.format, PixelFormat::Rgba8Unorm);
}

#[test]
fn missing_texture_leaves_tile_untextured() {
    init_test_logging();
    let mut scene = Scene::new(StreamingConfig::default().with_max_retries(0));

    assert!(!scene
        .run_until_textured(Duration::from_millis(200))
        .is_textured());
    assert_eq!(scene.streamer.get(TILE_TEXTURE), None);
    assert_eq!(scene.uploader.resident_count(), 0);
}

#[test]
fn evicted_texture_is_streamed_and_bound_again() {
    init_test_logging();
    let mut scene = Scene::new(StreamingConfig::default().with_frames_in_flight(2));
    scene.source.insert(TILE_TEXTURE, encode_bmp(8, 8));
    assert!(scene.run_until_textured(Duration::from_secs(10)).is_textured());

    assert!(scene.streamer.evict(TILE_TEXTURE));
    assert_eq!(scene.deliver_evictions(), 1);
    assert_eq!(scene.tile.mode(), RenderMode::Untextured);

    let waits_before = scene.renderer.wait_count();
    assert!(scene.run_until_textured(Duration::from_secs(10)).is_textured());
    assert_eq!(scene.renderer.wait_count(), waits_before + 1);
    assert_eq!(scene.renderer.device.srv_write_count(), 2);

    for _ in 0..3 {
        scene.streamer.advance_frame();
    }
    assert_eq!(scene.streamer.pending_release_count(), 0);
    assert_eq!(scene.uploader.resident_count(), 1);
}

#[test]
fn drawn_texture_survives_eviction_of_idle_ones() {
    init_test_logging();
    let mut scene = Scene::new(StreamingConfig::default().with_max_resident(2));
    scene.source.insert(TILE_TEXTURE, encode_bmp(8, 8));
    scene.source.insert("other.bmp", encode_bmp(4, 4));
    scene.source.insert("third.bmp", encode_bmp(4, 4));
    let evictions = scene.streamer.evictions();

    assert!(scene.run_until_textured(Duration::from_secs(10)).is_textured());
    scene.run_frames(5);

    // Queried once, then never touched again.
    assert_eq!(scene.stream("other.bmp"), ResourceState::Available);
    scene.run_frames(20);

    assert_eq!(scene.stream("third.bmp"), ResourceState::Available);
    scene.streamer.advance_frame();

    assert_eq!(evictions.try_recv().unwrap(), "other.bmp");
    assert!(evictions.try_recv().is_err());
    assert!(scene.tile.is_textured());
    assert!(scene.streamer.get(TILE_TEXTURE).is_some());
}
