//! Texture streaming on a background worker thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use terrastream_gpu::DeferredReleaseQueue;

use crate::config::StreamingConfig;
use crate::error::{Result, StreamingError};
use crate::source::{decode, TextureSource};
use crate::state::{ResourceHandle, ResourceState, StreamingService};
use crate::upload::TextureUploader;

/// Work request sent to the background worker thread.
#[derive(Debug)]
enum WorkRequest {
    /// Load the named textures.
    Load(Vec<String>),
    /// Signal worker thread to shut down.
    Shutdown,
}

impl WorkRequest {
    fn into_names(self) -> Vec<String> {
        match self {
            Self::Load(names) => names,
            Self::Shutdown => Vec::new(),
        }
    }
}

/// Result returned by the worker thread for one name.
#[derive(Debug)]
struct LoadResult {
    name: String,
    outcome: Result<ResourceHandle>,
}

/// Read, decode and upload one texture.
fn load_texture(
    source: &dyn TextureSource,
    uploader: &dyn TextureUploader,
    name: &str,
    srgb: bool,
) -> Result<ResourceHandle> {
    let bytes = source.read(name)?;
    let texture = decode(name, &bytes, srgb)?;
    uploader
        .upload(name, &texture)
        .map_err(|source| StreamingError::Upload {
            name: name.to_string(),
            source,
        })
}

/// Handle to the background texture worker thread.
struct WorkerHandle {
    request_tx: Sender<WorkRequest>,
    result_rx: Receiver<LoadResult>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn spawn(
        source: Arc<dyn TextureSource>,
        uploader: Arc<dyn TextureUploader>,
        srgb: bool,
    ) -> Result<Self> {
        let (request_tx, request_rx) = channel::bounded::<WorkRequest>(16);
        // Unbounded so the worker never blocks on a render thread that stopped polling.
        let (result_tx, result_rx) = channel::unbounded::<LoadResult>();

        let thread = thread::Builder::new()
            .name("texture-streamer".to_string())
            .spawn(move || {
                Self::worker_loop(&*source, &*uploader, srgb, &request_rx, &result_tx);
            })
            .map_err(StreamingError::WorkerSpawn)?;

        Ok(Self {
            request_tx,
            result_rx,
            thread: Some(thread),
        })
    }

    fn worker_loop(
        source: &dyn TextureSource,
        uploader: &dyn TextureUploader,
        srgb: bool,
        request_rx: &Receiver<WorkRequest>,
        result_tx: &Sender<LoadResult>,
    ) {
        loop {
            match request_rx.recv() {
                Ok(WorkRequest::Load(names)) => {
                    let results: Vec<LoadResult> = names
                        .into_par_iter()
                        .map(|name| {
                            let outcome = load_texture(source, uploader, &name, srgb);
                            LoadResult { name, outcome }
                        })
                        .collect();

                    for result in results {
                        if result_tx.send(result).is_err() {
                            return;
                        }
                    }
                }
                Ok(WorkRequest::Shutdown) | Err(_) => return,
            }
        }
    }

    /// Send a batch of names to load (non-blocking).
    ///
    /// On failure the names are handed back: `Full` when the queue is
    /// busy, `Disconnected` when the worker thread has exited.
    fn send_work(
        &self,
        names: Vec<String>,
    ) -> std::result::Result<(), TrySendError<Vec<String>>> {
        self.request_tx
            .try_send(WorkRequest::Load(names))
            .map_err(|e| match e {
                TrySendError::Full(request) => TrySendError::Full(request.into_names()),
                TrySendError::Disconnected(request) => {
                    TrySendError::Disconnected(request.into_names())
                }
            })
    }

    fn try_recv(&self) -> std::result::Result<LoadResult, TryRecvError> {
        self.result_rx.try_recv()
    }

    fn shutdown(&mut self) {
        let _ = self.request_tx.send(WorkRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Texture streaming worker panicked");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Waiting for a free worker slot.
    Pending,
    /// Handed to the worker.
    InFlight,
    Resident(ResourceHandle),
    Failed,
}

#[derive(Debug)]
struct Entry {
    state: EntryState,
    failures: u32,
    last_access_frame: u64,
}

#[derive(Debug, Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    /// Names in `Pending` state, oldest first.
    pending: VecDeque<String>,
    in_flight: usize,
}

impl Registry {
    fn request(&mut self, name: &str, frame: u64) {
        let entry = self.entries.entry_ref(name).or_insert(Entry {
            state: EntryState::Pending,
            failures: 0,
            last_access_frame: frame,
        });
        entry.state = EntryState::Pending;
        self.pending.push_back(name.to_string());
    }

    fn resident_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e.state, EntryState::Resident(_)))
            .count()
    }
}

/// Streams textures by name on a background worker.
///
/// The first query of an unknown name reports `Unavailable` and requests
/// it; later queries report `Loading` until the worker has decoded and
/// uploaded it, then `Available`. Failed loads are retried up to
/// `max_retries` times. Evicted textures are released
/// `frames_in_flight` frames later and announced on [`Self::evictions`].
pub struct TextureStreamer {
    config: StreamingConfig,
    uploader: Arc<dyn TextureUploader>,
    registry: RwLock<Registry>,
    deferred: Mutex<DeferredReleaseQueue<ResourceHandle>>,
    frame: AtomicU64,
    eviction_tx: Sender<String>,
    eviction_rx: Receiver<String>,
    worker: WorkerHandle,
}

impl TextureStreamer {
    /// Spawn the worker and create an empty streamer.
    pub fn new(
        config: StreamingConfig,
        source: Arc<dyn TextureSource>,
        uploader: Arc<dyn TextureUploader>,
    ) -> Result<Self> {
        let worker = WorkerHandle::spawn(source, uploader.clone(), config.srgb)?;
        let (eviction_tx, eviction_rx) = channel::unbounded();

        tracing::info!(
            "Texture streamer started (batch {}, in flight {}, resident {})",
            config.max_requests_per_batch,
            config.max_in_flight,
            config.max_resident
        );

        Ok(Self {
            deferred: Mutex::new(DeferredReleaseQueue::new(config.frames_in_flight)),
            config,
            uploader,
            registry: RwLock::new(Registry::default()),
            frame: AtomicU64::new(0),
            eviction_tx,
            eviction_rx,
            worker,
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Names of evicted textures, in eviction order.
    pub fn evictions(&self) -> Receiver<String> {
        self.eviction_rx.clone()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub fn resident_count(&self) -> usize {
        self.registry.read().resident_count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.registry.read().in_flight
    }

    /// Evicted textures not released yet.
    pub fn pending_release_count(&self) -> usize {
        self.deferred.lock().pending_count()
    }

    /// Collect finished loads and hand queued names to the worker.
    ///
    /// Returns the number of loads that finished.
    pub fn pump(&self) -> usize {
        let mut registry = self.registry.write();
        let completed = self.collect_completed(&mut registry);
        self.submit_pending(&mut registry);
        completed
    }

    /// Start a new frame: collect finished loads, evict least recently
    /// queried textures over budget and release matured evictions.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn advance_frame(&self) -> u64 {
        let frame = self.frame.fetch_add(1, Ordering::AcqRel) + 1;

        let mut registry = self.registry.write();
        self.collect_completed(&mut registry);
        self.evict_over_budget(&mut registry, frame);
        self.submit_pending(&mut registry);
        drop(registry);

        let released = self
            .deferred
            .lock()
            .process(frame, |handle| self.uploader.release(handle));
        if released > 0 {
            tracing::debug!("Released {released} evicted textures at frame {frame}");
        }

        frame
    }

    /// Drop `name` from the streamer.
    ///
    /// A resident texture is released once in-flight frames are done with it
    /// and its name is published on [`Self::evictions`]. Returns whether the
    /// name was known.
    pub fn evict(&self, name: &str) -> bool {
        let frame = self.frame_number();
        let mut registry = self.registry.write();
        self.evict_locked(&mut registry, name, frame)
    }

    fn evict_locked(&self, registry: &mut Registry, name: &str, frame: u64) -> bool {
        let Some(entry) = registry.entries.remove(name) else {
            return false;
        };

        match entry.state {
            EntryState::Resident(handle) => {
                self.deferred.lock().queue(handle, frame);
                let _ = self.eviction_tx.send(name.to_string());
                tracing::debug!("Evicted {name} at frame {frame}");
            }
            EntryState::InFlight => {
                // The late result finds no entry and is released on arrival.
                registry.in_flight = registry.in_flight.saturating_sub(1);
            }
            EntryState::Pending | EntryState::Failed => {}
        }
        true
    }

    fn evict_over_budget(&self, registry: &mut Registry, frame: u64) {
        let resident = registry.resident_count();
        if resident <= self.config.max_resident {
            return;
        }

        let mut candidates: Vec<(u64, String)> = registry
            .entries
            .iter()
            .filter(|(_, e)| matches!(e.state, EntryState::Resident(_)))
            .map(|(name, e)| (e.last_access_frame, name.clone()))
            .collect();
        candidates.sort_unstable();

        for (_, name) in candidates.into_iter().take(resident - self.config.max_resident) {
            self.evict_locked(registry, &name, frame);
        }
    }

    fn collect_completed(&self, registry: &mut Registry) -> usize {
        let frame = self.frame_number();
        let mut completed = 0;

        loop {
            let result = match self.worker.try_recv() {
                Ok(result) => result,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.fail_in_flight(registry);
                    break;
                }
            };
            completed += 1;

            let entry = registry
                .entries
                .get_mut(&result.name)
                .filter(|e| e.state == EntryState::InFlight);
            let Some(entry) = entry else {
                if let Ok(handle) = result.outcome {
                    tracing::debug!("Discarding {} loaded after eviction", result.name);
                    self.uploader.release(handle);
                }
                continue;
            };

            registry.in_flight = registry.in_flight.saturating_sub(1);
            match result.outcome {
                Ok(handle) => {
                    entry.state = EntryState::Resident(handle);
                    entry.last_access_frame = frame;
                    tracing::debug!(
                        "Loaded {} ({}x{})",
                        result.name,
                        handle.image.extent.width,
                        handle.image.extent.height
                    );
                }
                Err(e) => {
                    entry.state = EntryState::Failed;
                    entry.failures += 1;
                    tracing::warn!(
                        "Loading {} failed (attempt {}): {e}",
                        result.name,
                        entry.failures
                    );
                }
            }
        }

        completed
    }

    fn submit_pending(&self, registry: &mut Registry) {
        let available = self.config.max_in_flight.saturating_sub(registry.in_flight);
        let batch_size = self.config.max_requests_per_batch.min(available);
        if batch_size == 0 {
            return;
        }

        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            let Some(name) = registry.pending.pop_front() else {
                break;
            };
            // Skip names evicted or already submitted since they were queued.
            if registry
                .entries
                .get(&name)
                .is_some_and(|e| e.state == EntryState::Pending)
                && !batch.contains(&name)
            {
                batch.push(name);
            }
        }

        if batch.is_empty() {
            return;
        }

        for name in &batch {
            if let Some(entry) = registry.entries.get_mut(name) {
                entry.state = EntryState::InFlight;
            }
        }
        registry.in_flight += batch.len();

        match self.worker.send_work(batch) {
            Ok(()) => {}
            Err(TrySendError::Full(returned)) => {
                // Queue was full, put them back at the front
                registry.in_flight = registry.in_flight.saturating_sub(returned.len());
                for name in returned.into_iter().rev() {
                    if let Some(entry) = registry.entries.get_mut(&name) {
                        entry.state = EntryState::Pending;
                    }
                    registry.pending.push_front(name);
                }
            }
            Err(TrySendError::Disconnected(returned)) => {
                tracing::error!(
                    "Texture streaming worker is gone, failing {} requests",
                    returned.len()
                );
                self.fail_permanently(registry, &returned);
            }
        }
    }

    /// Fail every in-flight load after the worker thread exited.
    fn fail_in_flight(&self, registry: &mut Registry) {
        let lost: Vec<String> = registry
            .entries
            .iter()
            .filter(|(_, e)| e.state == EntryState::InFlight)
            .map(|(name, _)| name.clone())
            .collect();
        if lost.is_empty() {
            return;
        }

        tracing::error!(
            "Texture streaming worker stopped with {} loads in flight",
            lost.len()
        );
        self.fail_permanently(registry, &lost);
    }

    /// Mark `names` failed with no retries left.
    fn fail_permanently(&self, registry: &mut Registry, names: &[String]) {
        let failures = self.config.max_retries.saturating_add(1);
        for name in names {
            let Some(entry) = registry.entries.get_mut(name) else {
                continue;
            };
            if entry.state == EntryState::InFlight {
                registry.in_flight = registry.in_flight.saturating_sub(1);
            }
            entry.state = EntryState::Failed;
            entry.failures = failures;
        }
    }
}

impl StreamingService for TextureStreamer {
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn query(&self, name: &str) -> ResourceState {
        let frame = self.frame_number();
        let mut guard = self.registry.write();
        self.collect_completed(&mut guard);

        let registry = &mut *guard;
        let known = registry.entries.get_mut(name).and_then(|entry| match entry.state {
            EntryState::Pending | EntryState::InFlight => Some(ResourceState::Loading),
            EntryState::Resident(_) => {
                entry.last_access_frame = frame;
                Some(ResourceState::Available)
            }
            EntryState::Failed if entry.failures > self.config.max_retries => {
                Some(ResourceState::Unavailable)
            }
            EntryState::Failed => None,
        });
        let state = known.unwrap_or_else(|| {
            registry.request(name, frame);
            ResourceState::Unavailable
        });

        self.submit_pending(registry);
        tracing::trace!("query {name} -> {state}");
        state
    }

    fn get(&self, name: &str) -> Option<ResourceHandle> {
        match self.registry.read().entries.get(name)?.state {
            EntryState::Resident(handle) => Some(handle),
            _ => None,
        }
    }

    fn mark_used(&self, name: &str) {
        let frame = self.frame_number();
        if let Some(entry) = self.registry.write().entries.get_mut(name) {
            if matches!(entry.state, EntryState::Resident(_)) {
                entry.last_access_frame = frame;
            }
        }
    }
}

impl Drop for TextureStreamer {
    fn drop(&mut self) {
        self.worker.shutdown();

        while let Ok(result) = self.worker.try_recv() {
            if let Ok(handle) = result.outcome {
                self.uploader.release(handle);
            }
        }

        let registry = std::mem::take(&mut *self.registry.write());
        let mut released = 0;
        for entry in registry.entries.into_values() {
            if let EntryState::Resident(handle) = entry.state {
                self.uploader.release(handle);
                released += 1;
            }
        }
        self.deferred
            .lock()
            .flush(|handle| self.uploader.release(handle));

        tracing::info!("Texture streamer stopped, released {released} resident textures");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::source::MemorySource;
    use crate::upload::HostTextureUploader;

    fn encode_bmp(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Bmp)
            .unwrap();
        bytes
    }

    fn streamer_with(
        config: StreamingConfig,
        files: &[&str],
    ) -> (TextureStreamer, Arc<MemorySource>, Arc<HostTextureUploader>) {
        let source = Arc::new(MemorySource::new());
        for name in files {
            source.insert(*name, encode_bmp(4, 4));
        }
        let uploader = Arc::new(HostTextureUploader::new());
        let streamer = TextureStreamer::new(config, source.clone(), uploader.clone()).unwrap();
        (streamer, source, uploader)
    }

    /// Query until `name` leaves the loading state.
    fn wait_for(streamer: &TextureStreamer, name: &str) -> ResourceState {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let state = streamer.query(name);
            if state != ResourceState::Loading || Instant::now() > deadline {
                return state;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn first_query_requests_then_reports_loading() {
        let (streamer, _, _) = streamer_with(StreamingConfig::default(), &[]);
        // Nothing can complete: the file does not exist and the first query only requests.
        assert_eq!(streamer.query("t/a.bmp"), ResourceState::Unavailable);
        let second = streamer.query("t/a.bmp");
        assert!(matches!(
            second,
            ResourceState::Loading | ResourceState::Unavailable
        ));
    }

    #[test]
    fn known_texture_becomes_available() {
        let (streamer, _, uploader) = streamer_with(StreamingConfig::default(), &["t/a.bmp"]);

        assert_eq!(streamer.query("t/a.bmp"), ResourceState::Unavailable);
        assert_eq!(wait_for(&streamer, "t/a.bmp"), ResourceState::Available);

        let handle = streamer.get("t/a.bmp").unwrap();
        assert_eq!(handle.image.extent.width, 4);
        assert_eq!(handle.format, terrastream_core::PixelFormat::Rgba8UnormSrgb);
        assert_eq!(uploader.resident_count(), 1);
        assert_eq!(streamer.resident_count(), 1);
        assert_eq!(streamer.in_flight_count(), 0);
    }

    #[test]
    fn get_is_none_until_available() {
        let (streamer, _, _) = streamer_with(StreamingConfig::default(), &["t/a.bmp"]);
        assert!(streamer.get("t/a.bmp").is_none());
        streamer.query("t/a.bmp");
        assert!(streamer.get("t/never-queried.bmp").is_none());
    }

    #[test]
    fn missing_texture_stays_unavailable_after_retries() {
        let config = StreamingConfig::default().with_max_retries(1);
        let (streamer, _, _) = streamer_with(config, &[]);

        // Two attempts (initial + one retry), each Unavailable then Loading.
        assert_eq!(streamer.query("missing.bmp"), ResourceState::Unavailable);
        assert_eq!(wait_for(&streamer, "missing.bmp"), ResourceState::Unavailable);
        assert_eq!(wait_for(&streamer, "missing.bmp"), ResourceState::Unavailable);

        // Failed for good: no further requests are made.
        for _ in 0..5 {
            assert_eq!(streamer.query("missing.bmp"), ResourceState::Unavailable);
        }
        assert_eq!(streamer.in_flight_count(), 0);
    }

    #[test]
    fn retry_picks_up_a_file_added_later() {
        let config = StreamingConfig::default().with_max_retries(3);
        let (streamer, source, _) = streamer_with(config, &[]);

        streamer.query("late.bmp");
        assert_eq!(wait_for(&streamer, "late.bmp"), ResourceState::Unavailable);

        source.insert("late.bmp", encode_bmp(2, 2));
        // An attempt started before the insert may still fail; the next retry succeeds.
        let mut state = wait_for(&streamer, "late.bmp");
        if state != ResourceState::Available {
            state = wait_for(&streamer, "late.bmp");
        }
        assert_eq!(state, ResourceState::Available);
    }

    #[test]
    fn evict_defers_release_and_publishes_name() {
        let config = StreamingConfig::default().with_frames_in_flight(2);
        let (streamer, _, uploader) = streamer_with(config, &["t/a.bmp"]);
        let evictions = streamer.evictions();

        streamer.query("t/a.bmp");
        assert_eq!(wait_for(&streamer, "t/a.bmp"), ResourceState::Available);

        assert!(streamer.evict("t/a.bmp"));
        assert!(!streamer.evict("t/a.bmp"));
        assert_eq!(evictions.try_recv().unwrap(), "t/a.bmp");
        assert!(streamer.get("t/a.bmp").is_none());

        // Still referenced by in-flight frames.
        assert_eq!(streamer.pending_release_count(), 1);
        assert_eq!(uploader.resident_count(), 1);

        for _ in 0..3 {
            streamer.advance_frame();
        }
        assert_eq!(streamer.pending_release_count(), 0);
        assert_eq!(uploader.resident_count(), 0);
    }

    #[test]
    fn evicted_texture_can_be_requested_again() {
        let (streamer, _, _) = streamer_with(StreamingConfig::default(), &["t/a.bmp"]);
        streamer.query("t/a.bmp");
        assert_eq!(wait_for(&streamer, "t/a.bmp"), ResourceState::Available);

        streamer.evict("t/a.bmp");
        assert_eq!(streamer.query("t/a.bmp"), ResourceState::Unavailable);
        assert_eq!(wait_for(&streamer, "t/a.bmp"), ResourceState::Available);
    }

    #[test]
    fn least_recently_queried_is_evicted_over_budget() {
        let config = StreamingConfig::default().with_max_resident(2);
        let names = ["a.bmp", "b.bmp", "c.bmp"];
        let (streamer, _, _) = streamer_with(config, &names);
        let evictions = streamer.evictions();

        for name in names {
            streamer.query(name);
            assert_eq!(wait_for(&streamer, name), ResourceState::Available);
            streamer.advance_frame();
        }

        assert_eq!(streamer.resident_count(), 2);
        assert_eq!(evictions.try_recv().unwrap(), "a.bmp");
        assert!(evictions.try_recv().is_err());
    }

    #[test]
    fn drawn_texture_outlives_a_queried_one() {
        let config = StreamingConfig::default().with_max_resident(2);
        let names = ["a.bmp", "b.bmp", "c.bmp"];
        let (streamer, _, _) = streamer_with(config, &names);
        let evictions = streamer.evictions();

        for name in ["a.bmp", "b.bmp"] {
            streamer.query(name);
            assert_eq!(wait_for(&streamer, name), ResourceState::Available);
            streamer.advance_frame();
        }
        // "a.bmp" is bound elsewhere and only marked as used from now on.
        streamer.mark_used("a.bmp");
        streamer.query("c.bmp");
        assert_eq!(wait_for(&streamer, "c.bmp"), ResourceState::Available);
        streamer.advance_frame();

        assert_eq!(evictions.try_recv().unwrap(), "b.bmp");
        assert!(streamer.get("a.bmp").is_some());
    }

    #[test]
    fn mark_used_ignores_unknown_names() {
        let (streamer, _, _) = streamer_with(StreamingConfig::default(), &["a.bmp"]);
        streamer.mark_used("a.bmp");
        assert!(streamer.get("a.bmp").is_none());
        assert_eq!(streamer.query("a.bmp"), ResourceState::Unavailable);
    }

    #[test]
    fn drop_releases_everything() {
        let (streamer, _, uploader) =
            streamer_with(StreamingConfig::default(), &["a.bmp", "b.bmp"]);
        for name in ["a.bmp", "b.bmp"] {
            streamer.query(name);
            assert_eq!(wait_for(&streamer, name), ResourceState::Available);
        }
        streamer.evict("a.bmp");

        drop(streamer);
        assert_eq!(uploader.resident_count(), 0);
    }

    /// Source whose reads panic, taking the worker thread down.
    struct PanickingSource;

    impl TextureSource for PanickingSource {
        fn read(&self, name: &str) -> Result<Vec<u8>> {
            panic!("read of {name} panicked");
        }
    }

    #[test]
    fn dead_worker_fails_requests_instead_of_loading_forever() {
        let uploader = Arc::new(HostTextureUploader::new());
        let streamer = TextureStreamer::new(
            StreamingConfig::default().with_max_retries(5),
            Arc::new(PanickingSource),
            uploader,
        )
        .unwrap();

        assert_eq!(streamer.query("a.bmp"), ResourceState::Unavailable);
        assert_eq!(wait_for(&streamer, "a.bmp"), ResourceState::Unavailable);
        assert_eq!(streamer.in_flight_count(), 0);

        // Later requests fail at submission without a retry cycle.
        assert_eq!(streamer.query("b.bmp"), ResourceState::Unavailable);
        assert_eq!(streamer.query("b.bmp"), ResourceState::Unavailable);
        assert_eq!(streamer.query("a.bmp"), ResourceState::Unavailable);
        assert_eq!(streamer.in_flight_count(), 0);
    }

    #[test]
    fn pump_collects_and_submits_without_querying() {
        let config = StreamingConfig::default()
            .with_max_in_flight(1)
            .with_max_requests_per_batch(1);
        let (streamer, _, _) = streamer_with(config, &["a.bmp", "b.bmp"]);

        streamer.query("a.bmp");
        streamer.query("b.bmp");
        assert_eq!(streamer.in_flight_count(), 1);

        // "b.bmp" can only be submitted and collected by pumping.
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut completed = 0;
        while streamer.resident_count() < 2 && Instant::now() < deadline {
            completed += streamer.pump();
            std::thread::sleep(Duration::from_millis(2));
        }

        assert!(completed >= 1);
        assert_eq!(streamer.resident_count(), 2);
        assert_eq!(streamer.in_flight_count(), 0);
        assert!(streamer.get("b.bmp").is_some());
    }

    #[test]
    fn batches_respect_in_flight_limit() {
        let config = StreamingConfig::default()
            .with_max_in_flight(1)
            .with_max_requests_per_batch(4);
        let (streamer, _, _) = streamer_with(config, &["a.bmp", "b.bmp"]);

        streamer.query("a.bmp");
        streamer.query("b.bmp");
        assert!(streamer.in_flight_count() <= 1);

        assert_eq!(wait_for(&streamer, "a.bmp"), ResourceState::Available);
        assert_eq!(wait_for(&streamer, "b.bmp"), ResourceState::Available);
    }
}
