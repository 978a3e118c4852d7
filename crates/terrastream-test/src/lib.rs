//! Test harness for Terrastream.
//!
//! Provides fakes for the renderer, device, allocator, streaming service,
//! shader pass and constant buffers, plus test logging setup.

pub mod harness;

pub use harness::{
    sample_handle, FakeAllocator, FakeDevice, FakeRenderer, ScriptedStreamingService,
    StubConstantBuffers, StubShaderPass, TestServices,
};

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test writer, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_test_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}
