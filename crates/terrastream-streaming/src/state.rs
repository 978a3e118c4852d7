//! Resource states and the streaming service seam.

use std::fmt;

use terrastream_core::PixelFormat;
use terrastream_gpu::ImageRef;

/// Residency of a named resource as seen by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Not known to the service, not requested yet, or failed for good.
    Unavailable,
    /// Requested; decode or upload is in progress.
    Loading,
    /// Resident on the GPU with its upload fenced.
    Available,
}

impl ResourceState {
    pub const fn is_available(self) -> bool {
        matches!(self, Self::Available)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::Loading => "LOADING",
            Self::Available => "AVAILABLE",
        };
        f.write_str(name)
    }
}

/// A GPU-resident texture owned by the streaming service.
///
/// Borrowers may create views of it but never release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    pub image: ImageRef,
    pub format: PixelFormat,
}

/// Asynchronous resource streaming as seen from the render thread.
///
/// Both calls are non-blocking.
pub trait StreamingService: Send + Sync {
    /// Report the state of `name`, requesting it if it is not known yet.
    fn query(&self, name: &str) -> ResourceState;

    /// Handle of a resource whose state is [`ResourceState::Available`].
    fn get(&self, name: &str) -> Option<ResourceHandle>;

    /// Record that a bound resource was drawn this frame.
    ///
    /// Keeps resources that are in use but no longer queried from looking
    /// idle to eviction. Does nothing for names that are not resident.
    fn mark_used(&self, name: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_uses_uppercase_names() {
        assert_eq!(ResourceState::Unavailable.to_string(), "UNAVAILABLE");
        assert_eq!(ResourceState::Loading.to_string(), "LOADING");
        assert_eq!(ResourceState::Available.to_string(), "AVAILABLE");
    }

    #[test]
    fn only_available_is_available() {
        assert!(ResourceState::Available.is_available());
        assert!(!ResourceState::Loading.is_available());
        assert!(!ResourceState::Unavailable.is_available());
    }
}
