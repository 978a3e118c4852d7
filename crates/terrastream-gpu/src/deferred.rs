//! Deferred resource release for multi-frame-in-flight rendering.
//!
//! When using multiple frames in flight, GPU resources cannot be released
//! immediately as they may still be in use by a previous frame. This module
//! provides a queue that holds resources until they are guaranteed to no
//! longer be referenced.

use std::collections::VecDeque;

/// A resource pending release.
#[derive(Debug)]
pub struct PendingRelease<T> {
    /// The resource to be released.
    pub resource: T,
    /// Frame number when this resource was queued.
    pub frame_queued: u64,
}

/// Queue for deferred releases.
///
/// Resources are queued with a frame number and only handed back once
/// enough frames have passed to guarantee no in-flight frame uses them.
#[derive(Debug)]
pub struct DeferredReleaseQueue<T> {
    pending: VecDeque<PendingRelease<T>>,
    frames_in_flight: usize,
}

impl<T> DeferredReleaseQueue<T> {
    /// Create a new queue that keeps resources for `frames_in_flight` frames.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            frames_in_flight,
        }
    }

    /// Queue a resource for deferred release.
    pub fn queue(&mut self, resource: T, frame_number: u64) {
        self.pending.push_back(PendingRelease {
            resource,
            frame_queued: frame_number,
        });
    }

    /// Hand every matured resource to `release`.
    ///
    /// Call this once per frame with the current frame number.
    pub fn process(&mut self, current_frame_number: u64, mut release: impl FnMut(T)) -> usize {
        let cutoff = current_frame_number.saturating_sub(self.frames_in_flight as u64);
        let mut released = 0;

        // Queue order is FIFO and frame numbers are non-decreasing, so only the front can mature.
        while self
            .pending
            .front()
            .is_some_and(|pending| pending.frame_queued < cutoff)
        {
            if let Some(pending) = self.pending.pop_front() {
                release(pending.resource);
                released += 1;
            }
        }

        released
    }

    /// Release everything immediately.
    ///
    /// Only valid once the device is idle.
    pub fn flush(&mut self, mut release: impl FnMut(T)) {
        while let Some(pending) = self.pending.pop_front() {
            release(pending.resource);
        }
    }

    /// Number of pending releases.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_resources_for_frames_in_flight() {
        let mut queue = DeferredReleaseQueue::new(2);
        queue.queue("a", 10);

        let mut released = Vec::new();
        assert_eq!(queue.process(11, |r| released.push(r)), 0);
        assert_eq!(queue.process(12, |r| released.push(r)), 0);
        assert_eq!(queue.process(13, |r| released.push(r)), 1);
        assert_eq!(released, vec!["a"]);
        assert_eq!(queue.pending_count(), 0);
    }

    #[test]
    fn releases_in_fifo_order() {
        let mut queue = DeferredReleaseQueue::new(1);
        queue.queue(1, 0);
        queue.queue(2, 1);
        queue.queue(3, 5);

        let mut released = Vec::new();
        queue.process(3, |r| released.push(r));
        assert_eq!(released, vec![1, 2]);
        assert_eq!(queue.pending_count(), 1);
    }

    #[test]
    fn flush_releases_everything() {
        let mut queue = DeferredReleaseQueue::new(3);
        queue.queue(1, 100);
        queue.queue(2, 100);

        let mut released = Vec::new();
        queue.flush(|r| released.push(r));
        assert_eq!(released, vec![1, 2]);
        assert_eq!(queue.pending_count(), 0);
    }
}
