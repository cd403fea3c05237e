use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Relay-wide counters shared by every handler
#[derive(Debug, Default)]
pub struct RelayStats {
    still_images: AtomicU64,
    upstream_errors: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    frames_streamed: AtomicU64,
    bytes_streamed: AtomicU64,
}

impl RelayStats {
    pub fn record_still_image(&self) {
        self.still_images.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame(&self, frame_size: usize) {
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
        self.bytes_streamed
            .fetch_add(frame_size as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        let opened = self.sessions_opened.load(Ordering::Relaxed);
        let closed = self.sessions_closed.load(Ordering::Relaxed);
        StreamStats {
            active_sessions: opened.saturating_sub(closed),
            total_sessions: opened,
            still_images: self.still_images.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            frames_streamed: self.frames_streamed.load(Ordering::Relaxed),
            bytes_streamed: self.bytes_streamed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`RelayStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub active_sessions: u64,
    pub total_sessions: u64,
    pub still_images: u64,
    pub upstream_errors: u64,
    pub frames_streamed: u64,
    pub bytes_streamed: u64,
}
