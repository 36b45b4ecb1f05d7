//! Per-connection traffic counters.
//!
//! Counters are lock-free and shared between the reader loop and the
//! [`Link`](crate::Link) handle. They are reset when a new connection is
//! established.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Live counters updated by the reader loop.
#[derive(Debug, Default)]
pub(crate) struct LinkCounters {
    images_received: AtomicU64,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    protocol_errors: AtomicU64,
    write_failures: AtomicU64,
}

impl LinkCounters {
    #[inline]
    pub(crate) fn record_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_image(&self) {
        self.images_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.images_received.store(0, Ordering::Relaxed);
        self.messages_received.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.protocol_errors.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LinkStats {
        LinkStats {
            images_received: self.images_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Complete images decoded.
    pub images_received: u64,
    /// Text commands decoded.
    pub messages_received: u64,
    /// Raw bytes read from the stream.
    pub bytes_received: u64,
    /// Malformed headers skipped.
    pub protocol_errors: u64,
    /// Replies or commands that failed to write.
    pub write_failures: u64,
}

impl LinkStats {
    /// Serialize as a JSON object.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
