//! Link tunables.
//!
//! All limits of the wire protocol live here instead of in the parser or
//! the reader loop. A config can be built in code, through
//! [`LinkBuilder`](crate::LinkBuilder), or loaded from JSON:
//!
//! ```
//! use scopelink::LinkConfig;
//!
//! let config = LinkConfig::from_json(r#"{ "max_image_size": 250000 }"#).unwrap();
//! assert_eq!(config.max_image_size, 250_000);
//! assert_eq!(config.read_chunk_size, 1024);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{DEFAULT_HEADER_SCAN_LIMIT, DEFAULT_MAX_IMAGE_SIZE, DEFAULT_READ_CHUNK_SIZE};
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Configuration for a [`Link`](crate::Link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Largest image accepted from the peer, in bytes.
    pub max_image_size: usize,
    /// Size of a single stream read.
    pub read_chunk_size: usize,
    /// Leading bytes of a chunk interpreted as header text.
    pub header_scan_limit: usize,
    /// Give up on a connection attempt after this many milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Writer queue capacity.
    pub channel_capacity: usize,
}

impl LinkConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Connection attempt timeout, if any.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.channel_capacity,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            header_scan_limit: DEFAULT_HEADER_SCAN_LIMIT,
            connect_timeout_ms: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
