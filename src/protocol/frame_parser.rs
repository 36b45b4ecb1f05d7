//! Stateful decoder turning raw read chunks into frames.
//!
//! Implements a two-state machine:
//! - `AwaitingHeader`: the next chunk starts a new message. Its leading bytes
//!   (at most the header scan limit) are comma-split; an `image,<n>,` header
//!   switches to image accumulation, anything else is a text frame.
//! - `ReadingImage`: chunks are appended to the accumulation buffer until the
//!   declared size is reached, then one image frame is emitted.
//! - `Discarding`: the body of a rejected oversized image is skipped without
//!   buffering.
//!
//! Text messages are assumed to arrive one per chunk. Image bodies may span
//! any number of chunks.
//!
//! # Example
//!
//! ```
//! use scopelink::protocol::{Frame, FrameParser};
//!
//! let mut parser = FrameParser::new();
//!
//! assert!(parser.push(b"image,6,abc").unwrap().is_none());
//! let frame = parser.push(b"def").unwrap().unwrap();
//! assert_eq!(frame.image().unwrap().as_ref(), b"abcdef");
//!
//! let frame = parser.push(b"gainchange,2.0").unwrap().unwrap();
//! assert_eq!(frame, Frame::text(["gainchange", "2.0"]));
//! ```

use bytes::BytesMut;

use super::wire_format::{
    decode_header_text, image_header_len, tokenize, DEFAULT_HEADER_SCAN_LIMIT,
    DEFAULT_MAX_IMAGE_SIZE, IMAGE_TAG,
};
use super::Frame;
use crate::error::{LinkError, Result};

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Next chunk begins a new message.
    AwaitingHeader,
    /// Image header parsed, `received` of `expected` bytes accumulated.
    ReadingImage { expected: usize, received: usize },
    /// Oversized image rejected, `remaining` body bytes still to skip.
    Discarding { remaining: usize },
}

/// Decoder for the chunk-aligned text/image stream.
pub struct FrameParser {
    /// Accumulation buffer for the image in flight.
    image: BytesMut,
    /// Current parsing state.
    state: State,
    /// Largest image accepted.
    max_image_size: usize,
    /// Number of leading bytes read as header text.
    header_scan_limit: usize,
}

impl FrameParser {
    /// Create a parser with the default 100 000 byte image bound.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_IMAGE_SIZE, DEFAULT_HEADER_SCAN_LIMIT)
    }

    /// Create a parser with a custom maximum image size.
    pub fn with_max_image_size(max_image_size: usize) -> Self {
        Self::with_limits(max_image_size, DEFAULT_HEADER_SCAN_LIMIT)
    }

    /// Create a parser with custom image bound and header scan limit.
    pub fn with_limits(max_image_size: usize, header_scan_limit: usize) -> Self {
        Self {
            image: BytesMut::new(),
            state: State::AwaitingHeader,
            max_image_size,
            header_scan_limit: header_scan_limit.max(1),
        }
    }

    /// Consume one read chunk.
    ///
    /// Returns the frame completed by this chunk, if any. A chunk never
    /// completes more than one frame.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for an image header whose size token is
    /// missing, not a number, or above the configured maximum. Nothing is
    /// buffered. An oversized image's body is skipped by the following pushes
    /// (see [`is_discarding`](Self::is_discarding)); otherwise the parser is
    /// back in the header state.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Frame>> {
        match self.state {
            State::ReadingImage { expected, received } => {
                Ok(self.accumulate(chunk, expected, received))
            }
            State::Discarding { remaining } => {
                self.discard(chunk.len(), remaining);
                Ok(None)
            }
            State::AwaitingHeader => self.parse_header(chunk),
        }
    }

    fn parse_header(&mut self, chunk: &[u8]) -> Result<Option<Frame>> {
        if chunk.is_empty() {
            return Ok(None);
        }

        let scan = chunk.len().min(self.header_scan_limit);
        let tokens = tokenize(&decode_header_text(&chunk[..scan]));

        if tokens[0] != IMAGE_TAG {
            return Ok(Some(Frame::Text(tokens)));
        }

        let size_token = tokens
            .get(1)
            .ok_or_else(|| LinkError::Protocol("image header without size".to_string()))?;
        let expected: usize = size_token
            .parse()
            .map_err(|_| LinkError::InvalidImageSize(size_token.clone()))?;

        let body = chunk.get(image_header_len(size_token)..).unwrap_or(&[]);

        // Validate before reserving anything.
        if expected > self.max_image_size {
            self.discard(body.len(), expected);
            return Err(LinkError::ImageTooLarge {
                declared: expected,
                max: self.max_image_size,
            });
        }

        tracing::debug!(size = expected, "image header received");

        self.image.clear();
        self.image.reserve(expected);

        Ok(self.accumulate(body, expected, 0))
    }

    fn discard(&mut self, len: usize, remaining: usize) {
        let remaining = remaining.saturating_sub(len);
        self.state = if remaining == 0 {
            State::AwaitingHeader
        } else {
            State::Discarding { remaining }
        };
    }

    fn accumulate(&mut self, data: &[u8], expected: usize, received: usize) -> Option<Frame> {
        let take = data.len().min(expected - received);
        self.image.extend_from_slice(&data[..take]);
        let received = received + take;

        if take < data.len() {
            tracing::warn!(
                discarded = data.len() - take,
                "discarding bytes past end of image"
            );
        }

        if received < expected {
            self.state = State::ReadingImage { expected, received };
            tracing::trace!(received, expected, "image progress");
            return None;
        }

        self.state = State::AwaitingHeader;
        Some(Frame::Image(self.image.split().freeze()))
    }

    /// Check whether an image is being accumulated.
    #[inline]
    pub fn is_reading_image(&self) -> bool {
        matches!(self.state, State::ReadingImage { .. })
    }

    /// Check whether the body of a rejected image is being skipped.
    #[inline]
    pub fn is_discarding(&self) -> bool {
        matches!(self.state, State::Discarding { .. })
    }

    /// Declared size of the image in flight.
    #[inline]
    pub fn expected_size(&self) -> Option<usize> {
        match self.state {
            State::ReadingImage { expected, .. } => Some(expected),
            _ => None,
        }
    }

    /// Bytes of the image in flight received so far.
    #[inline]
    pub fn received(&self) -> usize {
        match self.state {
            State::ReadingImage { received, .. } => received,
            _ => 0,
        }
    }

    /// Configured maximum image size.
    #[inline]
    pub fn max_image_size(&self) -> usize {
        self.max_image_size
    }

    /// Drop any partial or skipped image and wait for a header.
    pub fn reset(&mut self) {
        self.image = BytesMut::new();
        self.state = State::AwaitingHeader;
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}
