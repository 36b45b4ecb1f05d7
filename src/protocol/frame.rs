//! Decoded protocol frames.
//!
//! A [`Frame`] is one complete logical message: either a comma-split text
//! command or a fully accumulated image payload. Image payloads use
//! `bytes::Bytes` so the dispatcher and consumer share them without copying.

use bytes::Bytes;

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text command, split on `,`.
    Text(Vec<String>),
    /// Encoded image (JPEG from the peer), exactly the declared length.
    Image(Bytes),
}

impl Frame {
    /// Create a text frame from tokens.
    pub fn text<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Frame::Text(tokens.into_iter().map(Into::into).collect())
    }

    /// Check if this is an image frame.
    #[inline]
    pub fn is_image(&self) -> bool {
        matches!(self, Frame::Image(_))
    }

    /// Get the tokens of a text frame.
    #[inline]
    pub fn tokens(&self) -> Option<&[String]> {
        match self {
            Frame::Text(tokens) => Some(tokens),
            Frame::Image(_) => None,
        }
    }

    /// Get the first token (the verb) of a text frame.
    #[inline]
    pub fn verb(&self) -> Option<&str> {
        self.tokens().and_then(|t| t.first()).map(String::as_str)
    }

    /// Get the image bytes of an image frame.
    #[inline]
    pub fn image(&self) -> Option<&Bytes> {
        match self {
            Frame::Image(bytes) => Some(bytes),
            Frame::Text(_) => None,
        }
    }
}
