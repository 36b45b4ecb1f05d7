//! Protocol module - wire format, framing, and command vocabulary.
//!
//! This module implements the byte-level protocol of the link:
//! - `<>`-terminated outgoing text messages
//! - Chunk-aligned frame parser for incoming text and images
//! - Typed peer and local commands

mod command;
mod frame;
mod frame_parser;
mod wire_format;

pub use command::{LocalCommand, PeerCommand};
pub use frame::Frame;
pub use frame_parser::FrameParser;
pub use wire_format::{
    decode_header_text, encode_image_header, encode_message, image_header_len, split_messages,
    tokenize, DEFAULT_HEADER_SCAN_LIMIT, DEFAULT_MAX_IMAGE_SIZE, DEFAULT_READ_CHUNK_SIZE,
    FRAME_TERMINATOR, IMAGE_HEADER_SEPARATORS, IMAGE_TAG, TOKEN_SEPARATOR,
};
