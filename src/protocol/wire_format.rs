//! Wire format encoding and decoding.
//!
//! The link carries two kinds of traffic over one byte stream:
//!
//! ```text
//! text:   <token>,<token>,...<>             (local -> peer, terminated)
//!         <token>,<token>,...               (peer -> local, one per read)
//! image:  image,<byteCount>,<byteCount raw bytes>
//! ```
//!
//! Outgoing text is always terminated with `<>`. Incoming text is never
//! scanned for a terminator; each read chunk is treated as one message.

use bytes::Bytes;

/// Terminator appended to every outgoing text message.
pub const FRAME_TERMINATOR: &str = "<>";

/// First token of an image header.
pub const IMAGE_TAG: &str = "image";

/// Token separator for text messages and image headers.
pub const TOKEN_SEPARATOR: char = ',';

/// Number of leading bytes of a chunk interpreted as header text.
pub const DEFAULT_HEADER_SCAN_LIMIT: usize = 80;

/// Default upper bound for a single image payload.
pub const DEFAULT_MAX_IMAGE_SIZE: usize = 100_000;

/// Default size of one stream read.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// Number of structural separators in an image header (`image,` and the comma after the count).
pub const IMAGE_HEADER_SEPARATORS: usize = 2;

/// Encode an outgoing text message: the text followed by `<>`.
///
/// # Example
///
/// ```
/// use scopelink::protocol::encode_message;
///
/// let bytes = encode_message("actiondown,0.120,-0.450");
/// assert_eq!(&bytes[..], b"actiondown,0.120,-0.450<>");
/// ```
pub fn encode_message(text: &str) -> Bytes {
    let mut buf = Vec::with_capacity(text.len() + FRAME_TERMINATOR.len());
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(FRAME_TERMINATOR.as_bytes());
    Bytes::from(buf)
}

/// Build the image header exactly as the peer sends it: `image,<len>,`.
pub fn encode_image_header(len: usize) -> String {
    format!("{IMAGE_TAG}{TOKEN_SEPARATOR}{len}{TOKEN_SEPARATOR}")
}

/// Decode header bytes one byte per char.
///
/// Non-ASCII bytes map to the matching Latin-1 code point, so a binary
/// chunk never fails to decode.
pub fn decode_header_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Split header text into tokens.
///
/// Trailing empty tokens are dropped (`"image,10,"` yields `image`, `10`),
/// but at least one token is always returned.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text.split(TOKEN_SEPARATOR).map(str::to_owned).collect();
    while tokens.len() > 1 && tokens.last().is_some_and(String::is_empty) {
        tokens.pop();
    }
    tokens
}

/// Number of bytes occupied by an image header whose size token is `size_token`.
#[inline]
pub fn image_header_len(size_token: &str) -> usize {
    IMAGE_TAG.len() + size_token.len() + IMAGE_HEADER_SEPARATORS
}

/// Peer-side decoder for outgoing traffic.
///
/// Splits a byte run on `<>` and tokenizes every complete message. A trailing
/// fragment without terminator is ignored.
///
/// # Example
///
/// ```
/// use scopelink::protocol::split_messages;
///
/// let messages = split_messages(b"ack<>newimage<>");
/// assert_eq!(messages, vec![vec!["ack".to_string()], vec!["newimage".to_string()]]);
/// ```
pub fn split_messages(bytes: &[u8]) -> Vec<Vec<String>> {
    let text = decode_header_text(bytes);
    let mut parts: Vec<&str> = text.split(FRAME_TERMINATOR).collect();
    // Whatever follows the last terminator is an incomplete message.
    parts.pop();
    parts.into_iter().map(tokenize).collect()
}
