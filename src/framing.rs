//! Length-prefixed framing for the controller channel.
//!
//! Every message after the plaintext handshake travels as one frame:
//!
//! ```text
//! +--------------------+----------------------+
//! | length (4B, BE u32)| ciphertext token ... |
//! +--------------------+----------------------+
//! ```
//!
//! The prefix always equals the token's byte length. The protocol
//! enforces no maximum frame size; memory use is bounded by what the
//! peer actually transmits because the decoder buffers incrementally
//! rather than preallocating the declared length.
//!
//! [`FrameDecoder`] accumulates stream bytes across reads and yields
//! complete frames one at a time, so a single read that happens to carry
//! several frames (e.g. a `transfer put` request plus its payload) is
//! handled the same as byte-at-a-time delivery.

use anyhow::{Context, Result};

/// Size of the big-endian length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a payload into a single wire frame.
///
/// # Errors
///
/// Returns an error if the payload does not fit the 32-bit length field.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .context("payload exceeds the 32-bit frame length field")?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental decoder for length-prefixed frames.
///
/// Feed it raw stream bytes as they arrive; pop complete frames with
/// [`FrameDecoder::next_frame`]. Unconsumed bytes stay buffered between
/// calls, so partial frames reassemble across reads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Append raw bytes received from the stream.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame payload, if one is buffered.
    ///
    /// Returns `None` when the buffer holds less than a full frame;
    /// feeding more bytes may complete it.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buf.len() < LENGTH_PREFIX_SIZE {
            return None;
        }
        let declared = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let total = LENGTH_PREFIX_SIZE + declared as usize;
        if self.buf.len() < total {
            return None;
        }
        let payload = self.buf[LENGTH_PREFIX_SIZE..total].to_vec();
        self.buf.drain(..total);
        Some(payload)
    }

    /// Whether unconsumed bytes remain buffered.
    ///
    /// True after a stream closes mid-frame: the peer declared more
    /// bytes than it delivered, which callers treat as a connection
    /// failure rather than a short frame.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}
