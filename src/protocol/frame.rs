//! Frame codec: escaping, checksum and start/end markers around a [`Packet`].
//!
//! Wire format:
//! ```text
//! [0x3E] escape([packet body][checksum]) [0x3C]
//! ```
//! Any body or checksum byte equal to 0x3C, 0x3D or 0x3E is sent as
//! `0x3D, byte & 0xEF`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use super::checksum::checksum;
use super::commands::{END_MARKER, ESCAPE_MARKER, ESCAPE_MASK, START_MARKER};
use super::error::FramingError;
use super::packet::{Packet, HEADER_LEN, MAX_PAYLOAD_LEN};

/// Longest unescaped frame content: header, payload and checksum.
pub const MAX_FRAME_BODY_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + 1;

fn is_reserved(b: u8) -> bool {
    matches!(b, START_MARKER | END_MARKER | ESCAPE_MARKER)
}

/// Reverse the escape transform, rejecting bytes no reserved byte maps to.
fn unescape(b: u8) -> Option<u8> {
    let original = b | !ESCAPE_MASK;
    (b & !ESCAPE_MASK == 0 && is_reserved(original)).then_some(original)
}

/// Encode a packet into a complete wire frame.
pub fn encode(packet: &Packet) -> Bytes {
    let mut body = packet.to_body();
    let sum = checksum(&body);
    body.put_u8(sum);

    // Worst case every byte is escaped
    let mut frame = BytesMut::with_capacity(body.len() * 2 + 2);
    frame.put_u8(START_MARKER);
    for &b in body.iter() {
        if is_reserved(b) {
            frame.put_u8(ESCAPE_MARKER);
            frame.put_u8(b & ESCAPE_MASK);
        } else {
            frame.put_u8(b);
        }
    }
    frame.put_u8(END_MARKER);
    frame.freeze()
}

/// Decode the first frame found in `data`.
///
/// Noise before the start marker is skipped. A broken frame yields its
/// error even when a valid frame follows it in `data`; [`FrameDecoder`]
/// returns the error and then the following frames, and also handles input
/// arriving in chunks.
pub fn decode(data: &[u8]) -> Result<Packet, FramingError> {
    let mut decoder = FrameDecoder::new();
    decoder.push(data);
    match decoder.next_packet() {
        Some(result) => result,
        None if decoder.in_frame() => Err(FramingError::Truncated),
        None => Err(FramingError::NoStartMarker),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Skipping bytes until a start marker.
    Hunting,
    /// Collecting frame content.
    InFrame,
    /// Previous byte was the escape marker.
    Escaped,
}

/// Resumable frame decoder.
///
/// Raw chunks are appended with [`push`](Self::push) in whatever sizes the
/// transport delivers them; [`next_packet`](Self::next_packet) yields each
/// complete frame. Unescaped content is collected in a buffer that is reused
/// across frames.
pub struct FrameDecoder {
    input: BytesMut,
    frame: BytesMut,
    state: State,
    skipped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            input: BytesMut::with_capacity(1024),
            frame: BytesMut::with_capacity(256),
            state: State::Hunting,
            skipped: 0,
        }
    }

    /// Append raw bytes read from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    /// Decode the next complete frame from buffered input.
    ///
    /// Returns `None` when more input is needed. After an error the decoder
    /// has already resynchronised and can be polled again.
    pub fn next_packet(&mut self) -> Option<Result<Packet, FramingError>> {
        while self.input.has_remaining() {
            let byte = self.input.get_u8();
            match self.state {
                State::Hunting => {
                    if byte == START_MARKER {
                        self.begin_frame();
                    } else {
                        self.skipped += 1;
                    }
                }
                State::InFrame => match byte {
                    START_MARKER => {
                        warn!(
                            "Start marker inside frame, dropping {} partial bytes",
                            self.frame.len()
                        );
                        self.begin_frame();
                    }
                    END_MARKER => {
                        self.state = State::Hunting;
                        return Some(self.finish_frame());
                    }
                    ESCAPE_MARKER => self.state = State::Escaped,
                    b => {
                        if let Err(e) = self.append(b) {
                            return Some(Err(e));
                        }
                    }
                },
                State::Escaped => {
                    if byte == START_MARKER {
                        warn!("Start marker after escape, resynchronising");
                        self.begin_frame();
                        continue;
                    }
                    match unescape(byte) {
                        Some(b) => {
                            self.state = State::InFrame;
                            if let Err(e) = self.append(b) {
                                return Some(Err(e));
                            }
                        }
                        None => {
                            self.abandon_frame();
                            return Some(Err(FramingError::InvalidEscape(byte)));
                        }
                    }
                }
            }
        }
        None
    }

    /// Whether a frame has started but not yet ended.
    pub fn in_frame(&self) -> bool {
        self.state != State::Hunting
    }

    /// Raw plus partially decoded bytes currently held.
    pub fn buffered_len(&self) -> usize {
        self.input.len() + self.frame.len()
    }

    /// Drop all buffered input and any partial frame.
    pub fn clear(&mut self) {
        self.input.clear();
        self.abandon_frame();
        self.skipped = 0;
    }

    fn begin_frame(&mut self) {
        if self.skipped > 0 {
            debug!("Skipped {} bytes before start marker", self.skipped);
            self.skipped = 0;
        }
        self.frame.clear();
        self.state = State::InFrame;
    }

    fn abandon_frame(&mut self) {
        self.frame.clear();
        self.state = State::Hunting;
    }

    fn append(&mut self, b: u8) -> Result<(), FramingError> {
        if self.frame.len() >= MAX_FRAME_BODY_LEN {
            self.abandon_frame();
            return Err(FramingError::Oversized {
                max: MAX_FRAME_BODY_LEN,
            });
        }
        self.frame.put_u8(b);
        Ok(())
    }

    fn finish_frame(&mut self) -> Result<Packet, FramingError> {
        let mut body = self.frame.split();
        let Some(received) = body.last().copied() else {
            return Err(FramingError::Truncated);
        };
        body.truncate(body.len() - 1);

        let computed = checksum(&body);
        if computed != received {
            return Err(FramingError::ChecksumMismatch { computed, received });
        }
        Packet::from_body(body.freeze())
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
