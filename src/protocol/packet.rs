use bytes::{BufMut, Bytes, BytesMut};

use super::commands::{DATA_TYPE_ACK, DATA_TYPE_MDR, DATA_TYPE_MDR2};
use super::error::{FramingError, ValidationError};

/// Largest payload the codec accepts, matching the headset's receive buffer.
pub const MAX_PAYLOAD_LEN: usize = 2048;

/// `[data type][sequence number][payload length: u32 BE]`
pub const HEADER_LEN: usize = 6;

/// First byte of every frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Ack,
    Mdr,
    Mdr2,
    /// Any other byte. Build through [`DataType::from_byte`].
    Unknown(u8),
}

impl DataType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            DATA_TYPE_ACK => Self::Ack,
            DATA_TYPE_MDR => Self::Mdr,
            DATA_TYPE_MDR2 => Self::Mdr2,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Ack => DATA_TYPE_ACK,
            Self::Mdr => DATA_TYPE_MDR,
            Self::Mdr2 => DATA_TYPE_MDR2,
            Self::Unknown(b) => b,
        }
    }

    /// Data packets must be acknowledged by the receiver.
    pub fn is_data(self) -> bool {
        matches!(self, Self::Mdr | Self::Mdr2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Mdr => "MDR",
            Self::Mdr2 => "MDR2",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Sequence number the receiver puts in its ACK for a packet sent with `seq`.
pub fn ack_seq(seq: u8) -> u8 {
    1u8.wrapping_sub(seq)
}

/// Logical message content: `[tag][parameters...]`, bounded by [`MAX_PAYLOAD_LEN`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Bytes);

impl Payload {
    pub fn new(data: impl Into<Bytes>) -> Result<Self, ValidationError> {
        let data = data.into();
        if data.len() > MAX_PAYLOAD_LEN {
            return Err(ValidationError::PayloadTooLong {
                len: data.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self(data))
    }

    /// Payloads built from fixed-size command layouts.
    pub(crate) fn from_static_layout<const N: usize>(data: [u8; N]) -> Self {
        debug_assert!(N <= MAX_PAYLOAD_LEN);
        Self(Bytes::copy_from_slice(&data))
    }

    /// Message-type tag, if the payload is not empty.
    pub fn tag(&self) -> Option<u8> {
        self.0.first().copied()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One MDR packet: the unescaped body of a frame.
///
/// Wire format (before escaping):
/// ```text
/// [data type: 1] [seq: 1] [payload length: 4 BE] [payload...]
/// ```
/// The frame codec appends the checksum and markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub data_type: DataType,
    pub seq: u8,
    pub payload: Payload,
}

impl Packet {
    /// `DataType::Unknown` holding a known byte is stored as that type.
    pub fn new(data_type: DataType, seq: u8, payload: Payload) -> Self {
        Self {
            data_type: DataType::from_byte(data_type.as_byte()),
            seq,
            payload,
        }
    }

    /// A command packet on the main MDR channel.
    pub fn command(seq: u8, payload: Payload) -> Self {
        Self::new(DataType::Mdr, seq, payload)
    }

    pub fn ack(seq: u8) -> Self {
        Self::new(DataType::Ack, seq, Payload::default())
    }

    /// The ACK the receiver of this packet must send back.
    pub fn ack_reply(&self) -> Self {
        Self::ack(ack_seq(self.seq))
    }

    /// Serialize header + payload (no checksum, no escaping).
    pub fn to_body(&self) -> BytesMut {
        let mut body = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        body.put_u8(self.data_type.as_byte());
        body.put_u8(self.seq);
        body.put_u32(self.payload.len() as u32);
        body.put_slice(self.payload.as_bytes());
        body
    }

    /// Parse an unescaped, checksum-verified frame body.
    pub fn from_body(body: Bytes) -> Result<Self, FramingError> {
        if body.len() < HEADER_LEN {
            return Err(FramingError::Truncated);
        }

        let declared = u32::from_be_bytes([body[2], body[3], body[4], body[5]]);
        let actual = body.len() - HEADER_LEN;
        if declared as usize != actual {
            return Err(FramingError::LengthMismatch { declared, actual });
        }
        if actual > MAX_PAYLOAD_LEN {
            return Err(FramingError::Oversized {
                max: MAX_PAYLOAD_LEN,
            });
        }

        Ok(Self {
            data_type: DataType::from_byte(body[0]),
            seq: body[1],
            payload: Payload(body.slice(HEADER_LEN..)),
        })
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(0x{:02X}) seq={}",
            self.data_type.as_str(),
            self.data_type.as_byte(),
            self.seq
        )?;
        if !self.payload.is_empty() {
            let hex: String = self
                .payload
                .as_bytes()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect();
            write!(f, " payload={}", hex)?;
        }
        Ok(())
    }
}
