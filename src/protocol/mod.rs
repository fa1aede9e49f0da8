pub mod checksum;
pub mod commands;
pub mod error;
pub mod frame;
pub mod packet;

pub use error::{FramingError, ValidationError};
pub use frame::FrameDecoder;
pub use packet::{DataType, Packet, Payload};
