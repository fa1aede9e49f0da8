/// Identifiers for the Sony MDR control protocol.
///
/// Values come from protocol captures of Sony's companion app; the device
/// silently drops anything it does not recognise, so these must stay exact.

// --- Frame markers ---

pub const START_MARKER: u8 = 0x3E;
pub const END_MARKER: u8 = 0x3C;
pub const ESCAPE_MARKER: u8 = 0x3D;

/// An escaped byte is sent as `ESCAPE_MARKER, byte & ESCAPE_MASK`.
pub const ESCAPE_MASK: u8 = 0b1110_1111;

// --- Data types (first byte of the frame body) ---

pub const DATA_TYPE_ACK: u8 = 0x01;
pub const DATA_TYPE_MDR: u8 = 0x0C;
pub const DATA_TYPE_MDR2: u8 = 0x0E;

// --- Payload tags: noise cancelling / ambient sound mode ("NC/ASM") ---

pub const NCASM_GET_PARAM: u8 = 0x66;
pub const NCASM_RET_PARAM: u8 = 0x67;
pub const NCASM_SET_PARAM: u8 = 0x68;
pub const NCASM_NTFY_PARAM: u8 = 0x69;

/// Inquired type: noise cancelling and ambient sound mode combined.
pub const NCASM_INQUIRED_TYPE: u8 = 0x02;

// Effect byte
pub const NCASM_EFFECT_OFF: u8 = 0x00;
pub const NCASM_EFFECT_ADJUSTING: u8 = 0x10;
pub const NCASM_EFFECT_ADJUSTED: u8 = 0x11;

/// Setting type for the noise cancelling field (on/off style).
pub const NCASM_SETTING_TYPE_NC: u8 = 0x01;
/// Setting type for the ambient sound field (level adjustment).
pub const NCASM_SETTING_TYPE_ASM: u8 = 0x01;

/// Level byte sent when ambient sound control is disabled.
pub const NCASM_LEVEL_DISABLED: u8 = 0xFF;
