use crate::protocol::commands::*;
use crate::protocol::packet::ack_seq;
use crate::protocol::{DataType, Packet, Payload, ValidationError};

use super::sound::{AmbientLevel, NoiseCancelMode, SoundSettings};

/// A request the headset understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetAmbientSoundLevel(AmbientLevel),
    SetFocusOnVoice(bool),
    SetNoiseCancelMode(NoiseCancelMode),
    /// Level and focus on voice in one message.
    SetAmbientSound {
        level: AmbientLevel,
        focus_on_voice: bool,
    },
    GetSoundSettings,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetAmbientSoundLevel(_) => "set_ambient_sound_level",
            Self::SetFocusOnVoice(_) => "set_focus_on_voice",
            Self::SetNoiseCancelMode(_) => "set_noise_cancel_mode",
            Self::SetAmbientSound { .. } => "set_ambient_sound",
            Self::GetSoundSettings => "get_sound_settings",
        }
    }
}

/// Whether a status report answers an inquiry or was pushed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Inquired,
    Notified,
}

/// A classified packet from the headset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ack {
        seq: u8,
    },
    StatusReport {
        seq: u8,
        kind: StatusKind,
        settings: SoundSettings,
    },
    /// Anything not (yet) understood. Kept so it can be logged and acknowledged.
    Unknown {
        data_type: DataType,
        seq: u8,
        payload: Payload,
    },
}

/// A command that has been written to the device and awaits its ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    pub seq: u8,
}

impl Request {
    pub fn expected_ack_seq(&self) -> u8 {
        ack_seq(self.seq)
    }
}

/// Builds command payloads and classifies replies.
#[derive(Debug, Clone, Copy)]
pub struct CommandSet {
    default_ambient_level: AmbientLevel,
}

impl CommandSet {
    /// `default_ambient_level` fills the level field for commands that
    /// enter ambient mode without carrying a level of their own.
    pub fn new(default_ambient_level: AmbientLevel) -> Self {
        Self {
            default_ambient_level,
        }
    }

    pub fn build(&self, command: &Command) -> Payload {
        match *command {
            Command::SetAmbientSoundLevel(level) => {
                set_param(SoundSettings::at_level(level, false))
            }
            Command::SetFocusOnVoice(enabled) => {
                set_param(SoundSettings::at_level(self.default_ambient_level, enabled))
            }
            Command::SetNoiseCancelMode(mode) => set_param(match mode {
                NoiseCancelMode::Off => SoundSettings::off(),
                NoiseCancelMode::NoiseCancelling => {
                    SoundSettings::at_level(AmbientLevel::NOISE_CANCELLING, false)
                }
                NoiseCancelMode::Ambient => {
                    SoundSettings::at_level(self.default_ambient_level, false)
                }
            }),
            Command::SetAmbientSound {
                level,
                focus_on_voice,
            } => set_param(SoundSettings::at_level(level, focus_on_voice)),
            Command::GetSoundSettings => {
                Payload::from_static_layout([NCASM_GET_PARAM, NCASM_INQUIRED_TYPE])
            }
        }
    }

    pub fn build_set_ambient_sound_level(&self, level: i32) -> Result<Payload, ValidationError> {
        let level = AmbientLevel::new(level)?;
        Ok(self.build(&Command::SetAmbientSoundLevel(level)))
    }

    pub fn build_set_focus_on_voice(&self, enabled: bool) -> Payload {
        self.build(&Command::SetFocusOnVoice(enabled))
    }

    pub fn build_set_noise_cancel_mode(&self, mode: NoiseCancelMode) -> Payload {
        self.build(&Command::SetNoiseCancelMode(mode))
    }

    pub fn build_set_ambient_sound(&self, level: AmbientLevel, focus_on_voice: bool) -> Payload {
        self.build(&Command::SetAmbientSound {
            level,
            focus_on_voice,
        })
    }

    pub fn build_get_sound_settings(&self) -> Payload {
        self.build(&Command::GetSoundSettings)
    }

    /// Classify a decoded packet. Unrecognised packets become [`Reply::Unknown`].
    pub fn parse_reply(packet: &Packet) -> Reply {
        if packet.data_type == DataType::Ack {
            return Reply::Ack { seq: packet.seq };
        }
        if packet.data_type.is_data() {
            if let Some(reply) = parse_status(packet) {
                return reply;
            }
        }
        Reply::Unknown {
            data_type: packet.data_type,
            seq: packet.seq,
            payload: packet.payload.clone(),
        }
    }

    /// True only for the ACK of `request`.
    ///
    /// ACKs carry no command tag; they name the request they acknowledge by
    /// sequence number.
    pub fn matches_request(reply: &Reply, request: &Request) -> bool {
        match reply {
            Reply::Ack { seq } => *seq == request.expected_ack_seq(),
            Reply::StatusReport { .. } | Reply::Unknown { .. } => false,
        }
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::new(AmbientLevel::DEFAULT)
    }
}

fn set_param(settings: SoundSettings) -> Payload {
    let params = settings.to_params();
    let mut layout = [0u8; 1 + SoundSettings::PARAMS_LEN];
    layout[0] = NCASM_SET_PARAM;
    layout[1..].copy_from_slice(&params);
    Payload::from_static_layout(layout)
}

fn parse_status(packet: &Packet) -> Option<Reply> {
    let (&tag, params) = packet.payload.as_bytes().split_first()?;
    let kind = match tag {
        NCASM_RET_PARAM => StatusKind::Inquired,
        NCASM_NTFY_PARAM => StatusKind::Notified,
        _ => return None,
    };
    let settings = SoundSettings::from_params(params)?;
    Some(Reply::StatusReport {
        seq: packet.seq,
        kind,
        settings,
    })
}
