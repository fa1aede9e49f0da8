use std::fmt;

use crate::protocol::commands::*;
use crate::protocol::ValidationError;

/// Noise cancelling / ambient sound mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseCancelMode {
    Off,
    NoiseCancelling,
    Ambient,
}

impl NoiseCancelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::NoiseCancelling => "noise_cancelling",
            Self::Ambient => "ambient",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "nc" | "noise_cancelling" => Some(Self::NoiseCancelling),
            "ambient" | "asm" => Some(Self::Ambient),
            _ => None,
        }
    }
}

/// Ambient sound level, 0..=19.
///
/// Levels 0 and 1 are shown as noise suppression in Sony's app and switch
/// the headset's noise cancelling on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct AmbientLevel(u8);

impl AmbientLevel {
    pub const MAX: u8 = 19;

    /// Full noise cancelling.
    pub const NOISE_CANCELLING: Self = Self(0);

    /// Used when a command enters ambient mode without naming a level.
    pub const DEFAULT: Self = Self(10);

    /// Lowest level at which focus on voice is offered.
    pub const FOCUS_ON_VOICE_MIN: u8 = 2;

    pub fn new(level: i32) -> Result<Self, ValidationError> {
        if (0..=Self::MAX as i32).contains(&level) {
            Ok(Self(level as u8))
        } else {
            Err(ValidationError::AmbientLevelOutOfRange(level))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn supports_focus_on_voice(self) -> bool {
        self.0 >= Self::FOCUS_ON_VOICE_MIN
    }

    /// Noise cancelling strength carried next to the level.
    fn nc_value(self) -> u8 {
        match self.0 {
            0 => 2,
            1 => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for AmbientLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sound control state as carried by the NC/ASM parameter block.
///
/// Parameter block layout (follows the payload tag):
/// ```text
/// [inquired type 0x02] [effect] [0x01 NC setting type] [nc value]
/// [0x01 ASM setting type] [focus on voice 0/1] [ambient level]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundSettings {
    pub mode: NoiseCancelMode,
    /// `None` when the device reports ambient sound control disabled.
    pub ambient_level: Option<AmbientLevel>,
    pub focus_on_voice: bool,
    /// The device is still moving towards the reported state.
    pub adjusting: bool,
}

impl SoundSettings {
    pub const PARAMS_LEN: usize = 7;

    /// Sound control switched off.
    pub fn off() -> Self {
        Self {
            mode: NoiseCancelMode::Off,
            ambient_level: None,
            focus_on_voice: false,
            adjusting: false,
        }
    }

    /// Sound control on at `level`; the mode follows from the level.
    pub fn at_level(level: AmbientLevel, focus_on_voice: bool) -> Self {
        let mode = if level.nc_value() != 0 {
            NoiseCancelMode::NoiseCancelling
        } else {
            NoiseCancelMode::Ambient
        };
        Self {
            mode,
            ambient_level: Some(level),
            focus_on_voice,
            adjusting: false,
        }
    }

    /// Encode the parameter block for a set request.
    pub fn to_params(&self) -> [u8; Self::PARAMS_LEN] {
        match (self.mode, self.ambient_level) {
            (NoiseCancelMode::Off, _) | (_, None) => [
                NCASM_INQUIRED_TYPE,
                NCASM_EFFECT_OFF,
                NCASM_SETTING_TYPE_NC,
                0x00,
                NCASM_SETTING_TYPE_ASM,
                0x00,
                NCASM_LEVEL_DISABLED,
            ],
            (_, Some(level)) => [
                NCASM_INQUIRED_TYPE,
                NCASM_EFFECT_ADJUSTED,
                NCASM_SETTING_TYPE_NC,
                level.nc_value(),
                NCASM_SETTING_TYPE_ASM,
                self.focus_on_voice as u8,
                level.value(),
            ],
        }
    }

    /// Parse the parameter block of a status report.
    pub fn from_params(params: &[u8]) -> Option<Self> {
        if params.len() < Self::PARAMS_LEN || params[0] != NCASM_INQUIRED_TYPE {
            return None;
        }
        let effect = params[1];
        let nc_value = params[3];
        let voice = params[5];
        let level = params[6];

        let mode = if effect == NCASM_EFFECT_OFF {
            NoiseCancelMode::Off
        } else if nc_value != 0 {
            NoiseCancelMode::NoiseCancelling
        } else {
            NoiseCancelMode::Ambient
        };

        Some(Self {
            mode,
            ambient_level: AmbientLevel::new(level as i32).ok(),
            focus_on_voice: voice == 0x01,
            adjusting: effect == NCASM_EFFECT_ADJUSTING,
        })
    }
}

impl fmt::Display for SoundSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode={}", self.mode.as_str())?;
        if let Some(level) = self.ambient_level {
            write!(f, " level={}", level)?;
        }
        write!(
            f,
            " focus_on_voice={}",
            if self.focus_on_voice { "on" } else { "off" }
        )?;
        if self.adjusting {
            write!(f, " (adjusting)")?;
        }
        Ok(())
    }
}
