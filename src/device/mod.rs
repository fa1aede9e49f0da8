pub mod command;
pub mod sound;

pub use command::{Command, CommandSet, Reply, Request, StatusKind};
pub use sound::{AmbientLevel, NoiseCancelMode, SoundSettings};
