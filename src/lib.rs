//! Control of Sony headphones over the MDR protocol.
//!
//! [`protocol`] frames packets, [`device`] builds and classifies the sound
//! control messages, and [`session`] runs one acknowledged exchange at a
//! time over any byte stream. [`bluetooth`] and [`config`] back the
//! `sonyctl` binary.

pub mod bluetooth;
pub mod config;
pub mod device;
pub mod protocol;
pub mod session;
