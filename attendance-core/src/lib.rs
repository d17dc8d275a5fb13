//! Hardware-independent logic of the classroom terminal.
//!
//! Everything here runs on the host: the firmware feeds peripheral readings
//! and network events into a [`terminal::Terminal`] and executes the
//! [`terminal::Effect`]s it returns.

pub mod clock;
pub mod config;
pub mod power;
pub mod protocol;
pub mod schedule;
pub mod screen;
pub mod terminal;
pub mod uid;
