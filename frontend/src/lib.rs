//! SDL2 front end for the Chip-8 VM: a window for the frame buffer and a
//! square wave beeper for the sound timer.

pub use audio::Beeper;
pub use display::Display;

mod audio;
mod display;
