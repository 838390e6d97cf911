use std::time::Duration;

use crate::constants::{
    DISPLAY_HEIGHT, DISPLAY_WIDTH, MEMORY_SIZE, PROGRAM_START, SPRITE_SHEET, STACK_DEPTH,
};

/// The FrameBuffer is indexed as [y][x]
pub type FrameBuffer = [[u8; DISPLAY_WIDTH]; DISPLAY_HEIGHT];

/// A snapshot of the Chip8 internal state
///
/// ## CPU
/// Registers
/// - (v) 16 primary 8-bit registers (V0..VF)
///     - the first 15 (V0..VE) are general purpose registers
///     - the 16th (VF) doubles as the carry/borrow/collision flag
/// - (i) a 16-bit memory address register
///
/// Counter
/// - (pc) a 16-bit program counter, starting at 0x200
///
/// Pointer
/// - (sp) index of the next free stack slot (0..=16)
///
/// Timers
/// - 2 8-bit timers (delay & sound) that count down to 0 at 60Hz
/// - (timer_accumulator) wall-clock time not yet spent on a timer tick
///
/// ## Memory
/// - 16 slot stack of return addresses
/// - 4096 bytes of addressable memory, the sprite sheet lives at 0x000
/// - 64x32 frame buffer of 0/1 pixels
///
/// ## Input
/// - pressed status of keys 0..F, written by the host between steps
///
/// ## Signals
/// - (draw_flag) the frame buffer changed and should be rendered
/// - (sound_flag) the sound timer is running and a beep should play
#[derive(Copy, Clone)]
pub struct State {
    pub v: [u8; 16],
    pub i: u16,
    pub pc: u16,
    pub sp: u8,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub stack: [u16; STACK_DEPTH],
    pub memory: [u8; MEMORY_SIZE],
    pub frame_buffer: FrameBuffer,
    pub keys: [bool; 16],
    pub draw_flag: bool,
    pub sound_flag: bool,
    pub timer_accumulator: Duration,
}

impl State {
    pub fn new() -> Self {
        // 0x000 - 0x050 is reserved for a sprite sheet
        let mut memory = [0; MEMORY_SIZE];
        memory[..SPRITE_SHEET.len()].copy_from_slice(&SPRITE_SHEET);

        State {
            v: [0; 16],
            i: 0,
            pc: PROGRAM_START,
            sp: 0,
            delay_timer: 0,
            sound_timer: 0,
            stack: [0; STACK_DEPTH],
            memory,
            frame_buffer: [[0; DISPLAY_WIDTH]; DISPLAY_HEIGHT],
            keys: [false; 16],
            draw_flag: false,
            sound_flag: false,
            timer_accumulator: Duration::ZERO,
        }
    }

    /// Reads the byte at `addr`, wrapping around the end of memory
    pub fn read(&self, addr: u16) -> u8 {
        self.memory[wrap(addr)]
    }

    /// Writes the byte at `addr`, wrapping around the end of memory
    pub fn write(&mut self, addr: u16, value: u8) {
        self.memory[wrap(addr)] = value;
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

fn wrap(addr: u16) -> usize {
    addr as usize % MEMORY_SIZE
}
