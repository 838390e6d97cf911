use std::collections::VecDeque;
use std::io::Read;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::constants::{MAX_ROM_SIZE, MAX_SAVED_STATES, PROGRAM_START};
use crate::error::Chip8Error;
use crate::instruction::from_op;
use crate::opcode;
use crate::state::{FrameBuffer, State};
use crate::timer::{self, TimerDriver};

/// # Chip-8
/// Chip-8 is a virtual machine and corresponding interpreted language.
///
/// Tracks:
///  - current `state`
///  - `previous_states` for rewinding
///  - the timer driver that turns wall-clock time into 60Hz timer ticks
///  - the random number generator behind CXNN
///
/// Supplies interfaces for:
/// - loading roms
/// - pressing and releasing keys
/// - stepping the CPU forwards and rewinding it
/// - taking the frame buffer for rendering by some display
pub struct Chip8 {
    state: State,
    previous_states: VecDeque<State>,
    timers: TimerDriver,
    rng: StdRng,
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A Chip8 whose random numbers are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Chip8 {
            state: State::new(),
            previous_states: VecDeque::with_capacity(MAX_SAVED_STATES),
            timers: TimerDriver::new(),
            rng,
        }
    }

    /// Resets registers, memory, stack, timers, display and keys,
    /// reloading the sprite sheet
    pub fn initialize(&mut self) {
        self.state = State::new();
        self.previous_states.clear();
        self.timers.reset();
    }

    /// Copy a program into memory at 0x200
    ///
    /// # Arguments
    /// * `program` the ROM's bytes
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), Chip8Error> {
        if program.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomTooLarge {
                size: program.len(),
                max_size: MAX_ROM_SIZE,
            });
        }
        let start = PROGRAM_START as usize;
        self.state.memory[start..start + program.len()].copy_from_slice(program);
        log::debug!("loaded {} byte program at {:#05X}", program.len(), start);
        Ok(())
    }

    /// Load a rom from some source
    ///
    /// # Arguments
    /// * `reader` a reader that contains a ROM
    pub fn load_rom(&mut self, reader: &mut dyn Read) -> Result<(), Chip8Error> {
        let mut program = Vec::new();
        reader.read_to_end(&mut program)?;
        self.load_program(&program)
    }

    /// Read-only view of the current state
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Returns the FrameBuffer if the display should be redrawn, clearing the draw flag
    pub fn take_frame(&mut self) -> Option<FrameBuffer> {
        if self.state.draw_flag {
            self.state.draw_flag = false;
            Some(self.state.frame_buffer)
        } else {
            None
        }
    }

    /// Whether a beep should be playing
    pub fn sound_active(&self) -> bool {
        self.state.sound_flag
    }

    /// Set the pressed status of key
    ///
    /// # Arguments
    /// * `key` the hex keypad value 0x0..=0xF that was pressed
    pub fn key_press(&mut self, key: u8) {
        if let Some(pressed) = self.state.keys.get_mut(key as usize) {
            *pressed = true;
        }
    }

    /// Unset the pressed status of key
    ///
    /// # Arguments
    /// * `key` the hex keypad value 0x0..=0xF that was released
    pub fn key_release(&mut self, key: u8) {
        if let Some(pressed) = self.state.keys.get_mut(key as usize) {
            *pressed = false;
        }
    }

    /// Replace the whole key buffer
    pub fn set_keys(&mut self, keys: [bool; 16]) {
        self.state.keys = keys;
    }

    /// Advances the CPU by a single cycle, sampling the wall clock for the timers
    pub fn step(&mut self) -> Result<(), Chip8Error> {
        self.step_at(Instant::now())
    }

    /// Advances the CPU by a single cycle
    /// - fetches the opcode at the pc and moves the pc past it
    /// - executes the opcode; unknown opcodes are logged and skipped
    /// - spends the time elapsed since the last step on the timers
    ///
    /// # Arguments
    /// * `now` the current wall-clock time
    pub fn step_at(&mut self, now: Instant) -> Result<(), Chip8Error> {
        let previous = self.state;

        let op: u16 = self.get_op();
        log::trace!(
            "{:04X} v{:02X?} i{:04X} pc{:04X}",
            op,
            self.state.v,
            self.state.i,
            self.state.pc
        );
        self.state.pc = self.state.pc.wrapping_add(0x2);

        let operation = from_op(&op);
        match operation(&op, &self.state, &mut self.rng) {
            Ok(state) => self.state = state,
            Err(Chip8Error::UnknownOpcode { opcode, address }) => {
                log::warn!("skipping unknown opcode {:#06X} at {:#05X}", opcode, address);
            }
            Err(e) => return Err(e),
        }
        self.save_state(previous);

        let elapsed = self.timers.sample(now);
        self.state = timer::advance(&self.state, elapsed);
        Ok(())
    }

    /// Reverses the CPU by a single cycle if possible
    /// - if there are previous_states, pops the last one and restores it
    /// - the key buffer belongs to the host and is left as it is
    pub fn rewind(&mut self) {
        if let Some(state) = self.previous_states.pop_front() {
            log::debug!("rewound to pc {:04X}", state.pc);
            let keys = self.state.keys;
            self.state = State { keys, ..state };
            self.timers.reset();
        }
    }

    /// Puts a state in previous_states
    /// - if there are already MAX_SAVED_STATES saved then the oldest is dropped
    fn save_state(&mut self, state: State) {
        if self.previous_states.len() == MAX_SAVED_STATES {
            self.previous_states.pop_back();
        }
        self.previous_states.push_front(state);
    }

    /// Gets the opcode currently pointed at by the pc.
    /// Memory is stored as bytes, but opcodes are 16 bits so we combine two subsequent bytes.
    fn get_op(&self) -> u16 {
        opcode::from_bytes(
            self.state.read(self.state.pc),
            self.state.read(self.state.pc.wrapping_add(1)),
        )
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{MEMORY_SIZE, SPRITE_SHEET, TIMER_PERIOD};
    use rand::Rng;
    use std::time::Duration;

    fn with_program(program: &[u8]) -> Chip8 {
        let mut chip8 = Chip8::with_seed(0);
        chip8.load_program(program).unwrap();
        chip8
    }

    #[test]
    fn test_chip8_gets_op() {
        let mut chip8 = Chip8::new();
        chip8.state.memory[0x200..0x202].copy_from_slice(&[0xAA, 0xBB]);
        assert_eq!(chip8.get_op(), 0xAABB);
    }

    #[test]
    fn test_load_program_copies_rom() {
        let rom: Vec<u8> = (0..=255).collect();
        let chip8 = with_program(&rom);
        assert_eq!(chip8.state.memory[0x200..0x300], rom[..]);
        assert_eq!(chip8.state.pc, 0x200);
    }

    #[test]
    fn test_load_program_fills_memory() {
        let rom = vec![0xAB; MEMORY_SIZE - 0x200];
        let chip8 = with_program(&rom);
        assert_eq!(chip8.state.memory[MEMORY_SIZE - 1], 0xAB);
    }

    #[test]
    fn test_load_program_rejects_large_rom() {
        let mut chip8 = Chip8::new();
        let rom = vec![0xAB; MEMORY_SIZE - 0x200 + 1];
        match chip8.load_program(&rom) {
            Err(Chip8Error::RomTooLarge { size, max_size }) => {
                assert_eq!(size, 3585);
                assert_eq!(max_size, 3584);
            }
            _ => panic!("expected the rom to be rejected"),
        }
        assert!(chip8.state.memory[0x200..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_load_rom_reads_everything() {
        let mut chip8 = Chip8::new();
        let mut reader: &[u8] = &[0x00, 0xE0, 0x12, 0x00];
        chip8.load_rom(&mut reader).unwrap();
        assert_eq!(chip8.state.memory[0x200..0x204], [0x00, 0xE0, 0x12, 0x00]);
    }

    #[test]
    fn test_initialize_resets_everything() {
        let mut chip8 = with_program(&[0x61, 0x22]);
        chip8.step().unwrap();
        chip8.key_press(0x3);
        chip8.initialize();
        assert_eq!(chip8.state.pc, 0x200);
        assert_eq!(chip8.state.v, [0; 16]);
        assert_eq!(chip8.state.keys, [false; 16]);
        assert_eq!(chip8.state.memory[..80], SPRITE_SHEET[..]);
        assert!(chip8.state.memory[0x200..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_step_advances_pc() {
        let mut chip8 = with_program(&[0x00, 0xE0]);
        let starting_pc = chip8.state.pc;
        chip8.step().unwrap();
        assert_eq!(chip8.state.pc, starting_pc + 0x2);
    }

    #[test]
    fn test_step_skips_unknown_opcode() {
        let mut chip8 = with_program(&[0x50, 0x01, 0x61, 0x22]);
        chip8.state.v[0x0] = 0x9;
        chip8.step().unwrap();
        assert_eq!(chip8.state.pc, 0x202);
        assert_eq!(chip8.state.v[0x0], 0x9);
        chip8.step().unwrap();
        assert_eq!(chip8.state.v[0x1], 0x22);
    }

    #[test]
    fn test_step_reports_stack_underflow() {
        let mut chip8 = with_program(&[0x00, 0xEE]);
        assert!(matches!(
            chip8.step(),
            Err(Chip8Error::StackUnderflow { address: 0x200 })
        ));
        assert_eq!(chip8.state.pc, 0x202);
        assert!(chip8.previous_states.is_empty());
    }

    #[test]
    fn test_step_reports_stack_overflow() {
        // 0x200: call 0x200, forever
        let mut chip8 = with_program(&[0x22, 0x00]);
        for _ in 0..16 {
            chip8.step().unwrap();
        }
        assert!(matches!(
            chip8.step(),
            Err(Chip8Error::StackOverflow { .. })
        ));
    }

    #[test]
    fn test_key_wait_blocks_until_pressed() {
        // F10A; 6233
        let mut chip8 = with_program(&[0xF1, 0x0A, 0x62, 0x33]);
        for _ in 0..5 {
            chip8.step().unwrap();
            assert_eq!(chip8.state.pc, 0x200);
        }
        chip8.key_press(0x7);
        chip8.key_press(0x3);
        chip8.step().unwrap();
        assert_eq!(chip8.state.v[0x1], 0x3);
        assert_eq!(chip8.state.pc, 0x202);
        chip8.step().unwrap();
        assert_eq!(chip8.state.pc, 0x204);
    }

    #[test]
    fn test_timers_run_while_waiting_for_key() {
        let mut chip8 = with_program(&[0xF1, 0x0A]);
        chip8.state.delay_timer = 5;
        let start = Instant::now();
        for ms in 0..=200 {
            chip8.step_at(start + Duration::from_millis(ms)).unwrap();
        }
        assert_eq!(chip8.state.delay_timer, 0);
    }

    #[test]
    fn test_delay_timer_counts_down_with_wall_clock() {
        // 0x200: jump 0x200
        let mut chip8 = with_program(&[0x12, 0x00]);
        chip8.state.delay_timer = 5;
        let start = Instant::now();
        let mut previous = chip8.state.delay_timer;
        for ms in (0..=200).step_by(2) {
            chip8.step_at(start + Duration::from_millis(ms)).unwrap();
            assert!(chip8.state.delay_timer <= previous);
            previous = chip8.state.delay_timer;
        }
        assert_eq!(chip8.state.delay_timer, 0);
    }

    #[test]
    fn test_timers_ignore_step_rate() {
        let mut chip8 = with_program(&[0x12, 0x00]);
        chip8.state.delay_timer = 100;
        let start = Instant::now();
        // a thousand steps in the same instant don't tick the timer
        for _ in 0..1000 {
            chip8.step_at(start).unwrap();
        }
        assert_eq!(chip8.state.delay_timer, 100);
        chip8.step_at(start + TIMER_PERIOD * 2).unwrap();
        assert_eq!(chip8.state.delay_timer, 98);
    }

    #[test]
    fn test_sound_active_follows_sound_timer() {
        // V0 = 2; ST = V0; jump 0x204
        let mut chip8 = with_program(&[0x60, 0x02, 0xF0, 0x18, 0x12, 0x04]);
        let start = Instant::now();
        chip8.step_at(start).unwrap();
        chip8.step_at(start).unwrap();
        assert!(chip8.sound_active());
        chip8.step_at(start + TIMER_PERIOD * 2).unwrap();
        assert!(!chip8.sound_active());
    }

    #[test]
    fn test_take_frame_clears_draw_flag() {
        // draw the 0 glyph at (0, 0)
        let mut chip8 = with_program(&[0xD0, 0x05]);
        assert!(chip8.take_frame().is_none());
        chip8.step().unwrap();
        let frame = chip8.take_frame().unwrap();
        assert_eq!(frame[0][0..4], [1, 1, 1, 1]);
        assert!(chip8.take_frame().is_none());
    }

    #[test]
    fn test_keys_out_of_range_are_ignored() {
        let mut chip8 = Chip8::new();
        chip8.key_press(0x10);
        assert_eq!(chip8.state.keys, [false; 16]);
        chip8.key_press(0xF);
        assert!(chip8.state.keys[0xF]);
        chip8.key_release(0xF);
        assert!(!chip8.state.keys[0xF]);
    }

    #[test]
    fn test_rewind_restores_previous_state() {
        let mut chip8 = with_program(&[0x61, 0x22, 0x62, 0x33]);
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.state.v[0x2], 0x33);
        chip8.rewind();
        assert_eq!(chip8.state.v[0x2], 0x0);
        assert_eq!(chip8.state.pc, 0x202);
        chip8.rewind();
        assert_eq!(chip8.state.pc, 0x200);
        // nothing left to rewind
        chip8.rewind();
        assert_eq!(chip8.state.pc, 0x200);
    }

    #[test]
    fn test_rewind_keeps_live_keys() {
        let mut chip8 = with_program(&[0x61, 0x22, 0x62, 0x33]);
        chip8.key_press(0x5);
        chip8.step().unwrap();
        chip8.step().unwrap();
        chip8.key_release(0x5);
        chip8.key_press(0x9);
        chip8.rewind();
        assert_eq!(chip8.state.pc, 0x202);
        assert!(!chip8.state.keys[0x5]);
        assert!(chip8.state.keys[0x9]);
    }

    #[test]
    fn test_random_numbers_advance_between_calls() {
        // V1 = rand; V2 = rand
        let program = [0xC1, 0xFF, 0xC2, 0xFF];
        let mut chip8 = with_program(&program);
        chip8.step().unwrap();
        chip8.step().unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        let expected: [u8; 2] = [rng.gen(), rng.gen()];
        assert_eq!([chip8.state.v[0x1], chip8.state.v[0x2]], expected);

        let mut replay = with_program(&program);
        replay.step().unwrap();
        replay.step().unwrap();
        assert_eq!(replay.state.v[0x1..=0x2], chip8.state.v[0x1..=0x2]);
    }

    #[test]
    fn test_chip8_drops_old_saved_states() {
        let mut chip8 = Chip8::new();
        for _ in 0..MAX_SAVED_STATES {
            chip8.save_state(chip8.state);
        }
        assert_eq!(MAX_SAVED_STATES, chip8.previous_states.len());
        chip8.save_state(chip8.state);
        assert_eq!(MAX_SAVED_STATES, chip8.previous_states.len());
    }
}
