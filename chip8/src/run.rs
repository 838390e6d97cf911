use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;

use frontend::{Beeper, Display};
use vm::Chip8;

use crate::keymap::keymap;

/// Host frames are paced at 60Hz
const FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Drives a loaded Chip-8 until the window is closed or Escape is pressed.
///
/// Each frame runs `cycles_per_frame` steps (or rewinds while Backspace is held),
/// renders if the frame buffer changed, and beeps while the sound timer runs.
/// Holding Space skips the frame sleep.
pub fn run(mut chip8: Chip8, cycles_per_frame: u32, scale: u32) -> Result<()> {
    let sdl = sdl2::init().map_err(|e| anyhow!("unable to initialise SDL: {}", e))?;
    let mut display = Display::new(&sdl, scale).map_err(|e| anyhow!("unable to open window: {}", e))?;
    let mut beeper = Beeper::new(&sdl).map_err(|e| anyhow!("unable to open audio: {}", e))?;
    let mut events = sdl
        .event_pump()
        .map_err(|e| anyhow!("unable to poll events: {}", e))?;

    // Whether or not the frame rate should be respected
    let mut fast_forward: bool = false;
    // Whether the game's state should be cycled forwards or backwards
    let mut rewind: bool = false;

    'event: loop {
        let frame_start = Instant::now();

        for event in events.poll_iter() {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'event,
                Event::KeyDown {
                    keycode: Some(key), ..
                } => match (key, keymap(key)) {
                    (_, Some(kc)) => chip8.key_press(kc),
                    (Keycode::Space, _) => fast_forward = true,
                    (Keycode::Backspace, _) => rewind = true,
                    _ => continue,
                },
                Event::KeyUp {
                    keycode: Some(key), ..
                } => match (key, keymap(key)) {
                    (_, Some(kc)) => chip8.key_release(kc),
                    (Keycode::Space, _) => fast_forward = false,
                    (Keycode::Backspace, _) => rewind = false,
                    _ => continue,
                },
                _ => continue,
            };
        }

        for _ in 0..cycles_per_frame {
            if rewind {
                chip8.rewind();
            } else if let Err(e) = chip8.step() {
                log::error!("halting at pc {:04X}: {}", chip8.state().pc, e);
                beeper.silence();
                return Err(e.into());
            }
        }

        // A rewind can land on a different picture without a draw
        if rewind {
            display
                .render(&chip8.state().frame_buffer)
                .map_err(|e| anyhow!("unable to render: {}", e))?;
        } else if let Some(frame) = chip8.take_frame() {
            display
                .render(&frame)
                .map_err(|e| anyhow!("unable to render: {}", e))?;
        }

        if chip8.sound_active() {
            beeper.beep();
        } else {
            beeper.silence();
        }

        let elapsed = frame_start.elapsed();
        if !fast_forward && FRAME_DURATION > elapsed {
            std::thread::sleep(FRAME_DURATION - elapsed);
        }
    }

    beeper.silence();
    Ok(())
}
