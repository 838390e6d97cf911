use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

const BEEP_PITCH: f32 = 440.0;
const BEEP_VOLUME: f32 = 0.05;

/// Square wave generator fed to the SDL audio thread
pub struct SquareWave {
    phase_inc: f32,
    phase: f32,
    volume: f32,
}

impl SquareWave {
    fn new(pitch: f32, sample_rate: i32, volume: f32) -> Self {
        SquareWave {
            phase_inc: pitch / sample_rate as f32,
            phase: 0.0,
            volume,
        }
    }
}

impl AudioCallback for SquareWave {
    type Channel = f32;

    fn callback(&mut self, out: &mut [Self::Channel]) {
        for sample in out.iter_mut() {
            self.phase = (self.phase + self.phase_inc) % 1.0;
            *sample = if self.phase < 0.5 {
                self.volume
            } else {
                -self.volume
            };
        }
    }
}

/// # Beeper
/// The Chip-8 has a single fixed tone that plays while its sound timer is running.
/// The host calls `beep` once per frame while it should be heard and `silence` otherwise.
pub struct Beeper {
    device: AudioDevice<SquareWave>,
    playing: bool,
}

impl Beeper {
    /// Opens a mono playback device on an sdl2 context.
    ///
    /// # Arguments
    /// * `sdl` an sdl2 context with which to play sound
    pub fn new(sdl: &sdl2::Sdl) -> Result<Self, String> {
        let audio_subsystem = sdl.audio()?;
        let spec = AudioSpecDesired {
            freq: Some(44_100),
            channels: Some(1),
            samples: None,
        };
        let device = audio_subsystem.open_playback(None, &spec, |spec| {
            SquareWave::new(BEEP_PITCH, spec.freq, BEEP_VOLUME)
        })?;

        Ok(Beeper {
            device,
            playing: false,
        })
    }

    pub fn beep(&mut self) {
        if !self.playing {
            self.device.resume();
            self.playing = true;
        }
    }

    pub fn silence(&mut self) {
        if self.playing {
            self.device.pause();
            self.playing = false;
        }
    }
}
