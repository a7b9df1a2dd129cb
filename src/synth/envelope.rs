//! AHDSR amplitude envelope
//!
//! Phase sequence is Attack → Hold → Decay → Sustain → Release → Done.
//! Sustain holds indefinitely (unless its level is zero) until an external
//! stop enters Release; `force_done` is the immediate termination used for
//! "all notes off" and mono-mode voice stealing. Phase durations are 7-bit
//! ROM-style time values shortened toward the top of the keyboard, and each
//! phase interpolates linearly or logarithmically toward its target level.

/// Envelope life-cycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopePhase {
    /// Rising from silence at note start
    Attack,
    /// Holding peak level
    Hold,
    /// Falling toward the sustain level
    Decay,
    /// Holding the sustain level until stopped
    Sustain,
    /// Falling to silence after a stop
    Release,
    /// Finished; the owning voice is removed on the next synthesis call
    Done,
}

/// Target level, duration and interpolation shape for one phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSpec {
    /// Level reached at the end of the phase, 0.0-1.0
    pub target: f32,
    /// 7-bit time value, already offset-adjusted and clamped by the caller
    pub duration: u8,
    /// Logarithmic (convex) interpolation instead of linear
    pub log_shape: bool,
}

/// Convert a 7-bit time value to seconds.
///
/// Exponential sweep from 1 ms at 0 to 10 s at 127.
fn time_to_sec(value: u8) -> f32 {
    0.001 * 10_000f32.powf(value as f32 / 127.0)
}

/// AHDSR envelope generator, one per voice.
#[derive(Debug, Clone)]
pub struct Ahdsr {
    phases: [PhaseSpec; 5],
    sample_rate: u32,
    /// Key scaling shortens phases for higher keys; disabled for drums
    key: Option<u8>,

    phase: EnvelopePhase,
    current: f32,
    phase_init_value: f32,
    phase_len: u32,
    phase_index: u32,
}

impl Ahdsr {
    /// Create an envelope from per-phase specs, indexed
    /// Attack/Hold/Decay/Sustain/Release.
    ///
    /// `key` enables keyboard scaling of phase times; drums pass `None`.
    pub fn new(phases: [PhaseSpec; 5], key: Option<u8>, sample_rate: u32) -> Self {
        let mut env = Ahdsr {
            phases,
            sample_rate,
            key,
            phase: EnvelopePhase::Attack,
            current: 0.0,
            phase_init_value: 0.0,
            phase_len: 0,
            phase_index: 0,
        };
        env.init_phase(EnvelopePhase::Attack);
        env
    }

    /// Current phase.
    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Whether the envelope has reached its terminal phase.
    pub fn is_done(&self) -> bool {
        self.phase == EnvelopePhase::Done
    }

    fn spec_index(phase: EnvelopePhase) -> usize {
        match phase {
            EnvelopePhase::Attack => 0,
            EnvelopePhase::Hold => 1,
            EnvelopePhase::Decay => 2,
            EnvelopePhase::Sustain => 3,
            EnvelopePhase::Release => 4,
            EnvelopePhase::Done => 4,
        }
    }

    fn init_phase(&mut self, phase: EnvelopePhase) {
        self.phase_init_value = self.current;

        let spec = &self.phases[Self::spec_index(phase)];
        let sec = match self.key {
            Some(key) => time_to_sec(spec.duration) * (1.0 - key as f32 / 128.0),
            None => time_to_sec(spec.duration),
        };

        self.phase_len = (sec * self.sample_rate as f32).round() as u32;
        self.phase_index = 0;
        self.phase = phase;
    }

    /// Advance one sample and return the envelope level.
    pub fn next(&mut self) -> f32 {
        match self.phase {
            EnvelopePhase::Attack => {
                if self.phase_index > self.phase_len {
                    self.init_phase(EnvelopePhase::Hold);
                }
            }
            EnvelopePhase::Hold => {
                if self.phase_index > self.phase_len {
                    self.init_phase(EnvelopePhase::Decay);
                }
            }
            EnvelopePhase::Decay => {
                if self.phase_index > self.phase_len {
                    self.init_phase(EnvelopePhase::Sustain);
                }
            }
            EnvelopePhase::Sustain => {
                if self.phase_index > self.phase_len {
                    // A zero sustain level can never be heard again, so the
                    // note ends itself instead of waiting for a stop
                    if self.phases[Self::spec_index(EnvelopePhase::Sustain)].target == 0.0 {
                        self.init_phase(EnvelopePhase::Release);
                    } else {
                        return self.current;
                    }
                }
            }
            EnvelopePhase::Release => {
                if self.phase_index > self.phase_len {
                    self.phase = EnvelopePhase::Done;
                    self.current = 0.0;
                    return 0.0;
                }
            }
            EnvelopePhase::Done => return 0.0,
        }

        let spec = &self.phases[Self::spec_index(self.phase)];
        if self.phase_len == 0 {
            self.current = spec.target;
        } else {
            let progress = self.phase_index as f32 / self.phase_len as f32;
            let shaped = if spec.log_shape {
                ((10.0 * progress + 1.0).ln()) / 11f32.ln()
            } else {
                progress
            };
            self.current = self.phase_init_value + (spec.target - self.phase_init_value) * shaped;
        }

        self.phase_index += 1;
        self.current
    }

    /// Enter the Release phase from wherever the envelope currently is.
    pub fn release(&mut self) {
        if self.phase == EnvelopePhase::Release || self.phase == EnvelopePhase::Done {
            return;
        }
        self.init_phase(EnvelopePhase::Release);
    }

    /// Terminate immediately, bypassing Release.
    pub fn force_done(&mut self) {
        self.phase = EnvelopePhase::Done;
        self.current = 0.0;
    }
}
