//! Sounding notes and their partial voices
//!
//! A [`Note`] is one key press: up to two [`Voice`]s (one per instrument
//! partial), a shared vibrato LFO and a shaped velocity. Each voice walks a
//! decoded [`SampleSet`] with linear interpolation, wraps forward loops and
//! runs its own AHDSR envelope. Notes produce one mono sample per call; the
//! owning part applies level and pan.

use std::sync::Arc;

use crate::rom::metadata::{LoopMode, PartialInfo};
use crate::rom::SampleSet;
use crate::synth::envelope::{Ahdsr, EnvelopePhase, PhaseSpec};
use crate::synth::lfo::Lfo;

const SCALE_7BIT: f32 = 1.0 / 127.0;

/// Part-level performance state sampled once per frame and consumed by
/// every active note.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    /// Pitch ratio from bend and key shift, 1.0 = neutral
    pub pitch_factor: f32,
    /// Combined part level, expression and master volume, 0.0-1.0
    pub volume: f32,
    /// Left channel pan gain
    pub pan_left: f32,
    /// Right channel pan gain
    pub pan_right: f32,
    /// Peak vibrato depth in semitones (mod wheel times mod depth)
    pub vibrato_depth: f32,
    /// Extra vibrato depth in semitones at full per-key pressure
    pub pressure_vibrato: f32,
    /// Part vibrato-rate offset applied to each note's own LFO rate,
    /// 0x40-centered
    pub vibrato_rate: u8,
}

impl Default for RenderParams {
    fn default() -> Self {
        RenderParams {
            pitch_factor: 1.0,
            volume: 1.0,
            pan_left: 0.5,
            pan_right: 0.5,
            vibrato_depth: 0.0,
            pressure_vibrato: 0.0,
            vibrato_rate: 0x40,
        }
    }
}

/// Envelope time offsets from the part settings, 0x40-centered.
#[derive(Debug, Clone, Copy)]
pub struct EnvOffsets {
    /// Attack/hold time offset
    pub attack: u8,
    /// Decay time offset
    pub decay: u8,
    /// Release time offset
    pub release: u8,
}

impl Default for EnvOffsets {
    fn default() -> Self {
        EnvOffsets {
            attack: 0x40,
            decay: 0x40,
            release: 0x40,
        }
    }
}

fn offset_duration(base: u8, offset: u8) -> u8 {
    (base as i16 + offset as i16 - 0x40).clamp(0, 127) as u8
}

/// One oscillator reading a shared sample set through an AHDSR envelope.
#[derive(Debug, Clone)]
pub struct Voice {
    sample_set: Arc<SampleSet>,
    cursor: f64,
    /// Playback step at neutral pitch: key vs root plus fine corrections
    step: f64,
    env: Ahdsr,
}

impl Voice {
    /// Bind a voice to a decoded sample set.
    ///
    /// `drum` disables envelope key scaling, matching the hardware's drum
    /// handling.
    pub fn new(
        sample_set: Arc<SampleSet>,
        key: u8,
        partial: &PartialInfo,
        offsets: EnvOffsets,
        sample_rate: u32,
        drum: bool,
    ) -> Self {
        let semitones = key as f64 + partial.coarse_pitch as f64 - sample_set.root_key as f64
            + sample_set.pitch as f64 / 100.0;
        let step = (semitones / 12.0).exp2();

        let sustain = partial.sustain_level as f32 * SCALE_7BIT;
        let phases = [
            PhaseSpec {
                target: 1.0,
                duration: offset_duration(partial.attack, offsets.attack),
                log_shape: true,
            },
            PhaseSpec {
                target: 1.0,
                duration: offset_duration(partial.hold, offsets.attack),
                log_shape: false,
            },
            PhaseSpec {
                target: sustain,
                duration: offset_duration(partial.decay, offsets.decay),
                log_shape: true,
            },
            PhaseSpec {
                target: sustain,
                duration: 127,
                log_shape: false,
            },
            PhaseSpec {
                target: 0.0,
                duration: offset_duration(partial.release, offsets.release),
                log_shape: true,
            },
        ];

        let env_key = if drum { None } else { Some(key) };

        Voice {
            sample_set,
            cursor: 0.0,
            step,
            env: Ahdsr::new(phases, env_key, sample_rate),
        }
    }

    /// Advance one sample. Returns `None` once the voice has finished.
    fn next(&mut self, pitch_factor: f64) -> Option<f32> {
        if self.env.is_done() {
            return None;
        }

        let amp = self.env.next();
        if self.env.is_done() {
            return None;
        }

        let len = self.sample_set.sample_len as f64;
        while self.cursor >= len {
            if self.sample_set.loop_mode == LoopMode::OneShot {
                self.env.force_done();
                return None;
            }
            // Forward loop spans the final loop_len + 1 samples
            self.cursor -= self.sample_set.loop_len as f64 + 1.0;
            if self.cursor < 0.0 {
                self.cursor = self.sample_set.loop_start as f64;
            }
        }

        // Guard sample keeps index + 1 in bounds for any cursor below len
        let index = self.cursor as usize;
        let frac = (self.cursor - index as f64) as f32;
        let a = self.sample_set.samples[index];
        let b = self.sample_set.samples[index + 1];
        let sample = a + (b - a) * frac;

        self.cursor += self.step * pitch_factor;

        Some(sample * amp)
    }

    fn phase(&self) -> EnvelopePhase {
        self.env.phase()
    }
}

/// One sounding key press on a part.
#[derive(Debug, Clone)]
pub struct Note {
    key: u8,
    velocity_amp: f32,
    voices: [Option<Voice>; 2],
    lfo: Lfo,
    lfo_rate: u8,
    pressure: u8,
}

impl Note {
    /// Assemble a note from its pre-built voices.
    ///
    /// Returns `None` when the instrument contributed no live partials (the
    /// hardware silently ignores such note-ons).
    pub fn new(
        key: u8,
        velocity_amp: f32,
        voices: [Option<Voice>; 2],
        lfo_rate: u8,
        lfo_delay: u8,
        sample_rate: u32,
    ) -> Option<Self> {
        if voices.iter().all(|v| v.is_none()) {
            return None;
        }

        Some(Note {
            key,
            velocity_amp,
            voices,
            lfo: Lfo::new(lfo_rate, lfo_delay, sample_rate),
            lfo_rate,
            pressure: 0,
        })
    }

    /// MIDI key this note sounds at.
    pub fn key(&self) -> u8 {
        self.key
    }

    /// Number of live partial voices.
    pub fn num_partials(&self) -> usize {
        self.voices.iter().flatten().count()
    }

    /// Per-key pressure from polyphonic aftertouch, deepening this note's
    /// vibrato.
    pub fn set_pressure(&mut self, value: u8) {
        self.pressure = value;
    }

    /// Envelope phase of the first live voice. Voices share their phase
    /// triggers, so this stands for the whole note.
    pub fn phase(&self) -> EnvelopePhase {
        self.voices
            .iter()
            .flatten()
            .map(Voice::phase)
            .next()
            .unwrap_or(EnvelopePhase::Done)
    }

    /// Whether every voice has finished.
    pub fn is_done(&self) -> bool {
        self.voices.iter().flatten().all(|v| v.env.is_done())
    }

    /// Enter Release on every voice (note-off without hold pedal).
    pub fn release(&mut self) {
        for voice in self.voices.iter_mut().flatten() {
            voice.env.release();
        }
    }

    /// Terminate every voice immediately, bypassing Release.
    pub fn force_done(&mut self) {
        for voice in self.voices.iter_mut().flatten() {
            voice.env.force_done();
        }
    }

    /// Advance one sample and return the note's mono contribution, already
    /// shaped by velocity. `None` once the note has finished.
    pub fn next(&mut self, params: &RenderParams) -> Option<f32> {
        let rate = (self.lfo_rate as i16 + params.vibrato_rate as i16 - 0x40).clamp(0, 127);
        self.lfo.set_rate(rate as u8);
        let depth =
            params.vibrato_depth + self.pressure as f32 * SCALE_7BIT * params.pressure_vibrato;
        let vibrato = self.lfo.next() * depth;

        // Pitch modulation combines bend/key-shift with the vibrato swing
        let pitch_factor = params.pitch_factor as f64 * (vibrato as f64 / 12.0).exp2();

        let mut sum = 0.0f32;
        let mut live = false;
        for voice in self.voices.iter_mut().flatten() {
            if let Some(sample) = voice.next(pitch_factor) {
                sum += sample;
                live = true;
            }
        }

        if !live && self.is_done() {
            return None;
        }

        Some(sum * self.velocity_amp)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    pub(crate) fn constant_sample_set(amplitude: f32, len: u32) -> Arc<SampleSet> {
        Arc::new(SampleSet {
            samples: vec![amplitude; len as usize + 1],
            sample_len: len,
            loop_start: 0,
            loop_len: len,
            loop_mode: LoopMode::Forward,
            root_key: 60,
            pitch: 0,
        })
    }

    fn snappy_partial() -> PartialInfo {
        PartialInfo {
            sample_index: 0,
            coarse_pitch: 0,
            attack: 0,
            hold: 0,
            decay: 0,
            sustain_level: 127,
            release: 0,
        }
    }

    fn one_voice_note(amplitude: f32) -> Note {
        let voice = Voice::new(
            constant_sample_set(amplitude, 64),
            60,
            &snappy_partial(),
            EnvOffsets::default(),
            44_100,
            false,
        );
        Note::new(60, 1.0, [Some(voice), None], 40, 0, 44_100).unwrap()
    }

    #[test]
    fn test_constant_waveform_reaches_full_amplitude() {
        let mut note = one_voice_note(0.25);
        let params = RenderParams::default();

        let mut peak = 0.0f32;
        for _ in 0..2000 {
            if let Some(s) = note.next(&params) {
                peak = peak.max(s.abs());
            }
        }
        assert_abs_diff_eq!(peak, 0.25, epsilon = 1e-4);
    }

    #[test]
    fn test_root_key_plays_at_unity_step() {
        let set = constant_sample_set(1.0, 64);
        let voice = Voice::new(
            set,
            60,
            &snappy_partial(),
            EnvOffsets::default(),
            44_100,
            false,
        );
        assert_abs_diff_eq!(voice.step, 1.0, epsilon = 1e-9);

        // One octave up doubles the playback step
        let up = Voice::new(
            constant_sample_set(1.0, 64),
            72,
            &snappy_partial(),
            EnvOffsets::default(),
            44_100,
            false,
        );
        assert_abs_diff_eq!(up.step, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_one_shot_voice_finishes_at_end() {
        let set = Arc::new(SampleSet {
            samples: vec![1.0; 17],
            sample_len: 16,
            loop_start: 16,
            loop_len: 0,
            loop_mode: LoopMode::OneShot,
            root_key: 60,
            pitch: 0,
        });
        let voice = Voice::new(
            set,
            60,
            &snappy_partial(),
            EnvOffsets::default(),
            44_100,
            false,
        );
        let mut note = Note::new(60, 1.0, [Some(voice), None], 40, 0, 44_100).unwrap();

        let params = RenderParams::default();
        let mut produced = 0;
        for _ in 0..64 {
            if note.next(&params).is_none() {
                break;
            }
            produced += 1;
        }
        assert!(note.is_done());
        assert!(produced <= 17, "one-shot kept producing: {} samples", produced);
    }

    #[test]
    fn test_release_ends_note() {
        let mut note = one_voice_note(1.0);
        let params = RenderParams::default();
        for _ in 0..100 {
            note.next(&params);
        }

        note.release();
        assert_eq!(note.phase(), EnvelopePhase::Release);
        for _ in 0..100 {
            note.next(&params);
        }
        assert!(note.is_done());
        assert!(note.next(&params).is_none());
    }

    #[test]
    fn test_force_done_is_immediate() {
        let mut note = one_voice_note(1.0);
        note.force_done();
        assert!(note.is_done());
        assert!(note.next(&RenderParams::default()).is_none());
    }

    #[test]
    fn test_empty_partials_make_no_note() {
        assert!(Note::new(60, 1.0, [None, None], 40, 0, 44_100).is_none());
    }

    #[test]
    fn test_two_partials_counted() {
        let mk = || {
            Voice::new(
                constant_sample_set(0.5, 64),
                60,
                &snappy_partial(),
                EnvOffsets::default(),
                44_100,
                false,
            )
        };
        let note = Note::new(60, 1.0, [Some(mk()), Some(mk())], 40, 0, 44_100).unwrap();
        assert_eq!(note.num_partials(), 2);
    }
}
