//! Low frequency oscillator for vibrato
//!
//! Every Sound Canvas note carries a sine LFO whose rate comes from the
//! instrument definition plus the part's vibrato-rate offset. The oscillator
//! stays silent for a configurable onset delay and then fades in, which is
//! what makes held string/organ patches bloom instead of wobbling from the
//! first sample. Depth is applied by the caller (mod wheel times mod depth).

use std::f32::consts::TAU;

/// Seconds of onset delay at the maximum 7-bit delay value.
const MAX_DELAY_SEC: f32 = 2.5;
/// Fade-in time once the delay has elapsed.
const FADE_SEC: f32 = 0.3;

/// Phase-accumulating sine LFO with onset delay and fade-in.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f32,
    step: f32,
    sample_rate: f32,
    delay_samples: u32,
    fade_samples: u32,
    index: u32,
    value: f32,
}

impl Lfo {
    /// Create an LFO from 7-bit rate and delay values.
    pub fn new(rate: u8, delay: u8, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let mut lfo = Lfo {
            phase: 0.0,
            step: 0.0,
            sample_rate,
            delay_samples: ((delay as f32 / 127.0) * MAX_DELAY_SEC * sample_rate) as u32,
            fade_samples: (FADE_SEC * sample_rate) as u32,
            index: 0,
            value: 0.0,
        };
        lfo.set_rate(rate);
        lfo
    }

    /// Update the oscillation rate. Only the rate may change after note
    /// start; delay and fade are fixed at creation.
    pub fn set_rate(&mut self, rate: u8) {
        // 7-bit rate maps to 0..12.7 Hz, factory vibrato sits around 4-5 Hz
        let freq = rate as f32 * 0.1;
        self.step = freq / self.sample_rate;
    }

    /// Advance one sample and return the LFO value in [-1, 1], scaled by
    /// the onset envelope.
    pub fn next(&mut self) -> f32 {
        self.index = self.index.saturating_add(1);
        if self.index < self.delay_samples {
            self.value = 0.0;
            return 0.0;
        }

        self.phase += self.step;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let fade = if self.fade_samples == 0 {
            1.0
        } else {
            ((self.index - self.delay_samples) as f32 / self.fade_samples as f32).min(1.0)
        };

        self.value = (self.phase * TAU).sin() * fade;
        self.value
    }

    /// Last value produced by [`Lfo::next`].
    pub fn value(&self) -> f32 {
        self.value
    }
}
