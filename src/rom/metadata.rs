//! Pre-parsed control-table metadata
//!
//! The Sound Canvas keeps its instrument definitions, drum sets and wave ROM
//! sample descriptors in a separate control ROM. Parsing that ROM is outside
//! this crate; hosts supply the result as a [`ControlTable`], typically
//! deserialized from JSON. All types here are plain read-only data.

use serde::{Deserialize, Serialize};

/// Table slot value marking an empty program or silent drum key.
pub const EMPTY_SLOT: u16 = 0xFFFF;

/// Synthesizer hardware generation.
///
/// The generation decides how the top bits of a sample address map onto
/// physical ROM banks: the SC-55 and SC-88 share a bank layout while the
/// SC-55mkII carries a third, distinct bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SynthGen {
    /// Original SC-55
    #[default]
    Sc55,
    /// SC-55mkII
    Sc55Mk2,
    /// SC-88
    Sc88,
}

/// Loop mode of a wave ROM sample.
///
/// Ping-pong only exists in the encoded ROM; the decoder unwraps it into an
/// equivalent forward loop, so a decoded [`super::SampleSet`] is never
/// ping-pong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Loop the tail region forward
    #[default]
    Forward,
    /// Play forward then backward repeatedly
    PingPong,
    /// Play once, no loop
    OneShot,
}

/// Wave ROM descriptor for one sample, as declared in the control ROM.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Declared ROM address; the top 3 bits select the logical bank
    pub address: u32,
    /// Number of encoded deltas minus one (the decode loop is inclusive)
    pub sample_len: u32,
    /// Loop length in samples (loop covers the last `loop_len + 1` samples)
    pub loop_len: u32,
    /// Loop mode as stored in ROM
    pub loop_mode: LoopMode,
    /// MIDI key at which the sample plays at its recorded pitch
    pub root_key: u8,
    /// Fine pitch correction in cents
    pub pitch: i16,
}

bitflags::bitflags! {
    /// Which of an instrument's two partials are populated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct PartialFlags: u8 {
        /// First partial is live
        const PARTIAL_1 = 0b01;
        /// Second partial is live
        const PARTIAL_2 = 0b10;
    }
}

/// One partial of an instrument: a sample reference plus envelope timing.
///
/// Envelope fields are 7-bit ROM values; 0x40 offsets from the part's
/// settings are applied on top at note start.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PartialInfo {
    /// Index into [`ControlTable::samples`]
    pub sample_index: u16,
    /// Coarse pitch offset in semitones
    pub coarse_pitch: i8,
    /// Attack time
    pub attack: u8,
    /// Hold time
    pub hold: u8,
    /// Decay time
    pub decay: u8,
    /// Sustain level, 0x7F = full scale
    pub sustain_level: u8,
    /// Release time
    pub release: u8,
}

impl Default for PartialInfo {
    fn default() -> Self {
        PartialInfo {
            sample_index: 0,
            coarse_pitch: 0,
            attack: 0,
            hold: 0,
            decay: 0x40,
            sustain_level: 0x7F,
            release: 0x20,
        }
    }
}

/// One instrument (tone) definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Display name from the control ROM
    pub name: String,
    /// Bitset of populated partials
    pub partials_used: PartialFlags,
    /// Partial definitions; only the flagged entries are meaningful
    pub partials: [PartialInfo; 2],
    /// LFO-1 rate (vibrato), shared by both partials
    pub lfo_rate: u8,
    /// LFO-1 onset delay
    pub lfo_delay: u8,
}

/// One drum set: a key-indexed instrument preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrumSet {
    /// Display name from the control ROM
    pub name: String,
    /// 128 entries mapping MIDI key to instrument index; `EMPTY_SLOT` keys
    /// are silent
    pub preset: Vec<u16>,
}

impl DrumSet {
    /// Instrument index assigned to a MIDI key, if any.
    pub fn instrument_for_key(&self, key: u8) -> Option<u16> {
        match self.preset.get(key as usize).copied() {
            Some(EMPTY_SLOT) | None => None,
            some => some,
        }
    }
}

/// The full pre-parsed control-ROM table consumed by the decoder and parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlTable {
    /// Hardware generation the wave ROM belongs to
    pub generation: SynthGen,
    /// Variation banks: `variations[bank][program]` is an instrument index
    /// or `EMPTY_SLOT`
    pub variations: Vec<Vec<u16>>,
    /// Drum sets addressable from rhythm parts
    pub drum_sets: Vec<DrumSet>,
    /// Instrument definitions
    pub instruments: Vec<InstrumentInfo>,
    /// Wave ROM sample descriptors, decoded in order by [`super::PcmRom`]
    pub samples: Vec<SampleInfo>,
}

impl ControlTable {
    /// Resolve a (bank, program) pair to an instrument index.
    ///
    /// Returns `None` for out-of-range banks/programs and for empty slots.
    pub fn variation(&self, bank: u8, program: u8) -> Option<u16> {
        match self
            .variations
            .get(bank as usize)
            .and_then(|b| b.get(program as usize))
            .copied()
        {
            Some(EMPTY_SLOT) | None => None,
            some => some,
        }
    }

    /// Drum set by index.
    pub fn drum_set(&self, index: u8) -> Option<&DrumSet> {
        self.drum_sets.get(index as usize)
    }

    /// Instrument definition by index.
    pub fn instrument(&self, index: u16) -> Option<&InstrumentInfo> {
        self.instruments.get(index as usize)
    }

    /// Sample descriptor by index.
    pub fn sample(&self, index: u16) -> Option<&SampleInfo> {
        self.samples.get(index as usize)
    }
}
