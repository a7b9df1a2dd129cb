//! PCM ROM decoding domain
//!
//! Loads the scrambled wave ROM dumps of the Sound Canvas, reverses the
//! hardware bit permutations and reconstructs playable waveforms from the
//! differential sample encoding. Decoding is a one-time startup step; the
//! resulting [`SampleSet`]s are immutable and shared read-only with every
//! sounding note.

pub mod decoder;
pub mod metadata;

pub use decoder::{PcmRom, SampleSet};
pub use metadata::{
    ControlTable, DrumSet, InstrumentInfo, LoopMode, PartialFlags, PartialInfo, SampleInfo,
    SynthGen,
};
