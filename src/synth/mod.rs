//! Synthesis runtime: parts, notes, envelopes and shared settings
//!
//! The host drives one [`Part`] per MIDI channel. Parts pull instrument and
//! drum definitions from the control table, waveforms from the decoded PCM
//! ROM and channel configuration from the shared [`Settings`] store, and
//! render stereo frames on the audio thread without allocating.

pub mod envelope;
pub mod lfo;
pub mod note;
pub mod note_pool;
pub mod part;
pub mod settings;

pub use envelope::{Ahdsr, EnvelopePhase, PhaseSpec};
pub use lfo::Lfo;
pub use note::{EnvOffsets, Note, RenderParams, Voice};
pub use note_pool::NotePool;
pub use part::{Controller, Part};
pub use settings::{PartParam, Settings, SystemParam, CENTER, NUM_PARTS};
