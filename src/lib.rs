//! Roland SC-55 Sound Canvas synthesis core
//!
//! Emulates the synthesis engine of the Roland Sound Canvas family of
//! wavetable MIDI modules. Two halves make up the core:
//!
//! - PCM ROM decoding: reversing the bit-scrambling applied to the wave ROM
//!   dumps, reconstructing waveforms from their differential (DPCM) encoding
//!   and unwrapping ping-pong loop regions into forward loops.
//! - Per-channel runtime ("Part"): turning MIDI channel voice/mode messages
//!   into a managed population of sounding notes and mixing them into one
//!   peak-metered stereo frame per call, under a hard real-time deadline.
//!
//! The instrument/drum/sample metadata normally read out of the control ROM
//! is supplied pre-parsed as a [`rom::ControlTable`]; GUI, audio output and
//! MIDI transport live outside this crate.
//!
//! # Quick start
//! ```no_run
//! use std::sync::Arc;
//! use sc55::rom::{ControlTable, PcmRom};
//! use sc55::synth::{Part, Settings};
//!
//! let table = Arc::new(ControlTable::default());
//! let pcm = Arc::new(PcmRom::load(&["waverom1.bin".into()], &table).unwrap());
//! let settings = Arc::new(Settings::new(44_100));
//!
//! let mut part = Part::new(0, settings, table, pcm);
//! part.add_note(60, 100);
//!
//! let mut frame = [0.0f32; 2];
//! part.get_next_sample(&mut frame);
//! ```

#![warn(missing_docs)]

pub mod monitor;
pub mod rom;
pub mod synth;

/// Error types for the SC-55 emulation core.
///
/// Only ROM loading and decoding can fail; runtime MIDI handling follows a
/// clamp-or-drop discipline and never raises errors on the audio path.
#[derive(thiserror::Error, Debug)]
pub enum Sc55Error {
    /// IO error from the filesystem while reading a ROM dump
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No PCM ROM file was specified
    #[error("no PCM ROM file specified")]
    NoRomFiles,

    /// A ROM dump had an invalid size
    #[error("incorrect file size of PCM ROM file {path}: {size} bytes is not a multiple of 1 MiB")]
    RomSize {
        /// Offending file path
        path: String,
        /// Actual file size in bytes
        size: u64,
    },

    /// A sample's declared address selects a bank id the hardware never uses
    #[error("unknown bank id {0:#x} in sample address")]
    UnknownBank(u32),

    /// A sample's data extends past the end of the loaded ROM image
    #[error("sample data at address {0:#x} is outside the loaded ROM image")]
    SampleOutOfRange(u32),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Sc55Error>;

// Public API exports
pub use rom::{ControlTable, PcmRom, SampleSet};
pub use synth::{Part, Settings};
