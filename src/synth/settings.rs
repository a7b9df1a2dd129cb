//! Shared keyed parameter store
//!
//! All channel-scoped performance parameters live in one table addressed by
//! (parameter, part) so that MIDI handlers, SysEx-style bulk updates and the
//! synthesis path read the same source of truth regardless of Part object
//! lifetime. The global key shift is a system parameter read through the
//! same handle; parts never alias it by reference.
//!
//! Reads and writes copy plain bytes under a `parking_lot::RwLock`; guards
//! are held only for the copy, never across synthesis.

use parking_lot::RwLock;

/// Number of parts addressable in the table.
pub const NUM_PARTS: usize = 16;

/// Neutral value for 0x40-centered offset parameters.
pub const CENTER: u8 = 0x40;

/// Per-part parameter identifiers.
///
/// Values follow the factory defaults of the SC-55: 0x40-centered fields are
/// offsets applied on top of instrument data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum PartParam {
    /// MIDI channel the part listens on [0-15]
    RxChannel,
    /// Part level [0-127], factory preset 100
    Level,
    /// Pan position [0-127], 0x40 = center
    Panpot,
    /// Reverb send level [0-127]
    ReverbSend,
    /// Chorus send level [0-127]
    ChorusSend,
    /// Key shift in semitones, 0x40 = no shift
    KeyShift,
    /// Pitch bend range in semitones [0-24]
    BendRange,
    /// Mod wheel vibrato depth [0-127]
    ModDepth,
    /// Lowest key the part responds to
    KeyRangeLow,
    /// Highest key the part responds to
    KeyRangeHigh,
    /// Velocity sensitivity depth, 0x40 = neutral
    VelSenseDepth,
    /// Velocity sensitivity offset, 0x40 = neutral
    VelSenseOffset,
    /// Vibrato rate offset
    VibratoRate,
    /// Vibrato depth offset
    VibratoDepth,
    /// Vibrato onset delay offset
    VibratoDelay,
    /// Filter cutoff offset
    CutoffFreq,
    /// Filter resonance offset
    Resonance,
    /// Envelope attack time offset
    EnvAttack,
    /// Envelope decay time offset
    EnvDecay,
    /// Envelope release time offset
    EnvRelease,
    /// 1 = polyphonic, 0 = mono
    PolyMode,
    /// Partial reserve budget [0-24]
    PartialReserve,
    /// Portamento on/off
    Portamento,
    /// Portamento time [0-127], 0 is slowest
    PortamentoTime,
    /// 0 = normal part, 1 = drum set 1, 2 = drum set 2
    UseForRhythm,
}

const NUM_PART_PARAMS: usize = PartParam::UseForRhythm as usize + 1;

/// System-wide parameter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum SystemParam {
    /// Master volume [0-127]
    Volume,
    /// Master pan, 0x40 = center
    Pan,
    /// Global key shift applied on top of every part's own, 0x40 = none
    KeyShift,
}

const NUM_SYSTEM_PARAMS: usize = SystemParam::KeyShift as usize + 1;

struct Table {
    system: [u8; NUM_SYSTEM_PARAMS],
    parts: [[u8; NUM_PART_PARAMS]; NUM_PARTS],
}

impl Table {
    fn part_defaults(part: usize) -> [u8; NUM_PART_PARAMS] {
        let mut p = [0u8; NUM_PART_PARAMS];
        p[PartParam::RxChannel as usize] = part as u8;
        p[PartParam::Level as usize] = 0x64;
        p[PartParam::Panpot as usize] = CENTER;
        p[PartParam::ReverbSend as usize] = 0x28;
        p[PartParam::ChorusSend as usize] = 0x00;
        p[PartParam::KeyShift as usize] = CENTER;
        p[PartParam::BendRange as usize] = 2;
        p[PartParam::ModDepth as usize] = 0x0A;
        p[PartParam::KeyRangeLow as usize] = 0x00;
        p[PartParam::KeyRangeHigh as usize] = 0x7F;
        p[PartParam::VelSenseDepth as usize] = CENTER;
        p[PartParam::VelSenseOffset as usize] = CENTER;
        p[PartParam::VibratoRate as usize] = CENTER;
        p[PartParam::VibratoDepth as usize] = CENTER;
        p[PartParam::VibratoDelay as usize] = CENTER;
        p[PartParam::CutoffFreq as usize] = CENTER;
        p[PartParam::Resonance as usize] = CENTER;
        p[PartParam::EnvAttack as usize] = CENTER;
        p[PartParam::EnvDecay as usize] = CENTER;
        p[PartParam::EnvRelease as usize] = CENTER;
        p[PartParam::PolyMode as usize] = 1;
        p[PartParam::PortamentoTime as usize] = 0;

        // Part 1 carries the big voice reserve; parts 11-16 get none.
        p[PartParam::PartialReserve as usize] = match part {
            0 => 6,
            1..=9 => 2,
            _ => 0,
        };

        // MIDI channel 10 defaults to rhythm mode (GS convention)
        if p[PartParam::RxChannel as usize] == 9 {
            p[PartParam::UseForRhythm as usize] = 1;
        }

        p
    }

    fn defaults() -> Self {
        let mut system = [0u8; NUM_SYSTEM_PARAMS];
        system[SystemParam::Volume as usize] = 0x7F;
        system[SystemParam::Pan as usize] = CENTER;
        system[SystemParam::KeyShift as usize] = CENTER;

        let mut parts = [[0u8; NUM_PART_PARAMS]; NUM_PARTS];
        for (i, p) in parts.iter_mut().enumerate() {
            *p = Self::part_defaults(i);
        }

        Table { system, parts }
    }
}

/// Shared parameter store, one instance per engine.
///
/// Cloneable handles are made by wrapping in `Arc`; every part receives the
/// same store at construction.
pub struct Settings {
    table: RwLock<Table>,
    sample_rate: u32,
}

impl Settings {
    /// Create a store with factory defaults at the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Settings {
            table: RwLock::new(Table::defaults()),
            sample_rate,
        }
    }

    /// Engine operating sample rate in Hz. Fixed for the store's lifetime.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Read a per-part parameter. Out-of-range parts read as 0.
    pub fn get(&self, param: PartParam, part: u8) -> u8 {
        self.table
            .read()
            .parts
            .get(part as usize)
            .map_or(0, |p| p[param as usize])
    }

    /// Write a per-part parameter. Out-of-range parts are ignored.
    pub fn set(&self, param: PartParam, part: u8, value: u8) {
        if let Some(p) = self.table.write().parts.get_mut(part as usize) {
            p[param as usize] = value;
        }
    }

    /// Read a system parameter.
    pub fn get_system(&self, param: SystemParam) -> u8 {
        self.table.read().system[param as usize]
    }

    /// Write a system parameter.
    pub fn set_system(&self, param: SystemParam, value: u8) {
        self.table.write().system[param as usize] = value;
    }

    /// Restore one part's parameters to factory defaults.
    pub fn reset_part(&self, part: u8) {
        if let Some(p) = self.table.write().parts.get_mut(part as usize) {
            *p = Table::part_defaults(part as usize);
        }
    }

    /// Restore every parameter to factory defaults.
    pub fn reset(&self) {
        *self.table.write() = Table::defaults();
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
