//! Part: one MIDI channel's runtime state and mixer
//!
//! A part owns the notes sounding on its channel, reacts to channel voice
//! messages and renders one stereo frame at a time into the caller's mix
//! buffer. Channel-scoped configuration (level, pan, bend range, rhythm
//! mode...) lives in the shared [`Settings`] store; fast-changing
//! performance state (pitch bend, mod wheel, expression, hold pedal) is kept
//! locally so the audio path never waits on a writer.

use std::sync::Arc;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::rom::metadata::{InstrumentInfo, PartialFlags};
use crate::rom::{ControlTable, PcmRom};
use crate::synth::note::{EnvOffsets, Note, RenderParams, Voice};
use crate::synth::note_pool::NotePool;
use crate::synth::settings::{PartParam, Settings, SystemParam, CENTER};

/// Upper bound on simultaneous notes per part.
const MAX_NOTES: usize = 32;

/// Peak vibrato excursion in semitones at full depth.
const MAX_VIBRATO_SEMITONES: f32 = 0.5;

const SCALE_7BIT: f32 = 1.0 / 127.0;

/// Control change messages the part understands. Anything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum Controller {
    /// CC 1, vibrato via the note LFOs
    ModWheel = 1,
    /// CC 5
    PortamentoTime = 5,
    /// CC 7, writes the part level
    Volume = 7,
    /// CC 10, writes the part panpot
    Pan = 10,
    /// CC 11, scales level without touching the stored setting
    Expression = 11,
    /// CC 64, sustains released notes while down
    HoldPedal = 64,
    /// CC 65
    Portamento = 65,
    /// CC 91, reverb send
    Reverb = 91,
    /// CC 93, chorus send
    Chorus = 93,
}

/// One of the 16 parts of the synthesizer.
pub struct Part {
    id: u8,
    settings: Arc<Settings>,
    table: Arc<ControlTable>,
    pcm: Arc<PcmRom>,

    program: u8,
    bank: u8,
    /// Resolved instrument index for melodic mode; rhythm parts resolve per
    /// key instead
    instrument: Option<u16>,
    drum_set: u8,

    pitch_bend_factor: f32,
    modulation: u8,
    channel_pressure: u8,
    expression: u8,
    hold_pedal: bool,
    /// Keys released while the hold pedal was down, deduplicated
    held_keys: Vec<u8>,

    mute: bool,

    notes: NotePool,
    last_peak: f32,
}

impl Part {
    /// Create part `id` with factory state: program 0 on bank 0, no bend,
    /// full expression.
    pub fn new(id: u8, settings: Arc<Settings>, table: Arc<ControlTable>, pcm: Arc<PcmRom>) -> Self {
        let mut part = Part {
            id,
            settings,
            table,
            pcm,
            program: 0,
            bank: 0,
            instrument: None,
            drum_set: 0,
            pitch_bend_factor: 1.0,
            modulation: 0,
            channel_pressure: 0,
            expression: 127,
            hold_pedal: false,
            held_keys: Vec::with_capacity(128),
            mute: false,
            notes: NotePool::with_capacity(MAX_NOTES),
            last_peak: 0.0,
        };
        part.set_program(0, 0);
        part
    }

    /// Part number [0-15].
    pub fn id(&self) -> u8 {
        self.id
    }

    /// MIDI channel this part listens on.
    pub fn midi_channel(&self) -> u8 {
        self.settings.get(PartParam::RxChannel, self.id)
    }

    /// Whether the part is muted.
    pub fn mute(&self) -> bool {
        self.mute
    }

    /// Mute or unmute the part. Muting silences new notes; sounding notes
    /// are cleared immediately.
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
        if mute {
            self.clear_all_notes();
        }
    }

    /// Currently selected program number.
    pub fn program(&self) -> u8 {
        self.program
    }

    fn rhythm_mode(&self) -> u8 {
        self.settings.get(PartParam::UseForRhythm, self.id)
    }

    /// Select a program on a variation bank.
    ///
    /// Melodic parts resolve (bank, program) through the variation table,
    /// falling back to the capital tone on bank 0. Rhythm parts interpret
    /// the program as a drum set index. Values above 0x7F and lookups that
    /// resolve to nothing leave the current selection unchanged.
    pub fn set_program(&mut self, program: u8, bank: u8) {
        if program > 0x7F || bank > 0x7F {
            return;
        }

        if self.rhythm_mode() > 0 {
            if self.table.drum_set(program).is_some() {
                self.program = program;
                self.drum_set = program;
            }
            return;
        }

        let resolved = self
            .table
            .variation(bank, program)
            .or_else(|| self.table.variation(0, program));
        if let Some(index) = resolved {
            self.program = program;
            self.bank = bank;
            self.instrument = Some(index);
        }
    }

    fn env_offsets(&self) -> EnvOffsets {
        EnvOffsets {
            attack: self.settings.get(PartParam::EnvAttack, self.id),
            decay: self.settings.get(PartParam::EnvDecay, self.id),
            release: self.settings.get(PartParam::EnvRelease, self.id),
        }
    }

    fn shifted_key(&self, key: u8) -> u8 {
        let part_shift = self.settings.get(PartParam::KeyShift, self.id) as i16 - CENTER as i16;
        let sys_shift =
            self.settings.get_system(SystemParam::KeyShift) as i16 - CENTER as i16;
        (key as i16 + part_shift + sys_shift).clamp(0, 0x7F) as u8
    }

    fn shaped_velocity(&self, velocity: u8) -> f32 {
        let depth = self.settings.get(PartParam::VelSenseDepth, self.id) as i16;
        let offset = self.settings.get(PartParam::VelSenseOffset, self.id) as i16;
        let shaped =
            ((velocity as i16 * depth) / CENTER as i16 + (offset - CENTER as i16)).clamp(1, 127);
        shaped as f32 * SCALE_7BIT
    }

    fn build_voices(
        &self,
        instrument: &InstrumentInfo,
        sounding_key: u8,
        drum: bool,
    ) -> [Option<Voice>; 2] {
        let offsets = self.env_offsets();
        let sample_rate = self.settings.sample_rate();

        let mut voices = [None, None];
        for (slot, flag) in [PartialFlags::PARTIAL_1, PartialFlags::PARTIAL_2]
            .into_iter()
            .enumerate()
        {
            if !instrument.partials_used.contains(flag) {
                continue;
            }
            let partial = &instrument.partials[slot];
            if let Some(set) = self.pcm.sample_set(partial.sample_index) {
                voices[slot] = Some(Voice::new(
                    Arc::clone(set),
                    sounding_key,
                    partial,
                    offsets,
                    sample_rate,
                    drum,
                ));
            }
        }
        voices
    }

    /// Start a note.
    ///
    /// Out-of-range key or velocity bytes are dropped. Velocity 0 is a
    /// note-off. Melodic parts respect the configured key range and
    /// transpose by the part and system key shifts; rhythm parts map the key
    /// through the selected drum set and skip silent keys. In mono mode any
    /// sounding note is released first. A non-zero partial reserve caps the
    /// part's total partial count and excess notes are dropped.
    pub fn add_note(&mut self, key: u8, velocity: u8) {
        if key > 0x7F || velocity > 0x7F {
            return;
        }
        if velocity == 0 {
            self.stop_note(key);
            return;
        }
        if self.mute {
            return;
        }

        let drum = self.rhythm_mode() > 0;
        let (instrument_index, sounding_key) = if drum {
            let set = match self.table.drum_set(self.drum_set) {
                Some(set) => set,
                None => return,
            };
            match set.instrument_for_key(key) {
                Some(index) => (index, key),
                None => return,
            }
        } else {
            let low = self.settings.get(PartParam::KeyRangeLow, self.id);
            let high = self.settings.get(PartParam::KeyRangeHigh, self.id);
            if key < low || key > high {
                return;
            }
            let index = match self.instrument {
                Some(index) => index,
                None => return,
            };
            (index, self.shifted_key(key))
        };

        let instrument = match self.table.instrument(instrument_index) {
            Some(instrument) => instrument,
            None => return,
        };

        // Mono mode: replacement is immediate, the previous note is cut
        // without waiting for its release tail
        if self.settings.get(PartParam::PolyMode, self.id) == 0 {
            self.notes.clear();
        }

        let reserve = self.settings.get(PartParam::PartialReserve, self.id) as usize;
        let needed = instrument.partials_used.bits().count_ones() as usize;
        if reserve > 0 && self.notes.total_partials() + needed > reserve {
            return;
        }

        let delay_offset = self.settings.get(PartParam::VibratoDelay, self.id) as i16;
        let lfo_delay =
            (instrument.lfo_delay as i16 + delay_offset - CENTER as i16).clamp(0, 127) as u8;

        let voices = self.build_voices(instrument, sounding_key, drum);
        let note = Note::new(
            key,
            self.shaped_velocity(velocity),
            voices,
            instrument.lfo_rate,
            lfo_delay,
            self.settings.sample_rate(),
        );
        if let Some(note) = note {
            self.notes.insert(note);
        }
    }

    /// Stop a note.
    ///
    /// With the hold pedal down the key is buffered and released when the
    /// pedal lifts. Rhythm parts ignore note-off, matching the hardware.
    pub fn stop_note(&mut self, key: u8) {
        if key > 0x7F || self.rhythm_mode() > 0 {
            return;
        }

        if self.hold_pedal {
            if !self.held_keys.contains(&key) {
                self.held_keys.push(key);
            }
            return;
        }

        self.release_key(key);
    }

    fn release_key(&mut self, key: u8) {
        for note in self.notes.iter_mut() {
            if note.key() == key {
                note.release();
            }
        }
    }

    /// Handle a control change message. Unknown controllers and out-of-range
    /// bytes are ignored.
    pub fn control_change(&mut self, controller: u8, value: u8) {
        if controller > 0x7F || value > 0x7F {
            return;
        }
        let controller = match Controller::from_u8(controller) {
            Some(c) => c,
            None => return,
        };

        match controller {
            Controller::ModWheel => self.modulation = value,
            Controller::PortamentoTime => {
                self.settings.set(PartParam::PortamentoTime, self.id, value)
            }
            Controller::Volume => self.settings.set(PartParam::Level, self.id, value),
            Controller::Pan => self.settings.set(PartParam::Panpot, self.id, value),
            Controller::Expression => self.expression = value,
            Controller::HoldPedal => {
                let down = value >= 64;
                if self.hold_pedal && !down {
                    // Pedal lifted: release everything buffered while down
                    for i in 0..self.held_keys.len() {
                        let key = self.held_keys[i];
                        self.release_key(key);
                    }
                    self.held_keys.clear();
                }
                self.hold_pedal = down;
            }
            Controller::Portamento => {
                self.settings
                    .set(PartParam::Portamento, self.id, (value >= 64) as u8)
            }
            Controller::Reverb => self.settings.set(PartParam::ReverbSend, self.id, value),
            Controller::Chorus => self.settings.set(PartParam::ChorusSend, self.id, value),
        }
    }

    /// Handle channel pressure. Adds vibrato like the mod wheel; the deeper
    /// of the two wins.
    pub fn channel_pressure(&mut self, value: u8) {
        if value <= 0x7F {
            self.channel_pressure = value;
        }
    }

    /// Handle polyphonic key pressure: deepens vibrato on the notes
    /// sounding at that key only.
    pub fn poly_key_pressure(&mut self, key: u8, value: u8) {
        if key > 0x7F || value > 0x7F {
            return;
        }
        for note in self.notes.iter_mut() {
            if note.key() == key {
                note.set_pressure(value);
            }
        }
    }

    /// Handle a pitch bend change from raw 7-bit LSB/MSB bytes.
    pub fn pitch_bend_change(&mut self, lsb: u8, msb: u8) {
        if lsb > 0x7F || msb > 0x7F {
            return;
        }
        let bend = ((msb as i32) << 7 | lsb as i32) - 8192;
        let range = self.settings.get(PartParam::BendRange, self.id) as f32;
        self.pitch_bend_factor =
            (bend as f32 / 8192.0 * range * std::f32::consts::LN_2 / 12.0).exp();
    }

    /// Silence every note immediately, bypassing Release.
    pub fn clear_all_notes(&mut self) {
        self.notes.clear();
        self.held_keys.clear();
    }

    /// Release every note through its normal Release phase.
    pub fn release_all_notes(&mut self) {
        for note in self.notes.iter_mut() {
            note.release();
        }
        self.held_keys.clear();
    }

    /// Restore the part to factory state: notes cleared, local performance
    /// state reset, stored parameters back to defaults.
    pub fn reset(&mut self) {
        self.clear_all_notes();
        self.settings.reset_part(self.id);
        self.pitch_bend_factor = 1.0;
        self.modulation = 0;
        self.channel_pressure = 0;
        self.expression = 127;
        self.hold_pedal = false;
        self.mute = false;
        self.program = 0;
        self.bank = 0;
        self.instrument = None;
        self.drum_set = 0;
        self.set_program(0, 0);
    }

    fn render_params(&self) -> RenderParams {
        let level = self.settings.get(PartParam::Level, self.id) as f32 * SCALE_7BIT;
        let master = self.settings.get_system(SystemParam::Volume) as f32 * SCALE_7BIT;
        let volume = level * master * (self.expression as f32 * SCALE_7BIT);

        let pan = self.settings.get(PartParam::Panpot, self.id) as i16;
        let master_pan = self.settings.get_system(SystemParam::Pan) as i16 - CENTER as i16;
        let pan = (pan + master_pan).clamp(0, 127) as f32 * SCALE_7BIT;

        let depth_offset =
            (self.settings.get(PartParam::VibratoDepth, self.id) as i16 - CENTER as i16) as f32
                / 64.0;
        let wheel = self.modulation.max(self.channel_pressure) as f32 * SCALE_7BIT;
        let mod_depth = self.settings.get(PartParam::ModDepth, self.id) as f32 * SCALE_7BIT;
        let vibrato_depth =
            ((wheel * mod_depth + depth_offset) * MAX_VIBRATO_SEMITONES).max(0.0);

        RenderParams {
            pitch_factor: self.pitch_bend_factor,
            volume,
            pan_left: 1.0 - pan,
            pan_right: pan,
            vibrato_depth,
            pressure_vibrato: mod_depth * MAX_VIBRATO_SEMITONES,
            vibrato_rate: self.settings.get(PartParam::VibratoRate, self.id),
        }
    }

    /// Render one stereo frame, adding this part's contribution into
    /// `frame`. Returns the number of partials still sounding, for voice
    /// budget reporting upstream.
    pub fn get_next_sample(&mut self, frame: &mut [f32; 2]) -> usize {
        if self.notes.is_empty() {
            return 0;
        }

        let params = self.render_params();

        let mut mono = 0.0f32;
        self.notes.retain(|note| match note.next(&params) {
            Some(sample) => {
                mono += sample;
                true
            }
            None => false,
        });

        let left = mono * params.volume * params.pan_left;
        let right = mono * params.volume * params.pan_right;
        frame[0] += left;
        frame[1] += right;

        let peak = left.abs().max(right.abs());
        if peak > self.last_peak {
            self.last_peak = peak;
        }

        self.notes.total_partials()
    }

    /// Peak output magnitude since the previous call. Reading resets the
    /// meter.
    pub fn get_last_peak_sample(&mut self) -> f32 {
        let peak = self.last_peak;
        self.last_peak = 0.0;
        peak
    }
}

impl std::fmt::Debug for Part {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Part")
            .field("id", &self.id)
            .field("program", &self.program)
            .field("bank", &self.bank)
            .field("notes", &self.notes.len())
            .finish()
    }
}
