//! Wave ROM descrambling and DPCM sample reconstruction
//!
//! The PCM ROMs are stored with a fixed address permutation and a fixed data
//! permutation applied by the hardware, with the first 32 bytes of every
//! 1 MiB bank left untouched. Samples themselves are stored as deltas: each
//! byte is shifted by a 4-bit scale read from a companion "nibble" byte and
//! accumulated into the running amplitude.
//!
//! The permutation tables and the companion-byte addressing are
//! reverse-engineered hardware behavior (first mapped out by the
//! SC55_Soundfont project). They have no independent specification and are
//! preserved verbatim; any deviation changes the decoded audio.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::rom::metadata::{ControlTable, LoopMode, SampleInfo, SynthGen};
use crate::{Result, Sc55Error};

/// Physical ROM bank size; every dump is a multiple of this.
pub const BANK_SIZE: usize = 0x100000;

/// Offset of the 4-byte ASCII version string in the decoded image.
const VERSION_OFFSET: usize = 0x1C;
/// Offset of the 10-byte ASCII date string in the decoded image.
const DATE_OFFSET: usize = 0x30;

/// Decoded address bit i is taken from scrambled address bit `ADDRESS_ORDER[i]`.
const ADDRESS_ORDER: [u32; 20] = [
    0x02, 0x00, 0x03, 0x04, 0x01, 0x09, 0x0D, 0x0A, 0x12, 0x11, 0x06, 0x0F, 0x0B, 0x10, 0x08,
    0x05, 0x0C, 0x07, 0x0E, 0x13,
];

/// Decoded data bit i is taken from scrambled data bit `DATA_ORDER[i]`.
const DATA_ORDER: [u32; 8] = [2, 0, 4, 5, 7, 6, 3, 1];

/// Reverse the 20-bit address permutation.
///
/// The first 32 bytes of each bank are stored unencrypted and map to
/// themselves.
#[inline]
pub fn unscramble_address(address: u32) -> u32 {
    if address < 0x20 {
        return address;
    }

    let mut new_address = 0u32;
    for (bit, &src) in ADDRESS_ORDER.iter().enumerate() {
        new_address |= ((address >> src) & 1) << bit;
    }
    new_address
}

/// Reverse the 8-bit data permutation.
#[inline]
pub fn unscramble_data(byte: u8) -> u8 {
    let mut new_byte = 0u8;
    for (bit, &src) in DATA_ORDER.iter().enumerate() {
        new_byte |= ((byte >> src) & 1) << bit;
    }
    new_byte
}

/// Descramble one 1 MiB bank from `enc` into `dec`.
fn descramble_bank(enc: &[u8], dec: &mut [u8]) {
    debug_assert_eq!(enc.len(), BANK_SIZE);
    debug_assert_eq!(dec.len(), BANK_SIZE);

    for (i, &byte) in enc.iter().enumerate() {
        let value = if i >= 0x20 {
            unscramble_data(byte)
        } else {
            byte
        };
        dec[unscramble_address(i as u32) as usize] = value;
    }
}

/// Map a sample's declared address to its offset in the decoded image.
///
/// The top 3 address bits select a logical bank. The SC-55 and SC-88 fold
/// bank group 2 onto the second megabyte; the SC-55mkII has a real third
/// bank there.
fn resolve_bank_address(address: u32, generation: SynthGen) -> Result<u32> {
    let bank = match (address & 0x700000) >> 20 {
        0 => 0x000000,
        1 => 0x100000,
        2 if generation == SynthGen::Sc55Mk2 => 0x200000,
        2 => 0x100000,
        4 => 0x200000,
        _ => return Err(Sc55Error::UnknownBank(address & 0x700000)),
    };

    Ok((address & 0xFFFFF) | bank)
}

/// One decoded waveform, immutable after construction.
///
/// Holds `sample_len + 1` amplitudes; the extra guard sample keeps linear
/// interpolation in bounds at the loop seam. After decoding, `loop_mode` is
/// never [`LoopMode::PingPong`].
#[derive(Debug, Clone)]
pub struct SampleSet {
    /// Reconstructed amplitudes, `sample_len + 1` entries
    pub samples: Vec<f32>,
    /// Index of the last playable sample
    pub sample_len: u32,
    /// First sample of the loop region (`sample_len - loop_len`)
    pub loop_start: u32,
    /// Loop length; the loop spans the final `loop_len + 1` samples
    pub loop_len: u32,
    /// Forward or one-shot
    pub loop_mode: LoopMode,
    /// MIDI key at recorded pitch
    pub root_key: u8,
    /// Fine pitch correction in cents
    pub pitch: i16,
}

/// Decode one sample from an already-descrambled image.
fn decode_sample(rom: &[u8], info: &SampleInfo, generation: SynthGen) -> Result<SampleSet> {
    let rom_address = resolve_bank_address(info.address, generation)?;

    let mut samples = Vec::with_capacity(info.sample_len as usize + 1);
    let mut running = 0.0f32;

    for i in 0..=info.sample_len {
        let s_address = (rom_address + i) as usize;
        let data = *rom
            .get(s_address)
            .ok_or(Sc55Error::SampleOutOfRange(s_address as u32))? as i8;

        // Each group of 32 sample bytes shares one scale byte, addressed by
        // dropping the low 5 address bits and keeping the bank bits. Bit 4
        // of the sample address picks the high or low nibble.
        let n_address = ((s_address & 0xFFFFF) >> 5) | (s_address & 0xF00000);
        let s_byte = *rom
            .get(n_address)
            .ok_or(Sc55Error::SampleOutOfRange(n_address as u32))?;
        let s_nibble = if s_address & 0x10 != 0 {
            s_byte >> 4
        } else {
            s_byte & 0x0F
        };

        // Shift into the top of an i32 and normalize; overflow wraps just
        // like the hardware's fixed-width shifter.
        let delta = (data as i32).wrapping_shl(s_nibble as u32 + 14);
        running += delta as f32 / 2147483648.0;

        samples.push(running);
    }

    let mut sample_len = info.sample_len;
    let mut loop_len = info.loop_len;
    let mut loop_mode = info.loop_mode;

    if loop_mode == LoopMode::PingPong {
        // Unwrap ping-pong loops into forward loops by appending the
        // negated mirror of the tail. Trades decode-time memory for simpler
        // real-time interpolation.
        let extra = loop_len + 1;
        samples.reserve(extra as usize);
        for i in 0..extra {
            samples.push(-samples[(sample_len - i) as usize]);
        }

        loop_mode = LoopMode::Forward;
        sample_len += extra;
        loop_len += extra;
    }

    Ok(SampleSet {
        samples,
        sample_len,
        loop_start: sample_len.saturating_sub(loop_len),
        loop_len,
        loop_mode,
        root_key: info.root_key,
        pitch: info.pitch,
    })
}

/// Decoded PCM ROM: every waveform from the control table plus the ROM's
/// version/date metadata.
///
/// Loading is single-shot and off the real-time path. Sample sets are held
/// behind `Arc` so notes can share them without copying.
#[derive(Debug)]
pub struct PcmRom {
    sample_sets: Vec<Arc<SampleSet>>,
    version: String,
    date: String,
}

impl PcmRom {
    /// Load and decode one or more ROM dump files.
    ///
    /// Files concatenate into a single logical address space in path order,
    /// one bank per MiB. Fails when the path list is empty, a file cannot be
    /// read, a file size is not a multiple of 1 MiB, or a sample address
    /// selects an unknown bank.
    pub fn load(paths: &[PathBuf], table: &ControlTable) -> Result<Self> {
        if paths.is_empty() {
            return Err(Sc55Error::NoRomFiles);
        }

        let mut rom = Vec::new();
        for path in paths {
            let enc = fs::read(path)?;
            if enc.is_empty() || enc.len() % BANK_SIZE != 0 {
                return Err(Sc55Error::RomSize {
                    path: path.display().to_string(),
                    size: enc.len() as u64,
                });
            }

            let offset = rom.len();
            rom.resize(offset + enc.len(), 0);
            for (enc_bank, dec_bank) in enc
                .chunks_exact(BANK_SIZE)
                .zip(rom[offset..].chunks_exact_mut(BANK_SIZE))
            {
                descramble_bank(enc_bank, dec_bank);
            }
        }

        Self::from_decoded(rom, table)
    }

    /// Build from an already-descrambled image. Used by `load` and by tests
    /// that construct synthetic images directly.
    fn from_decoded(rom: Vec<u8>, table: &ControlTable) -> Result<Self> {
        let mut sample_sets = Vec::with_capacity(table.samples.len());
        for info in &table.samples {
            sample_sets.push(Arc::new(decode_sample(&rom, info, table.generation)?));
        }

        let version =
            String::from_utf8_lossy(&rom[VERSION_OFFSET..VERSION_OFFSET + 4]).into_owned();
        let date = String::from_utf8_lossy(&rom[DATE_OFFSET..DATE_OFFSET + 10]).into_owned();

        Ok(PcmRom {
            sample_sets,
            version,
            date,
        })
    }

    /// Build from pre-decoded sample sets.
    ///
    /// For hosts that cache descrambled waveforms and skip the ROM files
    /// entirely; version and date metadata are empty.
    pub fn from_sample_sets(sample_sets: Vec<Arc<SampleSet>>) -> Self {
        PcmRom {
            sample_sets,
            version: String::new(),
            date: String::new(),
        }
    }

    /// Decoded sample set by control-table index.
    pub fn sample_set(&self, index: u16) -> Option<&Arc<SampleSet>> {
        self.sample_sets.get(index as usize)
    }

    /// Number of decoded sample sets.
    pub fn num_sample_sets(&self) -> usize {
        self.sample_sets.len()
    }

    /// 4-character ROM version string.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// 10-character ROM date string.
    pub fn date(&self) -> &str {
        &self.date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    /// Inverse of `unscramble_address`: where a decoded byte sits in the
    /// scrambled image.
    fn scramble_address(address: u32) -> u32 {
        if address < 0x20 {
            return address;
        }
        let mut out = 0u32;
        for (bit, &dst) in ADDRESS_ORDER.iter().enumerate() {
            out |= ((address >> bit) & 1) << dst;
        }
        out
    }

    /// Inverse of `unscramble_data`.
    fn scramble_data(byte: u8) -> u8 {
        let mut out = 0u8;
        for (bit, &dst) in DATA_ORDER.iter().enumerate() {
            out |= ((byte >> bit) & 1) << dst;
        }
        out
    }

    #[test]
    fn test_address_permutation_is_bijection() {
        let mut seen = vec![false; BANK_SIZE];
        for address in 0..BANK_SIZE as u32 {
            let mapped = unscramble_address(address) as usize;
            assert!(mapped < BANK_SIZE, "address {:#x} mapped out of range", address);
            assert!(!seen[mapped], "address {:#x} mapped twice", address);
            seen[mapped] = true;
        }
        assert!(seen.iter().all(|&hit| hit));
    }

    #[test]
    fn test_address_permutation_identity_below_header() {
        for address in 0..0x20 {
            assert_eq!(unscramble_address(address), address);
        }
        // First encrypted address: bit 5 feeds decoded bit 15
        assert_eq!(unscramble_address(0x20), 0x8000);
    }

    #[test]
    fn test_data_permutation_is_bijection() {
        let mut seen = [false; 256];
        for value in 0..=255u8 {
            let mapped = unscramble_data(value) as usize;
            assert!(!seen[mapped], "byte {:#x} mapped twice", value);
            seen[mapped] = true;
        }
    }

    #[test]
    fn test_data_permutation_inverse_roundtrip() {
        for value in 0..=255u8 {
            assert_eq!(unscramble_data(scramble_data(value)), value);
            assert_eq!(scramble_data(unscramble_data(value)), value);
        }
    }

    /// Build a decoded (descrambled) image with known deltas at `base` and
    /// a shared scale nibble of zero.
    fn synthetic_image(base: usize, deltas: &[i8]) -> Vec<u8> {
        let mut rom = vec![0u8; BANK_SIZE];
        for (i, &d) in deltas.iter().enumerate() {
            rom[base + i] = d as u8;
        }
        rom
    }

    #[test]
    fn test_dpcm_reconstruction_is_cumulative() {
        let deltas: [i8; 5] = [10, -3, 0, 127, -128];
        let rom = synthetic_image(0x40, &deltas);
        let info = SampleInfo {
            address: 0x40,
            sample_len: 4,
            loop_len: 0,
            loop_mode: LoopMode::OneShot,
            root_key: 60,
            pitch: 0,
        };

        let set = decode_sample(&rom, &info, SynthGen::Sc55).unwrap();
        assert_eq!(set.samples.len(), 5);

        // With a zero scale nibble each delta is (d << 14) / 2^31
        let mut expected = 0.0f32;
        for (i, &d) in deltas.iter().enumerate() {
            expected += ((d as i32) << 14) as f32 / 2147483648.0;
            assert_abs_diff_eq!(set.samples[i], expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sample_past_image_end_is_an_error() {
        // One bank loaded, but the sample runs over the bank boundary
        let rom = vec![0u8; BANK_SIZE];
        let info = SampleInfo {
            address: 0xFFFFF,
            sample_len: 4,
            loop_mode: LoopMode::OneShot,
            ..Default::default()
        };

        let err = decode_sample(&rom, &info, SynthGen::Sc55).unwrap_err();
        assert!(matches!(err, Sc55Error::SampleOutOfRange(_)));
    }

    #[test]
    fn test_dpcm_scale_nibble_selection() {
        // Sample bytes at 0x40.. share the scale byte at 0x02. Addresses
        // with bit 4 clear read the low nibble; 0x50.. read the high one.
        let mut rom = vec![0u8; BANK_SIZE];
        rom[0x02] = 0x31; // low nibble 1, high nibble 3
        rom[0x40] = 1;
        rom[0x50] = 1;

        let low = decode_sample(
            &rom,
            &SampleInfo {
                address: 0x40,
                sample_len: 0,
                loop_mode: LoopMode::OneShot,
                ..Default::default()
            },
            SynthGen::Sc55,
        )
        .unwrap();
        let high = decode_sample(
            &rom,
            &SampleInfo {
                address: 0x50,
                sample_len: 0,
                loop_mode: LoopMode::OneShot,
                ..Default::default()
            },
            SynthGen::Sc55,
        )
        .unwrap();

        assert_abs_diff_eq!(low.samples[0], (1i32 << 15) as f32 / 2147483648.0, epsilon = 1e-9);
        assert_abs_diff_eq!(high.samples[0], (1i32 << 17) as f32 / 2147483648.0, epsilon = 1e-9);
    }

    #[test]
    fn test_ping_pong_unwrap() {
        let deltas: [i8; 8] = [1, 2, 3, 4, 5, -2, -4, 1];
        let rom = synthetic_image(0x40, &deltas);
        let info = SampleInfo {
            address: 0x40,
            sample_len: 7,
            loop_len: 3,
            loop_mode: LoopMode::PingPong,
            root_key: 60,
            pitch: 0,
        };

        let forward_only = {
            let mut info = info;
            info.loop_mode = LoopMode::OneShot;
            decode_sample(&rom, &info, SynthGen::Sc55).unwrap()
        };
        let set = decode_sample(&rom, &info, SynthGen::Sc55).unwrap();

        // S' = S + L + 1, L' = 2L + 1, mode normalized to forward
        assert_eq!(set.loop_mode, LoopMode::Forward);
        assert_eq!(set.sample_len, 7 + 3 + 1);
        assert_eq!(set.loop_len, 3 + 3 + 1);
        assert_eq!(set.samples.len(), set.sample_len as usize + 1);
        assert_eq!(set.loop_start + set.loop_len, set.sample_len);

        // Appended tail is the negated mirror of the last L+1 samples
        for i in 0..4u32 {
            assert_abs_diff_eq!(
                set.samples[(8 + i) as usize],
                -forward_only.samples[(7 - i) as usize],
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn test_bank_resolution_by_generation() {
        // Groups 0 and 1 are unconditional
        assert_eq!(resolve_bank_address(0x000123, SynthGen::Sc55).unwrap(), 0x000123);
        assert_eq!(resolve_bank_address(0x100123, SynthGen::Sc55).unwrap(), 0x100123);

        // Group 2 folds onto bank 1 except on the mkII
        assert_eq!(resolve_bank_address(0x200123, SynthGen::Sc55).unwrap(), 0x100123);
        assert_eq!(resolve_bank_address(0x200123, SynthGen::Sc88).unwrap(), 0x100123);
        assert_eq!(
            resolve_bank_address(0x200123, SynthGen::Sc55Mk2).unwrap(),
            0x200123
        );

        // Group 4 is always the third bank
        assert_eq!(
            resolve_bank_address(0x400123, SynthGen::Sc55).unwrap(),
            0x200123
        );

        // Anything else is a decode error
        assert!(matches!(
            resolve_bank_address(0x300123, SynthGen::Sc55),
            Err(Sc55Error::UnknownBank(0x300000))
        ));
    }

    /// Write a scrambled bank whose decoded image contains `decoded` bytes.
    fn write_scrambled_bank(decoded: &[u8]) -> tempfile::NamedTempFile {
        assert_eq!(decoded.len(), BANK_SIZE);
        let mut enc = vec![0u8; BANK_SIZE];
        for (addr, &value) in decoded.iter().enumerate() {
            let src = scramble_address(addr as u32) as usize;
            enc[src] = if src >= 0x20 { scramble_data(value) } else { value };
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&enc).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_descrambles_and_extracts_metadata() {
        let mut decoded = vec![0u8; BANK_SIZE];
        decoded[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(b"1.21");
        decoded[DATE_OFFSET..DATE_OFFSET + 10].copy_from_slice(b"1993-05-01");
        decoded[0x40] = 5; // one delta for the single sample below

        let file = write_scrambled_bank(&decoded);
        let table = ControlTable {
            samples: vec![SampleInfo {
                address: 0x40,
                sample_len: 0,
                loop_mode: LoopMode::OneShot,
                ..Default::default()
            }],
            ..Default::default()
        };

        let pcm = PcmRom::load(&[file.path().to_path_buf()], &table).unwrap();
        assert_eq!(pcm.version(), "1.21");
        assert_eq!(pcm.date(), "1993-05-01");
        assert_eq!(pcm.num_sample_sets(), 1);
        assert_abs_diff_eq!(
            pcm.sample_set(0).unwrap().samples[0],
            (5i32 << 14) as f32 / 2147483648.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_load_rejects_bad_input() {
        let table = ControlTable::default();

        assert!(matches!(
            PcmRom::load(&[], &table),
            Err(Sc55Error::NoRomFiles)
        ));

        let mut truncated = tempfile::NamedTempFile::new().unwrap();
        truncated.write_all(&[0u8; 1234]).unwrap();
        truncated.flush().unwrap();
        assert!(matches!(
            PcmRom::load(&[truncated.path().to_path_buf()], &table),
            Err(Sc55Error::RomSize { size: 1234, .. })
        ));

        assert!(matches!(
            PcmRom::load(&[PathBuf::from("/nonexistent/waverom.bin")], &table),
            Err(Sc55Error::Io(_))
        ));
    }
}
