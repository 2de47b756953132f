//! # Musical Tuning Module
//!
//! Note naming and equal-temperament math, plus the guitar tunings the
//! fretboard is built from.
//!
//! ## Features
//! - MIDI note table (C-1 to G9) with A4 = 440 Hz
//! - Frequency to MIDI number and note name conversions
//! - Cent deviation calculations
//! - Validated string tunings and a short list of named presets

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TabError, TabResult};

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// MIDI number of A4.
pub const A4_MIDI: i32 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// MIDI note number
    pub midi: u8,
    /// Frequency in Hz
    pub frequency: f64,
}

/// Statically computed notes for the whole MIDI range.
///
/// Computed once on first use; index `i` holds MIDI note `i`.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    (0u8..=127)
        .map(|midi| Note {
            name: midi_to_note_name(midi),
            midi,
            frequency: midi_to_frequency(midi),
        })
        .collect()
});

/// Equal-tempered frequency of a MIDI note.
pub fn midi_to_frequency(midi: u8) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((midi as i32 - A4_MIDI) as f64 / 12.0)
}

/// Sharp-spelled name of a MIDI note, with C4 = 60.
pub fn midi_to_note_name(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(midi % 12) as usize], octave)
}

/// Converts a frequency to the nearest MIDI note number.
///
/// Returns `None` for non-positive or non-finite input, and for pitches
/// that round outside 0..=127.
pub fn freq_to_midi(freq: f64) -> Option<u8> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let note_num = (A4_MIDI as f64 + 12.0 * (freq / A4_FREQUENCY).log2()).round();
    if (0.0..=127.0).contains(&note_num) {
        Some(note_num as u8)
    } else {
        None
    }
}

/// Converts a frequency to its nearest note name, e.g. `110.0 -> "A2"`.
pub fn freq_to_note_name(freq: f64) -> Option<String> {
    freq_to_midi(freq).map(|midi| NOTES[midi as usize].name.clone())
}

/// Finds the closest musical note to a given frequency.
///
/// # Returns
/// * `Some((note_name, target_frequency))` - Closest note and its exact pitch
/// * `None` - The frequency is not a valid pitch
pub fn find_nearest_note(freq: f64) -> Option<(String, f64)> {
    let note = &NOTES[freq_to_midi(freq)? as usize];
    Some((note.name.clone(), note.frequency))
}

/// Parses a note name such as `"A4"`, `"C#3"`, `"Bb2"` or `"C-1"` into a
/// MIDI number.
pub fn note_name_to_midi(name: &str) -> Option<u8> {
    let mut chars = name.trim().chars().peekable();
    let letter = chars.next()?.to_ascii_uppercase();
    let base: i32 = match letter {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut offset = 0;
    while let Some(&c) = chars.peek() {
        match c {
            '#' => offset += 1,
            'b' => offset -= 1,
            _ => break,
        }
        chars.next();
    }

    let octave: i32 = chars.collect::<String>().parse().ok()?;
    let midi = (octave + 1) * 12 + base + offset;
    u8::try_from(midi).ok().filter(|m| *m <= 127)
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - 1200 cents = 1 octave
/// - Positive values are sharp, negative values flat
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// One open string of a tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenString {
    /// Label shown in tabs, e.g. "E2".
    pub label: String,
    /// Open-string frequency in Hz.
    pub frequency: f64,
}

impl OpenString {
    pub fn new(label: impl Into<String>, frequency: f64) -> Self {
        Self {
            label: label.into(),
            frequency,
        }
    }
}

/// An ordered list of open strings, lowest first.
///
/// String numbers used by the rest of the crate are 1-based positions in
/// this list, so string 1 is the first (lowest) entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<OpenString>", into = "Vec<OpenString>")]
pub struct Tuning {
    strings: Vec<OpenString>,
}

impl Tuning {
    /// Validates and builds a tuning.
    ///
    /// Fails with [`TabError::InvalidTuning`] when the list is empty, when a
    /// frequency is not a finite positive number, or when the frequencies
    /// are not strictly ascending.
    pub fn new(strings: Vec<OpenString>) -> TabResult<Self> {
        if strings.is_empty() {
            return Err(TabError::invalid_tuning("tuning has no strings"));
        }
        for (i, s) in strings.iter().enumerate() {
            if !s.frequency.is_finite() || s.frequency <= 0.0 {
                return Err(TabError::invalid_tuning(format!(
                    "string {} ({}) has non-positive frequency {}",
                    i + 1,
                    s.label,
                    s.frequency
                )));
            }
        }
        if let Some(i) = strings
            .windows(2)
            .position(|pair| pair[1].frequency <= pair[0].frequency)
        {
            return Err(TabError::invalid_tuning(format!(
                "string {} ({} Hz) is not higher than string {} ({} Hz)",
                i + 2,
                strings[i + 1].frequency,
                i + 1,
                strings[i].frequency
            )));
        }
        Ok(Self { strings })
    }

    /// Builds a tuning from `(label, Hz)` pairs.
    pub fn from_pairs(pairs: &[(&str, f64)]) -> TabResult<Self> {
        Self::new(
            pairs
                .iter()
                .map(|&(label, freq)| OpenString::new(label, freq))
                .collect(),
        )
    }

    /// Standard six-string tuning, E2 A2 D3 G3 B3 E4.
    pub fn standard() -> Self {
        Self {
            strings: preset_strings(STANDARD),
        }
    }

    pub fn strings(&self) -> &[OpenString] {
        &self.strings
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Open string by 1-based string number.
    pub fn string(&self, number: usize) -> Option<&OpenString> {
        number.checked_sub(1).and_then(|i| self.strings.get(i))
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<OpenString>> for Tuning {
    type Error = TabError;

    fn try_from(strings: Vec<OpenString>) -> TabResult<Self> {
        Tuning::new(strings)
    }
}

impl From<Tuning> for Vec<OpenString> {
    fn from(tuning: Tuning) -> Self {
        tuning.strings
    }
}

impl fmt::Display for Tuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.strings.iter().map(|s| s.label.as_str()).collect();
        write!(f, "{}", labels.join(" "))
    }
}

const STANDARD: &[(&str, f64)] = &[
    ("E2", 82.41),
    ("A2", 110.00),
    ("D3", 146.83),
    ("G3", 196.00),
    ("B3", 246.94),
    ("E4", 329.63),
];

const DROP_D: &[(&str, f64)] = &[
    ("D2", 73.42),
    ("A2", 110.00),
    ("D3", 146.83),
    ("G3", 196.00),
    ("B3", 246.94),
    ("E4", 329.63),
];

const HALF_STEP_DOWN: &[(&str, f64)] = &[
    ("Eb2", 77.78),
    ("Ab2", 103.83),
    ("Db3", 138.59),
    ("Gb3", 185.00),
    ("Bb3", 233.08),
    ("Eb4", 311.13),
];

const DADGAD: &[(&str, f64)] = &[
    ("D2", 73.42),
    ("A2", 110.00),
    ("D3", 146.83),
    ("G3", 196.00),
    ("A3", 220.00),
    ("D4", 293.66),
];

const OPEN_G: &[(&str, f64)] = &[
    ("D2", 73.42),
    ("G2", 98.00),
    ("D3", 146.83),
    ("G3", 196.00),
    ("B3", 246.94),
    ("D4", 293.66),
];

const BASS: &[(&str, f64)] = &[
    ("E1", 41.20),
    ("A1", 55.00),
    ("D2", 73.42),
    ("G2", 98.00),
];

fn preset_strings(pairs: &[(&str, f64)]) -> Vec<OpenString> {
    pairs
        .iter()
        .map(|&(label, freq)| OpenString::new(label, freq))
        .collect()
}

/// The configurable list of named tunings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningPreset {
    Standard,
    DropD,
    HalfStepDown,
    Dadgad,
    OpenG,
    Bass,
}

impl TuningPreset {
    pub fn all() -> &'static [TuningPreset] {
        &[
            TuningPreset::Standard,
            TuningPreset::DropD,
            TuningPreset::HalfStepDown,
            TuningPreset::Dadgad,
            TuningPreset::OpenG,
            TuningPreset::Bass,
        ]
    }

    /// Canonical name, as accepted by [`TuningPreset::from_name`].
    pub fn name(self) -> &'static str {
        match self {
            TuningPreset::Standard => "standard",
            TuningPreset::DropD => "drop-d",
            TuningPreset::HalfStepDown => "half-step-down",
            TuningPreset::Dadgad => "dadgad",
            TuningPreset::OpenG => "open-g",
            TuningPreset::Bass => "bass",
        }
    }

    /// Looks a preset up by name, ignoring case and `-`/`_`/space separators.
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "standard" | "eadgbe" => Some(TuningPreset::Standard),
            "dropd" => Some(TuningPreset::DropD),
            "halfstepdown" | "ebstandard" => Some(TuningPreset::HalfStepDown),
            "dadgad" => Some(TuningPreset::Dadgad),
            "openg" => Some(TuningPreset::OpenG),
            "bass" => Some(TuningPreset::Bass),
            _ => None,
        }
    }

    pub fn tuning(self) -> Tuning {
        let pairs = match self {
            TuningPreset::Standard => STANDARD,
            TuningPreset::DropD => DROP_D,
            TuningPreset::HalfStepDown => HALF_STEP_DOWN,
            TuningPreset::Dadgad => DADGAD,
            TuningPreset::OpenG => OPEN_G,
            TuningPreset::Bass => BASS,
        };
        Tuning {
            strings: preset_strings(pairs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        assert_eq!(freq_to_midi(440.0), Some(69));
        assert_eq!(freq_to_note_name(440.0).as_deref(), Some("A4"));
        assert!((midi_to_frequency(69) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn octave_changes_at_c() {
        assert_eq!(midi_to_note_name(59), "B3");
        assert_eq!(midi_to_note_name(60), "C4");
        assert_eq!(freq_to_note_name(246.94).as_deref(), Some("B3"));
        assert_eq!(freq_to_note_name(82.41).as_deref(), Some("E2"));
    }

    #[test]
    fn invalid_frequencies_have_no_name() {
        assert_eq!(freq_to_note_name(0.0), None);
        assert_eq!(freq_to_note_name(-100.0), None);
        assert_eq!(freq_to_note_name(f64::NAN), None);
        assert_eq!(freq_to_midi(1.0e6), None);
    }

    #[test]
    fn parses_sharps_and_flats() {
        assert_eq!(note_name_to_midi("A4"), Some(69));
        assert_eq!(note_name_to_midi("C#3"), Some(49));
        assert_eq!(note_name_to_midi("Bb2"), Some(46));
        assert_eq!(note_name_to_midi("C-1"), Some(0));
        assert_eq!(note_name_to_midi("H2"), None);
        assert_eq!(note_name_to_midi("A"), None);
    }

    #[test]
    fn cents_are_signed() {
        let sharp = calculate_cents_deviation(440.0 * 2.0_f64.powf(10.0 / 1200.0), 440.0);
        assert!((sharp - 10.0).abs() < 1e-9);
        assert!(calculate_cents_deviation(430.0, 440.0) < 0.0);
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn nearest_note_snaps_in_log_space() {
        let (name, target) = find_nearest_note(112.0).unwrap();
        assert_eq!(name, "A2");
        assert!((target - 110.0).abs() < 1e-9);
    }

    #[test]
    fn tuning_rejects_bad_input() {
        assert!(matches!(
            Tuning::new(vec![]),
            Err(TabError::InvalidTuning { .. })
        ));
        assert!(matches!(
            Tuning::from_pairs(&[("E2", 82.41), ("A2", 0.0)]),
            Err(TabError::InvalidTuning { .. })
        ));
        assert!(matches!(
            Tuning::from_pairs(&[("E2", -82.41)]),
            Err(TabError::InvalidTuning { .. })
        ));
        assert!(matches!(
            Tuning::from_pairs(&[("A2", 110.0), ("E2", 82.41)]),
            Err(TabError::InvalidTuning { .. })
        ));
    }

    #[test]
    fn every_preset_is_valid() {
        for preset in TuningPreset::all() {
            let tuning = preset.tuning();
            assert!(Tuning::new(tuning.strings().to_vec()).is_ok(), "{}", preset.name());
            assert_eq!(TuningPreset::from_name(preset.name()), Some(*preset));
        }
        assert_eq!(TuningPreset::from_name("Drop_D"), Some(TuningPreset::DropD));
        assert_eq!(TuningPreset::from_name("nashville"), None);
    }

    #[test]
    fn tuning_deserializes_with_validation() {
        let ok: Tuning =
            serde_json::from_str(r#"[{"label":"E2","frequency":82.41},{"label":"A2","frequency":110.0}]"#)
                .unwrap();
        assert_eq!(ok.len(), 2);
        assert_eq!(ok.string(2).unwrap().label, "A2");
        assert!(ok.string(0).is_none());

        let bad = serde_json::from_str::<Tuning>(r#"[{"label":"E2","frequency":-1.0}]"#);
        assert!(bad.is_err());
    }
}
