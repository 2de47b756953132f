//! # Fretboard Module
//!
//! Precomputed pitch of every string/fret position for a tuning.
//!
//! Each cell is the open-string frequency scaled by equal-tempered
//! semitones: `open * 2^(fret / 12)`. The table is built once and never
//! changes, so a `Fretboard` can be shared freely between threads.

use crate::error::TabResult;
use crate::tuning::Tuning;

/// Fret count of a typical electric guitar neck.
pub const DEFAULT_FRETS: usize = 22;

/// Frequencies of every (string, fret) cell of a tuned neck.
#[derive(Debug, Clone, PartialEq)]
pub struct Fretboard {
    tuning: Tuning,
    frets: usize,
    // rows = strings (lowest first), columns = frets 0..=frets
    table: Vec<Vec<f64>>,
}

impl Fretboard {
    /// Builds the table for `tuning` with frets `0..=frets`.
    ///
    /// The tuning is re-validated here so a hand-assembled `Tuning` can never
    /// produce a partially valid fretboard.
    pub fn new(tuning: Tuning, frets: usize) -> TabResult<Self> {
        let tuning = Tuning::new(tuning.strings().to_vec())?;
        let table = build_table(&tuning, frets);

        log::debug!(
            "[FRETBOARD] Built {} strings x {} frets for tuning {}",
            tuning.len(),
            frets + 1,
            tuning
        );

        Ok(Self {
            tuning,
            frets,
            table,
        })
    }

    /// Standard tuning, 22 frets.
    pub fn standard() -> Self {
        let tuning = Tuning::standard();
        let table = build_table(&tuning, DEFAULT_FRETS);
        Self {
            tuning,
            frets: DEFAULT_FRETS,
            table,
        }
    }

    /// Frequency at a 1-based string number and a fret number.
    ///
    /// Returns `None` when either index is off the neck.
    pub fn frequency_at(&self, string: usize, fret: usize) -> Option<f64> {
        self.table
            .get(string.checked_sub(1)?)
            .and_then(|row| row.get(fret))
            .copied()
    }

    /// The whole table, one row per string (row 0 = string 1).
    pub fn table(&self) -> &[Vec<f64>] {
        &self.table
    }

    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    pub fn string_count(&self) -> usize {
        self.table.len()
    }

    /// Highest fret number; the neck has `frets() + 1` positions per string.
    pub fn frets(&self) -> usize {
        self.frets
    }

    /// Lowest and highest playable frequency.
    pub fn range(&self) -> (f64, f64) {
        let low = self.table[0][0];
        let high = self.table[self.table.len() - 1][self.frets];
        (low, high)
    }
}

impl Default for Fretboard {
    fn default() -> Self {
        Self::standard()
    }
}

fn build_table(tuning: &Tuning, frets: usize) -> Vec<Vec<f64>> {
    tuning
        .strings()
        .iter()
        .map(|open| {
            (0..=frets)
                .map(|fret| fret_frequency(open.frequency, fret))
                .collect()
        })
        .collect()
}

fn fret_frequency(open: f64, fret: usize) -> f64 {
    if fret == 0 {
        return open;
    }
    open * 2.0_f64.powf(fret as f64 / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TabError;
    use crate::tuning::OpenString;

    #[test]
    fn standard_board_shape() {
        let board = Fretboard::standard();
        assert_eq!(board.string_count(), 6);
        assert_eq!(board.frets(), 22);
        assert!(board.table().iter().all(|row| row.len() == 23));
    }

    #[test]
    fn twelfth_fret_is_an_octave() {
        let board = Fretboard::standard();
        let open = board.frequency_at(2, 0).unwrap();
        let octave = board.frequency_at(2, 12).unwrap();
        assert!((octave / open - 2.0).abs() < 1e-12);
    }

    #[test]
    fn off_the_neck_is_none() {
        let board = Fretboard::standard();
        assert_eq!(board.frequency_at(0, 0), None);
        assert_eq!(board.frequency_at(7, 0), None);
        assert_eq!(board.frequency_at(1, 23), None);
    }

    #[test]
    fn zero_frets_is_open_strings_only() {
        let board = Fretboard::new(Tuning::standard(), 0).unwrap();
        assert!(board.table().iter().all(|row| row.len() == 1));
        assert_eq!(board.frequency_at(6, 0), Some(329.63));
    }

    #[test]
    fn rejects_empty_tuning() {
        let err = Tuning::new(Vec::<OpenString>::new()).unwrap_err();
        assert!(matches!(err, TabError::InvalidTuning { .. }));
    }

    #[test]
    fn standard_matches_validated_construction() {
        let built = Fretboard::new(Tuning::standard(), DEFAULT_FRETS).unwrap();
        assert_eq!(Fretboard::standard(), built);
    }

    #[test]
    fn range_spans_low_open_to_high_last_fret() {
        let (low, high) = Fretboard::standard().range();
        assert_eq!(low, 82.41);
        assert!((high - 329.63 * 2.0_f64.powf(22.0 / 12.0)).abs() < 1e-9);
    }
}
