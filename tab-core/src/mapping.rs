//! # Fretboard Mapping Module
//!
//! Turns detected pitches into playable positions.
//!
//! - [`PositionMapper`] lists every string/fret cell within a cent tolerance
//!   of one frequency.
//! - [`SequenceMapper`] walks a whole note sequence and picks one position
//!   per note, preferring the string closest to the previous note's string.
//!
//! The sequence heuristic is greedy and single pass. It keeps the hand
//! near where it already is but does not look ahead, so it can miss a
//! globally shorter path through the neck.

use std::sync::Arc;

use crate::fretboard::Fretboard;
use crate::model::{FretCandidate, MappedNote, PitchObservation};

/// Default match window around each fretted pitch.
pub const DEFAULT_TOLERANCE_CENTS: f64 = 25.0;

/// Finds the fretboard cells that match a frequency.
#[derive(Debug, Clone)]
pub struct PositionMapper {
    fretboard: Arc<Fretboard>,
}

impl PositionMapper {
    pub fn new(fretboard: Fretboard) -> Self {
        Self {
            fretboard: Arc::new(fretboard),
        }
    }

    /// Shares an already-built fretboard.
    pub fn from_shared(fretboard: Arc<Fretboard>) -> Self {
        Self { fretboard }
    }

    pub fn fretboard(&self) -> &Fretboard {
        &self.fretboard
    }

    /// Every cell whose pitch is within `tolerance_cents` of `frequency`.
    ///
    /// Candidates come back ordered by string, then fret, both ascending.
    /// A non-positive (or non-finite) frequency is silence, not an error,
    /// and yields no candidates.
    pub fn map(&self, frequency: f64, tolerance_cents: f64) -> Vec<FretCandidate> {
        if !frequency.is_finite() || frequency <= 0.0 {
            log::debug!("[MAPPER] Skipping non-positive frequency {}", frequency);
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (string_idx, row) in self.fretboard.table().iter().enumerate() {
            for (fret, &cell_freq) in row.iter().enumerate() {
                let cents_diff = 1200.0 * (frequency / cell_freq).log2();
                if cents_diff.abs() <= tolerance_cents {
                    candidates.push(FretCandidate {
                        string: string_idx + 1,
                        fret,
                        error_cents: cents_diff,
                    });
                }
            }
        }

        if candidates.is_empty() {
            log::debug!(
                "[MAPPER] {:.2} Hz has no position within {} cents",
                frequency,
                tolerance_cents
            );
        }
        candidates
    }

    /// [`PositionMapper::map`] with the default 25 cent window.
    pub fn map_default(&self, frequency: f64) -> Vec<FretCandidate> {
        self.map(frequency, DEFAULT_TOLERANCE_CENTS)
    }
}

impl Default for PositionMapper {
    fn default() -> Self {
        Self::new(Fretboard::standard())
    }
}

/// Picks one position per note across a sequence.
#[derive(Debug, Clone)]
pub struct SequenceMapper {
    positions: PositionMapper,
    tolerance_cents: f64,
}

impl SequenceMapper {
    pub fn new(positions: PositionMapper) -> Self {
        Self {
            positions,
            tolerance_cents: DEFAULT_TOLERANCE_CENTS,
        }
    }

    /// Overrides the 25 cent window used for every note.
    pub fn with_tolerance(mut self, tolerance_cents: f64) -> Self {
        self.tolerance_cents = tolerance_cents;
        self
    }

    pub fn positions(&self) -> &PositionMapper {
        &self.positions
    }

    pub fn tolerance_cents(&self) -> f64 {
        self.tolerance_cents
    }

    /// Maps an ordered observation sequence to one position per note.
    ///
    /// Observations with no candidate (silence, out of range) are dropped
    /// and leave the previous string untouched. The first mapped note takes
    /// the lowest string/fret candidate; every later note takes the
    /// candidate on the string nearest the previous one. Equal distances
    /// keep the candidate order, so the lower string and then the lower
    /// fret win.
    ///
    /// The cursor lives only for this call; repeated or concurrent calls
    /// are independent.
    pub fn map_sequence(&self, observations: &[PitchObservation]) -> Vec<MappedNote> {
        let mut mapped = Vec::with_capacity(observations.len());
        let mut previous_string: Option<usize> = None;
        let mut dropped = 0usize;

        for observation in observations {
            let mut options = self.positions.map(observation.freq, self.tolerance_cents);
            if options.is_empty() {
                dropped += 1;
                continue;
            }

            if let Some(prev) = previous_string {
                // sort_by_key is stable
                options.sort_by_key(|c| c.string.abs_diff(prev));
            }
            let best = options[0];
            previous_string = Some(best.string);
            mapped.push(MappedNote::from_observation(observation, &best));
        }

        log::debug!(
            "[MAPPER] Mapped {} of {} observations ({} dropped)",
            mapped.len(),
            observations.len(),
            dropped
        );
        mapped
    }
}

impl Default for SequenceMapper {
    fn default() -> Self {
        Self::new(PositionMapper::default())
    }
}
