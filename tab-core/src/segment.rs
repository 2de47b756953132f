//! Collapses a frame-level pitch track into one observation per note.
//!
//! Every onset opens a segment that runs to the next onset (or the end of
//! the recording). The segment's pitch is the median of the voiced frames
//! inside it, its velocity the loudest frame, and its duration the segment
//! length.

use crate::model::PitchObservation;
use crate::pitch::median;
use crate::tuning;

/// A stretch of audio between two onsets and the frames detected in it.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start_time: f64,
    pub end_time: f64,
    pub frames: Vec<PitchObservation>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Summarizes the segment as a single note, or `None` when no frame in
    /// it carried pitch.
    pub fn to_observation(&self) -> Option<PitchObservation> {
        let freqs: Vec<f64> = self
            .frames
            .iter()
            .filter(|f| f.is_voiced())
            .map(|f| f.freq)
            .collect();
        if freqs.is_empty() {
            return None;
        }
        let freq = median(&freqs);
        let velocity = self.frames.iter().filter_map(|f| f.velocity).max();
        Some(PitchObservation {
            time: self.start_time,
            freq,
            note: tuning::freq_to_note_name(freq).unwrap_or_default(),
            velocity,
            duration: Some(self.duration()),
        })
    }
}

/// Splits `frames` at `onsets`.
///
/// Voiced frames before the first onset open an extra segment at the first
/// such frame, so a note that starts with the recording is not lost.
pub fn split_at_onsets(frames: &[PitchObservation], onsets: &[f64], end_time: f64) -> Vec<Segment> {
    let mut boundaries: Vec<f64> = onsets.to_vec();
    boundaries.sort_by(f64::total_cmp);
    boundaries.dedup();

    if let Some(first_voiced) = frames.iter().find(|f| f.is_voiced()) {
        if boundaries.first().is_none_or(|&first| first_voiced.time < first) {
            boundaries.insert(0, first_voiced.time);
        }
    }

    let last = boundaries.len().saturating_sub(1);
    boundaries
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = boundaries.get(i + 1).copied().unwrap_or(end_time).max(start);
            // the final segment also keeps frames stamped exactly at the end
            let frames = frames
                .iter()
                .filter(|f| f.time >= start && (f.time < end || (i == last && f.time <= end)))
                .cloned()
                .collect();
            Segment {
                start_time: start,
                end_time: end,
                frames,
            }
        })
        .collect()
}

/// One observation per onset segment that contains pitch.
///
/// Without onsets there is nothing to group by and the frames are returned
/// as they are.
pub fn group_by_onsets(
    frames: &[PitchObservation],
    onsets: &[f64],
    end_time: f64,
) -> Vec<PitchObservation> {
    if onsets.is_empty() {
        return frames.to_vec();
    }
    let notes: Vec<PitchObservation> = split_at_onsets(frames, onsets, end_time)
        .iter()
        .filter_map(Segment::to_observation)
        .collect();
    log::debug!(
        "[SEGMENT] Grouped {} frames into {} notes using {} onsets",
        frames.len(),
        notes.len(),
        onsets.len()
    );
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn frame(time: f64, freq: f64, velocity: u8) -> PitchObservation {
        PitchObservation::new(time, freq).with_velocity(velocity)
    }

    #[test]
    fn one_note_per_segment_with_median_pitch() {
        let frames = vec![
            frame(0.10, 110.0, 60),
            frame(0.12, 111.0, 90),
            frame(0.14, 220.0, 70),
            frame(0.55, 146.8, 80),
            frame(0.57, 146.9, 85),
        ];
        let notes = group_by_onsets(&frames, &[0.1, 0.5], 1.0);
        assert_eq!(notes.len(), 2);

        assert_eq!(notes[0].time, 0.1);
        assert_eq!(notes[0].freq, 111.0);
        assert_eq!(notes[0].note, "A2");
        assert_eq!(notes[0].velocity, Some(90));
        assert!((notes[0].duration.unwrap() - 0.4).abs() < 1e-12);

        assert_eq!(notes[1].note, "D3");
        assert!((notes[1].duration.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn segments_without_pitch_are_dropped() {
        let frames = vec![frame(0.1, 110.0, 60)];
        let notes = group_by_onsets(&frames, &[0.0, 0.5], 1.0);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].time, 0.0);
    }

    #[test]
    fn voiced_frames_before_first_onset_open_a_segment() {
        let frames = vec![frame(0.02, 82.41, 70), frame(0.6, 110.0, 70)];
        let notes = group_by_onsets(&frames, &[0.5], 1.0);
        let names: Vec<&str> = notes.iter().map(|n| n.note.as_str()).collect();
        assert_eq!(names, vec!["E2", "A2"]);
        assert_eq!(notes[0].time, 0.02);
    }

    #[test]
    fn nothing_in_nothing_out() {
        assert!(group_by_onsets(&[], &[], 1.0).is_empty());
        assert!(group_by_onsets(&[], &[0.2, 0.4], 1.0).is_empty());
    }

    #[test]
    fn no_onsets_keeps_frames() {
        let frames = vec![frame(0.1, 110.0, 60), frame(0.2, 112.0, 61)];
        assert_eq!(group_by_onsets(&frames, &[], 1.0), frames);
    }
}
